//! Identity service: token acquisition and isolated credentials
//!
//! Two concerns live here. First, exchanging password credentials for an
//! auth token (`POST /tokens`), which every other client needs before it can
//! talk to its service. Second, provisioning throwaway tenant/user pairs so
//! a fixture can run against a namespace nothing else touches, and deleting
//! them again on release.
//!
//! Token requests are always JSON regardless of the configured interface
//! format; the identity service predates the XML rendition of the other
//! services and the harness only reads the token id out of the response.

use crate::config::IdentityConfig;
use crate::error::{ConfigError, HarnessError, Result};
use crate::rest::RestClient;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

/// tenant/user/password tuple required by every service call.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub tenant_name: String,
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone)]
pub struct TokenContext {
    pub token: String,
    pub tenant_id: String,
}

/// Handles for a provisioned tenant/user pair, released exactly once.
#[derive(Debug)]
pub struct IsolatedTenant {
    pub tenant_id: String,
    pub user_id: String,
    pub credentials: Credentials,
}

#[derive(Debug)]
pub struct IdentityClient {
    http: reqwest::Client,
    auth_url: String,
}

impl IdentityClient {
    pub fn new(auth_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("stackprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            auth_url: auth_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange password credentials for a token.
    pub async fn authenticate(&self, creds: &Credentials) -> Result<TokenContext> {
        let url = format!("{}/tokens", self.auth_url);
        debug!("POST {} (tenant {})", url, creds.tenant_name);

        let body = json!({
            "auth": {
                "passwordCredentials": {
                    "username": creds.username,
                    "password": creds.password,
                },
                "tenantName": creds.tenant_name,
            }
        });

        let response = self.http.post(url.as_str()).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(HarnessError::UnexpectedResponse {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: Value = serde_json::from_str(&text)?;
        let token = parsed["access"]["token"]["id"]
            .as_str()
            .ok_or_else(|| HarnessError::BadBody("token id missing from auth response".into()))?
            .to_string();
        let tenant_id = parsed["access"]["token"]["tenant"]["id"]
            .as_str()
            .ok_or_else(|| HarnessError::BadBody("tenant id missing from auth response".into()))?
            .to_string();

        Ok(TokenContext { token, tenant_id })
    }

    /// Provision a fresh tenant and user under admin credentials.
    pub async fn provision_isolated(&self, identity: &IdentityConfig) -> Result<IsolatedTenant> {
        let admin = admin_credentials(identity)?;
        let admin_ctx = self.authenticate(&admin).await?;
        let rest = RestClient::new(&self.auth_url, &admin_ctx.token)?;

        let uuid = Uuid::new_v4().to_string();
        let suffix = &uuid[..8];
        let tenant_name = format!("stackprobe-{}", suffix);
        let username = format!("stackprobe-user-{}", suffix);
        let password = Uuid::new_v4().to_string();

        let body = json!({"tenant": {"name": tenant_name, "enabled": true}});
        let response = rest
            .post(
                "tenants",
                "application/json",
                body.to_string(),
                ("tenant", &tenant_name),
            )
            .await?;
        let parsed: Value = serde_json::from_str(&response.body)?;
        let tenant_id = parsed["tenant"]["id"]
            .as_str()
            .ok_or_else(|| HarnessError::BadBody("tenant id missing".into()))?
            .to_string();

        let body = json!({
            "user": {
                "name": username,
                "password": password,
                "tenantId": tenant_id,
                "enabled": true,
            }
        });
        let response = match rest
            .post("users", "application/json", body.to_string(), ("user", &username))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                // don't leak the tenant when user creation fails
                let _ = rest.delete(&format!("tenants/{}", tenant_id), ("tenant", &tenant_id)).await;
                return Err(e);
            }
        };
        let parsed: Value = serde_json::from_str(&response.body)?;
        let user_id = parsed["user"]["id"]
            .as_str()
            .ok_or_else(|| HarnessError::BadBody("user id missing".into()))?
            .to_string();

        info!("Provisioned isolated tenant {} ({})", tenant_name, tenant_id);
        Ok(IsolatedTenant {
            tenant_id,
            user_id,
            credentials: Credentials {
                username,
                password,
                tenant_name,
            },
        })
    }

    /// Delete the provisioned user and tenant. Consumes the handle so a
    /// release cannot run twice.
    pub async fn release_isolated(
        &self,
        identity: &IdentityConfig,
        isolated: IsolatedTenant,
    ) -> Result<()> {
        let admin = admin_credentials(identity)?;
        let admin_ctx = self.authenticate(&admin).await?;
        let rest = RestClient::new(&self.auth_url, &admin_ctx.token)?;

        // The tenant delete runs even when the user delete fails; the handle
        // is consumed either way, so anything skipped here would leak.
        let user_result = rest
            .delete(
                &format!("users/{}", isolated.user_id),
                ("user", &isolated.user_id),
            )
            .await;
        let tenant_result = rest
            .delete(
                &format!("tenants/{}", isolated.tenant_id),
                ("tenant", &isolated.tenant_id),
            )
            .await;
        user_result?;
        tenant_result?;
        info!("Released isolated tenant {}", isolated.tenant_id);
        Ok(())
    }
}

fn admin_credentials(identity: &IdentityConfig) -> Result<Credentials> {
    match (&identity.admin_username, &identity.admin_password) {
        (Some(username), Some(password)) => Ok(Credentials {
            username: username.clone(),
            password: password.clone(),
            tenant_name: identity
                .admin_tenant_name
                .clone()
                .unwrap_or_else(|| "admin".to_string()),
        }),
        _ => Err(ConfigError::MissingField(
            "identity.admin_username/admin_password".to_string(),
        )
        .into()),
    }
}

impl From<&IdentityConfig> for Credentials {
    fn from(identity: &IdentityConfig) -> Self {
        Credentials {
            username: identity.username.clone(),
            password: identity.password.clone(),
            tenant_name: identity.tenant_name.clone(),
        }
    }
}
