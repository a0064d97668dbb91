//! Compute servers client
//!
//! Covers server CRUD, the two listing variants (`/servers` and
//! `/servers/detail`) with verbatim filter forwarding, and the image lookups
//! the fixture precheck needs. Recognized filters are whatever the service
//! recognizes; the client never inspects them (`image`, `flavor`, `name`,
//! `status`, `ip`, `limit` are the usual ones).

use super::{rand_name, require_str, to_query};
use crate::error::{HarnessError, Result};
use crate::poll;
use crate::rest::RestClient;
use crate::wire::{Attributes, WireFormat};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct ServersClient {
    rest: RestClient,
    format: WireFormat,
    build_interval: Duration,
    build_timeout: Duration,
}

impl ServersClient {
    pub fn new(
        base_url: &str,
        token: &str,
        format: WireFormat,
        build_interval: Duration,
        build_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(base_url, token)?,
            format,
            build_interval,
            build_timeout,
        })
    }

    /// Create a server. `name` defaults to a generated `server-<uuid8>`.
    pub async fn create_server(
        &self,
        name: Option<&str>,
        image_ref: &str,
        flavor_ref: &str,
    ) -> Result<Attributes> {
        let name = name.map(str::to_string).unwrap_or_else(|| rand_name("server"));
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(name.clone()));
        body.insert("imageRef".to_string(), Value::String(image_ref.to_string()));
        body.insert("flavorRef".to_string(), Value::String(flavor_ref.to_string()));

        let payload = self.format.encode("server", &body)?;
        let response = self
            .rest
            .post("servers", self.format.content_type(), payload, ("server", &name))
            .await?;
        let server = self.format.decode("server", &response.body)?;
        info!("Created server {} ({})", name, display_id(&server));
        Ok(server)
    }

    pub async fn get_server(&self, server_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(&format!("servers/{}", server_id), &[], ("server", server_id))
            .await?;
        self.format.decode("server", &response.body)
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        self.rest
            .delete(&format!("servers/{}", server_id), ("server", server_id))
            .await?;
        Ok(())
    }

    /// List servers, forwarding `filters` untouched as query parameters.
    pub async fn list_servers(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get("servers", &to_query(filters), ("servers", ""))
            .await?;
        self.format.decode_list("servers", "server", &response.body)
    }

    /// Detailed listing; same filters, fuller per-server attribute maps.
    pub async fn list_servers_detail(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get("servers/detail", &to_query(filters), ("servers", ""))
            .await?;
        self.format.decode_list("servers", "server", &response.body)
    }

    /// Rename a server.
    pub async fn update_server(&self, server_id: &str, name: &str) -> Result<Attributes> {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(name.to_string()));
        let payload = self.format.encode("server", &body)?;
        let response = self
            .rest
            .put(
                &format!("servers/{}", server_id),
                self.format.content_type(),
                payload,
                ("server", server_id),
            )
            .await?;
        self.format.decode("server", &response.body)
    }

    /// Poll until the server reports `target` status.
    ///
    /// A server that lands in `ERROR` while anything else was requested
    /// fails immediately with `UnexpectedStatus` instead of waiting out the
    /// build timeout.
    pub async fn wait_for_server_status(
        &self,
        server_id: &str,
        target: &str,
    ) -> Result<Attributes> {
        let what = format!("server {} -> {}", server_id, target);
        let state = poll::wait_until(
            || self.get_server(server_id),
            |attrs| {
                attrs
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|s| s.eq_ignore_ascii_case(target) || s.eq_ignore_ascii_case("ERROR"))
                    .unwrap_or(false)
            },
            self.build_interval,
            self.build_timeout,
            &what,
        )
        .await?;

        let status = require_str(&state, "status", "server status poll")?;
        if !status.eq_ignore_ascii_case(target) {
            return Err(HarnessError::UnexpectedStatus {
                resource_type: "server".to_string(),
                resource_id: server_id.to_string(),
                status,
            });
        }
        Ok(state)
    }

    /// Poll until a deleted server stops answering `GET`.
    pub async fn wait_for_deletion(&self, server_id: &str) -> Result<()> {
        poll::wait_for_deletion(
            || self.get_server(server_id),
            self.build_interval,
            self.build_timeout,
            &format!("server {}", server_id),
        )
        .await
    }

    pub async fn get_image(&self, image_ref: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(&format!("images/{}", image_ref), &[], ("image", image_ref))
            .await?;
        self.format.decode("image", &response.body)
    }

    pub async fn list_images(&self) -> Result<Vec<Attributes>> {
        let response = self.rest.get("images", &[], ("images", "")).await?;
        self.format.decode_list("images", "image", &response.body)
    }
}

fn display_id(attrs: &Attributes) -> String {
    attrs
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<no id>")
        .to_string()
}
