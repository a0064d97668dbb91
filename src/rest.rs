//! REST transport shared by every service client
//!
//! A thin wrapper over `reqwest` that knows three things: the service base
//! URL, the auth token to attach, and how to fold an HTTP outcome into the
//! error taxonomy. It does not interpret bodies; clients own
//! serialization via [`crate::wire::WireFormat`].
//!
//! Status handling: 404 becomes `NotFound` (callers supply the resource
//! type/id for the message), any other non-2xx becomes `UnexpectedResponse`
//! with the raw body, and a request that never got an HTTP response becomes
//! `Connection`.

use crate::error::{HarnessError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Response metadata plus the unparsed body.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
#[derive(Debug)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("stackprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request and pass the status/body through.
    ///
    /// `resource` names what is being addressed; it only feeds the
    /// `NotFound` error so deletion polling can report what vanished.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<(&'static str, String)>,
        resource: (&str, &str),
    ) -> Result<RestResponse> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("{} {} query={:?}", method, url, query);

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTH_TOKEN_HEADER,
            HeaderValue::from_str(&self.token)
                .map_err(|e| HarnessError::BadBody(format!("invalid auth token: {}", e)))?,
        );

        let mut request = self.client.request(method, url.as_str()).headers(headers);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some((content_type, payload)) = body {
            request = request.header(CONTENT_TYPE, content_type).body(payload);
        }

        // reqwest errors here mean no HTTP response was produced at all
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            let (resource_type, resource_id) = resource;
            return Err(HarnessError::NotFound {
                resource_type: resource_type.to_string(),
                resource_id: resource_id.to_string(),
            });
        }
        if !status.is_success() {
            tracing::error!("API error: {} {} - {}", status, url, truncate(&body));
            return Err(HarnessError::UnexpectedResponse {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        Ok(RestResponse { status, body })
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
        resource: (&str, &str),
    ) -> Result<RestResponse> {
        self.request(Method::GET, path, query, None, resource).await
    }

    pub async fn post(
        &self,
        path: &str,
        content_type: &'static str,
        body: String,
        resource: (&str, &str),
    ) -> Result<RestResponse> {
        self.request(Method::POST, path, &[], Some((content_type, body)), resource)
            .await
    }

    pub async fn put(
        &self,
        path: &str,
        content_type: &'static str,
        body: String,
        resource: (&str, &str),
    ) -> Result<RestResponse> {
        self.request(Method::PUT, path, &[], Some((content_type, body)), resource)
            .await
    }

    pub async fn delete(&self, path: &str, resource: (&str, &str)) -> Result<RestResponse> {
        self.request(Method::DELETE, path, &[], None, resource).await
    }
}

/// Keep logged/propagated bodies short; service error pages can be huge.
fn truncate(body: &str) -> String {
    const MAX: usize = 400;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [{} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    }
}
