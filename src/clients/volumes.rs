//! Block storage volumes client

use super::{rand_name, require_str, to_query};
use crate::error::{HarnessError, Result};
use crate::poll;
use crate::rest::RestClient;
use crate::wire::{Attributes, WireFormat};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct VolumesClient {
    rest: RestClient,
    format: WireFormat,
    build_interval: Duration,
    build_timeout: Duration,
}

impl VolumesClient {
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

    /// Create a volume of `size` gigabytes. Extra attributes
    /// (`display_name`, `volume_type`, ...) merge into the envelope; a
    /// display name is generated when the caller supplies none.
    pub async fn create_volume(&self, size: u64, extra: Attributes) -> Result<Attributes> {
        let mut body = Map::new();
        body.insert("size".to_string(), Value::Number(size.into()));
        if !extra.contains_key("display_name") {
            body.insert(
                "display_name".to_string(),
                Value::String(rand_name("volume")),
            );
        }
        for (key, value) in extra {
            body.insert(key, value);
        }

        let payload = self.format.encode("volume", &body)?;
        let response = self
            .rest
            .post("volumes", self.format.content_type(), payload, ("volume", ""))
            .await?;
        let volume = self.format.decode("volume", &response.body)?;
        info!(
            "Created volume {} ({} GB)",
            volume.get("id").and_then(serde_json::Value::as_str).unwrap_or("<no id>"),
            size
        );
        Ok(volume)
    }

    pub async fn get_volume(&self, volume_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(&format!("volumes/{}", volume_id), &[], ("volume", volume_id))
            .await?;
        self.format.decode("volume", &response.body)
    }

    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.rest
            .delete(&format!("volumes/{}", volume_id), ("volume", volume_id))
            .await?;
        Ok(())
    }

    pub async fn list_volumes(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get("volumes", &to_query(filters), ("volumes", ""))
            .await?;
        self.format.decode_list("volumes", "volume", &response.body)
    }

    pub async fn list_volumes_detail(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get("volumes/detail", &to_query(filters), ("volumes", ""))
            .await?;
        self.format.decode_list("volumes", "volume", &response.body)
    }

    /// Poll until the volume reports `target` status. A volume entering
    /// `error` fails immediately with `UnexpectedStatus`.
    pub async fn wait_for_volume_status(
        &self,
        volume_id: &str,
        target: &str,
    ) -> Result<Attributes> {
        let what = format!("volume {} -> {}", volume_id, target);
        let state = poll::wait_until(
            || self.get_volume(volume_id),
            |attrs| {
                attrs
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|s| s == target || s == "error")
                    .unwrap_or(false)
            },
            self.build_interval,
            self.build_timeout,
            &what,
        )
        .await?;

        let status = require_str(&state, "status", "volume status poll")?;
        if status != target {
            return Err(HarnessError::UnexpectedStatus {
                resource_type: "volume".to_string(),
                resource_id: volume_id.to_string(),
                status,
            });
        }
        Ok(state)
    }

    pub async fn wait_for_deletion(&self, volume_id: &str) -> Result<()> {
        poll::wait_for_deletion(
            || self.get_volume(volume_id),
            self.build_interval,
            self.build_timeout,
            &format!("volume {}", volume_id),
        )
        .await
    }
}
