//! Volume snapshots client

use super::{rand_name, require_str, to_query};
use crate::error::{HarnessError, Result};
use crate::poll;
use crate::rest::RestClient;
use crate::wire::{Attributes, WireFormat};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct SnapshotsClient {
    rest: RestClient,
    format: WireFormat,
    build_interval: Duration,
    build_timeout: Duration,
}

impl SnapshotsClient {
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

    pub async fn create_snapshot(
        &self,
        volume_id: &str,
        extra: Attributes,
    ) -> Result<Attributes> {
        let mut body = Map::new();
        body.insert(
            "volume_id".to_string(),
            Value::String(volume_id.to_string()),
        );
        if !extra.contains_key("display_name") {
            body.insert(
                "display_name".to_string(),
                Value::String(rand_name("snapshot")),
            );
        }
        for (key, value) in extra {
            body.insert(key, value);
        }

        let payload = self.format.encode("snapshot", &body)?;
        let response = self
            .rest
            .post(
                "snapshots",
                self.format.content_type(),
                payload,
                ("snapshot", ""),
            )
            .await?;
        let snapshot = self.format.decode("snapshot", &response.body)?;
        info!(
            "Created snapshot {} of volume {}",
            snapshot.get("id").and_then(serde_json::Value::as_str).unwrap_or("<no id>"),
            volume_id
        );
        Ok(snapshot)
    }

    pub async fn get_snapshot(&self, snapshot_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(
                &format!("snapshots/{}", snapshot_id),
                &[],
                ("snapshot", snapshot_id),
            )
            .await?;
        self.format.decode("snapshot", &response.body)
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.rest
            .delete(
                &format!("snapshots/{}", snapshot_id),
                ("snapshot", snapshot_id),
            )
            .await?;
        Ok(())
    }

    pub async fn list_snapshots(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get("snapshots", &to_query(filters), ("snapshots", ""))
            .await?;
        self.format
            .decode_list("snapshots", "snapshot", &response.body)
    }

    /// Poll until the snapshot reports `target` status; `error` and
    /// `error_deleting` fail immediately.
    pub async fn wait_for_snapshot_status(
        &self,
        snapshot_id: &str,
        target: &str,
    ) -> Result<Attributes> {
        let what = format!("snapshot {} -> {}", snapshot_id, target);
        let state = poll::wait_until(
            || self.get_snapshot(snapshot_id),
            |attrs| {
                attrs
                    .get("status")
                    .and_then(Value::as_str)
                    .map(|s| s == target || s.starts_with("error"))
                    .unwrap_or(false)
            },
            self.build_interval,
            self.build_timeout,
            &what,
        )
        .await?;

        let status = require_str(&state, "status", "snapshot status poll")?;
        if status != target {
            return Err(HarnessError::UnexpectedStatus {
                resource_type: "snapshot".to_string(),
                resource_id: snapshot_id.to_string(),
                status,
            });
        }
        Ok(state)
    }

    pub async fn wait_for_deletion(&self, snapshot_id: &str) -> Result<()> {
        poll::wait_for_deletion(
            || self.get_snapshot(snapshot_id),
            self.build_interval,
            self.build_timeout,
            &format!("snapshot {}", snapshot_id),
        )
        .await
    }
}
