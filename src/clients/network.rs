//! Networking client
//!
//! v2.0 of the networking API: create, delete, show, list and rename for the
//! three basic abstractions (networks, sub-networks and ports), plus show,
//! update, reset and list for per-tenant quotas.

use super::{rand_name, to_query};
use crate::error::Result;
use crate::poll;
use crate::rest::RestClient;
use crate::wire::{Attributes, WireFormat};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::info;

const URI_PREFIX: &str = "v2.0";

#[derive(Debug)]
pub struct NetworkClient {
    rest: RestClient,
    format: WireFormat,
    build_interval: Duration,
    build_timeout: Duration,
}

impl NetworkClient {
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

    // Networks

    pub async fn create_network(&self, name: Option<&str>) -> Result<Attributes> {
        let name = name.map(str::to_string).unwrap_or_else(|| rand_name("network"));
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(name.clone()));

        let payload = self.format.encode("network", &body)?;
        let response = self
            .rest
            .post(
                &format!("{}/networks", URI_PREFIX),
                self.format.content_type(),
                payload,
                ("network", &name),
            )
            .await?;
        let network = self.format.decode("network", &response.body)?;
        info!("Created network {}", name);
        Ok(network)
    }

    pub async fn show_network(&self, network_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(
                &format!("{}/networks/{}", URI_PREFIX, network_id),
                &[],
                ("network", network_id),
            )
            .await?;
        self.format.decode("network", &response.body)
    }

    pub async fn delete_network(&self, network_id: &str) -> Result<()> {
        self.rest
            .delete(
                &format!("{}/networks/{}", URI_PREFIX, network_id),
                ("network", network_id),
            )
            .await?;
        Ok(())
    }

    pub async fn list_networks(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get(
                &format!("{}/networks", URI_PREFIX),
                &to_query(filters),
                ("networks", ""),
            )
            .await?;
        self.format
            .decode_list("networks", "network", &response.body)
    }

    pub async fn update_network(&self, network_id: &str, new_name: &str) -> Result<Attributes> {
        self.rename("networks", "network", network_id, new_name).await
    }

    // Subnets

    pub async fn create_subnet(&self, network_id: &str, cidr: &str) -> Result<Attributes> {
        let mut body = Map::new();
        body.insert("ip_version".to_string(), Value::Number(4.into()));
        body.insert(
            "network_id".to_string(),
            Value::String(network_id.to_string()),
        );
        body.insert("cidr".to_string(), Value::String(cidr.to_string()));

        let payload = self.format.encode("subnet", &body)?;
        let response = self
            .rest
            .post(
                &format!("{}/subnets", URI_PREFIX),
                self.format.content_type(),
                payload,
                ("subnet", ""),
            )
            .await?;
        let subnet = self.format.decode("subnet", &response.body)?;
        info!("Created subnet {} on network {}", cidr, network_id);
        Ok(subnet)
    }

    pub async fn show_subnet(&self, subnet_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(
                &format!("{}/subnets/{}", URI_PREFIX, subnet_id),
                &[],
                ("subnet", subnet_id),
            )
            .await?;
        self.format.decode("subnet", &response.body)
    }

    pub async fn delete_subnet(&self, subnet_id: &str) -> Result<()> {
        self.rest
            .delete(
                &format!("{}/subnets/{}", URI_PREFIX, subnet_id),
                ("subnet", subnet_id),
            )
            .await?;
        Ok(())
    }

    pub async fn list_subnets(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get(
                &format!("{}/subnets", URI_PREFIX),
                &to_query(filters),
                ("subnets", ""),
            )
            .await?;
        self.format.decode_list("subnets", "subnet", &response.body)
    }

    pub async fn update_subnet(&self, subnet_id: &str, new_name: &str) -> Result<Attributes> {
        self.rename("subnets", "subnet", subnet_id, new_name).await
    }

    // Ports

    pub async fn create_port(&self, network_id: &str, admin_state_up: bool) -> Result<Attributes> {
        let mut body = Map::new();
        body.insert(
            "network_id".to_string(),
            Value::String(network_id.to_string()),
        );
        body.insert("admin_state_up".to_string(), Value::Bool(admin_state_up));

        let payload = self.format.encode("port", &body)?;
        let response = self
            .rest
            .post(
                &format!("{}/ports", URI_PREFIX),
                self.format.content_type(),
                payload,
                ("port", ""),
            )
            .await?;
        let port = self.format.decode("port", &response.body)?;
        info!("Created port on network {}", network_id);
        Ok(port)
    }

    pub async fn show_port(&self, port_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(
                &format!("{}/ports/{}", URI_PREFIX, port_id),
                &[],
                ("port", port_id),
            )
            .await?;
        self.format.decode("port", &response.body)
    }

    pub async fn delete_port(&self, port_id: &str) -> Result<()> {
        self.rest
            .delete(&format!("{}/ports/{}", URI_PREFIX, port_id), ("port", port_id))
            .await?;
        Ok(())
    }

    pub async fn list_ports(&self, filters: &[(&str, &str)]) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get(
                &format!("{}/ports", URI_PREFIX),
                &to_query(filters),
                ("ports", ""),
            )
            .await?;
        self.format.decode_list("ports", "port", &response.body)
    }

    pub async fn update_port(&self, port_id: &str, new_name: &str) -> Result<Attributes> {
        self.rename("ports", "port", port_id, new_name).await
    }

    // Quotas

    /// Set per-tenant quota values; returns the quota map the service
    /// reports back.
    pub async fn update_quotas(
        &self,
        tenant_id: &str,
        quotas: Attributes,
    ) -> Result<Attributes> {
        let payload = self.format.encode("quota", &quotas)?;
        let response = self
            .rest
            .put(
                &format!("{}/quotas/{}", URI_PREFIX, tenant_id),
                self.format.content_type(),
                payload,
                ("quota", tenant_id),
            )
            .await?;
        self.format.decode("quota", &response.body)
    }

    pub async fn show_quotas(&self, tenant_id: &str) -> Result<Attributes> {
        let response = self
            .rest
            .get(
                &format!("{}/quotas/{}", URI_PREFIX, tenant_id),
                &[],
                ("quota", tenant_id),
            )
            .await?;
        self.format.decode("quota", &response.body)
    }

    /// Reset the tenant's quotas back to defaults.
    pub async fn reset_quotas(&self, tenant_id: &str) -> Result<()> {
        self.rest
            .delete(
                &format!("{}/quotas/{}", URI_PREFIX, tenant_id),
                ("quota", tenant_id),
            )
            .await?;
        Ok(())
    }

    pub async fn list_quotas(&self) -> Result<Vec<Attributes>> {
        let response = self
            .rest
            .get(&format!("{}/quotas", URI_PREFIX), &[], ("quotas", ""))
            .await?;
        self.format.decode_list("quotas", "quota", &response.body)
    }

    // Deletion polling for the fixture teardown

    pub async fn wait_for_network_deletion(&self, network_id: &str) -> Result<()> {
        poll::wait_for_deletion(
            || self.show_network(network_id),
            self.build_interval,
            self.build_timeout,
            &format!("network {}", network_id),
        )
        .await
    }

    pub async fn wait_for_subnet_deletion(&self, subnet_id: &str) -> Result<()> {
        poll::wait_for_deletion(
            || self.show_subnet(subnet_id),
            self.build_interval,
            self.build_timeout,
            &format!("subnet {}", subnet_id),
        )
        .await
    }

    pub async fn wait_for_port_deletion(&self, port_id: &str) -> Result<()> {
        poll::wait_for_deletion(
            || self.show_port(port_id),
            self.build_interval,
            self.build_timeout,
            &format!("port {}", port_id),
        )
        .await
    }

    async fn rename(
        &self,
        collection: &str,
        root: &str,
        id: &str,
        new_name: &str,
    ) -> Result<Attributes> {
        let mut body = Map::new();
        body.insert("name".to_string(), Value::String(new_name.to_string()));
        let payload = self.format.encode(root, &body)?;
        let response = self
            .rest
            .put(
                &format!("{}/{}/{}", URI_PREFIX, collection, id),
                self.format.content_type(),
                payload,
                (root, id),
            )
            .await?;
        self.format.decode(root, &response.body)
    }
}
