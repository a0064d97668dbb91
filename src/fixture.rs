//! Test fixture lifecycle: setup, tracked resources, best-effort teardown
//!
//! A [`Fixture`] is the class-scoped context a test run works inside:
//! credentials (shared or freshly provisioned), one client per service
//! domain, and an ordered set of every resource created through it. Setup
//! prechecks configuration and referenced images before creating anything,
//! so a run that could never succeed fails fast without leaking state.
//!
//! Teardown is deliberately infallible. It drains the tracked set in two
//! passes over reverse creation order: delete everything, then confirm
//! everything is gone. Each per-resource failure is logged at `warn` and
//! discarded so one stuck resource cannot block cleanup of the rest. The
//! isolated tenant, if one was provisioned, is released last.

use crate::clients::{NetworkClient, ServersClient, SnapshotsClient, VolumesClient};
use crate::config::Config;
use crate::error::{HarnessError, ResourceId, Result};
use crate::identity::{Credentials, IdentityClient, IsolatedTenant};
use crate::wire::Attributes;
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Server,
    Volume,
    Snapshot,
    Network,
    Subnet,
    Port,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Server => "server",
            ResourceKind::Volume => "volume",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::Port => "port",
        };
        f.write_str(name)
    }
}

/// One created resource, as the teardown passes see it.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

#[derive(Debug)]
pub struct Fixture {
    config: Config,
    identity: IdentityClient,
    isolated: Option<IsolatedTenant>,
    pub credentials: Credentials,
    pub tenant_id: String,
    pub servers: ServersClient,
    pub volumes: VolumesClient,
    pub snapshots: SnapshotsClient,
    pub network: NetworkClient,
    /// Effective image/flavor refs after the precheck resolved alternates.
    pub image_ref: String,
    pub image_ref_alt: String,
    pub flavor_ref: String,
    pub flavor_ref_alt: String,
    tracked: Vec<ResourceHandle>,
}

impl Fixture {
    /// Precheck configuration, establish credentials, build clients and
    /// verify referenced images exist. Creates no resources beyond an
    /// isolated tenant when `allow_tenant_isolation` asks for one.
    pub async fn setup(config: Config) -> Result<Self> {
        config.validate()?;
        for (name, available) in [
            ("compute", config.compute.available),
            ("volume", config.volume.available),
            ("network", config.network.available),
        ] {
            if !available {
                return Err(HarnessError::Precheck(format!(
                    "{} service is marked unavailable in configuration",
                    name
                )));
            }
        }

        let identity = IdentityClient::new(&config.identity.auth_url)?;
        let (credentials, isolated) = if config.allow_tenant_isolation {
            let isolated = identity.provision_isolated(&config.identity).await?;
            (isolated.credentials.clone(), Some(isolated))
        } else {
            (Credentials::from(&config.identity), None)
        };

        let token_ctx = match identity.authenticate(&credentials).await {
            Ok(ctx) => ctx,
            Err(e) => {
                release_on_setup_failure(&identity, &config, isolated).await;
                return Err(e);
            }
        };

        let servers = ServersClient::new(
            &config.compute.base_url,
            &token_ctx.token,
            config.interface,
            config.compute.build_interval(),
            config.compute.build_timeout(),
        )?;
        let volumes = VolumesClient::new(
            &config.volume.base_url,
            &token_ctx.token,
            config.interface,
            config.volume.build_interval(),
            config.volume.build_timeout(),
        )?;
        let snapshots = SnapshotsClient::new(
            &config.volume.base_url,
            &token_ctx.token,
            config.interface,
            config.volume.build_interval(),
            config.volume.build_timeout(),
        )?;
        let network = NetworkClient::new(
            &config.network.base_url,
            &token_ctx.token,
            config.interface,
            config.network.build_interval(),
            config.network.build_timeout(),
        )?;

        // Fail early when the configured image is missing; every compute
        // scenario depends on it.
        if let Err(e) = servers.get_image(&config.compute.image_ref).await {
            release_on_setup_failure(&identity, &config, isolated).await;
            return Err(match e {
                HarnessError::NotFound { .. } => HarnessError::Precheck(format!(
                    "image {} (compute.image_ref) was not found",
                    config.compute.image_ref
                )),
                other => other,
            });
        }

        // The alternate image is optional: degrade to the primary when it
        // is unset or absent on this deployment.
        let image_ref = config.compute.image_ref.clone();
        let image_ref_alt = match &config.compute.image_ref_alt {
            Some(alt) if alt != &image_ref => match servers.get_image(alt).await {
                Ok(_) => alt.clone(),
                Err(e) if e.is_not_found() => {
                    warn!("Alternate image {} not found, reusing {}", alt, image_ref);
                    image_ref.clone()
                }
                Err(e) => {
                    release_on_setup_failure(&identity, &config, isolated).await;
                    return Err(e);
                }
            },
            _ => image_ref.clone(),
        };
        let flavor_ref = config.compute.flavor_ref.clone();
        let flavor_ref_alt = config
            .compute
            .flavor_ref_alt
            .clone()
            .unwrap_or_else(|| flavor_ref.clone());

        info!(
            "Fixture ready (tenant {}, interface {:?})",
            token_ctx.tenant_id, config.interface
        );
        Ok(Self {
            config,
            identity,
            isolated,
            credentials,
            tenant_id: token_ctx.tenant_id,
            servers,
            volumes,
            snapshots,
            network,
            image_ref,
            image_ref_alt,
            flavor_ref,
            flavor_ref_alt,
            tracked: Vec::new(),
        })
    }

    pub fn tracked(&self) -> &[ResourceHandle] {
        &self.tracked
    }

    fn track(&mut self, kind: ResourceKind, id: &str) {
        self.tracked.push(ResourceHandle {
            kind,
            id: id.to_string(),
        });
    }

    /// Create a server, track it, and block until it is ACTIVE.
    ///
    /// The handle is tracked before the status wait so teardown cleans up a
    /// server that never finished building.
    pub async fn create_server(
        &mut self,
        name: Option<&str>,
        image_ref: Option<&str>,
        flavor_ref: Option<&str>,
    ) -> Result<Attributes> {
        let image = image_ref.unwrap_or(&self.image_ref).to_string();
        let flavor = flavor_ref.unwrap_or(&self.flavor_ref).to_string();
        let server = self.servers.create_server(name, &image, &flavor).await?;
        let id = require_id(&server, "server")?;
        self.track(ResourceKind::Server, &id);
        self.servers.wait_for_server_status(&id, "ACTIVE").await
    }

    /// Create a volume, track it, and block until it is `available`.
    pub async fn create_volume(&mut self, size: u64, extra: Attributes) -> Result<Attributes> {
        let volume = self.volumes.create_volume(size, extra).await?;
        let id = require_id(&volume, "volume")?;
        self.track(ResourceKind::Volume, &id);
        self.volumes.wait_for_volume_status(&id, "available").await
    }

    /// Snapshot a volume, track it, and block until it is `available`.
    pub async fn create_snapshot(
        &mut self,
        volume_id: &str,
        extra: Attributes,
    ) -> Result<Attributes> {
        let snapshot = self.snapshots.create_snapshot(volume_id, extra).await?;
        let id = require_id(&snapshot, "snapshot")?;
        self.track(ResourceKind::Snapshot, &id);
        self.snapshots
            .wait_for_snapshot_status(&id, "available")
            .await
    }

    pub async fn create_network(&mut self, name: Option<&str>) -> Result<Attributes> {
        let network = self.network.create_network(name).await?;
        let id = require_id(&network, "network")?;
        self.track(ResourceKind::Network, &id);
        Ok(network)
    }

    pub async fn create_subnet(&mut self, network_id: &str, cidr: &str) -> Result<Attributes> {
        let subnet = self.network.create_subnet(network_id, cidr).await?;
        let id = require_id(&subnet, "subnet")?;
        self.track(ResourceKind::Subnet, &id);
        Ok(subnet)
    }

    pub async fn create_port(&mut self, network_id: &str) -> Result<Attributes> {
        let port = self.network.create_port(network_id, true).await?;
        let id = require_id(&port, "port")?;
        self.track(ResourceKind::Port, &id);
        Ok(port)
    }

    /// Best-effort cleanup of every tracked resource, then the isolated
    /// tenant. Never fails; every discarded error is logged.
    pub async fn teardown(&mut self) {
        let tracked = std::mem::take(&mut self.tracked);
        info!("Teardown: {} tracked resource(s)", tracked.len());

        // Pass 1: ask the service to delete everything, newest first so
        // dependents (ports, subnets) go before what they depend on.
        for handle in tracked.iter().rev() {
            if let Err(e) = self.delete_resource(handle).await {
                warn!("Teardown: delete of {} {} failed: {}", handle.kind, handle.id, e);
            }
        }

        // Pass 2: confirm each is gone; a resource stuck in deleting gets
        // logged, not retried forever.
        for handle in tracked.iter().rev() {
            if let Err(e) = self.confirm_gone(handle).await {
                warn!(
                    "Teardown: {} {} not confirmed deleted: {}",
                    handle.kind, handle.id, e
                );
            }
        }

        if let Some(isolated) = self.isolated.take() {
            if let Err(e) = self
                .identity
                .release_isolated(&self.config.identity, isolated)
                .await
            {
                warn!("Teardown: failed to release isolated tenant: {}", e);
            }
        }
    }

    async fn delete_resource(&self, handle: &ResourceHandle) -> Result<()> {
        let result = match handle.kind {
            ResourceKind::Server => self.servers.delete_server(&handle.id).await,
            ResourceKind::Volume => self.volumes.delete_volume(&handle.id).await,
            ResourceKind::Snapshot => self.snapshots.delete_snapshot(&handle.id).await,
            ResourceKind::Network => self.network.delete_network(&handle.id).await,
            ResourceKind::Subnet => self.network.delete_subnet(&handle.id).await,
            ResourceKind::Port => self.network.delete_port(&handle.id).await,
        };
        match result {
            // already gone counts as deleted
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn confirm_gone(&self, handle: &ResourceHandle) -> Result<()> {
        match handle.kind {
            ResourceKind::Server => self.servers.wait_for_deletion(&handle.id).await,
            ResourceKind::Volume => self.volumes.wait_for_deletion(&handle.id).await,
            ResourceKind::Snapshot => self.snapshots.wait_for_deletion(&handle.id).await,
            ResourceKind::Network => self.network.wait_for_network_deletion(&handle.id).await,
            ResourceKind::Subnet => self.network.wait_for_subnet_deletion(&handle.id).await,
            ResourceKind::Port => self.network.wait_for_port_deletion(&handle.id).await,
        }
    }
}

async fn release_on_setup_failure(
    identity: &IdentityClient,
    config: &Config,
    isolated: Option<IsolatedTenant>,
) {
    if let Some(isolated) = isolated {
        if let Err(e) = identity
            .release_isolated(&config.identity, isolated)
            .await
        {
            warn!("Failed to release isolated tenant after setup failure: {}", e);
        }
    }
}

fn require_id(attrs: &Attributes, resource_type: &str) -> Result<ResourceId> {
    attrs
        .get("id")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| {
            HarnessError::BadBody(format!("{} create response carried no id", resource_type))
        })
}
