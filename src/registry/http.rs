//! HTTP registry client
//!
//! Speaks the registry's REST surface: instance registration, lease
//! renewal and full-registry fetches. Keeps an in-memory cache of the
//! last fetched registry for local lookups.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{KestrelError, Result};
use crate::registry::instance::{InstanceInfo, InstanceSnapshot, LeaseInfo};
use crate::registry::RegistryClient;
use crate::settings::Settings;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct RegisterRequest {
    instance: InstanceSnapshot,
}

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    applications: ApplicationsNode,
}

#[derive(Debug, Default, Deserialize)]
struct ApplicationsNode {
    #[serde(default)]
    application: Vec<ApplicationNode>,
}

#[derive(Debug, Deserialize)]
struct ApplicationNode {
    name: String,
    #[serde(default)]
    instance: Vec<InstanceSnapshot>,
}

/// Cached view of the remote registry, keyed by application name
pub type Applications = HashMap<String, Vec<InstanceSnapshot>>;

pub struct HttpRegistryClient {
    http: reqwest::Client,
    registry_url: Url,
    instance: Arc<InstanceInfo>,
    lease_settings: LeaseInfo,
    applications: RwLock<Applications>,
}

impl HttpRegistryClient {
    pub fn new(settings: &Settings, instance: Arc<InstanceInfo>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| KestrelError::Config(format!("http client: {}", err)))?;
        Ok(Self {
            http,
            registry_url: settings.registry_url.clone(),
            instance,
            lease_settings: LeaseInfo {
                renewal_interval_seconds: settings.lease_renewal_seconds,
                duration_seconds: settings.lease_duration_seconds,
            },
            applications: RwLock::new(Applications::new()),
        })
    }

    fn app_url(&self) -> String {
        format!(
            "{}/apps/{}",
            self.registry_url.as_str().trim_end_matches('/'),
            self.instance.app()
        )
    }

    fn instance_url(&self) -> String {
        format!("{}/{}", self.app_url(), self.instance.id())
    }

    fn registry_index_url(&self) -> String {
        format!("{}/apps", self.registry_url.as_str().trim_end_matches('/'))
    }

    /// Instances cached for an application by the last registry fetch.
    pub fn cached_instances(&self, app: &str) -> Vec<InstanceSnapshot> {
        self.applications
            .read()
            .get(app)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of applications in the cached registry view.
    pub fn cached_application_count(&self) -> usize {
        self.applications.read().len()
    }

    fn store_registry(&self, response: RegistryResponse) {
        let mut applications = Applications::new();
        for app in response.applications.application {
            applications.insert(app.name, app.instance);
        }
        let count = applications.len();
        *self.applications.write() = applications;
        debug!(applications = count, "registry cache refreshed");
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn refresh_instance_info(&self) -> Result<()> {
        // Lease terms come from configuration; pushing them through the
        // descriptor dirties it only when they actually changed.
        self.instance.set_lease(self.lease_settings);
        Ok(())
    }

    async fn register(&self) -> Result<()> {
        let snapshot = self.instance.snapshot();
        debug!(instance = %snapshot.id, "registering instance");
        let response = self
            .http
            .post(self.app_url())
            .json(&RegisterRequest { instance: snapshot })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(KestrelError::Registry(format!(
                "registration returned {}",
                response.status()
            )));
        }
        info!(instance = %self.instance.id(), "instance registered");
        Ok(())
    }

    async fn renew(&self) -> Result<()> {
        let response = self.http.put(self.instance_url()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                // The registry lost our lease (expiry, restart). Dirty the
                // descriptor and re-register right away.
                warn!(instance = %self.instance.id(), "lease not found during renewal, re-registering");
                self.instance.mark_dirty();
                self.register().await
            }
            status => Err(KestrelError::Registry(format!(
                "renewal returned {}",
                status
            ))),
        }
    }

    async fn fetch_registry(&self) -> Result<()> {
        let response = self
            .http
            .get(self.registry_index_url())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(KestrelError::Registry(format!(
                "registry fetch returned {}",
                response.status()
            )));
        }
        let parsed: RegistryResponse = response.json().await?;
        self.store_registry(parsed);
        Ok(())
    }
}
