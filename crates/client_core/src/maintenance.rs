//! Request/response side channel for marking direct igniters (un)available.

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::IgniterNr,
    protocol::{AvailabilityRequest, AvailabilityResponse},
};
use tracing::{info, warn};
use url::Url;

use crate::error::MaintenanceError;

#[async_trait]
pub trait MaintenanceApi: Send + Sync {
    /// Resolves to `Ok(())` only when the controller reports success.
    async fn set_available(&self, nr: IgniterNr, available: bool) -> Result<(), MaintenanceError>;
}

pub struct HttpMaintenanceApi {
    http: Client,
    origin: Url,
}

impl HttpMaintenanceApi {
    pub fn new(origin: Url) -> Self {
        Self {
            http: Client::new(),
            origin,
        }
    }

    fn availability_url(&self, nr: IgniterNr) -> Result<Url, MaintenanceError> {
        Ok(self
            .origin
            .join(&format!("/api/direktzuender/{nr}/available"))?)
    }
}

#[async_trait]
impl MaintenanceApi for HttpMaintenanceApi {
    async fn set_available(&self, nr: IgniterNr, available: bool) -> Result<(), MaintenanceError> {
        let url = self.availability_url(nr)?;
        let transport = |source| MaintenanceError::Transport { nr, source };
        let response: AvailabilityResponse = self
            .http
            .post(url)
            .json(&AvailabilityRequest { available })
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?
            .json()
            .await
            .map_err(transport)?;

        if !response.success {
            warn!(%nr, available, "maintenance: controller rejected availability change");
            return Err(MaintenanceError::Rejected(nr));
        }
        info!(%nr, available, "maintenance: availability updated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/maintenance_tests.rs"]
mod tests;
