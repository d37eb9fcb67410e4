//! Stand-in used when the crate is built without the `browser` feature.

use async_trait::async_trait;

use super::config::BrowserEngineConfig;
use super::driver::{DetailPanel, DriverFactory, Listing, PortalDriver, RowHandle, RowKey};
use super::profile::PortalProfile;
use crate::error::{ExtractionError, WorkerFatal};
use crate::models::Target;

const NOT_COMPILED: &str =
    "Browser support not compiled. Rebuild with: cargo build --features browser";

#[derive(Clone)]
pub struct ChromiumDriverFactory;

impl ChromiumDriverFactory {
    pub fn new(_config: BrowserEngineConfig, _profile: PortalProfile) -> Self {
        Self
    }
}

#[async_trait]
impl DriverFactory for ChromiumDriverFactory {
    type Driver = ChromiumPortalDriver;

    async fn launch(&self, _worker_id: usize) -> Result<ChromiumPortalDriver, WorkerFatal> {
        Err(WorkerFatal::BrowserLaunch(NOT_COMPILED.to_string()))
    }
}

pub struct ChromiumPortalDriver;

fn unavailable<T>() -> Result<T, ExtractionError> {
    Err(ExtractionError::NavigationFailed(NOT_COMPILED.to_string()))
}

#[async_trait]
impl PortalDriver for ChromiumPortalDriver {
    async fn load_listing(&mut self, _target: &Target) -> Result<Listing, ExtractionError> {
        unavailable()
    }

    async fn is_attached(&mut self, _row: &RowHandle) -> Result<bool, ExtractionError> {
        unavailable()
    }

    async fn find_row(&mut self, _key: &RowKey) -> Result<Option<RowHandle>, ExtractionError> {
        unavailable()
    }

    async fn open_detail(&mut self, _row: &RowHandle) -> Result<(), ExtractionError> {
        unavailable()
    }

    async fn read_panel(&mut self, _panel: DetailPanel) -> Result<String, ExtractionError> {
        unavailable()
    }

    async fn close_detail(&mut self) -> Result<(), ExtractionError> {
        unavailable()
    }

    async fn shutdown(&mut self) {}
}
