//! Browser automation for portal sessions.
//!
//! The extraction engine only sees the [`PortalDriver`] trait; the
//! chromiumoxide implementation lives behind the `browser` feature.

mod config;
mod driver;
mod profile;
mod wait;

#[cfg(feature = "browser")]
mod chromium;
#[cfg(not(feature = "browser"))]
mod unavailable;

pub use config::{BrowserEngineConfig, DEFAULT_USER_AGENT};
pub use driver::{
    DetailPanel, DriverFactory, Listing, ListingBody, PortalDriver, RowHandle, RowKey,
};
pub use profile::{PanelLabels, PortalProfile, RowActivation};
pub use wait::poll_until;

#[cfg(feature = "browser")]
pub use chromium::{find_chrome, ChromiumDriverFactory, ChromiumPortalDriver};
#[cfg(not(feature = "browser"))]
pub use unavailable::{ChromiumDriverFactory, ChromiumPortalDriver};
