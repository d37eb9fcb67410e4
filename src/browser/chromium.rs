//! chromiumoxide-backed portal driver.
//!
//! Each worker gets its own browser process (or its own page on a remote
//! browser) and drives it strictly sequentially.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams, RequestId,
    SetUserAgentOverrideParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::BrowserEngineConfig;
use super::driver::{DetailPanel, DriverFactory, Listing, ListingBody, PortalDriver, RowHandle, RowKey};
use super::profile::PortalProfile;
use super::wait::poll_until;
use crate::error::{ExtractionError, WorkerFatal};
use crate::models::Target;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Find a Chrome executable on disk or in PATH.
pub fn find_chrome() -> Option<PathBuf> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            debug!("Found Chrome at: {}", path);
            return Some(p.to_path_buf());
        }
    }
    CHROME_COMMANDS.iter().find_map(|cmd| which::which(cmd).ok())
}

/// Quote a string as a JavaScript literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// JavaScript predicate over a row element, mirroring [`RowKey::matches`].
fn row_matcher_js(key: &RowKey) -> String {
    format!(
        r#"(r) => {{
            const cells = Array.from(r.cells || r.querySelectorAll('td'))
                .map(td => (td.innerText || td.textContent || '').trim());
            return cells.includes({process}) && cells.includes({organization});
        }}"#,
        process = js_str(&key.process_number),
        organization = js_str(&key.organization)
    )
}

fn nav_error(e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::NavigationFailed(e.to_string())
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

/// Launches one browser session per worker.
#[derive(Clone)]
pub struct ChromiumDriverFactory {
    config: Arc<BrowserEngineConfig>,
    profile: Arc<PortalProfile>,
}

impl ChromiumDriverFactory {
    pub fn new(config: BrowserEngineConfig, profile: PortalProfile) -> Self {
        Self {
            config: Arc::new(config),
            profile: Arc::new(profile),
        }
    }

    async fn launch_local(
        &self,
        worker_id: usize,
    ) -> Result<(Browser, chromiumoxide::Handler), WorkerFatal> {
        let chrome_path = match &self.config.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().ok_or_else(|| {
                WorkerFatal::BrowserLaunch(
                    "Chrome/Chromium not found. Install it or set browser.chrome_path".to_string(),
                )
            })?,
        };

        // Concurrent launches must not share a profile directory.
        let user_data_dir = std::env::temp_dir().join(format!(
            "bidharvest-{}-worker-{}",
            std::process::id(),
            worker_id
        ));

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(user_data_dir)
            .request_timeout(self.config.navigation_timeout());

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(WorkerFatal::BrowserLaunch)?;

        Browser::launch(config)
            .await
            .map_err(|e| WorkerFatal::BrowserLaunch(e.to_string()))
    }

    async fn connect_remote(
        &self,
        url: &str,
    ) -> Result<(Browser, chromiumoxide::Handler), WorkerFatal> {
        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| WorkerFatal::BrowserLaunch(format!("remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| WorkerFatal::BrowserLaunch(format!("remote browser version: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                WorkerFatal::BrowserLaunch("No webSocketDebuggerUrl in response".to_string())
            })?;

        debug!("Connecting to WebSocket: {}", ws_url);
        Browser::connect(ws_url)
            .await
            .map_err(|e| WorkerFatal::BrowserLaunch(e.to_string()))
    }
}

#[async_trait]
impl DriverFactory for ChromiumDriverFactory {
    type Driver = ChromiumPortalDriver;

    async fn launch(&self, worker_id: usize) -> Result<ChromiumPortalDriver, WorkerFatal> {
        let owns_browser = self.config.remote_url.is_none();
        let (mut browser, handler) = match &self.config.remote_url {
            Some(url) => {
                info!("Worker {} connecting to remote browser at {}", worker_id, url);
                self.connect_remote(url).await?
            }
            None => {
                info!(
                    "Worker {} launching browser (headless={})",
                    worker_id, self.config.headless
                );
                self.launch_local(worker_id).await?
            }
        };
        let handler = spawn_handler(handler);

        let page = match Self::prepare_page(&browser, &self.config.user_agent).await {
            Ok(page) => page,
            Err(e) => {
                if owns_browser {
                    let _ = browser.close().await;
                }
                handler.abort();
                return Err(e);
            }
        };

        Ok(ChromiumPortalDriver {
            browser,
            page,
            handler,
            owns_browser,
            config: self.config.clone(),
            profile: self.profile.clone(),
            generation: 0,
        })
    }
}

impl ChromiumDriverFactory {
    async fn prepare_page(browser: &Browser, user_agent: &str) -> Result<Page, WorkerFatal> {
        let fatal = |e: chromiumoxide::error::CdpError| WorkerFatal::BrowserLaunch(e.to_string());
        let page = browser.new_page("about:blank").await.map_err(fatal)?;
        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(fatal)?;
        page.execute(EnableParams::default()).await.map_err(fatal)?;
        Ok(page)
    }
}

/// Result of activating a detail tab.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabActivation {
    found: bool,
    was_active: bool,
}

pub struct ChromiumPortalDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    owns_browser: bool,
    config: Arc<BrowserEngineConfig>,
    profile: Arc<PortalProfile>,
    generation: u64,
}

impl ChromiumPortalDriver {
    async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T, ExtractionError> {
        self.page
            .evaluate(js)
            .await
            .map_err(nav_error)?
            .into_value::<T>()
            .map_err(|e| ExtractionError::ParseFailed(format!("script result: {}", e)))
    }

    /// Poll a boolean script until it returns true.
    async fn wait_for_script(&self, js: &str, within: Duration) -> bool {
        let this = self;
        poll_until(within, self.config.poll_interval(), move || async move {
            this.eval::<bool>(js.to_string()).await.ok().filter(|v| *v)
        })
        .await
        .is_some()
    }

    async fn click_menu(&self, label: &str) -> Result<(), ExtractionError> {
        let js = format!(
            r#"(() => {{
                const label = {label};
                const link = Array.from(document.querySelectorAll('a'))
                    .find(el => (el.textContent || '').includes(label));
                if (!link) return false;
                link.click();
                return true;
            }})()"#,
            label = js_str(label)
        );
        if self.wait_for_script(&js, self.config.navigation_timeout()).await {
            debug!("Clicked menu link '{}'", label);
            Ok(())
        } else {
            Err(ExtractionError::NavigationFailed(format!(
                "Menu link not found: {}",
                label
            )))
        }
    }

    async fn response_body(&self, request_id: &RequestId) -> Option<Vec<u8>> {
        let reply = self
            .page
            .execute(GetResponseBodyParams::new(request_id.clone()))
            .await
            .ok()?;
        let body = &reply.result;
        if body.base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(body.body.as_bytes())
                .ok()
        } else {
            Some(body.body.clone().into_bytes())
        }
    }

    async fn rendered_rows(&self) -> Result<Vec<Vec<String>>, ExtractionError> {
        let js = format!(
            r#"Array.from(document.querySelectorAll({rows})).map(r =>
                Array.from(r.querySelectorAll('td')).map(td => (td.innerText || td.textContent || '').trim()))"#,
            rows = js_str(&self.profile.row_selector)
        );
        self.eval(js).await
    }

    fn visible_detail_js(&self) -> String {
        format!(
            r#"Array.from(document.querySelectorAll({sel})).find(el => el.offsetParent !== null)"#,
            sel = js_str(&self.profile.detail_selector)
        )
    }

    async fn active_panel_html(&self) -> Result<Option<String>, ExtractionError> {
        let js = format!(
            r#"(() => {{
                const win = {win};
                if (!win) return null;
                const panel = Array.from(win.querySelectorAll({panel}))
                    .find(el => el.offsetParent !== null);
                const html = (panel || win).innerHTML;
                return html && html.trim().length ? html : null;
            }})()"#,
            win = self.visible_detail_js(),
            panel = js_str(&self.profile.active_panel_selector)
        );
        self.eval(js).await
    }
}

#[async_trait]
impl PortalDriver for ChromiumPortalDriver {
    async fn load_listing(&mut self, target: &Target) -> Result<Listing, ExtractionError> {
        let url = target.endpoint(&self.profile.listing_path);
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(nav_error)?;

        debug!("Navigating to {}", url);
        match timeout(self.config.navigation_timeout(), self.page.goto(url.as_str())).await {
            Err(_) => return Err(ExtractionError::Timeout),
            Ok(Err(e)) => return Err(nav_error(e)),
            Ok(Ok(_)) => {}
        }

        for label in self.profile.menu_labels.clone() {
            self.click_menu(&label).await?;
        }

        let profile = self.profile.clone();
        let data_response = timeout(self.config.data_timeout(), async {
            while let Some(event) = responses.next().await {
                if event.response.status == 200 && profile.is_listing_response(&event.response.url)
                {
                    return Some(event.request_id.clone());
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        self.generation += 1;

        let Some(request_id) = data_response else {
            let rows = self.rendered_rows().await.unwrap_or_default();
            if rows.is_empty() {
                return Err(ExtractionError::Timeout);
            }
            warn!(
                "No data response from {}, using {} rendered rows",
                target.display_name,
                rows.len()
            );
            return Ok(Listing {
                generation: self.generation,
                body: ListingBody::Rendered(rows),
            });
        };

        let this = &*self;
        let request_id = &request_id;
        let body = poll_until(this.config.data_timeout(), this.config.poll_interval(), move || {
            this.response_body(request_id)
        })
        .await
        .ok_or(ExtractionError::Timeout)?;

        let json: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ExtractionError::ParseFailed(format!("listing response: {}", e)))?;

        Ok(Listing {
            generation: self.generation,
            body: ListingBody::Json(json),
        })
    }

    async fn is_attached(&mut self, row: &RowHandle) -> Result<bool, ExtractionError> {
        if row.generation != self.generation {
            return Ok(false);
        }
        let js = format!(
            r#"(() => {{
                const matches = {matches};
                const row = document.querySelectorAll({rows})[{index}];
                return !!row && row.isConnected && matches(row);
            }})()"#,
            matches = row_matcher_js(&row.key),
            rows = js_str(&self.profile.row_selector),
            index = row.index
        );
        self.eval(js).await
    }

    async fn find_row(&mut self, key: &RowKey) -> Result<Option<RowHandle>, ExtractionError> {
        let js = format!(
            r#"(() => {{
                const matches = {matches};
                return Array.from(document.querySelectorAll({rows})).findIndex(matches);
            }})()"#,
            matches = row_matcher_js(key),
            rows = js_str(&self.profile.row_selector)
        );
        let index: i64 = self.eval(js).await?;
        Ok(usize::try_from(index).ok().map(|index| RowHandle {
            index,
            key: key.clone(),
            generation: self.generation,
        }))
    }

    async fn open_detail(&mut self, row: &RowHandle) -> Result<(), ExtractionError> {
        let js = format!(
            r#"(() => {{
                const row = document.querySelectorAll({rows})[{index}];
                if (!row) return false;
                const cell = row.querySelector('td') || row;
                cell.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }}));
                cell.dispatchEvent(new MouseEvent({event}, {{ bubbles: true, cancelable: true, view: window }}));
                return true;
            }})()"#,
            rows = js_str(&self.profile.row_selector),
            index = row.index,
            event = js_str(self.profile.row_activation.event_name())
        );
        if !self.eval::<bool>(js).await? {
            return Err(ExtractionError::NavigationFailed(format!(
                "Row {} is no longer rendered",
                row.key
            )));
        }

        let visible = format!("!!({})", self.visible_detail_js());
        if self.wait_for_script(&visible, self.config.navigation_timeout()).await {
            Ok(())
        } else {
            Err(ExtractionError::Timeout)
        }
    }

    async fn read_panel(&mut self, panel: DetailPanel) -> Result<String, ExtractionError> {
        let before = self.active_panel_html().await?.unwrap_or_default();
        let label = self.profile.panel_label(panel).to_string();
        let js = format!(
            r#"(() => {{
                const win = {win};
                if (!win) return {{ found: false, wasActive: false }};
                const tab = Array.from(win.querySelectorAll({tabs}))
                    .find(el => (el.textContent || '').includes({label}));
                if (!tab) return {{ found: false, wasActive: false }};
                const item = tab.closest('li, .x-tab') || tab;
                const wasActive = /active|x-tab-strip-active/.test(item.className || '');
                (tab.closest('a') || tab).dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }}));
                return {{ found: true, wasActive }};
            }})()"#,
            win = self.visible_detail_js(),
            tabs = js_str(&self.profile.tab_selector),
            label = js_str(&label)
        );
        let activation: TabActivation = self.eval(js).await?;
        if !activation.found {
            return Err(ExtractionError::NavigationFailed(format!(
                "Detail panel '{}' not found",
                label
            )));
        }

        let this = &*self;
        let before = before.as_str();
        let was_active = activation.was_active;
        let switched = poll_until(
            this.config.navigation_timeout(),
            this.config.poll_interval(),
            move || async move {
                match this.active_panel_html().await {
                    Ok(Some(html)) if was_active || html != before => Some(html),
                    _ => None,
                }
            },
        )
        .await;

        match switched {
            Some(html) => Ok(html),
            // Some panels render identical chrome; take what is shown.
            None => self
                .active_panel_html()
                .await?
                .ok_or(ExtractionError::Timeout),
        }
    }

    async fn close_detail(&mut self) -> Result<(), ExtractionError> {
        let js = format!(
            r#"(() => {{
                const win = {win};
                if (!win) return true;
                const close = win.querySelector({close});
                if (!close) return false;
                close.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }}));
                return true;
            }})()"#,
            win = self.visible_detail_js(),
            close = js_str(&self.profile.close_selector)
        );
        if !self.eval::<bool>(js).await? {
            return Err(ExtractionError::NavigationFailed(
                "Detail close control not found".to_string(),
            ));
        }

        let hidden = format!("!({})", self.visible_detail_js());
        if self.wait_for_script(&hidden, self.config.navigation_timeout()).await {
            Ok(())
        } else {
            Err(ExtractionError::Timeout)
        }
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("Page close failed: {}", e);
        }
        if self.owns_browser {
            if let Err(e) = self.browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            let _ = self.browser.wait().await;
        }
        self.handler.abort();
    }
}
