//! Headless Chrome session driven over the DevTools protocol.
//!
//! Backtracking replays the click path that first produced a state, starting
//! from a fresh load of the entry page, then verifies the fingerprint.

use crate::error::{Result, ScanError};
use crate::navigator::{Navigator, ReplayLog};
use crate::snapshot::{ElementHandle, Fingerprint, InteractiveElement, PageSnapshot, SnapshotExtractor};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use chromiumoxide::element::Element;
use futures::StreamExt as _;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// How long to let the page settle after a load or click before capturing it.
    pub settle: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            settle: DEFAULT_SETTLE,
        }
    }
}

pub struct ChromeNavigator {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    start_url: String,
    extractor: SnapshotExtractor,
    settle: Duration,
    replay: ReplayLog,
    current: Option<Fingerprint>,
}

impl ChromeNavigator {
    /// Launch Chrome and open `start_url` in a fresh tab.
    pub async fn launch(
        start_url: &str,
        options: ChromeOptions,
        extractor: SnapshotExtractor,
    ) -> Result<Self> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        if !options.headless {
            builder = builder.with_head().window_size(1280, 900);
        }
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| ScanError::Browser(format!("failed to build browser config: {}", e)))?;

        info!("Launching Chrome (headless: {})", options.headless);

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScanError::Browser(format!("failed to launch browser: {}", e)))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page(start_url)
            .await
            .map_err(|e| ScanError::Navigation(format!("failed to open {}: {}", start_url, e)))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ScanError::Navigation(format!("failed to load {}: {}", start_url, e)))?;
        tokio::time::sleep(options.settle).await;

        Ok(Self {
            browser,
            page,
            handler_task,
            start_url: start_url.to_string(),
            extractor,
            settle: options.settle,
            replay: ReplayLog::new(),
            current: None,
        })
    }

    /// Close the browser and stop the event handler.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close returned error: {}", e);
        }
        self.handler_task.abort();
        debug!("Browser closed");
    }

    async fn capture(&self, depth: usize) -> Result<PageSnapshot> {
        let html = self
            .page
            .content()
            .await
            .map_err(|e| ScanError::Browser(format!("failed to read page content: {}", e)))?;
        let url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| self.start_url.clone());

        self.extractor.extract(&html, &url, depth)
    }

    async fn locate(&self, handle: &ElementHandle) -> Result<Element> {
        self.page
            .find_element(handle.as_str())
            .await
            .map_err(|e| ScanError::Navigation(format!("element {} not found: {}", handle, e)))
    }

    async fn press(&self, element: &Element, handle: &ElementHandle) -> Result<()> {
        // Off-screen elements reject clicks; a failed scroll is not fatal.
        if let Err(e) = element.scroll_into_view().await {
            debug!("scroll_into_view failed for {}: {}", handle, e);
        }

        element
            .click()
            .await
            .map_err(|e| ScanError::Navigation(format!("click on {} failed: {}", handle, e)))?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn click(&self, handle: &ElementHandle) -> Result<()> {
        let element = self.locate(handle).await?;
        self.press(&element, handle).await
    }
}

#[async_trait]
impl Navigator for ChromeNavigator {
    async fn current_snapshot(&mut self, depth: usize) -> Result<PageSnapshot> {
        let snapshot = self.capture(depth).await?;
        if self.replay.is_empty() {
            self.replay.record_root(snapshot.fingerprint());
        }
        self.current = Some(snapshot.fingerprint().clone());
        Ok(snapshot)
    }

    async fn interact(
        &mut self,
        element: &InteractiveElement,
        depth: usize,
    ) -> Result<PageSnapshot> {
        let origin = self.current.clone();

        // A stale element leaves the page untouched. Once the click is
        // attempted the page may have changed, even on error.
        let target = self.locate(&element.handle).await?;
        if let Err(e) = self.press(&target, &element.handle).await {
            self.current = None;
            return Err(e);
        }

        let snapshot = self.capture(depth).await.inspect_err(|_| self.current = None)?;
        if let Some(origin) = &origin {
            self.replay
                .record_step(origin, &element.handle, snapshot.fingerprint());
        }
        self.current = Some(snapshot.fingerprint().clone());

        debug!(
            "Clicked '{}' -> {} ({})",
            element.label,
            snapshot.fingerprint().short(),
            snapshot.url()
        );
        Ok(snapshot)
    }

    async fn restore_to(&mut self, fingerprint: &Fingerprint) -> Result<()> {
        if self.current.as_ref() == Some(fingerprint) {
            return Ok(());
        }

        let path = self
            .replay
            .path_to(fingerprint)
            .ok_or_else(|| ScanError::Restore(format!("no known path to {}", fingerprint.short())))?
            .to_vec();

        debug!("Replaying {} clicks to reach {}", path.len(), fingerprint.short());
        self.reset().await?;
        for handle in &path {
            self.click(handle).await.map_err(|e| {
                self.current = None;
                ScanError::Restore(format!("replay to {} failed: {}", fingerprint.short(), e))
            })?;
        }

        let reached = self.capture(path.len()).await?;
        if reached.fingerprint() != fingerprint {
            self.current = Some(reached.fingerprint().clone());
            return Err(ScanError::Restore(format!(
                "replay to {} landed on {}",
                fingerprint.short(),
                reached.fingerprint().short()
            )));
        }

        self.current = Some(fingerprint.clone());
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.current = None;
        self.page
            .goto(self.start_url.as_str())
            .await
            .map_err(|e| ScanError::Restore(format!("reload of {} failed: {}", self.start_url, e)))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| ScanError::Restore(format!("reload of {} failed: {}", self.start_url, e)))?;
        tokio::time::sleep(self.settle).await;

        let root = self.capture(0).await?;
        self.current = Some(root.fingerprint().clone());
        Ok(())
    }

    fn invalidate(&mut self) {
        self.current = None;
    }
}
