use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Event-stream path the dev server exposes.
pub const DEV_BRIDGE_EVENTS_PATH: &str = "/__quick-app-hmr";
/// Replacement source text path the dev server exposes.
pub const DEV_BRIDGE_SOURCE_PATH: &str = "/app.md";

const DEV_BRIDGE_BACKOFF_MS_DEFAULT: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// One change-notification event emitted by the dev server.
pub struct DevReloadEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub file: Option<String>,
}

/// Development bridge: subscribes to the dev server's change-notification
/// channel and, on a reload signal, fetches replacement source text and
/// hands it to the reload handler. Reconnection after a dropped channel is
/// automatic with a fixed backoff delay; starting an already running bridge
/// never duplicates the subscription.
pub struct DevBridge {
    dev_server_url: String,
    backoff: Duration,
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl DevBridge {
    pub fn new(dev_server_url: &str) -> Self {
        Self {
            dev_server_url: dev_server_url.trim_end_matches('/').to_string(),
            backoff: Duration::from_millis(DEV_BRIDGE_BACKOFF_MS_DEFAULT),
            stop: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Starts the subscription loop. The handler receives each reload event
    /// together with freshly fetched replacement source text. Calling start
    /// while the bridge is running is a no-op.
    pub fn start<H, Fut>(&mut self, mut handler: H)
    where
        H: FnMut(DevReloadEvent, String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send,
    {
        if self.is_running() {
            debug!("dev bridge already subscribed, ignoring duplicate start");
            return;
        }
        self.stop.store(false, Ordering::Relaxed);
        let dev_server_url = self.dev_server_url.clone();
        let backoff = self.backoff;
        let stop = Arc::clone(&self.stop);
        info!(dev_server_url = %dev_server_url, "dev bridge subscribing");
        self.task = Some(tokio::spawn(async move {
            let client = reqwest::Client::new();
            loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(error) =
                    subscribe_once(&client, &dev_server_url, &mut handler).await
                {
                    debug!(%error, "dev bridge stream ended");
                }
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                tokio::time::sleep(backoff).await;
            }
        }));
    }

    /// Stops the subscription loop and waits for the task to finish.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

async fn subscribe_once<H, Fut>(
    client: &reqwest::Client,
    dev_server_url: &str,
    handler: &mut H,
) -> Result<()>
where
    H: FnMut(DevReloadEvent, String) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    let events_url = format!("{dev_server_url}{DEV_BRIDGE_EVENTS_PATH}");
    let response = client
        .get(&events_url)
        .send()
        .await
        .with_context(|| format!("failed to subscribe to {events_url}"))?;
    if !response.status().is_success() {
        bail!(
            "dev bridge subscription '{events_url}' returned status {}",
            response.status()
        );
    }

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("dev bridge stream error on {events_url}"))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(newline) = buffer.find('\n') {
            let line = buffer[..newline].trim().to_string();
            buffer.drain(..=newline);
            if line.is_empty() {
                continue;
            }
            // Tolerate server-sent-event framing around the JSON payload.
            let payload = line.strip_prefix("data:").unwrap_or(&line).trim();
            let event: DevReloadEvent = match serde_json::from_str(payload) {
                Ok(event) => event,
                Err(error) => {
                    debug!(%error, line = %payload, "ignoring malformed dev bridge event");
                    continue;
                }
            };
            if event.kind != "reload" {
                continue;
            }
            match fetch_replacement_source(client, dev_server_url).await {
                Ok(text) => {
                    if let Err(error) = handler(event, text).await {
                        warn!(%error, "dev bridge reload handler failed");
                    }
                }
                Err(error) => warn!(%error, "dev bridge source fetch failed"),
            }
        }
    }
    Ok(())
}

async fn fetch_replacement_source(
    client: &reqwest::Client,
    dev_server_url: &str,
) -> Result<String> {
    let source_url = format!("{dev_server_url}{DEV_BRIDGE_SOURCE_PATH}");
    let response = client
        .get(&source_url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {source_url}"))?;
    if !response.status().is_success() {
        bail!(
            "dev bridge source '{source_url}' returned status {}",
            response.status()
        );
    }
    response
        .text()
        .await
        .with_context(|| format!("failed to read {source_url}"))
}
