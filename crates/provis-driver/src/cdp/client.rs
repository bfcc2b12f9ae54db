//! WebSocket client for the Chrome DevTools Protocol.
//!
//! One client owns the browser-level WebSocket connection. Requests are
//! correlated to responses by id; page-scoped commands are multiplexed over
//! the same socket using flat session ids.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::error::CdpError;
use super::protocol::{BrowserVersion, CdpRequest, CdpResponse, PageInfo, TargetInfo};
use super::session::PageSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;

/// How long to wait for a single CDP response.
const CALL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub tx: oneshot::Sender<Result<Value, CdpError>>,
}

/// Connection to a Chrome instance's DevTools endpoint.
#[derive(Debug)]
pub struct CdpClient {
    endpoint: String,
    ws_sink: Arc<TokioMutex<WsSink>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    recv_task: Option<JoinHandle<()>>,
}

impl CdpClient {
    /// Connect to a Chrome debugging endpoint, e.g. `http://127.0.0.1:9222`.
    pub async fn connect(endpoint: &str) -> Result<Self, CdpError> {
        let version = Self::fetch_version(endpoint).await?;
        let ws_url = version.websocket_debugger_url.ok_or_else(|| {
            CdpError::ChromeNotAvailable("no webSocketDebuggerUrl in /json/version".to_string())
        })?;

        debug!(ws_url = %ws_url, "connecting to browser WebSocket");
        let (ws_stream, _) = connect_async(&ws_url).await?;
        let (sink, stream) = ws_stream.split();

        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let recv_task = tokio::spawn(Self::receive_loop(stream, Arc::clone(&pending)));

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            ws_sink: Arc::new(TokioMutex::new(sink)),
            next_id: AtomicU64::new(1),
            pending,
            recv_task: Some(recv_task),
        })
    }

    /// Query `/json/version` on the debugging endpoint.
    pub async fn fetch_version(endpoint: &str) -> Result<BrowserVersion, CdpError> {
        let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
        let response = reqwest::get(&url).await?.error_for_status()?;
        Ok(response.json::<BrowserVersion>().await?)
    }

    async fn receive_loop(
        mut stream: futures::stream::SplitStream<WsStream>,
        pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    ) {
        while let Some(message) = stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    debug!("browser WebSocket closed");
                    break;
                }
                Ok(_) => continue,
                Err(err) => {
                    warn!(error = %err, "WebSocket receive error");
                    break;
                }
            };

            let response: CdpResponse = match serde_json::from_str(&text) {
                Ok(response) => response,
                Err(err) => {
                    warn!(error = %err, "unparseable CDP message");
                    continue;
                }
            };

            if let Some(id) = response.id {
                let request = pending.lock().remove(&id);
                if let Some(request) = request {
                    let result = match response.error {
                        Some(err) => Err(CdpError::Protocol {
                            code: err.code,
                            message: err.message,
                        }),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    };
                    let _ = request.tx.send(result);
                }
            } else if let Some(method) = &response.method {
                // Events are not consumed; page state is observed by polling.
                trace!(method = %method, "ignoring CDP event");
            }
        }

        // Wake anything still waiting so callers see an error instead of hanging.
        let mut pending = pending.lock();
        for (_, request) in pending.drain() {
            let _ = request.tx.send(Err(CdpError::ChannelClosed));
        }
    }

    /// Send a CDP command and wait for its response.
    pub async fn call(
        &self,
        method: &str,
        session_id: Option<&str>,
        params: Option<Value>,
    ) -> Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            session_id: session_id.map(|s| s.to_string()),
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        let payload = serde_json::to_string(&request)?;
        trace!(id, method, "sending CDP request");
        {
            let mut sink = self.ws_sink.lock().await;
            if let Err(err) = sink.send(Message::text(payload)).await {
                self.pending.lock().remove(&id);
                return Err(err.into());
            }
        }

        match tokio::time::timeout(Duration::from_secs(CALL_TIMEOUT_SECS), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::ChannelClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(CALL_TIMEOUT_SECS))
            }
        }
    }

    /// Open a new page tab via the HTTP endpoint and attach to it.
    pub async fn new_page(self: &Arc<Self>, url: &str) -> Result<PageSession, CdpError> {
        let endpoint = format!("{}/json/new?{}", self.endpoint, url);
        let client = reqwest::Client::new();
        let response = client.put(&endpoint).send().await?.error_for_status()?;
        let page: PageInfo = response.json().await?;
        debug!(target_id = %page.id, "created new page");
        self.attach_page(&page.id).await
    }

    /// Attach to an existing page target with a flat session.
    pub async fn attach_page(self: &Arc<Self>, target_id: &str) -> Result<PageSession, CdpError> {
        let result = self
            .call(
                "Target.attachToTarget",
                None,
                Some(json!({"targetId": target_id, "flatten": true})),
            )
            .await?;

        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| CdpError::PageNotFound(target_id.to_string()))?
            .to_string();

        debug!(target_id, session_id = %session_id, "attached to page");
        Ok(PageSession::new(
            Arc::clone(self),
            session_id,
            target_id.to_string(),
        ))
    }

    /// List all targets known to the browser.
    pub async fn get_targets(&self) -> Result<Vec<TargetInfo>, CdpError> {
        let result = self.call("Target.getTargets", None, None).await?;
        let infos = result["targetInfos"].clone();
        Ok(serde_json::from_value(infos)?)
    }

    /// Close a page target.
    pub async fn close_page(&self, target_id: &str) -> Result<(), CdpError> {
        self.call(
            "Target.closeTarget",
            None,
            Some(json!({"targetId": target_id})),
        )
        .await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}
