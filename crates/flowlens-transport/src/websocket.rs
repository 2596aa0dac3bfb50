//! WebSocket connection lifecycle
//!
//! [`ConnectionManager`] owns the socket. It reports every lifecycle change
//! to the session as a [`ConnectionEvent`], forwards text frames unparsed to
//! [`SessionHandle::ingest_text`], and reconnects with backoff until its
//! cancellation token fires or the reconnect budget runs out.

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use flowlens_core::{ConnectionEvent, SessionHandle};
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSender = SplitSink<WsStream, Message>;
type WsReceiver = SplitStream<WsStream>;

/// Client keepalive frame
pub const PING_FRAME: &str = r#"{"kind":"ping"}"#;

/// How a connected stretch ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Exit {
    Cancelled,
    Closed(Option<String>),
}

/// Owns the socket and keeps it connected
pub struct ConnectionManager {
    config: TransportConfig,
    session: SessionHandle,
    project_id: Option<String>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager feeding the given session
    #[must_use]
    pub fn new(config: TransportConfig, session: SessionHandle) -> Self {
        Self {
            config,
            session,
            project_id: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Scope the socket to a project
    #[must_use]
    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the manager when cancelled
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run on a new task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Connect and pump frames until cancelled.
    ///
    /// Returns `Ok(())` on cancellation and [`Error::ReconnectExhausted`]
    /// once the reconnect budget is spent. A closed session also ends the
    /// loop with its error.
    pub async fn run(self) -> Result<()> {
        let url = self.config.ws_url_for(self.project_id.as_deref())?;
        let policy = self.config.reconnect.clone();
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.report(ConnectionEvent::Connecting).await?;
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = self.connect(&url) => result,
            };

            let failure = match connected {
                Ok(stream) => {
                    attempt = 0;
                    info!(url = %url, "WebSocket connected");
                    self.report(ConnectionEvent::Connected).await?;

                    match self.pump(stream).await? {
                        Exit::Cancelled => {
                            self.report(ConnectionEvent::Disconnected { reason: None })
                                .await?;
                            return Ok(());
                        }
                        Exit::Closed(reason) => {
                            warn!(reason = ?reason, "WebSocket closed");
                            self.report(ConnectionEvent::Disconnected {
                                reason: reason.clone(),
                            })
                            .await?;
                            reason.unwrap_or_else(|| "connection closed".to_string())
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "WebSocket connect failed");
                    e.to_string()
                }
            };

            attempt += 1;
            if !policy.allows(attempt) {
                let attempts = attempt - 1;
                self.report(ConnectionEvent::Failed { error: failure })
                    .await?;
                return Err(Error::ReconnectExhausted(attempts));
            }

            let delay = policy.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            self.report(ConnectionEvent::Reconnecting { attempt }).await?;
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    async fn connect(&self, url: &Url) -> Result<WsStream> {
        let mut request = url.as_str().into_client_request()?;
        if let Some(token) = &self.config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::WebSocket(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request).await?;
        Ok(stream)
    }

    async fn pump(&self, stream: WsStream) -> Result<Exit> {
        let (mut write, mut read): (WsSender, WsReceiver) = stream.split();
        let mut heartbeat = interval(self.config.effective_heartbeat());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    return Ok(Exit::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = write.send(Message::Text(PING_FRAME.to_string())).await {
                        return Ok(Exit::Closed(Some(e.to_string())));
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.session.ingest_text(text).await?,
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            return Ok(Exit::Closed(Some(e.to_string())));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        return Ok(Exit::Closed(reason));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(bytes = data.len(), "Ignoring binary frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Ok(Exit::Closed(Some(e.to_string()))),
                    None => return Ok(Exit::Closed(None)),
                },
            }
        }
    }

    async fn report(&self, event: ConnectionEvent) -> Result<()> {
        self.session.connection_event(event).await?;
        Ok(())
    }
}
