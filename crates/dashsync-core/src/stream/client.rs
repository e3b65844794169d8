use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::sse::{SseDecoder, StreamMessage};
use crate::api::{new_request_id, REQUEST_ID_HEADER};
use crate::auth::CredentialManager;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream endpoint returned HTTP {0}")]
    Status(u16),

    #[error("stream transport error: {0}")]
    Transport(String),

    #[error("stream line exceeded {0} bytes without a newline")]
    LineTooLong(usize),

    #[error("stream closed by server")]
    Closed,
}

/// Receives connection events. Called from the reader task.
pub trait StreamHandler: Send + Sync {
    fn on_open(&self) {}

    /// A default-type (`message`) event, data untouched.
    fn on_message(&self, message: &StreamMessage);

    fn on_error(&self, _error: &StreamError) {}
}

struct Connection {
    url: String,
    reader: JoinHandle<()>,
}

/// Manages at most one server-sent events connection.
pub struct StreamClient {
    enabled: bool,
    http: Client,
    credentials: Option<CredentialManager>,
    connection: Option<Connection>,
    open: Arc<AtomicBool>,
}

impl StreamClient {
    /// `enabled` is the runtime switch; when off, [`StreamClient::connect`]
    /// never opens anything.
    pub fn new(enabled: bool) -> Result<Self> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            enabled,
            http,
            credentials: None,
            connection: None,
            open: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Send the current bearer credential when connecting.
    pub fn with_credentials(mut self, credentials: CredentialManager) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open a connection to `url`, closing any existing one first.
    ///
    /// Returns `false` without connecting when streaming is disabled. Must be
    /// called from within a Tokio runtime.
    pub fn connect(&mut self, url: &str, handler: Arc<dyn StreamHandler>) -> bool {
        if !self.enabled {
            debug!(url, "Streaming disabled, not connecting");
            return false;
        }
        self.disconnect();

        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(REQUEST_ID_HEADER, new_request_id());
        if let Some(credential) = self.credentials.as_ref().and_then(|c| c.current()) {
            request = request.header(AUTHORIZATION, credential.bearer());
        }

        let open = Arc::new(AtomicBool::new(false));
        self.open = Arc::clone(&open);
        let reader = tokio::spawn(read_stream(request, handler, open));

        debug!(url, "Stream connecting");
        self.connection = Some(Connection {
            url: url.to_string(),
            reader,
        });
        true
    }

    /// Close the active connection, if any. No handler calls follow.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.reader.abort();
            self.open.store(false, Ordering::SeqCst);
            debug!(url = %connection.url, "Stream disconnected");
        }
    }

    /// A connection has been requested and its reader is still alive.
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| !c.reader.is_finished())
            .unwrap_or(false)
    }

    /// The server accepted the connection and it has not ended.
    pub fn is_open(&self) -> bool {
        self.is_connected() && self.open.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.url.as_str())
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn read_stream(request: reqwest::RequestBuilder, handler: Arc<dyn StreamHandler>, open: Arc<AtomicBool>) {
    let response = match request.send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let status = response.status().as_u16();
            warn!(status, "Stream endpoint rejected connection");
            handler.on_error(&StreamError::Status(status));
            return;
        }
        Err(e) => {
            warn!(error = %e, "Stream connection failed");
            handler.on_error(&StreamError::Transport(e.to_string()));
            return;
        }
    };

    open.store(true, Ordering::SeqCst);
    handler.on_open();

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => match decoder.push(&bytes) {
                Ok(messages) => {
                    for message in messages {
                        if message.is_message() {
                            handler.on_message(&message);
                        } else {
                            trace!(event = %message.event, "Ignoring named stream event");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Dropping stream connection");
                    open.store(false, Ordering::SeqCst);
                    handler.on_error(&e);
                    return;
                }
            },
            Err(e) => {
                open.store(false, Ordering::SeqCst);
                handler.on_error(&StreamError::Transport(e.to_string()));
                return;
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    handler.on_error(&StreamError::Closed);
}
