//! The request pipeline the HTTP layer calls into.
//!
//! [`XrpcService::handle`] takes the raw body plus the two protocol headers,
//! runs decode, dispatch and encode, and maps every failure onto a plain
//! status code with a short text body. Nothing it does can take the process
//! down.

use crate::config::{ClientContext, ServerConfig};
use crate::dispatch::{Dispatch, DispatchOutcome};
use crate::error::ServerError;
use crate::registry::GameRegistry;
use eamuse_data::{Database, ValidatedDict};
use eamuse_protocol::{compression::NO_COMPRESSION, EamuseProtocol, Node};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const HEADER_COMPRESS: &str = "X-Compress";
pub const HEADER_EAMUSE_INFO: &str = "X-Eamuse-Info";
pub const HEADER_REMOTE_ADDRESS: &str = "X-Remote-Address";

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_SERVER_ERROR: u16 = 500;

/// One inbound POST, stripped of HTTP specifics.
#[derive(Debug, Clone, Default)]
pub struct XrpcRequest {
    pub body: Vec<u8>,
    /// `X-Compress` header.
    pub compression: Option<String>,
    /// `X-Eamuse-Info` header.
    pub encryption: Option<String>,
    /// `X-Remote-Address` header, set by a fronting proxy.
    pub remote_address: Option<String>,
    /// Socket peer.
    pub peer: Option<IpAddr>,
}

impl XrpcRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    fn client_address(&self) -> Option<String> {
        self.remote_address
            .clone()
            .or_else(|| self.peer.map(|ip| ip.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpcResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

impl XrpcResponse {
    fn text(status: u16, message: &str) -> Self {
        Self {
            status,
            body: message.as_bytes().to_vec(),
            headers: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Decode, dispatch, encode.
#[derive(Clone)]
pub struct XrpcService {
    protocol: EamuseProtocol,
    database: Database,
    registry: Arc<GameRegistry>,
    config: Arc<ServerConfig>,
}

impl XrpcService {
    pub fn new(
        protocol: EamuseProtocol,
        database: Database,
        registry: Arc<GameRegistry>,
        config: ServerConfig,
    ) -> Self {
        Self {
            protocol,
            database,
            registry,
            config: Arc::new(config),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handles one request end to end.
    pub async fn handle(&self, request: XrpcRequest) -> XrpcResponse {
        match self.process(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!("❌ Request pipeline failed: {}", e);
                XrpcResponse::text(STATUS_SERVER_ERROR, "Crash when handling packet!")
            }
        }
    }

    async fn process(&self, request: &XrpcRequest) -> Result<XrpcResponse, ServerError> {
        let Some(tree) = self.protocol.decode(
            request.compression.as_deref(),
            request.encryption.as_deref(),
            &request.body,
        ) else {
            return Ok(XrpcResponse::text(STATUS_BAD_REQUEST, "Unrecognized packet!"));
        };

        let mut config = (*self.config).clone();
        config.client = request
            .client_address()
            .map(|address| ClientContext { address });

        let data = Arc::new(self.database.data()?);
        let outcome = Dispatch::new(Arc::clone(&self.registry), config, Arc::clone(&data))
            .handle(&tree)
            .await;
        // Release the request's session before any event bookkeeping.
        drop(data);

        match outcome {
            DispatchOutcome::Response(root) => {
                // Responses always go out uncompressed.
                let body = self
                    .protocol
                    .encode(None, request.encryption.as_deref(), &root)?;
                let mut headers = vec![(HEADER_COMPRESS, NO_COMPRESSION.to_string())];
                if let Some(info) = &request.encryption {
                    headers.push((HEADER_EAMUSE_INFO, info.clone()));
                }
                Ok(XrpcResponse {
                    status: STATUS_OK,
                    body,
                    headers,
                })
            }
            DispatchOutcome::Rejected(reason) => {
                debug!("Rejected packet: {}", reason);
                Ok(XrpcResponse::text(STATUS_BAD_REQUEST, "Unrecognized packet!"))
            }
            DispatchOutcome::Unhandled => {
                let mut event = ValidatedDict::new();
                event.replace_str("request", tree.to_string());
                self.record("unhandled_packet", &event).await;
                Ok(XrpcResponse::text(STATUS_NOT_FOUND, "No response generated"))
            }
            DispatchOutcome::Failed { traceback } => {
                error!("❌ Crash handling {}: {}", describe(&tree), traceback);
                let mut event = ValidatedDict::new();
                event.replace_str("service", "xrpc");
                event.replace_str("request", tree.to_string());
                event.replace_str("traceback", traceback);
                self.record("exception", &event).await;
                Ok(XrpcResponse::text(STATUS_SERVER_ERROR, "Crash when handling packet!"))
            }
        }
    }

    /// Stores an event; a failure here never changes the response.
    async fn record(&self, event_type: &str, data: &ValidatedDict) {
        let stored = match self.database.data() {
            Ok(session) => session.network().put_event(event_type, data, None).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!("Could not record {} event: {}", event_type, e);
        }
    }
}

impl std::fmt::Debug for XrpcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XrpcService")
            .field("protocol", &self.protocol)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn describe(tree: &Node) -> String {
    match tree.children().first() {
        Some(request) => format!(
            "{}.{}",
            request.name(),
            request.attribute("method").unwrap_or("-")
        ),
        None => tree.name().to_string(),
    }
}
