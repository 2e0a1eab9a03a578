//! # e-Amuse request routing
//!
//! Everything between a decoded request tree and a game's answer:
//!
//! - [`Model`]: parsing the `GAME:DEST:SPEC:REV:EXT` version descriptor
//! - [`GameRegistry`]: families of game versions keyed by series code, with
//!   the scheduled-work sweep
//! - [`GameHandler`] and [`MethodTable`]: the contract a game implements and
//!   the service/method routing inside it
//! - [`handlers`]: services every game shares (boot, facility, card
//!   management)
//! - [`Dispatch`]: the per-request router
//! - [`XrpcService`]: the full decode, dispatch, encode pipeline with the
//!   status mapping the HTTP layer sends back
//!
//! ## Example
//!
//! ```rust
//! use eamuse_data::Database;
//! use eamuse_protocol::{EamuseProtocol, Node};
//! use eamuse_server::{GameRegistry, ServerConfig, XrpcRequest, XrpcService};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let protocol = EamuseProtocol::default();
//! let service = XrpcService::new(
//!     protocol.clone(),
//!     Database::in_memory().unwrap(),
//!     Arc::new(GameRegistry::new()),
//!     ServerConfig::default(),
//! );
//!
//! // Nobody serves "XYZ", so the default handler answers nothing.
//! let mut call = Node::void("call");
//! call.set_attribute("model", "XYZ:J:A:A:2020010100");
//! call.set_attribute("srcid", "0101020304050607");
//! let mut request = Node::void("pcbtracker");
//! request.set_attribute("method", "alive");
//! call.add_child(request);
//!
//! let body = protocol.encode(None, None, &call).unwrap();
//! let response = service.handle(XrpcRequest::new(body)).await;
//! assert_eq!(response.status, 404);
//! # }
//! ```

pub mod base;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod model;
pub mod registry;
pub mod transport;

pub use base::{GameBase, GameContext, GameInfo};
pub use config::{AppInfo, ClientContext, HostSettings, MachineContext, PaseliSettings, ServerConfig};
pub use dispatch::{Dispatch, DispatchOutcome};
pub use error::ServerError;
pub use handler::{status, DefaultHandler, GameHandler, HandlerResult, Method, MethodFuture, MethodTable};
pub use model::{Model, ModelError};
pub use registry::{
    GameFactory, GameRegistry, GameVersion, ScheduledEvents, ScheduledWork, SweepReport,
    VersionedFactory, DEFAULT_GAME,
};
pub use transport::{XrpcRequest, XrpcResponse, XrpcService};
