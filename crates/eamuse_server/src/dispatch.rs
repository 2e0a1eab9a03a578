//! Per-request routing from a decoded `call` tree to a game handler.

use crate::config::{MachineContext, ServerConfig};
use crate::handler::status;
use crate::model::Model;
use crate::registry::GameRegistry;
use eamuse_data::Data;
use eamuse_protocol::Node;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Root tag of every request.
pub const REQUEST_ENVELOPE: &str = "call";
/// Root tag of every response.
pub const RESPONSE_ENVELOPE: &str = "response";

/// What came of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A response envelope ready to encode.
    Response(Node),
    /// The tree is not a well-formed request envelope.
    Rejected(String),
    /// No handler answered.
    Unhandled,
    /// A handler or the data layer failed.
    Failed { traceback: String },
}

/// Routes one request.
///
/// Holds the per-request copy of the configuration; machine and arcade
/// overrides are applied to a further copy, never to the shared base.
pub struct Dispatch {
    registry: Arc<GameRegistry>,
    config: ServerConfig,
    data: Arc<Data>,
}

impl Dispatch {
    pub fn new(registry: Arc<GameRegistry>, config: ServerConfig, data: Arc<Data>) -> Self {
        Self {
            registry,
            config,
            data,
        }
    }

    /// Handles a decoded request tree.
    ///
    /// # Flow
    ///
    /// 1. Check the envelope: a `call` root with exactly one child
    /// 2. Parse the `model` attribute and read the `srcid` machine id
    /// 3. Load the machine, registering it on first contact
    /// 4. Apply the arcade's PASELI settings to this request's config
    /// 5. Resolve the game handler and let it answer
    /// 6. Default the `status` attribute and wrap in a `response` envelope
    ///
    /// Errors and panics from any step are caught and reported as
    /// [`DispatchOutcome::Failed`].
    pub async fn handle(&self, tree: &Node) -> DispatchOutcome {
        debug!("Received request:\n{}", tree);

        match AssertUnwindSafe(self.route(tree)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => DispatchOutcome::Failed {
                traceback: format!("{e:?}"),
            },
            Err(panic) => DispatchOutcome::Failed {
                traceback: format!("panic: {}", panic_message(panic.as_ref())),
            },
        }
    }

    async fn route(&self, tree: &Node) -> anyhow::Result<DispatchOutcome> {
        if tree.name() != REQUEST_ENVELOPE {
            debug!("Invalid root node {}", tree.name());
            return Ok(DispatchOutcome::Rejected(format!("root node <{}>", tree.name())));
        }
        let [request] = tree.children() else {
            debug!("Invalid number of children for root node");
            return Ok(DispatchOutcome::Rejected(format!(
                "{} children under root",
                tree.children().len()
            )));
        };

        let model: Model = match tree.attribute("model").map(str::parse) {
            Some(Ok(model)) => model,
            Some(Err(e)) => return Ok(DispatchOutcome::Rejected(e.to_string())),
            None => return Ok(DispatchOutcome::Rejected("missing model".to_string())),
        };
        let Some(pcbid) = tree.attribute("srcid") else {
            return Ok(DispatchOutcome::Rejected("missing srcid".to_string()));
        };

        let machines = self.data.machine();
        let machine = match machines.get_machine(pcbid).await? {
            Some(machine) => machine,
            None => machines.create_machine(pcbid).await?,
        };

        let mut config = self.config.clone();
        config.machine = Some(MachineContext {
            pcbid: pcbid.to_string(),
            arcade: machine.arcade,
        });
        if let Some(arcade_id) = machine.arcade {
            if let Some(arcade) = machines.get_arcade(arcade_id).await? {
                config.paseli.enabled = arcade.data.get_bool("paseli_enabled", false);
                config.paseli.infinite = arcade.data.get_bool("paseli_infinite", false);
            }
        }

        let Some(game) =
            self.registry
                .create(Arc::clone(&self.data), Arc::new(config), &model, None)
        else {
            warn!("No version of {} matches model {}", model.game, model);
            return Ok(DispatchOutcome::Unhandled);
        };

        let Some(mut response) = game.handle(request).await? else {
            warn!(
                "Unrecognized service {} method {}",
                request.name(),
                request.attribute("method").unwrap_or("-")
            );
            return Ok(DispatchOutcome::Unhandled);
        };

        if !response.has_attribute("status") {
            response.set_attribute("status", status::SUCCESS.to_string());
        }
        let mut root = Node::void(RESPONSE_ENVELOPE);
        root.add_child(response);
        root.set_attribute("dstid", pcbid);

        debug!("Sending response:\n{}", root);
        Ok(DispatchOutcome::Response(root))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
