//! Game handler contract and method tables.
//!
//! A request's inner node names a service (its tag) and a method (its
//! `method` attribute). Each handler type owns a [`MethodTable`] built once,
//! mapping `(service, method)` and `(service, *)` keys to plain function
//! pointers. Lookup tries the specific method first and falls back to the
//! service-wide entry when the method is missing or declines to answer.

use crate::base::GameBase;
use async_trait::async_trait;
use eamuse_data::{DataError, UserId};
use eamuse_protocol::Node;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;

/// `Ok(None)` means "not handled here".
pub type HandlerResult = anyhow::Result<Option<Node>>;

pub type MethodFuture<'a> = BoxFuture<'a, HandlerResult>;

/// A handler entry: takes the game object and the inner request node.
pub type Method<G> = for<'a> fn(&'a G, &'a Node) -> MethodFuture<'a>;

/// Statuses returned to cabinets in the `status` attribute.
pub mod status {
    pub const SUCCESS: u32 = 0;
    pub const NO_PROFILE: u32 = 109;
    pub const NOT_ALLOWED: u32 = 110;
    pub const NOT_REGISTERED: u32 = 112;
    pub const INVALID_PIN: u32 = 116;
}

/// Routing table for one handler type.
pub struct MethodTable<G> {
    entries: HashMap<(String, Option<String>), Method<G>>,
}

impl<G> MethodTable<G> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers `service.method`.
    pub fn method(mut self, service: &str, method: &str, handler: Method<G>) -> Self {
        self.entries
            .insert((service.to_string(), Some(method.to_string())), handler);
        self
    }

    /// Registers a handler for every method of `service`.
    pub fn service(mut self, service: &str, handler: Method<G>) -> Self {
        self.entries.insert((service.to_string(), None), handler);
        self
    }

    pub fn lookup(&self, service: &str, method: Option<&str>) -> Option<Method<G>> {
        self.entries
            .get(&(service.to_string(), method.map(str::to_string)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Routes `request` to the best matching entry.
    ///
    /// # Returns
    ///
    /// The first non-`None` answer from `service.method` then `service`, or
    /// `Ok(None)` when neither exists or both declined.
    pub async fn dispatch(&self, game: &G, request: &Node) -> HandlerResult {
        let service = request.name();

        if let Some(method) = request.attribute("method") {
            if let Some(handler) = self.lookup(service, Some(method)) {
                if let Some(response) = handler(game, request).await? {
                    return Ok(Some(response));
                }
            }
        }

        match self.lookup(service, None) {
            Some(handler) => handler(game, request).await,
            None => Ok(None),
        }
    }
}

impl<G> Default for MethodTable<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> fmt::Debug for MethodTable<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .map(|(service, method)| match method {
                Some(method) => format!("{service}.{method}"),
                None => format!("{service}.*"),
            })
            .collect();
        keys.sort();
        f.debug_struct("MethodTable").field("entries", &keys).finish()
    }
}

/// A game/version implementation the router can hand requests to.
///
/// Shared profile, statistics and machine helpers live on [`GameBase`];
/// implementors compose one and expose it through [`GameHandler::base`].
#[async_trait]
pub trait GameHandler: Send + Sync {
    fn base(&self) -> &GameBase;

    /// Handles one inner request node.
    async fn handle(&self, request: &Node) -> HandlerResult;

    /// Games or regions with broken PASELI support turn it off here.
    fn supports_paseli(&self) -> bool {
        true
    }

    /// Services advertised in `services.get` beyond the core set.
    fn extra_services(&self) -> Vec<String> {
        Vec::new()
    }

    async fn has_profile(&self, userid: UserId) -> Result<bool, DataError> {
        self.base().has_profile(userid).await
    }

    /// Called when a card is bound to this version.
    async fn bind_profile(&self, _userid: UserId) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handler for game codes nobody registered. Answers nothing.
pub struct DefaultHandler {
    base: GameBase,
}

impl DefaultHandler {
    pub fn new(base: GameBase) -> Self {
        Self { base }
    }
}

#[async_trait]
impl GameHandler for DefaultHandler {
    fn base(&self) -> &GameBase {
        &self.base
    }

    async fn handle(&self, _request: &Node) -> HandlerResult {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    fn specific<'a>(_: &'a Probe, _: &'a Node) -> MethodFuture<'a> {
        Box::pin(async { Ok(Some(Node::void("specific"))) })
    }

    fn declines<'a>(_: &'a Probe, _: &'a Node) -> MethodFuture<'a> {
        Box::pin(async { Ok(None) })
    }

    fn generic<'a>(_: &'a Probe, request: &'a Node) -> MethodFuture<'a> {
        Box::pin(async move { Ok(Some(Node::void(format!("generic-{}", request.name())))) })
    }

    fn request(service: &str, method: &str) -> Node {
        let mut node = Node::void(service);
        node.set_attribute("method", method);
        node
    }

    #[tokio::test]
    async fn falls_back_to_service_handler() {
        let table = MethodTable::<Probe>::new()
            .method("pcbtracker", "alive", specific)
            .service("pcbevent", generic);

        let hit = table.dispatch(&Probe, &request("pcbtracker", "alive")).await.unwrap();
        assert_eq!(hit.unwrap().name(), "specific");

        let fallback = table.dispatch(&Probe, &request("pcbevent", "put")).await.unwrap();
        assert_eq!(fallback.unwrap().name(), "generic-pcbevent");

        assert!(table.dispatch(&Probe, &request("facility", "get")).await.unwrap().is_none());
        assert!(table.dispatch(&Probe, &request("pcbtracker", "dead")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn declined_method_falls_through() {
        let table = MethodTable::<Probe>::new()
            .method("cardmng", "inquire", declines)
            .service("cardmng", generic);
        let response = table.dispatch(&Probe, &request("cardmng", "inquire")).await.unwrap();
        assert_eq!(response.unwrap().name(), "generic-cardmng");

        let only_specific = MethodTable::<Probe>::new().method("cardmng", "inquire", declines);
        assert!(only_specific
            .dispatch(&Probe, &request("cardmng", "inquire"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn debug_lists_routes() {
        let table: MethodTable<Probe> = MethodTable::new()
            .method("a", "x", specific)
            .service("b", generic);
        assert_eq!(format!("{table:?}"), r#"MethodTable { entries: ["a.x", "b.*"] }"#);
        assert_eq!(table.len(), 2);
    }
}
