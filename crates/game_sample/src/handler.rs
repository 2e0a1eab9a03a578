use crate::services;
use async_trait::async_trait;
use eamuse_data::UserId;
use eamuse_protocol::Node;
use eamuse_server::handlers::shared_table;
use eamuse_server::{GameBase, GameHandler, HandlerResult, MethodTable};
use std::sync::OnceLock;
use tracing::debug;

/// One Sample Mix version bound to a request.
pub struct SampleGame {
    base: GameBase,
}

impl SampleGame {
    pub fn construct(base: GameBase) -> Box<dyn GameHandler> {
        Box::new(Self { base })
    }

    fn routes() -> &'static MethodTable<SampleGame> {
        static ROUTES: OnceLock<MethodTable<SampleGame>> = OnceLock::new();
        ROUTES.get_or_init(|| {
            shared_table()
                .method("game", "shop", services::shop)
                .method("game", "load", services::load)
                .method("game", "new", services::create)
                .method("game", "save", services::save)
                .method("game", "score", services::score)
                .method("game", "hiscore", services::hiscore)
        })
    }
}

#[async_trait]
impl GameHandler for SampleGame {
    fn base(&self) -> &GameBase {
        &self.base
    }

    async fn handle(&self, request: &Node) -> HandlerResult {
        Self::routes().dispatch(self, request).await
    }

    // The first release shipped with a broken PASELI menu.
    fn supports_paseli(&self) -> bool {
        self.base.version() >= 2
    }

    fn extra_services(&self) -> Vec<String> {
        vec!["game".to_string()]
    }

    /// Carries the newest older profile forward when a card is bound.
    async fn bind_profile(&self, userid: UserId) -> anyhow::Result<()> {
        if self.base.has_profile(userid).await? {
            return Ok(());
        }
        let previous = self.base.get_any_profile(userid).await?;
        if previous.is_empty() {
            return Ok(());
        }
        debug!("Migrating profile of user {} to version {}", userid, self.base.version());
        let mut profile = previous;
        profile.replace_int("exp", 0);
        self.base.put_profile(userid, &profile).await?;
        Ok(())
    }
}
