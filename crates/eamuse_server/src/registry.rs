//! Game registry and version resolution.
//!
//! Game families register under their three-character code. Resolving a
//! [`Model`] picks the family by code and lets it choose a version:
//!
//! - unknown codes get a [`DefaultHandler`] that answers nothing
//! - a family may return `None` when the model is ambiguous
//! - a `parent` model asks for "the version before this one", which is how
//!   newer versions look up older profiles for migration

use crate::base::{GameBase, GameContext, GameInfo};
use crate::config::ServerConfig;
use crate::dispatch::panic_message;
use crate::handler::{DefaultHandler, GameHandler};
use crate::model::Model;
use async_trait::async_trait;
use dashmap::DashMap;
use eamuse_data::{Data, Database, ValidatedDict};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// Events produced by scheduled work, persisted by the sweep.
pub type ScheduledEvents = Vec<(String, ValidatedDict)>;

/// Identity reported for requests nobody can serve.
pub const DEFAULT_GAME: GameInfo = GameInfo::new("dummy", 0, "dummy");

/// A family of game versions sharing one series code.
#[async_trait]
pub trait GameFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Every version this family can serve.
    fn games(&self) -> Vec<GameInfo>;

    /// Operator-tunable settings for one version.
    fn settings(&self, _game: &GameInfo) -> ValidatedDict {
        ValidatedDict::new()
    }

    /// Builds the handler for `model`, or `None` if no version fits.
    fn create(
        &self,
        context: GameContext,
        model: &Model,
        parent: Option<&Model>,
    ) -> Option<Box<dyn GameHandler>>;

    /// Out-of-band maintenance for one version (rankings, daily charts...).
    async fn run_scheduled_work(
        &self,
        _game: &GameInfo,
        _data: &Data,
        _config: &ServerConfig,
    ) -> anyhow::Result<ScheduledEvents> {
        Ok(Vec::new())
    }
}

/// Outcome of one scheduled-work sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub games: usize,
    pub failures: usize,
    pub events: usize,
}

/// Registered game families, keyed by game code.
#[derive(Default)]
pub struct GameRegistry {
    by_code: DashMap<String, Arc<dyn GameFactory>>,
    families: RwLock<Vec<Arc<dyn GameFactory>>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `code` to `factory`. The last registration for a code wins;
    /// every family ever registered stays listed for enumeration.
    pub fn register(&self, code: &str, factory: Arc<dyn GameFactory>) {
        info!("🎮 Registering game family '{}' for code {}", factory.name(), code);
        {
            let mut families = self.families.write().unwrap_or_else(PoisonError::into_inner);
            if !families.iter().any(|known| Arc::ptr_eq(known, &factory)) {
                families.push(Arc::clone(&factory));
            }
        }
        self.by_code.insert(code.to_string(), factory);
    }

    /// Registers `factory` under every code its versions use.
    pub fn register_family(&self, factory: Arc<dyn GameFactory>) {
        let mut codes: Vec<&'static str> = factory.games().iter().map(|g| g.game).collect();
        codes.sort_unstable();
        codes.dedup();
        for code in codes {
            self.register(code, Arc::clone(&factory));
        }
    }

    pub fn is_registered(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    fn families(&self) -> Vec<Arc<dyn GameFactory>> {
        self.families
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves a handler for `model` within an existing request context.
    pub fn resolve(
        &self,
        context: GameContext,
        model: &Model,
        parent: Option<&Model>,
    ) -> Option<Box<dyn GameHandler>> {
        let factory = self.by_code.get(&model.game).map(|f| Arc::clone(f.value()));
        match factory {
            Some(factory) => factory.create(context, model, parent),
            None => {
                debug!("No game registered for {}, using default handler", model.game);
                Some(Box::new(DefaultHandler::new(GameBase::new(
                    context,
                    model.clone(),
                    DEFAULT_GAME,
                ))))
            }
        }
    }

    /// Resolves a handler for a fresh request.
    pub fn create(
        self: &Arc<Self>,
        data: Arc<Data>,
        config: Arc<ServerConfig>,
        model: &Model,
        parent: Option<&Model>,
    ) -> Option<Box<dyn GameHandler>> {
        let context = GameContext::new(data, config, Arc::clone(self));
        self.resolve(context, model, parent)
    }

    /// Every registered game version, in registration order.
    pub fn all_games(&self) -> Vec<GameInfo> {
        self.families()
            .iter()
            .flat_map(|family| family.games())
            .collect()
    }

    /// Settings of every registered game version, in registration order.
    pub fn all_settings(&self) -> Vec<(GameInfo, ValidatedDict)> {
        self.families()
            .iter()
            .flat_map(|family| {
                family
                    .games()
                    .into_iter()
                    .map(|game| {
                        let settings = family.settings(&game);
                        (game, settings)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Runs scheduled work for every registered game version.
    ///
    /// Each version gets its own session. A version whose work fails, panics
    /// or cannot store its events is logged and recorded as an `exception`
    /// event through a fresh session; the sweep moves on to the next one.
    pub async fn run_scheduled_work(&self, database: &Database, config: &ServerConfig) -> SweepReport {
        let mut report = SweepReport::default();

        for family in self.families() {
            for game in family.games() {
                report.games += 1;
                let traceback = match run_one(family.as_ref(), &game, database, config).await {
                    Ok(events) => {
                        report.events += events;
                        continue;
                    }
                    Err(traceback) => traceback,
                };

                report.failures += 1;
                error!(
                    "❌ Scheduled work failed for {} version {}: {}",
                    game.game, game.version, traceback
                );
                let mut body = ValidatedDict::new();
                body.replace_str("service", "scheduler");
                body.replace_str("game", game.game);
                body.replace_int("version", game.version);
                body.replace_str("traceback", traceback);
                let recorded = match database.data() {
                    Ok(data) => data.network().put_event("exception", &body, None).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = recorded {
                    error!(
                        "❌ Could not record scheduler exception for {} version {}: {}",
                        game.game, game.version, e
                    );
                }
            }
        }

        debug!(
            "Scheduled work swept {} games ({} failed, {} events)",
            report.games, report.failures, report.events
        );
        report
    }
}

/// Runs one version's work and stores its events, returning how many were
/// stored. The session is released before the caller sees the outcome.
async fn run_one(
    family: &dyn GameFactory,
    game: &GameInfo,
    database: &Database,
    config: &ServerConfig,
) -> Result<usize, String> {
    let data = database.data().map_err(|e| format!("{e:?}"))?;
    let events = match AssertUnwindSafe(family.run_scheduled_work(game, &data, config))
        .catch_unwind()
        .await
    {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => return Err(format!("{e:?}")),
        Err(panic) => return Err(format!("panic: {}", panic_message(panic.as_ref()))),
    };
    for (event_type, body) in &events {
        data.network()
            .put_event(event_type, body, None)
            .await
            .map_err(|e| format!("{e:?}"))?;
    }
    Ok(events.len())
}

impl std::fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<String> = self.by_code.iter().map(|e| e.key().clone()).collect();
        codes.sort();
        f.debug_struct("GameRegistry").field("codes", &codes).finish()
    }
}

/// Builds the handler for one version.
pub type Constructor = fn(GameBase) -> Box<dyn GameHandler>;

/// Per-version scheduled work.
pub type ScheduledWork =
    for<'a> fn(&'a GameInfo, &'a Data, &'a ServerConfig) -> BoxFuture<'a, anyhow::Result<ScheduledEvents>>;

/// One version served by a [`VersionedFactory`].
#[derive(Clone)]
pub struct GameVersion {
    pub info: GameInfo,
    /// First model `EXT` this version answers to.
    pub first_ext: u64,
    construct: Constructor,
    settings: ValidatedDict,
    scheduled: Option<ScheduledWork>,
}

impl GameVersion {
    pub fn new(info: GameInfo, first_ext: u64, construct: Constructor) -> Self {
        Self {
            info,
            first_ext,
            construct,
            settings: ValidatedDict::new(),
            scheduled: None,
        }
    }

    pub fn with_settings(mut self, settings: ValidatedDict) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_scheduled_work(mut self, work: ScheduledWork) -> Self {
        self.scheduled = Some(work);
        self
    }
}

/// A [`GameFactory`] that picks a version by the model's `EXT` date.
///
/// Without an `EXT` the model is ambiguous. It then resolves to the version
/// strictly older than `parent` when one is given, to the only version when
/// there is just one, and to nothing otherwise.
#[derive(Clone)]
pub struct VersionedFactory {
    name: String,
    versions: Vec<GameVersion>,
}

impl VersionedFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
        }
    }

    pub fn version(mut self, version: GameVersion) -> Self {
        self.versions.push(version);
        self.versions.sort_by_key(|v| v.info.version);
        self
    }

    fn by_ext(&self, ext: u64) -> Option<&GameVersion> {
        self.versions
            .iter()
            .filter(|v| v.first_ext <= ext)
            .max_by_key(|v| v.first_ext)
    }

    fn find(&self, info: &GameInfo) -> Option<&GameVersion> {
        self.versions.iter().find(|v| v.info == *info)
    }

    /// Picks the version serving `model`.
    pub fn resolve_version(&self, model: &Model, parent: Option<&Model>) -> Option<&GameVersion> {
        if let Some(ext) = model.ext {
            return self.by_ext(ext);
        }
        if let Some(parent) = parent {
            let newer = self.resolve_version(parent, None)?;
            return self
                .versions
                .iter()
                .filter(|v| v.info.version < newer.info.version)
                .max_by_key(|v| v.info.version);
        }
        match self.versions.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

#[async_trait]
impl GameFactory for VersionedFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn games(&self) -> Vec<GameInfo> {
        self.versions.iter().map(|v| v.info.clone()).collect()
    }

    fn settings(&self, game: &GameInfo) -> ValidatedDict {
        self.find(game).map(|v| v.settings.clone()).unwrap_or_default()
    }

    fn create(
        &self,
        context: GameContext,
        model: &Model,
        parent: Option<&Model>,
    ) -> Option<Box<dyn GameHandler>> {
        let version = self.resolve_version(model, parent)?;
        debug!("Resolved {} to {} version {}", model, self.name, version.info.version);
        Some((version.construct)(GameBase::new(
            context,
            model.clone(),
            version.info.clone(),
        )))
    }

    async fn run_scheduled_work(
        &self,
        game: &GameInfo,
        data: &Data,
        config: &ServerConfig,
    ) -> anyhow::Result<ScheduledEvents> {
        match self.find(game).and_then(|v| v.scheduled) {
            Some(work) => work(game, data, config).await,
            None => Ok(Vec::new()),
        }
    }
}
