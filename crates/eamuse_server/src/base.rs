//! Shared game behaviour: profiles, play statistics and machine upkeep.

use crate::config::ServerConfig;
use crate::model::Model;
use crate::registry::GameRegistry;
use eamuse_data::{Data, DataError, Machine, UserId, ValidatedDict};
use std::sync::Arc;

/// Identity of one registered game version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    /// Series code, shared by every version (e.g. `SMP`).
    pub game: &'static str,
    pub version: i64,
    pub name: &'static str,
}

impl GameInfo {
    pub const fn new(game: &'static str, version: i64, name: &'static str) -> Self {
        Self { game, version, name }
    }
}

/// Everything a handler needs from the request it serves.
#[derive(Clone)]
pub struct GameContext {
    pub data: Arc<Data>,
    pub config: Arc<ServerConfig>,
    pub registry: Arc<GameRegistry>,
}

impl GameContext {
    pub fn new(data: Arc<Data>, config: Arc<ServerConfig>, registry: Arc<GameRegistry>) -> Self {
        Self {
            data,
            config,
            registry,
        }
    }
}

/// Helper object every game handler holds.
pub struct GameBase {
    context: GameContext,
    model: Model,
    info: GameInfo,
}

impl GameBase {
    pub fn new(context: GameContext, model: Model, info: GameInfo) -> Self {
        Self {
            context,
            model,
            info,
        }
    }

    pub fn context(&self) -> &GameContext {
        &self.context
    }

    pub fn data(&self) -> &Data {
        &self.context.data
    }

    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.context.registry
    }

    /// The model this request identified itself with.
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn info(&self) -> &GameInfo {
        &self.info
    }

    pub fn game(&self) -> &'static str {
        self.info.game
    }

    pub fn version(&self) -> i64 {
        self.info.version
    }

    pub async fn has_profile(&self, userid: UserId) -> Result<bool, DataError> {
        Ok(self.get_profile(userid).await?.is_some())
    }

    pub async fn get_profile(&self, userid: UserId) -> Result<Option<ValidatedDict>, DataError> {
        self.data()
            .user()
            .get_profile(self.game(), self.version(), userid)
            .await
    }

    /// This version's profile, else the newest in the series, else empty.
    ///
    /// Meant for display purposes such as naming score holders.
    pub async fn get_any_profile(&self, userid: UserId) -> Result<ValidatedDict, DataError> {
        Ok(self
            .data()
            .user()
            .get_any_profile(self.game(), self.version(), userid)
            .await?
            .unwrap_or_default())
    }

    /// Bulk [`GameBase::get_any_profile`]. Duplicate ids are collapsed.
    pub async fn get_any_profiles(
        &self,
        userids: &[UserId],
    ) -> Result<Vec<(UserId, ValidatedDict)>, DataError> {
        let mut unique = userids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let profiles = self
            .data()
            .user()
            .get_any_profiles(self.game(), self.version(), &unique)
            .await?;
        Ok(profiles
            .into_iter()
            .map(|(userid, profile)| (userid, profile.unwrap_or_default()))
            .collect())
    }

    pub async fn put_profile(&self, userid: UserId, profile: &ValidatedDict) -> Result<(), DataError> {
        self.data()
            .user()
            .put_profile(self.game(), self.version(), userid, profile)
            .await
    }

    /// Series-wide play statistics.
    ///
    /// Keys that may be present: `total_plays`, `today_plays`, `total_days`,
    /// `consecutive_days`, `first_play_timestamp`, `last_play_timestamp` and
    /// `last_play_date` as `[year, month, day]`.
    pub async fn get_play_statistics(&self, userid: UserId) -> Result<ValidatedDict, DataError> {
        self.data().game().get_play_statistics(self.game(), userid).await
    }

    /// Counts one play. Call this once per profile save.
    pub async fn update_play_statistics(
        &self,
        userid: UserId,
        extra: Option<&ValidatedDict>,
    ) -> Result<ValidatedDict, DataError> {
        self.data()
            .game()
            .update_play_statistics(self.game(), userid, extra)
            .await
    }

    async fn current_machine(&self) -> Result<Machine, DataError> {
        let pcbid = self
            .config()
            .pcbid()
            .ok_or_else(|| DataError::NotFound("no machine for this request".to_string()))?;
        self.data()
            .machine()
            .get_machine(pcbid)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("machine {pcbid}")))
    }

    pub async fn get_machine_id(&self) -> Result<i64, DataError> {
        Ok(self.current_machine().await?.id)
    }

    /// Renames the requesting machine. `None` leaves it alone.
    pub async fn update_machine_name(&self, name: Option<&str>) -> Result<(), DataError> {
        let Some(name) = name else {
            return Ok(());
        };
        let mut machine = self.current_machine().await?;
        machine.name = name.to_string();
        self.data().machine().put_machine(&machine).await
    }

    /// Merges `data` into the requesting machine's data blob.
    pub async fn update_machine_data(&self, data: ValidatedDict) -> Result<(), DataError> {
        let mut machine = self.current_machine().await?;
        machine.data.update(data);
        self.data().machine().put_machine(&machine).await
    }

    /// The arcade's `game_config` settings for this game version, or empty.
    pub async fn get_game_config(&self) -> Result<ValidatedDict, DataError> {
        let machine = self.current_machine().await?;
        let Some(arcade) = machine.arcade else {
            return Ok(ValidatedDict::new());
        };
        Ok(self
            .data()
            .machine()
            .get_settings(arcade, self.game(), self.version(), "game_config")
            .await?
            .unwrap_or_default())
    }
}
