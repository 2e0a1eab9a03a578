//! # Sample Mix
//!
//! A small two-version rhythm game family served under the `SMP` code. It
//! uses nothing but the public handler contract of `eamuse_server`, which
//! makes it both a working game for the server binary and a reference for
//! writing new families.
//!
//! | Version | Name          | First model `EXT` | PASELI |
//! |---------|---------------|-------------------|--------|
//! | 1       | Sample Mix    | `2020010100`      | no     |
//! | 2       | Sample Mix 2  | `2021010100`      | yes    |
//!
//! Sample Mix 2 also picks a daily featured song through scheduled work.

mod handler;
mod scheduled;
pub mod services;

pub use handler::SampleGame;
pub use scheduled::{daily_song, DAILY_SONG_EVENT, SONG_POOL};

use eamuse_data::ValidatedDict;
use eamuse_server::{GameInfo, GameRegistry, GameVersion, VersionedFactory};
use std::sync::Arc;
use tracing::info;

pub const GAME_CODE: &str = "SMP";

pub const SAMPLE_MIX: GameInfo = GameInfo::new(GAME_CODE, 1, "Sample Mix");
pub const SAMPLE_MIX_2: GameInfo = GameInfo::new(GAME_CODE, 2, "Sample Mix 2");

/// Operator settings for a version, with their defaults.
fn settings() -> ValidatedDict {
    let mut settings = ValidatedDict::new();
    settings.replace_bool("force_unlock_songs", false);
    settings
}

/// The `SMP` family with both versions.
pub fn factory() -> VersionedFactory {
    VersionedFactory::new("Sample Mix")
        .version(GameVersion::new(SAMPLE_MIX, 2020_01_01_00, SampleGame::construct).with_settings(settings()))
        .version(
            GameVersion::new(SAMPLE_MIX_2, 2021_01_01_00, SampleGame::construct)
                .with_settings(settings())
                .with_scheduled_work(scheduled::run),
        )
}

/// Adds the family to `registry`.
pub fn register(registry: &GameRegistry) {
    registry.register_family(Arc::new(factory()));
    info!("🎵 Sample Mix family registered under {}", GAME_CODE);
}
