//! # e-Amuse data layer
//!
//! Persistent state for the backend, stored in SQLite:
//!
//! - **Machines and arcades**: cabinets register themselves on first contact
//! - **Users**: cards, PINs, per-game reference ids and profiles
//! - **Music**: best score per user and chart, plus an append-only attempt log
//! - **Series settings**: per-user blobs shared by every version of a game,
//!   including the play statistics rollup
//! - **Network events**: a persisted log of diagnostics
//!
//! A request borrows one connection through [`Data`], which groups the
//! stores over a single [`Session`] and a [`Clock`]. The connection goes back
//! to the pool when the `Data` is dropped.
//!
//! ```rust
//! use eamuse_data::{Database, PlayRecord};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let db = Database::in_memory().unwrap();
//! let data = db.data().unwrap();
//! let play = PlayRecord { song_id: 1001, chart: 1, points: 870, new_record: true, ..Default::default() };
//! data.music().put_score("SMP", 2, 1, &play).await.unwrap();
//! assert_eq!(data.music().get_score("SMP", 2, 1, 1001, 1).await.unwrap().unwrap().points, 870);
//! # }
//! ```

pub mod db;
pub mod error;
pub mod game;
pub mod machine;
pub mod music;
pub mod network;
mod schema;
pub mod stats;
pub mod time;
pub mod types;
pub mod user;
pub mod validated;

pub use db::{Database, DatabaseConfig, Session};
pub use error::DataError;
pub use game::GameData;
pub use machine::MachineData;
pub use music::{checked_music_id, music_id, song_chart, song_id, MusicData, PlayRecord};
pub use network::NetworkData;
pub use time::{Clock, ManualClock, SystemClock};
pub use types::{Arcade, ArcadeId, Attempt, Event, LastPlayed, Machine, PlayCount, Score, UserId};
pub use user::UserData;
pub use validated::ValidatedDict;

use std::sync::Arc;

/// The stores available to one request.
pub struct Data {
    session: Session,
    clock: Arc<dyn Clock>,
}

impl Data {
    pub fn new(session: Session, clock: Arc<dyn Clock>) -> Self {
        Self { session, clock }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn machine(&self) -> MachineData<'_> {
        MachineData::new(&self.session)
    }

    pub fn user(&self) -> UserData<'_> {
        UserData::new(&self.session)
    }

    pub fn music(&self) -> MusicData<'_> {
        MusicData::new(&self.session, self.clock.as_ref())
    }

    pub fn game(&self) -> GameData<'_> {
        GameData::new(&self.session, self.clock.as_ref())
    }

    pub fn network(&self) -> NetworkData<'_> {
        NetworkData::new(&self.session, self.clock.as_ref())
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").field("now", &self.clock.now()).finish()
    }
}
