//! Services shared by every game.
//!
//! Games build their [`MethodTable`] on top of [`shared_table`] and add their
//! own entries; a game entry registered for the same key replaces the shared
//! one.

pub mod cardmng;
pub mod core_services;

use crate::handler::{GameHandler, MethodTable};

/// Core boot services plus card management.
pub fn shared_table<G: GameHandler>() -> MethodTable<G> {
    cardmng::register(core_services::register(MethodTable::new()))
}
