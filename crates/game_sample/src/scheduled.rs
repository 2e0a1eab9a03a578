//! Daily featured song for Sample Mix 2.

use chrono::{Datelike, NaiveDate};
use eamuse_data::{Data, ValidatedDict};
use eamuse_server::{GameInfo, ScheduledEvents, ServerConfig};
use futures::future::BoxFuture;
use tracing::debug;

pub const DAILY_SONG_EVENT: &str = "smp_daily_song";

/// Songs eligible for the daily feature.
pub const SONG_POOL: [i64; 7] = [1001, 1002, 1005, 1010, 1013, 1021, 1034];

/// The song featured on `date`.
pub fn daily_song(date: NaiveDate) -> i64 {
    let index = usize::try_from(date.num_days_from_ce().rem_euclid(SONG_POOL.len() as i32)).unwrap_or(0);
    SONG_POOL[index]
}

pub(crate) fn run<'a>(
    game: &'a GameInfo,
    data: &'a Data,
    _config: &'a ServerConfig,
) -> BoxFuture<'a, anyhow::Result<ScheduledEvents>> {
    Box::pin(async move {
        let today = data.clock().today();
        let stamp = today.format("%Y-%m-%d").to_string();

        // One pick per day, however often the sweep runs.
        let latest = data.network().get_events(Some(DAILY_SONG_EVENT), 1).await?;
        if latest
            .first()
            .is_some_and(|event| event.data.get_str("date", "") == stamp)
        {
            debug!("Daily song for {} already chosen", stamp);
            return Ok(Vec::new());
        }

        let mut event = ValidatedDict::new();
        event.replace_int("version", game.version);
        event.replace_int("song", daily_song(today));
        event.replace_str("date", stamp);
        Ok(vec![(DAILY_SONG_EVENT.to_string(), event)])
    })
}
