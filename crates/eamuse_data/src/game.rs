//! Per-user settings shared by every version of a game series.

use crate::db::Session;
use crate::error::DataError;
use crate::stats;
use crate::time::Clock;
use crate::types::{decode_blob, encode_blob, UserId};
use crate::validated::ValidatedDict;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

const SELECT_SETTINGS: &str = "SELECT data FROM series_settings WHERE game = ?1 AND userid = ?2";
const UPSERT_SETTINGS: &str = "INSERT INTO series_settings (game, userid, data) VALUES (?1, ?2, ?3) \
     ON CONFLICT (game, userid) DO UPDATE SET data = excluded.data";

pub struct GameData<'a> {
    session: &'a Session,
    clock: &'a dyn Clock,
}

impl<'a> GameData<'a> {
    pub(crate) fn new(session: &'a Session, clock: &'a dyn Clock) -> Self {
        Self { session, clock }
    }

    pub async fn get_settings(&self, game: &str, userid: UserId) -> Result<Option<ValidatedDict>, DataError> {
        let blob: Option<String> = self.session.with(|conn| {
            Ok(conn
                .query_row(SELECT_SETTINGS, params![game, userid], |row| row.get(0))
                .optional()?)
        })?;
        Ok(blob.as_deref().map(decode_blob).transpose()?)
    }

    /// Replaces the whole settings blob in one statement.
    pub async fn put_settings(&self, game: &str, userid: UserId, settings: &ValidatedDict) -> Result<(), DataError> {
        let data = encode_blob(settings)?;
        self.session.with(|conn| {
            conn.execute(UPSERT_SETTINGS, params![game, userid, data])?;
            Ok(())
        })
    }

    /// Play statistics for a series, empty if the user never played it.
    pub async fn get_play_statistics(&self, game: &str, userid: UserId) -> Result<ValidatedDict, DataError> {
        Ok(self.get_settings(game, userid).await?.unwrap_or_default())
    }

    /// Records one play against the series statistics and saves them back.
    ///
    /// The read and the write share one immediate transaction, so plays
    /// recorded from two machines at once are both counted.
    ///
    /// Returns the updated statistics.
    pub async fn update_play_statistics(
        &self,
        game: &str,
        userid: UserId,
        extra: Option<&ValidatedDict>,
    ) -> Result<ValidatedDict, DataError> {
        self.session.with(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let blob: Option<String> = tx
                .query_row(SELECT_SETTINGS, params![game, userid], |row| row.get(0))
                .optional()?;
            let mut settings = blob.as_deref().map(decode_blob).transpose()?.unwrap_or_default();

            stats::record_play(&mut settings, extra, self.clock);
            tx.execute(UPSERT_SETTINGS, params![game, userid, encode_blob(&settings)?])?;
            tx.commit()?;
            Ok(settings)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::time::ManualClock;
    use crate::{Database, DatabaseConfig, DataError, ValidatedDict};
    use std::sync::Arc;

    #[tokio::test]
    async fn statistics_are_per_series() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let db = Database::in_memory().unwrap().with_clock(clock.clone());
        let data = db.data().unwrap();
        let game = data.game();

        assert!(game.get_play_statistics("SMP", 1).await.unwrap().is_empty());
        game.update_play_statistics("SMP", 1, None).await.unwrap();
        clock.advance(10);
        let stats = game.update_play_statistics("SMP", 1, None).await.unwrap();
        assert_eq!(stats.get_int("total_plays", 0), 2);
        assert_eq!(stats.get_int("today_plays", 0), 2);

        let stored = game.get_settings("SMP", 1).await.unwrap().unwrap();
        assert_eq!(stored, stats);
        assert!(game.get_settings("XYZ", 1).await.unwrap().is_none());

        let mut other = ValidatedDict::new();
        other.replace_int("volume", 3);
        game.put_settings("XYZ", 1, &other).await.unwrap();
        assert_eq!(game.get_settings("XYZ", 1).await.unwrap().unwrap().get_int("volume", 0), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_plays_are_all_counted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&DatabaseConfig {
            path: Some(dir.path().join("eamuse.db")),
            ..DatabaseConfig::default()
        })
        .unwrap();

        let machines: Vec<_> = (0..2)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    let data = db.data()?;
                    for _ in 0..25 {
                        data.game().update_play_statistics("SMP", 7, None).await?;
                    }
                    Ok::<_, DataError>(())
                })
            })
            .collect();
        for machine in machines {
            machine.await.unwrap().unwrap();
        }

        let stats = db.data().unwrap().game().get_play_statistics("SMP", 7).await.unwrap();
        assert_eq!(stats.get_int("total_plays", 0), 50);
    }
}
