//! Best scores and attempt history.
//!
//! Scores and attempts are keyed by a derived music id that folds song,
//! game version and chart into one integer:
//!
//! ```text
//! musicid = songid * 10000 + version * 100 + chart
//! ```
//!
//! `version` and `chart` must both stay below 100 for [`song_id`] and
//! [`song_chart`] to recover the inputs.

use crate::db::Session;
use crate::error::{is_constraint_violation, DataError};
use crate::time::Clock;
use crate::types::{decode_blob, encode_blob, Attempt, LastPlayed, PlayCount, Score, UserId};
use crate::validated::ValidatedDict;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

/// Folds song, version and chart into the storage key.
pub fn music_id(song_id: i64, version: i64, chart: i64) -> i64 {
    song_id * 10_000 + version * 100 + chart
}

/// Like [`music_id`], but refuses a version or chart outside `0..100`.
pub fn checked_music_id(song_id: i64, version: i64, chart: i64) -> Result<i64, DataError> {
    if !(0..100).contains(&version) || !(0..100).contains(&chart) {
        return Err(DataError::InvalidMusic {
            song_id,
            version,
            chart,
        });
    }
    Ok(music_id(song_id, version, chart))
}

pub fn song_id(music_id: i64) -> i64 {
    music_id / 10_000
}

pub fn song_chart(music_id: i64) -> i64 {
    music_id % 100
}

/// The game version encoded in a music id.
pub fn song_version(music_id: i64) -> i64 {
    (music_id / 100) % 100
}

/// One play as reported by a game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayRecord {
    pub song_id: i64,
    pub chart: i64,
    /// Machine id the play happened on.
    pub location: i64,
    pub points: i64,
    pub data: ValidatedDict,
    pub new_record: bool,
    /// Defaults to the data clock's current time.
    pub timestamp: Option<i64>,
}

pub struct MusicData<'a> {
    session: &'a Session,
    clock: &'a dyn Clock,
}

impl<'a> MusicData<'a> {
    pub(crate) fn new(session: &'a Session, clock: &'a dyn Clock) -> Self {
        Self { session, clock }
    }

    /// Saves a new or updated best score.
    ///
    /// On a new record the achieved-at timestamp and location move to this
    /// play. Otherwise only points, payload and the update time change, so
    /// the original achieved-at time survives.
    pub async fn put_score(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
        play: &PlayRecord,
    ) -> Result<(), DataError> {
        let musicid = checked_music_id(play.song_id, version, play.chart)?;
        let ts = play.timestamp.unwrap_or_else(|| self.clock.now());
        let data = encode_blob(&play.data)?;

        let on_conflict = if play.new_record {
            "data = excluded.data, points = excluded.points, timestamp = excluded.timestamp, \
             \"update\" = excluded.\"update\", lid = excluded.lid"
        } else {
            "data = excluded.data, points = excluded.points, \"update\" = excluded.\"update\""
        };
        let sql = format!(
            "INSERT INTO score (userid, game, musicid, points, data, timestamp, \"update\", lid) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7) \
             ON CONFLICT (userid, musicid) DO UPDATE SET {on_conflict}"
        );

        self.session.with(|conn| {
            conn.execute(
                &sql,
                params![userid, game, musicid, play.points, data, ts, play.location],
            )?;
            Ok(())
        })?;
        debug!("Saved score for user {} music {} ({} points)", userid, musicid, play.points);
        Ok(())
    }

    /// Appends one attempt to the history.
    ///
    /// A second attempt by the same user on the same chart at the same
    /// timestamp fails with [`DataError::ScoreSave`]. Anonymous plays are
    /// stored under user 0.
    pub async fn put_attempt(
        &self,
        game: &str,
        version: i64,
        userid: Option<UserId>,
        play: &PlayRecord,
    ) -> Result<(), DataError> {
        let userid = userid.unwrap_or(0);
        let musicid = checked_music_id(play.song_id, version, play.chart)?;
        let ts = play.timestamp.unwrap_or_else(|| self.clock.now());
        let data = encode_blob(&play.data)?;

        let result = self.session.with(|conn| {
            conn.execute(
                "INSERT INTO score_history (userid, game, musicid, timestamp, lid, new_record, points, data) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    userid,
                    game,
                    musicid,
                    ts,
                    play.location,
                    i64::from(play.new_record),
                    play.points,
                    data,
                ],
            )?;
            Ok(())
        });

        match result {
            Err(DataError::Sqlite(e)) if is_constraint_violation(&e) => {
                warn!("Duplicate attempt by {} for music id {} at {}", userid, musicid, ts);
                Err(DataError::ScoreSave {
                    userid,
                    musicid,
                    timestamp: ts,
                })
            }
            other => other,
        }
    }

    /// A user's best score on one chart, with its play count.
    pub async fn get_score(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
        song: i64,
        chart: i64,
    ) -> Result<Option<Score>, DataError> {
        let musicid = music_id(song, version, chart);
        let row = self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT score.id, score.points, score.timestamp, score.\"update\", score.lid, \
                     (SELECT COUNT(*) FROM score_history h \
                      WHERE h.userid = score.userid AND h.musicid = score.musicid AND h.game = score.game), \
                     score.data \
                     FROM score WHERE score.userid = ?1 AND score.musicid = ?2 AND score.game = ?3",
                    params![userid, musicid, game],
                    |row| {
                        Ok(ScoreRow {
                            musicid,
                            key: row.get(0)?,
                            points: row.get(1)?,
                            timestamp: row.get(2)?,
                            update: row.get(3)?,
                            location: row.get(4)?,
                            plays: row.get(5)?,
                            data: row.get(6)?,
                        })
                    },
                )
                .optional()?)
        })?;
        row.map(ScoreRow::into_score).transpose()
    }

    /// Every best score a user holds for this game version.
    ///
    /// `since` is inclusive and `until` exclusive; both compare against the
    /// score's last update time.
    pub async fn get_scores(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
        since: Option<i64>,
        until: Option<i64>,
    ) -> Result<Vec<Score>, DataError> {
        let rows = self.session.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT score.musicid, score.id, score.points, score.timestamp, score.\"update\", score.lid, \
                 (SELECT COUNT(*) FROM score_history h \
                  WHERE h.userid = score.userid AND h.musicid = score.musicid AND h.game = score.game), \
                 score.data \
                 FROM score \
                 WHERE score.userid = ?1 AND score.game = ?2 AND (score.musicid / 100) % 100 = ?3 \
                 AND (?4 IS NULL OR score.\"update\" >= ?4) \
                 AND (?5 IS NULL OR score.\"update\" < ?5) \
                 ORDER BY score.musicid",
            )?;
            let rows = stmt
                .query_map(params![userid, game, version, since, until], |row| {
                    Ok(ScoreRow {
                        musicid: row.get(0)?,
                        key: row.get(1)?,
                        points: row.get(2)?,
                        timestamp: row.get(3)?,
                        update: row.get(4)?,
                        location: row.get(5)?,
                        plays: row.get(6)?,
                        data: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(ScoreRow::into_score).collect()
    }

    /// Charts this user played most often, most plays first.
    pub async fn get_most_played(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
        count: usize,
    ) -> Result<Vec<PlayCount>, DataError> {
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        self.session.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT musicid, COUNT(*) AS plays FROM score_history \
                 WHERE userid = ?1 AND game = ?2 AND (musicid / 100) % 100 = ?3 \
                 GROUP BY musicid ORDER BY plays DESC, musicid ASC LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(params![userid, game, version, limit], |row| {
                    let musicid: i64 = row.get(0)?;
                    Ok(PlayCount {
                        song_id: song_id(musicid),
                        chart: song_chart(musicid),
                        plays: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Charts this user played most recently, newest first.
    pub async fn get_last_played(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
        count: usize,
    ) -> Result<Vec<LastPlayed>, DataError> {
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        self.session.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT musicid, MAX(timestamp) AS last FROM score_history \
                 WHERE userid = ?1 AND game = ?2 AND (musicid / 100) % 100 = ?3 \
                 GROUP BY musicid ORDER BY last DESC, musicid ASC LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(params![userid, game, version, limit], |row| {
                    let musicid: i64 = row.get(0)?;
                    Ok(LastPlayed {
                        song_id: song_id(musicid),
                        chart: song_chart(musicid),
                        timestamp: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Looks up one attempt by the key a previous lookup returned.
    pub async fn get_attempt_by_key(
        &self,
        game: &str,
        version: i64,
        key: i64,
    ) -> Result<Option<(UserId, Attempt)>, DataError> {
        let row = self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT userid, musicid, points, timestamp, lid, new_record, data \
                     FROM score_history \
                     WHERE id = ?1 AND game = ?2 AND (musicid / 100) % 100 = ?3",
                    params![key, game, version],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        let Some((userid, musicid, points, timestamp, location, new_record, data)) = row else {
            return Ok(None);
        };
        Ok(Some((
            userid,
            Attempt {
                key,
                song_id: song_id(musicid),
                chart: song_chart(musicid),
                points,
                timestamp,
                location,
                new_record: new_record == 1,
                data: decode_blob(&data)?,
            },
        )))
    }
}

struct ScoreRow {
    musicid: i64,
    key: i64,
    points: i64,
    timestamp: i64,
    update: i64,
    location: i64,
    plays: i64,
    data: String,
}

impl ScoreRow {
    fn into_score(self) -> Result<Score, DataError> {
        Ok(Score {
            key: self.key,
            song_id: song_id(self.musicid),
            chart: song_chart(self.musicid),
            points: self.points,
            timestamp: self.timestamp,
            update: self.update,
            location: self.location,
            plays: self.plays,
            data: decode_blob(&self.data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use crate::Database;
    use std::sync::Arc;

    fn play(points: i64, new_record: bool, timestamp: i64) -> PlayRecord {
        let mut data = ValidatedDict::new();
        data.replace_int("combo", points / 10);
        PlayRecord {
            song_id: 1234,
            chart: 2,
            location: 7,
            points,
            data,
            new_record,
            timestamp: Some(timestamp),
        }
    }

    #[test]
    fn music_id_inverts() {
        for &(song, version, chart) in &[(0, 0, 0), (1, 1, 1), (1234, 27, 99), (99_999, 99, 4)] {
            let id = music_id(song, version, chart);
            assert_eq!(song_id(id), song);
            assert_eq!(song_chart(id), chart);
            assert_eq!(song_version(id), version);
        }
        assert_eq!(music_id(1234, 10, 2), 12_341_002);
    }

    #[tokio::test]
    async fn non_record_write_keeps_first_timestamp() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let music = data.music();

        music.put_score("SMP", 10, 1, &play(900, true, 1_000)).await.unwrap();
        music.put_score("SMP", 10, 1, &play(900, false, 2_000)).await.unwrap();
        music.put_score("SMP", 10, 1, &play(900, false, 3_000)).await.unwrap();

        let score = music.get_score("SMP", 10, 1, 1234, 2).await.unwrap().unwrap();
        assert_eq!(score.points, 900);
        assert_eq!(score.timestamp, 1_000);
        assert_eq!(score.update, 3_000);
        assert_eq!(score.data.get_int("combo", 0), 90);
        assert_eq!(score.song_id, 1234);
        assert_eq!(score.chart, 2);
    }

    #[tokio::test]
    async fn new_record_moves_timestamp_and_location() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let music = data.music();

        music.put_score("SMP", 10, 1, &play(900, true, 1_000)).await.unwrap();
        let mut again = play(900, true, 5_000);
        again.location = 9;
        music.put_score("SMP", 10, 1, &again).await.unwrap();

        let score = music.get_score("SMP", 10, 1, 1234, 2).await.unwrap().unwrap();
        assert_eq!(score.timestamp, 5_000);
        assert_eq!(score.update, 5_000);
        assert_eq!(score.location, 9);
    }

    #[tokio::test]
    async fn out_of_range_chart_or_version_is_refused() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let music = data.music();

        let mut kept = play(700, true, 1_000);
        kept.chart = 0;
        music.put_score("SMP", 11, 1, &kept).await.unwrap();

        // chart 100 on version 10 would alias version 11 chart 0
        let mut wide = play(950, true, 2_000);
        wide.chart = 100;
        let err = music.put_score("SMP", 10, 1, &wide).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidMusic { version: 10, chart: 100, .. }));
        assert!(music.put_attempt("SMP", 10, Some(1), &wide).await.is_err());
        assert!(matches!(
            music.put_score("SMP", 100, 1, &play(950, true, 2_000)).await,
            Err(DataError::InvalidMusic { version: 100, .. })
        ));
        assert!(music.put_attempt("SMP", -1, Some(1), &play(950, true, 2_000)).await.is_err());

        let score = music.get_score("SMP", 11, 1, 1234, 0).await.unwrap().unwrap();
        assert_eq!(score.points, 700);
        assert_eq!(score.timestamp, 1_000);

        let attempts: i64 = data
            .session()
            .with(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM score_history", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(attempts, 0);
        assert_eq!(checked_music_id(1234, 99, 99).unwrap(), music_id(1234, 99, 99));
    }

    #[tokio::test]
    async fn duplicate_attempt_is_a_save_conflict() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let music = data.music();

        music.put_attempt("SMP", 10, Some(1), &play(500, false, 1_000)).await.unwrap();
        let err = music
            .put_attempt("SMP", 10, Some(1), &play(600, true, 1_000))
            .await
            .unwrap_err();
        assert!(err.is_save_conflict());
        assert_eq!(
            err.to_string(),
            format!("There is already an attempt by 1 for music id {} at 1000", music_id(1234, 10, 2))
        );

        let count: i64 = data
            .session()
            .with(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM score_history", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn score_window_and_play_counts() {
        let clock = Arc::new(ManualClock::new(10_000));
        let db = Database::in_memory().unwrap().with_clock(clock.clone());
        let data = db.data().unwrap();
        let music = data.music();

        for (song, ts) in [(1, 100), (2, 200), (3, 300)] {
            let record = PlayRecord {
                song_id: song,
                timestamp: Some(ts),
                new_record: true,
                ..PlayRecord::default()
            };
            music.put_score("SMP", 10, 1, &record).await.unwrap();
            music.put_attempt("SMP", 10, Some(1), &record).await.unwrap();
        }
        // a different version shares the table but not the listing
        music
            .put_score("SMP", 11, 1, &PlayRecord { song_id: 4, ..PlayRecord::default() })
            .await
            .unwrap();

        let all = music.get_scores("SMP", 10, 1, None, None).await.unwrap();
        assert_eq!(all.iter().map(|s| s.song_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(all.iter().all(|s| s.plays == 1));

        let window = music.get_scores("SMP", 10, 1, Some(200), Some(300)).await.unwrap();
        assert_eq!(window.iter().map(|s| s.song_id).collect::<Vec<_>>(), vec![2]);

        let newer = music.get_scores("SMP", 11, 1, None, None).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].timestamp, 10_000);
    }

    #[tokio::test]
    async fn most_and_last_played() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let music = data.music();

        let plays = [(1, 0, 10), (1, 0, 20), (1, 0, 30), (2, 1, 40), (2, 1, 50), (3, 0, 5)];
        for (song, chart, ts) in plays {
            let record = PlayRecord {
                song_id: song,
                chart,
                timestamp: Some(ts),
                ..PlayRecord::default()
            };
            music.put_attempt("SMP", 10, Some(1), &record).await.unwrap();
        }

        let most = music.get_most_played("SMP", 10, 1, 2).await.unwrap();
        assert_eq!(
            most,
            vec![
                PlayCount { song_id: 1, chart: 0, plays: 3 },
                PlayCount { song_id: 2, chart: 1, plays: 2 },
            ]
        );

        let last = music.get_last_played("SMP", 10, 1, 3).await.unwrap();
        assert_eq!(
            last.iter().map(|l| (l.song_id, l.timestamp)).collect::<Vec<_>>(),
            vec![(2, 50), (1, 30), (3, 5)]
        );
    }

    #[tokio::test]
    async fn attempt_lookup_by_key() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let music = data.music();

        music.put_attempt("SMP", 10, Some(3), &play(750, true, 42)).await.unwrap();
        let key: i64 = data
            .session()
            .with(|conn| Ok(conn.query_row("SELECT id FROM score_history", [], |r| r.get(0))?))
            .unwrap();

        let (userid, attempt) = music.get_attempt_by_key("SMP", 10, key).await.unwrap().unwrap();
        assert_eq!(userid, 3);
        assert_eq!(attempt.points, 750);
        assert!(attempt.new_record);
        assert_eq!((attempt.song_id, attempt.chart), (1234, 2));

        assert!(music.get_attempt_by_key("SMP", 11, key).await.unwrap().is_none());
        assert!(music.get_attempt_by_key("XYZ", 10, key).await.unwrap().is_none());
    }
}
