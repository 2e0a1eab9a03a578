//! Persistent event log.
//!
//! Unhandled packets, handler crashes, cabinet `pcbevent` reports and
//! scheduler output all land here so they outlive the process.

use crate::db::Session;
use crate::error::DataError;
use crate::time::Clock;
use crate::types::{decode_blob, encode_blob, Event};
use crate::validated::ValidatedDict;
use rusqlite::params;

pub struct NetworkData<'a> {
    session: &'a Session,
    clock: &'a dyn Clock,
}

impl<'a> NetworkData<'a> {
    pub(crate) fn new(session: &'a Session, clock: &'a dyn Clock) -> Self {
        Self { session, clock }
    }

    /// Records an event, stamped now unless `timestamp` says otherwise.
    pub async fn put_event(
        &self,
        event_type: &str,
        data: &ValidatedDict,
        timestamp: Option<i64>,
    ) -> Result<(), DataError> {
        let ts = timestamp.unwrap_or_else(|| self.clock.now());
        let blob = encode_blob(data)?;
        self.session.with(|conn| {
            conn.execute(
                "INSERT INTO event (type, timestamp, data) VALUES (?1, ?2, ?3)",
                params![event_type, ts, blob],
            )?;
            Ok(())
        })
    }

    /// Newest events first, optionally of one type.
    pub async fn get_events(&self, event_type: Option<&str>, limit: usize) -> Result<Vec<Event>, DataError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.session.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, type, timestamp, userid, arcadeid, data FROM event \
                 WHERE (?1 IS NULL OR type = ?1) ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![event_type, limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, event_type, timestamp, userid, arcadeid, data)| {
                Ok(Event {
                    id,
                    event_type,
                    timestamp,
                    userid,
                    arcadeid,
                    data: decode_blob(&data)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::time::ManualClock;
    use crate::{Database, ValidatedDict};
    use std::sync::Arc;

    #[tokio::test]
    async fn events_are_listed_newest_first() {
        let db = Database::in_memory()
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(500)));
        let data = db.data().unwrap();
        let network = data.network();

        let mut body = ValidatedDict::new();
        body.replace_str("request", "<call/>");
        network.put_event("unhandled_packet", &body, None).await.unwrap();
        network.put_event("pcbevent", &ValidatedDict::new(), Some(42)).await.unwrap();
        network.put_event("unhandled_packet", &ValidatedDict::new(), None).await.unwrap();

        let all = network.get_events(None, 10).await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>(),
            vec!["unhandled_packet", "pcbevent", "unhandled_packet"]
        );
        assert_eq!(all[1].timestamp, 42);
        assert_eq!(all[2].timestamp, 500);

        let unhandled = network.get_events(Some("unhandled_packet"), 1).await.unwrap();
        assert_eq!(unhandled.len(), 1);
        assert!(unhandled[0].data.is_empty());
    }
}
