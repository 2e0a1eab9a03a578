//! Accounts, cards, per-game reference ids and profiles.

use crate::db::Session;
use crate::error::{is_constraint_violation, DataError};
use crate::types::{decode_blob, encode_blob, UserId};
use crate::validated::ValidatedDict;
use rusqlite::{params, OptionalExtension};
use tracing::info;

pub struct UserData<'a> {
    session: &'a Session,
}

impl<'a> UserData<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn from_cardid(&self, cardid: &str) -> Result<Option<UserId>, DataError> {
        self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT userid FROM card WHERE id = ?1",
                    params![cardid.to_uppercase()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Creates an account owning `cardid`.
    ///
    /// Returns `None` when the card already belongs to someone or the PIN is
    /// not four digits.
    pub async fn create_account(&self, cardid: &str, pin: &str) -> Result<Option<UserId>, DataError> {
        if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
        let cardid = cardid.to_uppercase();
        let created = self.session.with(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO user (pin, data) VALUES (?1, '{}')", params![pin])?;
            let userid = tx.last_insert_rowid();
            match tx.execute(
                "INSERT INTO card (id, userid) VALUES (?1, ?2)",
                params![cardid, userid],
            ) {
                Ok(_) => {
                    tx.commit()?;
                    Ok(Some(userid))
                }
                Err(e) if is_constraint_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;
        if let Some(userid) = created {
            info!("👤 Created user {} for card {}", userid, cardid);
        }
        Ok(created)
    }

    pub async fn validate_pin(&self, userid: UserId, pin: &str) -> Result<bool, DataError> {
        let stored: Option<String> = self.session.with(|conn| {
            Ok(conn
                .query_row("SELECT pin FROM user WHERE id = ?1", params![userid], |row| row.get(0))
                .optional()?)
        })?;
        Ok(stored.is_some_and(|stored| stored == pin))
    }

    /// Reference id for this user on a game/version, minting one if needed.
    pub async fn get_refid(&self, game: &str, version: i64, userid: UserId) -> Result<String, DataError> {
        if let Some(refid) = self.lookup_refid(game, version, userid)? {
            return Ok(refid);
        }
        self.create_refid(game, version, userid).await
    }

    /// Mints a reference id, or returns the one already assigned.
    pub async fn create_refid(&self, game: &str, version: i64, userid: UserId) -> Result<String, DataError> {
        let candidate = uuid::Uuid::new_v4().simple().to_string()[..16].to_uppercase();
        self.session.with(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO refid (refid, game, version, userid) VALUES (?1, ?2, ?3, ?4)",
                params![candidate, game, version, userid],
            )?;
            Ok(())
        })?;
        self.lookup_refid(game, version, userid)?
            .ok_or_else(|| DataError::NotFound(format!("refid for user {userid}")))
    }

    fn lookup_refid(&self, game: &str, version: i64, userid: UserId) -> Result<Option<String>, DataError> {
        self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT refid FROM refid WHERE game = ?1 AND version = ?2 AND userid = ?3",
                    params![game, version, userid],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub async fn from_refid(&self, game: &str, version: i64, refid: &str) -> Result<Option<UserId>, DataError> {
        self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT userid FROM refid WHERE refid = ?1 AND game = ?2 AND version = ?3",
                    params![refid, game, version],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub async fn get_profile(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
    ) -> Result<Option<ValidatedDict>, DataError> {
        let blob: Option<String> = self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT data FROM profile WHERE game = ?1 AND version = ?2 AND userid = ?3",
                    params![game, version, userid],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        Ok(blob.as_deref().map(decode_blob).transpose()?)
    }

    pub async fn put_profile(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
        profile: &ValidatedDict,
    ) -> Result<(), DataError> {
        let data = encode_blob(profile)?;
        self.session.with(|conn| {
            conn.execute(
                "INSERT INTO profile (game, version, userid, data) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (game, version, userid) DO UPDATE SET data = excluded.data",
                params![game, version, userid, data],
            )?;
            Ok(())
        })
    }

    /// This version's profile, or else the newest one the user has in the series.
    pub async fn get_any_profile(
        &self,
        game: &str,
        version: i64,
        userid: UserId,
    ) -> Result<Option<ValidatedDict>, DataError> {
        if let Some(profile) = self.get_profile(game, version, userid).await? {
            return Ok(Some(profile));
        }
        let blob: Option<String> = self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT data FROM profile WHERE game = ?1 AND userid = ?2 \
                     ORDER BY version DESC LIMIT 1",
                    params![game, userid],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        Ok(blob.as_deref().map(decode_blob).transpose()?)
    }

    /// [`UserData::get_any_profile`] for several users, in input order.
    pub async fn get_any_profiles(
        &self,
        game: &str,
        version: i64,
        userids: &[UserId],
    ) -> Result<Vec<(UserId, Option<ValidatedDict>)>, DataError> {
        let mut profiles = Vec::with_capacity(userids.len());
        for &userid in userids {
            profiles.push((userid, self.get_any_profile(game, version, userid).await?));
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, ValidatedDict};

    #[tokio::test]
    async fn accounts_cards_and_pins() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let users = data.user();

        assert_eq!(users.from_cardid("E004AAAA").await.unwrap(), None);
        let userid = users.create_account("e004aaaa", "1234").await.unwrap().unwrap();
        assert_eq!(users.from_cardid("E004AAAA").await.unwrap(), Some(userid));

        // the card is taken, and a bad PIN is refused outright
        assert_eq!(users.create_account("E004AAAA", "9999").await.unwrap(), None);
        assert_eq!(users.create_account("E004BBBB", "12a4").await.unwrap(), None);

        assert!(users.validate_pin(userid, "1234").await.unwrap());
        assert!(!users.validate_pin(userid, "4321").await.unwrap());
        assert!(!users.validate_pin(userid + 100, "1234").await.unwrap());
    }

    #[tokio::test]
    async fn refids_are_stable_per_version() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let users = data.user();
        let userid = users.create_account("E004CCCC", "0000").await.unwrap().unwrap();

        let refid = users.get_refid("SMP", 1, userid).await.unwrap();
        assert_eq!(refid.len(), 16);
        assert_eq!(users.create_refid("SMP", 1, userid).await.unwrap(), refid);
        assert_ne!(users.get_refid("SMP", 2, userid).await.unwrap(), refid);

        assert_eq!(users.from_refid("SMP", 1, &refid).await.unwrap(), Some(userid));
        assert_eq!(users.from_refid("SMP", 2, &refid).await.unwrap(), None);
    }

    #[tokio::test]
    async fn any_profile_falls_back_to_newest_version() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let users = data.user();

        let mut old = ValidatedDict::new();
        old.replace_str("name", "OLD");
        let mut newer = ValidatedDict::new();
        newer.replace_str("name", "NEWER");
        users.put_profile("SMP", 1, 5, &old).await.unwrap();
        users.put_profile("SMP", 2, 5, &newer).await.unwrap();

        assert!(users.get_profile("SMP", 3, 5).await.unwrap().is_none());
        let any = users.get_any_profile("SMP", 3, 5).await.unwrap().unwrap();
        assert_eq!(any.get_str("name", ""), "NEWER");
        let own = users.get_any_profile("SMP", 1, 5).await.unwrap().unwrap();
        assert_eq!(own.get_str("name", ""), "OLD");

        let many = users.get_any_profiles("SMP", 1, &[5, 6]).await.unwrap();
        assert_eq!(many.len(), 2);
        assert!(many[0].1.is_some());
        assert_eq!(many[1], (6, None));
    }
}
