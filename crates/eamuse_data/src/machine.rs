//! Cabinets, arcades and per-arcade game settings.

use crate::db::Session;
use crate::error::DataError;
use crate::types::{decode_blob, encode_blob, Arcade, ArcadeId, Machine};
use crate::validated::ValidatedDict;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

/// Display name given to cabinets that register themselves.
pub const DEFAULT_MACHINE_NAME: &str = "Unnamed machine";

pub struct MachineData<'a> {
    session: &'a Session,
}

struct MachineRow {
    id: i64,
    pcbid: String,
    name: String,
    description: String,
    arcade: Option<ArcadeId>,
    port: i64,
    game: Option<String>,
    version: Option<i64>,
    data: String,
}

impl MachineRow {
    const COLUMNS: &'static str = "id, pcbid, name, description, arcadeid, port, game, version, data";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pcbid: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            arcade: row.get(4)?,
            port: row.get(5)?,
            game: row.get(6)?,
            version: row.get(7)?,
            data: row.get(8)?,
        })
    }

    fn into_machine(self) -> Result<Machine, DataError> {
        Ok(Machine {
            id: self.id,
            pcbid: self.pcbid,
            name: self.name,
            description: self.description,
            arcade: self.arcade,
            port: u16::try_from(self.port).unwrap_or_default(),
            game: self.game,
            version: self.version,
            data: decode_blob(&self.data)?,
        })
    }
}

impl<'a> MachineData<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn get_machine(&self, pcbid: &str) -> Result<Option<Machine>, DataError> {
        let row = self.session.with(|conn| {
            let sql = format!("SELECT {} FROM machine WHERE pcbid = ?1", MachineRow::COLUMNS);
            Ok(conn
                .query_row(&sql, params![pcbid], MachineRow::from_row)
                .optional()?)
        })?;
        row.map(MachineRow::into_machine).transpose()
    }

    /// Registers a cabinet seen for the first time.
    ///
    /// Returns the existing row if another request registered it first.
    pub async fn create_machine(&self, pcbid: &str) -> Result<Machine, DataError> {
        let inserted = self.session.with(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO machine (pcbid, name, description, port, data) \
                 VALUES (?1, ?2, '', 0, '{}')",
                params![pcbid, DEFAULT_MACHINE_NAME],
            )?)
        })?;
        if inserted > 0 {
            info!("🕹️ Registered new machine {}", pcbid);
        }
        self.get_machine(pcbid)
            .await?
            .ok_or_else(|| DataError::NotFound(format!("machine {pcbid}")))
    }

    /// Saves every mutable column of `machine`, matched by PCBID.
    pub async fn put_machine(&self, machine: &Machine) -> Result<(), DataError> {
        let data = encode_blob(&machine.data)?;
        self.session.with(|conn| {
            conn.execute(
                "UPDATE machine SET name = ?2, description = ?3, arcadeid = ?4, port = ?5, \
                 game = ?6, version = ?7, data = ?8 WHERE pcbid = ?1",
                params![
                    machine.pcbid,
                    machine.name,
                    machine.description,
                    machine.arcade,
                    i64::from(machine.port),
                    machine.game,
                    machine.version,
                    data,
                ],
            )?;
            Ok(())
        })
    }

    pub async fn get_arcade(&self, id: ArcadeId) -> Result<Option<Arcade>, DataError> {
        let row = self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, description, data FROM arcade WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?)
        })?;
        row.map(|(id, name, description, data)| {
            Ok(Arcade {
                id,
                name,
                description,
                data: decode_blob(&data)?,
            })
        })
        .transpose()
    }

    pub async fn create_arcade(
        &self,
        name: &str,
        description: &str,
        data: &ValidatedDict,
    ) -> Result<Arcade, DataError> {
        let blob = encode_blob(data)?;
        let id = self.session.with(|conn| {
            conn.execute(
                "INSERT INTO arcade (name, description, data) VALUES (?1, ?2, ?3)",
                params![name, description, blob],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(Arcade {
            id,
            name: name.to_string(),
            description: description.to_string(),
            data: data.clone(),
        })
    }

    pub async fn put_arcade(&self, arcade: &Arcade) -> Result<(), DataError> {
        let data = encode_blob(&arcade.data)?;
        self.session.with(|conn| {
            conn.execute(
                "UPDATE arcade SET name = ?2, description = ?3, data = ?4 WHERE id = ?1",
                params![arcade.id, arcade.name, arcade.description, data],
            )?;
            Ok(())
        })
    }

    /// Per-arcade settings of one kind for a game/version.
    pub async fn get_settings(
        &self,
        arcade: ArcadeId,
        game: &str,
        version: i64,
        setting: &str,
    ) -> Result<Option<ValidatedDict>, DataError> {
        let blob: Option<String> = self.session.with(|conn| {
            Ok(conn
                .query_row(
                    "SELECT data FROM arcade_settings \
                     WHERE arcadeid = ?1 AND game = ?2 AND version = ?3 AND type = ?4",
                    params![arcade, game, version, setting],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        blob.as_deref().map(decode_blob).transpose().map_err(Into::into)
    }

    pub async fn put_settings(
        &self,
        arcade: ArcadeId,
        game: &str,
        version: i64,
        setting: &str,
        settings: &ValidatedDict,
    ) -> Result<(), DataError> {
        let data = encode_blob(settings)?;
        self.session.with(|conn| {
            conn.execute(
                "INSERT INTO arcade_settings (arcadeid, game, version, type, data) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT (arcadeid, game, version, type) DO UPDATE SET data = excluded.data",
                params![arcade, game, version, setting, data],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::ValidatedDict;

    #[tokio::test]
    async fn unknown_machines_are_created_once() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let machines = data.machine();

        assert!(machines.get_machine("0101").await.unwrap().is_none());
        let first = machines.create_machine("0101").await.unwrap();
        let again = machines.create_machine("0101").await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.port, 0);
        assert_eq!(first.arcade, None);
        assert!(first.data.is_empty());
    }

    #[tokio::test]
    async fn machine_updates_and_arcade_settings() {
        let db = Database::in_memory().unwrap();
        let data = db.data().unwrap();
        let machines = data.machine();

        let mut flags = ValidatedDict::new();
        flags.replace_bool("paseli_enabled", true);
        let arcade = machines.create_arcade("Round One", "", &flags).await.unwrap();

        let mut machine = machines.create_machine("0202").await.unwrap();
        machine.name = "Cab 2".to_string();
        machine.arcade = Some(arcade.id);
        machine.data.replace_int("coins", 3);
        machines.put_machine(&machine).await.unwrap();

        let stored = machines.get_machine("0202").await.unwrap().unwrap();
        assert_eq!(stored.name, "Cab 2");
        assert_eq!(stored.arcade, Some(arcade.id));
        assert_eq!(stored.data.get_int("coins", 0), 3);

        let loaded = machines.get_arcade(arcade.id).await.unwrap().unwrap();
        assert!(loaded.data.get_bool("paseli_enabled", false));

        assert!(machines
            .get_settings(arcade.id, "SMP", 1, "game_config")
            .await
            .unwrap()
            .is_none());
        let mut config = ValidatedDict::new();
        config.replace_int("difficulty", 4);
        machines
            .put_settings(arcade.id, "SMP", 1, "game_config", &config)
            .await
            .unwrap();
        config.replace_int("difficulty", 5);
        machines
            .put_settings(arcade.id, "SMP", 1, "game_config", &config)
            .await
            .unwrap();
        let settings = machines
            .get_settings(arcade.id, "SMP", 1, "game_config")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settings.get_int("difficulty", 0), 5);
    }
}
