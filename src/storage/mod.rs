use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};
use crate::model::{Agency, LaunchRecord, LaunchStatus, Mission, Pad};

mod schema;

const LAUNCH_COLUMNS: &str = "id, url, name, slug, image, net,
        mission_id, mission_name, mission_description,
        pad_id, pad_name, pad_latitude, pad_longitude,
        provider_id, provider_name,
        status_id, status_name,
        info_url, video_url";

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Inserts or wholesale-replaces every record by id in one transaction.
    pub fn upsert_launches(&self, launches: &[LaunchRecord]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().context("starting upsert transaction")?;
        let mut written = 0;
        {
            let sql = format!(
                "INSERT OR REPLACE INTO launches ({LAUNCH_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            );
            let mut stmt = tx.prepare(&sql)?;
            for launch in launches {
                let net = i64::try_from(launch.net.unix_timestamp_nanos())
                    .with_context(|| format!("net of launch {} out of range", launch.id))?;
                let mission = launch.mission.as_ref();
                let pad = launch.pad.as_ref();
                let provider = launch.provider.as_ref();
                written += stmt
                    .execute(params![
                        launch.id,
                        launch.url,
                        launch.name,
                        launch.slug,
                        launch.image,
                        net,
                        mission.map(|m| &m.id),
                        mission.map(|m| &m.name),
                        mission.map(|m| &m.description),
                        pad.map(|p| &p.id),
                        pad.map(|p| &p.name),
                        pad.map(|p| &p.latitude),
                        pad.map(|p| &p.longitude),
                        provider.map(|a| &a.id),
                        provider.map(|a| &a.name),
                        launch.status.id,
                        launch.status.name,
                        launch.info_url,
                        launch.video_url,
                    ])
                    .with_context(|| format!("upserting launch {}", launch.id))?;
            }
        }
        tx.commit().context("committing upsert transaction")?;
        Ok(written)
    }

    /// Every stored launch, `net` ascending.
    pub fn fetch_launches(&self) -> Result<Vec<LaunchRecord>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {LAUNCH_COLUMNS} FROM launches ORDER BY net ASC, id ASC");
            let mut stmt = conn.prepare(&sql)?;
            let launches = stmt
                .query_map([], launch_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("querying launches")?;
            Ok(launches)
        })
    }

    pub fn fetch_launch_by_id(&self, id: &str) -> Result<Option<LaunchRecord>> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {LAUNCH_COLUMNS} FROM launches WHERE id = ?1");
            let launch = conn
                .query_row(&sql, params![id], launch_from_row)
                .optional()
                .with_context(|| format!("querying launch {id}"))?;
            Ok(launch)
        })
    }

    pub fn count_launches(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM launches", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

fn launch_from_row(row: &Row<'_>) -> rusqlite::Result<LaunchRecord> {
    let net_nanos: i64 = row.get(5)?;
    let net = OffsetDateTime::from_unix_timestamp_nanos(i128::from(net_nanos))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(5, Type::Integer, Box::new(err)))?;

    let mission = match row.get::<_, Option<String>>(6)? {
        Some(id) => Some(Mission {
            id,
            name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            description: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        }),
        None => None,
    };
    let pad = match row.get::<_, Option<String>>(9)? {
        Some(id) => Some(Pad {
            id,
            name: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            latitude: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            longitude: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        }),
        None => None,
    };
    let provider = match row.get::<_, Option<String>>(13)? {
        Some(id) => Some(Agency {
            id,
            name: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(LaunchRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        image: row.get(4)?,
        net,
        mission,
        pad,
        provider,
        status: LaunchStatus {
            id: row.get(15)?,
            name: row.get(16)?,
        },
        info_url: row.get(17)?,
        video_url: row.get(18)?,
    })
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "launch database ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::init_storage;
    use super::*;
    use crate::model::fixtures::launch;
    use time::macros::datetime;

    #[test]
    fn upsert_replaces_by_id_and_orders_by_net() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let a = launch("a", datetime!(2021-03-02 00:00 UTC), Some("spx"));
        let b = launch("b", datetime!(2021-03-01 00:00 UTC), Some("spx"));
        storage.upsert_launches(&[a.clone(), b.clone()])?;

        let mut moved = b.clone();
        moved.net = datetime!(2021-03-05 00:00 UTC);
        moved.name = "Rescheduled".into();
        storage.upsert_launches(&[moved.clone()])?;

        let launches = storage.fetch_launches()?;
        assert_eq!(launches, vec![a, moved]);
        assert_eq!(storage.count_launches()?, 2);
        Ok(())
    }

    #[test]
    fn optional_nested_values_survive_storage() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut full = launch("full", datetime!(2021-03-01 12:30:15.25 +02:00), Some("Artemis"));
        full.pad = Some(Pad {
            id: "39".into(),
            name: "LC-39B".into(),
            latitude: "28.627".into(),
            longitude: "-80.620".into(),
        });
        full.provider = Some(Agency {
            id: "44".into(),
            name: "NASA".into(),
        });
        full.image = Some("https://example.invalid/a.png".into());
        full.info_url = Some("https://example.invalid/info".into());
        let bare = launch("bare", datetime!(2021-03-02 00:00 UTC), None);
        storage.upsert_launches(&[full.clone(), bare.clone()])?;

        assert_eq!(storage.fetch_launch_by_id("full")?, Some(full));
        assert_eq!(storage.fetch_launch_by_id("bare")?, Some(bare));
        assert_eq!(storage.fetch_launch_by_id("missing")?, None);
        Ok(())
    }

    #[test]
    fn equal_net_ties_break_by_id() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let net = datetime!(2021-03-01 00:00 UTC);
        storage.upsert_launches(&[launch("z", net, None), launch("c", net, None)])?;
        let ids: Vec<_> = storage
            .fetch_launches()?
            .into_iter()
            .map(|launch| launch.id)
            .collect();
        assert_eq!(ids, vec!["c", "z"]);
        Ok(())
    }
}
