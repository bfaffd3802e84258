use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS launches (
            id TEXT PRIMARY KEY NOT NULL,
            url TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            image TEXT,
            net INTEGER NOT NULL,
            mission_id TEXT,
            mission_name TEXT,
            mission_description TEXT,
            pad_id TEXT,
            pad_name TEXT,
            pad_latitude TEXT,
            pad_longitude TEXT,
            provider_id TEXT,
            provider_name TEXT,
            status_id TEXT NOT NULL,
            status_name TEXT NOT NULL,
            info_url TEXT,
            video_url TEXT
        );

        CREATE INDEX IF NOT EXISTS launches_net ON launches(net, id);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
