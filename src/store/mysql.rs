use super::{SongStore, StoreError, StoreResult, TABLE_NAME};
use crate::config::ServerSettings;
use crate::song::{SotdCandidate, Song, StoredSong, DEFAULT_PROJECT_ID};
use crate::sync::Reconciliation;
use chrono::NaiveDate;
use log::{debug, warn};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, Transaction};
use std::collections::HashSet;
use tokio::runtime::{Builder, Runtime};

/// `liked_songs` on a MySQL server (the local profile).
///
/// Blocks on a private current-thread runtime, like [`super::postgres::PostgresStore`].
pub struct MySqlStore {
    runtime: Runtime,
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn connect(server: &ServerSettings) -> StoreResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        let mut options = MySqlConnectOptions::new()
            .host(&server.host)
            .username(&server.user)
            .password(&server.password)
            .database(&server.name);
        if let Some(port) = server.port {
            options = options.port(port);
        }

        let pool = runtime.block_on(
            MySqlPoolOptions::new()
                .max_connections(1)
                .connect_with(options),
        )?;
        Ok(Self { runtime, pool })
    }
}

fn duplicate_or_sql(err: sqlx::Error, song_id: &str) -> StoreError {
    if matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()) {
        StoreError::Duplicate {
            song_id: song_id.to_string(),
        }
    } else {
        StoreError::Sql(err)
    }
}

async fn table_exists(pool: &MySqlPool) -> StoreResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables
         WHERE table_schema = DATABASE() AND table_name = ?",
    )
    .bind(TABLE_NAME)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

async fn existing_ids(pool: &MySqlPool) -> StoreResult<HashSet<String>> {
    let ids: Vec<String> = sqlx::query_scalar(&format!("SELECT song_id FROM {TABLE_NAME}"))
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

async fn insert_songs(tx: &mut Transaction<'_, MySql>, songs: &[Song]) -> StoreResult<()> {
    let sql = format!(
        "INSERT INTO {TABLE_NAME} (project_id, order_num, song_id, song_title, playback, \
         artist_id, artist_name, album_id, album_name, album_cover, duration_min) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    );
    for song in songs {
        sqlx::query(&sql)
            .bind(&song.project_id)
            .bind(song.order_num)
            .bind(&song.song_id)
            .bind(&song.title)
            .bind(&song.playback)
            .bind(&song.artist_id)
            .bind(&song.artist_name)
            .bind(&song.album_id)
            .bind(&song.album_name)
            .bind(&song.album_cover)
            .bind(song.duration_min)
            .execute(&mut **tx)
            .await
            .map_err(|err| duplicate_or_sql(err, &song.song_id))?;
    }
    Ok(())
}

async fn initial_load(pool: &MySqlPool, songs: &[Song]) -> StoreResult<()> {
    // DDL commits implicitly in MySQL, so the table is created outside the
    // insert transaction.
    sqlx::query(&format!(
        "CREATE TABLE {TABLE_NAME} (
            project_id   VARCHAR(100) NOT NULL DEFAULT '{DEFAULT_PROJECT_ID}',
            order_num    BIGINT       NOT NULL,
            song_id      VARCHAR(500) NOT NULL,
            song_title   VARCHAR(250) NOT NULL,
            playback     VARCHAR(500) NOT NULL UNIQUE,
            artist_id    VARCHAR(500) NOT NULL,
            artist_name  VARCHAR(250) NOT NULL,
            album_id     VARCHAR(500) NOT NULL,
            album_name   VARCHAR(250) NOT NULL,
            album_cover  VARCHAR(500) NOT NULL,
            duration_min NUMERIC(5, 2),
            sotd_date    DATE UNIQUE,
            PRIMARY KEY (song_id),
            FOREIGN KEY (project_id) REFERENCES projects(project_id)
        )"
    ))
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;
    insert_songs(&mut tx, songs).await?;
    tx.commit().await?;
    Ok(())
}

async fn reconcile(pool: &MySqlPool, plan: &Reconciliation) -> StoreResult<()> {
    let mut tx = pool.begin().await?;

    let remove = format!("DELETE FROM {TABLE_NAME} WHERE song_id = ?");
    for song_id in &plan.removals {
        sqlx::query(&remove).bind(song_id).execute(&mut *tx).await?;
    }

    if !plan.additions.is_empty() {
        let shifted = sqlx::query(&format!(
            "UPDATE {TABLE_NAME} SET order_num = order_num + ?"
        ))
        .bind(plan.shift_by)
        .execute(&mut *tx)
        .await?;
        debug!("Shifted {} rows by {}", shifted.rows_affected(), plan.shift_by);
        insert_songs(&mut tx, &plan.additions).await?;
    }

    if !plan.is_empty() {
        let renumber = format!("UPDATE {TABLE_NAME} SET order_num = ? WHERE song_id = ?");
        for (song_id, order_num) in &plan.ordering {
            sqlx::query(&renumber)
                .bind(order_num)
                .bind(song_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn todays_pick(pool: &MySqlPool, date: NaiveDate) -> StoreResult<Option<String>> {
    let song_id = sqlx::query_scalar(&format!(
        "SELECT song_id FROM {TABLE_NAME} WHERE sotd_date = ?"
    ))
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(song_id)
}

async fn daily_candidates(pool: &MySqlPool) -> StoreResult<Vec<SotdCandidate>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(&format!(
        "SELECT song_id, album_name, artist_name FROM {TABLE_NAME} WHERE sotd_date IS NULL"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(song_id, album_name, artist_name)| SotdCandidate {
            song_id,
            album_name,
            artist_name,
        })
        .collect())
}

async fn mark_daily_pick(pool: &MySqlPool, song_id: &str, date: NaiveDate) -> StoreResult<()> {
    sqlx::query(&format!(
        "UPDATE {TABLE_NAME} SET sotd_date = ? WHERE song_id = ?"
    ))
    .bind(date)
    .bind(song_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn list_songs(pool: &MySqlPool, limit: Option<i64>) -> StoreResult<Vec<StoredSong>> {
    let base = format!(
        "SELECT order_num, song_id, song_title, artist_name, album_name, sotd_date \
         FROM {TABLE_NAME} ORDER BY order_num"
    );
    // MySQL has no "unlimited" LIMIT value, so the clause is only added when asked for.
    let rows: Vec<(i64, String, String, String, String, Option<NaiveDate>)> = match limit {
        Some(limit) => {
            sqlx::query_as(&format!("{base} LIMIT ?"))
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
        None => sqlx::query_as(&base).fetch_all(pool).await?,
    };
    Ok(rows
        .into_iter()
        .map(
            |(order_num, song_id, title, artist_name, album_name, sotd_date)| StoredSong {
                order_num,
                song_id,
                title,
                artist_name,
                album_name,
                sotd_date,
            },
        )
        .collect())
}

impl SongStore for MySqlStore {
    fn backend(&self) -> &'static str {
        "MySQL"
    }

    fn table_exists(&mut self) -> StoreResult<bool> {
        self.runtime.block_on(table_exists(&self.pool))
    }

    fn existing_ids(&mut self) -> StoreResult<HashSet<String>> {
        if !self.table_exists()? {
            warn!("Liked songs table does not exist yet.");
            return Ok(HashSet::new());
        }
        self.runtime.block_on(existing_ids(&self.pool))
    }

    fn initial_load(&mut self, songs: &[Song]) -> StoreResult<()> {
        self.runtime.block_on(initial_load(&self.pool, songs))
    }

    fn reconcile(&mut self, plan: &Reconciliation) -> StoreResult<()> {
        self.runtime.block_on(reconcile(&self.pool, plan))
    }

    fn todays_pick(&mut self, date: NaiveDate) -> StoreResult<Option<String>> {
        self.runtime.block_on(todays_pick(&self.pool, date))
    }

    fn daily_candidates(&mut self) -> StoreResult<Vec<SotdCandidate>> {
        self.runtime.block_on(daily_candidates(&self.pool))
    }

    fn mark_daily_pick(&mut self, song_id: &str, date: NaiveDate) -> StoreResult<()> {
        self.runtime.block_on(mark_daily_pick(&self.pool, song_id, date))
    }

    fn list_songs(&mut self, limit: Option<usize>) -> StoreResult<Vec<StoredSong>> {
        let limit = limit.and_then(|n| i64::try_from(n).ok());
        self.runtime.block_on(list_songs(&self.pool, limit))
    }
}
