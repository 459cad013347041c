use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel::{ConnectionError, ConnectionResult};
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{ClockError, Result};
use crate::services::parser::ClockReading;

mod schema;
use schema::clock_updates;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

// busy_timeout is per connection, so every pooled connection gets it.
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL;";

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, Serialize)]
pub struct ClockUpdate {
    pub id: i32,
    pub message_id: i64,
    pub time_value: String,
    pub date_label: Option<String>,
    pub current_label: Option<String>,
    pub description: String,
    pub content: String,
    pub image_data: Option<String>,
    pub is_active: bool,
    pub posted_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ClockUpdate {
    pub fn arrival_key(&self) -> (i64, i64) {
        (self.posted_at, self.message_id)
    }
}

/// A parsed post ready to be written.
#[derive(Debug, Clone)]
pub struct UpdateDraft {
    pub message_id: i64,
    pub posted_at: i64,
    pub reading: ClockReading,
    pub content: String,
    pub image_data: Option<String>,
}

#[derive(Queryable)]
struct UpdateRow {
    id: i32,
    message_id: i64,
    time_value: String,
    date_label: Option<String>,
    current_label: Option<String>,
    description: String,
    content: String,
    image_data: Option<String>,
    is_active: bool,
    posted_at: i64,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = clock_updates)]
struct NewUpdate<'a> {
    message_id: i64,
    time_value: &'a str,
    date_label: Option<&'a str>,
    current_label: Option<&'a str>,
    description: &'a str,
    content: &'a str,
    image_data: Option<&'a str>,
    is_active: bool,
    posted_at: i64,
    created_at: i64,
    updated_at: i64,
}

impl<'a> NewUpdate<'a> {
    fn from_draft(draft: &'a UpdateDraft, now: i64) -> Self {
        Self {
            message_id: draft.message_id,
            time_value: &draft.reading.time,
            date_label: draft.reading.date.as_deref(),
            current_label: draft.reading.current.as_deref(),
            description: &draft.reading.description,
            content: &draft.content,
            image_data: draft.image_data.as_deref(),
            is_active: false,
            posted_at: draft.posted_at,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct UpdateStore {
    pool: SqlitePool,
    /// Writers queue here instead of racing for SQLite's write lock.
    write_lock: Mutex<()>,
}

impl UpdateStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup = Box::new(establish_connection);
        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new_with_config(
            sqlite_path,
            manager_config,
        );
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| ClockError::Database(e.to_string()))?;
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    /// Inserts the draft unless its message id is already stored. Returns
    /// whether a row was written.
    pub async fn insert_if_absent(&self, draft: &UpdateDraft) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        let now = now_ts();
        let new = NewUpdate::from_draft(draft, now);
        let mut conn = self.conn().await?;
        let inserted = diesel::insert_or_ignore_into(clock_updates::table)
            .values(&new)
            .execute(&mut conn)
            .await?;
        Ok(inserted > 0)
    }

    /// Writes the draft, replacing the parsed fields of an existing row for
    /// the same message. The active flag and `created_at` are left alone.
    pub async fn upsert(&self, draft: &UpdateDraft) -> Result<ClockUpdate> {
        let _write = self.write_lock.lock().await;
        let now = now_ts();
        let new = NewUpdate::from_draft(draft, now);
        let mut conn = self.conn().await?;
        diesel::insert_into(clock_updates::table)
            .values(&new)
            .on_conflict(clock_updates::message_id)
            .do_update()
            .set((
                clock_updates::time_value.eq(new.time_value),
                clock_updates::date_label.eq(new.date_label),
                clock_updates::current_label.eq(new.current_label),
                clock_updates::description.eq(new.description),
                clock_updates::content.eq(new.content),
                clock_updates::image_data.eq(new.image_data),
                clock_updates::posted_at.eq(new.posted_at),
                clock_updates::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;

        let row: UpdateRow = clock_updates::table
            .filter(clock_updates::message_id.eq(draft.message_id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn exists(&self, message_id: i64) -> Result<bool> {
        Ok(self.get(message_id).await?.is_some())
    }

    pub async fn get(&self, message_id: i64) -> Result<Option<ClockUpdate>> {
        let mut conn = self.conn().await?;
        let row: Option<UpdateRow> = clock_updates::table
            .filter(clock_updates::message_id.eq(message_id))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(map_row))
    }

    pub async fn active(&self) -> Result<Option<ClockUpdate>> {
        let mut conn = self.conn().await?;
        let row: Option<UpdateRow> = clock_updates::table
            .filter(clock_updates::is_active.eq(true))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(map_row))
    }

    /// Newest first by arrival.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ClockUpdate>> {
        let mut conn = self.conn().await?;
        let rows: Vec<UpdateRow> = clock_updates::table
            .order((clock_updates::posted_at.desc(), clock_updates::message_id.desc()))
            .limit(limit as i64)
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        let count = clock_updates::table
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    pub async fn active_count(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        let count = clock_updates::table
            .filter(clock_updates::is_active.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    /// Makes `message_id` the only active row, in one transaction.
    pub async fn activate(&self, message_id: i64) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let now = now_ts();
        let mut conn = self.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut conn;
        conn.transaction::<_, ClockError, _>(|conn| {
            async move { set_active(conn, message_id, now).await }.scope_boxed()
        })
        .await
    }

    /// Activates `message_id` only if it arrived after the current active
    /// row, or if nothing is active. Returns whether the flag moved.
    pub async fn promote_if_newer(&self, message_id: i64) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        let now = now_ts();
        let mut conn = self.conn().await?;
        let conn: &mut SqliteAsyncConn = &mut conn;
        conn.transaction::<_, ClockError, _>(|conn| {
            async move {
                let candidate: (i64, i64) = clock_updates::table
                    .filter(clock_updates::message_id.eq(message_id))
                    .select((clock_updates::posted_at, clock_updates::message_id))
                    .first(conn)
                    .await?;
                let current: Option<(i64, i64)> = clock_updates::table
                    .filter(clock_updates::is_active.eq(true))
                    .select((clock_updates::posted_at, clock_updates::message_id))
                    .first(conn)
                    .await
                    .optional()?;
                if current.is_some_and(|current| current >= candidate) {
                    return Ok(false);
                }
                set_active(conn, message_id, now).await?;
                Ok(true)
            }
            .scope_boxed()
        })
        .await
    }

    /// Deletes every row. Returns the number removed.
    pub async fn clear(&self) -> Result<usize> {
        let _write = self.write_lock.lock().await;
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(clock_updates::table)
            .execute(&mut conn)
            .await?;
        Ok(deleted)
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| ClockError::Database(e.to_string()))
    }
}

fn establish_connection(database_url: &str) -> BoxFuture<'_, ConnectionResult<SqliteAsyncConn>> {
    async move {
        let mut conn = SqliteAsyncConn::establish(database_url).await?;
        conn.batch_execute(CONNECTION_PRAGMAS)
            .await
            .map_err(ConnectionError::CouldntSetupConfiguration)?;
        Ok(conn)
    }
    .boxed()
}

async fn set_active(conn: &mut SqliteAsyncConn, message_id: i64, now: i64) -> Result<()> {
    diesel::update(clock_updates::table.filter(clock_updates::is_active.eq(true)))
        .set(clock_updates::is_active.eq(false))
        .execute(conn)
        .await?;
    let updated = diesel::update(clock_updates::table.filter(clock_updates::message_id.eq(message_id)))
        .set((
            clock_updates::is_active.eq(true),
            clock_updates::updated_at.eq(now),
        ))
        .execute(conn)
        .await?;
    if updated == 0 {
        return Err(ClockError::NotFound(format!("message {message_id} is not stored")));
    }
    Ok(())
}

fn map_row(row: UpdateRow) -> ClockUpdate {
    ClockUpdate {
        id: row.id,
        message_id: row.message_id,
        time_value: row.time_value,
        date_label: row.date_label,
        current_label: row.current_label,
        description: row.description,
        content: row.content,
        image_data: row.image_data,
        is_active: row.is_active,
        posted_at: row.posted_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ClockError::Runtime(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| ClockError::Database(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| ClockError::Database(e.to_string()))?;
        Ok::<_, ClockError>(())
    })
    .await
    .map_err(|e| ClockError::Runtime(e.to_string()))??;
    Ok(())
}
