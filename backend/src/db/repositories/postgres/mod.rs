//! Postgres repository implementation using Diesel.
//!
//! Semesters, users, the course catalog, slots and the stored per-semester
//! loads each live in their own table (see `migrations/`). Every mutating
//! operation runs in a single transaction:
//!
//! - slot claims, releases and reassignments lock the slot row with
//!   `SELECT ... FOR UPDATE` and the owning semester row `FOR SHARE`, so a
//!   concurrent activation cannot interleave with an assignment;
//! - activation takes `LOCK TABLE semesters IN EXCLUSIVE MODE` before flipping
//!   the active flag, so no reader observes zero or two active semesters;
//! - load recomputation locks the instructor's user row, which serializes
//!   concurrent recomputes of the same instructor.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::upsert::excluded;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;

use crate::api::{CourseClassId, CourseId, CourseTypeId, SemesterId, SlotId, UserId};
use crate::db::repository::{
    AssignmentRepository, CascadeReport, CatalogRepository, ErrorContext, LoadRepository,
    RepositoryError, RepositoryResult, SemesterRepository, UserRepository,
};
use crate::models::catalog::{
    Course, CourseClass, CourseClassDetail, CourseSummary, CourseType, Semester, SemesterDetail,
    Slot,
};
use crate::models::credit::{self, CourseKind};
use crate::models::user::{Caller, NewUser, User};
use crate::services::assignment::{self, AssignmentReceipt, SlotTransition};
use crate::services::catalog::CoursePlan;
use crate::services::lifecycle;
use crate::services::load::{self, Holding, InstructorLoad, LoadChange};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;
        let defaults = Self::default();

        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total successful queries executed
    pub total_queries: u64,
    /// Total failed queries
    pub failed_queries: u64,
    /// Total retried operations
    pub retried_operations: u64,
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
    retried_operations: Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// Blocks while the pool is filled and migrations run; call it from
    /// `spawn_blocking` inside an async context.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }
        info!(
            "Postgres repository ready (pool max={}, min={})",
            config.max_pool_size, config.min_pool_size
        );

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
            retried_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation with automatic retry for transient failures.
    ///
    /// The closure runs on the blocking pool. It is retried up to
    /// `max_retries` times with exponential backoff when it fails with a
    /// retryable error (connection loss, serialization failure).
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        warn!("Retrying after transient failure: {}", e);
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    /// Run `f` inside one database transaction, with retries.
    async fn with_tx<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        self.with_conn(move |conn| conn.transaction::<T, RepositoryError, _>(|tx| f(tx)))
            .await
    }

    /// Get pool health statistics.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }

    /// Returns `(is_healthy, latency_ms, error_message)`.
    pub async fn health_check_detailed(&self) -> (bool, Option<u64>, Option<String>) {
        let start = Instant::now();
        let result = self.health_check().await;
        let latency = Some(start.elapsed().as_millis() as u64);
        match result {
            Ok(true) => (true, latency, None),
            Ok(false) => (false, latency, Some("Health check returned false".to_string())),
            Err(e) => (false, latency, Some(e.to_string())),
        }
    }
}

// ==================== Row helpers ====================

fn not_found(entity: &str, id: i64, operation: &str) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::new(operation)
            .with_entity(entity.to_lowercase())
            .with_entity_id(id),
    )
}

fn kind_of(code: i16) -> RepositoryResult<CourseKind> {
    CourseKind::from_code(code)
        .ok_or_else(|| RepositoryError::internal(format!("Unknown course kind code {}", code)))
}

fn find_semester(conn: &mut PgConnection, id: i64, operation: &str) -> RepositoryResult<Semester> {
    semesters::table
        .find(id)
        .select(SemesterRow::as_select())
        .first(conn)
        .optional()?
        .map(Semester::from)
        .ok_or_else(|| not_found("Semester", id, operation))
}

/// Semester row read under a share lock, blocking a concurrent activation.
fn share_semester(conn: &mut PgConnection, id: i64, operation: &str) -> RepositoryResult<Semester> {
    semesters::table
        .find(id)
        .select(SemesterRow::as_select())
        .for_share()
        .first(conn)
        .optional()?
        .map(Semester::from)
        .ok_or_else(|| not_found("Semester", id, operation))
}

fn active_semester_id(conn: &mut PgConnection) -> RepositoryResult<Option<i64>> {
    Ok(semesters::table
        .filter(semesters::is_active.eq(true))
        .select(semesters::id)
        .first::<i64>(conn)
        .optional()?)
}

fn find_user_row(conn: &mut PgConnection, id: i64, operation: &str) -> RepositoryResult<UserRow> {
    users::table
        .find(id)
        .select(UserRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| not_found("User", id, operation))
}

/// Stored active-semester load per user, optionally restricted to one user.
fn active_loads(conn: &mut PgConnection, user: Option<i64>) -> RepositoryResult<HashMap<i64, f64>> {
    let mut query = instructor_loads::table
        .inner_join(semesters::table)
        .filter(semesters::is_active.eq(true))
        .select((instructor_loads::user_id, instructor_loads::bkd))
        .into_boxed();
    if let Some(user_id) = user {
        query = query.filter(instructor_loads::user_id.eq(user_id));
    }
    Ok(query.load::<(i64, f64)>(conn)?.into_iter().collect())
}

fn find_user(conn: &mut PgConnection, id: i64, operation: &str) -> RepositoryResult<User> {
    let row = find_user_row(conn, id, operation)?;
    let bkd = active_loads(conn, Some(id))?.get(&id).copied().unwrap_or(0.0);
    Ok(row.into_user(bkd))
}

/// Section with its course type and course.
fn class_owner(
    conn: &mut PgConnection,
    class_id: i64,
    operation: &str,
) -> RepositoryResult<(CourseClassRow, CourseTypeRow, CourseRow)> {
    course_classes::table
        .inner_join(course_types::table.inner_join(courses::table))
        .filter(course_classes::id.eq(class_id))
        .select((
            CourseClassRow::as_select(),
            CourseTypeRow::as_select(),
            CourseRow::as_select(),
        ))
        .first(conn)
        .optional()?
        .ok_or_else(|| not_found("CourseClass", class_id, operation))
}

fn initials_of(conn: &mut PgConnection, rows: &[SlotRow]) -> RepositoryResult<HashMap<i64, String>> {
    let ids: Vec<i64> = rows
        .iter()
        .filter_map(|r| r.occupant_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(users::table
        .filter(users::id.eq_any(ids))
        .select((users::id, users::initials))
        .load::<(i64, String)>(conn)?
        .into_iter()
        .collect())
}

fn slot_view(row: &SlotRow, initials: &HashMap<i64, String>) -> Slot {
    Slot {
        id: row.slot_id(),
        course_class_id: CourseClassId::new(row.course_class_id),
        meeting_number: row.meeting_number as u32,
        occupant: row.occupant(),
        occupant_initials: row.occupant_id.and_then(|id| initials.get(&id).cloned()),
    }
}

fn load_slot_view(conn: &mut PgConnection, row: &SlotRow) -> RepositoryResult<Slot> {
    let initials = initials_of(conn, std::slice::from_ref(row))?;
    Ok(slot_view(row, &initials))
}

fn slots_of_classes(conn: &mut PgConnection, class_ids: Vec<i64>) -> RepositoryResult<Vec<Slot>> {
    let rows: Vec<SlotRow> = slots::table
        .filter(slots::course_class_id.eq_any(class_ids))
        .order((slots::meeting_number.asc(), slots::id.asc()))
        .select(SlotRow::as_select())
        .load(conn)?;
    let initials = initials_of(conn, &rows)?;
    Ok(rows.iter().map(|r| slot_view(r, &initials)).collect())
}

fn class_view(conn: &mut PgConnection, row: &CourseClassRow) -> RepositoryResult<CourseClass> {
    Ok(CourseClass {
        id: row.class_id(),
        course_type_id: row.type_id(),
        number: row.number as u32,
        slots: slots_of_classes(conn, vec![row.id])?,
    })
}

/// Full course tree down to slots.
fn course_tree(conn: &mut PgConnection, course_id: i64, operation: &str) -> RepositoryResult<Course> {
    let course: CourseRow = courses::table
        .find(course_id)
        .select(CourseRow::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| not_found("Course", course_id, operation))?;

    let type_rows: Vec<CourseTypeRow> = course_types::table
        .filter(course_types::course_id.eq(course_id))
        .order(course_types::kind.asc())
        .select(CourseTypeRow::as_select())
        .load(conn)?;
    let class_rows: Vec<CourseClassRow> = course_classes::table
        .filter(course_classes::course_type_id.eq_any(type_rows.iter().map(|t| t.id).collect::<Vec<_>>()))
        .order((course_classes::number.asc(), course_classes::id.asc()))
        .select(CourseClassRow::as_select())
        .load(conn)?;
    let mut slots_by_class: BTreeMap<CourseClassId, Vec<Slot>> = BTreeMap::new();
    for slot in slots_of_classes(conn, class_rows.iter().map(|c| c.id).collect())? {
        slots_by_class.entry(slot.course_class_id).or_default().push(slot);
    }

    let mut course_types = Vec::with_capacity(type_rows.len());
    for type_row in type_rows {
        let classes = class_rows
            .iter()
            .filter(|c| c.course_type_id == type_row.id)
            .map(|c| CourseClass {
                id: c.class_id(),
                course_type_id: c.type_id(),
                number: c.number as u32,
                slots: slots_by_class.remove(&c.class_id()).unwrap_or_default(),
            })
            .collect();
        course_types.push(CourseType {
            id: CourseTypeId::new(type_row.id),
            course_id: CourseId::new(course_id),
            kind: kind_of(type_row.kind)?,
            credit: type_row.credit,
            class_count: type_row.class_count as u32,
            classes,
        });
    }

    Ok(Course {
        id: CourseId::new(course.id),
        semester_id: SemesterId::new(course.semester_id),
        code: course.code,
        name: course.name,
        study_semesters: course.study_semesters,
        course_types,
    })
}

fn courses_of_semester(conn: &mut PgConnection, semester_id: i64) -> RepositoryResult<Vec<CourseSummary>> {
    let rows: Vec<CourseRow> = courses::table
        .filter(courses::semester_id.eq(semester_id))
        .order((courses::code.asc(), courses::id.asc()))
        .select(CourseRow::as_select())
        .load(conn)?;
    Ok(rows.iter().map(CourseRow::summary).collect())
}

// ==================== Load helpers ====================

type HoldingRow = (i64, Option<i64>, i64, i64, String, String, i16, i64, f64);

/// Occupied slots with their catalog context as `(occupant, semester, holding)`.
fn load_holdings(
    conn: &mut PgConnection,
    user: Option<i64>,
    semester: Option<i64>,
) -> RepositoryResult<Vec<(UserId, SemesterId, Holding)>> {
    let mut query = slots::table
        .inner_join(course_classes::table.inner_join(course_types::table.inner_join(courses::table)))
        .filter(slots::occupant_id.is_not_null())
        .select((
            slots::id,
            slots::occupant_id,
            courses::semester_id,
            courses::id,
            courses::code,
            courses::name,
            course_types::kind,
            slots::course_class_id,
            course_types::credit,
        ))
        .into_boxed();
    if let Some(user_id) = user {
        query = query.filter(slots::occupant_id.eq(user_id));
    }
    if let Some(semester_id) = semester {
        query = query.filter(courses::semester_id.eq(semester_id));
    }

    let rows: Vec<HoldingRow> = query.load(conn)?;
    rows.into_iter()
        .filter_map(|(slot_id, occupant, semester_id, course_id, code, name, kind, class_id, credit)| {
            occupant.map(|user_id| {
                Ok::<_, RepositoryError>((
                    UserId::new(user_id),
                    SemesterId::new(semester_id),
                    Holding {
                        slot_id: SlotId::new(slot_id),
                        course_id: CourseId::new(course_id),
                        course_code: code,
                        course_name: name,
                        kind: kind_of(kind)?,
                        course_class_id: CourseClassId::new(class_id),
                        credit,
                    },
                ))
            })
        })
        .collect()
}

fn holdings(conn: &mut PgConnection, user_id: i64, semester_id: i64) -> RepositoryResult<Vec<Holding>> {
    Ok(load_holdings(conn, Some(user_id), Some(semester_id))?
        .into_iter()
        .map(|(_, _, h)| h)
        .collect())
}

fn stored_load(conn: &mut PgConnection, user_id: i64, semester_id: i64) -> RepositoryResult<f64> {
    Ok(instructor_loads::table
        .find((user_id, semester_id))
        .select(instructor_loads::bkd)
        .first::<f64>(conn)
        .optional()?
        .unwrap_or(0.0))
}

fn store_load(
    conn: &mut PgConnection,
    user_id: i64,
    semester_id: i64,
    bkd: f64,
) -> RepositoryResult<LoadChange> {
    let previous = stored_load(conn, user_id, semester_id)?;
    if bkd > 0.0 {
        diesel::insert_into(instructor_loads::table)
            .values(&InstructorLoadRow {
                user_id,
                semester_id,
                bkd,
            })
            .on_conflict((instructor_loads::user_id, instructor_loads::semester_id))
            .do_update()
            .set(instructor_loads::bkd.eq(excluded(instructor_loads::bkd)))
            .execute(conn)?;
    } else {
        diesel::delete(instructor_loads::table.find((user_id, semester_id))).execute(conn)?;
    }
    Ok(LoadChange {
        user_id: UserId::new(user_id),
        semester_id: SemesterId::new(semester_id),
        previous,
        bkd,
    })
}

/// Recompute one instructor's stored load. Must run inside a transaction.
fn recompute(conn: &mut PgConnection, user_id: i64, semester_id: i64) -> RepositoryResult<LoadChange> {
    // Serializes recomputes of the same instructor; statements after the lock
    // see every assignment committed before it was granted.
    users::table
        .find(user_id)
        .select(users::id)
        .for_update()
        .first::<i64>(conn)?;
    let bkd = load::total(&holdings(conn, user_id, semester_id)?);
    let change = store_load(conn, user_id, semester_id, bkd)?;
    debug!(
        "Recomputed load of user {} in semester {}: {} -> {}",
        user_id, semester_id, change.previous, change.bkd
    );
    Ok(change)
}

fn apply_transition(
    conn: &mut PgConnection,
    transition: &SlotTransition,
    semester_id: i64,
) -> RepositoryResult<Vec<LoadChange>> {
    if !transition.outcome.is_change() {
        return Ok(Vec::new());
    }
    diesel::update(slots::table.find(transition.slot_id.value()))
        .set(slots::occupant_id.eq(transition.next.map(|u| u.value())))
        .execute(conn)?;

    let mut affected = transition.affected();
    affected.sort();
    affected
        .into_iter()
        .map(|user_id| recompute(conn, user_id.value(), semester_id))
        .collect()
}

/// Share-lock a slot's owning semester, then lock the slot row.
///
/// Locks are taken semester first, the same order as `delete_semester` and
/// `activate_semester`.
fn lock_slot(conn: &mut PgConnection, slot_id: i64, operation: &str) -> RepositoryResult<(Slot, Semester)> {
    let class_id: i64 = slots::table
        .find(slot_id)
        .select(slots::course_class_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| not_found("Slot", slot_id, operation))?;
    let (_, _, course) = class_owner(conn, class_id, operation)?;
    let semester = share_semester(conn, course.semester_id, operation)?;
    let row: SlotRow = slots::table
        .find(slot_id)
        .select(SlotRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| not_found("Slot", slot_id, operation))?;
    Ok((load_slot_view(conn, &row)?, semester))
}

/// Clear slots of a semester still held by deactivated users and recompute
/// their loads. Must run under the semesters table lock.
fn release_inactive_holders(conn: &mut PgConnection, semester_id: i64) -> RepositoryResult<Vec<LoadChange>> {
    let inactive: Vec<i64> = users::table
        .filter(users::is_active.eq(false))
        .select(users::id)
        .load(conn)?;
    if inactive.is_empty() {
        return Ok(Vec::new());
    }
    let stale: Vec<(i64, Option<i64>)> = slots::table
        .inner_join(course_classes::table.inner_join(course_types::table.inner_join(courses::table)))
        .filter(courses::semester_id.eq(semester_id))
        .filter(slots::occupant_id.eq_any(inactive))
        .select((slots::id, slots::occupant_id))
        .load(conn)?;
    if stale.is_empty() {
        return Ok(Vec::new());
    }

    let slot_ids: Vec<i64> = stale.iter().map(|(id, _)| *id).collect();
    let affected: BTreeSet<i64> = stale.iter().filter_map(|(_, user)| *user).collect();
    diesel::update(slots::table.filter(slots::id.eq_any(slot_ids)))
        .set(slots::occupant_id.eq(None::<i64>))
        .execute(conn)?;
    warn!(
        "Activation of semester {} released {} slots held by {} inactive users",
        semester_id,
        stale.len(),
        affected.len()
    );
    affected
        .into_iter()
        .map(|user_id| recompute(conn, user_id, semester_id))
        .collect()
}

fn receipt(
    conn: &mut PgConnection,
    transition: SlotTransition,
    loads: Vec<LoadChange>,
) -> RepositoryResult<AssignmentReceipt> {
    let slot_id = transition.slot_id.value();
    let row: SlotRow = slots::table
        .find(slot_id)
        .select(SlotRow::as_select())
        .first(conn)?;
    Ok(AssignmentReceipt {
        slot: load_slot_view(conn, &row)?,
        outcome: transition.outcome,
        loads,
    })
}

/// Delete sections (slots cascade) and recompute every instructor who held
/// one of their slots.
fn remove_classes(
    conn: &mut PgConnection,
    class_ids: Vec<i64>,
    semester_id: i64,
) -> RepositoryResult<CascadeReport> {
    let removed: Vec<SlotRow> = slots::table
        .filter(slots::course_class_id.eq_any(class_ids.clone()))
        .select(SlotRow::as_select())
        .for_update()
        .load(conn)?;
    let occupied: Vec<i64> = removed.iter().filter_map(|s| s.occupant_id).collect();
    let affected: BTreeSet<i64> = occupied.iter().copied().collect();

    let classes_removed = diesel::delete(course_classes::table.filter(course_classes::id.eq_any(class_ids)))
        .execute(conn)?;

    let loads = affected
        .into_iter()
        .map(|user_id| recompute(conn, user_id, semester_id))
        .collect::<RepositoryResult<Vec<_>>>()?;

    Ok(CascadeReport {
        courses_removed: 0,
        classes_removed,
        slots_removed: removed.len(),
        assignments_released: occupied.len(),
        loads,
    })
}

fn class_ids_of_courses(conn: &mut PgConnection, course_ids: Vec<i64>) -> RepositoryResult<Vec<i64>> {
    Ok(course_classes::table
        .inner_join(course_types::table)
        .filter(course_types::course_id.eq_any(course_ids))
        .select(course_classes::id)
        .load::<i64>(conn)?)
}

#[async_trait]
impl SemesterRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn list_semesters(&self) -> RepositoryResult<Vec<Semester>> {
        self.with_conn(|conn| {
            let rows: Vec<SemesterRow> = semesters::table
                .order((semesters::start_date.desc(), semesters::id.desc()))
                .select(SemesterRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Semester::from).collect())
        })
        .await
    }

    async fn get_semester(&self, semester_id: SemesterId) -> RepositoryResult<SemesterDetail> {
        let id = semester_id.value();
        self.with_conn(move |conn| {
            let semester = find_semester(conn, id, "get_semester")?;
            Ok(SemesterDetail {
                semester,
                courses: courses_of_semester(conn, id)?,
            })
        })
        .await
    }

    async fn active_semester(&self) -> RepositoryResult<Option<Semester>> {
        self.with_conn(|conn| {
            Ok(semesters::table
                .filter(semesters::is_active.eq(true))
                .select(SemesterRow::as_select())
                .first(conn)
                .optional()?
                .map(Semester::from))
        })
        .await
    }

    async fn create_semester(&self, start_date: NaiveDate) -> RepositoryResult<Semester> {
        lifecycle::validate_start_date(start_date)?;
        self.with_conn(move |conn| {
            let row: SemesterRow = diesel::insert_into(semesters::table)
                .values(&NewSemesterRow { start_date })
                .returning(SemesterRow::as_returning())
                .get_result(conn)?;
            Ok(Semester::from(row))
        })
        .await
    }

    async fn activate_semester(&self, semester_id: SemesterId) -> RepositoryResult<Semester> {
        let id = semester_id.value();
        self.with_tx(move |tx| {
            sql_query("LOCK TABLE semesters IN EXCLUSIVE MODE").execute(tx)?;

            let mut all: Vec<Semester> = semesters::table
                .select(SemesterRow::as_select())
                .load(tx)?
                .into_iter()
                .map(Semester::from)
                .collect();
            let before: HashMap<SemesterId, bool> = all.iter().map(|s| (s.id, s.is_active)).collect();
            if !lifecycle::apply_activation(all.iter_mut(), semester_id, Utc::now()) {
                return Err(not_found("Semester", id, "activate_semester"));
            }

            // Clear the old flag before setting the new one; the partial
            // unique index is checked row by row.
            for semester in all.iter().filter(|s| !s.is_active && before.get(&s.id) == Some(&true)) {
                diesel::update(semesters::table.find(semester.id.value()))
                    .set(semesters::is_active.eq(false))
                    .execute(tx)?;
                info!("Archived semester {}", semester.id);
            }
            let target = all
                .into_iter()
                .find(|s| s.id == semester_id)
                .ok_or_else(|| not_found("Semester", id, "activate_semester"))?;
            diesel::update(semesters::table.find(id))
                .set((
                    semesters::activated_at.eq(target.activated_at),
                    semesters::is_active.eq(true),
                ))
                .execute(tx)?;
            release_inactive_holders(tx, id)?;
            Ok(target)
        })
        .await
    }

    async fn delete_semester(&self, semester_id: SemesterId) -> RepositoryResult<CascadeReport> {
        let id = semester_id.value();
        self.with_tx(move |tx| {
            let semester: Semester = semesters::table
                .find(id)
                .select(SemesterRow::as_select())
                .for_update()
                .first(tx)
                .optional()?
                .map(Semester::from)
                .ok_or_else(|| not_found("Semester", id, "delete_semester"))?;
            lifecycle::ensure_deletable(&semester)?;

            let course_ids: Vec<i64> = courses::table
                .filter(courses::semester_id.eq(id))
                .select(courses::id)
                .load(tx)?;
            let class_ids = class_ids_of_courses(tx, course_ids.clone())?;
            let mut report = remove_classes(tx, class_ids, id)?;
            report.courses_removed = course_ids.len();

            // Courses, course types and stored loads cascade.
            diesel::delete(semesters::table.find(id)).execute(tx)?;
            info!(
                "Deleted semester {}: {} courses, {} slots, {} instructors affected",
                id,
                report.courses_removed,
                report.slots_removed,
                report.loads.len()
            );
            Ok(report)
        })
        .await
    }
}

#[async_trait]
impl CatalogRepository for PostgresRepository {
    async fn create_course(&self, plan: &CoursePlan) -> RepositoryResult<Course> {
        let plan = plan.clone();
        self.with_tx(move |tx| {
            let semester_id = plan.semester_id.value();
            let semester = share_semester(tx, semester_id, "create_course")?;
            lifecycle::ensure_catalog_editable(&semester, "create_course")?;

            let taken = courses::table
                .filter(courses::semester_id.eq(semester_id))
                .filter(courses::code.eq(plan.code.as_str()))
                .select(courses::id)
                .first::<i64>(tx)
                .optional()?;
            if taken.is_some() {
                return Err(RepositoryError::conflict_with_context(
                    format!("Course {} already exists in this semester", plan.code),
                    ErrorContext::new("create_course")
                        .with_entity("course")
                        .with_details(format!("semester={}", semester_id)),
                ));
            }

            let course_id: i64 = diesel::insert_into(courses::table)
                .values(&NewCourseRow {
                    semester_id,
                    code: plan.code.clone(),
                    name: plan.name.clone(),
                    study_semesters: plan.study_semesters.clone(),
                })
                .returning(courses::id)
                .get_result(tx)?;

            for type_plan in &plan.types {
                let type_id: i64 = diesel::insert_into(course_types::table)
                    .values(&NewCourseTypeRow {
                        course_id,
                        kind: type_plan.kind.code(),
                        credit: type_plan.credit,
                        class_count: type_plan.class_count as i32,
                    })
                    .returning(course_types::id)
                    .get_result(tx)?;

                for (number, meetings) in type_plan.layout() {
                    let class_id: i64 = diesel::insert_into(course_classes::table)
                        .values(&NewCourseClassRow {
                            course_type_id: type_id,
                            number: number as i32,
                        })
                        .returning(course_classes::id)
                        .get_result(tx)?;
                    let new_slots: Vec<NewSlotRow> = meetings
                        .map(|meeting_number| NewSlotRow {
                            course_class_id: class_id,
                            meeting_number: meeting_number as i32,
                        })
                        .collect();
                    diesel::insert_into(slots::table)
                        .values(&new_slots)
                        .execute(tx)?;
                }
            }

            course_tree(tx, course_id, "create_course")
        })
        .await
    }

    async fn list_courses(&self, semester_id: SemesterId) -> RepositoryResult<Vec<CourseSummary>> {
        let id = semester_id.value();
        self.with_conn(move |conn| {
            find_semester(conn, id, "list_courses")?;
            courses_of_semester(conn, id)
        })
        .await
    }

    async fn get_course(&self, course_id: CourseId) -> RepositoryResult<Course> {
        let id = course_id.value();
        self.with_conn(move |conn| course_tree(conn, id, "get_course"))
            .await
    }

    async fn delete_course(&self, course_id: CourseId) -> RepositoryResult<CascadeReport> {
        let id = course_id.value();
        self.with_tx(move |tx| {
            let course: CourseRow = courses::table
                .find(id)
                .select(CourseRow::as_select())
                .first(tx)
                .optional()?
                .ok_or_else(|| not_found("Course", id, "delete_course"))?;
            let semester = share_semester(tx, course.semester_id, "delete_course")?;
            lifecycle::ensure_catalog_editable(&semester, "delete_course")?;

            let class_ids = class_ids_of_courses(tx, vec![id])?;
            let mut report = remove_classes(tx, class_ids, course.semester_id)?;
            diesel::delete(courses::table.find(id)).execute(tx)?;
            report.courses_removed = 1;
            Ok(report)
        })
        .await
    }

    async fn get_course_class(&self, class_id: CourseClassId) -> RepositoryResult<CourseClassDetail> {
        let id = class_id.value();
        self.with_conn(move |conn| {
            let (class_row, type_row, course) = class_owner(conn, id, "get_course_class")?;
            Ok(CourseClassDetail {
                semester_id: SemesterId::new(course.semester_id),
                course_id: CourseId::new(course.id),
                course_code: course.code,
                course_name: course.name,
                kind: kind_of(type_row.kind)?,
                credit: type_row.credit,
                class: class_view(conn, &class_row)?,
            })
        })
        .await
    }

    async fn delete_course_class(&self, class_id: CourseClassId) -> RepositoryResult<CascadeReport> {
        let id = class_id.value();
        self.with_tx(move |tx| {
            let (_, type_row, course) = class_owner(tx, id, "delete_course_class")?;
            let semester = share_semester(tx, course.semester_id, "delete_course_class")?;
            lifecycle::ensure_catalog_editable(&semester, "delete_course_class")?;

            let report = remove_classes(tx, vec![id], course.semester_id)?;
            if type_row.class_count <= 1 {
                diesel::delete(course_types::table.find(type_row.id)).execute(tx)?;
            } else {
                diesel::update(course_types::table.find(type_row.id))
                    .set(course_types::class_count.eq(course_types::class_count - 1))
                    .execute(tx)?;
            }
            Ok(report)
        })
        .await
    }

    async fn list_slots(&self, class_id: CourseClassId) -> RepositoryResult<Vec<Slot>> {
        let id = class_id.value();
        self.with_conn(move |conn| {
            let exists = course_classes::table
                .find(id)
                .select(course_classes::id)
                .first::<i64>(conn)
                .optional()?;
            if exists.is_none() {
                return Err(not_found("CourseClass", id, "list_slots"));
            }
            slots_of_classes(conn, vec![id])
        })
        .await
    }

    async fn get_slot(&self, slot_id: SlotId) -> RepositoryResult<Slot> {
        let id = slot_id.value();
        self.with_conn(move |conn| {
            let row: SlotRow = slots::table
                .find(id)
                .select(SlotRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| not_found("Slot", id, "get_slot"))?;
            let (_, _, course) = class_owner(conn, row.course_class_id, "get_slot")?;
            if active_semester_id(conn)? != Some(course.semester_id) {
                return Err(not_found("Slot", id, "get_slot"));
            }
            load_slot_view(conn, &row)
        })
        .await
    }
}

#[async_trait]
impl AssignmentRepository for PostgresRepository {
    async fn claim_slot(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt> {
        let caller = *caller;
        self.with_tx(move |tx| {
            let (slot, semester) = lock_slot(tx, slot_id.value(), "claim_slot")?;
            let instructor = find_user(tx, caller.user_id.value(), "claim_slot")?;
            let transition = assignment::plan_claim(&slot, &semester, &instructor)?;
            let loads = apply_transition(tx, &transition, semester.id.value())?;
            receipt(tx, transition, loads)
        })
        .await
    }

    async fn release_slot(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt> {
        let caller = *caller;
        self.with_tx(move |tx| {
            let (slot, semester) = lock_slot(tx, slot_id.value(), "release_slot")?;
            let transition = assignment::plan_release(&slot, &semester, &caller)?;
            let loads = apply_transition(tx, &transition, semester.id.value())?;
            receipt(tx, transition, loads)
        })
        .await
    }

    async fn reassign_slot(
        &self,
        slot_id: SlotId,
        occupant: Option<UserId>,
        caller: &Caller,
    ) -> RepositoryResult<AssignmentReceipt> {
        assignment::ensure_can_reassign(caller)?;
        let caller = *caller;
        self.with_tx(move |tx| {
            let (slot, semester) = lock_slot(tx, slot_id.value(), "reassign_slot")?;
            let target = occupant
                .map(|user_id| find_user(tx, user_id.value(), "reassign_slot"))
                .transpose()?;
            let transition = assignment::plan_reassign(&slot, &semester, &caller, target.as_ref())?;
            let loads = apply_transition(tx, &transition, semester.id.value())?;
            receipt(tx, transition, loads)
        })
        .await
    }
}

#[async_trait]
impl LoadRepository for PostgresRepository {
    async fn instructor_load(
        &self,
        user_id: UserId,
        semester_id: SemesterId,
    ) -> RepositoryResult<InstructorLoad> {
        self.with_conn(move |conn| {
            find_user_row(conn, user_id.value(), "instructor_load")?;
            find_semester(conn, semester_id.value(), "instructor_load")?;
            let held = holdings(conn, user_id.value(), semester_id.value())?;
            Ok(load::aggregate(user_id, semester_id, &held))
        })
        .await
    }

    async fn instructor_semesters(&self, user_id: UserId) -> RepositoryResult<Vec<InstructorLoad>> {
        self.with_conn(move |conn| {
            find_user_row(conn, user_id.value(), "instructor_semesters")?;
            let mut by_semester: HashMap<SemesterId, Vec<Holding>> = HashMap::new();
            for (_, semester_id, holding) in load_holdings(conn, Some(user_id.value()), None)? {
                by_semester.entry(semester_id).or_default().push(holding);
            }

            let order: Vec<i64> = semesters::table
                .order((semesters::start_date.desc(), semesters::id.desc()))
                .select(semesters::id)
                .load(conn)?;
            Ok(order
                .into_iter()
                .map(SemesterId::new)
                .filter_map(|semester_id| {
                    by_semester
                        .remove(&semester_id)
                        .map(|held| load::aggregate(user_id, semester_id, &held))
                })
                .collect())
        })
        .await
    }

    async fn semester_loads(&self, semester_id: SemesterId) -> RepositoryResult<Vec<InstructorLoad>> {
        self.with_conn(move |conn| {
            find_semester(conn, semester_id.value(), "semester_loads")?;
            let mut by_user: HashMap<UserId, Vec<Holding>> = HashMap::new();
            for (user_id, _, holding) in load_holdings(conn, None, Some(semester_id.value()))? {
                by_user.entry(user_id).or_default().push(holding);
            }
            let user_ids: Vec<i64> = users::table
                .order(users::id.asc())
                .select(users::id)
                .load(conn)?;
            Ok(user_ids
                .into_iter()
                .map(UserId::new)
                .map(|user_id| {
                    let held = by_user.remove(&user_id).unwrap_or_default();
                    load::aggregate(user_id, semester_id, &held)
                })
                .collect())
        })
        .await
    }

    async fn recompute_load(&self, user_id: UserId, semester_id: SemesterId) -> RepositoryResult<LoadChange> {
        self.with_tx(move |tx| {
            find_user_row(tx, user_id.value(), "recompute_load")?;
            find_semester(tx, semester_id.value(), "recompute_load")?;
            recompute(tx, user_id.value(), semester_id.value())
        })
        .await
    }

    async fn recompute_all(&self, semester_id: SemesterId) -> RepositoryResult<Vec<LoadChange>> {
        let id = semester_id.value();
        self.with_tx(move |tx| {
            find_semester(tx, id, "recompute_all")?;
            // Lock every instructor so no assignment recomputes concurrently.
            let user_ids: Vec<i64> = users::table
                .order(users::id.asc())
                .select(users::id)
                .for_update()
                .load(tx)?;

            let rows: Vec<(i64, f64, i64, Option<i64>)> = slots::table
                .inner_join(course_classes::table.inner_join(course_types::table.inner_join(courses::table)))
                .filter(courses::semester_id.eq(id))
                .filter(slots::occupant_id.is_not_null())
                .select((
                    course_types::id,
                    course_types::credit,
                    slots::course_class_id,
                    slots::occupant_id,
                ))
                .load(tx)?;
            let mut per_type: BTreeMap<CourseTypeId, (f64, Vec<(CourseClassId, UserId)>)> = BTreeMap::new();
            for (type_id, type_credit, class_id, occupant) in rows {
                let entry = per_type
                    .entry(CourseTypeId::new(type_id))
                    .or_insert_with(|| (type_credit, Vec::new()));
                entry.1.extend(occupant.map(|u| (CourseClassId::new(class_id), UserId::new(u))));
            }

            let mut fresh: HashMap<i64, f64> = HashMap::new();
            for (type_credit, occupied) in per_type.into_values() {
                for (user_id, earned) in credit::contributions(type_credit, occupied) {
                    *fresh.entry(user_id.value()).or_insert(0.0) += earned;
                }
            }

            let mut changes = Vec::new();
            for user_id in user_ids {
                let bkd = fresh.get(&user_id).copied().unwrap_or(0.0);
                let change = store_load(tx, user_id, id, bkd)?;
                if change.is_changed() {
                    changes.push(change);
                }
            }
            info!("Recomputed semester {}: {} loads changed", id, changes.len());
            Ok(changes)
        })
        .await
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User> {
        let user = user.clone();
        self.with_tx(move |tx| {
            let taken = users::table
                .filter(users::initials.eq(user.initials.as_str()))
                .select(users::id)
                .first::<i64>(tx)
                .optional()?;
            if taken.is_some() {
                return Err(RepositoryError::conflict_with_context(
                    format!("Initials {} are already taken", user.initials),
                    ErrorContext::new("create_user").with_entity("user"),
                ));
            }
            let row: UserRow = diesel::insert_into(users::table)
                .values(&NewUserRow {
                    name: user.name.clone(),
                    initials: user.initials.clone(),
                    is_admin: user.is_admin,
                })
                .returning(UserRow::as_returning())
                .get_result(tx)?;
            Ok(row.into_user(0.0))
        })
        .await
    }

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.with_conn(move |conn| find_user(conn, user_id.value(), "get_user"))
            .await
    }

    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        self.with_conn(|conn| {
            let rows: Vec<UserRow> = users::table
                .order((users::name.asc(), users::id.asc()))
                .select(UserRow::as_select())
                .load(conn)?;
            let loads = active_loads(conn, None)?;
            Ok(rows
                .into_iter()
                .map(|row| {
                    let bkd = loads.get(&row.id).copied().unwrap_or(0.0);
                    row.into_user(bkd)
                })
                .collect())
        })
        .await
    }

    async fn find_user_by_initials(&self, initials: &str) -> RepositoryResult<Option<User>> {
        let wanted = initials.trim().to_ascii_uppercase();
        self.with_conn(move |conn| {
            let id = users::table
                .filter(users::initials.eq(wanted.as_str()))
                .select(users::id)
                .first::<i64>(conn)
                .optional()?;
            id.map(|id| find_user(conn, id, "find_user_by_initials"))
                .transpose()
        })
        .await
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        is_active: bool,
    ) -> RepositoryResult<(User, Vec<LoadChange>)> {
        let id = user_id.value();
        self.with_tx(move |tx| {
            diesel::update(users::table.find(id))
                .set(users::is_active.eq(is_active))
                .execute(tx)
                .map_err(RepositoryError::from)
                .and_then(|updated| match updated {
                    0 => Err(not_found("User", id, "set_user_active")),
                    _ => Ok(()),
                })?;

            let mut loads = Vec::new();
            if !is_active {
                if let Some(semester_id) = active_semester_id(tx)? {
                    let held: Vec<i64> = holdings(tx, id, semester_id)?
                        .iter()
                        .map(|h| h.slot_id.value())
                        .collect();
                    if !held.is_empty() {
                        diesel::update(slots::table.filter(slots::id.eq_any(held.clone())))
                            .set(slots::occupant_id.eq(None::<i64>))
                            .execute(tx)?;
                        warn!(
                            "Deactivated user {} released {} slots in semester {}",
                            id,
                            held.len(),
                            semester_id
                        );
                        loads.push(recompute(tx, id, semester_id)?);
                    }
                }
            }
            Ok((find_user(tx, id, "set_user_active")?, loads))
        })
        .await
    }
}
