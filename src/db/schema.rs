//! Database schema definitions
//!
//! Tables are created with plain DDL on first open; `schema_version` tracks
//! which migrations have run.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::NexusError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 2;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), NexusError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Current schema version (0 if not initialized)
pub fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, NexusError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| NexusError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let row: Option<VersionRow> = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result(conn)
        .optional()?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), NexusError> {
    diesel::sql_query("DELETE FROM schema_version").execute(conn)?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), NexusError> {
    for (name, ddl) in [
        ("enterprises", ENTERPRISES_SCHEMA),
        ("users", USERS_SCHEMA),
        ("policies", POLICIES_SCHEMA),
        ("comments", COMMENTS_SCHEMA),
        ("reports", REPORTS_SCHEMA),
        ("indexes", INDEXES_SCHEMA),
    ] {
        conn.batch_execute(ddl)
            .map_err(|e| NexusError::Database(format!("Failed to create {}: {}", name, e)))?;
    }
    Ok(())
}

fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), NexusError> {
    if from_version < 2 {
        // v2: intelligence reports
        conn.batch_execute(REPORTS_SCHEMA)
            .map_err(|e| NexusError::Database(format!("Failed to create reports: {}", e)))?;
    }

    set_schema_version(conn, SCHEMA_VERSION)
}

const ENTERPRISES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS enterprises (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    env_scope TEXT NOT NULL CHECK (env_scope IN ('DEMO', 'PROD')),
    name TEXT NOT NULL,
    unified_social_credit_code TEXT,
    legal_representative TEXT,
    feijiang_wenxin TEXT,
    clue_in_time TEXT,
    clue_update_time TEXT,
    partner_level TEXT,
    eco_ai_products TEXT,
    priority TEXT,
    base TEXT,
    registered_capital BIGINT,
    employee_count INTEGER,
    enterprise_background TEXT,
    industry TEXT,
    task_direction TEXT,
    tech_field TEXT,
    contact_info TEXT,
    usage_scenario TEXT,
    longitude DOUBLE,
    latitude DOUBLE,
    adoption_depth TEXT,
    ernie_model_type TEXT,
    monthly_api_calls BIGINT,
    clue_stage TEXT,
    clue_source TEXT,
    clue_source_detail TEXT,
    is_powered_by INTEGER NOT NULL DEFAULT 0,
    pb_auth_info TEXT,
    award_status TEXT,
    award_time TEXT,
    award_location TEXT,
    cert_expiry_date TEXT,
    cert_status TEXT,
    shipping_status TEXT,
    tracking_number TEXT,
    ai_implementation_stage TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    owner_id INTEGER REFERENCES users(id),
    created_by TEXT,
    updated_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    env_scope TEXT NOT NULL CHECK (env_scope IN ('DEMO', 'PROD')),
    status TEXT NOT NULL DEFAULT 'active',
    first_name TEXT,
    region TEXT,
    department TEXT,
    manager_id INTEGER REFERENCES users(id),
    last_login_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const POLICIES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS policies (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    env_scope TEXT NOT NULL CHECK (env_scope IN ('DEMO', 'PROD')),
    title TEXT,
    source_url TEXT NOT NULL,
    content TEXT,
    summary TEXT,
    publish_city TEXT,
    publish_year INTEGER,
    industry_tags TEXT,
    mind_map_json TEXT,
    process_status TEXT NOT NULL DEFAULT 'PENDING',
    error_message TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const COMMENTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    env_scope TEXT NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('ENTERPRISE', 'POLICY')),
    target_id INTEGER NOT NULL,
    author_id INTEGER NOT NULL REFERENCES users(id),
    content TEXT NOT NULL,
    mentioned_ids TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users(id),
    notification_type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    link TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

const REPORTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    env_scope TEXT NOT NULL CHECK (env_scope IN ('DEMO', 'PROD')),
    title TEXT NOT NULL,
    report_type TEXT NOT NULL,
    format TEXT NOT NULL DEFAULT 'EXCEL',
    status TEXT NOT NULL DEFAULT 'generating',
    description TEXT NOT NULL DEFAULT '',
    filters TEXT,
    file_name TEXT,
    file_data BLOB,
    row_count INTEGER,
    error_message TEXT,
    created_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_scope ON reports(env_scope, created_at);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_enterprises_scope_status ON enterprises(env_scope, status);
CREATE INDEX IF NOT EXISTS idx_enterprises_scope_name ON enterprises(env_scope, name);
CREATE INDEX IF NOT EXISTS idx_enterprises_credit_code ON enterprises(env_scope, unified_social_credit_code);
CREATE INDEX IF NOT EXISTS idx_enterprises_updated ON enterprises(updated_at);
CREATE INDEX IF NOT EXISTS idx_enterprises_cert_expiry ON enterprises(cert_expiry_date);
CREATE INDEX IF NOT EXISTS idx_policies_scope ON policies(env_scope, status);
CREATE INDEX IF NOT EXISTS idx_policies_process_status ON policies(process_status);
CREATE INDEX IF NOT EXISTS idx_comments_target ON comments(target_type, target_id);
CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
"#;
