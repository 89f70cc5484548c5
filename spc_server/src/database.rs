//! Database Infrastructure Layer
//!
//! Handles database connection, schema initialization, and provides
//! data access methods for users, tokens, data sources, chart configurations
//! and the audit log.

use std::{ops::Deref, str::FromStr};

use chrono::{SecondsFormat, Utc};
use spc_model::{
    ChartConfig, DataSource, Engine, NewDataSource, Role, ValidChart,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

#[derive(Debug)]
pub enum DatabaseError {
    Connection(sqlx::Error),
    Query(sqlx::Error),
    InvalidData(String),
    NotFound(String),
    Duplicate(String),
    /// A foreign key pointed at a row that does not exist (field, id).
    MissingReference(String, i64),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Connection(err) => write!(f, "Database connection error: {}", err),
            DatabaseError::Query(err) => write!(f, "Database query error: {}", err),
            DatabaseError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::Duplicate(msg) => write!(f, "Already exists: {}", msg),
            DatabaseError::MissingReference(field, id) => {
                write!(f, "Referenced {} {} does not exist", field, id)
            }
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Connection(err) | DatabaseError::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::Query(err)
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Turns a unique-constraint violation into `Duplicate(what)`.
fn on_unique(what: &str) -> impl FnOnce(sqlx::Error) -> DatabaseError + '_ {
    move |err| match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DatabaseError::Duplicate(what.to_string())
        }
        _ => DatabaseError::Query(err),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Database row for users table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_confirmed: bool,
    pub is_active: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn role(&self) -> Result<Role> {
        self.role
            .parse()
            .map_err(|e: String| DatabaseError::InvalidData(e))
    }
}

/// Database row for data_sources table. Carries the stored password, so it
/// never leaves the server as-is.
#[derive(Clone, sqlx::FromRow)]
pub struct DataSourceRow {
    pub id: i64,
    pub name: String,
    pub engine: String,
    pub host: String,
    pub port: i64,
    pub database_name: String,
    pub username: String,
    pub password: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl std::fmt::Debug for DataSourceRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceRow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl DataSourceRow {
    pub fn engine(&self) -> Result<Engine> {
        self.engine
            .parse()
            .map_err(|e: spc_model::UnknownEngine| DatabaseError::InvalidData(e.to_string()))
    }

    pub fn port(&self) -> Result<u16> {
        u16::try_from(self.port).map_err(|_| {
            DatabaseError::InvalidData(format!("port {} out of range", self.port))
        })
    }
}

impl TryFrom<DataSourceRow> for DataSource {
    type Error = DatabaseError;

    fn try_from(row: DataSourceRow) -> Result<Self> {
        Ok(Self {
            engine: row.engine()?,
            port: row.port()?,
            id: row.id,
            name: row.name,
            host: row.host,
            database_name: row.database_name,
            username: row.username,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for chart_configs joined with its data source name
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChartRow {
    pub id: i64,
    pub owner_id: i64,
    pub data_source_id: i64,
    pub data_source_name: String,
    pub title: String,
    pub table_name: String,
    pub value_column: String,
    pub datetime_column: String,
    pub product_column: String,
    pub product_identifier: Option<String>,
    pub operation_column: String,
    pub operation_identifier: Option<String>,
    pub upper_spec_limit: Option<f64>,
    pub lower_spec_limit: Option<f64>,
    pub target: Option<f64>,
    pub aggregation_type: String,
    pub aggregation_size: i64,
    pub weco_rules: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ChartRow> for ChartConfig {
    type Error = DatabaseError;

    fn try_from(row: ChartRow) -> Result<Self> {
        let aggregation_type = row
            .aggregation_type
            .parse()
            .map_err(DatabaseError::InvalidData)?;
        let aggregation_size = u32::try_from(row.aggregation_size).map_err(|_| {
            DatabaseError::InvalidData(format!(
                "aggregation_size {} out of range",
                row.aggregation_size
            ))
        })?;
        let weco_rules = serde_json::from_str(&row.weco_rules)
            .map_err(|e| DatabaseError::InvalidData(format!("weco_rules: {}", e)))?;

        Ok(Self {
            id: row.id,
            owner: row.owner_id,
            title: row.title,
            data_source: row.data_source_id,
            data_source_name: row.data_source_name,
            table_name: row.table_name,
            value_column: row.value_column,
            datetime_column: row.datetime_column,
            product_column: row.product_column,
            product_identifier: row.product_identifier,
            operation_column: row.operation_column,
            operation_identifier: row.operation_identifier,
            upper_spec_limit: row.upper_spec_limit,
            lower_spec_limit: row.lower_spec_limit,
            target: row.target,
            aggregation_type,
            aggregation_size,
            weco_rules,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for audit_log table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub details: String,
    pub target_model: String,
    pub target_id: String,
    pub timestamp: String,
}

const CHART_SELECT: &str = r#"
    SELECT c.id, c.owner_id, c.data_source_id, d.name AS data_source_name,
           c.title, c.table_name, c.value_column, c.datetime_column,
           c.product_column, c.product_identifier,
           c.operation_column, c.operation_identifier,
           c.upper_spec_limit, c.lower_spec_limit, c.target,
           c.aggregation_type, c.aggregation_size, c.weco_rules,
           c.created_at, c.updated_at
    FROM chart_configs c
    JOIN data_sources d ON c.data_source_id = d.id
"#;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Deref for Database {
    type Target = SqlitePool;
    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let database_config = SqliteConnectOptions::from_str(database_url)
            .map_err(DatabaseError::Connection)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives and dies with its connection, so the
        // pool keeps exactly one open for the lifetime of the process.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_lazy_with(database_config)
        } else {
            SqlitePool::connect_lazy_with(database_config)
        };

        let db = Self { pool };
        db.initialize_tables().await?;

        info!("Database initialized at {}", database_url);
        Ok(db)
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'READ_ONLY',
                is_confirmed BOOLEAN NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One token per user, created on first login and removed on logout
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_tokens (
                key TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data_sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                engine TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                database_name TEXT NOT NULL,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chart_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                data_source_id INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                table_name TEXT NOT NULL,
                value_column TEXT NOT NULL,
                datetime_column TEXT NOT NULL,
                product_column TEXT NOT NULL DEFAULT 'Product',
                product_identifier TEXT,
                operation_column TEXT NOT NULL DEFAULT 'Operation',
                operation_identifier TEXT,
                upper_spec_limit REAL,
                lower_spec_limit REAL,
                target REAL,
                aggregation_type TEXT NOT NULL DEFAULT 'TIME_HOUR',
                aggregation_size INTEGER NOT NULL DEFAULT 1 CHECK (aggregation_size >= 1),
                weco_rules TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (data_source_id) REFERENCES data_sources(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER,
                action TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                target_model TEXT NOT NULL DEFAULT '',
                target_id TEXT NOT NULL DEFAULT '',
                timestamp TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chart_configs_owner_id ON chart_configs(owner_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chart_configs_data_source_id ON chart_configs(data_source_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========== User Operations ==========

    pub async fn create_user(&self, email: &str, password_hash: &str, role: Role) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, role, is_confirmed, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(on_unique("email"))?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, password_hash, role, is_confirmed, is_active, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("User '{}' not found", email))
            }
            e => DatabaseError::Query(e),
        })
    }

    pub async fn set_user_role(&self, email: &str, role: Role) -> Result<()> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE email = ?")
            .bind(role.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User '{}' not found", email)));
        }
        Ok(())
    }

    // ========== Token Operations ==========

    /// Returns the user's token, storing `candidate` as the token if the user
    /// has none yet.
    pub async fn get_or_create_token(&self, user_id: i64, candidate: &str) -> Result<String> {
        sqlx::query(
            r#"
            INSERT INTO auth_tokens (key, user_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(candidate)
        .bind(user_id)
        .bind(now())
        .execute(&self.pool)
        .await?;

        let key: String = sqlx::query_scalar("SELECT key FROM auth_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(key)
    }

    pub async fn user_for_token(&self, token: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.email, u.password_hash, u.role, u.is_confirmed, u.is_active, u.created_at
            FROM auth_tokens t
            JOIN users u ON t.user_id = u.id
            WHERE t.key = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    pub async fn delete_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM auth_tokens WHERE key = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========== Data Source Operations ==========

    pub async fn create_data_source(&self, source: &NewDataSource) -> Result<DataSourceRow> {
        let timestamp = now();
        let result = sqlx::query(
            r#"
            INSERT INTO data_sources
                (name, engine, host, port, database_name, username, password, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.name)
        .bind(source.engine.as_str())
        .bind(&source.host)
        .bind(i64::from(source.port))
        .bind(&source.database_name)
        .bind(&source.username)
        .bind(&source.password)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await
        .map_err(on_unique("name"))?;

        self.get_data_source(result.last_insert_rowid()).await
    }

    pub async fn get_data_source(&self, id: i64) -> Result<DataSourceRow> {
        sqlx::query_as::<_, DataSourceRow>(
            r#"
            SELECT id, name, engine, host, port, database_name, username, password,
                   is_active, created_at, updated_at
            FROM data_sources
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound(format!("Data source with id {} not found", id))
            }
            e => DatabaseError::Query(e),
        })
    }

    pub async fn list_data_sources(&self) -> Result<Vec<DataSourceRow>> {
        sqlx::query_as::<_, DataSourceRow>(
            r#"
            SELECT id, name, engine, host, port, database_name, username, password,
                   is_active, created_at, updated_at
            FROM data_sources
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }

    /// Deletes the source and, through the foreign key, its charts.
    pub async fn delete_data_source(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM data_sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Data source with id {} not found",
                id
            )));
        }
        Ok(())
    }

    pub async fn set_data_source_active(&self, id: i64, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE data_sources SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Data source with id {} not found",
                id
            )));
        }
        Ok(())
    }

    // ========== Chart Config Operations ==========

    pub async fn create_chart(&self, owner_id: i64, chart: &ValidChart) -> Result<ChartRow> {
        let timestamp = now();
        let result = sqlx::query(
            r#"
            INSERT INTO chart_configs (
                owner_id, data_source_id, title, table_name, value_column, datetime_column,
                product_column, product_identifier, operation_column, operation_identifier,
                upper_spec_limit, lower_spec_limit, target,
                aggregation_type, aggregation_size, weco_rules, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(chart.data_source)
        .bind(&chart.title)
        .bind(&chart.table_name)
        .bind(&chart.value_column)
        .bind(&chart.datetime_column)
        .bind(&chart.product_column)
        .bind(&chart.product_identifier)
        .bind(&chart.operation_column)
        .bind(&chart.operation_identifier)
        .bind(chart.upper_spec_limit)
        .bind(chart.lower_spec_limit)
        .bind(chart.target)
        .bind(chart.aggregation_type.as_str())
        .bind(i64::from(chart.aggregation_size))
        .bind(chart.weco_rules.to_string())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await
        .map_err(|err| match &err {
            // The source can be deleted between the handler's check and here.
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                DatabaseError::MissingReference("data_source".to_string(), chart.data_source)
            }
            _ => DatabaseError::Query(err),
        })?;

        self.get_chart(result.last_insert_rowid()).await
    }

    pub async fn get_chart(&self, id: i64) -> Result<ChartRow> {
        sqlx::query_as::<_, ChartRow>(&format!("{CHART_SELECT} WHERE c.id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => {
                    DatabaseError::NotFound(format!("Chart with id {} not found", id))
                }
                e => DatabaseError::Query(e),
            })
    }

    pub async fn list_charts_by_owner(&self, owner_id: i64) -> Result<Vec<ChartRow>> {
        sqlx::query_as::<_, ChartRow>(&format!("{CHART_SELECT} WHERE c.owner_id = ? ORDER BY c.id"))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }

    // ========== Audit Log Operations ==========

    pub async fn record_audit(
        &self,
        user_id: Option<i64>,
        action: &str,
        details: &str,
        target_model: &str,
        target_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, details, target_model, target_id, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(details)
        .bind(target_model)
        .bind(target_id)
        .bind(now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_audit(&self, limit: i64) -> Result<Vec<AuditRow>> {
        sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, action, details, target_model, target_id, timestamp
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::Query)
    }
}
