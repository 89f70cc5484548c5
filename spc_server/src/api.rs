//! SPC API Handlers
//!
//! HTTP JSON endpoints, all nested under `/api`:
//! - `POST /auth/register` - Create an account
//! - `POST /auth/login` - Exchange credentials for a bearer token
//! - `POST /auth/logout` - Revoke the caller's token
//! - `GET /auth/me` - The signed-in user
//! - `GET /spc/datasources` - List data sources
//! - `POST /spc/datasources` - Register a data source
//! - `GET /spc/datasources/{id}` - Get a data source
//! - `DELETE /spc/datasources/{id}` - Delete a data source and its charts
//! - `POST /spc/datasources/{id}/test_connection` - Probe the stored connection
//! - `GET /spc/charts` - List the caller's chart configurations
//! - `POST /spc/charts` - Create a chart configuration
//! - `GET /spc/charts/{id}` - Get a chart configuration
//!
//! Validation failures answer 400 with a `{"field": ["message"]}` body.

use std::sync::Arc;

use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use spc_model::{
    ChartConfig, ChartSubmission, ConnectionResult, Credentials, CurrentUser, DataSource,
    DataSourceDraft, Permission, Registered, TokenResponse, ValidationErrors, NON_FIELD_ERRORS,
};
use tracing::{Instrument, error, info, warn};

use crate::auth::{self, AuthUser};
use crate::config::Config;
use crate::database::{Database, DatabaseError};
use crate::probe::{self, ConnectionTarget};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationErrors),
    Unauthorized(String),
    Forbidden,
    NotFound,
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Validation(errors) => write!(f, "Validation error: {}", errors),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden => write!(f, "Forbidden"),
            ApiError::NotFound => write!(f, "Not found"),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

fn missing_pk(id: i64) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", id)
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(_) => ApiError::NotFound,
            DatabaseError::Duplicate(field) => {
                ApiError::Validation(ValidationErrors::single(&field, "This value is already in use."))
            }
            DatabaseError::MissingReference(field, id) => ApiError::Validation(
                ValidationErrors::single(&field, missing_pk(id)),
            ),
            err => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(ValidationErrors::single(
            NON_FIELD_ERRORS,
            rejection.body_text(),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            ApiError::Unauthorized(detail) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "You do not have permission to perform this action." })),
            )
                .into_response(),
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal server error." })),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Audit entries are best effort; a failed write is logged, not surfaced.
async fn audit(state: &AppState, user: &AuthUser, action: &str, details: &str, model: &str, id: i64) {
    if let Err(e) = state
        .db
        .record_audit(Some(user.id), action, details, model, &id.to_string())
        .await
    {
        warn!(error = %e, action, target_id = id, "Failed to record audit entry");
    }
}

// ========== Auth ==========

fn validate_credentials(credentials: &Credentials) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let email = credentials.email.trim();
    if email.is_empty() {
        errors.add("email", "This field may not be blank.");
    } else if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    }
    if credentials.password.is_empty() {
        errors.add("password", "This field may not be blank.");
    }
    errors.into_result(())
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
                && email.len() <= 254
        }
        None => false,
    }
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Registered>)> {
    let Json(credentials) = payload?;
    validate_credentials(&credentials)?;

    let email = credentials.email.trim().to_lowercase();
    let hash = auth::hash_password(&credentials.password)?;
    let id = match state.db.create_user(&email, &hash, state.config.default_role).await {
        Ok(id) => id,
        Err(DatabaseError::Duplicate(_)) => {
            return Err(ApiError::Validation(ValidationErrors::single(
                "email",
                "user with this email address already exists.",
            )));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = id, email = email.as_str(), "New user registered");
    Ok((StatusCode::CREATED, Json(Registered { id, email })))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(credentials) = payload?;
    let rejected = || {
        ApiError::Validation(ValidationErrors::single(
            NON_FIELD_ERRORS,
            "Unable to log in with provided credentials.",
        ))
    };

    let email = credentials.email.trim().to_lowercase();
    let user = match state.db.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => return Err(rejected()),
        Err(e) => return Err(e.into()),
    };
    if !user.is_active || !auth::verify_password(&credentials.password, &user.password_hash) {
        warn!(email = email.as_str(), "Failed login attempt");
        return Err(rejected());
    }

    let token = state.db.get_or_create_token(user.id, &auth::new_token()).await?;
    info!(user_id = user.id, "User logged in");
    Ok(Json(TokenResponse { token }))
}

async fn logout(State(state): State<AppState>, user: AuthUser) -> ApiResult<StatusCode> {
    state.db.delete_token(&user.token).await?;
    info!(user_id = user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

async fn me(user: AuthUser) -> Json<CurrentUser> {
    Json(user.current_user())
}

// ========== Data Sources ==========

async fn list_data_sources(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<DataSource>>> {
    user.require(Permission::Read)?;
    let sources = state
        .db
        .list_data_sources()
        .await?
        .into_iter()
        .map(DataSource::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(sources))
}

async fn create_data_source(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<DataSourceDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DataSource>)> {
    user.require(Permission::Create)?;
    let Json(draft) = payload?;
    let source = draft.validate()?;

    let row = match state.db.create_data_source(&source).await {
        Ok(row) => row,
        Err(DatabaseError::Duplicate(_)) => {
            return Err(ApiError::Validation(ValidationErrors::single(
                "name",
                "data source with this name already exists.",
            )));
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        source_id = row.id,
        name = row.name.as_str(),
        engine = row.engine.as_str(),
        "Data source created"
    );
    audit(&state, &user, "create", &row.name, "DataSource", row.id).await;
    Ok((StatusCode::CREATED, Json(DataSource::try_from(row)?)))
}

async fn get_data_source(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DataSource>> {
    user.require(Permission::Read)?;
    let row = state.db.get_data_source(id).await?;
    Ok(Json(DataSource::try_from(row)?))
}

async fn delete_data_source(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    user.require(Permission::Destroy)?;
    state.db.delete_data_source(id).await?;

    info!(source_id = id, user_id = user.id, "Data source deleted");
    audit(&state, &user, "delete", "", "DataSource", id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn test_connection(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ConnectionResult>> {
    user.require(Permission::Read)?;
    let row = state.db.get_data_source(id).await?;
    let target = ConnectionTarget::try_from(&row)?;

    info!(source_id = id, engine = %target.engine, host = target.host.as_str(), "Testing connection");
    let result = probe::test_connection(&target, state.config.connect_timeout).await;
    if result.success {
        info!(source_id = id, "Connection test succeeded");
    } else {
        warn!(source_id = id, message = result.message.as_str(), "Connection test failed");
    }

    let outcome = if result.success { "success" } else { "failure" };
    audit(&state, &user, "test_connection", outcome, "DataSource", id).await;
    Ok(Json(result))
}

// ========== Chart Configs ==========

async fn list_charts(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<ChartConfig>>> {
    user.require(Permission::Read)?;
    let charts = state
        .db
        .list_charts_by_owner(user.id)
        .await?
        .into_iter()
        .map(ChartConfig::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(charts))
}

async fn create_chart(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<ChartSubmission>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChartConfig>)> {
    user.require(Permission::Create)?;
    let Json(submission) = payload?;

    let mut errors = ValidationErrors::new();
    let valid = match submission.validate() {
        Ok(valid) => Some(valid),
        Err(e) => {
            errors.merge(e);
            None
        }
    };

    if let Some(id) = submission.data_source {
        match state.db.get_data_source(id).await {
            Ok(source) if source.is_active => {}
            Ok(_) => errors.add("data_source", format!("Data source {} is not active.", id)),
            Err(DatabaseError::NotFound(_)) => errors.add("data_source", missing_pk(id)),
            Err(e) => return Err(e.into()),
        }
    }

    let valid = match valid {
        Some(valid) if errors.is_empty() => valid,
        _ => return Err(ApiError::Validation(errors)),
    };

    let row = state.db.create_chart(user.id, &valid).await?;
    info!(
        chart_id = row.id,
        data_source = row.data_source_id,
        owner = user.id,
        "Chart configuration created"
    );
    audit(&state, &user, "create", &row.title, "ChartConfig", row.id).await;
    Ok((StatusCode::CREATED, Json(ChartConfig::try_from(row)?)))
}

async fn get_chart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChartConfig>> {
    user.require(Permission::Read)?;
    let row = state.db.get_chart(id).await?;
    Ok(Json(ChartConfig::try_from(row)?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/spc/datasources", get(list_data_sources).post(create_data_source))
        .route("/spc/datasources/{id}", get(get_data_source).delete(delete_data_source))
        .route("/spc/datasources/{id}/test_connection", post(test_connection))
        .route("/spc/charts", get(list_charts).post(create_chart))
        .route("/spc/charts/{id}", get(get_chart))
}

async fn trace_requests(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!("http.request", method = %method, path = %path);

    let started = Instant::now();
    let response = next.run(request).instrument(span).await;
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

/// The full application: API routes, health check and request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes())
        .route("/health", get(|| async { "OK" }))
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("eng@plant.example"));
        assert!(!is_valid_email("eng"));
        assert!(!is_valid_email("@plant.example"));
        assert!(!is_valid_email("eng@plant"));
        assert!(!is_valid_email("eng@@plant.example"));
        assert!(!is_valid_email("e ng@plant.example"));
    }

    #[test]
    fn credentials_require_both_fields() {
        let errors = validate_credentials(&Credentials::default()).unwrap_err();
        assert!(errors.contains("email"));
        assert!(errors.contains("password"));
    }

    #[test]
    fn not_found_and_duplicates_map_to_client_errors() {
        assert!(matches!(
            ApiError::from(DatabaseError::NotFound("x".into())),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from(DatabaseError::Duplicate("name".into())),
            ApiError::Validation(e) if e.contains("name")
        ));
        assert!(matches!(
            ApiError::from(DatabaseError::InvalidData("bad".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn source_deleted_before_insert_is_a_field_error() {
        match ApiError::from(DatabaseError::MissingReference("data_source".into(), 7)) {
            ApiError::Validation(errors) => assert_eq!(
                errors.get("data_source"),
                Some(&["Invalid pk \"7\" - object does not exist.".to_string()][..])
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
