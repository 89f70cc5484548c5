//! In-memory backend for unit testing.
//!
//! [`MockBackend`] applies the same validation rules as the server and keeps
//! users, tokens, data sources and charts in memory. Calls are counted in a
//! [`MockCallTracker`] and failures can be injected via [`MockBackendConfig`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use spc_model::{
    ChartConfig, ChartSubmission, ConnectionResult, Credentials, CurrentUser, DataSource,
    DataSourceDraft, Permission, Registered, Role, TokenResponse, ValidationErrors, NON_FIELD_ERRORS,
};

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::session::Session;

const TIMESTAMP: &str = "2024-01-01T00:00:00Z";

/// Controls which operations should fail in the mock.
/// All default to `None` (success).
#[derive(Debug, Clone, Default)]
pub struct MockBackendConfig {
    /// If set, `list_data_sources()` fails with a transport error
    pub list_error: Option<String>,
    /// If set, `create_data_source()` fails with a transport error
    pub create_error: Option<String>,
    /// If set, `delete_data_source()` fails with a transport error
    pub delete_error: Option<String>,
    /// If set, `create_chart()` fails with a transport error
    pub chart_error: Option<String>,
    /// If set, `test_connection()` returns this outcome instead of success
    pub connection_failure: Option<String>,
    /// If set, `me()` fails with a transport error
    pub me_error: Option<String>,
}

/// Counts calls so tests can assert what reached the backend.
#[derive(Debug, Clone, Default)]
pub struct MockCallTracker {
    pub lists: Arc<AtomicUsize>,
    pub creates: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
    pub connection_tests: Arc<AtomicUsize>,
    pub chart_creates: Arc<AtomicUsize>,
    pub logouts: Arc<AtomicUsize>,
}

impl MockCallTracker {
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::Relaxed)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn connection_test_count(&self) -> usize {
        self.connection_tests.load(Ordering::Relaxed)
    }

    pub fn chart_create_count(&self) -> usize {
        self.chart_creates.load(Ordering::Relaxed)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::Relaxed)
    }
}

struct MockUser {
    id: i64,
    password: String,
    role: Role,
}

#[derive(Default)]
struct MockState {
    next_id: i64,
    users: BTreeMap<String, MockUser>,
    tokens: BTreeMap<String, i64>,
    sources: BTreeMap<i64, DataSource>,
    charts: BTreeMap<i64, ChartConfig>,
}

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_for(&self, session: &Session) -> Result<(i64, String, Role)> {
        let token = session.bearer()?;
        let user_id = self
            .tokens
            .get(token)
            .ok_or_else(|| ClientError::Unauthorized("Invalid token.".to_string()))?;
        self.users
            .iter()
            .find(|(_, user)| user.id == *user_id)
            .map(|(email, user)| (user.id, email.clone(), user.role))
            .ok_or_else(|| ClientError::Unauthorized("Invalid token.".to_string()))
    }
}

#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    role: Role,
    config: MockBackendConfig,
    tracker: MockCallTracker,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// New users get `FULL_ACCESS`.
    pub fn new() -> Self {
        Self::with_role(Role::FullAccess)
    }

    /// New users get `role`.
    pub fn with_role(role: Role) -> Self {
        Self {
            state: Arc::default(),
            role,
            config: MockBackendConfig::default(),
            tracker: MockCallTracker::default(),
        }
    }

    pub fn with_config(config: MockBackendConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    pub fn tracker(&self) -> &MockCallTracker {
        &self.tracker
    }

    /// Tokens the mock still accepts.
    pub fn active_tokens(&self) -> usize {
        self.lock().tokens.len()
    }

    /// Registers a user and returns a signed-in session for it.
    pub fn signed_in(&self, email: &str) -> Session {
        let mut state = self.lock();
        let id = state.next_id();
        state.users.insert(
            email.to_string(),
            MockUser {
                id,
                password: String::new(),
                role: self.role,
            },
        );
        let token = format!("token-{}", id);
        state.tokens.insert(token.clone(), id);
        Session::with_token(token)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panic in one test must not poison the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require(&self, session: &Session, permission: Permission) -> Result<i64> {
        let (id, _, role) = self.lock().user_for(session)?;
        if role.allows(permission) {
            Ok(id)
        } else {
            Err(ClientError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }
}

fn injected(error: &Option<String>) -> Result<()> {
    match error {
        Some(msg) => Err(ClientError::Transport(msg.clone())),
        None => Ok(()),
    }
}

impl Backend for MockBackend {
    async fn register(&self, credentials: &Credentials) -> Result<Registered> {
        let mut state = self.lock();
        let email = credentials.email.trim().to_lowercase();
        if state.users.contains_key(&email) {
            return Err(ClientError::Validation(ValidationErrors::single(
                "email",
                "user with this email address already exists.",
            )));
        }
        let id = state.next_id();
        state.users.insert(
            email.clone(),
            MockUser {
                id,
                password: credentials.password.clone(),
                role: self.role,
            },
        );
        Ok(Registered { id, email })
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let mut state = self.lock();
        let email = credentials.email.trim().to_lowercase();
        let id = match state.users.get(&email) {
            Some(user) if user.password == credentials.password => user.id,
            _ => {
                return Err(ClientError::Validation(ValidationErrors::single(
                    NON_FIELD_ERRORS,
                    "Unable to log in with provided credentials.",
                )));
            }
        };
        let existing = state
            .tokens
            .iter()
            .find(|(_, user_id)| **user_id == id)
            .map(|(token, _)| token.clone());
        let token = existing.unwrap_or_else(|| format!("token-{}", id));
        state.tokens.insert(token.clone(), id);
        Ok(TokenResponse { token })
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        self.tracker.logouts.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        state.user_for(session)?;
        state.tokens.remove(session.bearer()?);
        Ok(())
    }

    async fn me(&self, session: &Session) -> Result<CurrentUser> {
        injected(&self.config.me_error)?;
        let (id, email, role) = self.lock().user_for(session)?;
        Ok(CurrentUser {
            id,
            email,
            role,
            is_confirmed: false,
        })
    }

    async fn list_data_sources(&self, session: &Session) -> Result<Vec<DataSource>> {
        self.tracker.lists.fetch_add(1, Ordering::Relaxed);
        injected(&self.config.list_error)?;
        self.require(session, Permission::Read)?;
        Ok(self.lock().sources.values().cloned().collect())
    }

    async fn create_data_source(
        &self,
        session: &Session,
        draft: &DataSourceDraft,
    ) -> Result<DataSource> {
        self.tracker.creates.fetch_add(1, Ordering::Relaxed);
        injected(&self.config.create_error)?;
        self.require(session, Permission::Create)?;
        let source = draft.validate()?;

        let mut state = self.lock();
        if state.sources.values().any(|s| s.name == source.name) {
            return Err(ClientError::Validation(ValidationErrors::single(
                "name",
                "data source with this name already exists.",
            )));
        }
        let id = state.next_id();
        let created = DataSource {
            id,
            name: source.name,
            engine: source.engine,
            host: source.host,
            port: source.port,
            database_name: source.database_name,
            username: source.username,
            is_active: true,
            created_at: TIMESTAMP.to_string(),
            updated_at: TIMESTAMP.to_string(),
        };
        state.sources.insert(id, created.clone());
        Ok(created)
    }

    async fn get_data_source(&self, session: &Session, id: i64) -> Result<DataSource> {
        self.require(session, Permission::Read)?;
        self.lock()
            .sources
            .get(&id)
            .cloned()
            .ok_or(ClientError::NotFound)
    }

    async fn delete_data_source(&self, session: &Session, id: i64) -> Result<()> {
        self.tracker.deletes.fetch_add(1, Ordering::Relaxed);
        injected(&self.config.delete_error)?;
        self.require(session, Permission::Destroy)?;
        let mut state = self.lock();
        state.sources.remove(&id).ok_or(ClientError::NotFound)?;
        state.charts.retain(|_, chart| chart.data_source != id);
        Ok(())
    }

    async fn test_connection(&self, session: &Session, id: i64) -> Result<ConnectionResult> {
        self.tracker.connection_tests.fetch_add(1, Ordering::Relaxed);
        self.require(session, Permission::Read)?;
        if !self.lock().sources.contains_key(&id) {
            return Err(ClientError::NotFound);
        }
        Ok(match &self.config.connection_failure {
            Some(message) => ConnectionResult::failed(message.clone()),
            None => ConnectionResult::ok(),
        })
    }

    async fn list_charts(&self, session: &Session) -> Result<Vec<ChartConfig>> {
        let owner = self.require(session, Permission::Read)?;
        Ok(self
            .lock()
            .charts
            .values()
            .filter(|chart| chart.owner == owner)
            .cloned()
            .collect())
    }

    async fn create_chart(
        &self,
        session: &Session,
        submission: &ChartSubmission,
    ) -> Result<ChartConfig> {
        self.tracker.chart_creates.fetch_add(1, Ordering::Relaxed);
        injected(&self.config.chart_error)?;
        let owner = self.require(session, Permission::Create)?;

        let mut state = self.lock();
        let mut errors = ValidationErrors::new();
        let valid = submission.validate().map_err(|e| errors.merge(e)).ok();
        let source_name = submission.data_source.and_then(|id| {
            let name = state.sources.get(&id).map(|s| s.name.clone());
            if name.is_none() {
                errors.add(
                    "data_source",
                    format!("Invalid pk \"{}\" - object does not exist.", id),
                );
            }
            name
        });
        let (valid, data_source_name) = match (valid, source_name) {
            (Some(valid), Some(name)) if errors.is_empty() => (valid, name),
            _ => return Err(ClientError::Validation(errors)),
        };

        let id = state.next_id();
        let chart = ChartConfig {
            id,
            owner,
            title: valid.title,
            data_source: valid.data_source,
            data_source_name,
            table_name: valid.table_name,
            value_column: valid.value_column,
            datetime_column: valid.datetime_column,
            product_column: valid.product_column,
            product_identifier: valid.product_identifier,
            operation_column: valid.operation_column,
            operation_identifier: valid.operation_identifier,
            upper_spec_limit: valid.upper_spec_limit,
            lower_spec_limit: valid.lower_spec_limit,
            target: valid.target,
            aggregation_type: valid.aggregation_type,
            aggregation_size: valid.aggregation_size,
            weco_rules: valid.weco_rules,
            created_at: TIMESTAMP.to_string(),
            updated_at: TIMESTAMP.to_string(),
        };
        state.charts.insert(id, chart.clone());
        Ok(chart)
    }

    async fn get_chart(&self, session: &Session, id: i64) -> Result<ChartConfig> {
        self.require(session, Permission::Read)?;
        self.lock().charts.get(&id).cloned().ok_or(ClientError::NotFound)
    }
}
