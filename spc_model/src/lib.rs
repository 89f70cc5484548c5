//! Shared domain model for SPC chart configuration.
//!
//! - **Engines**: the closed set of database engines and their defaults
//! - **Data sources**: registered external database connections
//! - **Charts**: mappings from a data source's table onto an aggregation pipeline
//! - **Roles**: what a signed-in user may do
//!
//! Both the server and the client validate through the same rules defined here.

pub mod auth;
pub mod chart;
pub mod datasource;
pub mod engine;
pub mod role;
pub mod validation;

pub use auth::{Credentials, CurrentUser, Registered, TokenResponse};
pub use chart::{
    AggregationType, ChartConfig, ChartSubmission, LimitValue, ValidChart,
    DEFAULT_AGGREGATION_SIZE, DEFAULT_OPERATION_COLUMN, DEFAULT_PRODUCT_COLUMN,
};
pub use datasource::{ConnectionResult, DataSource, DataSourceDraft, NewDataSource};
pub use engine::{Engine, EngineSpec, UnknownEngine, ENGINES};
pub use role::{Permission, Role};
pub use validation::{ValidationErrors, NON_FIELD_ERRORS};
