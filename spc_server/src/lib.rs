//! SPC Studio server
//!
//! Persists data sources, chart configurations and users behind a JSON API,
//! and probes registered databases on request.
//!
//! ## Architecture
//!
//! - **Users**: register, sign in for a bearer token, and act within their role
//! - **Data sources**: named connections to external MSSQL or PostgreSQL databases
//! - **Chart configurations**: per-user mappings of a data source table onto an SPC chart
//! - **Audit log**: who created, deleted or tested what, and when

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod logging;
pub mod probe;

pub use api::{app, routes, ApiError, AppState};
pub use config::{Config, ConfigError};
pub use database::{Database, DatabaseError};
