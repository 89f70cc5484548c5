//! SPC Studio client
//!
//! - [`Session`]: the bearer token and current user, passed into every call
//! - [`DataSourceRegistry`]: register, list, delete and probe data sources
//! - [`ChartConfigBuilder`]: fill in, normalize and submit a chart configuration
//!
//! All of them work against a [`Backend`]: [`HttpBackend`] for the real server,
//! [`mock::MockBackend`] for tests.

pub mod backend;
pub mod builder;
pub mod error;
pub mod http;
pub mod mock;
pub mod registry;
pub mod session;

pub use backend::Backend;
pub use builder::{get_chart, list_charts, ChartConfigBuilder};
pub use error::{ClientError, Result};
pub use http::HttpBackend;
pub use registry::{DataSourceRegistry, DataSourceView, Deletion};
pub use session::Session;
