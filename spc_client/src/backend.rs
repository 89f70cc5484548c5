//! Persistence boundary abstraction
//!
//! Every registry and builder operation goes through a [`Backend`]. The HTTP
//! implementation talks to the SPC server; the mock keeps everything in memory.

use spc_model::{
    ChartConfig, ChartSubmission, ConnectionResult, Credentials, CurrentUser, DataSource,
    DataSourceDraft, Registered, TokenResponse,
};

use crate::error::Result;
use crate::session::Session;

pub trait Backend {
    async fn register(&self, credentials: &Credentials) -> Result<Registered>;

    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse>;

    /// Revoke the session's token on the server side
    async fn logout(&self, session: &Session) -> Result<()>;

    async fn me(&self, session: &Session) -> Result<CurrentUser>;

    async fn list_data_sources(&self, session: &Session) -> Result<Vec<DataSource>>;

    async fn create_data_source(
        &self,
        session: &Session,
        draft: &DataSourceDraft,
    ) -> Result<DataSource>;

    async fn get_data_source(&self, session: &Session, id: i64) -> Result<DataSource>;

    async fn delete_data_source(&self, session: &Session, id: i64) -> Result<()>;

    /// A failed probe is `Ok` with `success: false`.
    async fn test_connection(&self, session: &Session, id: i64) -> Result<ConnectionResult>;

    async fn list_charts(&self, session: &Session) -> Result<Vec<ChartConfig>>;

    async fn create_chart(
        &self,
        session: &Session,
        submission: &ChartSubmission,
    ) -> Result<ChartConfig>;

    async fn get_chart(&self, session: &Session, id: i64) -> Result<ChartConfig>;
}
