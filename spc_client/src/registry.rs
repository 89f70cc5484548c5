//! Data source registry
//!
//! CRUD and connection tests over the registered data sources. Ports left out
//! of a draft are filled from the engine table before anything is sent.

use spc_model::{ConnectionResult, DataSource, DataSourceDraft};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::Result;
use crate::session::Session;

/// Outcome of a confirmed delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    /// The confirmation was declined; nothing was sent.
    Cancelled,
}

pub struct DataSourceRegistry<'a, B: Backend> {
    backend: &'a B,
}

impl<'a, B: Backend> DataSourceRegistry<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub async fn create(&self, session: &Session, draft: &DataSourceDraft) -> Result<DataSource> {
        let mut draft = draft.clone();
        draft.port.get_or_insert(i64::from(draft.engine.default_port()));
        draft.validate()?;

        let source = self.backend.create_data_source(session, &draft).await?;
        info!(
            source_id = source.id,
            name = source.name.as_str(),
            engine = %source.engine,
            port = source.port,
            "Data source registered"
        );
        Ok(source)
    }

    pub async fn list(&self, session: &Session) -> Result<Vec<DataSource>> {
        self.backend.list_data_sources(session).await
    }

    pub async fn get(&self, session: &Session, id: i64) -> Result<DataSource> {
        self.backend.get_data_source(session, id).await
    }

    /// Asks `confirm` first and only deletes on approval. Deleting a source
    /// that no longer exists fails with `NotFound`.
    pub async fn delete(
        &self,
        session: &Session,
        source: &DataSource,
        confirm: impl FnOnce(&DataSource) -> bool,
    ) -> Result<Deletion> {
        if !confirm(source) {
            return Ok(Deletion::Cancelled);
        }
        self.backend.delete_data_source(session, source.id).await?;
        info!(source_id = source.id, name = source.name.as_str(), "Data source deleted");
        Ok(Deletion::Deleted)
    }

    /// One attempt, never retried. A failed probe is a normal result.
    pub async fn test_connection(&self, session: &Session, id: i64) -> Result<ConnectionResult> {
        let result = self.backend.test_connection(session, id).await?;
        if !result.success {
            warn!(source_id = id, message = result.message.as_str(), "Connection test failed");
        }
        Ok(result)
    }
}

/// A locally cached list of data sources. Deletes remove the entry without
/// re-reading; [`DataSourceView::refresh`] re-reads everything.
pub struct DataSourceView<'a, B: Backend> {
    registry: DataSourceRegistry<'a, B>,
    sources: Vec<DataSource>,
}

impl<'a, B: Backend> DataSourceView<'a, B> {
    pub async fn load(registry: DataSourceRegistry<'a, B>, session: &Session) -> Result<Self> {
        let sources = registry.list(session).await?;
        Ok(Self { registry, sources })
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub async fn refresh(&mut self, session: &Session) -> Result<&[DataSource]> {
        self.sources = self.registry.list(session).await?;
        Ok(&self.sources)
    }

    pub async fn delete(
        &mut self,
        session: &Session,
        id: i64,
        confirm: impl FnOnce(&DataSource) -> bool,
    ) -> Result<Deletion> {
        let source = match self.sources.iter().find(|s| s.id == id) {
            Some(source) => source.clone(),
            None => self.registry.get(session, id).await?,
        };
        let outcome = self.registry.delete(session, &source, confirm).await?;
        if outcome == Deletion::Deleted {
            self.sources.retain(|s| s.id != id);
        }
        Ok(outcome)
    }

    pub async fn test_connection(&self, session: &Session, id: i64) -> Result<ConnectionResult> {
        self.registry.test_connection(session, id).await
    }
}
