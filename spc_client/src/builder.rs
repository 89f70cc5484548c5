//! Chart configuration builder
//!
//! Holds the chart form as the user typed it. Limits stay raw text until
//! [`ChartConfigBuilder::build`]: blank becomes `null`, anything else is sent
//! unparsed and the server decides whether it is a number.

use serde_json::Value;
use spc_model::{
    AggregationType, ChartConfig, ChartSubmission, DataSource, LimitValue, ValidationErrors,
    DEFAULT_AGGREGATION_SIZE, DEFAULT_OPERATION_COLUMN, DEFAULT_PRODUCT_COLUMN,
};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::error::Result;
use crate::registry::DataSourceRegistry;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfigBuilder {
    pub title: String,
    pub data_source: Option<i64>,
    pub table_name: String,
    pub value_column: String,
    pub datetime_column: String,
    pub product_column: String,
    pub product_identifier: String,
    pub operation_column: String,
    pub operation_identifier: String,
    pub upper_spec_limit: String,
    pub lower_spec_limit: String,
    pub target: String,
    pub aggregation_type: AggregationType,
    pub aggregation_size: i64,
    pub weco_rules: Value,
}

impl Default for ChartConfigBuilder {
    fn default() -> Self {
        Self {
            title: String::new(),
            data_source: None,
            table_name: String::new(),
            value_column: String::new(),
            datetime_column: String::new(),
            product_column: DEFAULT_PRODUCT_COLUMN.to_string(),
            product_identifier: String::new(),
            operation_column: DEFAULT_OPERATION_COLUMN.to_string(),
            operation_identifier: String::new(),
            upper_spec_limit: String::new(),
            lower_spec_limit: String::new(),
            target: String::new(),
            aggregation_type: AggregationType::default(),
            aggregation_size: DEFAULT_AGGREGATION_SIZE,
            weco_rules: Value::Object(Default::default()),
        }
    }
}

fn limit(raw: &str) -> Option<LimitValue> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| LimitValue::Text(raw.to_string()))
}

fn identifier(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

impl ChartConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the first source when none is chosen yet. Returns the selection.
    pub fn preselect(&mut self, sources: &[DataSource]) -> Option<i64> {
        if self.data_source.is_none() {
            self.data_source = sources.first().map(|source| source.id);
        }
        self.data_source
    }

    /// Lists the selectable sources and preselects the first one.
    pub async fn load_sources<B: Backend>(
        &mut self,
        registry: &DataSourceRegistry<'_, B>,
        session: &Session,
    ) -> Result<Vec<DataSource>> {
        let sources = registry.list(session).await?;
        if let Some(id) = self.preselect(&sources) {
            debug!(source_id = id, "Data source selected");
        }
        Ok(sources)
    }

    /// Normalizes the form into a submission. Only the checks the form can
    /// answer on its own run here; the server validates the rest.
    pub fn build(&self) -> std::result::Result<ChartSubmission, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.data_source.is_none() {
            errors.add("data_source", "This field is required.");
        }
        if self.aggregation_size < 1 {
            errors.add(
                "aggregation_size",
                "Ensure this value is greater than or equal to 1.",
            );
        }

        errors.into_result(ChartSubmission {
            title: self.title.clone(),
            data_source: self.data_source,
            table_name: self.table_name.clone(),
            value_column: self.value_column.clone(),
            datetime_column: self.datetime_column.clone(),
            product_column: self.product_column.clone(),
            product_identifier: identifier(&self.product_identifier),
            operation_column: self.operation_column.clone(),
            operation_identifier: identifier(&self.operation_identifier),
            upper_spec_limit: limit(&self.upper_spec_limit),
            lower_spec_limit: limit(&self.lower_spec_limit),
            target: limit(&self.target),
            aggregation_type: self.aggregation_type,
            aggregation_size: self.aggregation_size,
            weco_rules: self.weco_rules.clone(),
        })
    }

    /// Builds and stores the chart. Either the whole record is created or
    /// nothing is.
    pub async fn submit<B: Backend>(&self, backend: &B, session: &Session) -> Result<ChartConfig> {
        let submission = self.build()?;
        let chart = backend.create_chart(session, &submission).await?;
        info!(
            chart_id = chart.id,
            data_source = chart.data_source,
            title = chart.title.as_str(),
            "Chart configuration saved"
        );
        Ok(chart)
    }
}

/// The signed-in user's chart configurations.
pub async fn list_charts<B: Backend>(backend: &B, session: &Session) -> Result<Vec<ChartConfig>> {
    backend.list_charts(session).await
}

pub async fn get_chart<B: Backend>(backend: &B, session: &Session, id: i64) -> Result<ChartConfig> {
    backend.get_chart(session, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::mock::{MockBackend, MockBackendConfig};
    use spc_model::{DataSourceDraft, Engine};

    fn diameter(data_source: Option<i64>) -> ChartConfigBuilder {
        ChartConfigBuilder {
            title: "Diameter".into(),
            data_source,
            table_name: "production_data".into(),
            value_column: "measurement_val".into(),
            datetime_column: "created_at".into(),
            ..ChartConfigBuilder::new()
        }
    }

    async fn with_source(backend: &MockBackend, session: &Session) -> DataSource {
        DataSourceRegistry::new(backend)
            .create(
                session,
                &DataSourceDraft::new("Line1", Engine::Mssql, "10.0.0.5", "PROD", "svc", "x"),
            )
            .await
            .unwrap()
    }

    #[test]
    fn defaults() {
        let builder = ChartConfigBuilder::new();
        assert_eq!(builder.product_column, "Product");
        assert_eq!(builder.operation_column, "Operation");
        assert_eq!(builder.aggregation_type, AggregationType::TimeHour);
        assert_eq!(builder.aggregation_size, 1);
    }

    #[test]
    fn blank_limits_become_null() {
        let mut builder = diameter(Some(1));
        builder.upper_spec_limit = "   ".into();
        builder.target = "10".into();

        let submission = builder.build().unwrap();
        assert_eq!(submission.upper_spec_limit, None);
        assert_eq!(submission.lower_spec_limit, None);
        assert_eq!(submission.target, Some(LimitValue::Text("10".into())));

        let wire = serde_json::to_value(&submission).unwrap();
        assert_eq!(wire["upper_spec_limit"], Value::Null);
        assert_eq!(wire["lower_spec_limit"], Value::Null);
        assert_eq!(wire["target"], "10");
    }

    #[test]
    fn limit_text_is_sent_unparsed() {
        let mut builder = diameter(Some(1));
        builder.upper_spec_limit = "ten".into();
        let submission = builder.build().unwrap();
        assert_eq!(submission.upper_spec_limit, Some(LimitValue::Text("ten".into())));
    }

    #[test]
    fn blank_identifiers_become_absent() {
        let mut builder = diameter(Some(1));
        builder.product_identifier = " ".into();
        builder.operation_identifier = " OP-20 ".into();
        let submission = builder.build().unwrap();
        assert_eq!(submission.product_identifier, None);
        assert_eq!(submission.operation_identifier.as_deref(), Some("OP-20"));
    }

    #[test]
    fn local_checks() {
        let mut builder = diameter(None);
        builder.aggregation_size = 0;
        let errors = builder.build().unwrap_err();
        assert!(errors.contains("data_source"));
        assert!(errors.contains("aggregation_size"));

        builder.aggregation_size = -3;
        assert!(builder.build().unwrap_err().contains("aggregation_size"));
    }

    #[tokio::test]
    async fn zero_aggregation_size_never_reaches_backend() {
        let backend = MockBackend::new();
        let session = backend.signed_in("eng@plant.example");
        let mut builder = diameter(Some(1));
        builder.aggregation_size = 0;

        let err = builder.submit(&backend, &session).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(e) if e.contains("aggregation_size")));
        assert_eq!(backend.tracker().chart_create_count(), 0);
    }

    #[tokio::test]
    async fn first_source_is_preselected() {
        let backend = MockBackend::new();
        let session = backend.signed_in("eng@plant.example");
        let source = with_source(&backend, &session).await;

        let mut builder = ChartConfigBuilder::new();
        let sources = builder
            .load_sources(&DataSourceRegistry::new(&backend), &session)
            .await
            .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(builder.data_source, Some(source.id));
    }

    #[test]
    fn explicit_choice_is_not_overridden() {
        let mut builder = diameter(Some(42));
        assert_eq!(builder.preselect(&[]), Some(42));
        assert_eq!(ChartConfigBuilder::new().preselect(&[]), None);
    }

    #[tokio::test]
    async fn submit_with_defaults() {
        let backend = MockBackend::new();
        let session = backend.signed_in("eng@plant.example");
        let source = with_source(&backend, &session).await;

        let chart = diameter(Some(source.id))
            .submit(&backend, &session)
            .await
            .unwrap();
        assert_eq!(chart.product_column, "Product");
        assert_eq!(chart.operation_column, "Operation");
        assert_eq!(chart.aggregation_type, AggregationType::TimeHour);
        assert_eq!(chart.aggregation_size, 1);
        assert_eq!(chart.upper_spec_limit, None);
        assert_eq!(chart.lower_spec_limit, None);
        assert_eq!(chart.target, None);
        assert_eq!(chart.data_source_name, "Line1");

        let charts = list_charts(&backend, &session).await.unwrap();
        assert_eq!(charts, vec![chart.clone()]);
        assert_eq!(get_chart(&backend, &session, chart.id).await.unwrap(), chart);
    }

    #[tokio::test]
    async fn server_rejections_are_all_or_nothing() {
        let backend = MockBackend::new();
        let session = backend.signed_in("eng@plant.example");
        let source = with_source(&backend, &session).await;

        let mut builder = diameter(Some(source.id));
        builder.upper_spec_limit = "abc".into();
        builder.table_name = String::new();
        let err = builder.submit(&backend, &session).await.unwrap_err();
        match err {
            ClientError::Validation(errors) => {
                assert_eq!(
                    errors.get("upper_spec_limit"),
                    Some(&["A valid number is required.".to_string()][..])
                );
                assert!(errors.contains("table_name"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(list_charts(&backend, &session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let backend = MockBackend::new();
        let session = backend.signed_in("eng@plant.example");
        let err = diameter(Some(99)).submit(&backend, &session).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(e) if e.contains("data_source")));
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let backend = MockBackend::with_config(MockBackendConfig {
            chart_error: Some("broken pipe".to_string()),
            ..Default::default()
        });
        let session = backend.signed_in("eng@plant.example");
        let err = diameter(Some(1)).submit(&backend, &session).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(m) if m == "broken pipe"));
    }
}
