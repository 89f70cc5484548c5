//! The client against a real server on an ephemeral port.

use spc_client::{
    ChartConfigBuilder, ClientError, DataSourceRegistry, DataSourceView, Deletion, HttpBackend,
    Session, list_charts,
};
use spc_model::{AggregationType, DataSourceDraft, Engine, Permission, Role};
use spc_server::{AppState, Config, Database};

async fn start_server(default_role: Role) -> HttpBackend {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let config = Config {
        default_role,
        connect_timeout: std::time::Duration::from_secs(2),
        ..Config::default()
    };
    let app = spc_server::app(AppState::new(db, config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    HttpBackend::new(format!("http://{}/api", addr)).unwrap()
}

async fn engineer(backend: &HttpBackend) -> Session {
    Session::register(backend, "eng@plant.example", "pw-123456")
        .await
        .unwrap();
    Session::login(backend, "eng@plant.example", "pw-123456")
        .await
        .unwrap()
}

fn line1() -> DataSourceDraft {
    DataSourceDraft::new("Line1", Engine::Mssql, "10.0.0.5", "PROD", "svc", "x")
}

#[tokio::test]
async fn data_source_then_chart_with_defaults() {
    let backend = start_server(Role::FullAccess).await;
    let session = engineer(&backend).await;
    let registry = DataSourceRegistry::new(&backend);

    let source = registry.create(&session, &line1()).await.unwrap();
    assert_eq!(source.port, 1433);

    let mut builder = ChartConfigBuilder {
        title: "Diameter".into(),
        table_name: "production_data".into(),
        value_column: "measurement_val".into(),
        datetime_column: "created_at".into(),
        ..ChartConfigBuilder::new()
    };
    builder.load_sources(&registry, &session).await.unwrap();
    assert_eq!(builder.data_source, Some(source.id));

    let chart = builder.submit(&backend, &session).await.unwrap();
    assert_eq!(chart.product_column, "Product");
    assert_eq!(chart.operation_column, "Operation");
    assert_eq!(chart.aggregation_type, AggregationType::TimeHour);
    assert_eq!(chart.aggregation_size, 1);
    assert_eq!(chart.upper_spec_limit, None);
    assert_eq!(chart.lower_spec_limit, None);
    assert_eq!(chart.target, None);

    let charts = list_charts(&backend, &session).await.unwrap();
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].id, chart.id);
}

#[tokio::test]
async fn limits_are_parsed_by_the_server() {
    let backend = start_server(Role::FullAccess).await;
    let session = engineer(&backend).await;
    let source = DataSourceRegistry::new(&backend)
        .create(&session, &line1())
        .await
        .unwrap();

    let mut builder = ChartConfigBuilder {
        data_source: Some(source.id),
        table_name: "production_data".into(),
        value_column: "measurement_val".into(),
        datetime_column: "created_at".into(),
        upper_spec_limit: " 10.5 ".into(),
        lower_spec_limit: "9.5".into(),
        target: "".into(),
        ..ChartConfigBuilder::new()
    };
    let chart = builder.submit(&backend, &session).await.unwrap();
    assert_eq!(chart.upper_spec_limit, Some(10.5));
    assert_eq!(chart.lower_spec_limit, Some(9.5));
    assert_eq!(chart.target, None);

    builder.upper_spec_limit = "ten".into();
    let err = builder.submit(&backend, &session).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(e) if e.contains("upper_spec_limit")));
}

#[tokio::test]
async fn zero_aggregation_size_is_rejected_by_the_server_too() {
    let backend = start_server(Role::FullAccess).await;
    let session = engineer(&backend).await;
    let source = DataSourceRegistry::new(&backend)
        .create(&session, &line1())
        .await
        .unwrap();

    // Bypass the builder's local check.
    let mut submission = ChartConfigBuilder {
        data_source: Some(source.id),
        table_name: "production_data".into(),
        value_column: "measurement_val".into(),
        datetime_column: "created_at".into(),
        ..ChartConfigBuilder::new()
    }
    .build()
    .unwrap();
    submission.aggregation_size = 0;

    use spc_client::Backend;
    let err = backend.create_chart(&session, &submission).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(e) if e.contains("aggregation_size")));
}

#[tokio::test]
async fn delete_then_delete_again() {
    let backend = start_server(Role::FullAccess).await;
    let session = engineer(&backend).await;
    let registry = DataSourceRegistry::new(&backend);

    let first = registry.create(&session, &line1()).await.unwrap();
    let mut second = line1();
    second.name = "Line2".into();
    registry.create(&session, &second).await.unwrap();

    let mut view = DataSourceView::load(DataSourceRegistry::new(&backend), &session)
        .await
        .unwrap();
    let outcome = view.delete(&session, first.id, |_| true).await.unwrap();
    assert_eq!(outcome, Deletion::Deleted);
    assert_eq!(view.sources().len(), 1);
    assert_eq!(registry.list(&session).await.unwrap().len(), 1);

    let err = registry.delete(&session, &first, |_| true).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound));
}

#[tokio::test]
async fn unreachable_target_fails_with_message() {
    let backend = start_server(Role::FullAccess).await;
    let session = engineer(&backend).await;

    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut draft = DataSourceDraft::new("Local", Engine::Postgres, "127.0.0.1", "spc", "svc", "x");
    draft.port = Some(i64::from(closed));
    let registry = DataSourceRegistry::new(&backend);
    let source = registry.create(&session, &draft).await.unwrap();

    let result = registry.test_connection(&session, source.id).await.unwrap();
    assert!(!result.success);
    assert!(!result.message.is_empty());
}

#[tokio::test]
async fn read_only_users_are_gated() {
    let backend = start_server(Role::ReadOnly).await;
    let session = engineer(&backend).await;
    assert!(session.can(Permission::Read));
    assert!(!session.can(Permission::Create));

    let err = DataSourceRegistry::new(&backend)
        .create(&session, &line1())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
}

#[tokio::test]
async fn logged_out_token_is_rejected() {
    let backend = start_server(Role::FullAccess).await;
    let mut session = engineer(&backend).await;
    let stale = Session::with_token(session.token().unwrap());

    session.logout(&backend).await.unwrap();
    assert!(!session.is_authenticated());

    let err = DataSourceRegistry::new(&backend)
        .list(&stale)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
}

/// Needs a live PostgreSQL: `SPC_TEST_POSTGRES="host port db user password"`.
#[tokio::test]
#[ignore]
async fn reachable_target_succeeds() {
    let spec = std::env::var("SPC_TEST_POSTGRES").expect("SPC_TEST_POSTGRES not set");
    let parts: Vec<&str> = spec.split_whitespace().collect();

    let backend = start_server(Role::FullAccess).await;
    let session = engineer(&backend).await;
    let draft = DataSourceDraft::new("Live", Engine::Postgres, parts[0], parts[2], parts[3], parts[4])
        .with_port(parts[1].parse().unwrap());
    let registry = DataSourceRegistry::new(&backend);
    let source = registry.create(&session, &draft).await.unwrap();

    let result = registry.test_connection(&session, source.id).await.unwrap();
    assert!(result.success, "{}", result.message);
}
