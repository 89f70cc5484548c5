//! Connection probes
//!
//! One connector per [`Engine`]. A probe opens a single connection with the
//! stored credentials, runs `SELECT 1` and closes it. It is attempted exactly
//! once and bounded by the configured timeout; every failure is folded into a
//! [`ConnectionResult`] whose message is the driver's own error text.

use std::time::Duration;

use spc_model::{ConnectionResult, Engine};
use sqlx::{
    Connection,
    postgres::{PgConnectOptions, PgConnection},
};
use tiberius::{AuthMethod, Client};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::database::{DataSourceRow, DatabaseError};

#[derive(Clone)]
pub struct ConnectionTarget {
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl TryFrom<&DataSourceRow> for ConnectionTarget {
    type Error = DatabaseError;

    fn try_from(row: &DataSourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            engine: row.engine()?,
            port: row.port()?,
            host: row.host.clone(),
            database_name: row.database_name.clone(),
            username: row.username.clone(),
            password: row.password.clone(),
        })
    }
}

pub async fn test_connection(target: &ConnectionTarget, timeout: Duration) -> ConnectionResult {
    let attempt = async {
        match target.engine {
            Engine::Mssql => probe_mssql(target).await,
            Engine::Postgres => probe_postgres(target).await,
        }
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => ConnectionResult::ok(),
        Ok(Err(message)) => ConnectionResult::failed(message),
        Err(_) => ConnectionResult::failed(format!(
            "Connection to {}:{} timed out after {}s",
            target.host,
            target.port,
            timeout.as_secs()
        )),
    }
}

async fn probe_postgres(target: &ConnectionTarget) -> Result<(), String> {
    let host = target.host.trim_start_matches('[').trim_end_matches(']');
    let options = PgConnectOptions::new()
        .host(host)
        .port(target.port)
        .database(&target.database_name)
        .username(&target.username)
        .password(&target.password);

    let mut conn = PgConnection::connect_with(&options)
        .await
        .map_err(|e| e.to_string())?;
    sqlx::query("SELECT 1")
        .execute(&mut conn)
        .await
        .map_err(|e| e.to_string())?;
    conn.close().await.map_err(|e| e.to_string())
}

async fn probe_mssql(target: &ConnectionTarget) -> Result<(), String> {
    // A named instance (`HOST\INSTANCE`) is reached through the given port.
    let host = target.host.split('\\').next().unwrap_or(&target.host);

    let mut config = tiberius::Config::new();
    config.host(host);
    config.port(target.port);
    config.database(&target.database_name);
    config.authentication(AuthMethod::sql_server(&target.username, &target.password));
    config.trust_cert();

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| e.to_string())?;
    tcp.set_nodelay(true).map_err(|e| e.to_string())?;

    let mut client = Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| e.to_string())?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| e.to_string())?
        .into_results()
        .await
        .map_err(|e| e.to_string())?;
    client.close().await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A port on localhost that nothing listens on.
    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn target(engine: Engine, port: u16) -> ConnectionTarget {
        ConnectionTarget {
            engine,
            host: "127.0.0.1".into(),
            port,
            database_name: "PROD".into(),
            username: "svc".into(),
            password: "x".into(),
        }
    }

    #[tokio::test]
    async fn unreachable_mssql_reports_failure() {
        let port = closed_port().await;
        let result = test_connection(&target(Engine::Mssql, port), Duration::from_secs(5)).await;
        assert!(!result.success);
        assert!(!result.message.is_empty());
    }

    #[tokio::test]
    async fn unreachable_postgres_reports_failure() {
        let port = closed_port().await;
        let result = test_connection(&target(Engine::Postgres, port), Duration::from_secs(5)).await;
        assert!(!result.success);
        assert!(!result.message.is_empty());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts the TCP connection but never speaks the protocol.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let result =
            test_connection(&target(Engine::Postgres, port), Duration::from_secs(1)).await;
        assert!(!result.success);
        assert!(result.message.contains("timed out"), "{}", result.message);
    }

    /// Needs a live server: `SPC_TEST_POSTGRES="host port db user password"`.
    #[tokio::test]
    #[ignore]
    async fn reachable_postgres_succeeds() {
        let spec = std::env::var("SPC_TEST_POSTGRES").expect("SPC_TEST_POSTGRES not set");
        let parts: Vec<&str> = spec.split_whitespace().collect();
        let target = ConnectionTarget {
            engine: Engine::Postgres,
            host: parts[0].into(),
            port: parts[1].parse().unwrap(),
            database_name: parts[2].into(),
            username: parts[3].into(),
            password: parts[4].into(),
        };
        let result = test_connection(&target, Duration::from_secs(5)).await;
        assert!(result.success, "{}", result.message);
    }

    /// Needs a live server: `SPC_TEST_MSSQL="host port db user password"`.
    #[tokio::test]
    #[ignore]
    async fn reachable_mssql_succeeds() {
        let spec = std::env::var("SPC_TEST_MSSQL").expect("SPC_TEST_MSSQL not set");
        let parts: Vec<&str> = spec.split_whitespace().collect();
        let target = ConnectionTarget {
            engine: Engine::Mssql,
            host: parts[0].into(),
            port: parts[1].parse().unwrap(),
            database_name: parts[2].into(),
            username: parts[3].into(),
            password: parts[4].into(),
        };
        let result = test_connection(&target, Duration::from_secs(5)).await;
        assert!(result.success, "{}", result.message);
    }
}
