//! HTTP backend for the SPC server API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use spc_model::{
    ChartConfig, ChartSubmission, ConnectionResult, Credentials, CurrentUser, DataSource,
    DataSourceDraft, Registered, TokenResponse, ValidationErrors,
};
use tracing::debug;

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::session::Session;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, session: &Session) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(session.bearer()?))
    }
}

/// Reads the detail message of a 401/403 body, falling back to the raw text.
fn detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn error_for(status: StatusCode, body: String) -> ClientError {
    match status {
        StatusCode::BAD_REQUEST => match serde_json::from_str::<ValidationErrors>(&body) {
            Ok(errors) => ClientError::Validation(errors),
            Err(_) => ClientError::Unexpected {
                status: status.as_u16(),
                body,
            },
        },
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(detail(&body)),
        StatusCode::FORBIDDEN => ClientError::Forbidden(detail(&body)),
        StatusCode::NOT_FOUND => ClientError::NotFound,
        _ => ClientError::Unexpected {
            status: status.as_u16(),
            body,
        },
    }
}

async fn send(request: RequestBuilder) -> Result<(StatusCode, String)> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    debug!(status = status.as_u16(), "Response received");
    if status.is_success() {
        Ok((status, body))
    } else {
        Err(error_for(status, body))
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let (status, body) = send(request).await?;
    serde_json::from_str(&body).map_err(|_| ClientError::Unexpected {
        status: status.as_u16(),
        body,
    })
}

impl Backend for HttpBackend {
    async fn register(&self, credentials: &Credentials) -> Result<Registered> {
        send_json(self.client.post(self.url("/auth/register")).json(credentials)).await
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse> {
        send_json(self.client.post(self.url("/auth/login")).json(credentials)).await
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        let request = self.authed(self.client.post(self.url("/auth/logout")), session)?;
        send(request).await.map(|_| ())
    }

    async fn me(&self, session: &Session) -> Result<CurrentUser> {
        send_json(self.authed(self.client.get(self.url("/auth/me")), session)?).await
    }

    async fn list_data_sources(&self, session: &Session) -> Result<Vec<DataSource>> {
        send_json(self.authed(self.client.get(self.url("/spc/datasources")), session)?).await
    }

    async fn create_data_source(
        &self,
        session: &Session,
        draft: &DataSourceDraft,
    ) -> Result<DataSource> {
        let request = self.client.post(self.url("/spc/datasources")).json(draft);
        send_json(self.authed(request, session)?).await
    }

    async fn get_data_source(&self, session: &Session, id: i64) -> Result<DataSource> {
        let request = self.client.get(self.url(&format!("/spc/datasources/{}", id)));
        send_json(self.authed(request, session)?).await
    }

    async fn delete_data_source(&self, session: &Session, id: i64) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/spc/datasources/{}", id)));
        send(self.authed(request, session)?).await.map(|_| ())
    }

    async fn test_connection(&self, session: &Session, id: i64) -> Result<ConnectionResult> {
        let request = self
            .client
            .post(self.url(&format!("/spc/datasources/{}/test_connection", id)));
        send_json(self.authed(request, session)?).await
    }

    async fn list_charts(&self, session: &Session) -> Result<Vec<ChartConfig>> {
        send_json(self.authed(self.client.get(self.url("/spc/charts")), session)?).await
    }

    async fn create_chart(
        &self,
        session: &Session,
        submission: &ChartSubmission,
    ) -> Result<ChartConfig> {
        let request = self.client.post(self.url("/spc/charts")).json(submission);
        send_json(self.authed(request, session)?).await
    }

    async fn get_chart(&self, session: &Session, id: i64) -> Result<ChartConfig> {
        let request = self.client.get(self.url(&format!("/spc/charts/{}", id)));
        send_json(self.authed(request, session)?).await
    }
}
