use super::{ConfigStore, HistoryStore, RunExecutor, ServiceCatalog};
use crate::error::ClientError;
use crate::model::{
    ApplyAck, FlagCatalog, ParamMap, RunRecord, RunStatus, ServiceDefaults, SubmitAck,
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// HTTP client for the dashboard's benchmark endpoints.
pub(crate) struct DashboardClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct RunList {
    runs: Vec<RunRecord>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorField,
}

// Benchmark routes send `{"error": {"code", "message"}}`; older routes send a bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Detail { code: String, message: String },
    Text(String),
}

impl DashboardClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("llm-dock-bench/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let (code, message) = match resp.json::<ErrorEnvelope>().await {
            Ok(ErrorEnvelope {
                error: ErrorField::Detail { code, message },
            }) => (code, message),
            Ok(ErrorEnvelope {
                error: ErrorField::Text(message),
            }) => (String::from("ERROR"), message),
            Err(_) => (
                String::from("HTTP_ERROR"),
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            ),
        };
        tracing::debug!(%status, %code, "dashboard request failed");
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(message));
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl RunExecutor for DashboardClient {
    async fn submit_run(
        &self,
        service_name: &str,
        params: &ParamMap,
    ) -> Result<SubmitAck, ClientError> {
        let body = serde_json::json!({
            "service_name": service_name,
            "params": params,
        });
        self.send(self.http.post(self.url("/api/benchmarks")).json(&body))
            .await
    }

    async fn get_run(&self, id: &str) -> Result<RunRecord, ClientError> {
        self.send(self.http.get(self.url(&format!("/api/benchmarks/{id}"))))
            .await
    }
}

#[async_trait]
impl HistoryStore for DashboardClient {
    async fn list_runs(
        &self,
        service_name: &str,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<RunRecord>, ClientError> {
        let mut query = vec![
            ("service_name", service_name.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.as_str().to_string()));
        }
        let list: RunList = self
            .send(self.http.get(self.url("/api/benchmarks")).query(&query))
            .await?;
        Ok(list.runs)
    }

    async fn delete_run(&self, id: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .send(self.http.delete(self.url(&format!("/api/benchmarks/{id}"))))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for DashboardClient {
    async fn apply_run(
        &self,
        run: &RunRecord,
        applicable: &ParamMap,
    ) -> Result<ApplyAck, ClientError> {
        let body = serde_json::json!({ "params": applicable });
        self.send(
            self.http
                .put(self.url(&format!("/api/benchmarks/{}/apply", run.id)))
                .json(&body),
        )
        .await
    }
}

#[async_trait]
impl ServiceCatalog for DashboardClient {
    async fn service_defaults(&self, service_name: &str) -> Result<ServiceDefaults, ClientError> {
        self.send(self.http.get(self.url(&format!(
            "/api/benchmarks/service-defaults/{service_name}"
        ))))
        .await
    }

    async fn flag_metadata(&self, template_type: &str) -> Result<FlagCatalog, ClientError> {
        self.send(
            self.http
                .get(self.url(&format!("/api/flag-metadata/{template_type}"))),
        )
        .await
    }
}
