//! HTTP/JSON client for the objective server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{ObjectiveService, RemoteError, RemoteResult};
use crate::models::{Objective, ObjectiveId};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const OBJECTIVE_PATH: &str = "/api/objective";

#[derive(Clone)]
pub struct HttpObjectiveService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpObjectiveService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RemoteError::InvalidConfiguration(error.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}{OBJECTIVE_PATH}", self.base_url)
    }

    fn item_url(&self, id: &ObjectiveId) -> String {
        format!("{}{OBJECTIVE_PATH}/{id}", self.base_url)
    }

    /// Cheap reachability check used by the connectivity probe.
    ///
    /// Any HTTP answer, even an error status, means the server is reachable.
    pub async fn is_reachable(&self) -> bool {
        self.client.get(&self.base_url).send().await.is_ok()
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> RemoteResult<T> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))
    }
}

#[async_trait]
impl ObjectiveService for HttpObjectiveService {
    async fn list(&self, token: &str) -> RemoteResult<Vec<Objective>> {
        self.send(self.client.get(self.collection_url()).bearer_auth(token))
            .await
    }

    async fn get(&self, token: &str, id: &ObjectiveId) -> RemoteResult<Objective> {
        self.send(self.client.get(self.item_url(id)).bearer_auth(token))
            .await
    }

    async fn create(&self, token: &str, objective: &Objective) -> RemoteResult<Objective> {
        self.send(
            self.client
                .post(self.collection_url())
                .bearer_auth(token)
                .json(objective),
        )
        .await
    }

    async fn update(&self, token: &str, objective: &Objective) -> RemoteResult<Objective> {
        let id = objective.server_id().ok_or_else(|| {
            RemoteError::InvalidPayload("cannot update an objective without server identity".into())
        })?;
        self.send(
            self.client
                .put(self.item_url(id))
                .bearer_auth(token)
                .json(objective),
        )
        .await
    }

    async fn delete(&self, token: &str, objective: &Objective) -> RemoteResult<()> {
        let id = objective.server_id().ok_or_else(|| {
            RemoteError::InvalidPayload("cannot delete an objective without server identity".into())
        })?;
        let _: serde_json::Value = self
            .send(self.client.delete(self.item_url(id)).bearer_auth(token))
            .await
            .or_else(|error| match error {
                // Some servers answer 204 with an empty body
                RemoteError::InvalidPayload(_) => Ok(serde_json::Value::Null),
                other => Err(other),
            })?;
        Ok(())
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        RemoteError::Unreachable(error.to_string())
    } else {
        RemoteError::InvalidPayload(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let url = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::InvalidConfiguration("server URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::InvalidConfiguration(
            "server URL must include http:// or https://".to_string(),
        ))
    }
}
