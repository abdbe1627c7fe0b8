//! HTTP Backend Client
//!
//! Talks to the hosted backend through its REST interface: tables under
//! `/rest/v1/<table>` and stored procedures under `/rest/v1/rpc/<name>`.
//! The version-checked poll mutations are stored procedures that raise a
//! serialization failure (`40001`) or answer 409 when the version is stale.
//!
//! Reads are retried with backoff on transient failures. Mutations are sent
//! once; replaying them is the offline queue's job.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, Backend};
use crate::client::config::Config;
use crate::client::offline::retry::{retry_with_backoff, RetryPolicy};
use crate::shared::basecamp::Basecamp;
use crate::shared::poll::Poll;

const POLLS_TABLE: &str = "/rest/v1/trip_polls";
const BASECAMPS_TABLE: &str = "/rest/v1/trip_basecamps";

/// PostgreSQL `serialization_failure`, raised on a stale version
const VERSION_MISMATCH_CODE: &str = "40001";

/// Error body returned by the REST layer
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// REST client for the hosted backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
    read_retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            access_token: None,
            read_retry: RetryPolicy::none(),
        }
    }

    /// Build a client from the application configuration
    pub fn from_config(config: &Config) -> Self {
        let mut backend = Self::new(config.api_url(""))
            .with_read_retry(RetryPolicy::from_settings(&config.app.sync));
        if let Some(key) = &config.app.api_key {
            backend = backend.with_api_key(key.clone());
        }
        if let Some(token) = config.get_token() {
            backend = backend.with_access_token(token);
        }
        backend
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the API key and bearer token
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }
        match (&self.access_token, &self.api_key) {
            (Some(token), _) | (None, Some(token)) => {
                request.header("Authorization", format!("Bearer {}", token))
            }
            (None, None) => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        retry_with_backoff(&self.read_retry, ApiError::is_transient, move || async move {
            let response = self
                .authorize(self.client.get(self.url(path)))
                .query(query)
                .send()
                .await?;
            let response = check(response, None).await?;
            Ok::<T, ApiError>(response.json::<T>().await?)
        })
        .await
    }

    async fn rpc(
        &self,
        name: &str,
        args: serde_json::Value,
        entity_id: &str,
        version: i64,
    ) -> Result<Poll, ApiError> {
        tracing::debug!(rpc = name, entity_id, version, "Calling backend procedure");
        let response = self
            .authorize(self.client.post(self.url(&format!("/rest/v1/rpc/{}", name))))
            .json(&args)
            .send()
            .await?;
        let response = check(response, Some((entity_id, version))).await?;
        Ok(response.json::<Poll>().await?)
    }
}

/// Map a non-success response to an `ApiError`
///
/// `conflict_context` names the entity and version a conflict refers to.
async fn check(response: Response, conflict_context: Option<(&str, i64)>) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body.message.unwrap_or_else(|| {
        if text.is_empty() {
            status.to_string()
        } else {
            text.clone()
        }
    });

    if status == StatusCode::CONFLICT || body.code.as_deref() == Some(VERSION_MISMATCH_CODE) {
        let (entity_id, expected) = conflict_context.unwrap_or(("", 0));
        return Err(ApiError::Conflict {
            entity_id: entity_id.to_string(),
            expected,
            current: None,
        });
    }

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Rejected(message),
        _ => ApiError::Server {
            status: status.as_u16(),
            message,
        },
    })
}

fn first<T>(mut rows: Vec<T>, what: &str) -> Result<T, ApiError> {
    if rows.is_empty() {
        return Err(ApiError::Decode(format!("empty response for {}", what)));
    }
    Ok(rows.swap_remove(0))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_polls(&self, trip_id: &str) -> Result<Vec<Poll>, ApiError> {
        self.get_json(
            POLLS_TABLE,
            &[
                ("trip_id", format!("eq.{}", trip_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn create_poll(&self, poll: &Poll) -> Result<Poll, ApiError> {
        let response = self
            .authorize(self.client.post(self.url(POLLS_TABLE)))
            .header("Prefer", "return=representation")
            .json(poll)
            .send()
            .await?;
        let response = check(response, Some((&poll.id, poll.version))).await?;
        first(response.json::<Vec<Poll>>().await?, "created poll")
    }

    async fn vote_on_poll(
        &self,
        poll_id: &str,
        option_ids: &[String],
        user_id: &str,
        version: i64,
    ) -> Result<Poll, ApiError> {
        self.rpc(
            "vote_on_poll",
            json!({
                "p_poll_id": poll_id,
                "p_option_ids": option_ids,
                "p_user_id": user_id,
                "p_current_version": version,
            }),
            poll_id,
            version,
        )
        .await
    }

    async fn remove_vote(&self, poll_id: &str, user_id: &str, version: i64) -> Result<Poll, ApiError> {
        self.rpc(
            "remove_poll_vote",
            json!({
                "p_poll_id": poll_id,
                "p_user_id": user_id,
                "p_current_version": version,
            }),
            poll_id,
            version,
        )
        .await
    }

    async fn close_poll(&self, poll_id: &str, user_id: &str, version: i64) -> Result<Poll, ApiError> {
        self.rpc(
            "close_poll",
            json!({
                "p_poll_id": poll_id,
                "p_user_id": user_id,
                "p_current_version": version,
            }),
            poll_id,
            version,
        )
        .await
    }

    async fn delete_poll(&self, poll_id: &str, user_id: &str) -> Result<(), ApiError> {
        let response = self
            .authorize(self.client.delete(self.url(POLLS_TABLE)))
            .query(&[
                ("id", format!("eq.{}", poll_id)),
                ("created_by", format!("eq.{}", user_id)),
            ])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let response = check(response, None).await?;

        let deleted: Vec<serde_json::Value> = response.json().await?;
        if deleted.is_empty() {
            return Err(ApiError::NotFound(format!("poll {}", poll_id)));
        }
        Ok(())
    }

    async fn get_basecamp(&self, trip_id: &str) -> Result<Option<Basecamp>, ApiError> {
        let rows: Vec<Basecamp> = self
            .get_json(BASECAMPS_TABLE, &[("trip_id", format!("eq.{}", trip_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_basecamp(&self, basecamp: &Basecamp, user_id: &str) -> Result<Basecamp, ApiError> {
        let mut basecamp = basecamp.clone();
        basecamp.updated_by = Some(user_id.to_string());
        basecamp.updated_at = Some(Utc::now());

        let response = self
            .authorize(self.client.post(self.url(BASECAMPS_TABLE)))
            .query(&[("on_conflict", "trip_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&basecamp)
            .send()
            .await?;
        let response = check(response, None).await?;
        first(response.json::<Vec<Basecamp>>().await?, "basecamp")
    }
}
