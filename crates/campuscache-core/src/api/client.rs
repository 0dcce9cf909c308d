//! HTTP client for the campus portal REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::{Course, Event, Grade, News, NewUser, ScheduleEntry, UserProfile, UserUpdate};

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow mobile links while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the portal.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct PortalClient {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl PortalClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self::from_client(client, base_url))
    }

    /// Wrap an already configured reqwest client.
    pub fn from_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: None,
        }
    }

    /// Set the token sent with every request
    pub fn set_token(&mut self, token: impl Into<Arc<str>>) {
        self.token = Some(token.into());
    }

    /// Create a new client with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<Arc<str>>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            token: Some(token.into()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json");
        match self.token {
            Some(ref token) => builder.header(header::AUTHORIZATION, format!("Token {}", token)),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "Portal response");

        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        unwrap_envelope(&body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        self.send(self.request(Method::GET, path)).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!(path, %method, "Sending JSON");
        self.send(self.request(method, path).json(body)).await
    }

    // ===== Data Fetching Methods =====

    pub async fn fetch_news(&self) -> Result<Vec<News>, ApiError> {
        self.get("/news/").await
    }

    pub async fn fetch_events(&self) -> Result<Vec<Event>, ApiError> {
        self.get("/events/").await
    }

    /// Timetable, optionally restricted to one study group
    pub async fn fetch_schedule(
        &self,
        group_id: Option<i64>,
    ) -> Result<Vec<ScheduleEntry>, ApiError> {
        match group_id {
            Some(group) => self.get(&format!("/schedule/?group={}", group)).await,
            None => self.get("/schedule/").await,
        }
    }

    pub async fn fetch_grades(&self, user_id: i64) -> Result<Vec<Grade>, ApiError> {
        self.get(&format!("/auth/grades/?user={}", user_id)).await
    }

    pub async fn fetch_courses(&self, user_id: i64) -> Result<Vec<Course>, ApiError> {
        self.get(&format!("/auth/courses/?user={}", user_id)).await
    }

    pub async fn fetch_user_profile(&self, user_id: i64) -> Result<UserProfile, ApiError> {
        self.get(&format!("/users/{}/", user_id)).await
    }

    // ===== User Management (admin) =====

    pub async fn fetch_users(&self) -> Result<Vec<UserProfile>, ApiError> {
        self.get("/users/").await
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<UserProfile, ApiError> {
        self.send_json(Method::POST, "/users/", user).await
    }

    pub async fn update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
    ) -> Result<UserProfile, ApiError> {
        self.send_json(Method::PUT, &format!("/users/{}/", user_id), update)
            .await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<(), ApiError> {
        let _: Value = self
            .send(self.request(Method::DELETE, &format!("/users/{}/", user_id)))
            .await?;
        Ok(())
    }
}

/// The portal wraps some payloads as `{"data": ...}` and returns others
/// bare; accept both. An empty body reads as JSON `null`.
fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let value: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed JSON: {}", e)))?
    };

    let payload = match value {
        Value::Object(mut map) if map.get("data").is_some_and(|d| !d.is_null()) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(payload)
        .map_err(|e| ApiError::InvalidResponse(format!("Unexpected payload shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_bare_payload() {
        let ids: Vec<i64> = unwrap_envelope("[1, 2, 3]").unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_unwrap_data_envelope() {
        let ids: Vec<i64> = unwrap_envelope(r#"{"success": true, "data": [4, 5]}"#).unwrap();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn test_null_data_keeps_outer_object() {
        let value: Value = unwrap_envelope(r#"{"data": null, "id": 1}"#).unwrap();
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_empty_body_is_null() {
        let value: Value = unwrap_envelope("").unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_shape_mismatch_is_invalid_response() {
        let err = unwrap_envelope::<Vec<i64>>(r#"{"data": "nope"}"#).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));

        let err = unwrap_envelope::<Vec<i64>>("<html>").unwrap_err();
        assert!(err.to_string().contains("Malformed JSON"));
    }

    #[test]
    fn test_url_joining() {
        let client = PortalClient::new("https://portal.example.edu/api/").unwrap();
        assert_eq!(client.base_url(), "https://portal.example.edu/api");
        assert_eq!(client.url("/news/"), "https://portal.example.edu/api/news/");
        assert_eq!(client.url("users/7/"), "https://portal.example.edu/api/users/7/");
    }

    #[test]
    fn test_with_token_shares_base_url() {
        let client = PortalClient::new("http://localhost:8000/api").unwrap();
        let authed = client.with_token("abc");
        assert_eq!(authed.base_url(), client.base_url());
        assert!(format!("{:?}", authed).contains("authenticated: true"));
    }
}
