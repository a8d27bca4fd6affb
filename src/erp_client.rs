//! Client for the Skyron ERP REST API.

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{RecordTypeConfig, Settings};
use crate::error::{DashboardError, Result};
use crate::schema::{LoginEnvelope, LoginRequest, ProfileEnvelope, RequestStatus, UserProfile};
use crate::session::Session;

/// Where flat record lists come from.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_records(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
    ) -> Result<Vec<Value>>;
}

/// ERP API client. All record calls act on behalf of an explicit session.
#[derive(Clone)]
pub struct ErpClient {
    client: Client,
    base_url: String,
}

impl ErpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.api_base_url.clone(), settings.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fill a `{id}` path template. The id always stays a single path
    /// segment: `/`, `?`, `#` and `%` are percent-encoded.
    fn record_url(&self, template: &str, id: &str) -> Result<Url> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(DashboardError::BadRequest(format!(
                "invalid record id {:?}",
                id
            )));
        }
        let (prefix, suffix) = template.split_once("{id}").ok_or_else(|| {
            DashboardError::BadRequest(format!("path {} has no {{id}} placeholder", template))
        })?;

        let mut url = Url::parse(&self.url(prefix.trim_end_matches('/')))
            .map_err(|e| DashboardError::BadRequest(format!("invalid record URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DashboardError::BadRequest("ERP base URL cannot hold a path".into()))?
            .pop_if_empty()
            .push(id)
            .extend(suffix.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    /// Exchange credentials for an upstream token and user profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<(String, UserProfile)> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let request = self.client.post(self.url("/auth/login")).json(&body);
        let payload = self.send(request, "login").await?;

        let envelope: LoginEnvelope = serde_json::from_value(payload)
            .map_err(|e| DashboardError::InvalidPayload(format!("login response: {}", e)))?;

        if !envelope.success {
            return Err(DashboardError::AuthenticationFailed(
                envelope
                    .message
                    .unwrap_or_else(|| "Login rejected".to_string()),
            ));
        }

        match (envelope.token, envelope.user) {
            (Some(token), Some(user)) => {
                info!("Logged in to ERP API as {}", user.id);
                Ok((token, user))
            }
            _ => Err(DashboardError::InvalidPayload(
                "login response without token or user".to_string(),
            )),
        }
    }

    pub async fn profile(&self, session: &Session) -> Result<UserProfile> {
        let request = self.authorized(self.client.get(self.url("/auth/profile")), session);
        let payload = self.send(request, "profile").await?;

        let envelope: ProfileEnvelope = serde_json::from_value(payload)
            .map_err(|e| DashboardError::InvalidPayload(format!("profile response: {}", e)))?;
        envelope
            .user
            .ok_or_else(|| DashboardError::InvalidPayload("profile response without user".into()))
    }

    pub async fn update_profile(&self, session: &Session, patch: Value) -> Result<Value> {
        let path = format!("/auth/users/{}", session.user.id);
        let request = self
            .authorized(self.client.put(self.url(&path)), session)
            .json(&clean_payload(patch));
        self.send(request, "update profile").await
    }

    /// Fetch the flat record list for a record type.
    pub async fn list(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
    ) -> Result<Vec<Value>> {
        let url = self.url(&record_type.list_path);
        let request = self.authorized(self.client.get(url), session);
        let payload = self.send(request, &record_type.name).await?;
        let records = extract_list(payload, record_type.list_key.as_deref())?;
        debug!("Fetched {} {} records", records.len(), record_type.name);
        Ok(records)
    }

    pub async fn get(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
        id: &str,
    ) -> Result<Value> {
        let url = self.record_url(&record_type.item_path, id)?;
        let request = self.authorized(self.client.get(url), session);
        self.send(request, &record_type.name).await
    }

    pub async fn create(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
        body: Value,
    ) -> Result<Value> {
        let url = self.url(&record_type.create_path);
        let request = self
            .authorized(self.client.post(url), session)
            .json(&clean_payload(body));
        let created = self.send(request, &record_type.name).await?;
        info!("Created {} record", record_type.name);
        Ok(created)
    }

    pub async fn update(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
        id: &str,
        body: Value,
    ) -> Result<Value> {
        let url = self.record_url(&record_type.item_path, id)?;
        let request = self
            .authorized(self.client.put(url), session)
            .json(&clean_payload(body));
        let updated = self.send(request, &record_type.name).await?;
        info!("Updated {} record {}", record_type.name, id);
        Ok(updated)
    }

    pub async fn delete(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
        id: &str,
    ) -> Result<Value> {
        let url = self.record_url(&record_type.item_path, id)?;
        let request = self.authorized(self.client.delete(url), session);
        let deleted = self.send(request, &record_type.name).await?;
        info!("Deleted {} record {}", record_type.name, id);
        Ok(deleted)
    }

    /// Move a reviewable record (change request) to a new status.
    pub async fn set_status(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
        id: &str,
        status: RequestStatus,
    ) -> Result<Value> {
        let template = record_type
            .status_path
            .as_deref()
            .ok_or_else(|| DashboardError::StatusUnsupported(record_type.name.clone()))?;
        let url = self.record_url(template, id)?;
        let request = self
            .authorized(self.client.put(url), session)
            .json(&json!({ "status": status }));
        let updated = self.send(request, &record_type.name).await?;
        info!("{} record {} is now {:?}", record_type.name, id, status);
        Ok(updated)
    }

    fn authorized(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        request.header("Authorization", session.bearer())
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("API request failed")
                    .to_string()
            });
            debug!("ERP API {} failed: {} - {}", what, status, text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    DashboardError::AuthenticationFailed(message)
                }
                _ => DashboardError::Upstream {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| DashboardError::InvalidPayload(format!("{} response: {}", what, e)))
    }
}

#[async_trait::async_trait]
impl RecordSource for ErpClient {
    async fn fetch_records(
        &self,
        session: &Session,
        record_type: &RecordTypeConfig,
    ) -> Result<Vec<Value>> {
        self.list(session, record_type).await
    }
}

/// Pull the record array out of a list response: either a bare array or an
/// object holding it under `list_key`.
pub fn extract_list(payload: Value, list_key: Option<&str>) -> Result<Vec<Value>> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match list_key.and_then(|key| obj.remove(key)) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(DashboardError::InvalidPayload(format!(
                "expected an array under {:?}",
                list_key.unwrap_or("<none>")
            ))),
        },
        other => Err(DashboardError::InvalidPayload(format!(
            "expected an array, got {}",
            json_kind(&other)
        ))),
    }
}

/// Drop top-level `null` and empty-string fields from a form payload.
pub fn clean_payload(body: Value) -> Value {
    match body {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .filter(|(_, v)| !v.is_null() && v.as_str() != Some(""))
                .collect(),
        ),
        other => other,
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use serde_json::Map;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ErpClient {
        ErpClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn session() -> Session {
        Session::new(
            "tok-123".to_string(),
            UserProfile {
                id: "u1".to_string(),
                email: None,
                fullname: None,
                extra: Map::new(),
            },
        )
    }

    fn record_type(name: &str) -> RecordTypeConfig {
        ConfigStore::load(None).unwrap().get(name).unwrap().clone()
    }

    #[test]
    fn test_extract_list_shapes() {
        let bare = extract_list(json!([{"_id": "a"}]), Some("bomData")).unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped =
            extract_list(json!({"bomData": [{"_id": "a"}, {"_id": "b"}]}), Some("bomData"))
                .unwrap();
        assert_eq!(wrapped.len(), 2);

        assert!(matches!(
            extract_list(json!({"bomData": "nope"}), Some("bomData")),
            Err(DashboardError::InvalidPayload(_))
        ));
        assert!(matches!(
            extract_list(json!({"other": []}), None),
            Err(DashboardError::InvalidPayload(_))
        ));
        assert!(matches!(
            extract_list(json!(42), None),
            Err(DashboardError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_clean_payload() {
        let cleaned = clean_payload(json!({
            "title": "Frame",
            "revision": "",
            "owner": null,
            "lock": false
        }));
        assert_eq!(cleaned, json!({"title": "Frame", "lock": false}));
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "user@example.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Login Successful",
                "token": "jwt",
                "user": {"_id": "1", "email": "user@example.com", "fullname": "John Doe"}
            })))
            .mount(&server)
            .await;

        let (token, user) = client(&server).login("user@example.com", "pw").await.unwrap();
        assert_eq!(token, "jwt");
        assert_eq!(user.fullname.as_deref(), Some("John Doe"));
    }

    #[tokio::test]
    async fn test_login_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "message": "Invalid credentials"
            })))
            .mount(&server)
            .await;

        let err = client(&server).login("x", "y").await.unwrap_err();
        match err {
            DashboardError::AuthenticationFailed(message) => {
                assert_eq!(message, "Invalid credentials")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_unsuccessful_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false})),
            )
            .mount(&server)
            .await;

        let err = client(&server).login("x", "y").await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_list_sends_bearer_and_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bom/"))
            .and(header("Authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "bomData": [
                    {"_id": "a", "parent_part": "root", "title": "Assembly"},
                    {"_id": "b", "parent_part": "a", "title": "Bolt"}
                ]
            })))
            .mount(&server)
            .await;

        let records = client(&server)
            .fetch_records(&session(), &record_type("ebom"))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["title"], "Bolt");
    }

    #[tokio::test]
    async fn test_list_accepts_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requests/allrequests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"_id": "r1", "status": "Pending"}
            ])))
            .mount(&server)
            .await;

        let records = client(&server)
            .list(&session(), &record_type("requests"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/parts/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server)
            .list(&session(), &record_type("parts"))
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_upstream_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/parts/p1"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"message": "Part is locked"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .delete(&session(), &record_type("parts"), "p1")
            .await
            .unwrap_err();
        match err {
            DashboardError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Part is locked");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_sends_cleaned_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/parts/create"))
            .and(body_json(json!({"title": "Bracket", "revision": "A"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "p9"})))
            .mount(&server)
            .await;

        let created = client(&server)
            .create(
                &session(),
                &record_type("parts"),
                json!({"title": "Bracket", "revision": "A", "state": "", "owner": null}),
            )
            .await
            .unwrap();
        assert_eq!(created["_id"], "p9");
    }

    #[tokio::test]
    async fn test_set_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/requests/request/r1/status"))
            .and(body_json(json!({"status": "Approved"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"_id": "r1", "status": "Approved"})),
            )
            .mount(&server)
            .await;

        let erp = client(&server);
        let updated = erp
            .set_status(&session(), &record_type("requests"), "r1", RequestStatus::Approved)
            .await
            .unwrap();
        assert_eq!(updated["status"], "Approved");

        let err = erp
            .set_status(&session(), &record_type("parts"), "p1", RequestStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::StatusUnsupported(_)));
    }

    #[tokio::test]
    async fn test_profile_and_empty_delete_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"_id": "u1", "email": "u1@example.com"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/documents/d1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let erp = client(&server);
        let profile = erp.profile(&session()).await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("u1@example.com"));

        let deleted = erp
            .delete(&session(), &record_type("documents"), "d1")
            .await
            .unwrap();
        assert!(deleted.is_null());
    }

    #[tokio::test]
    async fn test_record_id_stays_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/auth/delete/u2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": "u2"})))
            .expect(0)
            .mount(&server)
            .await;

        let erp = client(&server);
        let err = erp
            .delete(&session(), &record_type("parts"), "../auth/delete/u2")
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Upstream { status: 404, .. }));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].url.path(), "/parts/..%2Fauth%2Fdelete%2Fu2");

        for id in ["", ".", ".."] {
            let err = erp
                .delete(&session(), &record_type("parts"), id)
                .await
                .unwrap_err();
            assert!(matches!(err, DashboardError::BadRequest(_)));
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_paths_under_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/bom/b%201"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "b 1"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/requests/request/r%3F1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Rejected"})))
            .mount(&server)
            .await;

        let base = format!("{}/api/", server.uri());
        let erp = ErpClient::new(base, Duration::from_secs(5)).unwrap();
        let url = erp.record_url("/bom/{id}", "b 1").unwrap();
        assert_eq!(url.path(), "/api/bom/b%201");

        let record = erp
            .get(&session(), &record_type("ebom"), "b 1")
            .await
            .unwrap();
        assert_eq!(record["_id"], "b 1");

        let updated = erp
            .set_status(&session(), &record_type("requests"), "r?1", RequestStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(updated["status"], "Rejected");
    }
}
