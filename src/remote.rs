//! Remote service boundary for RosterCore.
//!
//! The backend is an HTTP/JSON service. [`RemoteService`] is the seam the
//! sync client talks to; [`HttpRemote`] is the production implementation
//! using reqwest with a bearer token on every request.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::{RosterError, RosterResult};
use crate::models::EntityKind;
use crate::validation::DATE_FORMAT;

/// Which slice of a collection to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncScope {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub employee_id: Option<i64>,
    /// Server-side status filter, in the backend's spelling
    pub status: Option<String>,
    /// Remove local synced records the server no longer returns
    pub prune_missing: bool,
}

impl SyncScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Default::default()
        }
    }

    pub fn for_employee(mut self, employee_id: i64) -> Self {
        self.employee_id = Some(employee_id);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn pruning(mut self) -> Self {
        self.prune_missing = true;
        self
    }

    /// Query string parameters for this scope
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.start_date {
            params.push(("start_date", start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = self.end_date {
            params.push(("end_date", end.format(DATE_FORMAT).to_string()));
        }
        if let Some(employee_id) = self.employee_id {
            params.push(("employee_id", employee_id.to_string()));
        }
        if let Some(status) = &self.status {
            params.push(("status", status.clone()));
        }
        params
    }
}

/// The backend as seen by the sync client.
///
/// Payloads are raw JSON; decoding into wire structs happens in the sync
/// client so shape errors are reported per record.
pub trait RemoteService: Send + Sync {
    /// Fetch the records of one kind within a scope.
    ///
    /// # Returns
    /// * `Ok(Vec<Value>)` - One JSON object per record
    /// * `Err(RosterError)` - Network, server, auth or decoding failure
    fn fetch(
        &self,
        kind: EntityKind,
        scope: &SyncScope,
    ) -> impl Future<Output = RosterResult<Vec<Value>>> + Send;

    /// Create or update one record.
    ///
    /// # Arguments
    /// * `kind` - Entity kind of the record
    /// * `record` - Wire JSON; a record without a server id is created
    ///
    /// # Returns
    /// * `Ok(Value)` - The record as stored by the server, including its id
    fn push(
        &self,
        kind: EntityKind,
        record: Value,
    ) -> impl Future<Output = RosterResult<Value>> + Send;
}

/// Supplies bearer tokens and renews them when the server rejects one.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> impl Future<Output = RosterResult<String>> + Send;

    /// Obtain a new token after a 401.
    fn refresh(&self) -> impl Future<Output = RosterResult<String>> + Send;
}

/// A fixed token that cannot be refreshed
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    async fn access_token(&self) -> RosterResult<String> {
        Ok(self.0.clone())
    }

    async fn refresh(&self) -> RosterResult<String> {
        Err(RosterError::Unauthorized)
    }
}

/// Run `request` with the current token; on 401 refresh once and retry once.
///
/// A second 401 surfaces as [`RosterError::Unauthorized`].
pub async fn with_auth_retry<T, S, F, Fut>(tokens: &S, mut request: F) -> RosterResult<T>
where
    S: TokenSource,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = RosterResult<T>>,
{
    let token = tokens.access_token().await?;
    match request(token).await {
        Err(RosterError::Unauthorized) => {
            tracing::info!("Access token rejected, refreshing");
            let token = tokens.refresh().await.map_err(|e| {
                tracing::warn!("Token refresh failed: {}", e);
                RosterError::Unauthorized
            })?;
            request(token).await
        }
        other => other,
    }
}

/// Path of the collection endpoint for a kind
pub fn endpoint(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Employee => "/api/app/chef/workers",
        EntityKind::Project => "/api/app/chef/projects",
        EntityKind::Task => "/api/app/tasks",
        EntityKind::TaskAssignment => "/api/app/chef/task-assignments",
        EntityKind::WorkEntry => "/api/app/work-entries",
        EntityKind::LeaveRequest => "/api/app/worker/leave",
    }
}

/// JSON key carrying the server id of a record of this kind
pub fn id_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Employee => "employee_id",
        EntityKind::Project => "project_id",
        EntityKind::Task => "task_id",
        EntityKind::TaskAssignment => "assignment_id",
        EntityKind::WorkEntry => "entry_id",
        EntityKind::LeaveRequest => "id",
    }
}

/// Key some endpoints wrap their collection in
fn collection_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Employee => "workers",
        EntityKind::Project => "projects",
        EntityKind::Task => "tasks",
        EntityKind::TaskAssignment => "assignments",
        EntityKind::WorkEntry => "entries",
        EntityKind::LeaveRequest => "requests",
    }
}

/// Accept a bare array or an object wrapping one.
pub fn extract_collection(kind: EntityKind, body: Value) -> RosterResult<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in [collection_key(kind), "data", "items"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(RosterError::decoding(format!(
                "{}: response has no record list",
                kind
            )))
        }
        other => Err(RosterError::decoding(format!(
            "{}: expected a list, got {}",
            kind, other
        ))),
    }
}

/// Unwrap `{ "data": {...} }` responses to the record itself.
fn extract_record(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

async fn read_response(response: Response) -> RosterResult<Value> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(RosterError::Unauthorized);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(RosterError::server(status.as_u16(), message));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| RosterError::decoding(e.to_string()))
}

/// HTTP implementation of [`RemoteService`]
pub struct HttpRemote<S> {
    client: Client,
    base_url: String,
    tokens: S,
}

impl<S: TokenSource> HttpRemote<S> {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration, tokens: S) -> RosterResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RosterError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, build: impl Fn() -> RequestBuilder) -> RosterResult<Value> {
        with_auth_retry(&self.tokens, |token| {
            let request = build().bearer_auth(token);
            async move { read_response(request.send().await?).await }
        })
        .await
    }
}

impl<S: TokenSource> RemoteService for HttpRemote<S> {
    async fn fetch(&self, kind: EntityKind, scope: &SyncScope) -> RosterResult<Vec<Value>> {
        let url = self.url(endpoint(kind));
        let query = scope.query_params();
        tracing::debug!("GET {} {:?}", url, query);

        let body = self.send(|| self.client.get(&url).query(&query)).await?;
        extract_collection(kind, body)
    }

    async fn push(&self, kind: EntityKind, record: Value) -> RosterResult<Value> {
        let server_id = record.get(id_field(kind)).and_then(Value::as_i64);
        let body = match server_id {
            Some(id) => {
                let url = format!("{}/{}", self.url(endpoint(kind)), id);
                tracing::debug!("PUT {}", url);
                self.send(|| self.client.put(&url).json(&record)).await?
            }
            None => {
                let url = self.url(endpoint(kind));
                tracing::debug!("POST {}", url);
                self.send(|| self.client.post(&url).json(&record)).await?
            }
        };
        Ok(extract_record(body))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Counts refreshes and hands out numbered tokens
    struct CountingTokens {
        refreshes: AtomicUsize,
        current: Mutex<String>,
    }

    impl CountingTokens {
        fn new() -> Self {
            Self {
                refreshes: AtomicUsize::new(0),
                current: Mutex::new("token-0".into()),
            }
        }
    }

    impl TokenSource for CountingTokens {
        async fn access_token(&self) -> RosterResult<String> {
            Ok(self.current.lock().unwrap().clone())
        }

        async fn refresh(&self) -> RosterResult<String> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            let token = format!("token-{}", n);
            *self.current.lock().unwrap() = token.clone();
            Ok(token)
        }
    }

    #[test]
    fn test_scope_query_params() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        let scope = SyncScope::between(start, end).for_employee(4).with_status("PENDING");

        assert_eq!(
            scope.query_params(),
            vec![
                ("start_date", "2025-06-02".to_string()),
                ("end_date", "2025-06-08".to_string()),
                ("employee_id", "4".to_string()),
                ("status", "PENDING".to_string()),
            ]
        );
        assert!(SyncScope::all().query_params().is_empty());
    }

    #[tokio::test]
    async fn test_auth_retry_refreshes_once() {
        let tokens = CountingTokens::new();
        let seen = Mutex::new(Vec::new());

        let result = with_auth_retry(&tokens, |token| {
            seen.lock().unwrap().push(token.clone());
            async move {
                if token == "token-0" {
                    Err(RosterError::Unauthorized)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["token-0", "token-1"]);
    }

    #[tokio::test]
    async fn test_auth_retry_second_401_is_unauthorized() {
        let tokens = CountingTokens::new();
        let attempts = AtomicUsize::new(0);

        let result: RosterResult<()> = with_auth_retry(&tokens, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(RosterError::Unauthorized) }
        })
        .await;

        assert!(matches!(result, Err(RosterError::Unauthorized)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_retry_other_errors_pass_through() {
        let tokens = CountingTokens::new();
        let result: RosterResult<()> =
            with_auth_retry(&tokens, |_| async { Err(RosterError::server(503, "down")) }).await;

        assert!(matches!(result, Err(RosterError::Server { status: 503, .. })));
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_static_token_cannot_refresh() {
        let tokens = StaticToken("abc".into());
        let result: RosterResult<()> =
            with_auth_retry(&tokens, |_| async { Err(RosterError::Unauthorized) }).await;
        assert!(matches!(result, Err(RosterError::Unauthorized)));
    }

    #[test]
    fn test_extract_collection_shapes() {
        let bare = extract_collection(EntityKind::Task, json!([{ "task_id": 1 }])).unwrap();
        assert_eq!(bare.len(), 1);

        let wrapped =
            extract_collection(EntityKind::LeaveRequest, json!({ "requests": [{}, {}] })).unwrap();
        assert_eq!(wrapped.len(), 2);

        let data = extract_collection(EntityKind::Project, json!({ "data": [] })).unwrap();
        assert!(data.is_empty());

        assert!(matches!(
            extract_collection(EntityKind::Project, json!({ "total": 3 })),
            Err(RosterError::Decoding(_))
        ));
    }

    #[test]
    fn test_extract_record_unwraps_data() {
        assert_eq!(extract_record(json!({ "data": { "id": 3 } })), json!({ "id": 3 }));
        assert_eq!(extract_record(json!({ "id": 3 })), json!({ "id": 3 }));
    }

    #[test]
    fn test_http_remote_trims_base_url() {
        let remote =
            HttpRemote::new("https://api.ksr.dk/", Duration::from_secs(30), StaticToken("t".into()))
                .unwrap();
        assert_eq!(remote.base_url(), "https://api.ksr.dk");
        assert_eq!(
            remote.url(endpoint(EntityKind::WorkEntry)),
            "https://api.ksr.dk/api/app/work-entries"
        );
    }

    // HttpRemote against a mock backend

    fn http_remote<S: TokenSource>(server: &MockServer, tokens: S) -> HttpRemote<S> {
        HttpRemote::new(server.uri(), Duration::from_secs(5), tokens).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_bearer_and_scope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/app/work-entries"))
            .and(header("authorization", "Bearer abc"))
            .and(query_param("employee_id", "4"))
            .and(query_param("start_date", "2025-06-02"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [{ "entry_id": 1 }, { "entry_id": 2 }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = http_remote(&server, StaticToken("abc".into()));
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        let scope = SyncScope::between(start, end).for_employee(4);
        let records = remote.fetch(EntityKind::WorkEntry, &scope).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["entry_id"], 2);
    }

    #[tokio::test]
    async fn test_push_posts_new_records_and_unwraps_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/app/tasks"))
            .and(body_partial_json(json!({ "name": "Lift" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "task_id": 12, "name": "Lift" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = http_remote(&server, StaticToken("abc".into()));
        let stored = remote
            .push(EntityKind::Task, json!({ "project_id": 50, "name": "Lift" }))
            .await
            .unwrap();

        assert_eq!(stored, json!({ "task_id": 12, "name": "Lift" }));
    }

    #[tokio::test]
    async fn test_push_puts_records_with_server_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/app/work-entries/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entry_id": 7, "total_hours": "8"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let remote = http_remote(&server, StaticToken("abc".into()));
        let stored = remote
            .push(EntityKind::WorkEntry, json!({ "entry_id": 7, "total_hours": "8" }))
            .await
            .unwrap();

        assert_eq!(stored["entry_id"], 7);
    }

    #[tokio::test]
    async fn test_401_refreshes_token_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/app/tasks"))
            .and(header("authorization", "Bearer token-0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/app/tasks"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "task_id": 1 }])))
            .expect(1)
            .mount(&server)
            .await;

        let remote = http_remote(&server, CountingTokens::new());
        let records = remote.fetch(EntityKind::Task, &SyncScope::all()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(remote.tokens.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_keep_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/app/worker/leave"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/app/worker/leave"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad range"))
            .mount(&server)
            .await;

        let remote = http_remote(&server, StaticToken("abc".into()));
        let err = remote
            .push(EntityKind::LeaveRequest, json!({ "leave_type": "vacation" }))
            .await
            .unwrap_err();
        let RosterError::Server { status, message } = &err else {
            panic!("expected a server error, got {err:?}");
        };
        assert_eq!((*status, message.as_str()), (500, "database unavailable"));
        assert!(err.is_retryable());

        let err = remote
            .fetch(EntityKind::LeaveRequest, &SyncScope::all())
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::Server { status: 422, .. }));
        assert!(!err.is_retryable());
    }
}
