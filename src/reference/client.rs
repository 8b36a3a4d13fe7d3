//! REST client for the reference-data endpoint.
//!
//! Authenticates with the system-level secret (not the UI login) and pages through
//! each list type's items.

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::config::ReferenceApiConfig;
use crate::error::{truncate_for_display, EngineError, EngineResult};
use crate::models::ReferenceLists;

const LIST_TYPE_PLACEHOLDER: &str = "{listType}";

/// Item fields holding the display value, in order of precedence.
const VALUE_FIELDS: [&str; 3] = ["localizedTitle", "title", "name"];

/// The two response shapes the listing endpoint returns.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload {
    Bare(Vec<Value>),
    Wrapped { data: Vec<Value> },
}

impl ListPayload {
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Bare(items) => items,
            Self::Wrapped { data } => data,
        }
    }
}

/// Display value of one list item; `None` when no known field carries text.
pub fn display_value(item: &Value) -> Option<String> {
    let object = item.as_object()?;
    VALUE_FIELDS.iter().find_map(|field| {
        object
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn task_outcome<T>(joined: Result<T, JoinError>) -> EngineResult<T> {
    joined.map_err(|e| EngineError::TaskFailed(format!("reference list fetch: {e}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    token: String,
}

#[derive(Debug, Clone)]
pub struct ReferenceApiClient {
    client: reqwest::Client,
    base: Url,
    config: ReferenceApiConfig,
}

impl ReferenceApiClient {
    /// `site_url` may be any page of the target system; only its origin is kept.
    pub fn new(site_url: &str, config: &ReferenceApiConfig, request_timeout: Duration) -> EngineResult<Self> {
        let parsed = Url::parse(site_url).map_err(|e| EngineError::InvalidUrl(format!("{site_url}: {e}")))?;
        let base = Url::parse(&parsed.origin().ascii_serialization())
            .map_err(|e| EngineError::InvalidUrl(format!("{site_url}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base,
            config: config.clone(),
        })
    }

    /// Cache key component identifying the target system.
    pub fn site_key(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    fn endpoint(&self, template: &str, list_type: Option<&str>) -> EngineResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| EngineError::InvalidUrl(self.base.to_string()))?;
            segments.clear();
            for part in template.split('/').filter(|p| !p.is_empty()) {
                match (part, list_type) {
                    (LIST_TYPE_PLACEHOLDER, Some(list_type)) => segments.push(list_type),
                    _ => segments.push(part),
                };
            }
        }
        Ok(url)
    }

    /// Exchanges the system secret for a bearer token.
    pub async fn authenticate(&self, system_secret: &str) -> EngineResult<String> {
        let url = self.endpoint(&self.config.auth_path, None)?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "password": system_secret }))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "system authentication rejected");
            return Err(EngineError::SystemAuth {
                status: status.as_u16(),
                body: truncate_for_display(&body),
            });
        }

        let token: TokenResponse = response.json().await?;
        debug!("system token obtained");
        Ok(token.token)
    }

    /// All display values of one list type, walking the listing endpoint's pages.
    pub async fn fetch_list(&self, token: &str, list_type: &str) -> EngineResult<BTreeSet<String>> {
        let url = self.endpoint(&self.config.list_path_template, Some(list_type))?;
        let mut values = BTreeSet::new();

        for page in 1..=self.config.max_pages {
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(token)
                .query(&[("page", page), ("pageSize", self.config.page_size)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(EngineError::ReferenceApi {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let items = response.json::<ListPayload>().await?.into_items();
            let count = items.len();
            let known = values.len();
            values.extend(items.iter().filter_map(display_value));

            if count < self.config.page_size {
                break;
            }
            if page > 1 && values.len() == known {
                debug!(list_type, page, "page added no new values, endpoint is not paginating");
                break;
            }
            if page == self.config.max_pages {
                warn!(list_type, pages = page, "reference list truncated at the page ceiling");
            }
        }

        debug!(list_type, values = values.len(), "reference list fetched");
        Ok(values)
    }

    /// Fetches every list type concurrently. Completes or fails as a whole within `total`.
    pub async fn fetch_list_values(
        &self,
        system_secret: &str,
        list_types: &BTreeSet<String>,
        total: Duration,
    ) -> EngineResult<ReferenceLists> {
        if list_types.is_empty() {
            return Ok(ReferenceLists::new());
        }

        let work = async {
            let token = Arc::new(self.authenticate(system_secret).await?);
            let permits = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
            let mut tasks = JoinSet::new();

            for list_type in list_types {
                let client = self.clone();
                let token = Arc::clone(&token);
                let permits = Arc::clone(&permits);
                let list_type = list_type.clone();

                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    let values = client.fetch_list(&token, &list_type).await?;
                    Ok::<_, EngineError>((list_type, values))
                });
            }

            let mut lists = ReferenceLists::new();
            while let Some(joined) = tasks.join_next().await {
                let (list_type, values) = task_outcome(joined)??;
                lists.insert(list_type, values);
            }
            Ok::<_, EngineError>(lists)
        };

        let lists = tokio::time::timeout(total, work)
            .await
            .map_err(|_| EngineError::ReferenceTimeout { waited: total })??;

        info!(list_types = lists.len(), "📚 Reference lists fetched");
        Ok(lists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn client(site: &str) -> ReferenceApiClient {
        ReferenceApiClient::new(site, &ReferenceApiConfig::default(), Duration::from_secs(5)).unwrap()
    }

    fn types(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn values(lists: &ReferenceLists, list_type: &str) -> Vec<String> {
        lists.get(list_type).unwrap().iter().cloned().collect()
    }

    struct Reply {
        status: u16,
        body: String,
        delay: Duration,
    }

    impl Reply {
        fn ok(body: Value) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                delay: Duration::ZERO,
            }
        }

        fn token() -> Self {
            Self::ok(json!({ "token": "t0k" }))
        }

        fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    /// Local HTTP endpoint answering each connection with the reply `route` picks
    /// for the request target. Returns a site URL pointing at it.
    async fn serve<F>(route: F) -> String
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let route = Arc::new(route);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let route = Arc::clone(&route);
                tokio::spawn(async move {
                    let mut reader = BufReader::new(stream);
                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).await.unwrap();

                    let mut content_length = 0;
                    loop {
                        let mut line = String::new();
                        reader.read_line(&mut line).await.unwrap();
                        let line = line.trim_end();
                        if line.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = line.split_once(':') {
                            if name.eq_ignore_ascii_case("content-length") {
                                content_length = value.trim().parse().unwrap();
                            }
                        }
                    }
                    let mut body = vec![0; content_length];
                    reader.read_exact(&mut body).await.unwrap();

                    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
                    let reply = route(target);
                    tokio::time::sleep(reply.delay).await;

                    let response = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        reply.status,
                        reply.body.len(),
                        reply.body
                    );
                    let mut stream = reader.into_inner();
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        format!("http://{addr}/login")
    }

    fn is_auth(target: &str) -> bool {
        target.starts_with("/api/v1/auth/system")
    }

    #[tokio::test]
    async fn test_rejected_system_secret_carries_status_and_body() {
        let site = serve(|target| {
            if is_auth(target) {
                Reply {
                    status: 401,
                    body: r#"{"error":"bad secret"}"#.to_string(),
                    delay: Duration::ZERO,
                }
            } else {
                Reply::ok(json!([]))
            }
        })
        .await;

        let err = client(&site)
            .fetch_list_values("wrong", &types(&["Civility"]), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            EngineError::SystemAuth { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, r#"{"error":"bad secret"}"#);
            }
            other => panic!("expected SystemAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetches_bare_and_wrapped_listings() {
        let site = serve(|target| {
            if is_auth(target) {
                Reply::token()
            } else if target.starts_with("/api/v1/lists/Civility/") {
                Reply::ok(json!([{ "name": "M." }, { "localizedTitle": "Mme", "name": "MRS" }, { "id": 9 }]))
            } else {
                Reply::ok(json!({ "data": [{ "title": "France" }, { "title": "Belgique" }], "total": 2 }))
            }
        })
        .await;

        let lists = client(&site)
            .fetch_list_values("system", &types(&["Civility", "Country"]), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(values(&lists, "Civility"), vec!["M.", "Mme"]);
        assert_eq!(values(&lists, "Country"), vec!["Belgique", "France"]);
    }

    #[tokio::test]
    async fn test_walks_pages_until_a_short_page() {
        let site = serve(|target| {
            if is_auth(target) {
                Reply::token()
            } else if target.contains("page=1&") {
                Reply::ok(json!({ "data": [{ "name": "A" }, { "name": "B" }] }))
            } else {
                Reply::ok(json!({ "data": [{ "name": "C" }] }))
            }
        })
        .await;
        let config = ReferenceApiConfig {
            page_size: 2,
            ..ReferenceApiConfig::default()
        };
        let api = ReferenceApiClient::new(&site, &config, Duration::from_secs(5)).unwrap();

        let lists = api
            .fetch_list_values("system", &types(&["Letters"]), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(values(&lists, "Letters"), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_endpoint_ignoring_paging_is_read_twice_at_most() {
        let requests = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&requests);
        let site = serve(move |target| {
            if is_auth(target) {
                return Reply::token();
            }
            counted.fetch_add(1, Ordering::SeqCst);
            Reply::ok(json!({ "data": [{ "name": "M." }, { "name": "Mme" }, { "name": "M." }] }))
        })
        .await;
        let config = ReferenceApiConfig {
            page_size: 2,
            ..ReferenceApiConfig::default()
        };
        let api = ReferenceApiClient::new(&site, &config, Duration::from_secs(5)).unwrap();

        let lists = api
            .fetch_list_values("system", &types(&["Civility"]), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(values(&lists, "Civility"), vec!["M.", "Mme"]);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_one_slow_list_fails_the_whole_fetch() {
        let site = serve(|target| {
            if is_auth(target) {
                Reply::token()
            } else if target.contains("/Slow/") {
                Reply::ok(json!([{ "name": "late" }])).after(Duration::from_secs(3))
            } else {
                Reply::ok(json!([{ "name": "M." }]))
            }
        })
        .await;
        let total = Duration::from_millis(300);

        let err = client(&site)
            .fetch_list_values("system", &types(&["Civility", "Slow"]), total)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::ReferenceTimeout { waited } if waited == total));
    }

    #[tokio::test]
    async fn test_panicked_fetch_task_is_a_task_failure() {
        let joined: Result<(), JoinError> = tokio::spawn(async { panic!("fetch exploded") }).await;

        let err = task_outcome(joined).unwrap_err();

        assert!(matches!(err, EngineError::TaskFailed(_)));
    }

    #[test]
    fn test_payload_accepts_bare_array() {
        let payload: ListPayload = serde_json::from_value(json!([{ "name": "A" }])).unwrap();
        assert_eq!(payload.into_items().len(), 1);
    }

    #[test]
    fn test_payload_accepts_data_object() {
        let payload: ListPayload =
            serde_json::from_value(json!({ "data": [{ "name": "A" }, { "name": "B" }], "total": 2 })).unwrap();
        assert_eq!(payload.into_items().len(), 2);
    }

    #[test]
    fn test_display_value_precedence() {
        let all = json!({ "localizedTitle": "Madame", "title": "Mrs", "name": "MRS" });
        let no_localized = json!({ "title": "Mrs", "name": "MRS" });
        let name_only = json!({ "name": "MRS" });
        let blank_localized = json!({ "localizedTitle": "  ", "title": "Mrs" });

        assert_eq!(display_value(&all).as_deref(), Some("Madame"));
        assert_eq!(display_value(&no_localized).as_deref(), Some("Mrs"));
        assert_eq!(display_value(&name_only).as_deref(), Some("MRS"));
        assert_eq!(display_value(&blank_localized).as_deref(), Some("Mrs"));
    }

    #[test]
    fn test_items_without_known_fields_are_dropped() {
        let items = vec![json!({ "id": 4 }), json!("loose"), json!({ "title": "Kept" }), json!({ "title": "Kept" })];
        let values: BTreeSet<String> = items.iter().filter_map(display_value).collect();
        assert_eq!(values.into_iter().collect::<Vec<_>>(), vec!["Kept"]);
    }

    #[test]
    fn test_endpoints_use_site_origin() {
        let api = client("https://legal.example.com/ng/login/");
        assert_eq!(api.site_key(), "https://legal.example.com");

        let auth = api.endpoint("/api/v1/auth/system", None).unwrap();
        assert_eq!(auth.as_str(), "https://legal.example.com/api/v1/auth/system");

        let list = api
            .endpoint("/api/v1/lists/{listType}/items", Some("Legal Entity"))
            .unwrap();
        assert_eq!(list.as_str(), "https://legal.example.com/api/v1/lists/Legal%20Entity/items");
    }

    #[test]
    fn test_rejects_invalid_site_url() {
        let result = ReferenceApiClient::new("not a url", &ReferenceApiConfig::default(), Duration::from_secs(1));
        assert!(matches!(result, Err(EngineError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_no_list_types_needs_no_network() {
        let api = client("https://legal.example.com");
        let lists = api
            .fetch_list_values("secret", &BTreeSet::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(lists.is_empty());
    }
}
