//! Linode API client implementation.
//!
//! [`LinodeClient`] owns the shared HTTP transport and is built once when the
//! provider is configured. Every callback talks to the API through an
//! [`ApiSession`], which ties the shared transport to the callback's
//! [`OperationContext`] so retries and pagination honour its deadline and
//! cancellation.

use std::fmt::Write as _;
use std::sync::Arc;

use reqwest::{Client, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::ProviderConfig;
use crate::error::{ApiError, ConfigError, ProviderError, Result, RetryDecision, RetryPolicy};
use crate::provider::OperationContext;

use super::cache::ResponseCache;
use super::types::Page;

/// Largest page size the API accepts.
pub const PAGE_SIZE: u32 = 500;

/// Header carrying the JSON filter tree.
const FILTER_HEADER: &str = "X-Filter";

/// Linode API client.
#[derive(Debug, Clone)]
pub struct LinodeClient {
    /// HTTP client with auth and User-Agent preset.
    http: Client,
    /// Base URL including the version segment.
    base_url: String,
    /// Backoff bounds for transient failures.
    retry: RetryPolicy,
    /// Catalog cache, absent when disabled.
    cache: Option<Arc<ResponseCache>>,
}

impl LinodeClient {
    /// Creates a client from a resolved provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured or the HTTP client cannot
    /// be created.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ConfigError::validation("token contains invalid characters", "token"))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .user_agent(config.user_agent())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        let cache = (!config.disable_internal_cache).then(|| Arc::new(ResponseCache::default()));

        debug!("Configured Linode client for {}", config.api_base());

        Ok(Self {
            http,
            base_url: config.api_base(),
            retry: config.retry_policy(),
            cache,
        })
    }

    /// Base URL including the version segment.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Opens a session bound to one operation.
    #[must_use]
    pub const fn session<'a>(&'a self, ctx: &'a OperationContext) -> ApiSession<'a> {
        ApiSession { client: self, ctx }
    }

    /// Catalog cache, if enabled.
    #[must_use]
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_deref()
    }
}

/// One request as the session dispatches it.
#[derive(Debug, Clone, Copy)]
struct Call<'r> {
    method: &'r Method,
    path: &'r str,
    query: &'r [(&'r str, String)],
    filter: Option<&'r str>,
    body: Option<&'r Value>,
}

/// Per-callback view of the client.
#[derive(Debug, Clone, Copy)]
pub struct ApiSession<'a> {
    client: &'a LinodeClient,
    ctx: &'a OperationContext,
}

impl<'a> ApiSession<'a> {
    /// Operation this session belongs to.
    #[must_use]
    pub const fn context(&self) -> &'a OperationContext {
        self.ctx
    }

    /// Shared client.
    #[must_use]
    pub const fn client(&self) -> &'a LinodeClient {
        self.client
    }

    /// GET a single object.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self
            .dispatch(Call {
                method: &Method::GET,
                path,
                query: &[],
                filter: None,
                body: None,
            })
            .await?;
        decode(path, value)
    }

    /// GET a single object without retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the classified API error of the only attempt.
    pub async fn get_once<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.ctx.ensure_active(path)?;
        let value = self
            .send_once(&Call {
                method: &Method::GET,
                path,
                query: &[],
                filter: None,
                body: None,
            })
            .await?;
        decode(path, value)
    }

    /// GET one page of a list endpoint.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page: u32,
        filter: Option<&str>,
    ) -> Result<Page<T>> {
        let query = [("page", page.to_string()), ("page_size", PAGE_SIZE.to_string())];
        let value = self
            .dispatch(Call {
                method: &Method::GET,
                path,
                query: &query,
                filter,
                body: None,
            })
            .await?;
        decode(path, value)
    }

    /// GET every page of a list endpoint.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn list<T: DeserializeOwned>(&self, path: &str, filter: Option<&str>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let current: Page<T> = self.get_page(path, page, filter).await?;
            let pages = current.pages;
            items.extend(current.data);
            if page >= pages {
                break;
            }
            page += 1;
        }
        trace!("Listed {} item(s) from {path}", items.len());
        Ok(items)
    }

    /// POST a body and decode the response.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        let value = self.write(Method::POST, path, Some(body)).await?;
        decode(path, value)
    }

    /// POST a body and discard the response.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn post_action<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        self.write(Method::POST, path, Some(body)).await.map(drop)
    }

    /// PUT a body and decode the response.
    ///
    /// # Errors
    ///
    /// Returns the classified API error.
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        let value = self.write(Method::PUT, path, Some(body)).await?;
        decode(path, value)
    }

    /// DELETE a resource.
    ///
    /// # Errors
    ///
    /// Returns the classified API error, including `NotFound`.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.write::<Value>(Method::DELETE, path, None).await.map(drop)
    }

    async fn write<B: Serialize + Sync>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value> {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ProviderError::internal(format!("cannot encode request for {path}: {e}")))?;
        let result = self
            .dispatch(Call {
                method: &method,
                path,
                query: &[],
                filter: None,
                body: body.as_ref(),
            })
            .await;
        if let Some(cache) = self.client.cache() {
            cache.invalidate(path);
        }
        result
    }

    /// Sends a request, retrying per the client's policy.
    async fn dispatch(&self, call: Call<'_>) -> Result<Value> {
        let cache_key = (*call.method == Method::GET && ResponseCache::is_cacheable(call.path))
            .then(|| cache_key(&call))
            .filter(|_| self.client.cache.is_some());

        if let (Some(cache), Some(key)) = (self.client.cache(), cache_key.as_deref()) {
            if let Some(hit) = cache.get(key) {
                return Ok(hit);
            }
        }

        let during = format!("{} {}", call.method, call.path);
        let idempotent = *call.method != Method::POST;
        let mut attempt = 0;

        loop {
            self.ctx.ensure_active(&during)?;

            match self.send_once(&call).await {
                Ok(value) => {
                    if let (Some(cache), Some(key)) = (self.client.cache(), cache_key) {
                        cache.put(key, value.clone());
                    }
                    return Ok(value);
                }
                Err(e) => match e.retry_decision(attempt, &self.client.retry, idempotent) {
                    RetryDecision::Retry { delay, counted } => {
                        if counted {
                            attempt += 1;
                        }
                        warn!(
                            "{during} failed ({e}); retrying in {}ms (attempt {attempt} of {})",
                            delay.as_millis(),
                            self.client.retry.max_attempts
                        );
                        self.ctx.sleep(delay, &during, &e.to_string()).await?;
                    }
                    RetryDecision::Abort => return Err(e),
                },
            }
        }
    }

    async fn send_once(&self, call: &Call<'_>) -> Result<Value> {
        let url = format!("{}{}", self.client.base_url, call.path);
        trace!("{} {url}", call.method);

        let mut request = self.client.http.request(call.method.clone(), &url);
        if !call.query.is_empty() {
            request = request.query(call.query);
        }
        if let Some(filter) = call.filter {
            trace!("{FILTER_HEADER}: {filter}");
            request = request.header(FILTER_HEADER, filter);
        }
        if let Some(body) = call.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                let message = format!("{} {}: {e}", call.method, call.path);
                if e.is_connect() {
                    ApiError::unsent(message)
                } else {
                    ApiError::network(message)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let body = response.text().await.unwrap_or_default();
            return Err(
                ApiError::from_response(status.as_u16(), call.path, retry_after.as_deref(), &body).into(),
            );
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("reading response of {}: {e}", call.path)))?;
        if text.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| {
            ApiError::invalid_response(format!("{} returned malformed JSON: {e}", call.path)).into()
        })
    }
}

fn cache_key(call: &Call<'_>) -> String {
    let mut key = call.path.to_string();
    for (name, value) in call.query {
        let _ = write!(key, "&{name}={value}");
    }
    if let Some(filter) = call.filter {
        key.push('#');
        key.push_str(filter);
    }
    key
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_response(format!("{path}: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> ProviderConfig {
        ProviderConfig {
            token: Some("secret-token".to_string()),
            url: Some("http://127.0.0.1:9".to_string()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_client_requires_token() {
        let err = LinodeClient::new(&ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, ProviderError::Config(ConfigError::MissingToken)));
    }

    #[test]
    fn test_client_base_url_and_cache() {
        let client = LinodeClient::new(&config()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9/v4");
        assert!(client.cache().is_some());

        let uncached = LinodeClient::new(&ProviderConfig {
            disable_internal_cache: true,
            ..config()
        })
        .unwrap();
        assert!(uncached.cache().is_none());
    }

    #[test]
    fn test_cache_key_includes_query_and_filter() {
        let query = [("page", "1".to_string())];
        let call = Call {
            method: &Method::GET,
            path: "/regions",
            query: &query,
            filter: Some("{}"),
            body: None,
        };
        assert_eq!(cache_key(&call), "/regions&page=1#{}");
    }

    #[tokio::test]
    async fn test_cancelled_session_sends_nothing() {
        let client = LinodeClient::new(&config()).unwrap();
        let ctx = OperationContext::new("test.cancel", Duration::from_secs(5));
        ctx.cancel_token().cancel();
        let err = client
            .session(&ctx)
            .get::<Value>("/linode/instances/1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
    }
}
