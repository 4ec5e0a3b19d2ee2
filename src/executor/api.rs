//! HTTP invocation for `api-wrapper` resources.

use crate::error::{ForgeError, ForgeResult};
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// Request assembled from a resource's payload and per-call overrides
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: Url,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Merge call parameters over the resource defaults.
///
/// `url`, `method` and `body` replace the defaults, `headers` are merged and `query`
/// pairs are appended to the URL.
pub fn build_request(
    resource_id: &str,
    base_url: &str,
    method: &str,
    headers: &BTreeMap<String, String>,
    params: &Map<String, Value>,
) -> ForgeResult<ApiRequest> {
    let raw_url = params.get("url").and_then(Value::as_str).unwrap_or(base_url);
    let mut url = Url::parse(raw_url)
        .map_err(|e| ForgeError::resource_execution(resource_id, format!("invalid url '{}': {}", raw_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ForgeError::resource_execution(
            resource_id,
            format!("unsupported url scheme '{}'", url.scheme()),
        ));
    }

    if let Some(query) = params.get("query").and_then(Value::as_object) {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            pairs.append_pair(key, &value);
        }
    }

    let method_name = params
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or(method)
        .to_ascii_uppercase();
    let method = Method::from_bytes(method_name.as_bytes())
        .map_err(|_| ForgeError::resource_execution(resource_id, format!("invalid http method '{}'", method_name)))?;

    let mut merged = headers.clone();
    if let Some(extra) = params.get("headers").and_then(Value::as_object) {
        for (name, value) in extra {
            if let Some(value) = value.as_str() {
                merged.insert(name.clone(), value.to_string());
            }
        }
    }

    Ok(ApiRequest {
        url,
        method,
        headers: merged,
        body: params.get("body").filter(|body| !body.is_null()).cloned(),
    })
}

/// Send `request`; `limit` is the timeout the client was built with and is reported on expiry
pub async fn send(
    client: &reqwest::Client,
    resource_id: &str,
    request: ApiRequest,
    limit: Duration,
) -> ForgeResult<ApiResponse> {
    debug!("Calling {} {} for resource {}", request.method, request.url, resource_id);
    let started = Instant::now();

    let mut builder = client.request(request.method.clone(), request.url.clone());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| request_error(resource_id, &request, e, limit, started))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| request_error(resource_id, &request, e, limit, started))?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    Ok(ApiResponse { status, body })
}

fn request_error(
    resource_id: &str,
    request: &ApiRequest,
    error: reqwest::Error,
    limit: Duration,
    started: Instant,
) -> ForgeError {
    if error.is_timeout() {
        ForgeError::timeout(&format!("{} {}", request.method, request.url), limit, started.elapsed())
            .with_context("resource_id", resource_id)
    } else {
        ForgeError::resource_execution(resource_id, format!("request to {} failed: {}", request.url, error))
    }
}

/// Client shared by every api-wrapper call
pub fn build_client(timeout: Duration) -> ForgeResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ForgeError::resource_exhausted("http-client", format!("failed to build http client: {}", e)))
}
