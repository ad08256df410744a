use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
  pub method: String,
  pub url: String,
  pub headers: BTreeMap<String, String>,
  pub body: Option<serde_json::Value>,
  pub timeout: Duration,
}

/// A response of any status. Deciding which statuses are failures is up to
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  /// Parsed as JSON when possible, otherwise the raw text as a string.
  pub body: serde_json::Value,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
  async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HostError>;
}

/// HTTP client backed by reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
  client: Client,
}

impl ReqwestHttpClient {
  pub fn new() -> Self {
    Self {
      client: Client::new(),
    }
  }

  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
  async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HostError> {
    let method = parse_method(&request.method)?;
    let timeout = request.timeout;

    let mut builder = self
      .client
      .request(method, &request.url)
      .timeout(timeout);
    for (key, value) in &request.headers {
      builder = builder.header(key, value);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| HostError::from_reqwest(e, timeout))?;

    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|val| (k.as_str().to_string(), val.to_string()))
      })
      .collect();

    let text = response
      .text()
      .await
      .map_err(|e| HostError::from_reqwest(e, timeout))?;

    // Try to parse body as JSON, fall back to string
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    tracing::debug!(status, url = %request.url, "http_response");

    Ok(HttpResponse {
      status,
      headers,
      body,
    })
  }
}

fn parse_method(method: &str) -> Result<Method, HostError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    "OPTIONS" => Ok(Method::OPTIONS),
    _ => Err(HostError::Rejected(format!(
      "unsupported HTTP method: {}",
      method
    ))),
  }
}
