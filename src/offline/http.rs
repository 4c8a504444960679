//! Network fetcher backed by reqwest.

use std::time::Duration;
use url::{Origin, Url};

use super::error::FetchError;
use super::traits::{Fetcher, Request, Response, ResponseType};

/// HTTP fetcher that classifies responses relative to the controller's origin.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Origin,
}

impl HttpFetcher {
  pub fn new(scope: &Url, timeout: Duration) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      origin: scope.origin(),
    })
  }

  /// Same-origin responses are `basic`, everything else `cors`.
  fn classify(&self, url: &Url) -> ResponseType {
    if url.origin() == self.origin {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    }
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
      .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;

    let resp = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?;

    let url = resp.url().clone();
    let status = resp.status().as_u16();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = resp
      .bytes()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?
      .to_vec();

    Ok(Response {
      response_type: self.classify(&url),
      url,
      status,
      headers,
      body,
    })
  }
}
