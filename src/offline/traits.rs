//! Core traits and types for the offline cache controller.

use sha2::{Digest, Sha256};
use std::future::Future;
use url::Url;

use super::error::FetchError;

/// Network access used by the controller.
///
/// Implementors perform one request and report transport failures as
/// `FetchError`. HTTP error statuses are successful fetches.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  /// Anything else (scripts, styles, images, API calls)
  Subresource,
}

/// An outbound resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::Subresource,
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Stable, fixed-length cache key: SHA256 of method and URL without fragment.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);

    let mut hasher = Sha256::new();
    hasher.update(self.method.to_ascii_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Visibility class of a response, mirroring what a browser would report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response readable by the caller
  Cors,
  /// Cross-origin response with hidden status and body
  Opaque,
  /// Synthesized network error
  Error,
}

impl ResponseType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::Error => "error",
    }
  }

  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      "error" => Some(Self::Error),
      _ => None,
    }
  }
}

/// A fetched (or cached) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: Url,
  pub status: u16,
  pub response_type: ResponseType,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  #[cfg(test)]
  pub fn new(url: Url, status: u16, response_type: ResponseType, body: impl Into<Vec<u8>>) -> Self {
    Self {
      url,
      status,
      response_type,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether an intercepted response may be stored: same-origin and exactly 200.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic
  }

  /// Whether a manifest asset response may be stored at install time.
  pub fn is_installable(&self) -> bool {
    self.is_ok()
      && self.status != 206
      && matches!(self.response_type, ResponseType::Basic | ResponseType::Cors)
  }
}

/// Result of intercepting a request, including where the response came from.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
  pub response: Response,
  pub source: ResponseSource,
}

/// Indicates where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Cache hit in the active bucket
  Cache,
  /// Fresh from the network
  Network,
  /// Network failed; cached root document served to a navigation
  Fallback,
}
