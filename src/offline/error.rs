use thiserror::Error;

/// Transport-level failure; the request never produced a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  #[error("Network error: {0}")]
  Network(String),

  #[error("Unsupported request method: {0}")]
  InvalidMethod(String),
}

#[derive(Error, Debug)]
pub enum OfflineError {
  #[error("Failed to fetch manifest asset {url}: {reason}")]
  AssetFetch { url: String, reason: String },

  #[error("Request failed: {0}")]
  Network(#[from] FetchError),

  #[error("Version {0} is not installed")]
  NotInstalled(String),

  #[error("Invalid URL '{url}': {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("Cache storage error: {0}")]
  Storage(String),
}

impl From<color_eyre::Report> for OfflineError {
  fn from(value: color_eyre::Report) -> Self {
    Self::Storage(value.to_string())
  }
}
