//! Versioned, cache-first controller for the application's static shell.
//!
//! Lifecycle: uninstalled -> install -> waiting -> activate -> active.
//! Cached entries are trusted until their bucket is replaced by a newer
//! version; there is no per-entry expiry.

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use super::error::OfflineError;
use super::storage::{CacheStorage, ControllerState};
use super::traits::{FetchOutcome, Fetcher, Request, Response, ResponseSource};
use crate::config::OfflineConfig;

/// Outcome of `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
  /// The configured version was already in control
  AlreadyActive,
  /// The configured version took control; lists the buckets that were removed
  Activated { removed: Vec<String> },
}

/// Snapshot of the controller for display.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
  pub active_version: Option<String>,
  pub waiting_version: Option<String>,
  pub buckets: Vec<String>,
  pub active_entries: usize,
}

/// Intercepts requests and answers them from the active bucket first.
pub struct OfflineCache<S: CacheStorage, F: Fetcher> {
  storage: S,
  fetcher: F,
  cache_name: String,
  version: String,
  scope: Url,
  manifest: Vec<String>,
  fallback_document: String,
}

impl<S: CacheStorage, F: Fetcher> OfflineCache<S, F> {
  pub fn new(storage: S, fetcher: F, config: &OfflineConfig) -> Result<Self, OfflineError> {
    let scope = parse_url(&config.scope)?;

    Ok(Self {
      storage,
      fetcher,
      cache_name: config.cache_name.clone(),
      version: config.version.clone(),
      scope,
      manifest: config.manifest.clone(),
      fallback_document: config.fallback_document.clone(),
    })
  }

  /// Bucket name for a given version.
  fn bucket_for(&self, version: &str) -> String {
    format!("{}-v{}", self.cache_name, version)
  }

  /// Bucket owned by the configured version.
  pub fn bucket_name(&self) -> String {
    self.bucket_for(&self.version)
  }

  /// Resolve a path against the scope URL.
  pub fn resolve(&self, path: &str) -> Result<Url, OfflineError> {
    self
      .scope
      .join(path)
      .map_err(|source| OfflineError::InvalidUrl {
        url: path.to_string(),
        source,
      })
  }

  /// Fetch every manifest asset and store them in the configured bucket.
  ///
  /// All-or-nothing: if any asset fails, nothing is written and the
  /// lifecycle state is left as it was.
  pub async fn install(&self) -> Result<(), OfflineError> {
    let bucket = self.bucket_name();
    let requests = self
      .manifest
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>, _>>()?;

    info!(bucket = %bucket, assets = requests.len(), "Installing");

    let responses = try_join_all(requests.iter().map(|request| self.fetch_asset(request))).await?;
    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
    self.storage.put_all(&bucket, &entries)?;

    let mut state = self.storage.load_state()?;
    state.waiting_version = Some(self.version.clone());
    self.storage.store_state(&state)?;

    info!(bucket = %bucket, "Installed, waiting to activate");
    Ok(())
  }

  async fn fetch_asset(&self, request: &Request) -> Result<Response, OfflineError> {
    let response = self
      .fetcher
      .fetch(request)
      .await
      .map_err(|e| OfflineError::AssetFetch {
        url: request.url.to_string(),
        reason: e.to_string(),
      })?;

    if !response.is_installable() {
      return Err(OfflineError::AssetFetch {
        url: request.url.to_string(),
        reason: format!(
          "status {} ({})",
          response.status,
          response.response_type.as_str()
        ),
      });
    }

    Ok(response)
  }

  /// Give control to the installed version and delete every other bucket.
  ///
  /// Returns the names of the removed buckets.
  pub fn activate(&self) -> Result<Vec<String>, OfflineError> {
    let state = self.storage.load_state()?;
    if state.waiting_version.as_deref() != Some(self.version.as_str()) {
      return Err(OfflineError::NotInstalled(self.version.clone()));
    }

    self.storage.store_state(&ControllerState {
      active_version: Some(self.version.clone()),
      waiting_version: None,
    })?;

    let current = self.bucket_name();
    let mut removed = Vec::new();
    for name in self.storage.bucket_names()? {
      if name != current && self.storage.delete_bucket(&name)? {
        debug!(bucket = %name, "Deleted stale bucket");
        removed.push(name);
      }
    }

    info!(bucket = %current, removed = removed.len(), "Activated");
    Ok(removed)
  }

  /// Install the configured version if needed, then activate it.
  pub async fn register(&self) -> Result<Registration, OfflineError> {
    let state = self.storage.load_state()?;
    if state.active_version.as_deref() == Some(self.version.as_str()) {
      return Ok(Registration::AlreadyActive);
    }

    if state.waiting_version.as_deref() != Some(self.version.as_str()) {
      self.install().await?;
    }
    let removed = self.activate()?;
    Ok(Registration::Activated { removed })
  }

  /// Answer a request: active bucket first, then the network.
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, OfflineError> {
    let state = self.storage.load_state()?;
    let Some(active) = state.active_version else {
      // Not in control yet, straight to the network
      let response = self.fetcher.fetch(request).await?;
      return Ok(FetchOutcome {
        response,
        source: ResponseSource::Network,
      });
    };
    let bucket = self.bucket_for(&active);

    if request.is_get() {
      match self.storage.match_request(&bucket, request) {
        Ok(Some(response)) => {
          debug!(url = %request.url, "Cache hit");
          return Ok(FetchOutcome {
            response,
            source: ResponseSource::Cache,
          });
        }
        Ok(None) => {}
        Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed, using network"),
      }
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if request.is_get() && response.is_cacheable() {
          if let Err(e) = self.storage.put(&bucket, request, &response) {
            warn!(url = %request.url, error = %e, "Failed to cache response");
          }
        }
        Ok(FetchOutcome {
          response,
          source: ResponseSource::Network,
        })
      }
      Err(e) => {
        if request.is_navigation() {
          let fallback = Request::get(self.resolve(&self.fallback_document)?);
          if let Some(response) = self.storage.match_request(&bucket, &fallback)? {
            debug!(url = %request.url, "Network failed, serving fallback document");
            return Ok(FetchOutcome {
              response,
              source: ResponseSource::Fallback,
            });
          }
        }
        Err(e.into())
      }
    }
  }

  /// Whether the scope URL is reachable right now.
  ///
  /// Goes to the network directly, never to a bucket. Any HTTP answer,
  /// including an error status, counts as online.
  pub async fn is_online(&self) -> bool {
    let request = Request::get(self.scope.clone());
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        debug!(url = %self.scope, status = response.status, "Network reachable");
        true
      }
      Err(e) => {
        debug!(url = %self.scope, error = %e, "Network unreachable");
        false
      }
    }
  }

  pub fn status(&self) -> Result<ControllerStatus, OfflineError> {
    let state = self.storage.load_state()?;
    let buckets = self.storage.bucket_names()?;
    let active_entries = match &state.active_version {
      Some(version) => self.storage.entry_urls(&self.bucket_for(version))?.len(),
      None => 0,
    };

    Ok(ControllerStatus {
      active_version: state.active_version,
      waiting_version: state.waiting_version,
      buckets,
      active_entries,
    })
  }

  /// URLs cached in the active bucket.
  pub fn entries(&self) -> Result<Vec<String>, OfflineError> {
    let state = self.storage.load_state()?;
    match state.active_version {
      Some(version) => Ok(self.storage.entry_urls(&self.bucket_for(&version))?),
      None => Ok(Vec::new()),
    }
  }
}

fn parse_url(value: &str) -> Result<Url, OfflineError> {
  Url::parse(value).map_err(|source| OfflineError::InvalidUrl {
    url: value.to_string(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::error::FetchError;
  use crate::offline::storage::SqliteCacheStorage;
  use crate::offline::traits::ResponseType;
  use color_eyre::{eyre::eyre, Result};
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::{Arc, Mutex};

  const SCOPE: &str = "http://localhost:8080/notes/";

  /// Scripted network: known URLs answer, everything else is a 404.
  #[derive(Clone, Default)]
  struct FakeNetwork {
    routes: Arc<Mutex<HashMap<String, Response>>>,
    offline: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<String>>>,
  }

  impl FakeNetwork {
    fn serve(&self, url: &str, status: u16, response_type: ResponseType, body: &str) {
      let parsed = Url::parse(url).unwrap();
      self.routes.lock().unwrap().insert(
        parsed.to_string(),
        Response::new(parsed, status, response_type, body),
      );
    }

    fn serve_ok(&self, url: &str, body: &str) {
      self.serve(url, 200, ResponseType::Basic, body);
    }

    fn go_offline(&self) {
      self.offline.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }

    fn reset_calls(&self) {
      self.calls.lock().unwrap().clear();
    }
  }

  impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
      self.calls.lock().unwrap().push(request.url.to_string());
      if self.offline.load(Ordering::SeqCst) {
        return Err(FetchError::Network("offline".to_string()));
      }
      let routes = self.routes.lock().unwrap();
      Ok(
        routes
          .get(request.url.as_str())
          .cloned()
          .unwrap_or_else(|| Response::new(request.url.clone(), 404, ResponseType::Basic, "")),
      )
    }
  }

  fn config(version: &str, manifest: &[&str]) -> OfflineConfig {
    OfflineConfig {
      cache_name: "notes-app".to_string(),
      version: version.to_string(),
      scope: SCOPE.to_string(),
      manifest: manifest.iter().map(|s| s.to_string()).collect(),
      fallback_document: "/".to_string(),
      timeout_secs: 5,
    }
  }

  fn shell_network() -> FakeNetwork {
    let net = FakeNetwork::default();
    net.serve_ok("http://localhost:8080/", "<html>root</html>");
    net.serve_ok("http://localhost:8080/app.js", "app()");
    net.serve_ok("http://localhost:8080/notes/icons/icon1.png", "png");
    net
  }

  const MANIFEST: &[&str] = &["/", "/app.js", "./icons/icon1.png"];

  fn controller(
    storage: Arc<SqliteCacheStorage>,
    net: &FakeNetwork,
    version: &str,
  ) -> OfflineCache<Arc<SqliteCacheStorage>, FakeNetwork> {
    OfflineCache::new(storage, net.clone(), &config(version, MANIFEST)).unwrap()
  }

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[tokio::test]
  async fn test_install_caches_every_manifest_asset() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage.clone(), &net, "1");

    sw.install().await.unwrap();
    sw.activate().unwrap();
    net.reset_calls();
    net.go_offline();

    for asset in [
      "http://localhost:8080/",
      "http://localhost:8080/app.js",
      "http://localhost:8080/notes/icons/icon1.png",
    ] {
      let outcome = sw.handle_fetch(&Request::get(url(asset))).await.unwrap();
      assert_eq!(outcome.source, ResponseSource::Cache);
    }
    assert!(net.calls().is_empty());
  }

  #[tokio::test]
  async fn test_install_is_atomic_on_asset_failure() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = FakeNetwork::default();
    net.serve_ok("http://localhost:8080/", "root");
    net.serve_ok("http://localhost:8080/app.js", "app()");
    // icon1.png is missing -> 404
    let sw = controller(storage.clone(), &net, "1");

    let err = sw.install().await.unwrap_err();
    assert!(matches!(err, OfflineError::AssetFetch { .. }));
    assert!(storage.bucket_names().unwrap().is_empty());
    assert_eq!(storage.load_state().unwrap(), ControllerState::default());
    assert!(matches!(sw.activate(), Err(OfflineError::NotInstalled(_))));
  }

  #[tokio::test]
  async fn test_failed_upgrade_keeps_previous_version_serving() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    controller(storage.clone(), &net, "1").register().await.unwrap();

    net.go_offline();
    let v2 = controller(storage.clone(), &net, "2");
    assert!(v2.register().await.is_err());

    let status = v2.status().unwrap();
    assert_eq!(status.active_version.as_deref(), Some("1"));
    assert_eq!(status.buckets, ["notes-app-v1"]);
    let outcome = v2
      .handle_fetch(&Request::get(url("http://localhost:8080/app.js")))
      .await
      .unwrap();
    assert_eq!(outcome.source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_activate_leaves_only_current_bucket() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    controller(storage.clone(), &net, "1").register().await.unwrap();
    let stray = Request::get(url("http://localhost:8080/x"));
    storage
      .put(
        "someone-else",
        &stray,
        &Response::new(stray.url.clone(), 200, ResponseType::Basic, ""),
      )
      .unwrap();

    let v2 = controller(storage.clone(), &net, "2");
    v2.install().await.unwrap();
    // Old version still in control while v2 waits
    assert_eq!(v2.status().unwrap().active_version.as_deref(), Some("1"));

    let mut removed = v2.activate().unwrap();
    removed.sort();
    assert_eq!(removed, ["notes-app-v1", "someone-else"]);
    assert_eq!(storage.bucket_names().unwrap(), ["notes-app-v2"]);
    let status = v2.status().unwrap();
    assert_eq!(status.active_version.as_deref(), Some("2"));
    assert_eq!(status.waiting_version, None);
    assert_eq!(status.active_entries, 3);
  }

  #[tokio::test]
  async fn test_register_twice_is_noop() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage, &net, "1");

    assert_eq!(
      sw.register().await.unwrap(),
      Registration::Activated { removed: vec![] }
    );
    net.reset_calls();
    assert_eq!(sw.register().await.unwrap(), Registration::AlreadyActive);
    assert!(net.calls().is_empty());
  }

  #[tokio::test]
  async fn test_miss_fetches_once_then_serves_from_cache() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    net.serve_ok("http://localhost:8080/extra.css", "body{}");
    let sw = controller(storage, &net, "1");
    sw.register().await.unwrap();
    net.reset_calls();

    let request = Request::get(url("http://localhost:8080/extra.css"));
    let first = sw.handle_fetch(&request).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(net.calls().len(), 1);

    let second = sw.handle_fetch(&request).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response.body, b"body{}");
    assert_eq!(net.calls().len(), 1);
    assert!(sw
      .entries()
      .unwrap()
      .contains(&"http://localhost:8080/extra.css".to_string()));
  }

  #[tokio::test]
  async fn test_uncacheable_responses_pass_through() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    net.serve("https://cdn.example.com/lib.js", 200, ResponseType::Cors, "lib");
    net.serve("http://localhost:8080/created", 201, ResponseType::Basic, "");
    let sw = controller(storage, &net, "1");
    sw.register().await.unwrap();

    for target in [
      "https://cdn.example.com/lib.js",
      "http://localhost:8080/created",
      "http://localhost:8080/missing",
    ] {
      let request = Request::get(url(target));
      sw.handle_fetch(&request).await.unwrap();
      let again = sw.handle_fetch(&request).await.unwrap();
      assert_eq!(again.source, ResponseSource::Network, "{target}");
    }
    assert_eq!(sw.status().unwrap().active_entries, 3);
  }

  #[tokio::test]
  async fn test_non_get_requests_bypass_cache() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage, &net, "1");
    sw.register().await.unwrap();
    net.reset_calls();

    let post = Request {
      method: "POST".to_string(),
      ..Request::get(url("http://localhost:8080/app.js"))
    };
    let outcome = sw.handle_fetch(&post).await.unwrap();
    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(net.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_offline_navigation_falls_back_to_root() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage, &net, "1");
    sw.register().await.unwrap();
    net.go_offline();

    let outcome = sw
      .handle_fetch(&Request::navigate(url("http://localhost:8080/notes/today")))
      .await
      .unwrap();
    assert_eq!(outcome.source, ResponseSource::Fallback);
    assert_eq!(outcome.response.body, b"<html>root</html>");
  }

  #[tokio::test]
  async fn test_offline_subresource_miss_surfaces_error() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage, &net, "1");
    sw.register().await.unwrap();
    net.go_offline();

    let err = sw
      .handle_fetch(&Request::get(url("http://localhost:8080/notes/today")))
      .await
      .unwrap_err();
    assert!(matches!(err, OfflineError::Network(_)));
  }

  #[tokio::test]
  async fn test_before_activation_requests_go_to_network_uncached() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage.clone(), &net, "1");

    let request = Request::get(url("http://localhost:8080/app.js"));
    for _ in 0..2 {
      let outcome = sw.handle_fetch(&request).await.unwrap();
      assert_eq!(outcome.source, ResponseSource::Network);
    }
    assert_eq!(net.calls().len(), 2);
    assert!(storage.bucket_names().unwrap().is_empty());
  }

  /// Storage whose lookups always fail; everything else is delegated.
  struct BrokenLookups(Arc<SqliteCacheStorage>);

  impl CacheStorage for BrokenLookups {
    fn bucket_names(&self) -> Result<Vec<String>> {
      self.0.bucket_names()
    }

    fn delete_bucket(&self, name: &str) -> Result<bool> {
      self.0.delete_bucket(name)
    }

    fn match_request(&self, _bucket: &str, _request: &Request) -> Result<Option<Response>> {
      Err(eyre!("disk I/O error"))
    }

    fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()> {
      self.0.put(bucket, request, response)
    }

    fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()> {
      self.0.put_all(bucket, entries)
    }

    fn entry_urls(&self, bucket: &str) -> Result<Vec<String>> {
      self.0.entry_urls(bucket)
    }

    fn load_state(&self) -> Result<ControllerState> {
      self.0.load_state()
    }

    fn store_state(&self, state: &ControllerState) -> Result<()> {
      self.0.store_state(state)
    }
  }

  #[tokio::test]
  async fn test_lookup_failure_falls_through_to_network() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    controller(storage.clone(), &net, "1").register().await.unwrap();
    net.reset_calls();

    let sw = OfflineCache::new(BrokenLookups(storage), net.clone(), &config("1", MANIFEST)).unwrap();
    let outcome = sw
      .handle_fetch(&Request::get(url("http://localhost:8080/app.js")))
      .await
      .unwrap();
    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.body, b"app()");
    assert_eq!(net.calls(), ["http://localhost:8080/app.js"]);
  }

  #[tokio::test]
  async fn test_is_online_follows_network_not_cache() {
    let storage = Arc::new(SqliteCacheStorage::open_in_memory().unwrap());
    let net = shell_network();
    let sw = controller(storage, &net, "1");
    sw.register().await.unwrap();
    net.reset_calls();

    // Scope itself is not routed, so the fake answers 404; still reachable
    assert!(sw.is_online().await);
    assert_eq!(net.calls(), [SCOPE]);

    net.go_offline();
    assert!(!sw.is_online().await);
  }
}
