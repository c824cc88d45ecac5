//! One version of the cache/update controller.
//!
//! A controller moves through `Installing → Waiting → Active`. Install
//! fetches the whole precache manifest and stores it in one step; activate
//! purges every store that does not belong to this version; only an active
//! controller routes requests.

use reqwest::Url;
use std::sync::{Arc, Mutex};

use crate::config::OfflineConfig;
use crate::error::{CacheError, CacheResult};

use super::fetch::Fetcher;
use super::store::CacheStorage;
use super::types::{Command, FetchOutcome, Request, Response, ServedFrom, WorkerState};

/// Message body returned for the hosting API while offline.
pub const NETWORK_UNAVAILABLE: &str = "Network unavailable";

/// `<prefix>-cache-v<N>`: the precache store for a version.
pub fn precache_store_name(prefix: &str, version: u32) -> String {
    format!("{prefix}-cache-v{version}")
}

/// `<prefix>-runtime-v<N>`: the runtime store for a version.
pub fn runtime_store_name(prefix: &str, version: u32) -> String {
    format!("{prefix}-runtime-v{version}")
}

/// Parse the version out of a store name with the given prefix.
pub fn store_version(prefix: &str, name: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
    let version = rest
        .strip_prefix("cache-v")
        .or_else(|| rest.strip_prefix("runtime-v"))?;
    version.parse().ok()
}

/// How a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Hosting API: try the network, synthesize an error body when offline
    NetworkFirst,
    /// Same origin or allow-listed library host
    CacheFirst,
    /// Anything else is left alone
    Passthrough,
}

/// Routing rules shared by every version.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Url,
    api_host: String,
    cdn_hosts: Vec<String>,
}

impl Router {
    pub fn new(config: &OfflineConfig) -> CacheResult<Self> {
        let origin = Url::parse(&config.origin).map_err(|e| CacheError::InvalidUrl {
            url: config.origin.clone(),
            message: e.to_string(),
        })?;
        let cdn_hosts = config
            .cdn_urls
            .iter()
            .filter_map(|u| Url::parse(u).ok()?.host_str().map(str::to_string))
            .collect();
        Ok(Self {
            origin,
            api_host: config.api_host.clone(),
            cdn_hosts,
        })
    }

    /// Resolve a manifest entry or request URL against the origin.
    pub fn resolve(&self, url: &str) -> CacheResult<String> {
        self.origin
            .join(url)
            .map(|u| u.to_string())
            .map_err(|e| CacheError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    /// Pick the route for an absolute URL.
    pub fn route(&self, url: &str) -> Route {
        if !self.api_host.is_empty() && url.contains(&self.api_host) {
            return Route::NetworkFirst;
        }
        let same_origin = Url::parse(url)
            .map(|u| u.origin() == self.origin.origin())
            .unwrap_or(false);
        if same_origin || self.cdn_hosts.iter().any(|host| url.contains(host.as_str())) {
            Route::CacheFirst
        } else {
            Route::Passthrough
        }
    }
}

/// The controller for one cache version.
pub struct CacheController {
    version: u32,
    prefix: String,
    manifest: Vec<String>,
    shell_path: String,
    router: Router,
    state: Mutex<WorkerState>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
}

impl CacheController {
    /// A controller about to install `config.version`.
    pub fn new(
        config: &OfflineConfig,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> CacheResult<Self> {
        Ok(Self {
            version: config.version,
            prefix: config.cache_prefix.clone(),
            manifest: config.precache_urls.clone(),
            shell_path: config.shell_path.clone(),
            router: Router::new(config)?,
            state: Mutex::new(WorkerState::Installing),
            storage,
            fetcher,
        })
    }

    /// A controller for a version that is already installed and active.
    pub fn restore_active(
        config: &OfflineConfig,
        version: u32,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> CacheResult<Self> {
        Self::restore(config, version, WorkerState::Active, storage, fetcher)
    }

    /// A controller for a version that installed but never took over.
    pub fn restore_waiting(
        config: &OfflineConfig,
        version: u32,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> CacheResult<Self> {
        Self::restore(config, version, WorkerState::Waiting, storage, fetcher)
    }

    fn restore(
        config: &OfflineConfig,
        version: u32,
        state: WorkerState,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> CacheResult<Self> {
        let controller = Self::new(config, storage, fetcher)?;
        Ok(Self {
            version,
            state: Mutex::new(state),
            ..controller
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(WorkerState::Redundant)
    }

    fn set_state(&self, state: WorkerState) {
        if let Ok(mut current) = self.state.lock() {
            tracing::debug!("Cache v{}: {} -> {}", self.version, *current, state);
            *current = state;
        }
    }

    pub fn precache_name(&self) -> String {
        precache_store_name(&self.prefix, self.version)
    }

    pub fn runtime_name(&self) -> String {
        runtime_store_name(&self.prefix, self.version)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Fetch every manifest entry and store them together.
    ///
    /// All or nothing: if any entry fails to fetch or returns a non-OK
    /// status, nothing is stored and the controller becomes redundant.
    pub async fn install(&self) -> CacheResult<()> {
        self.require(WorkerState::Installing, "install")?;
        tracing::info!("Installing cache v{} ({} entries)", self.version, self.manifest.len());

        match self.fetch_manifest().await {
            Ok(entries) => {
                self.storage.put_all(&self.precache_name(), entries).await?;
                self.set_state(WorkerState::Waiting);
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    async fn fetch_manifest(&self) -> CacheResult<Vec<(String, Response)>> {
        let mut entries = Vec::with_capacity(self.manifest.len());
        for entry in &self.manifest {
            let url = self.router.resolve(entry)?;
            let install_error = |message: String| CacheError::Install {
                version: self.version,
                url: url.clone(),
                message,
            };
            let response = self
                .fetcher
                .fetch(&url, &Request::get(url.clone()))
                .await
                .map_err(|e| install_error(e.to_string()))?;
            if !response.is_ok() {
                return Err(install_error(format!("HTTP {}", response.status)));
            }
            entries.push((url, response));
        }
        Ok(entries)
    }

    /// Purge every store outside this version's pair and start routing.
    pub async fn activate(&self) -> CacheResult<Vec<String>> {
        self.require(WorkerState::Waiting, "activate")?;

        let keep = [self.precache_name(), self.runtime_name()];
        let mut deleted = Vec::new();
        for name in self.storage.keys()? {
            if !keep.contains(&name) && self.storage.delete(&name).await? {
                deleted.push(name);
            }
        }

        self.storage.set_active_version(Some(self.version)).await?;
        self.set_state(WorkerState::Active);
        tracing::info!(
            "Activated cache v{} (purged {} old stores)",
            self.version,
            deleted.len()
        );
        Ok(deleted)
    }

    /// Mark this version as replaced.
    pub fn retire(&self) {
        self.set_state(WorkerState::Redundant);
    }

    /// Handle a command from a host page.
    pub async fn handle_command(&self, command: Command) -> CacheResult<()> {
        match command {
            Command::SkipWaiting => {
                if self.state() == WorkerState::Waiting {
                    self.activate().await?;
                }
                Ok(())
            }
            Command::ClearCaches => {
                let removed = self.storage.clear().await?;
                tracing::info!("Cleared {removed} cache stores");
                Ok(())
            }
        }
    }

    /// Route one request.
    ///
    /// Only an active controller intercepts; otherwise every request passes
    /// through. Errors are returned only when a cache-first request has no
    /// cached copy, no network and no shell fallback.
    pub async fn handle_fetch(&self, request: &Request) -> CacheResult<FetchOutcome> {
        if self.state() != WorkerState::Active {
            return Ok(FetchOutcome::Passthrough);
        }
        let url = self.router.resolve(&request.url)?;

        match self.router.route(&url) {
            Route::Passthrough => Ok(FetchOutcome::Passthrough),
            Route::NetworkFirst => Ok(self.network_first(&url, request).await),
            Route::CacheFirst => self.cache_first(&url, request).await,
        }
    }

    async fn network_first(&self, url: &str, request: &Request) -> FetchOutcome {
        match self.fetcher.fetch(url, request).await {
            Ok(response) => FetchOutcome::Responded {
                response,
                served_from: ServedFrom::Network,
            },
            Err(e) => {
                tracing::warn!("API request failed, answering offline: {e}");
                FetchOutcome::Responded {
                    response: Response::json_error(NETWORK_UNAVAILABLE),
                    served_from: ServedFrom::Synthesized,
                }
            }
        }
    }

    async fn cache_first(&self, url: &str, request: &Request) -> CacheResult<FetchOutcome> {
        if let Some(response) = self.storage.lookup(url)? {
            return Ok(FetchOutcome::Responded {
                response,
                served_from: ServedFrom::Cache,
            });
        }

        match self.fetcher.fetch(url, request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.storage
                        .put(&self.runtime_name(), url, response.clone())
                        .await?;
                }
                Ok(FetchOutcome::Responded {
                    response,
                    served_from: ServedFrom::Network,
                })
            }
            Err(_) if request.accepts_html() => {
                let shell = self.router.resolve(&self.shell_path)?;
                match self.storage.lookup(&shell)? {
                    Some(response) => Ok(FetchOutcome::Responded {
                        response,
                        served_from: ServedFrom::Shell,
                    }),
                    None => Err(CacheError::Offline(url.to_string())),
                }
            }
            Err(_) => Err(CacheError::Offline(url.to_string())),
        }
    }

    fn require(&self, expected: WorkerState, action: &str) -> CacheResult<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(CacheError::InvalidState {
                version: self.version,
                action: action.to_string(),
                state: state.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::fetch::fakes::FakeNetwork;
    use std::sync::atomic::Ordering;

    const ORIGIN: &str = "http://app.test";

    fn config(version: u32) -> OfflineConfig {
        OfflineConfig {
            version,
            origin: ORIGIN.to_string(),
            precache_urls: vec!["/".to_string(), "/index.html".to_string(), "/app.js".to_string()],
            cdn_urls: vec!["https://cdn.jsdelivr.net/npm/jsqr/dist/jsQR.js".to_string()],
            ..OfflineConfig::default()
        }
    }

    fn network() -> Arc<FakeNetwork> {
        let net = FakeNetwork::default();
        net.serve("http://app.test/", Response::new(200, "<html>root</html>"));
        net.serve("http://app.test/index.html", Response::new(200, "<html>shell</html>"));
        net.serve("http://app.test/app.js", Response::new(200, "js"));
        Arc::new(net)
    }

    async fn active(version: u32, storage: &CacheStorage, net: &Arc<FakeNetwork>) -> CacheController {
        let controller = CacheController::new(&config(version), storage.clone(), net.clone()).unwrap();
        controller.install().await.unwrap();
        controller.activate().await.unwrap();
        controller
    }

    fn body(outcome: &FetchOutcome) -> (&[u8], ServedFrom) {
        match outcome {
            FetchOutcome::Responded {
                response,
                served_from,
            } => (&response.body, *served_from),
            FetchOutcome::Passthrough => panic!("expected a response"),
        }
    }

    #[test]
    fn test_store_names_round_trip() {
        assert_eq!(precache_store_name("metavision", 3), "metavision-cache-v3");
        assert_eq!(runtime_store_name("metavision", 3), "metavision-runtime-v3");
        assert_eq!(store_version("metavision", "metavision-runtime-v12"), Some(12));
        assert_eq!(store_version("metavision", "other-cache-v1"), None);
    }

    #[test]
    fn test_routing_rules() {
        let router = Router::new(&config(1)).unwrap();
        assert_eq!(router.route("https://api.imgbb.com/1/upload"), Route::NetworkFirst);
        assert_eq!(router.route("http://app.test/styles.css"), Route::CacheFirst);
        assert_eq!(
            router.route("https://cdn.jsdelivr.net/npm/other/x.js"),
            Route::CacheFirst
        );
        assert_eq!(router.route("https://example.org/a.js"), Route::Passthrough);
        assert_eq!(router.resolve("/a.js").unwrap(), "http://app.test/a.js");
    }

    #[tokio::test]
    async fn test_install_then_wait_for_takeover() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let controller = CacheController::new(&config(1), storage.clone(), net.clone()).unwrap();

        controller.install().await.unwrap();
        assert_eq!(controller.state(), WorkerState::Waiting);
        assert_eq!(storage.urls("metavision-cache-v1").unwrap().len(), 3);

        // Waiting controllers do not intercept
        let outcome = controller.handle_fetch(&Request::get("/app.js")).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);

        controller.handle_command(Command::SkipWaiting).await.unwrap();
        assert_eq!(controller.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let mut cfg = config(1);
        cfg.precache_urls.push("/missing.css".to_string());

        let controller = CacheController::new(&cfg, storage.clone(), net).unwrap();
        let err = controller.install().await.unwrap_err();
        assert!(matches!(err, CacheError::Install { version: 1, .. }));
        assert!(err.to_string().contains("missing.css"));
        assert!(storage.keys().unwrap().is_empty());
        assert_eq!(controller.state(), WorkerState::Redundant);
        assert!(controller.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_activation_purges_other_versions() {
        let storage = CacheStorage::in_memory();
        let net = network();
        storage.put("metavision-cache-v1", "x", Response::new(200, "")).await.unwrap();
        storage.put("metavision-runtime-v1", "x", Response::new(200, "")).await.unwrap();
        storage.put("unrelated-store", "x", Response::new(200, "")).await.unwrap();

        let controller = active(2, &storage, &net).await;
        let keys = storage.keys().unwrap();
        assert_eq!(keys, vec!["metavision-cache-v2"]);
        assert!(keys.iter().all(|k| k.ends_with("-v2")));
        assert_eq!(controller.state(), WorkerState::Active);
        assert_eq!(storage.active_version().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_restored_waiting_version_activates_on_command() {
        let storage = CacheStorage::in_memory();
        let net = network();
        active(1, &storage, &net).await;
        let pending = CacheController::new(&config(2), storage.clone(), net.clone()).unwrap();
        pending.install().await.unwrap();

        let restored =
            CacheController::restore_waiting(&config(2), 2, storage.clone(), net).unwrap();
        assert_eq!(restored.state(), WorkerState::Waiting);
        assert_eq!(storage.active_version().unwrap(), Some(1));

        restored.handle_command(Command::SkipWaiting).await.unwrap();
        assert_eq!(restored.state(), WorkerState::Active);
        assert_eq!(storage.active_version().unwrap(), Some(2));
        assert_eq!(storage.keys().unwrap(), vec!["metavision-cache-v2"]);
    }

    #[tokio::test]
    async fn test_cache_first_serves_cached_without_network() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let controller = active(1, &storage, &net).await;
        net.set_offline(true);

        let outcome = controller.handle_fetch(&Request::get("/app.js")).await.unwrap();
        assert_eq!(body(&outcome), (&b"js"[..], ServedFrom::Cache));
    }

    #[tokio::test]
    async fn test_cache_miss_fills_runtime_store() {
        let storage = CacheStorage::in_memory();
        let net = network();
        net.serve("http://app.test/late.png", Response::new(200, "png"));
        net.serve("http://app.test/gone.png", Response::new(404, "nope"));
        let controller = active(1, &storage, &net).await;

        let outcome = controller.handle_fetch(&Request::get("/late.png")).await.unwrap();
        assert_eq!(body(&outcome).1, ServedFrom::Network);
        assert!(storage
            .lookup_in("metavision-runtime-v1", "http://app.test/late.png")
            .unwrap()
            .is_some());

        // Served from cache the second time
        let calls = net.calls.load(Ordering::SeqCst);
        let outcome = controller.handle_fetch(&Request::get("/late.png")).await.unwrap();
        assert_eq!(body(&outcome).1, ServedFrom::Cache);
        assert_eq!(net.calls.load(Ordering::SeqCst), calls);

        // Non-200 is returned but not stored
        controller.handle_fetch(&Request::get("/gone.png")).await.unwrap();
        assert!(storage.lookup("http://app.test/gone.png").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_shell() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let controller = active(1, &storage, &net).await;
        net.set_offline(true);

        let outcome = controller
            .handle_fetch(&Request::navigate("/some/deep/page"))
            .await
            .unwrap();
        assert_eq!(body(&outcome), (&b"<html>shell</html>"[..], ServedFrom::Shell));

        let err = controller
            .handle_fetch(&Request::get("/missing.js"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Offline(_)));
    }

    #[tokio::test]
    async fn test_offline_api_request_gets_json_error() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let controller = active(1, &storage, &net).await;
        net.set_offline(true);

        let outcome = controller
            .handle_fetch(&Request::get("https://api.imgbb.com/1/upload"))
            .await
            .unwrap();
        let (bytes, from) = body(&outcome);
        assert_eq!(from, ServedFrom::Synthesized);
        let json: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        assert_eq!(json["error"], NETWORK_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cross_origin_is_ignored() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let controller = active(1, &storage, &net).await;
        let calls = net.calls.load(Ordering::SeqCst);

        let outcome = controller
            .handle_fetch(&Request::get("https://tracker.example.org/pixel.gif"))
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);
        assert_eq!(net.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_clear_caches_command() {
        let storage = CacheStorage::in_memory();
        let net = network();
        let controller = active(1, &storage, &net).await;
        controller.handle_command(Command::ClearCaches).await.unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }
}
