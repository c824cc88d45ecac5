//! Registration slots and the host page's side of the update handshake.
//!
//! A [`Registration`] tracks which controller version is installing,
//! waiting and active. A new version that installs while an older one is
//! active waits; the host page is told an update is available, asks the
//! user, and only on acceptance sends the takeover signal. The page then
//! reloads once to bind to the new controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::OfflineConfig;
use crate::error::{CacheError, CacheResult};

use super::controller::{precache_store_name, store_version, CacheController, Router};
use super::fetch::Fetcher;
use super::store::CacheStorage;
use super::types::{Command, FetchOutcome, Request, Response, ServedFrom};

/// Capacity of the lifecycle event channel.
const EVENT_CAPACITY: usize = 16;

/// Shortest period between background update checks.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle notifications for host pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A new version installed while an older one controls the page
    UpdateAvailable { version: u32 },
    /// A different version now routes requests
    ControllerChanged { from: Option<u32>, to: u32 },
    InstallFailed { version: u32, message: String },
}

/// Outcome of an update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The configured version is already active
    UpToDate(u32),
    /// Nothing was active, so the new version activated immediately
    Activated(u32),
    /// The new version is installed and waiting for takeover
    Waiting(u32),
}

/// Versions occupying each slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationStatus {
    pub installing: Option<u32>,
    pub waiting: Option<u32>,
    pub active: Option<u32>,
}

#[derive(Default)]
struct Slots {
    installing: Option<Arc<CacheController>>,
    waiting: Option<Arc<CacheController>>,
    active: Option<Arc<CacheController>>,
    /// Whether `UpdateAvailable` went out for the current waiting version
    announced: bool,
}

/// The installing, waiting and active controllers for one application.
pub struct Registration {
    config: OfflineConfig,
    router: Router,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    slots: Mutex<Slots>,
    events: broadcast::Sender<RegistrationEvent>,
}

impl Registration {
    /// Register against existing storage.
    ///
    /// Only the version recorded by the last activation is restored as
    /// active, and only while its precache store still exists. The newest
    /// other installed version goes back into the waiting slot; it is
    /// announced by the next [`Registration::update`].
    pub fn register(
        config: &OfflineConfig,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> CacheResult<Arc<Self>> {
        let prefix = &config.cache_prefix;
        let active = match storage.active_version()? {
            Some(version) if storage.has(&precache_store_name(prefix, version))? => Some(version),
            _ => None,
        };
        let precache_prefix = format!("{prefix}-cache-v");
        let waiting = storage
            .keys()?
            .iter()
            .filter(|name| name.starts_with(&precache_prefix))
            .filter_map(|name| store_version(prefix, name))
            .filter(|version| Some(*version) != active)
            .max();

        let mut slots = Slots::default();
        if let Some(version) = active {
            tracing::debug!("Restoring active cache v{version}");
            slots.active = Some(Arc::new(CacheController::restore_active(
                config,
                version,
                storage.clone(),
                fetcher.clone(),
            )?));
        }
        if let Some(version) = waiting {
            tracing::debug!("Restoring waiting cache v{version}");
            slots.waiting = Some(Arc::new(CacheController::restore_waiting(
                config,
                version,
                storage.clone(),
                fetcher.clone(),
            )?));
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(Self {
            config: config.clone(),
            router: Router::new(config)?,
            storage,
            fetcher,
            slots: Mutex::new(slots),
            events,
        }))
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RegistrationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn slots(&self) -> CacheResult<std::sync::MutexGuard<'_, Slots>> {
        self.slots
            .lock()
            .map_err(|_| CacheError::Io(std::io::Error::other("registration lock poisoned")))
    }

    pub fn status(&self) -> RegistrationStatus {
        self.slots()
            .map(|s| RegistrationStatus {
                installing: s.installing.as_ref().map(|c| c.version()),
                waiting: s.waiting.as_ref().map(|c| c.version()),
                active: s.active.as_ref().map(|c| c.version()),
            })
            .unwrap_or_default()
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Install the configured version if it is not already active or waiting.
    ///
    /// A version found waiting from an earlier run is announced once, or
    /// activated straight away when nothing is active.
    pub async fn update(&self) -> CacheResult<UpdateStatus> {
        let version = self.config.version;
        let status = self.status();
        if status.active == Some(version) {
            return Ok(UpdateStatus::UpToDate(version));
        }
        if status.waiting == Some(version) {
            if status.active.is_none() {
                self.skip_waiting().await?;
                return Ok(UpdateStatus::Activated(version));
            }
            let unannounced = !std::mem::replace(&mut self.slots()?.announced, true);
            if unannounced {
                self.emit(RegistrationEvent::UpdateAvailable { version });
            }
            return Ok(UpdateStatus::Waiting(version));
        }

        let controller = Arc::new(CacheController::new(
            &self.config,
            self.storage.clone(),
            self.fetcher.clone(),
        )?);
        self.slots()?.installing = Some(controller.clone());

        let installed = controller.install().await;
        self.slots()?.installing = None;
        if let Err(e) = installed {
            tracing::warn!("Cache v{version} install failed: {e}");
            self.emit(RegistrationEvent::InstallFailed {
                version,
                message: e.to_string(),
            });
            return Err(e);
        }

        if status.active.is_some() {
            // Never take over a page that is in use without consent
            {
                let mut slots = self.slots()?;
                slots.waiting = Some(controller);
                slots.announced = true;
            }
            self.emit(RegistrationEvent::UpdateAvailable { version });
            Ok(UpdateStatus::Waiting(version))
        } else {
            controller.activate().await?;
            self.slots()?.active = Some(controller);
            self.emit(RegistrationEvent::ControllerChanged {
                from: None,
                to: version,
            });
            Ok(UpdateStatus::Activated(version))
        }
    }

    /// Deliver the takeover signal to the waiting version.
    ///
    /// Returns the newly active version, or `None` if nothing was waiting.
    pub async fn skip_waiting(&self) -> CacheResult<Option<u32>> {
        let Some(waiting) = self.slots()?.waiting.take() else {
            return Ok(None);
        };
        self.slots()?.announced = false;
        waiting.handle_command(Command::SkipWaiting).await?;

        let previous = self.slots()?.active.replace(waiting.clone());
        let from = previous.map(|old| {
            old.retire();
            old.version()
        });
        self.emit(RegistrationEvent::ControllerChanged {
            from,
            to: waiting.version(),
        });
        Ok(Some(waiting.version()))
    }

    /// Fetch through the active controller, or straight from the network.
    pub async fn fetch(&self, request: &Request) -> CacheResult<(Response, ServedFrom)> {
        let active = self.slots()?.active.clone();
        if let Some(controller) = active {
            if let FetchOutcome::Responded {
                response,
                served_from,
            } = controller.handle_fetch(request).await?
            {
                return Ok((response, served_from));
            }
        }
        let url = self.router.resolve(&request.url)?;
        let response = self.fetcher.fetch(&url, request).await?;
        Ok((response, ServedFrom::Network))
    }

    /// Send "clear all caches" to the active controller.
    pub async fn clear_caches(&self) -> CacheResult<()> {
        let active = self.slots()?.active.clone();
        match active {
            Some(controller) => controller.handle_command(Command::ClearCaches).await,
            None => self.storage.clear().await.map(|_| ()),
        }
    }

    /// Re-run [`Registration::update`] every `interval` in the background.
    ///
    /// Intervals shorter than a millisecond are raised to one.
    pub fn spawn_update_checks(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registration = Arc::clone(self);
        let interval = interval.max(MIN_CHECK_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = registration.update().await {
                    tracing::warn!("Periodic update check failed: {e}");
                }
            }
        })
    }
}

/// Asks the user whether to switch to a new version now.
pub trait UpdatePrompt: Send + Sync {
    fn confirm_update(&self, version: u32) -> bool;
}

/// What the host page did in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Ignored,
    /// The user postponed the update; the old version keeps serving
    Dismissed,
    /// The user accepted and the takeover signal was sent
    TakeoverRequested,
    /// Reload to bind to the new controller
    Reload,
}

/// The page-side half of the update flow.
pub struct HostPage {
    registration: Arc<Registration>,
    reloaded: AtomicBool,
}

impl HostPage {
    pub fn new(registration: Arc<Registration>) -> Self {
        Self {
            registration,
            reloaded: AtomicBool::new(false),
        }
    }

    /// React to one lifecycle event.
    ///
    /// A controller change triggers at most one reload for the lifetime of
    /// the page.
    pub async fn handle_event(
        &self,
        event: &RegistrationEvent,
        prompt: &dyn UpdatePrompt,
    ) -> CacheResult<HostAction> {
        match event {
            RegistrationEvent::UpdateAvailable { version } => {
                if prompt.confirm_update(*version) {
                    self.registration.skip_waiting().await?;
                    Ok(HostAction::TakeoverRequested)
                } else {
                    tracing::info!("Update to cache v{version} postponed");
                    Ok(HostAction::Dismissed)
                }
            }
            RegistrationEvent::ControllerChanged { .. } => {
                if self.reloaded.swap(true, Ordering::SeqCst) {
                    Ok(HostAction::Ignored)
                } else {
                    Ok(HostAction::Reload)
                }
            }
            RegistrationEvent::InstallFailed { .. } => Ok(HostAction::Ignored),
        }
    }

    pub fn has_reloaded(&self) -> bool {
        self.reloaded.load(Ordering::SeqCst)
    }
}
