//! The `metavision cache` command for the offline cache.

use clap::{Args, Subcommand};
use dialoguer::Confirm;
use metavision_core::offline::{
    CacheStorage, HostAction, HostPage, HttpFetcher, Registration, RegistrationEvent, Request,
    UpdatePrompt, UpdateStatus,
};
use metavision_core::Config;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

use super::theme;

/// Arguments for the `cache` command.
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Subcommands for the offline cache.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Install the configured cache version, or stage it as an update
    Sync {
        /// Switch to a new version without asking
        #[arg(short, long)]
        yes: bool,

        /// Keep running and check for new versions periodically
        #[arg(long)]
        watch: bool,
    },

    /// Fetch a URL through the cache
    Fetch {
        /// Absolute URL, or a path relative to the configured origin
        url: String,

        /// Treat the request as a page navigation (enables the shell fallback)
        #[arg(long)]
        html: bool,

        /// Write the body to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show installing, waiting and active versions
    Status,

    /// List stores and their entry counts
    List,

    /// Delete every store
    Clear,
}

/// Asks on the terminal, or answers yes for `--yes`.
struct TerminalPrompt {
    assume_yes: bool,
}

impl UpdatePrompt for TerminalPrompt {
    fn confirm_update(&self, version: u32) -> bool {
        if self.assume_yes {
            return true;
        }
        Confirm::with_theme(&theme::metavision_theme())
            .with_prompt(format!("A new version (v{version}) is available. Update now?"))
            .default(true)
            .interact_opt()
            .ok()
            .flatten()
            .unwrap_or(false)
    }
}

async fn open_registration(config: &Config) -> anyhow::Result<Arc<Registration>> {
    let storage = CacheStorage::open(&config.cache_dir()).await?;
    let fetcher = Arc::new(HttpFetcher::new(config.limits.fetch_timeout_ms));
    Ok(Registration::register(&config.offline, storage, fetcher)?)
}

/// Execute the cache command.
pub async fn execute(args: CacheArgs, config: Config) -> anyhow::Result<()> {
    let registration = open_registration(&config).await?;

    match args.command {
        CacheCommand::Sync { yes, watch } => {
            let prompt = TerminalPrompt { assume_yes: yes };
            let page = HostPage::new(registration.clone());
            let mut events = registration.subscribe();

            report_update(registration.update().await?);
            drain_events(&mut events, &page, &prompt).await?;

            if watch {
                let interval = Duration::from_secs(config.offline.update_check_interval_secs);
                let checks = registration.spawn_update_checks(interval);
                eprintln!("Checking for updates every {interval:?}. Press Ctrl+C to stop.");
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Ok(event) => handle_event(&page, &event, &prompt).await?,
                            Err(e) => tracing::warn!("Missed update events: {e}"),
                        },
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
                checks.abort();
            }
        }

        CacheCommand::Fetch { url, html, output } => {
            let request = if html {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            let (response, served_from) = registration.fetch(&request).await?;
            tracing::info!("HTTP {} ({served_from:?})", response.status);

            match output {
                Some(path) => {
                    std::fs::write(&path, &response.body)?;
                    theme::success(&format!(
                        "{} bytes written to {}",
                        response.body.len(),
                        path.display()
                    ));
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&response.body)?;
                    stdout.flush()?;
                }
            }
        }

        CacheCommand::Status => {
            let status = registration.status();
            let show = |v: Option<u32>| v.map_or_else(|| "-".to_string(), |v| format!("v{v}"));
            println!("configured  v{}", config.offline.version);
            println!("active      {}", show(status.active));
            println!("waiting     {}", show(status.waiting));
            println!("installing  {}", show(status.installing));
        }

        CacheCommand::List => {
            let storage = registration.storage();
            let names = storage.keys()?;
            if names.is_empty() {
                println!("No cache stores.");
            }
            for name in names {
                println!("{name:<32} {:>5} entries", storage.urls(&name)?.len());
            }
        }

        CacheCommand::Clear => {
            registration.clear_caches().await?;
            theme::success("All cache stores deleted");
        }
    }

    Ok(())
}

fn report_update(status: UpdateStatus) {
    match status {
        UpdateStatus::UpToDate(v) => theme::success(&format!("Cache v{v} is up to date")),
        UpdateStatus::Activated(v) => theme::success(&format!("Cache v{v} installed and active")),
        UpdateStatus::Waiting(v) => theme::notice(&format!("Cache v{v} installed and waiting")),
    }
}

async fn drain_events(
    events: &mut tokio::sync::broadcast::Receiver<RegistrationEvent>,
    page: &HostPage,
    prompt: &TerminalPrompt,
) -> anyhow::Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => handle_event(page, &event, prompt).await?,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
            Err(TryRecvError::Lagged(n)) => tracing::warn!("Missed {n} update events"),
        }
    }
}

async fn handle_event(
    page: &HostPage,
    event: &RegistrationEvent,
    prompt: &TerminalPrompt,
) -> anyhow::Result<()> {
    match page.handle_event(event, prompt).await? {
        HostAction::Reload => {
            if let RegistrationEvent::ControllerChanged { to, .. } = event {
                theme::success(&format!("Now serving cache v{to}"));
            }
        }
        HostAction::Dismissed => {
            theme::notice("Update postponed; the current version keeps serving")
        }
        HostAction::TakeoverRequested | HostAction::Ignored => {}
    }
    Ok(())
}
