// Live configuration reload
//
// A notify poll watcher stats the env file once a second and forwards its
// events into the reload task. Bursts are debounced, then the file is
// re-applied to the process environment, the configuration is re-read, and
// the new job intervals are handed to the scheduler.

use crate::{
    config::Config,
    error::{AppError, AppResult},
    scheduler::Scheduler,
};
use notify::{event::EventKind, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Load every `KEY=value` pair from `path` into the process environment,
/// overriding existing values. Returns the number of variables applied.
pub fn apply_env_file(path: &Path) -> AppResult<usize> {
    let entries = dotenvy::from_path_iter(path)
        .map_err(|e| AppError::Config(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut applied = 0;
    for entry in entries {
        let (key, value) =
            entry.map_err(|e| AppError::Config(format!("Invalid line in {}: {}", path.display(), e)))?;
        std::env::set_var(key, value);
        applied += 1;
    }
    Ok(applied)
}

/// Watch `path` and forward relevant change events. The watcher must be kept
/// alive for as long as events are wanted.
fn watch(path: &Path) -> notify::Result<(PollWatcher, UnboundedReceiver<EventKind>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = PollWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) if !event.kind.is_access() => {
                let _ = tx.send(event.kind);
            }
            Ok(_) => {}
            Err(e) => warn!("Env file watch error: {}", e),
        },
        notify::Config::default().with_poll_interval(POLL_INTERVAL),
    )?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;

    Ok((watcher, rx))
}

pub struct EnvReloader {
    path: PathBuf,
    scheduler: Arc<Scheduler>,
}

impl EnvReloader {
    pub fn new(path: impl Into<PathBuf>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            path: path.into(),
            scheduler,
        }
    }

    fn reload(&self) -> AppResult<()> {
        let applied = apply_env_file(&self.path)?;
        let config = Config::from_env()?;
        info!("🔁 {} changed, {} variables applied", self.path.display(), applied);
        self.scheduler.reload(config.intervals());
        Ok(())
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (_watcher, mut events) = match watch(&self.path) {
                Ok(watch) => watch,
                Err(e) => {
                    error!(
                        "❌ Cannot watch {}, live reload disabled: {}",
                        self.path.display(),
                        e
                    );
                    return;
                }
            };
            info!("👀 Watching {} for changes", self.path.display());

            while let Some(kind) = events.recv().await {
                // editors often write in several steps
                tokio::time::sleep(DEBOUNCE).await;
                let mut removed = kind.is_remove();
                while let Ok(kind) = events.try_recv() {
                    removed = kind.is_remove();
                }

                if removed || !self.path.exists() {
                    debug!("{} removed, keeping current settings", self.path.display());
                    continue;
                }
                if let Err(e) = self.reload() {
                    error!("❌ Config reload failed, keeping current settings: {}", e);
                }
            }
        })
    }
}
