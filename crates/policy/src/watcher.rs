//! The Config Watcher: observes the rule file, debounces filesystem
//! churn, recompiles, and publishes successful reloads to the
//! [`PolicyStore`]. Must survive compile failures indefinitely — a bad
//! save is logged and the previous snapshot keeps serving traffic.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::compile::{compile, parse_document};
use crate::PolicyStore;

/// Default quiet period before a batch of filesystem events triggers a
/// recompile, per spec.md §4.3.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Failure standing up the underlying filesystem watch. Unlike a compile
/// failure (which the watcher survives forever), this means the watch
/// could not even be established — callers typically treat it as fatal
/// at startup.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The `notify` backend could not watch the path (missing file,
    /// permission denied, platform limit).
    #[error("failed to watch rule file: {0}")]
    Notify(String),
}

/// Owns the background filesystem watch for one rule file. Dropping the
/// handle stops watching: the underlying `notify` watcher is torn down,
/// its event channel closes, and the debounce thread exits on its next
/// wakeup.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `path` for changes, debounced by `quiet_period`:
    /// filesystem events reset a timer, and a reload only fires once
    /// `quiet_period` has elapsed without a new event (coalescing the
    /// several writes one editor "save" typically produces). On success
    /// the recompiled snapshot is published to `store`; on failure the
    /// error is logged and `store` is left untouched.
    pub fn spawn(path: impl Into<PathBuf>, store: Arc<PolicyStore>, quiet_period: Duration) -> Result<Self, WatchError> {
        let path = path.into();
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| WatchError::Notify(e.to_string()))?;

        watcher.watch(&path, RecursiveMode::NonRecursive).map_err(|e| WatchError::Notify(e.to_string()))?;

        let watch_path = path.clone();
        thread::spawn(move || debounce_loop(&rx, &watch_path, &store, quiet_period));

        info!(path = %path.display(), "config watcher: watching rule file for changes");
        Ok(Self { _watcher: watcher })
    }
}

/// Cooperative, single-threaded with respect to the rule file: one
/// thread owns the debounce window and the reload, so concurrent
/// filesystem events never race each other into the compiler.
fn debounce_loop(rx: &mpsc::Receiver<notify::Result<notify::Event>>, path: &Path, store: &PolicyStore, quiet_period: Duration) {
    loop {
        // Block for the first event of a new batch.
        match rx.recv() {
            Ok(Ok(_event)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "config watcher: filesystem notify error");
                continue;
            }
            Err(_) => return, // sender dropped: watcher was torn down.
        }

        // Coalesce any further events within the quiet period.
        loop {
            match rx.recv_timeout(quiet_period) {
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "config watcher: filesystem notify error");
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        reload(path, store);
    }
}

fn reload(path: &Path, store: &PolicyStore) {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            error!(path = %path.display(), error = %e, "config watcher: failed to read rule file; keeping previous snapshot");
            return;
        }
    };

    let document = match parse_document(&contents) {
        Ok(d) => d,
        Err(e) => {
            error!(path = %path.display(), error = %e, "config watcher: rule file failed to parse; keeping previous snapshot");
            return;
        }
    };

    match compile(document) {
        Ok(snapshot) => {
            let rule_count = snapshot.rules().len();
            store.replace(snapshot);
            info!(path = %path.display(), rules = rule_count, "config watcher: reloaded policy snapshot");
        }
        Err(errors) => {
            for e in &errors {
                error!(path = %path.display(), error = %e, "config watcher: rule compile error; keeping previous snapshot");
            }
        }
    }
}
