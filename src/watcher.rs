//! Live file index maintenance.
//!
//! One watcher drives one [`FileIndex`]. At startup the watcher first tries
//! to establish a push subscription (the `notify` backend: inotify on Linux,
//! kqueue on macOS), then seeds the index with a full enumeration — in that
//! order, so a change landing during the seed still produces an event and
//! nothing is permanently missed. If push setup fails it falls back to
//! periodic enumeration, diffing each pass against its own previous snapshot
//! to synthesize the same add/remove batches. A push stream that drops after
//! activation is surfaced through [`FileWatcher::status`] and never retried
//! internally.

use anyhow::{Context, Result};
use globset::GlobSet;
use ignore::WalkBuilder;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, UNIX_EPOCH};

use crate::config::Config;
use crate::index::FileIndex;
use crate::paths;

/// Dependency directories never indexed regardless of configuration.
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", "bower_components", ".git"];

/// How often worker threads check the stop flag while idle.
const STOP_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Push subscription established; events arrive from the backend.
    PushActive,
    /// Fallback: periodic enumeration diffed against the prior snapshot.
    Polling,
}

/// Failure kinds surfaced to the owning caller. Push setup failures are not
/// here: those are recovered locally by falling back to polling.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    /// The push stream dropped after activation. The owner may reinitialize
    /// by constructing a fresh watcher.
    #[error("push subscription lost: {0}")]
    SubscriptionLost(String),
}

pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Skip the push attempt entirely; go straight to polling.
    pub force_polling: bool,
    pub verbose: u8,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            force_polling: false,
            verbose: 0,
        }
    }
}

/// Suffix + exclusion filter applied identically in push and polling modes.
pub struct PathFilter {
    suffixes: Vec<String>,
    excludes: GlobSet,
}

impl PathFilter {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            suffixes: config.suffixes.clone(),
            excludes: config.exclude_set()?,
        })
    }

    /// Whether a normalized root-relative path belongs in the index.
    pub fn admits(&self, rel: &str) -> bool {
        let Some(suffix) = paths::suffix(rel) else {
            return false;
        };
        if !self.suffixes.iter().any(|s| s == suffix) {
            return false;
        }
        if rel.split('/').any(|part| EXCLUDED_DIRS.contains(&part)) {
            return false;
        }
        !self.excludes.is_match(rel)
    }
}

struct Shared {
    index: FileIndex,
    error: Mutex<Option<WatchError>>,
    stop: AtomicBool,
}

pub struct FileWatcher {
    root: PathBuf,
    mode: WatchMode,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    // Keeps the push subscription alive; dropping it closes the event stream.
    backend: Option<RecommendedWatcher>,
}

impl FileWatcher {
    /// Start the event source, then seed the index from a full enumeration.
    ///
    /// In push mode the subscription is established before the seed runs:
    /// a file created or deleted while the enumeration is in flight still
    /// produces an event, which merges safely with the seeded entries once
    /// the worker drains the channel.
    pub fn start(root: &Path, config: &Config, options: WatchOptions) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve project root {}", root.display()))?;
        let filter = PathFilter::new(config)?;

        let shared = Arc::new(Shared {
            index: FileIndex::new(),
            error: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        if !options.force_polling {
            match try_push(&root) {
                Ok((backend, events)) => {
                    if options.verbose > 0 {
                        eprintln!(
                            "impjs.watch start root={} backend=notify",
                            root.to_string_lossy()
                        );
                    }
                    // Subscription is live; events raised during this seed
                    // queue on the channel until the worker starts.
                    shared.index.upsert(enumerate(&root, &filter)?);
                    let worker = spawn_push_loop(
                        root.clone(),
                        Arc::clone(&shared),
                        filter,
                        events,
                        options.verbose,
                    );
                    return Ok(Self {
                        root,
                        mode: WatchMode::PushActive,
                        shared,
                        worker: Some(worker),
                        backend: Some(backend),
                    });
                }
                Err(err) => {
                    // Recovered locally: fall through to polling.
                    if options.verbose > 0 {
                        eprintln!("impjs.watch push unavailable, polling: {err:#}");
                    }
                }
            }
        }

        if options.verbose > 0 {
            eprintln!(
                "impjs.watch start root={} backend=poll interval={}ms",
                root.to_string_lossy(),
                options.poll_interval.as_millis()
            );
        }
        let seed: HashMap<String, u64> = enumerate(&root, &filter)?.into_iter().collect();
        shared.index.upsert(seed.clone());
        let worker = spawn_poll_loop(
            root.clone(),
            Arc::clone(&shared),
            filter,
            seed,
            options.poll_interval,
            options.verbose,
        );
        Ok(Self {
            root,
            mode: WatchMode::Polling,
            shared,
            worker: Some(worker),
            backend: None,
        })
    }

    /// Handle onto the index this watcher maintains.
    pub fn index(&self) -> FileIndex {
        self.shared.index.clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// Current health: the operating mode, or the surfaced failure.
    pub fn status(&self) -> Result<WatchMode, WatchError> {
        let error = self
            .shared
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match error.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(self.mode),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        // Dropping the backend tears down the subscription and disconnects
        // the event channel, unblocking the worker.
        self.backend.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Enumerate all indexable files under `root`: `(normalized path, mtime ms)`.
pub fn enumerate(root: &Path, filter: &PathFilter) -> Result<Vec<(String, u64)>> {
    let mut out = Vec::new();

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !EXCLUDED_DIRS.contains(&name))
                .unwrap_or(true)
        });

    for entry in builder.build() {
        let entry = match entry {
            Ok(value) => value,
            Err(_) => continue,
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Some(rel) = paths::normalize(root, entry.path()) else {
            continue;
        };
        if !filter.admits(&rel) {
            continue;
        }
        let mtime = entry
            .metadata()
            .ok()
            .map(|md| mtime_ms(&md))
            .unwrap_or(0);
        out.push((rel, mtime));
    }

    Ok(out)
}

fn mtime_ms(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn try_push(
    root: &Path,
) -> Result<(RecommendedWatcher, Receiver<notify::Result<notify::Event>>)> {
    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
    let mut backend = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("Failed to create filesystem watcher")?;
    backend
        .watch(root, RecursiveMode::Recursive)
        .context("Failed to watch project directory")?;
    Ok((backend, rx))
}

fn spawn_push_loop(
    root: PathBuf,
    shared: Arc<Shared>,
    filter: PathFilter,
    events: Receiver<notify::Result<notify::Event>>,
    verbose: u8,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if shared.stop.load(Ordering::SeqCst) {
            return;
        }
        match events.recv_timeout(STOP_POLL) {
            Ok(Ok(event)) => {
                let mut batch = event.paths;
                // Fold immediately pending events into the same batch.
                while let Ok(Ok(more)) = events.try_recv() {
                    batch.extend(more.paths);
                }
                let (added, removed) = classify_paths(&root, &filter, &batch);
                if added.is_empty() && removed.is_empty() {
                    continue;
                }
                if verbose > 0 {
                    eprintln!(
                        "impjs.watch batch added={} removed={}",
                        added.len(),
                        removed.len()
                    );
                }
                shared.index.apply_batch(added, removed);
            }
            Ok(Err(err)) => {
                if verbose > 0 {
                    eprintln!("impjs.watch event error: {err}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if !shared.stop.load(Ordering::SeqCst) {
                    let mut slot = shared
                        .error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    *slot = Some(WatchError::SubscriptionLost(
                        "event channel disconnected".into(),
                    ));
                    if verbose > 0 {
                        eprintln!("impjs.watch subscription lost");
                    }
                }
                return;
            }
        }
    })
}

/// Turn one push batch of touched paths into grouped add/remove facts.
/// A path that still stats as a file is an add/update; a path that no longer
/// exists is a remove; directories are dropped (their children arrive as
/// their own events).
fn classify_paths(
    root: &Path,
    filter: &PathFilter,
    batch: &[PathBuf],
) -> (Vec<(String, u64)>, Vec<String>) {
    let mut added: Vec<(String, u64)> = Vec::new();
    let mut removed: Vec<String> = Vec::new();

    for path in batch {
        let Some(rel) = paths::normalize(root, path) else {
            continue;
        };
        if !filter.admits(&rel) {
            continue;
        }
        match fs::metadata(path) {
            Ok(md) if md.is_file() => added.push((rel, mtime_ms(&md))),
            Ok(_) => {}
            Err(_) => removed.push(rel),
        }
    }

    (added, removed)
}

fn spawn_poll_loop(
    root: PathBuf,
    shared: Arc<Shared>,
    filter: PathFilter,
    mut known: HashMap<String, u64>,
    interval: Duration,
    verbose: u8,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        // Interval sleep, sliced so stop() is honored promptly.
        let deadline = Instant::now() + interval;
        while Instant::now() < deadline {
            if shared.stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(STOP_POLL.min(interval));
        }
        if shared.stop.load(Ordering::SeqCst) {
            return;
        }

        let current = match enumerate(&root, &filter) {
            Ok(entries) => entries.into_iter().collect::<HashMap<String, u64>>(),
            Err(err) => {
                if verbose > 0 {
                    eprintln!("impjs.watch poll error: {err:#}");
                }
                continue;
            }
        };

        let added: Vec<(String, u64)> = current
            .iter()
            .filter(|&(path, mtime)| known.get(path) != Some(mtime))
            .map(|(path, mtime)| (path.clone(), *mtime))
            .collect();
        let removed: Vec<String> = known
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned()
            .collect();

        if !added.is_empty() || !removed.is_empty() {
            if verbose > 0 {
                eprintln!(
                    "impjs.watch poll batch added={} removed={}",
                    added.len(),
                    removed.len()
                );
            }
            shared.index.apply_batch(added, removed);
        }
        known = current;
    })
}
