//! A single directory watch: event loop, debounce timers, supervision.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher,
    RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::dialect::{self, DialectKind};
use crate::error::WatchError;
use crate::ingest::Ingestor;
use crate::Result;

/// Floor for the debounce delay. Recorders write files in bursts; anything
/// shorter risks ingesting a half-written recording.
const MIN_DELAY_MS: u64 = 2000;

/// Scan interval for the polling backend.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

type EventStream = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Non-persisted runtime state, guarded by one mutex.
#[derive(Default)]
struct RuntimeState {
    /// Directories currently subscribed in the backend.
    dirs: HashSet<PathBuf>,
    /// Pending debounce timers, keyed by path.
    timers: HashMap<PathBuf, JoinHandle<()>>,
}

/// One watched directory and its ingestion settings.
///
/// The configuration fields are persisted; the runtime state is rebuilt on
/// every start. A stopped watch has no backend handle.
pub struct Dirwatch {
    /// Database id; `None` until first persisted.
    pub id: Option<u32>,
    /// Directory to observe.
    pub directory: PathBuf,
    /// Recording-tool convention for this watch.
    pub kind: DialectKind,
    /// Audio extension without the leading dot; dialect default when `None`.
    pub extension: Option<String>,
    /// Filename mask, consulted only by the default dialect.
    pub mask: Option<String>,
    /// Default frequency in hertz applied to calls.
    pub frequency: Option<u64>,
    /// Default system id applied when the dialect leaves it unset.
    pub system_id: Option<u32>,
    /// Default talkgroup id applied when the dialect leaves it unset.
    pub talkgroup_id: Option<u32>,
    /// Debounce delay in milliseconds, clamped to a 2000 ms floor.
    pub delay: Option<u32>,
    /// Remove files once ingested.
    pub delete_after: bool,
    /// Skip this watch entirely.
    pub disabled: bool,
    /// Use the periodic-scan backend instead of native notifications.
    pub use_polling: bool,
    /// Cosmetic ordering in the admin surface.
    pub order: Option<u32>,

    state: Mutex<RuntimeState>,
    watcher: Mutex<Option<Box<dyn Watcher + Send>>>,
}

impl Dirwatch {
    /// Create a watch over `directory` with default settings.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            directory: directory.into(),
            kind: DialectKind::Default,
            extension: None,
            mask: None,
            frequency: None,
            system_id: None,
            talkgroup_id: None,
            delay: None,
            delete_after: false,
            disabled: false,
            use_polling: false,
            order: None,
            state: Mutex::new(RuntimeState::default()),
            watcher: Mutex::new(None),
        }
    }

    /// The audio extension for this watch, or the dialect default.
    #[must_use]
    pub fn audio_extension<'a>(&'a self, default: &'a str) -> &'a str {
        match self.extension.as_deref() {
            Some(ext) if !ext.is_empty() => ext,
            _ => default,
        }
    }

    /// The debounce delay with the 2000 ms floor applied.
    #[must_use]
    pub fn effective_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.delay.unwrap_or(0)).max(MIN_DELAY_MS))
    }

    /// Whether this watch currently has a running backend.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Start the watch: create the backend and spawn the supervisor task.
    ///
    /// A disabled watch starts as a no-op. The initial scan (which sweeps
    /// files already present when `delete_after` is set) runs once per
    /// supervisor iteration, after an initial sleep of the debounce delay.
    ///
    /// # Errors
    ///
    /// Returns an error when the watch is already started, the directory is
    /// missing, or the backend cannot be created.
    pub fn start(self: Arc<Self>, ingestor: &Arc<Ingestor>) -> Result<()> {
        if self.disabled {
            return Ok(());
        }

        if self.is_running() {
            return Err(
                WatchError::AlreadyStarted(self.directory.display().to_string()).into(),
            );
        }

        if !self.directory.is_dir() {
            return Err(WatchError::WatchFailed {
                path: self.directory.display().to_string(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.make_backend(tx)?;
        *self.watcher.lock() = Some(backend);

        tracing::info!(
            directory = %self.directory.display(),
            kind = self.kind.as_str(),
            polling = self.use_polling,
            "watch started"
        );

        tokio::spawn(supervise(self, Arc::clone(ingestor), rx));

        Ok(())
    }

    /// Stop the watch.
    ///
    /// Takes the backend handle out before dropping it, so the supervisor
    /// observes the stopped state and skips its restart branch. Pending
    /// debounce timers are not cancelled here; each one re-checks file
    /// existence when it fires.
    pub fn stop(&self) {
        let backend = self.watcher.lock().take();
        drop(backend);
    }

    /// Create the notify backend, native or polling.
    fn make_backend(
        &self,
        tx: mpsc::UnboundedSender<notify::Result<Event>>,
    ) -> Result<Box<dyn Watcher + Send>> {
        let handler = move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        };

        let backend: Box<dyn Watcher + Send> = if self.use_polling {
            let config = NotifyConfig::default().with_poll_interval(POLL_INTERVAL);
            Box::new(
                PollWatcher::new(handler, config)
                    .map_err(|e| WatchError::Backend(e.to_string()))?,
            )
        } else {
            Box::new(
                RecommendedWatcher::new(handler, NotifyConfig::default())
                    .map_err(|e| WatchError::Backend(e.to_string()))?,
            )
        };

        Ok(backend)
    }

    /// Subscribe to a directory and every directory below it.
    fn track_tree(&self, root: &Path) {
        for entry in WalkDir::new(root) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => self.track_dir(entry.path()),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        directory = %root.display(),
                        error = %err,
                        "error walking directory"
                    );
                }
            }
        }
    }

    /// Subscribe to one directory, idempotently.
    fn track_dir(&self, dir: &Path) {
        {
            let mut state = self.state.lock();
            if !state.dirs.insert(dir.to_path_buf()) {
                return;
            }
        }

        let mut guard = self.watcher.lock();
        if let Some(backend) = guard.as_mut() {
            if let Err(err) = backend.watch(dir, RecursiveMode::NonRecursive) {
                tracing::warn!(directory = %dir.display(), error = %err, "failed to subscribe");
            }
        }
    }

    /// Drop the subscription for a removed directory.
    fn untrack_dir(&self, path: &Path) {
        {
            let mut state = self.state.lock();
            if !state.dirs.remove(path) {
                return;
            }
        }

        let mut guard = self.watcher.lock();
        if let Some(backend) = guard.as_mut() {
            if let Err(err) = backend.unwatch(path) {
                tracing::warn!(directory = %path.display(), error = %err, "failed to unsubscribe");
            }
        }
    }

    /// Abort and forget every pending debounce timer.
    fn cancel_timers(&self) {
        let mut state = self.state.lock();
        for (_, handle) in state.timers.drain() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Dirwatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dirwatch")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("kind", &self.kind)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

/// Supervisor: runs the event loop, and restarts it with a fresh backend
/// unless the watch was explicitly stopped. Pending timers are cancelled on
/// every exit path.
async fn supervise(watch: Arc<Dirwatch>, ingestor: Arc<Ingestor>, mut rx: EventStream) {
    loop {
        let scan = tokio::spawn(initial_scan(Arc::clone(&watch), Arc::clone(&ingestor)));

        run_event_loop(&watch, &ingestor, &mut rx).await;

        scan.abort();
        watch.cancel_timers();
        watch.state.lock().dirs.clear();

        if !watch.is_running() {
            tracing::info!(directory = %watch.directory.display(), "watch stopped");
            return;
        }

        tracing::warn!(
            directory = %watch.directory.display(),
            "watch event loop ended unexpectedly, restarting"
        );

        let (tx, new_rx) = mpsc::unbounded_channel();
        match watch.make_backend(tx) {
            Ok(backend) => {
                *watch.watcher.lock() = Some(backend);
                rx = new_rx;
            }
            Err(err) => {
                tracing::error!(
                    directory = %watch.directory.display(),
                    error = %err,
                    "failed to recreate watch backend"
                );
                *watch.watcher.lock() = None;
                return;
            }
        }
    }
}

/// Consume events until the backend reports a fatal error or the stream
/// closes (backend dropped by `stop` or by a restart).
async fn run_event_loop(watch: &Arc<Dirwatch>, ingestor: &Arc<Ingestor>, rx: &mut EventStream) {
    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) => dispatch(watch, ingestor, event),
            Err(err) => {
                tracing::error!(
                    directory = %watch.directory.display(),
                    error = %err,
                    "watch backend error"
                );
                return;
            }
        }
    }
}

/// Dispatch one filesystem event.
fn dispatch(watch: &Arc<Dirwatch>, ingestor: &Arc<Ingestor>, event: Event) {
    match event.kind {
        EventKind::Create(_) => {
            for path in event.paths {
                if path.is_dir() {
                    watch.track_tree(&path);
                } else {
                    schedule(watch, ingestor, path);
                }
            }
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            for path in event.paths {
                if !path.is_dir() {
                    schedule(watch, ingestor, path);
                }
            }
        }
        EventKind::Remove(_) => {
            for path in event.paths {
                watch.untrack_dir(&path);
            }
        }
        _ => {}
    }
}

/// Start or reset the debounce timer for a path.
///
/// The timer fires the dialect ingester once, the debounce delay after the
/// last event. The firing task removes its own map entry before ingesting,
/// so each path holds at most one timer slot.
fn schedule(watch: &Arc<Dirwatch>, ingestor: &Arc<Ingestor>, path: PathBuf) {
    let delay = watch.effective_delay();
    let task_watch = Arc::clone(watch);
    let task_ingestor = Arc::clone(ingestor);
    let key = path.clone();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task_watch.state.lock().timers.remove(&key);

        if key.exists() {
            if let Err(err) = dialect::ingest(&task_watch, &task_ingestor, &key).await {
                tracing::warn!(path = %key.display(), error = %err, "ingest failed");
            }
        }
    });

    let mut state = watch.state.lock();
    if let Some(old) = state.timers.insert(path, handle) {
        old.abort();
    }
}

/// One-time sweep after start: subscribe every directory in the tree, and
/// ingest files already present when `delete_after` is set (recordings
/// deposited while the server was down). Pre-existing files are otherwise
/// left alone.
async fn initial_scan(watch: Arc<Dirwatch>, ingestor: Arc<Ingestor>) {
    tokio::time::sleep(watch.effective_delay()).await;

    let root = watch.directory.clone();
    let entries = tokio::task::spawn_blocking(move || {
        let mut entries = Vec::new();
        for entry in WalkDir::new(&root) {
            match entry {
                Ok(entry) => {
                    entries.push((entry.path().to_path_buf(), entry.file_type().is_dir()));
                }
                Err(err) => {
                    tracing::warn!(directory = %root.display(), error = %err, "scan error");
                }
            }
        }
        entries
    })
    .await
    .unwrap_or_default();

    for (path, is_dir) in entries {
        if is_dir {
            watch.track_dir(&path);
        } else if watch.delete_after {
            if let Err(err) = dialect::ingest(&watch, &ingestor, &path).await {
                tracing::warn!(path = %path.display(), error = %err, "ingest failed");
            }
        }
    }
}
