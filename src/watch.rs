//! Background refresh of file-backed store layers.
//!
//! Watches the directories that hold the config files a load actually read
//! and, when one of those files changes, re-reads it and swaps its layer in
//! the shared store. Values already decoded into structs are not touched;
//! only later reads of the store see the change.

use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, Debouncer, new_debouncer};
use tracing::{debug, error, info, warn};

use crate::error::ClapwireError;
use crate::file::load_file;
use crate::store::{Layer, SharedStore};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// A file that feeds one store layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub layer: Layer,
}

impl WatchedFile {
    pub fn new(path: impl Into<PathBuf>, layer: Layer) -> Self {
        Self {
            path: path.into(),
            layer,
        }
    }

    /// Does an event on `changed` concern this file? Parents are compared
    /// canonically since watchers may report resolved paths.
    fn is(&self, changed: &Path) -> bool {
        if changed == self.path {
            return true;
        }
        if changed.file_name() != self.path.file_name() {
            return false;
        }
        match (changed.parent(), self.path.parent()) {
            (Some(a), Some(b)) => canonical(a) == canonical(b),
            _ => false,
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Keeps the watcher alive. Dropping it stops watching.
pub struct WatchHandle {
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    worker: Option<JoinHandle<()>>,
    files: Vec<WatchedFile>,
}

impl WatchHandle {
    pub fn files(&self) -> &[WatchedFile] {
        &self.files
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        // Dropping the debouncer closes the channel, which ends the worker.
        self.debouncer.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Start watching `files`, refreshing their layers in `store` on change.
pub fn watch_files(files: Vec<WatchedFile>, store: SharedStore) -> Result<WatchHandle, notify::Error> {
    watch_files_with(files, store, DEFAULT_DEBOUNCE)
}

pub fn watch_files_with(
    files: Vec<WatchedFile>,
    store: SharedStore,
    debounce: Duration,
) -> Result<WatchHandle, notify::Error> {
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(debounce, tx)?;

    let mut dirs: Vec<PathBuf> = files
        .iter()
        .filter_map(|f| f.path.parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();

    for dir in &dirs {
        if dir.is_dir() {
            info!("Watching config directory: {}", dir.display());
            debouncer
                .watcher()
                .watch(dir, notify::RecursiveMode::NonRecursive)?;
        } else {
            warn!("Config directory does not exist, skipping watch: {}", dir.display());
        }
    }

    let watched = files.clone();
    let worker = std::thread::Builder::new()
        .name("clapwire-watch".into())
        .spawn(move || process_events(rx, &watched, &store))
        .map_err(|e| notify::Error::generic(&e.to_string()))?;

    Ok(WatchHandle {
        debouncer: Some(debouncer),
        worker: Some(worker),
        files,
    })
}

fn process_events(rx: mpsc::Receiver<DebounceEventResult>, files: &[WatchedFile], store: &SharedStore) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let mut changed: Vec<&WatchedFile> = Vec::new();
                for event in events {
                    if !matches!(
                        event.kind,
                        DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                    ) {
                        continue;
                    }
                    for file in files.iter().filter(|f| f.is(&event.path)) {
                        if !changed.contains(&file) {
                            changed.push(file);
                        }
                    }
                }
                for file in changed {
                    if let Err(e) = reload_file(file, store) {
                        error!("Keeping previous settings from {}: {}", file.path.display(), e);
                    }
                }
            }
            Ok(Err(e)) => error!("File watcher error: {}", e),
            Err(_) => {
                debug!("Config watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Re-read `file` and replace its layer. A file that has disappeared
/// empties its layer; a file that fails to read or parse leaves the layer
/// as it was.
pub fn reload_file(file: &WatchedFile, store: &SharedStore) -> Result<(), ClapwireError> {
    let loaded = load_file(&file.path)?;
    let mut store = store.write().unwrap_or_else(PoisonError::into_inner);
    match loaded {
        Some(loaded) => {
            info!(
                layer = %file.layer,
                keys = loaded.entries.len(),
                "Reloaded config file {}",
                file.path.display()
            );
            store.set_layer(file.layer, loaded.entries);
        }
        None => {
            info!(layer = %file.layer, "Config file removed: {}", file.path.display());
            store.clear_layer(file.layer);
        }
    }
    Ok(())
}
