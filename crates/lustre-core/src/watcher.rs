//! File watcher for the catalog export. Fires when the file is rewritten.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify_debouncer_mini::notify;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tracing::{debug, warn};

const DEBOUNCE: Duration = Duration::from_millis(400);

/// Watches the directory holding `catalog` and calls `on_change` (debounced)
/// whenever the catalog file itself is touched. Editors and exporters often
/// replace the file by rename, so the parent directory is what gets watched.
///
/// Blocks until the process is stopped (e.g. Ctrl+C). Returns Err on setup failure.
pub fn watch_catalog(
    catalog: &Path,
    on_change: impl Fn(&Path) + Send + 'static,
) -> Result<(), WatchError> {
    if !catalog.is_file() {
        return Err(WatchError::NotAFile(catalog.to_path_buf()));
    }
    let catalog = catalog.canonicalize().map_err(WatchError::Canonicalize)?;
    let dir = catalog
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| WatchError::NotAFile(catalog.clone()))?;
    let target = catalog.clone();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            if events.iter().any(|e| is_same_file(&e.path, &target)) {
                debug!(target: "lustre::watch", path = %target.display(), "catalog changed");
                on_change(&target);
            }
        }
        Err(e) => warn!(target: "lustre::watch", error = %e, "watcher error"),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&dir, notify::RecursiveMode::NonRecursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;
    debug!(target: "lustre::watch", dir = %dir.display(), "watching");

    let (_tx, rx) = mpsc::channel::<()>();
    rx.recv().ok();
    Ok(())
}

fn is_same_file(event: &Path, target: &Path) -> bool {
    event == target || event.file_name() == target.file_name()
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}
