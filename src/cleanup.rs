use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Spawn the background sweeper that periodically deletes stale files from
/// the upload spool directory. Upload guards delete their own files; the
/// sweeper only catches files orphaned by a crash mid-request.
pub fn spawn_sweeper(dir: PathBuf, interval_secs: u64, max_age_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match sweep_once(&dir, Duration::from_secs(max_age_secs)) {
                Ok(0) => {}
                Ok(removed) => {
                    debug!(removed, dir = %dir.display(), "Stale upload files removed");
                }
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "Upload sweep failed");
                }
            }
        }
    });
}

/// Delete files in `dir` older than `max_age`. Returns the number removed.
/// A missing directory counts as an empty sweep.
pub fn sweep_once(dir: &Path, max_age: Duration) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries {
        let entry = entry?;
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if matches!(age, Some(age) if age >= max_age) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                // Already gone, likely dropped by a request guard.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(error = %e, path = %entry.path().display(), "Failed to remove stale upload");
                }
            }
        }
    }

    Ok(removed)
}
