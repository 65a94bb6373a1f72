//! Report file storage: the previous report is the only persisted state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::history::History;
use crate::report::extract_history;

/// Load the history embedded in the report at `path`.
///
/// A missing file, a report without a history block or a block that does not
/// decode all start a fresh history; none of them fail the run.
pub fn load_history(path: &Path) -> History {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no previous report, starting fresh history");
            return History::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read previous report, starting fresh history");
            return History::new();
        }
    };

    let Some(json) = extract_history(&content) else {
        warn!(path = %path.display(), "previous report has no history block, starting fresh history");
        return History::new();
    };

    match History::from_json(json) {
        Ok(history) => {
            info!(path = %path.display(), runs = history.len(), "loaded history");
            history
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "history block unreadable, starting fresh history");
            History::new()
        }
    }
}

/// Write the report through a sibling temp file and a rename, so readers never
/// see a half-written report.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    }

    let tmp = temp_path(path);
    std::fs::write(&tmp, contents)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move report into place at {}", path.display()))?;

    info!(path = %path.display(), bytes = contents.len(), "report written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "report".into());
    name.push(".tmp");
    path.with_file_name(name)
}
