//! Script source discovery.
//!
//! Scripts are discovered by walking the scripts folder (subfolders
//! included) for files with the configured extension. The file name is the
//! script's identity, so a name appearing in two subfolders is a conflict:
//! the first match wins and the duplicate is skipped with a warning.

use crate::error::RuntimeResult;
use scriptforge_host_core::ScriptSource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Discover all script sources under `dir` with the given extension
/// (without the leading dot). Results are sorted by file name so discovery
/// order is stable across platforms.
pub fn discover_scripts(dir: &Path, extension: &str) -> RuntimeResult<Vec<ScriptSource>> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut files = Vec::new();

    if dir.is_dir() {
        collect_files(dir, extension, &mut files)?;
    } else {
        debug!("scripts folder {:?} does not exist; nothing to discover", dir);
    }

    files.sort();

    let mut sources = Vec::new();
    for path in files {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        if let Some(existing) = seen.get(&name) {
            warn!(
                "duplicate script file name '{}' at {:?} conflicts with {:?}; skipping",
                name, path, existing
            );
            continue;
        }

        seen.insert(name.clone(), path.clone());
        sources.push(ScriptSource::new(name, path));
    }

    debug!("discovered {} script(s) under {:?}", sources.len(), dir);
    Ok(sources)
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> RuntimeResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(path);
        }
    }
    Ok(())
}
