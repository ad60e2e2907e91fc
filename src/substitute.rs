use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::error::{BootstrapError, Result};
use crate::properties::ResolvedMapping;

/// Read the bundle file list: one target path per line, trailing
/// newline stripped, blank lines ignored.
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path).map_err(|e| {
        BootstrapError::external(format!("reading file list {}", path.display()), e)
    })?;
    // Only the line terminator is stripped; paths keep any other edge
    // whitespace they were written with.
    Ok(content
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Rewrite every listed file in place with the resolved mapping. The
/// first failure aborts; files already rewritten stay rewritten (no
/// rollback).
pub fn apply_to_files(mapping: &ResolvedMapping, files: &[PathBuf]) -> Result<()> {
    for file in files {
        substitute_file(mapping, file)?;
    }
    Ok(())
}

/// Rewrite one target file. Every listed file must exist: a dangling
/// file list entry aborts the run rather than being skipped.
///
/// Processing is line-oriented. Each key is tried against every line in
/// mapping order, and all occurrences of a matching key are replaced,
/// so a line may be rewritten once per matching key. The output goes to
/// a temp file in the target's directory and replaces the original via
/// rename, never leaving a partially written target.
pub fn substitute_file(mapping: &ResolvedMapping, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(BootstrapError::config(format!(
            "file list entry {} does not exist",
            path.display()
        )));
    }
    info!("Bootstrapping {}", path.display());

    let content = fs::read_to_string(path)
        .map_err(|e| BootstrapError::external(format!("reading {}", path.display()), e))?;

    let mut output = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        output.push_str(&substitute_line(mapping, line));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        BootstrapError::external(format!("creating temp file in {}", dir.display()), e)
    })?;
    tmp.write_all(output.as_bytes())
        .map_err(|e| BootstrapError::external(format!("writing {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| BootstrapError::external(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}

fn substitute_line(mapping: &ResolvedMapping, line: &str) -> String {
    let mut line = line.to_string();
    for (key, value) in mapping.entries() {
        if line.contains(key.as_str()) {
            debug!(
                "Replacing {key} with {value} in line: {}",
                line.trim_end_matches(['\n', '\r'])
            );
            line = line.replace(key, value);
        }
    }
    line
}
