//! Filesystem connector.
//!
//! Walks a local directory, applies glob include/exclude patterns, and produces
//! [`SourceItem`]s with filesystem metadata (modification time, file path).
//!
//! # Configuration
//!
//! ```toml
//! [connectors.filesystem]
//! root = "./docs"
//! include_globs = ["**/*.md", "**/*.txt"]
//! exclude_globs = ["**/drafts/**"]
//! follow_symlinks = false
//! ```
//!
//! # Default Excludes
//!
//! The following directories are always excluded regardless of configuration:
//! - `**/.git/**`
//! - `**/target/**`
//! - `**/node_modules/**`
//!
//! # Output
//!
//! Each file becomes a [`SourceItem`] with:
//! - `source`: `"filesystem:<name>"` (e.g. `"filesystem:docs"`)
//! - `source_id`: relative path from root (e.g. `"guides/deploy.md"`)
//! - `source_url`: `file://` URI
//! - `updated_at`: filesystem modification time
//! - `body`: file contents as UTF-8
//!
//! Files that aren't valid UTF-8 are skipped — ingestion only handles
//! plain text and markdown.

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::FilesystemConnectorConfig;
use crate::models::SourceItem;

/// Scan a local directory and produce [`SourceItem`]s.
///
/// Walks the configured `root` directory, applies include/exclude globs,
/// reads each matching file, and returns a sorted list of `SourceItem`s.
///
/// # Arguments
///
/// - `name` — the instance name (e.g. `"docs"`). Used as part of the source
///   identifier: `"filesystem:<name>"`.
/// - `fs_config` — the filesystem connector configuration for this instance.
///
/// # Errors
///
/// Returns an error if:
/// - The root directory does not exist
/// - A glob pattern is invalid
/// - A directory entry cannot be read
pub fn scan_filesystem(
    name: &str,
    fs_config: &FilesystemConnectorConfig,
) -> Result<Vec<SourceItem>> {
    let root = &fs_config.root;
    if !root.exists() {
        bail!(
            "Filesystem connector root does not exist: {}",
            root.display()
        );
    }

    let include_set = build_globset(&fs_config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(fs_config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut items = Vec::new();

    let walker = WalkDir::new(root).follow_links(fs_config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let source_label = format!("filesystem:{}", name);
        if let Some(item) = file_to_source_item(path, &rel_str, &source_label)? {
            items.push(item);
        }
    }

    items.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    Ok(items)
}

/// Convert a single file to a [`SourceItem`], or `None` if it isn't
/// valid UTF-8 text.
fn file_to_source_item(
    path: &Path,
    relative_path: &str,
    source: &str,
) -> Result<Option<SourceItem>> {
    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(_) => return Ok(None),
    };

    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let modified_secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Some(SourceItem {
        source: source.to_string(),
        source_id: relative_path.to_string(),
        source_url: Some(format!("file://{}", path.display())),
        title: Some(title),
        author: None,
        created_at: Utc.timestamp_opt(modified_secs, 0).unwrap(),
        updated_at: Utc.timestamp_opt(modified_secs, 0).unwrap(),
        content_type: "text/plain".to_string(),
        body,
        metadata_json: "{}".to_string(),
        raw_json: None,
    }))
}

/// Build a [`GlobSet`] from a list of glob pattern strings.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesystemConnectorConfig;
    use tempfile::tempdir;

    #[test]
    fn scans_matching_text_files_sorted_by_source_id() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("a.md"), "first").unwrap();
        std::fs::write(dir.path().join("skip.bin"), [0u8, 159, 146, 150]).unwrap();

        let config = FilesystemConnectorConfig {
            root: dir.path().to_path_buf(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        };
        let items = scan_filesystem("docs", &config).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id, "a.md");
        assert_eq!(items[1].source_id, "b.md");
    }

    #[test]
    fn missing_root_is_an_error() {
        let config = FilesystemConnectorConfig {
            root: "/does/not/exist/anywhere".into(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        };
        assert!(scan_filesystem("docs", &config).is_err());
    }
}
