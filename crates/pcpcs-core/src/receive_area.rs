// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed receive directory and collision-safe destination naming.

use std::path::{Path, PathBuf};

use crate::config::RECEIVE_DIR_NAME;

/// Returns the fixed receive directory, creating it if it doesn't exist yet.
pub fn receive_dir() -> std::io::Result<PathBuf> {
    let base = dirs_home().join(RECEIVE_DIR_NAME);
    std::fs::create_dir_all(&base)?;
    Ok(base)
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Finds a destination path under `dir` for `name` that doesn't already exist, appending
/// `_1`, `_2`, ... before the extension (for files) or after the name (for folders) until
/// a free name is found.
///
/// Mirrors the naming scheme a user would expect from drag-and-drop file managers: the
/// first collision becomes `file_1.txt`, the second `file_2.txt`, and so on.
pub fn unique_destination(dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string();
    let ext = path.extension().and_then(|e| e.to_str());

    for n in 1..10_000u32 {
        let candidate_name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = dir.join(&candidate_name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("could not find a free destination name for {name}"),
    ))
}

/// Finds a destination directory path under `dir` for `name` that doesn't already exist,
/// appending `_1`, `_2`, ... after the whole name until a free one is found.
///
/// Unlike [`unique_destination`], the counter is never inserted before an extension: a
/// folder named `project.v2` collides as `project.v2_1`, not `project_1.v2`.
pub fn unique_dir_destination(dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    for n in 1..10_000u32 {
        let candidate = dir.join(format!("{name}_{n}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("could not find a free destination name for {name}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_collision_returns_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        let dest = unique_destination(dir.path(), "report.pdf").unwrap();
        assert_eq!(dest, dir.path().join("report.pdf"));
    }

    #[test]
    fn collision_appends_counter_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"x").unwrap();
        let dest = unique_destination(dir.path(), "report.pdf").unwrap();
        assert_eq!(dest, dir.path().join("report_1.pdf"));
    }

    #[test]
    fn multiple_collisions_increment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("report_1.pdf"), b"x").unwrap();
        let dest = unique_destination(dir.path(), "report.pdf").unwrap();
        assert_eq!(dest, dir.path().join("report_2.pdf"));
    }

    #[test]
    fn extensionless_name_collision() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes"), b"x").unwrap();
        let dest = unique_destination(dir.path(), "notes").unwrap();
        assert_eq!(dest, dir.path().join("notes_1"));
    }

    #[test]
    fn dir_collision_suffixes_whole_name_including_dots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("project.v2")).unwrap();
        let dest = unique_dir_destination(dir.path(), "project.v2").unwrap();
        assert_eq!(dest, dir.path().join("project.v2_1"));
    }

    #[test]
    fn dir_no_collision_returns_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        let dest = unique_dir_destination(dir.path(), "photos").unwrap();
        assert_eq!(dest, dir.path().join("photos"));
    }
}
