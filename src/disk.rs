//! Filesystem helpers shared by parsing, updating and asset seeding

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Version-control metadata directories never treated as scheme content
pub const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

pub fn ensure_directory_exists(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write atomically (write-then-rename), creating parent directories
pub fn save_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path(path);
    fs::write(&temp, contents)?;
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    Ok(())
}

pub fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    let contents = fs::read(src)?;
    save_file(dest, &contents)
}

/// Recursively copy `src` into `dest`, overwriting existing files
pub fn copy_directory(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_vcs_dir(name: &str) -> bool {
    VCS_DIRS.contains(&name)
}

/// Immediate subdirectories of `dir` in name order, skipping VCS metadata
pub fn subfolders(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut folders = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_vcs_dir(&name) {
            continue;
        }
        folders.push((name, entry.into_path()));
    }
    Ok(folders)
}

/// Regular files directly inside `dir` in name order
pub fn files(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push((name, entry.into_path()));
        }
    }
    Ok(out)
}
