//! Output collection: walk the output directory for rendered artifacts.

use crate::error::StyleForgeError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Noise directories some archive tools leave behind; never descended into.
const IGNORED_DIRS: &[&str] = &["__MACOSX"];

/// Recursively collect every regular file under `directory`, depth-first,
/// logging the hierarchy as it is discovered. Directories themselves are
/// logged but not collected.
pub fn collect_output_files(directory: &Path) -> Result<Vec<PathBuf>, StyleForgeError> {
    let mut files = Vec::new();
    walk(directory, "", &mut files)?;
    Ok(files)
}

fn walk(directory: &Path, prefix: &str, files: &mut Vec<PathBuf>) -> Result<(), StyleForgeError> {
    let mut entries: Vec<_> = std::fs::read_dir(directory)
        .map_err(|e| StyleForgeError::workspace(directory, e))?
        .collect::<Result<_, _>>()
        .map_err(|e| StyleForgeError::workspace(directory, e))?;
    // read_dir order is platform-dependent; sort for a stable payload order
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_DIRS.contains(&name.as_str()) {
            continue;
        }
        let path = entry.path();
        if path.is_file() {
            info!("{prefix}{name}");
            files.push(path);
        } else if path.is_dir() {
            info!("{prefix}{name}/");
            walk(&path, &format!("{prefix}{name}/"), files)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_files_depth_first_and_skips_noise() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        std::fs::write(root.join("b.png"), b"b").expect("write");
        std::fs::write(root.join("a.png"), b"a").expect("write");
        std::fs::create_dir(root.join("batch")).expect("mkdir");
        std::fs::write(root.join("batch/c.png"), b"c").expect("write");
        std::fs::create_dir(root.join("__MACOSX")).expect("mkdir");
        std::fs::write(root.join("__MACOSX/._junk"), b"j").expect("write");

        let files = collect_output_files(root).expect("collect");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).expect("under root").to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.png", "b.png", "batch/c.png"]);
    }

    #[test]
    fn empty_directory_yields_empty_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(collect_output_files(dir.path()).expect("collect").is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = collect_output_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, StyleForgeError::Workspace { .. }));
    }
}
