// ABOUTME: Filesystem reader sandboxed to a fixed list of search roots.
//! Filesystem reader, sandboxed to a fixed list of search roots via
//! `cap-std` so an included path can never escape them.

use std::path::{Path, PathBuf};

use cap_std::ambient_authority;
use cap_std::fs::Dir;

use crate::error::ReaderError;
use crate::readers::{ParsedPath, Reader};

pub struct LocalReader {
    roots: Vec<Dir>,
}

impl LocalReader {
    pub fn new(search_roots: &[PathBuf]) -> Result<Self, ReaderError> {
        let mut roots = Vec::with_capacity(search_roots.len());
        for root in search_roots {
            std::fs::create_dir_all(root).map_err(|e| ReaderError::Io(e.to_string()))?;
            let dir = Dir::open_ambient_dir(root, ambient_authority())
                .map_err(|e| ReaderError::Io(e.to_string()))?;
            roots.push(dir);
        }
        Ok(LocalReader { roots })
    }
}

fn is_traversal(path: &str) -> bool {
    let p = Path::new(path);
    p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir))
}

impl Reader for LocalReader {
    fn name(&self) -> &'static str {
        "local"
    }

    fn supports(&self, reference: &str) -> bool {
        !reference.starts_with("http://")
            && !reference.starts_with("https://")
            && !super::github::GithubReader::matches(reference)
    }

    fn read(&self, reference: &str) -> Result<String, ReaderError> {
        if is_traversal(reference) {
            return Err(ReaderError::PathTraversal(reference.to_string()));
        }
        for root in &self.roots {
            if let Ok(content) = root.read_to_string(reference) {
                return Ok(content);
            }
        }
        Err(ReaderError::Io(format!(
            "\"{reference}\" was not found under any configured search root"
        )))
    }

    fn parse_path(&self, reference: &str) -> ParsedPath {
        let p = Path::new(reference);
        let file = p
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| reference.to_string());
        let path = p
            .parent()
            .map(|d| d.to_string_lossy().to_string())
            .unwrap_or_default();
        ParsedPath { file, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_paths_are_rejected() {
        assert!(is_traversal("../secret.txt"));
        assert!(is_traversal("/etc/passwd"));
        assert!(!is_traversal("nested/file.txt"));
    }

    #[test]
    fn parse_path_splits_file_and_directory() {
        let reader = LocalReader { roots: vec![] };
        let parsed = reader.parse_path("dir/sub/file.txt");
        assert_eq!(parsed.file, "file.txt");
        assert_eq!(parsed.path, "dir/sub");
    }
}
