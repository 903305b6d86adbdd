use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::reader::GtsReader;

const EXCLUDE_LIST: &[&str] = &["node_modules", "dist", "build"];
const VALID_EXTENSIONS: &[&str] = &["json", "jsonc", "gts", "yaml", "yml"];

/// Reads GTS artifacts from files and directories. Directories are walked
/// recursively; `.json`, `.jsonc`, `.gts`, `.yaml` and `.yml` files are
/// decoded, and a top-level array becomes one document per element.
pub struct FilesReader {
    paths: Vec<PathBuf>,
    files: Vec<PathBuf>,
    initialized: bool,
}

impl FilesReader {
    #[must_use]
    pub fn new(paths: &[String]) -> Self {
        let paths = paths
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
            .collect();
        FilesReader {
            paths,
            files: Vec::new(),
            initialized: false,
        }
    }

    fn has_valid_extension(path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| VALID_EXTENSIONS.contains(&ext.as_str()))
    }

    fn collect_files(&mut self) {
        let mut seen = HashSet::new();
        let mut collected = Vec::new();

        for path in &self.paths {
            let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
            if resolved.is_file() {
                if Self::has_valid_extension(&resolved)
                    && seen.insert(resolved.to_string_lossy().to_string())
                {
                    tracing::debug!("discovered file: {:?}", resolved);
                    collected.push(resolved);
                }
            } else if resolved.is_dir() {
                let walker = WalkDir::new(&resolved)
                    .follow_links(true)
                    .into_iter()
                    .filter_entry(|entry| {
                        !(entry.path().is_dir()
                            && entry
                                .path()
                                .file_name()
                                .is_some_and(|n| EXCLUDE_LIST.contains(&n.to_string_lossy().as_ref())))
                    });
                for entry in walker.flatten() {
                    let path = entry.path();
                    if path.is_file() && Self::has_valid_extension(path) {
                        let canonical = path
                            .canonicalize()
                            .unwrap_or_else(|_| path.to_path_buf())
                            .to_string_lossy()
                            .to_string();
                        if seen.insert(canonical.clone()) {
                            tracing::debug!("discovered file: {:?}", path);
                            collected.push(PathBuf::from(canonical));
                        }
                    }
                }
            }
        }

        self.files = collected;
    }

    /// Drops `//` line comments outside of string literals, for `.jsonc` and
    /// `.gts` files.
    fn strip_line_comments(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut in_string = false;
        let mut escaped = false;
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            if in_string {
                out.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            match ch {
                '"' => {
                    in_string = true;
                    out.push(ch);
                }
                '/' if chars.peek() == Some(&'/') => {
                    for skipped in chars.by_ref() {
                        if skipped == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                _ => out.push(ch),
            }
        }
        out
    }

    fn load_document(path: &Path) -> Result<Value, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let value = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| e.to_string())?,
            "jsonc" | "gts" => {
                serde_json::from_str(&Self::strip_line_comments(&content))
                    .map_err(|e| e.to_string())?
            }
            _ => serde_json::from_str(&content).map_err(|e| e.to_string())?,
        };
        Ok(value)
    }

    fn process_file(path: &Path) -> Vec<(String, Value)> {
        let name = path.to_string_lossy().to_string();
        match Self::load_document(path) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| (format!("{name}#{idx}"), item))
                .collect(),
            Ok(document) => vec![(name, document)],
            Err(e) => {
                tracing::warn!("failed to parse {:?}: {}", path, e);
                Vec::new()
            }
        }
    }
}

impl GtsReader for FilesReader {
    fn documents(&mut self) -> Box<dyn Iterator<Item = (String, Value)> + '_> {
        if !self.initialized {
            self.collect_files();
            self.initialized = true;
        }
        tracing::debug!("processing {} files from {:?}", self.files.len(), self.paths);
        let documents: Vec<(String, Value)> = self
            .files
            .iter()
            .flat_map(|path| Self::process_file(path))
            .collect();
        Box::new(documents.into_iter())
    }
}
