//! Files a notebook declares as belonging to it.
//!
//! Markdown cells list associated files either inside an
//! `<!--associate: ... -->` comment or inside a fenced code block. Each line
//! is a pattern relative to the notebook's directory:
//!
//! - `data.csv`, `*.png`: shell glob in the notebook directory
//! - `!secret.csv`: exclude matches
//! - `assets/`: everything under a directory
//! - `img/**.svg`: prefix/suffix match across directories
//! - `img/*.svg`: glob over the relative path; `*` also crosses `/`
//!
//! Lines containing `../` or starting with `#` are ignored.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::errors::BundleError;

const ASSOCIATE_OPEN: &str = "<!--associate:";
const FENCE: &str = "```";

#[derive(Debug, Deserialize)]
struct NotebookDoc {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// nbformat v4 stores source either as one string or a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Text(String),
    Lines(Vec<String>),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn joined(&self) -> String {
        match self {
            CellSource::Text(s) => s.clone(),
            CellSource::Lines(lines) => lines.concat(),
        }
    }
}

/// Raw reference patterns declared across all markdown cells.
pub fn references(notebook_path: &Path) -> Result<Vec<String>, BundleError> {
    let content =
        std::fs::read_to_string(notebook_path).map_err(|e| BundleError::io(notebook_path, e))?;
    let doc: NotebookDoc =
        serde_json::from_str(&content).map_err(|e| BundleError::NotebookParse {
            path: notebook_path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(doc
        .cells
        .iter()
        .filter(|c| c.cell_type.starts_with("markdown"))
        .flat_map(|c| cell_references(&c.source.joined()))
        .collect())
}

fn cell_references(source: &str) -> Vec<String> {
    let (lines, terminator) = if let Some(rest) = source.strip_prefix(ASSOCIATE_OPEN) {
        (rest, "-->")
    } else if let Some(offset) = source.find(FENCE) {
        (&source[offset + FENCE.len()..], FENCE)
    } else {
        return Vec::new();
    };

    lines
        .lines()
        .take_while(|line| !line.starts_with(terminator))
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.contains("../") && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Expand the notebook's references into concrete relative file paths.
pub fn referenced_files(notebook_path: &Path) -> Result<BTreeSet<PathBuf>, BundleError> {
    let dir = notebook_path.parent().unwrap_or_else(|| Path::new("."));
    let patterns = references(notebook_path)?;
    Ok(expand(dir, &patterns))
}

/// Resolve patterns against `dir`.
pub fn expand(dir: &Path, patterns: &[String]) -> BTreeSet<PathBuf> {
    let mut included = BTreeSet::new();
    let mut excluded = BTreeSet::new();
    let mut must_walk = Vec::new();

    for pattern in patterns.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        if pattern.contains('/') {
            must_walk.push(pattern);
            continue;
        }
        let (target, raw) = match pattern.strip_prefix('!') {
            Some(rest) => (&mut excluded, rest),
            None => (&mut included, pattern),
        };
        let full = dir.join(raw).to_string_lossy().into_owned();
        if let Ok(paths) = glob::glob(&full) {
            for path in paths.flatten() {
                if let Ok(rel) = path.strip_prefix(dir) {
                    target.insert(rel.to_path_buf());
                }
            }
        }
    }

    if !must_walk.is_empty() {
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf))
            .collect();

        for pattern in must_walk {
            let (target, test) = match pattern.strip_prefix('!') {
                Some(rest) => (&mut excluded, rest),
                None => (&mut included, pattern),
            };
            for rel in &files {
                if path_matches(test, &rel.to_string_lossy()) {
                    target.insert(rel.clone());
                }
            }
        }
    }

    included.difference(&excluded).cloned().collect()
}

fn path_matches(pattern: &str, rel: &str) -> bool {
    if pattern.ends_with('/') {
        return rel.starts_with(pattern);
    }
    if pattern.contains("**") {
        let ends: Vec<&str> = pattern.split("**").collect();
        return ends.len() == 2 && rel.starts_with(ends[0]) && rel.ends_with(ends[1]);
    }
    glob::Pattern::new(pattern)
        .map(|p| p.matches(rel))
        .unwrap_or(false)
}

/// Copy `files` (relative to `src`) into `dst`, creating parents.
pub fn copy_list(src: &Path, dst: &Path, files: &BTreeSet<PathBuf>) -> Result<(), BundleError> {
    for rel in files {
        let from = src.join(rel);
        if !from.is_file() {
            continue;
        }
        let to = dst.join(rel);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BundleError::io(parent, e))?;
        }
        std::fs::copy(&from, &to).map_err(|e| BundleError::io(&from, e))?;
    }
    Ok(())
}
