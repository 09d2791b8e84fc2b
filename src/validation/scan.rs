//! Project tree scanning shared by the contract-aware levels

use crate::validation::diagnostics::{ContractDeclaration, ContractPatternParser, DiagnosticParser};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files under `root` accepted by `accept`, relative to `root`, sorted.
///
/// Directories named in `excluded_dirs` are not descended into.
pub fn collect_files<F>(root: &Path, excluded_dirs: &[String], accept: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|entry| {
        entry.depth() == 0
            || !entry.file_type().is_dir()
            || !excluded_dirs
                .iter()
                .any(|excluded| entry.file_name().to_string_lossy() == excluded.as_str())
    }) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        if accept(&relative) {
            files.push(relative);
        }
    }
    files.sort();
    Ok(files)
}

/// Controller sources: `*<suffix>` files whose path does not mention `health`
pub fn controller_files(
    root: &Path,
    suffix: &str,
    excluded_dirs: &[String],
) -> Result<Vec<PathBuf>> {
    collect_files(root, excluded_dirs, |relative| {
        let display = relative.to_string_lossy();
        display.ends_with(suffix) && !display.contains("health")
    })
}

/// Contract declarations of one file, tagged with its relative path
#[derive(Debug, Clone)]
pub struct FileDeclarations {
    pub file: String,
    pub declarations: Vec<ContractDeclaration>,
}

/// Read and parse every file in `files` (relative to `root`)
pub async fn scan_declarations(
    root: &Path,
    files: &[PathBuf],
    parser: ContractPatternParser,
) -> Result<Vec<FileDeclarations>> {
    let mut scanned = Vec::with_capacity(files.len());
    for relative in files {
        let path = root.join(relative);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        scanned.push(FileDeclarations {
            file: relative.to_string_lossy().replace('\\', "/"),
            declarations: parser.parse(&content),
        });
    }
    Ok(scanned)
}

/// Distinct declared patterns across files, first occurrence first
pub fn distinct_patterns(scanned: &[FileDeclarations]) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::new();
    for declaration in scanned.iter().flat_map(|file| &file.declarations) {
        if !patterns.contains(&declaration.pattern) {
            patterns.push(declaration.pattern.clone());
        }
    }
    patterns
}
