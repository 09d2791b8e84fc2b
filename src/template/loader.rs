//! Markdown template loading with an LRU parse cache
//!
//! Templates are markdown documents; only fenced code blocks whose language
//! tag is accepted are kept. Parsed templates are cached by relative path.
//! Thread-safe with parking_lot RwLock, atomic counters for hit/miss stats.

use crate::error::TemplateError;
use crate::metrics::METRICS;
use crate::template::substitution::{SubstitutionResult, TemplateVariables, substitute};
use lru::LruCache;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Language tags whose blocks are extracted. Untagged fences are accepted too.
pub const ACCEPTED_LANGUAGES: &[&str] = &["typescript", "ts", "javascript", "js"];

/// File extensions recognised by [`TemplateLoader::load_directory`]
pub const TEMPLATE_EXTENSIONS: &[&str] = &["mdx", "md"];

const DEFAULT_CACHE_CAPACITY: usize = 128;

static CODE_BLOCK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([\w+.-]*)[ \t]*\r?\n(.*?)```").expect("code block pattern compiles")
});

/// One fenced code block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    /// Language tag, empty for untagged fences
    pub language: String,
    pub body: String,
}

/// A parsed markdown template
#[derive(Debug)]
pub struct Template {
    path: PathBuf,
    raw: String,
    blocks: Vec<CodeBlock>,
    code: OnceCell<String>,
}

impl Template {
    /// Parse markdown text. Fails when no accepted code block is present.
    pub fn parse(path: impl Into<PathBuf>, raw: String) -> Result<Self, TemplateError> {
        let path = path.into();
        let blocks = extract_code_blocks(&raw);
        if blocks.is_empty() {
            return Err(TemplateError::ParseEmpty { path });
        }
        Ok(Self {
            path,
            raw,
            blocks,
            code: OnceCell::new(),
        })
    }

    /// Path relative to the loader root
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    /// All block bodies joined by a blank line, in document order
    pub fn code(&self) -> &str {
        self.code.get_or_init(|| {
            self.blocks
                .iter()
                .map(|block| block.body.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
    }

    pub fn render(&self, variables: &TemplateVariables) -> SubstitutionResult {
        substitute(self.code(), variables)
    }
}

/// Extract accepted fenced code blocks in document order
pub fn extract_code_blocks(markdown: &str) -> Vec<CodeBlock> {
    CODE_BLOCK_PATTERN
        .captures_iter(markdown)
        .filter_map(|caps| {
            let language = caps[1].to_ascii_lowercase();
            let accepted =
                language.is_empty() || ACCEPTED_LANGUAGES.contains(&language.as_str());
            accepted.then(|| CodeBlock {
                language,
                body: caps[2].trim().to_string(),
            })
        })
        .collect()
}

/// Options for a single load
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub use_cache: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

impl LoadOptions {
    pub fn uncached() -> Self {
        Self { use_cache: false }
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Loads templates relative to a root directory
pub struct TemplateLoader {
    root: PathBuf,
    cache: RwLock<LruCache<PathBuf, Arc<Template>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TemplateLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_capacity(root, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let root = root.into();
        tracing::debug!(root = %root.display(), capacity = capacity.get(), "template loader created");
        Self {
            root,
            cache: RwLock::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load and parse the template at `relative` (relative to the root)
    pub fn load(
        &self,
        relative: impl AsRef<Path>,
        options: LoadOptions,
    ) -> Result<Arc<Template>, TemplateError> {
        let relative = normalize_relative(relative.as_ref())?;

        if options.use_cache {
            if let Some(template) = self.cache.write().get(&relative) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                METRICS.record_template_cache(true);
                tracing::debug!(template = %relative.display(), "template cache hit");
                return Ok(Arc::clone(template));
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            METRICS.record_template_cache(false);
        }

        let full_path = self.root.join(&relative);
        if !full_path.is_file() {
            return Err(TemplateError::NotFound { path: relative });
        }

        let raw = fs::read_to_string(&full_path).map_err(|source| TemplateError::Read {
            path: relative.clone(),
            source,
        })?;
        let template = Arc::new(Template::parse(relative.clone(), raw)?);

        tracing::debug!(
            template = %relative.display(),
            blocks = template.blocks().len(),
            "template loaded"
        );

        if options.use_cache {
            self.cache.write().put(relative, Arc::clone(&template));
        }
        Ok(template)
    }

    /// Load and render in one step
    pub fn load_and_substitute(
        &self,
        relative: impl AsRef<Path>,
        variables: &TemplateVariables,
        options: LoadOptions,
    ) -> Result<SubstitutionResult, TemplateError> {
        let template = self.load(relative, options)?;
        Ok(template.render(variables))
    }

    /// Load every template file in `dir`, keyed by file name without extension
    pub fn load_directory(
        &self,
        dir: impl AsRef<Path>,
    ) -> Result<BTreeMap<String, Arc<Template>>, TemplateError> {
        let dir = normalize_relative(dir.as_ref())?;
        let full_dir = self.root.join(&dir);
        let entries = fs::read_dir(&full_dir).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                TemplateError::NotFound { path: dir.clone() }
            } else {
                TemplateError::Read {
                    path: dir.clone(),
                    source,
                }
            }
        })?;

        let mut templates = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| TemplateError::Read {
                path: dir.clone(),
                source,
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(key) = strip_template_extension(&file_name) else {
                continue;
            };
            if !entry.path().is_file() {
                continue;
            }
            let template = self.load(dir.join(&file_name), LoadOptions::default())?;
            templates.insert(key.to_string(), template);
        }

        tracing::debug!(dir = %dir.display(), count = templates.len(), "templates loaded from directory");
        Ok(templates)
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
        tracing::info!("template cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.read();
        CacheStats {
            size: cache.len(),
            capacity: cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn strip_template_extension(file_name: &str) -> Option<&str> {
    TEMPLATE_EXTENSIONS.iter().find_map(|ext| {
        file_name
            .strip_suffix(ext)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
    })
}

/// Reject absolute paths and parent traversal, drop `.` components
fn normalize_relative(path: &Path) -> Result<PathBuf, TemplateError> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(TemplateError::InvalidPath {
                    path: path.to_path_buf(),
                });
            }
        }
    }
    Ok(normalized)
}
