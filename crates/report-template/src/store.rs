//! Template storage

use crate::{ReportError, ReportOptions, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable template bytes, shareable across concurrent renders
pub type TemplateBytes = Arc<[u8]>;

/// Kind of report a template produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Word,
    Excel,
}

impl ReportKind {
    /// File extension of templates of this kind
    pub fn extension(self) -> &'static str {
        match self {
            ReportKind::Word => "docx",
            ReportKind::Excel => "xlsx",
        }
    }

    /// Configured subdirectory for templates of this kind
    pub fn subdirectory(self, options: &ReportOptions) -> &str {
        match self {
            ReportKind::Word => &options.word_subdirectory,
            ReportKind::Excel => &options.excel_subdirectory,
        }
    }

    /// Template file name for a template name
    pub fn file_name(self, template_name: &str) -> String {
        format!("{}.{}", template_name, self.extension())
    }
}

/// Resolves template names to template archives
///
/// Lookup tries `<root>/<kind subdirectory>/<name>.<ext>` first and falls
/// back to `<root>/<name>.<ext>`. When caching is enabled the bytes of each
/// loaded template are kept; callers always get an immutable handle and must
/// open their own working copy from it.
#[derive(Debug)]
pub struct TemplateStore {
    root: PathBuf,
    word_subdirectory: String,
    excel_subdirectory: String,
    cache: Option<RwLock<HashMap<PathBuf, TemplateBytes>>>,
}

impl TemplateStore {
    /// Create a store from options
    pub fn new(options: &ReportOptions) -> Self {
        Self {
            root: options.template_root.clone(),
            word_subdirectory: ReportKind::Word.subdirectory(options).to_string(),
            excel_subdirectory: ReportKind::Excel.subdirectory(options).to_string(),
            cache: options
                .cache_templates
                .then(|| RwLock::new(HashMap::new())),
        }
    }

    /// Template storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a template name to an existing file
    pub fn resolve(&self, name: &str, kind: ReportKind) -> Result<PathBuf> {
        let file_name = kind.file_name(name);
        let flat = self.root.join(&file_name);
        let not_found = || ReportError::TemplateNotFound {
            expected_file_name: flat.display().to_string(),
        };

        if !is_plain_name(name) {
            return Err(not_found());
        }

        let subdirectory = match kind {
            ReportKind::Word => &self.word_subdirectory,
            ReportKind::Excel => &self.excel_subdirectory,
        };
        if !subdirectory.is_empty() {
            let nested = self.root.join(subdirectory).join(&file_name);
            if nested.is_file() {
                return Ok(nested);
            }
        }
        if flat.is_file() {
            return Ok(flat);
        }

        Err(not_found())
    }

    /// Load a template's bytes
    pub fn load(&self, name: &str, kind: ReportKind) -> Result<TemplateBytes> {
        let path = self.resolve(name, kind)?;

        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.read().get(&path) {
                tracing::debug!(template = %path.display(), "template cache hit");
                return Ok(Arc::clone(bytes));
            }
        }

        let bytes: TemplateBytes = std::fs::read(&path)
            .map_err(|source| ReportError::TemplateRead {
                path: path.display().to_string(),
                source,
            })?
            .into();

        if let Some(cache) = &self.cache {
            cache.write().insert(path.clone(), Arc::clone(&bytes));
        }
        tracing::debug!(template = %path.display(), size = bytes.len(), "template loaded");
        Ok(bytes)
    }

    /// Drop every cached template
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.write().clear();
        }
    }
}

/// A template name must not walk out of the storage root
fn is_plain_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}
