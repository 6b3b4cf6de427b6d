use super::ast::{Macro, MacroTable};
use super::error::LegacyResult;
use super::parser::parse_template;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// `#def` blocks shared by every legacy template.
#[derive(Debug, Default)]
pub struct MacroLibrary {
    macros: MacroTable,
}

impl MacroLibrary {
    /// Compiles library source; only its `#def` blocks are kept.
    pub fn parse(source: &str) -> LegacyResult<Self> {
        Ok(Self { macros: parse_template(source)?.macros })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Macro>> {
        self.macros.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Filesystems with coarse timestamps can record the same mtime for two
/// writes this far apart.
const MTIME_GRANULARITY: Duration = Duration::from_secs(2);

struct CachedLibrary {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
    loaded_at: SystemTime,
    source: String,
    library: Arc<MacroLibrary>,
}

impl CachedLibrary {
    fn same_metadata(&self, path: &Path, modified: Option<SystemTime>, len: u64) -> bool {
        self.path == path && self.modified == modified && self.len == len
    }

    /// Metadata alone is trusted only when the file was last written well
    /// before it was cached; a same-size edit inside one mtime tick is
    /// otherwise invisible.
    fn metadata_is_conclusive(&self) -> bool {
        self.modified
            .and_then(|modified| self.loaded_at.duration_since(modified).ok())
            .is_some_and(|age| age >= MTIME_GRANULARITY)
    }
}

/// Holds the last compiled macro library and reloads it when the file
/// changes.
///
/// The lock is held while loading, so concurrent renders wait for a single
/// reader instead of all reading the file.
#[derive(Default)]
pub struct MacroCache {
    slot: Mutex<Option<CachedLibrary>>,
}

impl MacroCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &Path) -> Result<Arc<MacroLibrary>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        let unreadable =
            |source: std::io::Error| Error::ConfigurationError { path: path.display().to_string(), source };
        let metadata = std::fs::metadata(path).map_err(unreadable)?;
        let modified = metadata.modified().ok();
        let len = metadata.len();

        let cached = slot.as_ref().filter(|c| c.same_metadata(path, modified, len));
        if let Some(cached) = cached.filter(|c| c.metadata_is_conclusive()) {
            return Ok(Arc::clone(&cached.library));
        }

        let loaded_at = SystemTime::now();
        let source = std::fs::read_to_string(path).map_err(unreadable)?;
        if let Some(cached) = cached.filter(|c| c.source == source) {
            return Ok(Arc::clone(&cached.library));
        }

        let library = MacroLibrary::parse(&source).map_err(|err| {
            Error::RenderExecutionError(format!("macro library {}: {err}", path.display()))
        })?;
        log::debug!(
            "Loaded {} macros from {}: {}",
            library.len(),
            path.display(),
            library.names().collect::<Vec<_>>().join(", ")
        );

        let library = Arc::new(library);
        *slot = Some(CachedLibrary {
            path: path.to_path_buf(),
            modified,
            len,
            loaded_at,
            source,
            library: Arc::clone(&library),
        });
        Ok(library)
    }
}
