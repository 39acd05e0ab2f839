use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use stowage_graph::LoaderConfig;
use stowage_mapping::{RefactoringMapping, ResolverConfig};
use stowage_registry::MonotonicIdProvider;

use crate::error::{SessionError, SessionResult};

/// Configuration of a persistence session.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reject member mappings that have an equally good alternative.
    pub strict_member_mapping: bool,
    /// Minimum similarity score for pairing an obsolete member.
    pub similarity_threshold: f64,
    /// Read requests per set of missing objects before a load fails.
    pub max_fetch_attempts: u32,
    /// Milliseconds a load waits for objects another load is still building.
    pub settle_timeout_ms: u64,
    /// First object id handed out when storage holds no higher one.
    pub first_object_id: u64,
    /// First type id handed out when the dictionary holds no higher one.
    pub first_type_id: u64,
    /// Type names the application keeps root objects of. Dictionary types
    /// not reachable from these are classified unreachable on open.
    pub root_types: Vec<String>,
    /// Runtime types that must never be persisted.
    pub excluded_types: Vec<String>,
    /// `Type#field` entries that are never persisted.
    pub transient_fields: Vec<String>,
    /// `Type#field` references whose targets are stored again on every store.
    pub eager_fields: Vec<String>,
    /// Inline refactoring entries.
    pub refactorings: RefactoringMapping,
    /// Refactoring mapping file, merged over the inline entries.
    pub refactoring_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strict_member_mapping: false,
            similarity_threshold: ResolverConfig::default().similarity_threshold,
            max_fetch_attempts: LoaderConfig::default().max_fetch_attempts,
            settle_timeout_ms: LoaderConfig::default().settle_timeout_ms,
            first_object_id: MonotonicIdProvider::DEFAULT_FIRST_OBJECT_ID,
            first_type_id: MonotonicIdProvider::DEFAULT_FIRST_TYPE_ID,
            root_types: Vec::new(),
            excluded_types: Vec::new(),
            transient_fields: Vec::new(),
            eager_fields: Vec::new(),
            refactorings: RefactoringMapping::new(),
            refactoring_file: None,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file. A relative `refactoring_file` is taken
    /// relative to the directory of `path`.
    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(file), Some(base)) = (config.refactoring_file.as_mut(), path.parent()) {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        Ok(config)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            strict: self.strict_member_mapping,
            similarity_threshold: self.similarity_threshold,
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_fetch_attempts: self.max_fetch_attempts,
            settle_timeout_ms: self.settle_timeout_ms,
        }
    }

    /// Inline entries merged with the refactoring file, if any.
    pub fn refactoring_mapping(&self) -> SessionResult<RefactoringMapping> {
        let mut mapping = self.refactorings.clone();
        if let Some(file) = &self.refactoring_file {
            mapping.extend(RefactoringMapping::load(file)?);
        }
        Ok(mapping)
    }

    fn validate(&self) -> SessionResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SessionError::Config(format!(
                "similarity_threshold must be within 0..=1, got {}",
                self.similarity_threshold
            )));
        }
        if self.max_fetch_attempts == 0 {
            return Err(SessionError::Config("max_fetch_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
