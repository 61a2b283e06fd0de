// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Repository handle seen by the filter pipeline
//!
//! The pipeline does not parse attribute files, read the object database or
//! load configuration files on its own. It consumes those capabilities
//! through the [`AttributeResolver`] and [`ObjectStore`] traits and a resolved
//! [`RepoConfig`], all reachable from a [`Repository`].

use crate::attr::{AttrCheckOptions, AttrValue};
use crate::config::{AutoCrlf, Eol, RepoConfig, SafeCrlf};
use crate::error::FilterResult;
use crate::mock::{MemoryObjectStore, StaticAttributes};
use crate::oid::{Blob, Oid};
use crate::registry::FilterRegistry;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Resolves attribute values for a path
pub trait AttributeResolver: Send + Sync + Debug {
    /// Look up `names` for `path`
    ///
    /// Returns `Ok(None)` when none of the attributes are known for the path,
    /// which callers treat as "not found" rather than a failure. Otherwise the
    /// returned vector is positionally aligned with `names`.
    fn resolve(
        &self,
        path: &str,
        names: &[&str],
        options: &AttrCheckOptions,
    ) -> FilterResult<Option<Vec<AttrValue>>>;
}

/// Regular, non-executable file mode
pub const FILEMODE_BLOB: u32 = 0o100644;
/// Regular, executable file mode
pub const FILEMODE_BLOB_EXECUTABLE: u32 = 0o100755;
/// Symbolic link mode
pub const FILEMODE_LINK: u32 = 0o120000;

/// An entry in the staging index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Object ID of the staged content
    pub oid: Oid,
    /// File mode
    pub mode: u32,
}

impl IndexEntry {
    /// Whether the entry is a regular file (executable or not)
    pub fn is_regular_file(&self) -> bool {
        self.mode & 0o170000 == 0o100000
    }
}

/// Read access to the object database and the staging index
pub trait ObjectStore: Send + Sync + Debug {
    /// Load a blob by id
    fn read_blob(&self, oid: &Oid) -> FilterResult<Blob>;

    /// Look up the staged entry for `path`, if any
    fn index_entry(&self, path: &str) -> FilterResult<Option<IndexEntry>>;
}

/// Configuration keys cached per repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigmapItem {
    /// `core.autocrlf`
    AutoCrlf = 0,
    /// `core.eol`
    Eol = 1,
    /// `core.safecrlf`
    SafeCrlf = 2,
}

impl ConfigmapItem {
    const COUNT: usize = 3;
}

/// Sentinel stored in an unpopulated cache slot
pub const CONFIGMAP_NOT_CACHED: i32 = -1;

/// Publish-once cache of integer-encoded configuration values
#[derive(Debug)]
struct ConfigmapCache {
    slots: [AtomicI32; ConfigmapItem::COUNT],
}

impl ConfigmapCache {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicI32::new(CONFIGMAP_NOT_CACHED)),
        }
    }

    fn clear(&self) {
        for slot in &self.slots {
            slot.store(CONFIGMAP_NOT_CACHED, Ordering::Release);
        }
    }
}

/// Repository handle
///
/// Built with [`Repository::builder`] and shared through an `Arc` by every
/// [`crate::FilterSource`] created for it.
///
/// # Examples
///
/// ```
/// use mediagit_filter::{AutoCrlf, CoreConfig, Repository};
///
/// let repo = Repository::builder()
///     .core(CoreConfig::default().with_autocrlf(AutoCrlf::Input))
///     .build();
/// assert_eq!(repo.autocrlf(), AutoCrlf::Input);
/// ```
#[derive(Debug)]
pub struct Repository {
    workdir: Option<PathBuf>,
    config: RwLock<RepoConfig>,
    configmap: ConfigmapCache,
    attributes: Arc<dyn AttributeResolver>,
    odb: Arc<dyn ObjectStore>,
    filters: Arc<FilterRegistry>,
}

impl Repository {
    /// Start building a repository handle
    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::default()
    }

    /// Working directory, if the repository is not bare
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    /// Attribute resolver
    pub fn attributes(&self) -> &dyn AttributeResolver {
        self.attributes.as_ref()
    }

    /// Object database and index
    pub fn odb(&self) -> &dyn ObjectStore {
        self.odb.as_ref()
    }

    /// Filter registry consulted when loading filter lists
    pub fn filter_registry(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> RepoConfig {
        *self.config.read()
    }

    /// Replace the configuration and invalidate the configmap cache
    pub fn set_config(&self, config: RepoConfig) {
        let mut current = self.config.write();
        *current = config;
        self.configmap.clear();
        drop(current);
        debug!("Repository configuration changed, configmap cache cleared");
    }

    /// Cached integer lookup of a configuration item
    ///
    /// The first reader computes the value and publishes it with a
    /// compare-and-swap; later readers get the cached value.
    /// [`Repository::set_config`] resets every slot to "not cached" under the
    /// config write lock, and readers hold the read lock from computing a
    /// value until it is published, so a stale value is never cached.
    pub fn configmap_lookup(&self, item: ConfigmapItem) -> i32 {
        let slot = &self.configmap.slots[item as usize];
        let cached = slot.load(Ordering::Acquire);
        if cached != CONFIGMAP_NOT_CACHED {
            return cached;
        }

        let config = self.config.read();
        let value = match item {
            ConfigmapItem::AutoCrlf => encode_autocrlf(config.core.autocrlf),
            ConfigmapItem::Eol => encode_eol(config.core.eol),
            ConfigmapItem::SafeCrlf => encode_safecrlf(config.core.safecrlf),
        };

        // losing the race is fine: the winner read the same config
        let _ = slot.compare_exchange(CONFIGMAP_NOT_CACHED, value, Ordering::AcqRel, Ordering::Acquire);
        drop(config);
        value
    }

    /// `core.autocrlf`, through the configmap cache
    pub fn autocrlf(&self) -> AutoCrlf {
        decode_autocrlf(self.configmap_lookup(ConfigmapItem::AutoCrlf))
    }

    /// `core.safecrlf`, through the configmap cache
    pub fn safecrlf(&self) -> SafeCrlf {
        decode_safecrlf(self.configmap_lookup(ConfigmapItem::SafeCrlf))
    }

    /// `core.eol`, through the configmap cache
    pub fn core_eol(&self) -> Eol {
        decode_eol(self.configmap_lookup(ConfigmapItem::Eol))
    }

    /// Resolve a path against the working directory
    ///
    /// Absolute paths and bare repositories leave the path unchanged.
    pub fn workdir_path(&self, path: &Path) -> PathBuf {
        match &self.workdir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn encode_autocrlf(value: AutoCrlf) -> i32 {
    match value {
        AutoCrlf::False => 0,
        AutoCrlf::True => 1,
        AutoCrlf::Input => 2,
    }
}

fn decode_autocrlf(raw: i32) -> AutoCrlf {
    match raw {
        1 => AutoCrlf::True,
        2 => AutoCrlf::Input,
        _ => AutoCrlf::False,
    }
}

fn encode_safecrlf(value: SafeCrlf) -> i32 {
    match value {
        SafeCrlf::False => 0,
        SafeCrlf::Fail => 1,
        SafeCrlf::Warn => 2,
    }
}

fn decode_safecrlf(raw: i32) -> SafeCrlf {
    match raw {
        1 => SafeCrlf::Fail,
        2 => SafeCrlf::Warn,
        _ => SafeCrlf::False,
    }
}

fn encode_eol(value: Eol) -> i32 {
    match value {
        Eol::Unset => 0,
        Eol::Crlf => 1,
        Eol::Lf => 2,
        Eol::Native => 3,
    }
}

fn decode_eol(raw: i32) -> Eol {
    match raw {
        1 => Eol::Crlf,
        2 => Eol::Lf,
        3 => Eol::Native,
        _ => Eol::Unset,
    }
}

/// Builder for [`Repository`]
#[derive(Debug, Default)]
pub struct RepositoryBuilder {
    workdir: Option<PathBuf>,
    config: RepoConfig,
    attributes: Option<Arc<dyn AttributeResolver>>,
    odb: Option<Arc<dyn ObjectStore>>,
    filters: Option<Arc<FilterRegistry>>,
}

impl RepositoryBuilder {
    /// Set the working directory
    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Set the whole configuration
    pub fn config(mut self, config: RepoConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the `[core]` section
    pub fn core(mut self, core: crate::config::CoreConfig) -> Self {
        self.config.core = core;
        self
    }

    /// Set the attribute resolver (defaults to one that knows no attributes)
    pub fn attributes(mut self, attributes: Arc<dyn AttributeResolver>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Set the object store (defaults to an empty in-memory store)
    pub fn odb(mut self, odb: Arc<dyn ObjectStore>) -> Self {
        self.odb = Some(odb);
        self
    }

    /// Use a dedicated filter registry instead of the process-wide one
    pub fn filter_registry(mut self, filters: Arc<FilterRegistry>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Finish building
    pub fn build(self) -> Arc<Repository> {
        Arc::new(Repository {
            workdir: self.workdir,
            config: RwLock::new(self.config),
            configmap: ConfigmapCache::new(),
            attributes: self
                .attributes
                .unwrap_or_else(|| Arc::new(StaticAttributes::new())),
            odb: self.odb.unwrap_or_else(|| Arc::new(MemoryObjectStore::new())),
            filters: self.filters.unwrap_or_else(FilterRegistry::global),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    #[test]
    fn test_configmap_caches_until_config_changes() {
        let repo = Repository::builder()
            .core(CoreConfig::default().with_autocrlf(AutoCrlf::True))
            .build();

        assert_eq!(repo.autocrlf(), AutoCrlf::True);
        assert_eq!(repo.configmap.slots[ConfigmapItem::AutoCrlf as usize].load(Ordering::Acquire), 1);

        repo.set_config(CoreConfig::default().with_autocrlf(AutoCrlf::Input).into());
        assert_eq!(
            repo.configmap.slots[ConfigmapItem::AutoCrlf as usize].load(Ordering::Acquire),
            CONFIGMAP_NOT_CACHED
        );
        assert_eq!(repo.autocrlf(), AutoCrlf::Input);
    }

    #[test]
    fn test_configmap_roundtrip_all_values() {
        for eol in [Eol::Unset, Eol::Lf, Eol::Crlf, Eol::Native] {
            assert_eq!(decode_eol(encode_eol(eol)), eol);
        }
        for s in [SafeCrlf::False, SafeCrlf::Fail, SafeCrlf::Warn] {
            assert_eq!(decode_safecrlf(encode_safecrlf(s)), s);
        }
        for a in [AutoCrlf::False, AutoCrlf::True, AutoCrlf::Input] {
            assert_eq!(decode_autocrlf(encode_autocrlf(a)), a);
        }
    }

    #[test]
    fn test_concurrent_readers_agree() {
        let repo = Repository::builder()
            .core(CoreConfig::default().with_safecrlf(SafeCrlf::Warn))
            .build();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| repo.safecrlf())).collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), SafeCrlf::Warn);
            }
        });
    }

    #[test]
    fn test_config_change_during_reads_is_not_lost() {
        let repo = Repository::builder()
            .core(CoreConfig::default().with_autocrlf(AutoCrlf::True))
            .build();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2000 {
                        let _ = repo.autocrlf();
                    }
                });
            }
            s.spawn(|| {
                for i in 0..500 {
                    let autocrlf = if i % 2 == 0 { AutoCrlf::Input } else { AutoCrlf::True };
                    repo.set_config(CoreConfig::default().with_autocrlf(autocrlf).into());
                }
                repo.set_config(CoreConfig::default().with_autocrlf(AutoCrlf::Input).into());
            });
        });

        assert_eq!(repo.autocrlf(), AutoCrlf::Input);
    }

    #[test]
    fn test_workdir_path_resolution() {
        let repo = Repository::builder().workdir("/work").build();
        assert_eq!(repo.workdir_path(Path::new("a/b.txt")), PathBuf::from("/work/a/b.txt"));

        let bare = Repository::builder().build();
        assert_eq!(bare.workdir_path(Path::new("a.txt")), PathBuf::from("a.txt"));
    }

    #[test]
    fn test_index_entry_mode() {
        let oid = Oid::hash(b"x");
        assert!(IndexEntry { oid, mode: FILEMODE_BLOB }.is_regular_file());
        assert!(IndexEntry { oid, mode: FILEMODE_BLOB_EXECUTABLE }.is_regular_file());
        assert!(!IndexEntry { oid, mode: FILEMODE_LINK }.is_regular_file());
    }
}
