// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! In-memory attribute resolver and object store
//!
//! Thread-safe implementations of [`AttributeResolver`] and [`ObjectStore`]
//! for embedders without a real attributes engine or object database, and for
//! tests.
//!
//! # Examples
//!
//! ```
//! use mediagit_filter::mock::{MemoryObjectStore, StaticAttributes};
//! use mediagit_filter::{AttrValue, Blob, ObjectStore};
//!
//! let attrs = StaticAttributes::new()
//!     .with_rule("*", "text", AttrValue::value("auto"))?
//!     .with_rule("*.png", "text", AttrValue::False)?;
//!
//! let odb = MemoryObjectStore::new();
//! let id = odb.insert_blob(Blob::new(b"hello\n".to_vec()));
//! assert_eq!(odb.read_blob(&id)?.raw_content(), b"hello\n");
//! # Ok::<(), mediagit_filter::FilterError>(())
//! ```

use crate::attr::{AttrCheckOptions, AttrValue};
use crate::error::{FilterError, FilterResult};
use crate::oid::{Blob, Oid};
use crate::repository::{AttributeResolver, IndexEntry, ObjectStore};
use globset::{GlobBuilder, GlobMatcher};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Rule {
    matcher: GlobMatcher,
    match_path: bool,
    name: String,
    value: AttrValue,
}

impl Rule {
    fn new(pattern: &str, name: &str, value: AttrValue) -> FilterResult<Self> {
        let match_path = pattern.contains('/');
        let matcher = GlobBuilder::new(pattern.trim_start_matches('/'))
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| FilterError::Attribute(format!("invalid pattern '{}': {}", pattern, e)))?
            .compile_matcher();

        Ok(Self {
            matcher,
            match_path,
            name: name.to_string(),
            value,
        })
    }

    fn matches(&self, path: &str) -> bool {
        if self.match_path {
            self.matcher.is_match(path)
        } else {
            self.matcher.is_match(path.rsplit('/').next().unwrap_or(path))
        }
    }
}

/// Attribute resolver backed by a fixed list of pattern rules
///
/// Patterns without a `/` match the file name, patterns with a `/` match the
/// whole repository-relative path. Patterns use glob syntax (`*`, `?`,
/// `[abc]`, `**`); `*` never crosses a `/`. Later rules override earlier ones.
#[derive(Debug, Default)]
pub struct StaticAttributes {
    rules: RwLock<Vec<Rule>>,
}

impl StaticAttributes {
    /// Create a resolver with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`StaticAttributes::add_rule`]
    pub fn with_rule(self, pattern: &str, name: &str, value: AttrValue) -> FilterResult<Self> {
        self.add_rule(pattern, name, value)?;
        Ok(self)
    }

    /// Append a rule setting `name` to `value` for paths matching `pattern`
    ///
    /// Fails with [`FilterError::Attribute`] if `pattern` is not a valid glob.
    pub fn add_rule(&self, pattern: &str, name: &str, value: AttrValue) -> FilterResult<()> {
        let rule = Rule::new(pattern, name, value)?;
        self.rules.write().push(rule);
        Ok(())
    }
}

impl AttributeResolver for StaticAttributes {
    fn resolve(
        &self,
        path: &str,
        names: &[&str],
        _options: &AttrCheckOptions,
    ) -> FilterResult<Option<Vec<AttrValue>>> {
        let rules = self.rules.read();
        let mut values = vec![AttrValue::Unspecified; names.len()];
        let mut found = false;

        for rule in rules.iter().filter(|r| r.matches(path)) {
            for (slot, name) in values.iter_mut().zip(names) {
                if rule.name == *name {
                    *slot = rule.value.clone();
                    found = true;
                }
            }
        }

        Ok(found.then_some(values))
    }
}

/// In-memory blob store and staging index
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    blobs: RwLock<HashMap<Oid, Blob>>,
    index: RwLock<HashMap<String, IndexEntry>>,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob, returning its id
    pub fn insert_blob(&self, blob: Blob) -> Oid {
        let id = *blob.id();
        self.blobs.write().insert(id, blob);
        id
    }

    /// Stage `entry` at `path`
    pub fn stage(&self, path: &str, entry: IndexEntry) {
        self.index.write().insert(path.to_string(), entry);
    }

    /// Number of stored blobs
    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn read_blob(&self, oid: &Oid) -> FilterResult<Blob> {
        self.blobs
            .read()
            .get(oid)
            .cloned()
            .ok_or_else(|| FilterError::Object(format!("object not found: {}", oid)))
    }

    fn index_entry(&self, path: &str) -> FilterResult<Option<IndexEntry>> {
        Ok(self.index.read().get(path).copied())
    }
}
