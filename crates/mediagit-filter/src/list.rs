// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Filter lists: the filters that apply to one file, in chain order

use crate::attr::{AttrCheckOptions, AttrValue};
use crate::error::FilterResult;
use crate::filter::{CheckOutcome, Filter, FilterFlags, FilterMode, FilterOptions, FilterSource, Payload, PayloadRef};
use crate::oid::Blob;
use crate::registry::FilterDef;
use crate::repository::Repository;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One filter in a list together with its per-file payload
pub(crate) struct FilterEntry {
    name: String,
    filter: Arc<dyn Filter>,
    payload: Option<Payload>,
}

impl FilterEntry {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    pub(crate) fn payload(&self) -> PayloadRef<'_> {
        self.payload.as_deref()
    }
}

/// The filters that apply to one file
///
/// Clean lists hold their filters in ascending priority, smudge lists in
/// descending priority. When the list is streamed the first entry sits next to
/// the destination, so smudge applies filters in ascending priority and clean
/// in descending priority.
///
/// Dropping the list runs every filter's cleanup hook on its payload.
pub struct FilterList {
    source: FilterSource,
    entries: Vec<FilterEntry>,
    scratch: Vec<u8>,
}

impl FilterList {
    /// Create an empty list for manual assembly with [`FilterList::push`]
    pub fn new(repo: Arc<Repository>, mode: FilterMode, flags: FilterFlags) -> Self {
        Self::with_source(FilterSource::new(repo, None, mode, FilterOptions::with_flags(flags)))
    }

    fn with_source(source: FilterSource) -> Self {
        Self {
            source,
            entries: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Build the list of filters that apply to `path`
    ///
    /// Returns `Ok(None)` when no filter applies. Every registered filter is
    /// offered the file in priority order: its attribute requirements are
    /// resolved and matched, the filter is initialized on first use, then its
    /// `check` hook decides. An error from the
    /// attribute resolver or from any hook aborts the build, releasing the
    /// payloads collected so far.
    pub fn load(
        repo: &Arc<Repository>,
        blob: Option<&Blob>,
        path: &str,
        mode: FilterMode,
        options: &FilterOptions,
    ) -> FilterResult<Option<FilterList>> {
        let mut source = FilterSource::new(Arc::clone(repo), Some(path.to_string()), mode, *options);
        source.set_id(blob.map(|b| *b.id()));

        let mut list = Self::with_source(source);
        let attr_options = options.attr_check_options();

        for def in repo.filter_registry().snapshot() {
            let values = match list.resolve_attributes(&def, path, &attr_options)? {
                AttrMatch::Skip => continue,
                AttrMatch::Values(values) => values,
            };

            def.ensure_initialized()?;

            match def.filter().check(&list.source, values.as_deref())? {
                CheckOutcome::Passthrough => {
                    debug!("Filter '{}' passes '{}' through", def.name(), path);
                }
                CheckOutcome::Apply(payload) => {
                    debug!("Filter '{}' applies to '{}' ({})", def.name(), path, mode);
                    list.entries.push(FilterEntry {
                        name: def.name().to_string(),
                        filter: Arc::clone(def.filter()),
                        payload,
                    });
                }
            }
        }

        if list.entries.is_empty() {
            return Ok(None);
        }
        if mode == FilterMode::ToWorktree {
            list.entries.reverse();
        }
        Ok(Some(list))
    }

    /// [`FilterList::load`] with option flags only
    pub fn load_with_flags(
        repo: &Arc<Repository>,
        blob: Option<&Blob>,
        path: &str,
        mode: FilterMode,
        flags: FilterFlags,
    ) -> FilterResult<Option<FilterList>> {
        Self::load(repo, blob, path, mode, &FilterOptions::with_flags(flags))
    }

    fn resolve_attributes(
        &self,
        def: &FilterDef,
        path: &str,
        attr_options: &AttrCheckOptions,
    ) -> FilterResult<AttrMatch> {
        let requirements = def.requirements();
        if requirements.is_empty() {
            return Ok(AttrMatch::Values(None));
        }

        let names = requirements.names();
        match self.source.repo().attributes().resolve(path, &names, attr_options)? {
            None if requirements.has_matches() => {
                debug!("No attributes for '{}', skipping filter '{}'", path, def.name());
                Ok(AttrMatch::Skip)
            }
            None => Ok(AttrMatch::Values(None)),
            Some(values) if requirements.matches(&values) => Ok(AttrMatch::Values(Some(values))),
            Some(_) => Ok(AttrMatch::Skip),
        }
    }

    /// Append the registered filter `name` with an explicit payload
    ///
    /// The filter is initialized if this is its first use. Its `check` hook is
    /// not consulted.
    pub fn push(&mut self, name: &str, payload: Option<Payload>) -> FilterResult<()> {
        let def = self.source.repo().filter_registry().find(name)?;
        self.entries.push(FilterEntry {
            name: def.name().to_string(),
            filter: Arc::clone(def.filter()),
            payload,
        });
        Ok(())
    }

    /// Whether a filter named `name` is in the list
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Number of filters in the list
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list holds no filters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter names in list order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// The file this list was built for
    pub fn source(&self) -> &FilterSource {
        &self.source
    }

    pub(crate) fn source_mut(&mut self) -> &mut FilterSource {
        &mut self.source
    }

    pub(crate) fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub(crate) fn take_scratch(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.scratch)
    }

    pub(crate) fn restore_scratch(&mut self, scratch: Vec<u8>) {
        self.scratch = scratch;
    }
}

enum AttrMatch {
    Skip,
    Values(Option<Vec<AttrValue>>),
}

impl Drop for FilterList {
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            entry.filter.cleanup(entry.payload);
        }
    }
}

impl fmt::Debug for FilterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterList")
            .field("source", &self.source)
            .field("filters", &self.names())
            .finish()
    }
}
