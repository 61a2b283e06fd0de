// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Priority-ordered filter registry
//!
//! The registry maps unique names to filters, kept sorted by ascending
//! priority. Each registration is initialized lazily, exactly once, the first
//! time it is looked up or offered a file.
//!
//! A process-wide registry seeded with the `crlf` and `ident` built-ins is
//! available through [`FilterRegistry::global`]; tests and embedders may build
//! isolated registries and hand them to a [`crate::Repository`].

use crate::attr::AttrRequirements;
use crate::crlf::CrlfFilter;
use crate::error::{FilterError, FilterResult};
use crate::filter::{Filter, CRLF_PRIORITY, FILTER_CRLF, FILTER_IDENT, IDENT_PRIORITY};
use crate::ident::IdentFilter;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// A registered filter
pub(crate) struct FilterDef {
    name: String,
    priority: i32,
    filter: Arc<dyn Filter>,
    requirements: AttrRequirements,
    initialized: Mutex<bool>,
}

impl FilterDef {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn filter(&self) -> &Arc<dyn Filter> {
        &self.filter
    }

    pub(crate) fn requirements(&self) -> &AttrRequirements {
        &self.requirements
    }

    /// Run the initialize hook unless it already succeeded
    ///
    /// The flag lock serializes concurrent first uses so the hook runs at most
    /// once per successful initialization. A failed hook leaves the flag unset.
    pub(crate) fn ensure_initialized(&self) -> FilterResult<()> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Ok(());
        }

        self.filter.initialize().map_err(|e| match e {
            FilterError::Initialize { .. } => e,
            other => FilterError::Initialize {
                name: self.name.clone(),
                reason: other.to_string(),
            },
        })?;

        *initialized = true;
        debug!("Initialized filter '{}'", self.name);
        Ok(())
    }

    fn shutdown_if_initialized(&self) {
        let mut initialized = self.initialized.lock();
        if *initialized {
            self.filter.shutdown();
            *initialized = false;
            debug!("Shut down filter '{}'", self.name);
        }
    }
}

impl fmt::Debug for FilterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDef")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("attributes", &self.filter.attributes())
            .field("initialized", &*self.initialized.lock())
            .finish()
    }
}

/// Registry of filters, sorted by ascending priority
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: RwLock<Vec<Arc<FilterDef>>>,
}

static GLOBAL: OnceLock<Arc<FilterRegistry>> = OnceLock::new();

impl FilterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the `crlf` and `ident` built-ins
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Process-wide registry, seeded with the built-ins on first use
    pub fn global() -> Arc<FilterRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(FilterRegistry::with_builtins())))
    }

    /// Register any built-in that is not currently present
    ///
    /// Brings a registry back into service after [`FilterRegistry::shutdown`].
    pub fn register_builtins(&self) {
        let mut filters = self.filters.write();
        let builtins: [(&str, i32, Arc<dyn Filter>); 2] = [
            (FILTER_CRLF, CRLF_PRIORITY, Arc::new(CrlfFilter::new()) as Arc<dyn Filter>),
            (FILTER_IDENT, IDENT_PRIORITY, Arc::new(IdentFilter::new()) as Arc<dyn Filter>),
        ];

        for (name, priority, filter) in builtins {
            if filters.iter().any(|d| d.name == name) {
                continue;
            }
            // built-in requirement strings are constants and always parse
            if let Ok(def) = Self::make_def(name, filter, priority) {
                filters.push(Arc::new(def));
            }
        }
        filters.sort_by_key(|d| d.priority);
    }

    fn make_def(name: &str, filter: Arc<dyn Filter>, priority: i32) -> FilterResult<FilterDef> {
        let requirements = AttrRequirements::parse(filter.attributes())?;
        Ok(FilterDef {
            name: name.to_string(),
            priority,
            filter,
            requirements,
            initialized: Mutex::new(false),
        })
    }

    /// Register `filter` under `name`
    ///
    /// Filters with equal priority keep their registration order. Must not race
    /// with filtering that is in flight on the same registry.
    pub fn register(&self, name: &str, filter: Arc<dyn Filter>, priority: i32) -> FilterResult<()> {
        let mut filters = self.filters.write();
        if filters.iter().any(|d| d.name == name) {
            return Err(FilterError::AlreadyExists(name.to_string()));
        }

        let def = Self::make_def(name, filter, priority)?;
        filters.push(Arc::new(def));
        filters.sort_by_key(|d| d.priority);

        info!("Registered filter '{}' at priority {}", name, priority);
        Ok(())
    }

    /// Remove the filter registered under `name`
    ///
    /// The built-in `crlf` and `ident` filters cannot be removed. The filter's
    /// shutdown hook runs if it had been initialized.
    pub fn unregister(&self, name: &str) -> FilterResult<()> {
        if name == FILTER_CRLF || name == FILTER_IDENT {
            return Err(FilterError::InvalidOperation(format!(
                "cannot unregister built-in filter '{}'",
                name
            )));
        }

        let mut filters = self.filters.write();
        let pos = filters
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;

        let def = filters.remove(pos);
        def.shutdown_if_initialized();

        info!("Unregistered filter '{}'", name);
        Ok(())
    }

    /// Find a filter by name, initializing it on first use
    pub fn lookup(&self, name: &str) -> FilterResult<Arc<dyn Filter>> {
        let def = self.find(name)?;
        Ok(Arc::clone(&def.filter))
    }

    pub(crate) fn find(&self, name: &str) -> FilterResult<Arc<FilterDef>> {
        let filters = self.filters.read();
        let def = filters
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))?;
        def.ensure_initialized()?;
        Ok(Arc::clone(def))
    }

    /// Snapshot of the registrations in priority order
    pub(crate) fn snapshot(&self) -> Vec<Arc<FilterDef>> {
        self.filters.read().clone()
    }

    /// Whether a filter is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.filters.read().iter().any(|d| d.name == name)
    }

    /// Registered names in priority order
    pub fn names(&self) -> Vec<String> {
        self.filters.read().iter().map(|d| d.name.clone()).collect()
    }

    /// Priority of the filter registered under `name`
    pub fn priority_of(&self, name: &str) -> Option<i32> {
        self.filters
            .read()
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.priority)
    }

    /// Number of registered filters
    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Shut down every initialized filter in priority order and clear the registry
    ///
    /// Calling this on an empty registry does nothing.
    pub fn shutdown(&self) {
        let mut filters = self.filters.write();
        if filters.is_empty() {
            return;
        }

        for def in filters.iter() {
            def.shutdown_if_initialized();
        }
        filters.clear();
        info!("Filter registry shut down");
    }
}

/// Register a filter in the process-wide registry
pub fn register_filter(name: &str, filter: Arc<dyn Filter>, priority: i32) -> FilterResult<()> {
    FilterRegistry::global().register(name, filter, priority)
}

/// Remove a filter from the process-wide registry
pub fn unregister_filter(name: &str) -> FilterResult<()> {
    FilterRegistry::global().unregister(name)
}

/// Look up a filter in the process-wide registry
pub fn lookup_filter(name: &str) -> FilterResult<Arc<dyn Filter>> {
    FilterRegistry::global().lookup(name)
}
