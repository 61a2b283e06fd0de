// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Identifier-expansion filter slot
//!
//! Reserves the `ident` name and priority for files carrying the `ident`
//! attribute. Keyword expansion itself is not performed: the filter declines
//! every file, so it never joins a filter list.

use crate::attr::AttrValue;
use crate::error::FilterResult;
use crate::filter::{CheckOutcome, Filter, FilterSource};
use tracing::trace;

/// The built-in `ident` filter
#[derive(Debug, Default)]
pub struct IdentFilter;

impl IdentFilter {
    /// Attribute requirements: `ident` must be set
    pub const ATTRIBUTES: &'static str = "+ident";

    /// Create the filter
    pub fn new() -> Self {
        IdentFilter
    }
}

impl Filter for IdentFilter {
    fn attributes(&self) -> &str {
        Self::ATTRIBUTES
    }

    fn check(&self, source: &FilterSource, _attrs: Option<&[AttrValue]>) -> FilterResult<CheckOutcome> {
        trace!("ident expansion not performed for {:?}", source.path());
        Ok(CheckOutcome::Passthrough)
    }
}
