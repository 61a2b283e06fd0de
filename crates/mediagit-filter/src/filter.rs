// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! The [`Filter`] trait and the values passed to its hooks
//!
//! A filter is registered once under a unique name and a priority. For every
//! file that is filtered, the pipeline:
//!
//! 1. resolves the attributes the filter asked for and compares them against
//!    its requirement string,
//! 2. calls [`Filter::check`] to decide whether the filter applies and to
//!    produce a per-file payload,
//! 3. calls [`Filter::stream`] to splice the filter into a write chain,
//! 4. calls [`Filter::cleanup`] when the filter list is dropped.
//!
//! Filters that only know how to transform a complete buffer implement
//! [`Filter::apply`] and rely on the default `stream`, which wraps `apply` in a
//! [`BufferedStream`].

use crate::attr::{AttrCheckOptions, AttrValue};
use crate::error::{FilterError, FilterResult};
use crate::oid::Oid;
use crate::repository::Repository;
use crate::stream::{BufferedStream, WriteStream};
use std::any::Any;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Registered name of the line-ending filter
pub const FILTER_CRLF: &str = "crlf";
/// Registered name of the identifier-expansion filter
pub const FILTER_IDENT: &str = "ident";

/// Priority of the line-ending filter
pub const CRLF_PRIORITY: i32 = 0;
/// Priority of the identifier-expansion filter
pub const IDENT_PRIORITY: i32 = 100;
/// Suggested priority for external filter drivers
pub const DRIVER_PRIORITY: i32 = 200;

/// Direction in which content moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Object store to working tree (smudge)
    ToWorktree,
    /// Working tree to object store (clean)
    ToOdb,
}

impl FilterMode {
    /// Alias for [`FilterMode::ToWorktree`]
    pub const SMUDGE: FilterMode = FilterMode::ToWorktree;
    /// Alias for [`FilterMode::ToOdb`]
    pub const CLEAN: FilterMode = FilterMode::ToOdb;
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::ToWorktree => f.write_str("smudge"),
            FilterMode::ToOdb => f.write_str("clean"),
        }
    }
}

/// Option flags for loading a filter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FilterFlags(u32);

impl FilterFlags {
    /// No options
    pub const DEFAULT: FilterFlags = FilterFlags(0);
    /// Downgrade `core.safecrlf = true` to a warning
    pub const ALLOW_UNSAFE: FilterFlags = FilterFlags(1 << 0);
    /// Do not consult the system-wide attributes file
    pub const NO_SYSTEM_ATTRIBUTES: FilterFlags = FilterFlags(1 << 1);
    /// Load attributes from `.gitattributes` at the root of HEAD
    pub const ATTRIBUTES_FROM_HEAD: FilterFlags = FilterFlags(1 << 2);
    /// Load attributes from `.gitattributes` in a given commit
    pub const ATTRIBUTES_FROM_COMMIT: FilterFlags = FilterFlags(1 << 3);

    /// Raw bit representation
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Build flags from raw bits
    pub fn from_bits(bits: u32) -> Self {
        FilterFlags(bits)
    }

    /// Whether every flag in `other` is set
    pub fn contains(self, other: FilterFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FilterFlags {
    type Output = FilterFlags;

    fn bitor(self, rhs: FilterFlags) -> FilterFlags {
        FilterFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FilterFlags {
    fn bitor_assign(&mut self, rhs: FilterFlags) {
        self.0 |= rhs.0;
    }
}

/// Options for loading a filter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterOptions {
    /// Option flags
    pub flags: FilterFlags,
    /// Commit to read attributes from when
    /// [`FilterFlags::ATTRIBUTES_FROM_COMMIT`] is set
    pub attr_commit_id: Option<Oid>,
}

impl FilterOptions {
    /// Options with the given flags and no commit
    pub fn with_flags(flags: FilterFlags) -> Self {
        Self {
            flags,
            attr_commit_id: None,
        }
    }

    /// Read attributes from `commit` as well
    pub fn with_attr_commit(mut self, commit: Oid) -> Self {
        self.flags |= FilterFlags::ATTRIBUTES_FROM_COMMIT;
        self.attr_commit_id = Some(commit);
        self
    }

    /// Translate into the options understood by the attribute resolver
    pub fn attr_check_options(&self) -> AttrCheckOptions {
        AttrCheckOptions {
            no_system: self.flags.contains(FilterFlags::NO_SYSTEM_ATTRIBUTES),
            include_head: self.flags.contains(FilterFlags::ATTRIBUTES_FROM_HEAD),
            include_commit: if self.flags.contains(FilterFlags::ATTRIBUTES_FROM_COMMIT) {
                self.attr_commit_id
            } else {
                None
            },
        }
    }
}

/// The file being filtered
#[derive(Clone)]
pub struct FilterSource {
    repo: Arc<Repository>,
    path: Option<String>,
    oid: Option<Oid>,
    filemode: u32,
    mode: FilterMode,
    options: FilterOptions,
}

impl FilterSource {
    pub(crate) fn new(
        repo: Arc<Repository>,
        path: Option<String>,
        mode: FilterMode,
        options: FilterOptions,
    ) -> Self {
        Self {
            repo,
            path,
            oid: None,
            filemode: 0,
            mode,
            options,
        }
    }

    /// Repository the file belongs to
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Shared handle to the repository
    pub fn repo_handle(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Repository-relative path, if known
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Object id of the content, if it is already in the object store
    pub fn id(&self) -> Option<&Oid> {
        self.oid.as_ref()
    }

    /// File mode, or 0 when unknown
    pub fn filemode(&self) -> u32 {
        self.filemode
    }

    /// Filtering direction
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Option flags
    pub fn flags(&self) -> FilterFlags {
        self.options.flags
    }

    /// Full load options
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub(crate) fn set_id(&mut self, oid: Option<Oid>) {
        self.oid = oid;
    }
}

impl fmt::Debug for FilterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSource")
            .field("path", &self.path)
            .field("oid", &self.oid)
            .field("filemode", &format_args!("{:o}", self.filemode))
            .field("mode", &self.mode)
            .field("flags", &self.options.flags)
            .finish()
    }
}

/// Per-file state produced by [`Filter::check`]
pub type Payload = Box<dyn Any + Send>;

/// Borrowed view of a payload as handed to the transform hooks
pub type PayloadRef<'a> = Option<&'a (dyn Any + Send)>;

/// Result of [`Filter::check`]
pub enum CheckOutcome {
    /// Add the filter to the list, carrying an optional payload
    Apply(Option<Payload>),
    /// The filter does not apply to this file
    Passthrough,
}

impl CheckOutcome {
    /// Apply with a typed payload
    pub fn with_payload<T: Any + Send>(payload: T) -> Self {
        CheckOutcome::Apply(Some(Box::new(payload)))
    }
}

impl fmt::Debug for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Apply(payload) => f
                .debug_tuple("Apply")
                .field(&payload.as_ref().map(|_| "..."))
                .finish(),
            CheckOutcome::Passthrough => f.write_str("Passthrough"),
        }
    }
}

/// Result of a whole-buffer transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferOutcome {
    /// The transformed content
    Converted(Vec<u8>),
    /// Leave the content untouched
    Passthrough,
}

/// Failure to splice a filter into a write chain
///
/// Carries the downstream stream back to the chain builder so that it can be
/// closed before the error propagates.
pub struct StreamSetupError<'a> {
    /// Why the filter could not create its stream
    pub error: FilterError,
    /// The stream the filter was asked to wrap
    pub downstream: Box<dyn WriteStream + 'a>,
}

impl fmt::Debug for StreamSetupError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSetupError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// A content filter
///
/// Implementations are shared between threads and must not keep per-file
/// state in `self`; use the payload returned from [`Filter::check`] instead.
pub trait Filter: Send + Sync {
    /// Whitespace-separated attribute requirements
    ///
    /// See [`crate::attr`] for the token syntax. The default requests no
    /// attributes, so the filter is offered every file.
    fn attributes(&self) -> &str {
        ""
    }

    /// Called once before the filter is first used
    fn initialize(&self) -> FilterResult<()> {
        Ok(())
    }

    /// Called when an initialized filter is unregistered or the registry shuts down
    fn shutdown(&self) {}

    /// Decide whether the filter applies to `source`
    ///
    /// `attrs` holds the resolved attribute values, positionally aligned with
    /// the names in [`Filter::attributes`], or `None` when the filter requests
    /// no attributes or none were found.
    fn check(&self, source: &FilterSource, attrs: Option<&[AttrValue]>) -> FilterResult<CheckOutcome> {
        let _ = (source, attrs);
        Ok(CheckOutcome::Apply(None))
    }

    /// Transform a complete buffer
    fn apply(&self, payload: PayloadRef<'_>, source: &FilterSource, input: &[u8]) -> FilterResult<BufferOutcome> {
        let _ = (payload, source, input);
        Ok(BufferOutcome::Passthrough)
    }

    /// Create a stream that filters into `next`
    fn stream<'a>(
        &'a self,
        payload: PayloadRef<'a>,
        source: &'a FilterSource,
        next: Box<dyn WriteStream + 'a>,
    ) -> Result<Box<dyn WriteStream + 'a>, StreamSetupError<'a>> {
        Ok(Box::new(BufferedStream::new(
            move |input: &[u8]| self.apply(payload, source, input),
            next,
        )))
    }

    /// Release a payload produced by [`Filter::check`]
    fn cleanup(&self, payload: Option<Payload>) {
        drop(payload);
    }
}
