// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Line-ending normalization filter
//!
//! Driven by the `text`, `crlf` and `eol` attributes together with
//! `core.autocrlf`, `core.safecrlf` and `core.eol`:
//!
//! - **clean** strips the CR from CRLF pairs so the object store holds LF
//! - **smudge** expands bare LF into CRLF when the checkout wants CRLF
//!
//! In the `auto` modes content that looks binary, or whose staged version
//! already contains a CR, is left alone.

use crate::attr::AttrValue;
use crate::config::{AutoCrlf, Eol, SafeCrlf};
use crate::error::{FilterError, FilterResult};
use crate::filter::{BufferOutcome, CheckOutcome, Filter, FilterFlags, FilterMode, FilterSource, PayloadRef};
use crate::repository::Repository;
use memchr::{memchr, memchr_iter};
use tracing::{debug, warn};

/// Number of leading bytes searched for NUL when detecting binary content
pub const BINARY_PROBE_LEN: usize = 8000;

/// Per-file line-ending action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlfAction {
    /// Nothing decided yet
    Undefined,
    /// Never convert
    Binary,
    /// Text, line ending from configuration
    Text,
    /// Text, LF in the working tree
    TextInput,
    /// Text, CRLF in the working tree
    TextCrlf,
    /// Detect text, line ending from configuration
    Auto,
    /// Detect text, LF in the working tree
    AutoInput,
    /// Detect text, CRLF in the working tree
    AutoCrlf,
}

impl CrlfAction {
    fn is_auto(self) -> bool {
        matches!(self, CrlfAction::Auto | CrlfAction::AutoInput | CrlfAction::AutoCrlf)
    }

    fn from_text_attr(value: &AttrValue) -> Self {
        match value {
            AttrValue::True => CrlfAction::Text,
            AttrValue::False => CrlfAction::Binary,
            AttrValue::Unspecified => CrlfAction::Undefined,
            AttrValue::Value(v) if v == "input" => CrlfAction::TextInput,
            AttrValue::Value(v) if v == "auto" => CrlfAction::Auto,
            AttrValue::Value(_) => CrlfAction::Undefined,
        }
    }
}

fn eol_attr(value: &AttrValue) -> Eol {
    match value.as_str() {
        Some("lf") => Eol::Lf,
        Some("crlf") => Eol::Crlf,
        _ => Eol::Unset,
    }
}

/// Line-ending policy computed for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrlfAttrs {
    /// Action derived from attributes alone
    pub attr_action: CrlfAction,
    /// Final action after configuration fallbacks
    pub crlf_action: CrlfAction,
    /// `core.autocrlf`
    pub auto_crlf: AutoCrlf,
    /// `core.safecrlf`, possibly downgraded by [`FilterFlags::ALLOW_UNSAFE`]
    pub safe_crlf: SafeCrlf,
    /// `core.eol`
    pub core_eol: Eol,
}

impl CrlfAttrs {
    /// Compute the policy for `source`
    ///
    /// `attrs` are the `crlf`, `eol` and `text` attribute values, in that order.
    pub fn compute(source: &FilterSource, attrs: Option<&[AttrValue]>) -> Self {
        Self::from_repository(source.repo(), source.flags(), attrs)
    }

    fn from_repository(repo: &Repository, flags: FilterFlags, attrs: Option<&[AttrValue]>) -> Self {
        let mut ca = CrlfAttrs {
            attr_action: CrlfAction::Undefined,
            crlf_action: CrlfAction::Undefined,
            auto_crlf: repo.autocrlf(),
            safe_crlf: repo.safecrlf(),
            core_eol: repo.core_eol(),
        };

        if flags.contains(FilterFlags::ALLOW_UNSAFE) && ca.safe_crlf == SafeCrlf::Fail {
            ca.safe_crlf = SafeCrlf::Warn;
        }

        if let Some([crlf, eol, text]) = attrs {
            ca.crlf_action = CrlfAction::from_text_attr(text);
            if ca.crlf_action == CrlfAction::Undefined {
                ca.crlf_action = CrlfAction::from_text_attr(crlf);
            }

            if ca.crlf_action != CrlfAction::Binary {
                ca.crlf_action = match (ca.crlf_action, eol_attr(eol)) {
                    (CrlfAction::Auto, Eol::Lf) => CrlfAction::AutoInput,
                    (CrlfAction::Auto, Eol::Crlf) => CrlfAction::AutoCrlf,
                    (_, Eol::Lf) => CrlfAction::TextInput,
                    (_, Eol::Crlf) => CrlfAction::TextCrlf,
                    (action, _) => action,
                };
            }
            ca.attr_action = ca.crlf_action;
        }

        if ca.crlf_action == CrlfAction::Text {
            ca.crlf_action = if ca.text_eol_is_crlf() {
                CrlfAction::TextCrlf
            } else {
                CrlfAction::TextInput
            };
        }

        if ca.crlf_action == CrlfAction::Undefined {
            ca.crlf_action = match ca.auto_crlf {
                AutoCrlf::False => CrlfAction::Binary,
                AutoCrlf::True => CrlfAction::AutoCrlf,
                AutoCrlf::Input => CrlfAction::AutoInput,
            };
        }

        ca
    }

    /// Whether text files get CRLF in the working tree
    pub fn text_eol_is_crlf(&self) -> bool {
        match self.auto_crlf {
            AutoCrlf::True => true,
            AutoCrlf::Input => false,
            AutoCrlf::False => self.core_eol.resolve() == Eol::Crlf,
        }
    }

    /// Line ending written to the working tree, or `Eol::Unset` for binary
    pub fn output_eol(&self) -> Eol {
        match self.crlf_action {
            CrlfAction::Binary => Eol::Unset,
            CrlfAction::TextCrlf | CrlfAction::AutoCrlf | CrlfAction::Undefined => Eol::Crlf,
            CrlfAction::TextInput | CrlfAction::AutoInput => Eol::Lf,
            CrlfAction::Text | CrlfAction::Auto => {
                if self.text_eol_is_crlf() {
                    Eol::Crlf
                } else {
                    Eol::Lf
                }
            }
        }
    }
}

/// Byte statistics used by the line-ending heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStats {
    /// NUL bytes
    pub nul: usize,
    /// NUL bytes within the first [`BINARY_PROBE_LEN`] bytes
    pub nul_in_probe: usize,
    /// CR bytes
    pub cr: usize,
    /// LF bytes
    pub lf: usize,
    /// CR immediately followed by LF
    pub crlf: usize,
    /// Printable bytes
    pub printable: usize,
    /// Non-printable bytes
    pub nonprintable: usize,
}

impl TextStats {
    /// Gather statistics over `data`
    pub fn gather(data: &[u8]) -> Self {
        let mut stats = TextStats::default();
        let last = data.len().saturating_sub(1);

        for (i, &c) in data.iter().enumerate() {
            if (c > 0x1f && c != 0x7f) || c == 0x08 || c == 0x1b || c == 0x0c {
                stats.printable += 1;
                continue;
            }
            match c {
                0 => {
                    stats.nul += 1;
                    if i < BINARY_PROBE_LEN {
                        stats.nul_in_probe += 1;
                    }
                    stats.nonprintable += 1;
                }
                b'\n' => stats.lf += 1,
                b'\r' => {
                    stats.cr += 1;
                    if data.get(i + 1) == Some(&b'\n') {
                        stats.crlf += 1;
                    }
                }
                b'\t' | 0x0b => stats.printable += 1,
                // DOS end-of-file marker at the very end
                0x1a if i == last => {}
                _ => stats.nonprintable += 1,
            }
        }

        stats
    }

    /// Whether the content should be treated as binary
    ///
    /// A bare CR, a NUL near the start, or more than one non-printable byte
    /// per 128 printable ones marks content as binary.
    pub fn is_binary(&self) -> bool {
        self.cr != self.crlf || self.nul_in_probe > 0 || (self.printable >> 7) < self.nonprintable
    }
}

/// Strip the CR from every CRLF pair
pub fn crlf_to_lf(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut start = 0;

    for pos in memchr_iter(b'\r', input) {
        if input.get(pos + 1) == Some(&b'\n') {
            out.extend_from_slice(&input[start..pos]);
            start = pos + 1;
        }
    }
    out.extend_from_slice(&input[start..]);
    out
}

/// Expand every LF not already preceded by CR into CRLF
pub fn lf_to_crlf(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 8);
    let mut start = 0;

    for pos in memchr_iter(b'\n', input) {
        out.extend_from_slice(&input[start..pos]);
        if pos == 0 || input[pos - 1] != b'\r' {
            out.push(b'\r');
        }
        out.push(b'\n');
        start = pos + 1;
    }
    out.extend_from_slice(&input[start..]);
    out
}

/// Whether the staged version of the file contains a CR
///
/// Non-regular index entries count as containing a CR so they are never
/// converted. A missing entry, or any failure to read the index or the blob,
/// counts as no CR.
pub fn has_cr_in_index(source: &FilterSource) -> bool {
    let Some(path) = source.path() else {
        return false;
    };

    let odb = source.repo().odb();
    let entry = match odb.index_entry(path) {
        Ok(Some(entry)) => entry,
        Ok(None) => return false,
        Err(e) => {
            debug!("Index lookup for '{}' failed, assuming no CR: {}", path, e);
            return false;
        }
    };

    if !entry.is_regular_file() {
        return true;
    }

    match odb.read_blob(&entry.oid) {
        Ok(blob) => memchr(b'\r', blob.raw_content()).is_some(),
        Err(e) => {
            debug!("Reading staged blob for '{}' failed, assuming no CR: {}", path, e);
            false
        }
    }
}

/// The built-in line-ending filter
#[derive(Debug, Default)]
pub struct CrlfFilter;

impl CrlfFilter {
    /// Attribute requirements: load `crlf`, `eol` and `text`
    pub const ATTRIBUTES: &'static str = "crlf eol text";

    /// Create the filter
    pub fn new() -> Self {
        CrlfFilter
    }

    fn check_safecrlf(ca: &CrlfAttrs, source: &FilterSource, stats: &TextStats) -> FilterResult<()> {
        if ca.safe_crlf == SafeCrlf::False {
            return Ok(());
        }

        let message = match ca.output_eol() {
            Eol::Lf if stats.crlf > 0 => "CRLF would be replaced by LF",
            Eol::Crlf if stats.crlf != stats.lf => "LF would be replaced by CRLF",
            _ => return Ok(()),
        };

        let err = FilterError::unsafe_conversion(source.path(), message);
        if ca.safe_crlf == SafeCrlf::Warn {
            warn!("{}", err);
            return Ok(());
        }
        Err(err)
    }

    fn apply_to_odb(ca: &CrlfAttrs, source: &FilterSource, input: &[u8]) -> FilterResult<BufferOutcome> {
        if ca.crlf_action == CrlfAction::Binary || input.is_empty() {
            return Ok(BufferOutcome::Passthrough);
        }

        let stats = TextStats::gather(input);

        if ca.crlf_action.is_auto() {
            if stats.is_binary() {
                return Ok(BufferOutcome::Passthrough);
            }
            if has_cr_in_index(source) {
                debug!("Staged '{}' already contains CR, not normalizing", source.path().unwrap_or(""));
                return Ok(BufferOutcome::Passthrough);
            }
        }

        Self::check_safecrlf(ca, source, &stats)?;

        if stats.crlf == 0 {
            return Ok(BufferOutcome::Passthrough);
        }
        Ok(BufferOutcome::Converted(crlf_to_lf(input)))
    }

    fn apply_to_worktree(ca: &CrlfAttrs, input: &[u8]) -> FilterResult<BufferOutcome> {
        if input.is_empty() || ca.output_eol() != Eol::Crlf {
            return Ok(BufferOutcome::Passthrough);
        }

        let stats = TextStats::gather(input);

        if stats.lf == 0 || stats.lf == stats.crlf {
            return Ok(BufferOutcome::Passthrough);
        }

        // any existing CR, paired or not, means the content is left alone
        if ca.crlf_action.is_auto() && (stats.cr > 0 || stats.is_binary()) {
            return Ok(BufferOutcome::Passthrough);
        }

        Ok(BufferOutcome::Converted(lf_to_crlf(input)))
    }
}

impl Filter for CrlfFilter {
    fn attributes(&self) -> &str {
        Self::ATTRIBUTES
    }

    fn check(&self, source: &FilterSource, attrs: Option<&[AttrValue]>) -> FilterResult<CheckOutcome> {
        let ca = CrlfAttrs::compute(source, attrs);
        if ca.crlf_action == CrlfAction::Binary {
            return Ok(CheckOutcome::Passthrough);
        }
        Ok(CheckOutcome::with_payload(ca))
    }

    fn apply(&self, payload: PayloadRef<'_>, source: &FilterSource, input: &[u8]) -> FilterResult<BufferOutcome> {
        let ca = match payload.and_then(|p| p.downcast_ref::<CrlfAttrs>()) {
            Some(ca) => *ca,
            None => {
                let ca = CrlfAttrs::compute(source, None);
                if ca.crlf_action == CrlfAction::Binary {
                    return Ok(BufferOutcome::Passthrough);
                }
                ca
            }
        };

        match source.mode() {
            FilterMode::ToWorktree => Self::apply_to_worktree(&ca, input),
            FilterMode::ToOdb => Self::apply_to_odb(&ca, source, input),
        }
    }
}
