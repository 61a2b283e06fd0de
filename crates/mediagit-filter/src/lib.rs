// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! # MediaGit Content Filters
//!
//! Attribute-driven content filtering between the working tree and the
//! object store.
//!
//! ## Architecture
//!
//! - **Registry**: a process-wide, priority-ordered table of named
//!   [`Filter`]s, lazily initialized on first use ([`FilterRegistry`])
//! - **Filter lists**: the filters that apply to one path, chosen by matching
//!   each filter's attribute requirements against the path's resolved
//!   attributes ([`FilterList`])
//! - **Streams**: filters are chained as [`WriteStream`]s; buffer-oriented
//!   filters are adapted by [`BufferedStream`]
//! - **CRLF**: the built-in line-ending filter ([`CrlfFilter`]), configured by
//!   `core.autocrlf`, `core.safecrlf` and `core.eol`
//!
//! Attribute resolution and object storage are supplied by the host through
//! [`AttributeResolver`] and [`ObjectStore`].
//!
//! ## Usage
//!
//! ```rust
//! use mediagit_filter::{
//!     apply_to_buffer, AutoCrlf, CoreConfig, FilterList, FilterMode, FilterOptions, Repository,
//! };
//!
//! let repo = Repository::builder()
//!     .core(CoreConfig::default().with_autocrlf(AutoCrlf::True))
//!     .build();
//!
//! // Normalize line endings on the way into the object store
//! let list = FilterList::load(&repo, None, "README.md", FilterMode::ToOdb, &FilterOptions::default())?;
//! let clean = apply_to_buffer(list.as_ref(), b"hello\r\nworld\r\n")?;
//! assert_eq!(clean, b"hello\nworld\n");
//!
//! // ...and expand them again on checkout
//! let list = FilterList::load(&repo, None, "README.md", FilterMode::ToWorktree, &FilterOptions::default())?;
//! let smudged = apply_to_buffer(list.as_ref(), &clean)?;
//! assert_eq!(smudged, b"hello\r\nworld\r\n");
//! # Ok::<(), mediagit_filter::FilterError>(())
//! ```

pub mod apply;
pub mod attr;
pub mod config;
pub mod crlf;
pub mod error;
pub mod filter;
pub mod ident;
pub mod list;
pub mod mock;
pub mod oid;
pub mod registry;
pub mod repository;
pub mod stream;

pub use apply::{
    apply_to_blob, apply_to_buffer, apply_to_file, convert_buf, stream_blob, stream_buffer, stream_file,
    FILE_CHUNK_SIZE,
};
pub use attr::{AttrCheckOptions, AttrKind, AttrRequirement, AttrRequirements, AttrValue, Expectation};
pub use config::{AutoCrlf, ConfigFormat, CoreConfig, Eol, RepoConfig, SafeCrlf};
pub use crlf::{CrlfAction, CrlfAttrs, CrlfFilter, TextStats};
pub use error::{FilterError, FilterResult};
pub use filter::{
    BufferOutcome, CheckOutcome, Filter, FilterFlags, FilterMode, FilterOptions, FilterSource, Payload, PayloadRef,
    StreamSetupError, CRLF_PRIORITY, DRIVER_PRIORITY, FILTER_CRLF, FILTER_IDENT, IDENT_PRIORITY,
};
pub use ident::IdentFilter;
pub use list::FilterList;
pub use oid::{Blob, Oid};
pub use registry::{lookup_filter, register_filter, unregister_filter, FilterRegistry};
pub use repository::{AttributeResolver, ConfigmapItem, IndexEntry, ObjectStore, Repository, RepositoryBuilder};
pub use stream::{build_chain, BufferSink, BufferedStream, WriteStream};
