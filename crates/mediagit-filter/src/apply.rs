// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Running filter lists over buffers, files and blobs
//!
//! Every entry point accepts an optional list; `None` (or an empty list)
//! copies the content through unchanged. The `stream_*` variants write into a
//! caller-supplied [`WriteStream`] and always close it, including on error.
//! The `apply_to_*` variants collect the result into memory.

use crate::error::{FilterError, FilterResult};
use crate::list::FilterList;
use crate::oid::Blob;
use crate::repository::Repository;
use crate::stream::{build_chain, BufferSink, WriteStream};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::debug;

/// Chunk size used when streaming files
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Build the chain, run `feed` against its head, then close it
///
/// The chain is closed even when `feed` fails; the feed error wins.
fn with_chain<F>(filters: Option<&FilterList>, target: &mut dyn WriteStream, feed: F) -> FilterResult<()>
where
    F: FnOnce(&mut dyn WriteStream) -> FilterResult<()>,
{
    let mut head: Box<dyn WriteStream + '_> = match filters {
        Some(list) if !list.is_empty() => build_chain(list, Box::new(target))?,
        _ => Box::new(target),
    };

    let fed = feed(head.as_mut());
    let closed = head.close();
    fed.and(closed)
}

/// Filter `input` into `target`
pub fn stream_buffer(filters: Option<&FilterList>, input: &[u8], target: &mut dyn WriteStream) -> FilterResult<()> {
    with_chain(filters, target, |head| head.write(input))
}

/// Filter the file at `path` into `target`
///
/// Relative paths are resolved against the repository working directory. The
/// file is read in [`FILE_CHUNK_SIZE`] chunks through the list's scratch buffer.
pub fn stream_file(
    mut filters: Option<&mut FilterList>,
    repo: &Repository,
    path: impl AsRef<Path>,
    target: &mut dyn WriteStream,
) -> FilterResult<()> {
    let full_path = repo.workdir_path(path.as_ref());
    debug!("Filtering file: {}", full_path.display());

    let mut scratch = filters.as_deref_mut().map(FilterList::take_scratch).unwrap_or_default();
    scratch.resize(FILE_CHUNK_SIZE, 0);

    let result = with_chain(filters.as_deref(), target, |head| {
        let mut file = File::open(&full_path)?;
        loop {
            let n = match file.read(&mut scratch) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(FilterError::Io(e)),
            };
            head.write(&scratch[..n])?;
        }
    });

    if let Some(list) = filters {
        list.restore_scratch(scratch);
    }
    result
}

/// Filter the content of `blob` into `target`
///
/// The blob id is recorded on the list's source before filtering.
pub fn stream_blob(mut filters: Option<&mut FilterList>, blob: &Blob, target: &mut dyn WriteStream) -> FilterResult<()> {
    if let Some(list) = filters.as_deref_mut() {
        list.source_mut().set_id(Some(*blob.id()));
    }

    with_chain(filters.as_deref(), target, |head| {
        let size = blob.raw_size();
        if usize::try_from(size).is_err() {
            return Err(FilterError::BlobTooLarge(size));
        }
        head.write(blob.raw_content())
    })
}

/// Filter `input` into a new buffer
pub fn apply_to_buffer(filters: Option<&FilterList>, input: &[u8]) -> FilterResult<Vec<u8>> {
    let mut sink = BufferSink::new();
    stream_buffer(filters, input, &mut sink)?;
    Ok(sink.into_inner())
}

/// Filter the file at `path` into a new buffer
pub fn apply_to_file(filters: Option<&mut FilterList>, repo: &Repository, path: impl AsRef<Path>) -> FilterResult<Vec<u8>> {
    let mut sink = BufferSink::new();
    stream_file(filters, repo, path, &mut sink)?;
    Ok(sink.into_inner())
}

/// Filter the content of `blob` into a new buffer
pub fn apply_to_blob(filters: Option<&mut FilterList>, blob: &Blob) -> FilterResult<Vec<u8>> {
    let mut sink = BufferSink::new();
    stream_blob(filters, blob, &mut sink)?;
    Ok(sink.into_inner())
}

/// Filter an owned buffer, handing it back untouched when there is nothing to do
pub fn convert_buf(filters: Option<&FilterList>, input: Vec<u8>) -> FilterResult<Vec<u8>> {
    match filters {
        Some(list) if !list.is_empty() => apply_to_buffer(Some(list), &input),
        _ => Ok(input),
    }
}
