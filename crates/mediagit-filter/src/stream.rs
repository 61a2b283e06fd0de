// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Write streams and filter chains
//!
//! Content is pushed through a chain of [`WriteStream`]s. Each filter wraps
//! the stream built before it, so bytes written to the head of the chain flow
//! through every filter and land in the terminal stream supplied by the caller.

use crate::error::{FilterError, FilterResult};
use crate::filter::{BufferOutcome, StreamSetupError};
use crate::list::FilterList;
use std::mem;
use tracing::{debug, trace};

/// A single-writer sink for filtered content
///
/// Streams accept any number of writes followed by exactly one close. Writing
/// or closing a closed stream fails with [`FilterError::StreamClosed`].
pub trait WriteStream {
    /// Push a chunk of content
    fn write(&mut self, buf: &[u8]) -> FilterResult<()>;

    /// Signal end of content, flushing and closing everything downstream
    fn close(&mut self) -> FilterResult<()>;
}

impl<W: WriteStream + ?Sized> WriteStream for &mut W {
    fn write(&mut self, buf: &[u8]) -> FilterResult<()> {
        (**self).write(buf)
    }

    fn close(&mut self) -> FilterResult<()> {
        (**self).close()
    }
}

impl<W: WriteStream + ?Sized> WriteStream for Box<W> {
    fn write(&mut self, buf: &[u8]) -> FilterResult<()> {
        (**self).write(buf)
    }

    fn close(&mut self) -> FilterResult<()> {
        (**self).close()
    }
}

/// Terminal stream collecting everything into memory
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Vec<u8>,
    complete: bool,
}

impl BufferSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that reuses `buf`, clearing it first
    pub fn with_buffer(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self {
            buf,
            complete: false,
        }
    }

    /// Whether the stream has been closed
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Content received so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the collected content
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl WriteStream for BufferSink {
    fn write(&mut self, buf: &[u8]) -> FilterResult<()> {
        if self.complete {
            return Err(FilterError::StreamClosed);
        }
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) -> FilterResult<()> {
        if self.complete {
            return Err(FilterError::StreamClosed);
        }
        self.complete = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Closing,
    Closed,
}

type ApplyFn<'a> = Box<dyn FnMut(&[u8]) -> FilterResult<BufferOutcome> + 'a>;

/// Adapts a whole-buffer transform to the [`WriteStream`] interface
///
/// Writes are accumulated. On close the transform runs once over the complete
/// input and its result (or the untouched input, on passthrough) is written
/// downstream, which is then closed.
pub struct BufferedStream<'a> {
    apply: ApplyFn<'a>,
    next: Box<dyn WriteStream + 'a>,
    input: Vec<u8>,
    state: StreamState,
}

impl<'a> BufferedStream<'a> {
    /// Wrap `next` with the transform `apply`
    pub fn new<F>(apply: F, next: Box<dyn WriteStream + 'a>) -> Self
    where
        F: FnMut(&[u8]) -> FilterResult<BufferOutcome> + 'a,
    {
        Self {
            apply: Box::new(apply),
            next,
            input: Vec::new(),
            state: StreamState::Open,
        }
    }

    fn forward(&mut self, content: &[u8]) -> FilterResult<()> {
        match self.next.write(content) {
            Ok(()) => self.next.close(),
            Err(e) => {
                let _ = self.next.close();
                Err(e)
            }
        }
    }
}

impl WriteStream for BufferedStream<'_> {
    fn write(&mut self, buf: &[u8]) -> FilterResult<()> {
        if self.state != StreamState::Open {
            return Err(FilterError::StreamClosed);
        }
        self.input.extend_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) -> FilterResult<()> {
        if self.state != StreamState::Open {
            return Err(FilterError::StreamClosed);
        }
        self.state = StreamState::Closing;

        let input = mem::take(&mut self.input);
        let result = match (self.apply)(&input) {
            Ok(BufferOutcome::Passthrough) => {
                trace!("Buffered filter passed {} bytes through", input.len());
                self.forward(&input)
            }
            Ok(BufferOutcome::Converted(output)) => {
                trace!("Buffered filter converted {} bytes into {}", input.len(), output.len());
                self.forward(&output)
            }
            Err(e) => {
                // the transform error wins over any close failure
                let _ = self.next.close();
                Err(e)
            }
        };

        self.state = StreamState::Closed;
        result
    }
}

/// Splice every filter in `filters` in front of `target`
///
/// Returns the head of the chain. The first entry of the list ends up next to
/// `target` and the last entry becomes the head. If a filter fails to create
/// its stream, the partial chain is closed before the error is returned.
pub fn build_chain<'a>(
    filters: &'a FilterList,
    target: Box<dyn WriteStream + 'a>,
) -> FilterResult<Box<dyn WriteStream + 'a>> {
    let mut head = target;

    for entry in filters.entries() {
        match entry.filter().stream(entry.payload(), filters.source(), head) {
            Ok(stream) => head = stream,
            Err(StreamSetupError { error, mut downstream }) => {
                debug!("Failed to create stream for filter '{}': {}", entry.name(), error);
                let _ = downstream.close();
                return Err(error);
            }
        }
    }

    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink {
        closed: bool,
    }

    impl WriteStream for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> FilterResult<()> {
            Err(FilterError::Object("disk full".into()))
        }

        fn close(&mut self) -> FilterResult<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn test_buffer_sink_rejects_after_close() {
        let mut sink = BufferSink::new();
        sink.write(b"abc").unwrap();
        sink.close().unwrap();
        assert!(sink.is_complete());
        assert!(matches!(sink.write(b"d"), Err(FilterError::StreamClosed)));
        assert!(matches!(sink.close(), Err(FilterError::StreamClosed)));
        assert_eq!(sink.into_inner(), b"abc");
    }

    #[test]
    fn test_buffered_stream_defers_until_close() {
        let mut sink = BufferSink::new();
        {
            let mut stream = BufferedStream::new(
                |input: &[u8]| Ok(BufferOutcome::Converted(input.to_ascii_uppercase())),
                Box::new(&mut sink),
            );
            stream.write(b"hello ").unwrap();
            stream.write(b"world").unwrap();
            stream.close().unwrap();
            assert!(matches!(stream.write(b"!"), Err(FilterError::StreamClosed)));
        }
        assert!(sink.is_complete());
        assert_eq!(sink.as_bytes(), b"HELLO WORLD");
    }

    #[test]
    fn test_buffered_stream_passthrough_forwards_input() {
        let mut sink = BufferSink::new();
        let mut stream = BufferedStream::new(|_: &[u8]| Ok(BufferOutcome::Passthrough), Box::new(&mut sink));
        stream.write(b"unchanged\r\n").unwrap();
        stream.close().unwrap();
        drop(stream);
        assert_eq!(sink.as_bytes(), b"unchanged\r\n");
    }

    #[test]
    fn test_buffered_stream_error_closes_downstream() {
        let mut sink = BufferSink::new();
        let mut stream = BufferedStream::new(
            |_: &[u8]| Err(FilterError::unsafe_conversion(Some("a.txt"), "CRLF would be replaced by LF")),
            Box::new(&mut sink),
        );
        stream.write(b"x\r\n").unwrap();
        let err = stream.close().unwrap_err();
        drop(stream);
        assert!(matches!(err, FilterError::UnsafeConversion { .. }));
        assert!(sink.is_complete());
        assert!(sink.as_bytes().is_empty());
    }

    #[test]
    fn test_buffered_stream_write_failure_still_closes() {
        let mut sink = FailingSink { closed: false };
        let mut stream = BufferedStream::new(|_: &[u8]| Ok(BufferOutcome::Passthrough), Box::new(&mut sink));
        stream.write(b"data").unwrap();
        assert!(matches!(stream.close(), Err(FilterError::Object(_))));
        drop(stream);
        assert!(sink.closed);
    }
}
