use std::io::{ErrorKind, IoSlice, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_header, Frame, FrameHeader, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Writes complete frames to any `Write` sink.
///
/// Every record goes out as one vectored write of header and payload, so a
/// record is never interleaved with another one. A write that transfers less
/// than the whole record is reported as [`FrameError::ShortWrite`] rather than
/// continued, leaving what was written on disk.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    frames_written: u64,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE),
            frames_written: 0,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let header = frame.header()?;
        self.write_record(&header, frame.payload.as_ref())
    }

    /// Write a header and the payload it describes as a single record.
    ///
    /// `header.block_size` must equal `payload.len()`.
    pub fn write_record(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
        debug_assert_eq!(usize::from(header.block_size), payload.len());

        self.buf.clear();
        encode_header(header, &mut self.buf);

        let expected = self.buf.len() + payload.len();
        let slices = [IoSlice::new(&self.buf), IoSlice::new(payload)];
        let written = loop {
            match self.inner.write_vectored(&slices) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };
        if written != expected {
            return Err(FrameError::ShortWrite { expected, written });
        }

        self.frames_written += 1;
        trace!(
            channel = header.channel,
            size = payload.len(),
            closed = header.channel_closed,
            "wrote frame"
        );
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Number of records written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
