use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_header, Frame, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `Read` source, front to back.
///
/// Handles partial reads internally; callers always get complete frames.
/// A source that ends exactly on a record boundary yields `Ok(None)`; one that
/// ends inside a header or payload yields [`FrameError::Truncated`].
pub struct FrameReader<T> {
    inner: T,
    offset: u64,
    done: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            offset: 0,
            done: false,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` at a clean end of log.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut raw = [0u8; HEADER_SIZE];
        let got = self.fill(&mut raw)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(FrameError::Truncated {
                what: "header",
                expected: HEADER_SIZE,
                got,
            });
        }

        let header = decode_header(&raw);
        let size = usize::from(header.block_size);
        let mut payload = BytesMut::zeroed(size);
        if size > 0 {
            let got = self.fill(&mut payload)?;
            if got < size {
                return Err(FrameError::Truncated {
                    what: "payload",
                    expected: size,
                    got,
                });
            }
        }

        trace!(
            offset = self.offset,
            channel = header.channel,
            size,
            "decoded frame"
        );
        Ok(Some(Frame::from_parts(header, payload.freeze())))
    }

    /// Number of bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner source.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Read until `buf` is full or the source is exhausted; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }
}

/// Yields frames until the clean end of log or the first error.
impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::channel::{STDERR, STDIN, STDOUT};
    use crate::writer::FrameWriter;

    fn log_of(frames: &[Frame]) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn read_single_frame() {
        let wire = log_of(&[Frame::data(STDOUT, 7, &b"hello"[..])]);

        let mut reader = FrameReader::new(Cursor::new(wire));
        let frame = reader.read_frame().unwrap().unwrap();

        assert_eq!(frame.channel, STDOUT);
        assert_eq!(frame.timestamp_ns, 7);
        assert_eq!(frame.payload.as_ref(), b"hello");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn iterates_in_file_order() {
        let frames = vec![
            Frame::data(STDIN, 1, &b"in"[..]),
            Frame::data(STDOUT, 2, &b"out"[..]),
            Frame::closed(STDERR, 3),
            Frame::exit(4, 9),
        ];
        let wire = log_of(&frames);

        let decoded: Vec<Frame> = FrameReader::new(Cursor::new(wire))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn empty_source_is_clean_end() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read_frame().unwrap().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn short_header_is_truncation() {
        let mut wire = log_of(&[Frame::data(STDOUT, 1, &b"ok"[..])]);
        wire.extend_from_slice(&[0u8; 5]);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert!(reader.read_frame().unwrap().is_some());
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                what: "header",
                expected: HEADER_SIZE,
                got: 5
            }
        ));
    }

    #[test]
    fn short_payload_is_truncation() {
        let mut wire = log_of(&[Frame::data(STDOUT, 1, &b"complete"[..])]);
        wire.truncate(wire.len() - 3);

        let mut reader = FrameReader::new(Cursor::new(wire));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                what: "payload",
                expected: 8,
                got: 5
            }
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let mut wire = log_of(&[Frame::data(STDOUT, 1, &b"x"[..])]);
        wire.push(0);

        let mut reader = FrameReader::new(Cursor::new(wire));
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn partial_read_handling() {
        let wire = log_of(&[Frame::data(STDERR, 11, &b"slow"[..])]);
        let total = wire.len() as u64;

        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire,
            pos: 0,
        });

        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame.channel, STDERR);
        assert_eq!(frame.payload.as_ref(), b"slow");
        assert_eq!(reader.offset(), total);
    }

    #[test]
    fn interrupted_read_retries() {
        let wire = log_of(&[Frame::data(STDIN, 1, &b"ok"[..])]);

        let mut framed = FrameReader::new(InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire),
        });
        let frame = framed.read_frame().unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[test]
    fn io_error_propagates() {
        let mut framed = FrameReader::new(FailingReader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::PermissionDenied));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::PermissionDenied))
        }
    }
}
