use std::io::{ErrorKind, Read, Write};

use bidi_tee_frame::{FrameHeader, FrameWriter, MAX_BLOCK_SIZE};
use tracing::{debug, warn};

/// Owns one direction of traffic: a source to read, a destination to forward
/// to, and the channel id the reads are recorded under.
///
/// Once the source reports end-of-stream (or fails), the copier is closed for
/// good and its forward destination is dropped, passing the half-close on.
pub struct ChannelCopier<R, W> {
    channel: u8,
    source: R,
    sink: Option<W>,
    closed: bool,
    bytes_read: u64,
}

impl<R: Read, W: Write> ChannelCopier<R, W> {
    /// Create an open copier for `channel`.
    pub fn new(channel: u8, source: R, sink: W) -> Self {
        Self {
            channel,
            source,
            sink: Some(sink),
            closed: false,
            bytes_read: 0,
        }
    }

    /// The channel id frames are tagged with.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// True once the source has reached end-of-stream.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total payload bytes read from the source.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Borrow the read source.
    pub fn source(&self) -> &R {
        &self.source
    }

    /// Do one read, forward it, and log it as exactly one frame.
    ///
    /// Reads at most `buf.len()` bytes (capped at the frame size limit). A
    /// zero-length read or a read error closes the copier; the frame written
    /// for that call has `channel_closed` set and no payload. Forwarding is
    /// best-effort: if the destination fails part-way, the rest of this read
    /// is not forwarded but is still logged. Pumping a closed copier is a no-op.
    ///
    /// Returns the number of payload bytes recorded.
    pub fn pump<L: Write>(
        &mut self,
        timestamp_ns: i64,
        buf: &mut [u8],
        log: &mut FrameWriter<L>,
    ) -> bidi_tee_frame::Result<usize> {
        if self.closed {
            return Ok(0);
        }

        let cap = buf.len().min(MAX_BLOCK_SIZE);
        let read = loop {
            match self.source.read(&mut buf[..cap]) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(channel = self.channel, error = %err, "read failed, closing channel");
                    break 0;
                }
            }
        };

        if read == 0 {
            self.closed = true;
            self.sink = None;
            debug!(channel = self.channel, "channel closed");
        } else {
            self.bytes_read += read as u64;
            if let Some(sink) = self.sink.as_mut() {
                forward(self.channel, sink, &buf[..read]);
            }
        }

        let header = FrameHeader {
            timestamp_ns,
            channel: self.channel,
            channel_closed: self.closed,
            reserved: 0,
            block_size: read as u16,
        };
        log.write_record(&header, &buf[..read])?;
        Ok(read)
    }
}

/// Write all of `data`, giving up silently on the first error.
fn forward<W: Write>(channel: u8, sink: &mut W, mut data: &[u8]) {
    while !data.is_empty() {
        match sink.write(data) {
            Ok(0) => break,
            Ok(n) => data = &data[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(channel, dropped = data.len(), error = %err, "forward write failed");
                return;
            }
        }
    }
    if !data.is_empty() {
        warn!(channel, dropped = data.len(), "forward destination stopped accepting bytes");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bidi_tee_frame::{Frame, FrameReader, STDOUT};

    use super::*;

    fn frames(log: FrameWriter<Vec<u8>>) -> Vec<Frame> {
        FrameReader::new(Cursor::new(log.into_inner()))
            .collect::<bidi_tee_frame::Result<_>>()
            .unwrap()
    }

    #[test]
    fn pump_forwards_and_logs_one_frame_per_read() {
        let mut copier = ChannelCopier::new(STDOUT, Cursor::new(b"abc".to_vec()), Vec::new());
        let mut log = FrameWriter::new(Vec::new());
        let mut buf = [0u8; 2];

        assert_eq!(copier.pump(10, &mut buf, &mut log).unwrap(), 2);
        assert_eq!(copier.pump(20, &mut buf, &mut log).unwrap(), 1);
        assert_eq!(copier.pump(30, &mut buf, &mut log).unwrap(), 0);
        assert!(copier.is_closed());
        assert_eq!(copier.bytes_read(), 3);

        let frames = frames(log);
        assert_eq!(
            frames,
            vec![
                Frame::data(STDOUT, 10, &b"ab"[..]),
                Frame::data(STDOUT, 20, &b"c"[..]),
                Frame::closed(STDOUT, 30),
            ]
        );
    }

    #[test]
    fn pump_after_close_writes_nothing() {
        let mut copier = ChannelCopier::new(STDOUT, Cursor::new(Vec::new()), Vec::new());
        let mut log = FrameWriter::new(Vec::new());
        let mut buf = [0u8; 8];

        copier.pump(1, &mut buf, &mut log).unwrap();
        copier.pump(2, &mut buf, &mut log).unwrap();
        assert_eq!(log.frames_written(), 1);
    }

    #[test]
    fn close_drops_forward_destination() {
        let mut copier = ChannelCopier::new(STDOUT, Cursor::new(b"x".to_vec()), Vec::new());
        let mut log = FrameWriter::new(Vec::new());
        let mut buf = [0u8; 8];

        copier.pump(1, &mut buf, &mut log).unwrap();
        assert_eq!(copier.sink.as_deref(), Some(&b"x"[..]));
        copier.pump(2, &mut buf, &mut log).unwrap();
        assert!(copier.sink.is_none());
    }

    #[test]
    fn read_error_closes_channel() {
        let mut copier = ChannelCopier::new(STDOUT, BrokenSource, Vec::new());
        let mut log = FrameWriter::new(Vec::new());
        let mut buf = [0u8; 8];

        copier.pump(5, &mut buf, &mut log).unwrap();
        assert!(copier.is_closed());
        assert_eq!(frames(log), vec![Frame::closed(STDOUT, 5)]);
    }

    #[test]
    fn forward_failure_still_logs_payload() {
        let mut copier =
            ChannelCopier::new(STDOUT, Cursor::new(b"payload".to_vec()), LimitedSink::new(3));
        let mut log = FrameWriter::new(Vec::new());
        let mut buf = [0u8; 64];

        copier.pump(1, &mut buf, &mut log).unwrap();
        assert!(!copier.is_closed());
        assert_eq!(copier.sink.as_ref().unwrap().data, b"pay");
        assert_eq!(frames(log), vec![Frame::data(STDOUT, 1, &b"payload"[..])]);
    }

    #[test]
    fn read_size_capped_at_block_limit() {
        let data = vec![7u8; MAX_BLOCK_SIZE + 10];
        let mut copier = ChannelCopier::new(STDOUT, Cursor::new(data), Vec::new());
        let mut log = FrameWriter::new(Vec::new());
        let mut buf = vec![0u8; MAX_BLOCK_SIZE + 100];

        assert_eq!(copier.pump(1, &mut buf, &mut log).unwrap(), MAX_BLOCK_SIZE);
        assert_eq!(copier.pump(2, &mut buf, &mut log).unwrap(), 10);
    }

    struct BrokenSource;

    impl Read for BrokenSource {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::ConnectionReset))
        }
    }

    struct LimitedSink {
        room: usize,
        data: Vec<u8>,
    }

    impl LimitedSink {
        fn new(room: usize) -> Self {
            Self {
                room,
                data: Vec::new(),
            }
        }
    }

    impl Write for LimitedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.room == 0 {
                return Err(std::io::Error::from(ErrorKind::BrokenPipe));
            }
            let n = buf.len().min(self.room);
            self.data.extend_from_slice(&buf[..n]);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
