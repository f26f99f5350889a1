//! The capture loop.
//!
//! One thread, one blocking readiness wait. Each wake computes a single
//! timestamp and pumps every ready channel in fixed order: stdin, stdout,
//! stderr. The loop ends when all three channels are closed or the child has
//! exited; the session is then sealed with one terminal frame carrying the
//! child's exit code.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::ExitStatus;

use bidi_tee_frame::{Frame, FrameWriter, MAX_BLOCK_SIZE, STDERR, STDIN, STDOUT};
use signal_hook::consts::SIGCHLD;
use signal_hook::SigId;
use tracing::{debug, info, warn};

use crate::clock;
use crate::copier::ChannelCopier;
use crate::error::{CaptureError, Result};
use crate::launcher::{self, Child, ChildPipes};

const READY: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

/// Capture tuning.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Scratch buffer size, i.e. the largest single read. Capped at the frame
    /// size limit.
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: MAX_BLOCK_SIZE,
        }
    }
}

/// How a capture session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// The child's wait status.
    pub status: ExitStatus,
    /// The exit code recorded in the terminal frame.
    pub exit_code: u8,
    /// Records written to the log, terminal frame included.
    pub frames: u64,
}

/// This process' own ends of the three channels.
#[derive(Debug)]
pub struct ParentStreams {
    /// Read to feed the child's stdin.
    pub input: File,
    /// Receives the child's stdout.
    pub output: File,
    /// Receives the child's stderr.
    pub error: File,
}

impl ParentStreams {
    /// Duplicates of this process' stdin, stdout and stderr.
    ///
    /// Duplicates are used so that closing a forward destination never closes
    /// the descriptors the rest of the process writes diagnostics to.
    pub fn inherit() -> io::Result<Self> {
        Ok(Self {
            input: File::from(io::stdin().as_fd().try_clone_to_owned()?),
            output: File::from(io::stdout().as_fd().try_clone_to_owned()?),
            error: File::from(io::stderr().as_fd().try_clone_to_owned()?),
        })
    }
}

/// Wakes the readiness wait when a child process exits.
///
/// `SIGCHLD` writes a byte into a socket pair whose read end joins the wait,
/// so a notification arriving just before the wait is never lost. Any child
/// of this process triggers it; [`Multiplexer`] confirms with a non-blocking
/// wait on its own pid.
pub struct ExitWatch {
    receiver: UnixStream,
    id: SigId,
}

impl ExitWatch {
    /// Register the notification. Must happen before the child is spawned.
    pub fn install() -> Result<Self> {
        let (receiver, sender) = UnixStream::pair().map_err(CaptureError::Signal)?;
        receiver.set_nonblocking(true).map_err(CaptureError::Signal)?;
        sender.set_nonblocking(true).map_err(CaptureError::Signal)?;
        let id = signal_hook::low_level::pipe::register(SIGCHLD, sender)
            .map_err(CaptureError::Signal)?;
        Ok(Self { receiver, id })
    }

    fn raw_fd(&self) -> RawFd {
        self.receiver.as_raw_fd()
    }

    fn drain(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.receiver.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

impl Drop for ExitWatch {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

/// Owns the three channel copiers, the child and the log for one session.
pub struct Multiplexer<W> {
    copiers: [ChannelCopier<File, File>; 3],
    log: FrameWriter<W>,
    child: Child,
    watch: ExitWatch,
    buf: Vec<u8>,
}

impl<W: Write> Multiplexer<W> {
    /// Wire the child's pipes to this process' streams.
    pub fn new(
        child: Child,
        pipes: ChildPipes,
        parent: ParentStreams,
        watch: ExitWatch,
        log: W,
        config: &CaptureConfig,
    ) -> Self {
        let copiers = [
            ChannelCopier::new(STDIN, parent.input, pipes.stdin),
            ChannelCopier::new(STDOUT, pipes.stdout, parent.output),
            ChannelCopier::new(STDERR, pipes.stderr, parent.error),
        ];
        Self {
            copiers,
            log: FrameWriter::new(log),
            child,
            watch,
            buf: vec![0u8; config.buffer_size.clamp(1, MAX_BLOCK_SIZE)],
        }
    }

    /// Run the loop to completion and seal the log.
    ///
    /// Only a failed log write (or a failed wait) aborts the session; records
    /// already written stay in the log.
    pub fn run(mut self) -> Result<(CaptureOutcome, W)> {
        let mut exited = None;
        while exited.is_none() && self.copiers.iter().any(|c| !c.is_closed()) {
            let mut fds = Vec::with_capacity(4);
            fds.push(pollfd(self.watch.raw_fd()));
            let mut slots = Vec::with_capacity(3);
            for (index, copier) in self.copiers.iter().enumerate() {
                if !copier.is_closed() {
                    fds.push(pollfd(copier.source().as_raw_fd()));
                    slots.push(index);
                }
            }

            if !wait_ready(&mut fds, -1)? {
                continue;
            }

            let timestamp = clock::timestamp_ns();
            for (fd, &index) in fds[1..].iter().zip(&slots) {
                if fd.revents & READY != 0 {
                    self.copiers[index].pump(timestamp, &mut self.buf, &mut self.log)?;
                }
            }

            if fds[0].revents & READY != 0 {
                self.watch.drain();
                exited = self.child.try_wait()?;
            }
        }

        let status = match exited {
            Some(status) => {
                debug!(pid = self.child.id(), "child exited, draining output");
                self.drain_output()?;
                status
            }
            None => self.child.wait()?,
        };

        let exit_code = launcher::exit_code(status);
        self.log
            .write_frame(&Frame::exit(clock::timestamp_ns(), exit_code))?;
        self.log.flush()?;

        let outcome = CaptureOutcome {
            status,
            exit_code,
            frames: self.log.frames_written(),
        };
        info!(
            pid = self.child.id(),
            exit_code,
            frames = outcome.frames,
            "capture finished"
        );
        Ok((outcome, self.log.into_inner()))
    }

    /// Pump whatever the exited child left in its output pipes, without blocking.
    fn drain_output(&mut self) -> Result<()> {
        loop {
            let mut fds = Vec::with_capacity(2);
            let mut slots = Vec::with_capacity(2);
            for (index, copier) in self.copiers.iter().enumerate().skip(1) {
                if !copier.is_closed() {
                    fds.push(pollfd(copier.source().as_raw_fd()));
                    slots.push(index);
                }
            }
            if fds.is_empty() || !wait_ready(&mut fds, 0)? {
                return Ok(());
            }

            let timestamp = clock::timestamp_ns();
            let mut pumped = false;
            for (fd, &index) in fds.iter().zip(&slots) {
                if fd.revents & READY != 0 {
                    self.copiers[index].pump(timestamp, &mut self.buf, &mut self.log)?;
                    pumped = true;
                }
            }
            if !pumped {
                return Ok(());
            }
        }
    }
}

/// Spawn `program` and capture its traffic with this process' own streams.
///
/// `open_log` runs only after the child was created, so a failed spawn
/// leaves no log behind. If it fails, the child is killed and reaped and
/// [`CaptureError::LogOpen`] is returned. Returns once the terminal frame is
/// written.
pub fn capture<W, F>(
    program: &Path,
    args: &[OsString],
    parent: ParentStreams,
    open_log: F,
    config: &CaptureConfig,
) -> Result<(CaptureOutcome, W)>
where
    W: Write,
    F: FnOnce(&Child) -> io::Result<W>,
{
    let watch = ExitWatch::install()?;
    let (mut child, pipes) = launcher::spawn(program, args)?;
    let log = match open_log(&child) {
        Ok(log) => log,
        Err(err) => {
            if let Err(kill_err) = child.kill() {
                warn!(pid = child.id(), error = %kill_err, "couldn't stop child");
            }
            return Err(CaptureError::LogOpen(err));
        }
    };
    Multiplexer::new(child, pipes, parent, watch, log, config).run()
}

fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Wait for readiness. Returns `false` if interrupted before anything was ready.
fn wait_ready(fds: &mut [libc::pollfd], timeout_ms: libc::c_int) -> Result<bool> {
    // SAFETY: `fds` is a valid, exclusively borrowed slice of pollfd structs.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(CaptureError::Poll(err));
    }
    Ok(rc > 0)
}
