//! Process launcher: three pipes, one `fork`, one `execv`.

use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tracing::{debug, info};

use crate::error::{CaptureError, Result};
use crate::pipe::Pipe;

/// Exit status of a child whose program could not be loaded.
pub const EXEC_FAILED_STATUS: i32 = 127;

/// Parent-side ends of the child's standard streams.
#[derive(Debug)]
pub struct ChildPipes {
    /// Write end feeding the child's stdin.
    pub stdin: File,
    /// Read end draining the child's stdout.
    pub stdout: File,
    /// Read end draining the child's stderr.
    pub stderr: File,
}

/// A spawned child process.
#[derive(Debug)]
pub struct Child {
    pid: libc::pid_t,
    program: PathBuf,
    status: Option<ExitStatus>,
}

impl Child {
    /// OS process id.
    pub fn id(&self) -> u32 {
        self.pid as u32
    }

    /// The program the child was asked to run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Collect the exit status if the child has already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.waitpid(libc::WNOHANG)?;
        }
        Ok(self.status)
    }

    /// Block until the child exits and return its status.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        loop {
            if let Some(status) = self.waitpid(0)? {
                self.status = Some(status);
                return Ok(status);
            }
        }
    }

    /// Kill the child with `SIGKILL` and reap it.
    pub fn kill(&mut self) -> Result<ExitStatus> {
        if self.status.is_none() {
            // SAFETY: `pid` is our own, not yet reaped child, so it cannot
            // have been recycled for another process.
            if unsafe { libc::kill(self.pid, libc::SIGKILL) } < 0 {
                return Err(CaptureError::Wait {
                    pid: self.id(),
                    source: io::Error::last_os_error(),
                });
            }
        }
        self.wait()
    }

    fn waitpid(&self, flags: libc::c_int) -> Result<Option<ExitStatus>> {
        let mut raw: libc::c_int = 0;
        loop {
            // SAFETY: `raw` is a valid out-pointer; `pid` is our own child.
            let rc = unsafe { libc::waitpid(self.pid, &mut raw, flags) };
            if rc == self.pid {
                return Ok(Some(ExitStatus::from_raw(raw)));
            }
            if rc == 0 {
                return Ok(None);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(CaptureError::Wait {
                pid: self.id(),
                source: err,
            });
        }
    }
}

/// Map a wait status onto the single byte recorded in the terminal frame.
///
/// Normal exits keep their code; a child killed by signal `N` maps to `128 + N`.
pub fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return (code & 0xff) as u8;
    }
    match status.signal() {
        Some(signal) => (128 + signal).clamp(0, 255) as u8,
        None => 1,
    }
}

/// Spawn `program` with `args`, its stdin/stdout/stderr bound to fresh pipes.
///
/// `program` must be an absolute path; no `PATH` lookup is performed. The
/// child sees `program` itself as `argv[0]`. If the program cannot be loaded,
/// the child reports why on its stderr pipe and exits with
/// [`EXEC_FAILED_STATUS`], so the failure is captured like any other output.
pub fn spawn(program: &Path, args: &[OsString]) -> Result<(Child, ChildPipes)> {
    // Everything the child needs is prepared up front: after fork it may only
    // make async-signal-safe calls.
    let c_program = to_cstring(program.as_os_str())?;
    let c_args = std::iter::once(Ok(c_program.clone()))
        .chain(args.iter().map(|arg| to_cstring(arg)))
        .collect::<Result<Vec<_>>>()?;
    let mut argv: Vec<*const libc::c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(std::ptr::null());
    let diagnostic = format!("Failed to execute {}: ", program.display());
    // SAFETY: sigemptyset only initialises the zeroed set it is handed.
    let empty_mask = unsafe {
        let mut mask: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut mask);
        mask
    };

    let stdin = Pipe::new().map_err(CaptureError::Pipe)?;
    let stdout = Pipe::new().map_err(CaptureError::Pipe)?;
    let stderr = Pipe::new().map_err(CaptureError::Pipe)?;

    // SAFETY: the child branch below only calls async-signal-safe functions
    // (close, dup2, fcntl, signal, sigprocmask, execv, write, _exit) on data
    // prepared before fork.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(CaptureError::Spawn {
            program: program.to_path_buf(),
            source: io::Error::last_os_error(),
        });
    }

    if pid == 0 {
        // SAFETY: we are the freshly forked child; see above.
        unsafe {
            libc::close(stdin.writer.as_raw_fd());
            libc::close(stdout.reader.as_raw_fd());
            libc::close(stderr.reader.as_raw_fd());

            redirect(stdin.reader.as_raw_fd(), libc::STDIN_FILENO);
            redirect(stdout.writer.as_raw_fd(), libc::STDOUT_FILENO);
            redirect(stderr.writer.as_raw_fd(), libc::STDERR_FILENO);

            // The Rust runtime ignores SIGPIPE and an ignored disposition
            // survives exec. The program gets the default one, and no
            // blocked signals.
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            libc::sigprocmask(libc::SIG_SETMASK, &empty_mask, std::ptr::null_mut());

            libc::execv(c_program.as_ptr(), argv.as_ptr());

            let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
            report_exec_failure(diagnostic.as_bytes(), errno);
            libc::_exit(EXEC_FAILED_STATUS);
        }
    }

    info!(pid, program = %program.display(), "spawned child");

    // Child-side ends are dropped here, closing the parent's copies.
    let Pipe {
        reader: stdin_child,
        writer: stdin_parent,
    } = stdin;
    let Pipe {
        reader: stdout_parent,
        writer: stdout_child,
    } = stdout;
    let Pipe {
        reader: stderr_parent,
        writer: stderr_child,
    } = stderr;
    drop((stdin_child, stdout_child, stderr_child));
    debug!(pid, "closed child-side pipe ends");

    Ok((
        Child {
            pid,
            program: program.to_path_buf(),
            status: None,
        },
        ChildPipes {
            stdin: File::from(stdin_parent),
            stdout: File::from(stdout_parent),
            stderr: File::from(stderr_parent),
        },
    ))
}

fn to_cstring(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| CaptureError::InvalidArgument(value.to_os_string()))
}

/// Move `fd` onto `target`, keeping it open across exec.
///
/// # Safety
///
/// Only for use in a forked child before exec.
unsafe fn redirect(fd: RawFd, target: RawFd) {
    if fd == target {
        // dup2 onto itself keeps FD_CLOEXEC; clear it explicitly.
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags >= 0 {
            libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
        }
    } else {
        libc::dup2(fd, target);
    }
}

/// Write `<prefix><reason> (errno N) (note, need absolute path to binary)` to stderr.
///
/// # Safety
///
/// Only for use in a forked child; allocation-free.
unsafe fn report_exec_failure(prefix: &[u8], errno: i32) {
    let mut digits = [0u8; 12];
    let mut pos = digits.len();
    let mut value = errno.unsigned_abs();
    loop {
        pos -= 1;
        digits[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }

    let parts: [&[u8]; 5] = [
        prefix,
        errno_reason(errno).as_bytes(),
        b" (errno ",
        &digits[pos..],
        b") (note, need absolute path to binary)\n",
    ];
    for part in parts {
        libc::write(
            libc::STDERR_FILENO,
            part.as_ptr().cast::<libc::c_void>(),
            part.len(),
        );
    }
}

fn errno_reason(errno: i32) -> &'static str {
    match errno {
        libc::ENOENT => "No such file or directory",
        libc::EACCES => "Permission denied",
        libc::ENOEXEC => "Exec format error",
        libc::ENOTDIR => "Not a directory",
        libc::ELOOP => "Too many levels of symbolic links",
        libc::ENAMETOOLONG => "File name too long",
        libc::E2BIG => "Argument list too long",
        libc::ENOMEM => "Cannot allocate memory",
        libc::ETXTBSY => "Text file busy",
        _ => "exec failed",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn sh(script: &str) -> (Child, ChildPipes) {
        spawn(
            Path::new("/bin/sh"),
            &[OsString::from("-c"), OsString::from(script)],
        )
        .unwrap()
    }

    #[test]
    fn child_streams_are_redirected() {
        let (mut child, pipes) = sh("read line; echo \"out:$line\"; echo err >&2");
        let ChildPipes {
            stdin,
            mut stdout,
            mut stderr,
        } = pipes;
        {
            let mut stdin = stdin;
            std::io::Write::write_all(&mut stdin, b"hello\n").unwrap();
        }

        let mut out = String::new();
        stdout.read_to_string(&mut out).unwrap();
        let mut err = String::new();
        stderr.read_to_string(&mut err).unwrap();

        assert_eq!(out, "out:hello\n");
        assert_eq!(err, "err\n");
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn exit_status_is_collected() {
        let (mut child, _pipes) = sh("exit 7");
        let status = child.wait().unwrap();
        assert_eq!(exit_code(status), 7);
        assert_eq!(child.try_wait().unwrap(), Some(status));
    }

    #[test]
    fn exec_failure_is_reported_on_stderr() {
        let (mut child, mut pipes) = spawn(Path::new("/nonexistent/bidi-tee-test"), &[]).unwrap();

        let mut err = String::new();
        pipes.stderr.read_to_string(&mut err).unwrap();
        assert!(err.starts_with("Failed to execute /nonexistent/bidi-tee-test: No such file or directory"));
        assert!(err.ends_with("(note, need absolute path to binary)\n"));

        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(EXEC_FAILED_STATUS));
    }

    #[test]
    fn broken_pipe_terminates_child_quietly() {
        let (mut child, mut pipes) = sh("yes | head -n1 >/dev/null; echo done");

        let mut out = String::new();
        pipes.stdout.read_to_string(&mut out).unwrap();
        let mut err = String::new();
        pipes.stderr.read_to_string(&mut err).unwrap();

        assert_eq!(out, "done\n");
        assert_eq!(err, "");
        assert!(child.wait().unwrap().success());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn child_starts_with_default_sigpipe_and_empty_mask() {
        let (mut child, mut pipes) = sh("grep -E '^Sig(Ign|Blk):' /proc/self/status");

        let mut out = String::new();
        pipes.stdout.read_to_string(&mut out).unwrap();
        child.wait().unwrap();

        let mask = |name: &str| {
            let line = out
                .lines()
                .find(|line| line.starts_with(name))
                .unwrap_or_else(|| panic!("missing {name} in {out:?}"));
            u64::from_str_radix(line[name.len()..].trim(), 16).unwrap()
        };
        let sigpipe_bit = 1u64 << (libc::SIGPIPE - 1);
        assert_eq!(mask("SigIgn:") & sigpipe_bit, 0);
        assert_eq!(mask("SigBlk:"), 0);
    }

    #[test]
    fn pipes_created_during_concurrent_spawns_stay_private() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let stop = Arc::new(AtomicBool::new(false));
        let spawner = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut children = Vec::new();
                while !stop.load(Ordering::Relaxed) && children.len() < 64 {
                    children.push(sh("sleep 1").0);
                }
                children
            })
        };

        for _ in 0..500 {
            let pipe = Pipe::new().unwrap();
            drop(pipe.writer);
            let mut fds = [libc::pollfd {
                fd: pipe.reader.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            }];
            let ready = loop {
                let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, 500) };
                if rc >= 0 || io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
                    break rc;
                }
            };
            assert_eq!(ready, 1, "write end still open somewhere after drop");
        }

        stop.store(true, Ordering::Relaxed);
        for mut child in spawner.join().unwrap() {
            child.wait().unwrap();
        }
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = spawn(Path::new("/bin/sh"), &[OsString::from("a\0b")]).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidArgument(_)));
    }

    #[test]
    fn kill_reaps_a_running_child() {
        let (mut child, _pipes) = sh("sleep 30");
        let status = child.kill().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert_eq!(exit_code(status), 128 + 9);
    }

    #[test]
    fn signal_exit_maps_above_128() {
        assert_eq!(exit_code(ExitStatus::from_raw(libc::SIGKILL)), 128 + 9);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
