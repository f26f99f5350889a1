use std::io;
use std::os::fd::{FromRawFd, OwnedFd};

/// A unidirectional byte pipe.
///
/// Both ends are close-on-exec so a spawned program only ever inherits the
/// ends explicitly moved onto its standard descriptors.
#[derive(Debug)]
pub struct Pipe {
    pub reader: OwnedFd,
    pub writer: OwnedFd,
}

impl Pipe {
    /// Create a new pipe.
    pub fn new() -> io::Result<Self> {
        let fds = open_cloexec()?;
        // SAFETY: the pipe was just created, so both descriptors are open and owned by us.
        let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Self { reader, writer })
    }
}

/// Both ends come back close-on-exec atomically, so a concurrent fork+exec
/// elsewhere in the process can never inherit them.
#[cfg(not(target_vendor = "apple"))]
fn open_cloexec() -> io::Result<[libc::c_int; 2]> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid, writable array of two c_ints.
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fds)
}

// No pipe2 on Apple targets: fall back to pipe + fcntl.
#[cfg(target_vendor = "apple")]
fn open_cloexec() -> io::Result<[libc::c_int; 2]> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid, writable array of two c_ints.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    for fd in fds {
        if let Err(err) = set_cloexec(fd) {
            // SAFETY: both descriptors are open and not yet owned elsewhere.
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(err);
        }
    }
    Ok(fds)
}

#[cfg(target_vendor = "apple")]
fn set_cloexec(raw: libc::c_int) -> io::Result<()> {
    // SAFETY: `raw` is an open descriptor we created.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above; only the descriptor flags are changed.
    if unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
