//! Worker stdout capture.
//!
//! While a worker serves its request, file descriptor 1 points at a pipe that a helper
//! thread drains, so everything the task prints (directly or through a library) becomes
//! body bytes. Frames go to a duplicate of the original stdout taken before the
//! redirect, which the task cannot reach.

#[cfg(unix)]
pub(crate) use unix::{redirect_stdout, StdoutCapture};

#[cfg(unix)]
mod unix {
    use super::super::executor::drain;
    use std::fs::File;
    use std::io::{self, Write};
    use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
    use std::thread::{self, JoinHandle};

    /// Owns the write end of the capture pipe and the thread draining its read end.
    pub(crate) struct StdoutCapture {
        writer: OwnedFd,
        reader: JoinHandle<io::Result<Vec<u8>>>,
    }

    /// Point fd 1 at a fresh pipe; returns the frame channel and the capture.
    pub(crate) fn redirect_stdout() -> io::Result<(File, StdoutCapture)> {
        io::stdout().flush()?;
        let frames = io::stdout().as_fd().try_clone_to_owned()?;
        let (read_end, write_end) = pipe()?;
        dup_onto_stdout(&write_end)?;

        let reader = thread::Builder::new()
            .name("zeal-worker-stdout".to_string())
            .spawn(move || {
                let mut printed = Vec::new();
                drain(File::from(read_end), &mut printed).map(|()| printed)
            });
        match reader {
            Ok(reader) => Ok((
                File::from(frames),
                StdoutCapture {
                    writer: write_end,
                    reader,
                },
            )),
            Err(e) => {
                // Nobody reads the pipe; put the real stdout back.
                dup_onto_stdout(&frames)?;
                Err(e)
            }
        }
    }

    impl StdoutCapture {
        /// Stop capturing and return everything printed since the redirect.
        ///
        /// Fd 1 is pointed at `/dev/null` afterwards, so threads the task left behind
        /// cannot write into the frame stream.
        pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
            let flushed = io::stdout().flush();
            let devnull = File::options().write(true).open("/dev/null")?;
            dup_onto_stdout(&devnull)?;
            drop(self.writer);
            let printed = self
                .reader
                .join()
                .map_err(|_| io::Error::other("stdout capture thread panicked"))??;
            flushed?;
            Ok(printed)
        }
    }

    fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a two-element buffer for pipe(2) to fill.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by nobody else.
        let (read_end, write_end) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_cloexec(&read_end)?;
        set_cloexec(&write_end)?;
        Ok((read_end, write_end))
    }

    fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        // SAFETY: fcntl(2) on a descriptor owned by `fd`.
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFD) };
        // SAFETY: as above.
        if flags < 0 || unsafe { libc::fcntl(raw, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn dup_onto_stdout(fd: &impl AsFd) -> io::Result<()> {
        // SAFETY: the source descriptor is open for the borrow; dup2(2) atomically
        // replaces fd 1 and leaves the source untouched.
        if unsafe { libc::dup2(fd.as_fd().as_raw_fd(), libc::STDOUT_FILENO) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(unix))]
pub(crate) use fallback::{redirect_stdout, StdoutCapture};

#[cfg(not(unix))]
mod fallback {
    use std::convert::Infallible;
    use std::fs::File;
    use std::io;

    pub(crate) struct StdoutCapture(Infallible);

    pub(crate) fn redirect_stdout() -> io::Result<(File, StdoutCapture)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stdout redirection needs unix file descriptors",
        ))
    }

    impl StdoutCapture {
        pub(crate) fn finish(self) -> io::Result<Vec<u8>> {
            match self.0 {}
        }
    }
}
