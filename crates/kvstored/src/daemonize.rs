//! Minimal POSIX daemonization: double-fork and detach stdio, implemented
//! with `libc` rather than a dedicated daemonization crate.

use anyhow::{bail, Context, Result};

/// Daemonizes the current process. Must be called before the Tokio runtime
/// is started — `fork()` after threads exist is unsafe.
pub fn daemonize() -> Result<()> {
    // First fork: detach from the calling shell.
    match unsafe { libc::fork() } {
        -1 => bail!("fork() failed: {}", std::io::Error::last_os_error()),
        0 => {} // child continues
        _ => std::process::exit(0), // parent exits
    }

    if unsafe { libc::setsid() } == -1 {
        bail!("setsid() failed: {}", std::io::Error::last_os_error());
    }

    // Second fork: prevent re-acquiring a controlling terminal.
    match unsafe { libc::fork() } {
        -1 => bail!("second fork() failed: {}", std::io::Error::last_os_error()),
        0 => {}
        _ => std::process::exit(0),
    }

    std::env::set_current_dir("/").context("failed to chdir to /")?;

    redirect_stdio_to_dev_null()?;

    Ok(())
}

fn redirect_stdio_to_dev_null() -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let dev_null = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("failed to open /dev/null")?;
    let fd = dev_null.as_raw_fd();

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, target) } == -1 {
            bail!("dup2 failed redirecting fd {target}: {}", std::io::Error::last_os_error());
        }
    }

    Ok(())
}
