//! Replace the running process with the updated executable.

use std::path::Path;

/// Re-execute `exe` with the current arguments.
///
/// `exe` should be resolved at startup: once an update has replaced the
/// binary, `/proc/self/exe` points at the unlinked old inode. Only returns on
/// failure.
#[cfg(unix)]
pub fn reexec(exe: &Path) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let to_cstring = |bytes: &[u8]| {
        CString::new(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    };

    let path = to_cstring(exe.as_os_str().as_bytes())?;
    let mut argv = vec![path.clone()];
    for arg in std::env::args_os().skip(1) {
        argv.push(to_cstring(arg.as_bytes())?);
    }

    tracing::info!(exe = %exe.display(), "Re-executing updated binary");
    match nix::unistd::execv(&path, &argv) {
        Ok(never) => match never {},
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(not(unix))]
pub fn reexec(exe: &Path) -> std::io::Result<()> {
    tracing::info!(exe = %exe.display(), "Spawning updated binary");
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()?;
    std::process::exit(0);
}
