//! Helpers for spawning the external media tools (ffprobe, mkvmerge).

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppress the console window Windows opens for child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `tokio::process::Command` for a tool invocation.
///
/// The child gets no console window on Windows, no stdin, and is killed when
/// its handle is dropped so an abandoned invocation never outlives the caller.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window()
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Run a command to completion, capturing stdout and stderr, with a deadline.
///
/// If the deadline passes first the child is killed and an error of kind
/// [`std::io::ErrorKind::TimedOut`] is returned.
#[cfg(feature = "tokio")]
pub async fn output_with_timeout(
    cmd: &mut tokio::process::Command,
    timeout: std::time::Duration,
) -> std::io::Result<std::process::Output> {
    use std::process::Stdio;

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;

    // Dropping the pending future drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("process did not exit within {}s", timeout.as_secs_f64()),
        )),
    }
}
