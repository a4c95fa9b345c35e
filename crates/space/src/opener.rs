//! Opens a URL with the platform's default handler.
//!
//! Runs `xdg-open` (Linux/BSD), `open` (macOS) or `cmd /C start`
//! (Windows) with a bounded timeout. Only `http`/`https` URLs are
//! accepted.

use std::time::Duration;

use tokio::process::Command;

/// Default timeout for the opener process to hand off and exit.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_URL_LEN: usize = 2048;

/// Characters `cmd.exe` would interpret in the unquoted `start` argument.
#[cfg(target_os = "windows")]
const SHELL_METACHARACTERS: &[char] = &['"', '&', '|', '^', '<', '>', '`', '%'];

/// `xdg-open` and `open` receive the URL as a plain argv entry.
#[cfg(not(target_os = "windows"))]
const SHELL_METACHARACTERS: &[char] = &['"', '`'];

/// Errors from launching the opener.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Refusing to open URL '{0}': only plain http/https URLs are allowed")]
    UnsupportedUrl(String),

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        program: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} did not exit within {}s", .timeout.as_secs())]
    TimedOut {
        program: &'static str,
        timeout: Duration,
    },
}

/// `http://` or `https://` URL with no whitespace, control characters
/// or characters the platform opener would interpret.
pub fn is_openable_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));

    matches!(rest, Some(host) if !host.is_empty() && !host.starts_with('/'))
        && url.len() <= MAX_URL_LEN
        && !url
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || SHELL_METACHARACTERS.contains(&c))
}

/// Program and leading arguments for this platform's opener.
#[cfg(target_os = "windows")]
fn opener_command() -> (&'static str, &'static [&'static str]) {
    ("cmd", &["/C", "start", ""])
}

#[cfg(target_os = "macos")]
fn opener_command() -> (&'static str, &'static [&'static str]) {
    ("open", &[])
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener_command() -> (&'static str, &'static [&'static str]) {
    ("xdg-open", &[])
}

/// Open `url` in the default browser.
pub async fn open_url(url: &str, timeout: Duration) -> Result<(), OpenError> {
    if !is_openable_url(url) {
        return Err(OpenError::UnsupportedUrl(url.to_string()));
    }

    let (program, args) = opener_command();
    tracing::info!(program, url, "Opening URL");

    let result = tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(args)
            .arg(url)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => Err(OpenError::Failed {
            program,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Ok(Err(source)) => Err(OpenError::Spawn { program, source }),
        Err(_) => Err(OpenError::TimedOut { program, timeout }),
    }
}
