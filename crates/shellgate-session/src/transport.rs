//! Proxy-command transport.
//!
//! When a proxy command template is configured, every connection runs
//! through an external subprocess whose stdin/stdout carry the SSH byte
//! stream. `%h` is replaced with the target host and `%p` with the port.

use crate::SessionError;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

pub(crate) struct ProxyCommandStream {
    // Held so the subprocess is killed when the stream drops.
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl ProxyCommandStream {
    pub(crate) fn spawn(template: &str, host: &str, port: u16) -> Result<Self, SessionError> {
        let rendered = template
            .replace("%h", host)
            .replace("%p", &port.to_string());
        tracing::debug!(command = %rendered, "spawning proxy command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&rendered)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::ProxyCommand(format!("{rendered}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::ProxyCommand("stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::ProxyCommand("stdout unavailable".to_string()))?;

        Ok(Self {
            _child: child,
            stdin,
            stdout,
        })
    }
}

impl AsyncRead for ProxyCommandStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for ProxyCommandStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stdin).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdin).poll_shutdown(cx)
    }
}
