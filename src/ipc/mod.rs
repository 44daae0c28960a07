//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Lets a UI or a second CLI invocation drive the configuration service
//! running in `serve` mode. Uses length-prefixed JSON over Unix domain
//! sockets.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

mod handler;
mod messages;
pub use handler::serve;
pub use messages::{ErrorBody, Request, Response, ScriptSync};

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_MODE};

/// Client connection to a running service
pub struct Client {
    pub(crate) stream: UnixStream,
}

impl Client {
    /// Connect to a specific socket path
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to service at {}", path.display()))?;
        Ok(Self { stream })
    }

    pub fn send_request(&mut self, req: &Request) -> Result<()> {
        write_message(&mut self.stream, req)
    }

    /// Receive response (blocking)
    pub fn recv_response(&mut self) -> Result<Response> {
        let frame = read_frame(&mut self.stream)?
            .ok_or_else(|| anyhow!("Service closed the connection"))?;
        serde_json::from_slice(&frame).context("Failed to deserialize response from JSON")
    }

    /// Send request and wait for response (convenience method)
    pub fn request(&mut self, req: &Request) -> Result<Response> {
        self.send_request(req)?;
        self.recv_response()
    }
}

/// Listening socket of the service
pub struct Server {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl Server {
    /// Bind to `socket_path`, replacing a stale socket left by a crashed run
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        if socket_path.exists() {
            if UnixStream::connect(&socket_path).is_ok() {
                return Err(anyhow!(
                    "Another service is already listening on {}",
                    socket_path.display()
                ));
            }
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept a connection without blocking; `None` when nobody is waiting
    pub(crate) fn try_accept(&self) -> Result<Option<UnixStream>> {
        self.listener
            .set_nonblocking(true)
            .context("Failed to set listener non-blocking")?;
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                stream
                    .set_nonblocking(false)
                    .context("Failed to set client stream blocking")?;
                Ok(Some(stream))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e).context("Failed to accept IPC connection"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub(crate) fn write_message<T: Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            json.len(),
            MAX_MESSAGE_SIZE
        ));
    }

    // u32 little-endian length prefix
    let len = u32::try_from(json.len()).context("Message length overflows u32")?;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;
    stream
        .write_all(&json)
        .context("Failed to write message payload")?;
    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read one frame; `None` on a clean end of stream before the length prefix
pub(crate) fn read_frame(stream: &mut UnixStream) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .context("Failed to read message payload")?;
    Ok(Some(payload))
}

/// Read and deserialize one message; `None` on end of stream
#[cfg(test)]
pub(crate) fn read_message<T: serde::de::DeserializeOwned>(
    stream: &mut UnixStream,
) -> Result<Option<T>> {
    match read_frame(stream)? {
        Some(frame) => Ok(Some(
            serde_json::from_slice(&frame).context("Failed to deserialize message from JSON")?,
        )),
        None => Ok(None),
    }
}
