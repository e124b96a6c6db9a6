//! Stream-backed connection to the debug stub.
//!
//! Commands are encoded and queued synchronously; a writer task drains the
//! queue onto the stream. A reader task decodes the stub's bytes into
//! [`Notification`]s delivered on an unbounded channel.
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::codec::{decode_notification, encode_command};
use crate::error::StubError;
use crate::port::PortSpec;
use crate::protocol::{Notification, StubCommand};

/// Receiving end of the notification stream.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Anything that can deliver commands to the debug stub.
pub trait StubTransport: Send + Sync {
    /// Queue a command for the stub. Never waits for a reply.
    fn send(&self, command: StubCommand) -> Result<(), StubError>;
}

/// A live connection to the debug stub.
#[derive(Debug)]
pub struct StubConnection {
    frames: mpsc::UnboundedSender<Vec<u8>>,
    sequence: AtomicU8,
}

impl StubConnection {
    /// Start reader and writer tasks over a bidirectional stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(stream: S) -> (Self, NotificationReceiver)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::spawn_split(reader, writer)
    }

    /// Start reader and writer tasks over separate halves.
    pub fn spawn_split<R, W>(reader: R, writer: W) -> (Self, NotificationReceiver)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (note_tx, note_rx) = mpsc::unbounded_channel();

        // The receiver is still held locally, so this cannot fail.
        let _ = note_tx.send(Notification::Connected);
        tokio::spawn(write_loop(writer, frame_rx));
        tokio::spawn(read_loop(reader, note_tx));

        (
            Self {
                frames: frame_tx,
                sequence: AtomicU8::new(0),
            },
            note_rx,
        )
    }
}

impl StubTransport for StubConnection {
    fn send(&self, command: StubCommand) -> Result<(), StubError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(?command, sequence, "stub command");
        self.frames
            .send(encode_command(&command, sequence))
            .map_err(|_| StubError::Disconnected)
    }
}

/// Open the stream described by `spec` and start a connection over it.
///
/// # Errors
///
/// Returns [`StubError::Open`] if the stream cannot be opened.
pub async fn connect(spec: &PortSpec) -> Result<(StubConnection, NotificationReceiver), StubError> {
    tracing::info!("connecting to debug stub at {spec}");
    match spec {
        PortSpec::Pipe(path) => connect_pipe(path).await,
        PortSpec::Serial(path) => {
            let file = tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .await?;
            Ok(StubConnection::spawn(file))
        }
        PortSpec::Tcp(addr) => {
            let stream = tokio::net::TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok(StubConnection::spawn(stream))
        }
    }
}

#[cfg(unix)]
async fn connect_pipe(
    path: &std::path::Path,
) -> Result<(StubConnection, NotificationReceiver), StubError> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(StubConnection::spawn(stream))
}

#[cfg(windows)]
async fn connect_pipe(
    path: &std::path::Path,
) -> Result<(StubConnection, NotificationReceiver), StubError> {
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
    Ok(StubConnection::spawn(pipe))
}

#[cfg(not(any(unix, windows)))]
async fn connect_pipe(
    path: &std::path::Path,
) -> Result<(StubConnection, NotificationReceiver), StubError> {
    Err(StubError::InvalidPort {
        spec: format!("pipe: {}", path.display()),
        reason: "pipes are not supported on this platform".into(),
    })
}

async fn write_loop<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let result = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("debug stub write failed: {e}");
            break;
        }
    }
}

async fn read_loop<R>(mut reader: R, notifications: mpsc::UnboundedSender<Notification>)
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let reason = loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break "stream closed by debug stub".to_string(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => break e.to_string(),
        }

        loop {
            let (notification, used) = match decode_notification(&buf) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    // Framing is lost; surface the first byte and resync after it.
                    tracing::warn!("{e}");
                    (Notification::Unrecognized(buf[0]), 1)
                }
            };
            buf.drain(..used);
            if notifications.send(notification).is_err() {
                return;
            }
        }
    };

    tracing::info!("debug stub connection lost: {reason}");
    let _ = notifications.send(Notification::ConnectionLost(reason));
}
