//! A line-framed wrapper around `tokio::net::TcpStream`, mirroring the framed-stream wrappers
//! the rest of the corpus builds over its own transport (there: length-delimited binary frames
//! over QUIC streams; here: newline-delimited text frames over TCP), plus the one-shot
//! connect/handshake/send helper used by every per-message forward.

use std::time::Duration;

use anyhow::Context;
use common::{Address, Frame};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Per-connection read/write deadline; there are no protocol-level timeouts (§5), but a
/// misbehaving or dead peer must not wedge a connection handler forever.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(common::CONNECTION_TIMEOUT_SECS);

/// A single TCP connection, split into a buffered line reader and a raw writer.
pub struct Connection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

/// The read half of a [`Connection`] after [`Connection::into_split`], for long-lived sessions
/// (the leaf's persistent super-peer link) that need a dedicated receive task while writes are
/// issued independently from other tasks.
pub struct ConnectionReadHalf {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
}

/// The write half of a [`Connection`] after [`Connection::into_split`].
pub struct ConnectionWriteHalf {
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl ConnectionReadHalf {
    /// Reads one line and parses it as a [`Frame`]. Returns `Ok(None)` on clean EOF.
    pub async fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        read_frame_line(&mut self.reader).await
    }
}

impl ConnectionWriteHalf {
    pub async fn write_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        write_line(&mut self.writer, &frame.to_string()).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await.context("failed to close connection")
    }
}

async fn read_frame_line(
    reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
) -> anyhow::Result<Option<Frame>> {
    let mut line = String::new();
    let n = tokio::time::timeout(DEFAULT_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("timed out reading frame")?
        .context("failed reading frame")?;
    if n == 0 {
        return Ok(None);
    }
    let frame = line.parse().context("malformed frame")?;
    Ok(Some(frame))
}

async fn write_line(writer: &mut tokio::net::tcp::OwnedWriteHalf, text: &str) -> anyhow::Result<()> {
    let mut line = text.to_string();
    line.push('\n');
    tokio::time::timeout(DEFAULT_TIMEOUT, writer.write_all(line.as_bytes()))
        .await
        .context("timed out writing frame")?
        .context("failed writing frame")?;
    Ok(())
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Connects to `target` and writes the handshake line (`self_addr`) as the first frame.
    pub async fn connect(target: &Address, self_addr: &Address) -> anyhow::Result<Self> {
        let stream = tokio::time::timeout(DEFAULT_TIMEOUT, TcpStream::connect(target.socket_addr()))
            .await
            .with_context(|| format!("timed out connecting to {target}"))?
            .with_context(|| format!("failed to connect to {target}"))?;
        let mut conn = Connection::new(stream);
        conn.write_frame(&Frame::Handshake(self_addr.clone())).await?;
        Ok(conn)
    }

    /// Reads one line and parses it as a [`Frame`]. Returns `Ok(None)` on clean EOF.
    pub async fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        read_frame_line(&mut self.reader).await
    }

    /// Reads the first frame of a connection and requires it to be a handshake line.
    pub async fn read_handshake(&mut self) -> anyhow::Result<Address> {
        match self.read_frame().await? {
            Some(Frame::Handshake(addr)) => Ok(addr),
            Some(other) => Err(anyhow::anyhow!("expected handshake, got {other}")),
            None => Err(anyhow::anyhow!("connection closed before handshake")),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        write_line(&mut self.writer, &frame.to_string()).await
    }

    /// Splits into independent read/write halves for a long-lived session where writes (from
    /// the CLI, the watcher, the consistency checker) must not block on a dedicated receive
    /// loop reading unsolicited pushes (§4.1's leaf ↔ super-peer persistent channel).
    pub fn into_split(self) -> (ConnectionReadHalf, ConnectionWriteHalf) {
        (
            ConnectionReadHalf { reader: self.reader },
            ConnectionWriteHalf { writer: self.writer },
        )
    }

    /// Reads one line and parses it directly as a [`common::FileInfo`], bypassing [`Frame`]
    /// parsing. Used for file-transfer headers (§4.2), which are a bare `name,origin,version,valid`
    /// line with no verb prefix — unlike the `status <fileinfo>` request frame.
    pub async fn read_fileinfo(&mut self) -> anyhow::Result<common::FileInfo> {
        let mut line = String::new();
        let n = tokio::time::timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .context("timed out reading file info header")?
            .context("failed reading file info header")?;
        if n == 0 {
            return Err(anyhow::anyhow!("connection closed before file info header"));
        }
        line.trim_end_matches(['\r', '\n'])
            .parse()
            .context("malformed file info header")
    }

    /// Writes `info` as a bare line with no verb prefix, matching [`Connection::read_fileinfo`].
    pub async fn write_fileinfo(&mut self, info: &common::FileInfo) -> anyhow::Result<()> {
        let mut line = info.to_string();
        line.push('\n');
        tokio::time::timeout(DEFAULT_TIMEOUT, self.writer.write_all(line.as_bytes()))
            .await
            .context("timed out writing file info header")?
            .context("failed writing file info header")?;
        Ok(())
    }

    /// Reads raw bytes until the peer half-closes, copying every byte read (byte-exact, no
    /// off-by-one truncation).
    pub async fn copy_to_end(&mut self, dst: &mut (impl tokio::io::AsyncWrite + Unpin)) -> anyhow::Result<u64> {
        tokio::io::copy(&mut self.reader, dst)
            .await
            .context("failed copying bytes from connection")
    }

    /// Copies all bytes of `src` to the connection, then half-closes our write side.
    pub async fn copy_from_and_close(
        &mut self,
        src: &mut (impl tokio::io::AsyncRead + Unpin),
    ) -> anyhow::Result<u64> {
        let n = tokio::io::copy(src, &mut self.writer)
            .await
            .context("failed copying bytes to connection")?;
        self.writer.shutdown().await.context("failed to half-close connection")?;
        Ok(n)
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.writer.shutdown().await.context("failed to close connection")
    }
}

/// Opens a connection to `target`, performs the handshake, writes `frame`, and optionally waits
/// for exactly one reply frame. Used for every per-message, per-interaction exchange (forwards,
/// invalidation delivery, status probes).
///
/// On any failure this logs and returns `Ok(None)`/propagates per the caller's policy: the
/// overlay's error handling design treats a transient peer being unreachable as "log and drop,
/// no retry" (§7), so callers typically discard the `Err` after logging rather than propagating
/// it further up a flood.
pub async fn send_one_shot(
    target: &Address,
    self_addr: &Address,
    frame: &Frame,
    expect_reply: bool,
) -> anyhow::Result<Option<Frame>> {
    let mut conn = Connection::connect(target, self_addr).await?;
    conn.write_frame(frame).await?;
    conn.shutdown_write_if_no_reply(expect_reply).await?;
    if expect_reply {
        Ok(conn.read_frame().await?)
    } else {
        Ok(None)
    }
}

impl Connection {
    async fn shutdown_write_if_no_reply(&mut self, expect_reply: bool) -> anyhow::Result<()> {
        if !expect_reply {
            self.writer.shutdown().await.context("failed to close write half")?;
        }
        Ok(())
    }
}
