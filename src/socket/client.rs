use crate::socket::idle::HostId;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::OwnedSemaphorePermit;

/// Represents a connected socket.
/// Mimics net::StreamSocket.
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + Sync + fmt::Debug {
    /// Returns true if the socket is connected and has no pending data.
    /// Matches Chromium's IsConnectedAndIdle().
    fn is_connected_and_idle(&mut self) -> bool;
}

/// Liveness of a socket as seen by a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Idle,
    Readable,
    Closed,
}

/// A dialed byte stream before any TLS is layered on top.
#[derive(Debug)]
pub enum Stream {
    Tcp(tokio::net::TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[derive(Debug)]
pub enum SocketType {
    Plain(Stream),
    Ssl(tokio_boring::SslStream<Stream>),
}

impl SocketType {
    fn stream(&self) -> &Stream {
        match self {
            SocketType::Plain(s) => s,
            SocketType::Ssl(s) => s.get_ref(),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, SocketType::Ssl(_))
    }

    #[cfg(unix)]
    pub fn is_unix(&self) -> bool {
        matches!(self.stream(), Stream::Unix(_))
    }

    /// Poll a one-byte read once, without waiting.
    ///
    /// TLS sockets are read through the session, so post-handshake records
    /// such as session tickets are consumed without counting as data. A byte
    /// read here is lost, so this is only used on sockets headed for or
    /// sitting in the idle set, where unsolicited data makes them unusable.
    fn liveness(&mut self) -> Liveness {
        if let Stream::Tcp(s) = self.stream() {
            if s.peer_addr().is_err() {
                return Liveness::Closed;
            }
        }

        let mut byte = [0u8; 1];
        let mut buf = ReadBuf::new(&mut byte);
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match Pin::new(&mut *self).poll_read(&mut cx, &mut buf) {
            Poll::Pending => Liveness::Idle,
            Poll::Ready(Ok(())) if buf.filled().is_empty() => Liveness::Closed,
            Poll::Ready(Ok(())) => Liveness::Readable,
            Poll::Ready(Err(_)) => Liveness::Closed,
        }
    }
}

impl AsyncRead for SocketType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketType {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SocketType::Ssl(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_flush(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SocketType::Ssl(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

impl StreamSocket for SocketType {
    fn is_connected_and_idle(&mut self) -> bool {
        self.liveness() == Liveness::Idle
    }
}

/// A socket checked out of a [`Transport`](crate::socket::transport::Transport).
///
/// Hand it back with `Transport::release` to make it available for reuse.
/// Dropping it closes the connection and frees its per-host slot.
#[derive(Debug)]
pub struct PooledSocket {
    inner: SocketType,
    host: HostId,
    reused: bool,
    _slot: Option<OwnedSemaphorePermit>,
}

impl PooledSocket {
    pub(crate) fn new(
        inner: SocketType,
        host: HostId,
        reused: bool,
        slot: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self { inner, host, reused, _slot: slot }
    }

    /// Whether this socket came from the idle set rather than a fresh dial.
    pub fn was_reused(&self) -> bool {
        self.reused
    }

    pub fn host(&self) -> &HostId {
        &self.host
    }

    pub fn inner(&self) -> &SocketType {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SocketType {
        &mut self.inner
    }

    pub(crate) fn into_parts(self) -> (HostId, SocketType) {
        (self.host, self.inner)
    }
}

impl AsyncRead for PooledSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PooledSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
