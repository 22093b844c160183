//! Abstract byte transport underneath the H4 framing layer
//!
//! The [`Transport`] trait is the boundary to the physical byte pump (UART,
//! SPI bridge, PTY, an in-memory pipe in tests). Both operations are
//! completion-style: the returned future resolves only once the whole
//! buffer has moved, and the framing layer never has more than one of each
//! direction outstanding.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

/// Boxed completion future returned by [`Transport`] methods.
pub type IoFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

/// Async byte transport carrying the H4 stream.
///
/// The trait is object-safe so hosts can hold `Arc<dyn Transport>`.
pub trait Transport: Send + Sync + 'static {
    /// Read bytes until `dst` is completely full. An end-of-stream before
    /// that is an error; H4 has no frame boundary to fall back on.
    fn read_into<'a>(&'a self, dst: &'a mut [u8]) -> IoFuture<'a>;

    /// Write all of `src`. The write channel is free for the next packet
    /// only once the returned future resolves.
    fn write_from<'a>(&'a self, src: &'a [u8]) -> IoFuture<'a>;
}

/// [`Transport`] over any split `AsyncRead`/`AsyncWrite` pair, e.g. a serial
/// port or `tokio::io::duplex` in tests.
pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already-split reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

impl<S> StreamTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Split a full-duplex stream into a transport.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn read_into<'a>(&'a self, dst: &'a mut [u8]) -> IoFuture<'a> {
        Box::pin(async move {
            let mut reader = self.reader.lock().await;
            reader.read_exact(dst).await?;
            Ok(())
        })
    }

    fn write_from<'a>(&'a self, src: &'a [u8]) -> IoFuture<'a> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer.write_all(src).await?;
            writer.flush().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_round_trip() {
        let (near, far) = tokio::io::duplex(64);
        let transport = StreamTransport::from_stream(near);
        let peer = StreamTransport::from_stream(far);

        transport.write_from(&[0x04, 0x13, 0x00]).await.unwrap();

        let mut read = [0u8; 3];
        peer.read_into(&mut read).await.unwrap();
        assert_eq!(read, [0x04, 0x13, 0x00]);
    }

    #[tokio::test]
    async fn short_stream_is_an_error() {
        let (near, far) = tokio::io::duplex(64);
        let transport = StreamTransport::from_stream(near);

        let peer = StreamTransport::from_stream(far);
        peer.write_from(&[0x04]).await.unwrap();
        drop(peer);

        let mut read = [0u8; 3];
        let err = transport.read_into(&mut read).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
