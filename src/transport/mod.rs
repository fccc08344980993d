//! Transport module - the duplex byte channel under the protocol.
//!
//! The physical serial port is out of scope; anything that can open into an
//! `AsyncRead + AsyncWrite` stream qualifies. [`StreamTransport`] wraps an
//! already-connected stream, and [`loopback`] builds an in-memory pair for
//! tests and examples.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

use crate::error::Result;

/// Something that can be opened into a duplex byte stream.
pub trait Transport: Send + Sized {
    /// The connected stream type.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open the channel, consuming the transport.
    fn open(self) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Transport over an already-connected stream.
pub struct StreamTransport<S>(S);

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self(stream)
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    fn open(self) -> impl Future<Output = Result<S>> + Send {
        async move { Ok(self.0) }
    }
}

/// In-memory duplex pair: a transport for the host side and the raw peer
/// stream a test drives the device side with.
pub fn loopback(capacity: usize) -> (StreamTransport<DuplexStream>, DuplexStream) {
    let (host, device) = tokio::io::duplex(capacity);
    (StreamTransport::new(host), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_loopback_carries_bytes_both_ways() {
        let (transport, mut device) = loopback(256);
        let mut host = transport.open().await.unwrap();

        host.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        device.write_all(b"pong").await.unwrap();
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
