//! TCP transport to the thermostat.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use aprilaire_client::transport::connect;
//!
//! let stream = connect("192.168.1.50", 7000, Duration::from_secs(10)).await?;
//! let (reader, writer) = stream.into_split();
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::{AprilaireError, Result};

/// Open a connection to `host:port`, giving up after `timeout`.
///
/// Nagle is disabled: frames are tiny and the device answers each one.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| {
            AprilaireError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("Connecting to {}:{} timed out after {:?}", host, port, timeout),
            ))
        })??;

    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Listening socket that accepts thermostat-side connections.
#[derive(Debug)]
pub struct ThermostatListener {
    listener: TcpListener,
}

impl ThermostatListener {
    /// Bind to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_accept() {
        let listener = ThermostatListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(stream.nodelay().unwrap());
        stream.write_all(&[1, 2, 3, 4]).await.unwrap();

        assert_eq!(server.await.unwrap(), [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = ThermostatListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = connect("127.0.0.1", port, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AprilaireError::Io(_))));
    }
}
