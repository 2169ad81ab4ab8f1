//! Transport over a tokio byte stream.
//!
//! [`StreamTransport::spawn`] splits the stream and starts two tasks: a reader
//! that forwards each read as a [`TransportEvent::Data`] chunk, and a writer that
//! drains queued outbound bytes. The reader reports [`TransportEvent::Disconnected`]
//! on EOF or a read error, and the writer reports it on its first write error.
//! Consumers stop at the first `Disconnected`, so a second one is harmless.

use super::{Transport, TransportEvent};
use crate::config::TransportConfig;
use crate::error::{constants, ProtocolError, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Writer handle for a spawned stream
#[derive(Debug)]
pub struct StreamTransport {
    writer: mpsc::UnboundedSender<Option<Bytes>>,
}

impl StreamTransport {
    /// Drive `stream`, returning the write handle and the inbound event channel
    pub fn spawn<S>(
        stream: S,
        read_buffer_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Option<Bytes>>();

        let _ = events_tx.send(TransportEvent::Connected);
        let writer_events = events_tx.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; read_buffer_size.max(1)];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        debug!("Stream reached EOF");
                        break;
                    }
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        if events_tx.send(TransportEvent::Data(chunk)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Stream read failed");
                        break;
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Disconnected);
        });

        tokio::spawn(async move {
            // `None` is the close request
            while let Some(Some(bytes)) = write_rx.recv().await {
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!(error = %e, "Stream write failed");
                    let _ = writer_events.send(TransportEvent::Disconnected);
                    return;
                }
            }
            let _ = writer.shutdown().await;
            debug!("Stream writer stopped");
        });

        (Self { writer: write_tx }, events_rx)
    }
}

impl Transport for StreamTransport {
    fn write(&self, bytes: Bytes) -> Result<()> {
        self.writer
            .send(Some(bytes))
            .map_err(|_| ProtocolError::TransportError(constants::ERR_TRANSPORT_CLOSED.to_string()))
    }

    fn close(&self) {
        let _ = self.writer.send(None);
    }
}

/// Connect to the companion at `config.address`
#[instrument(skip(config), fields(address = %config.address))]
pub async fn connect(
    config: &TransportConfig,
) -> Result<(StreamTransport, mpsc::UnboundedReceiver<TransportEvent>)> {
    let stream = TcpStream::connect(&config.address).await?;
    stream.set_nodelay(true)?;
    info!("Connected");
    Ok(StreamTransport::spawn(stream, config.read_buffer_size))
}

/// Accept one connection on `listener`
#[instrument(skip(listener, config))]
pub async fn accept(
    listener: &TcpListener,
    config: &TransportConfig,
) -> Result<(StreamTransport, mpsc::UnboundedReceiver<TransportEvent>)> {
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    info!(peer = %peer, "Accepted connection");
    Ok(StreamTransport::spawn(stream, config.read_buffer_size))
}
