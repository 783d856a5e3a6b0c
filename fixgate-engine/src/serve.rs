/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! TCP transport for a running engine.
//!
//! Each connection gets a reader that splits the byte stream with a framing
//! codec and a writer that drains the connection's [`Outbound`] channel.

use crate::engine::EngineHandle;
use crate::error::EngineError;
use crate::publication::Outbound;
use bytes::{Bytes, BytesMut};
use fixgate_core::types::ConnectionId;
use fixgate_session::CompositeKey;
use fixgate_transport::CodecError;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

const READ_BUFFER_CAPACITY: usize = 4096;

/// A framing codec usable on a connection.
pub trait FrameCodec:
    Decoder<Item = BytesMut, Error = CodecError>
    + Encoder<Bytes, Error = CodecError>
    + Clone
    + Send
    + 'static
{
}

impl<C> FrameCodec for C where
    C: Decoder<Item = BytesMut, Error = CodecError>
        + Encoder<Bytes, Error = CodecError>
        + Clone
        + Send
        + 'static
{
}

/// Accepts connections from `listener` until it fails or the engine stops.
///
/// # Errors
/// Returns `EngineError::Io` if accepting fails, or `EngineError::Closed`
/// once the engine is gone.
pub async fn serve<C: FrameCodec>(
    listener: TcpListener,
    handle: EngineHandle,
    codec: C,
) -> Result<(), EngineError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "accepting connections");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let connection_id = handle.next_connection_id();
        let (tx, rx) = handle.transport_channel();
        handle.accept(connection_id, tx).await?;
        info!(%connection_id, %peer, "connection accepted");
        tokio::spawn(run_connection(
            stream,
            handle.clone(),
            codec.clone(),
            connection_id,
            rx,
        ));
    }
}

/// Connects to `addr` and logs on as `key`.
///
/// Returns the connection id and the task running the connection.
///
/// # Errors
/// Returns `EngineError::Io` if the connection fails, or `EngineError::Closed`
/// if the engine is gone.
pub async fn connect<A: ToSocketAddrs, C: FrameCodec>(
    addr: A,
    handle: &EngineHandle,
    codec: C,
    key: CompositeKey,
) -> Result<(ConnectionId, JoinHandle<()>), EngineError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let connection_id = handle.next_connection_id();
    let (tx, rx) = handle.transport_channel();
    handle.initiate(connection_id, key, tx).await?;
    info!(%connection_id, "connection initiated");
    let task = tokio::spawn(run_connection(
        stream,
        handle.clone(),
        codec,
        connection_id,
        rx,
    ));
    Ok((connection_id, task))
}

async fn run_connection<C: FrameCodec>(
    stream: TcpStream,
    handle: EngineHandle,
    codec: C,
    connection_id: ConnectionId,
    outbound: mpsc::Receiver<Outbound>,
) {
    let (reader, writer) = stream.into_split();
    let closed = Arc::new(Notify::new());
    let writer_task = tokio::spawn(write_loop(
        writer,
        codec.clone(),
        connection_id,
        outbound,
        Arc::clone(&closed),
    ));

    if let Err(e) = read_loop(reader, &handle, codec, connection_id, &closed).await {
        debug!(%connection_id, error = %e, "read loop ended");
    }
    if let Err(e) = handle.on_transport_closed(connection_id).await {
        debug!(%connection_id, error = %e, "engine gone before close was reported");
    }
    // The engine drops the outbound sender with the session, ending the writer.
    if let Err(e) = writer_task.await {
        warn!(%connection_id, error = %e, "writer task failed");
    }
}

async fn read_loop<C: FrameCodec>(
    mut reader: OwnedReadHalf,
    handle: &EngineHandle,
    mut codec: C,
    connection_id: ConnectionId,
    closed: &Notify,
) -> Result<(), EngineError> {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    loop {
        let read = tokio::select! {
            read = reader.read_buf(&mut buf) => read?,
            () = closed.notified() => return Ok(()),
        };
        if read == 0 {
            debug!(%connection_id, "peer closed connection");
            return Ok(());
        }

        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => handle.on_frame(connection_id, frame.freeze()).await?,
                Ok(None) => break,
                Err(e) => {
                    warn!(%connection_id, error = %e, "unframeable input, closing connection");
                    return Ok(());
                }
            }
        }
    }
}

async fn write_loop<C: FrameCodec>(
    mut writer: OwnedWriteHalf,
    mut codec: C,
    connection_id: ConnectionId,
    mut outbound: mpsc::Receiver<Outbound>,
    closed: Arc<Notify>,
) {
    let mut buf = BytesMut::new();
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                buf.clear();
                if let Err(e) = codec.encode(frame, &mut buf) {
                    warn!(%connection_id, error = %e, "failed to encode frame");
                    break;
                }
                if let Err(e) = writer.write_all(&buf).await {
                    debug!(%connection_id, error = %e, "write failed");
                    break;
                }
            }
            Outbound::Disconnect(reason) => {
                info!(%connection_id, %reason, "closing connection");
                break;
            }
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(%connection_id, error = %e, "shutdown failed");
    }
    closed.notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use fixgate_core::clock::SystemEpochClock;
    use fixgate_core::types::{CompId, SessionId};
    use fixgate_session::{
        CapturePublication, FixProtocol, SessionConfig, SessionProtocol, SessionProxy,
    };
    use fixgate_transport::FixCodec;
    use std::time::Duration;
    use tokio::time::timeout;

    fn logon() -> Vec<u8> {
        let protocol = FixProtocol::new("FIX.4.4");
        let mut proxy =
            protocol.make_proxy(Arc::new(CapturePublication::new()), Arc::new(SystemEpochClock));
        proxy.set_session(
            SessionId::new(1),
            CompositeKey::new(CompId::new("CLIENT").unwrap(), CompId::new("GW").unwrap()),
        );
        proxy.logon(30, 1, SessionId::new(1), false).unwrap();
        proxy.last_frame().to_vec()
    }

    #[tokio::test]
    async fn test_serve_answers_logon() {
        let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");
        let engine = EngineBuilder::new(config).build().unwrap();
        let (handle, _task) = engine.spawn();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, handle.clone(), FixCodec::new()));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&logon()).await.unwrap();

        let mut codec = FixCodec::new();
        let mut buf = BytesMut::new();
        let reply = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(frame) = codec.decode(&mut buf).unwrap() {
                    return frame;
                }
                assert!(client.read_buf(&mut buf).await.unwrap() > 0);
            }
        })
        .await
        .unwrap();

        let text = String::from_utf8_lossy(&reply);
        assert!(text.contains("\x0135=A\x01"));
        assert!(text.contains("\x0149=GW\x01"));
        assert!(text.contains("\x0156=CLIENT\x01"));

        handle.shutdown().await.unwrap();
    }
}
