/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Runs a gateway over TCP with a file-backed log, drives one client session
//! through it, then replays the whole log and reports the outcome.
//!
//! ```text
//! RUST_LOG=debug cargo run -p fixgate-example --example reproduce_session
//! ```

use anyhow::{Context, bail};
use bytes::BytesMut;
use fixgate::prelude::*;
use fixgate::session::{CapturePublication, FixProxy, SessionProxy};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;
use tracing::info;

const BEGIN_STRING: &str = "FIX.4.4";

/// Fills every order in full; replies derive only from the order itself.
struct Filler;

impl Application for Filler {
    fn on_logon(&self, session_id: SessionId) {
        info!(%session_id, "client logged on");
    }

    fn on_message(
        &self,
        sender: &mut dyn ApplicationSender,
        message: &OwnedMessage,
    ) -> Result<(), SessionError> {
        if message.msg_type() != &MsgType::NewOrderSingle {
            return Ok(());
        }
        let cl_ord_id = message.get_field_str(11).unwrap_or_default().to_string();
        let qty = message.get_field_str(38).unwrap_or("0").to_string();
        let order_id = format!("GW-{cl_ord_id}");
        sender.send(&MsgType::ExecutionReport, &|body| {
            body.put_str(37, &order_id);
            body.put_str(11, &cl_ord_id);
            body.put_char(150, 'F');
            body.put_char(39, '2');
            body.put_str(14, &qty);
        })?;
        Ok(())
    }
}

struct Client {
    stream: TcpStream,
    proxy: FixProxy,
    codec: FixCodec,
    buf: BytesMut,
    seq: u64,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let mut proxy = FixProtocol::new(BEGIN_STRING).make_proxy(
            Arc::new(CapturePublication::new()),
            Arc::new(SystemEpochClock),
        );
        proxy.set_session(
            SessionId::new(1),
            CompositeKey::new(
                CompId::new("CLIENT").context("comp id")?,
                CompId::new("GW").context("comp id")?,
            ),
        );
        Ok(Self {
            stream,
            proxy,
            codec: FixCodec::new(),
            buf: BytesMut::with_capacity(4096),
            seq: 0,
        })
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        self.stream.write_all(self.proxy.last_frame()).await?;
        Ok(())
    }

    async fn expect(&mut self, msg_type: &str) -> anyhow::Result<()> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                let text = String::from_utf8_lossy(&frame).replace('\x01', "|");
                info!(reply = %text, "received");
                if !text.contains(&format!("|35={msg_type}|")) {
                    bail!("expected MsgType {msg_type}");
                }
                return Ok(());
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                bail!("gateway closed the connection");
            }
        }
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let dir = tempfile::tempdir()?;
    let log = Arc::new(FileLog::open(dir.path().join("gateway.log"))?);
    let stash = Arc::new(StashingMessageHandler::new());

    let config = SessionConfig::new(CompId::new("GW").context("comp id")?, BEGIN_STRING);
    let engine = EngineBuilder::new(config)
        .with_application(Filler)
        .with_log(log.clone())
        .with_reproduction_handler(stash.clone())
        .build()?;
    let (handle, engine_task) = engine.spawn();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(serve(listener, handle.clone(), FixCodec::new()));

    let mut client = Client::connect(addr).await?;
    let seq = client.next_seq();
    client.proxy.logon(30, seq, SessionId::new(1), false)?;
    client.flush().await?;
    client.expect("A").await?;

    for (cl_ord_id, qty) in [("ORD-1", 100), ("ORD-2", 250), ("ORD-3", 75)] {
        let seq = client.next_seq();
        client
            .proxy
            .application(&MsgType::NewOrderSingle, seq, SessionId::new(1), &|body| {
                body.put_str(11, cl_ord_id);
                body.put_str(55, "EURUSD");
                body.put_char(54, '1');
                body.put_uint(38, qty);
                body.put_char(40, '1');
            })?;
        client.flush().await?;
        client.expect("8").await?;
    }

    let seq = client.next_seq();
    client.proxy.test_request("ABC", seq, SessionId::new(1))?;
    client.flush().await?;
    client.expect("0").await?;

    let seq = client.next_seq();
    client.proxy.logout(seq, SessionId::new(1))?;
    client.flush().await?;
    client.expect("5").await?;

    let status = handle
        .start_reproduction(ReproductionWindow::all())?
        .wait()
        .await?;
    info!(
        records = status.records,
        replayed = status.replayed,
        captured = status.captured,
        matched = status.matched,
        anomalies = status.anomalies,
        "reproduction finished"
    );
    for message in stash.drain() {
        let text = String::from_utf8_lossy(&message.frame).replace('\x01', "|");
        info!(connection_id = %message.connection_id, frame = %text, "reproduced");
    }

    handle.shutdown().await?;
    engine_task.await??;

    if !status.is_clean() {
        bail!("reproduction diverged with {} anomalies", status.anomalies);
    }
    Ok(())
}
