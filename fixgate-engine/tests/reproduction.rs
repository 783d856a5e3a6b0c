/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! End-to-end: a live session is logged, then reproduced from the log.

use fixgate_core::clock::ManualClock;
use fixgate_core::error::SessionError;
use fixgate_core::message::{MsgType, OwnedMessage};
use fixgate_core::types::{CompId, SessionId};
use fixgate_engine::{
    Application, EngineBuilder, EngineError, EngineHandle, Outbound, StashingMessageHandler,
};
use fixgate_session::{
    ApplicationSender, CapturePublication, CompositeKey, FixProtocol, FixProxy, SessionConfig,
    SessionProtocol, SessionProxy,
};
use fixgate_store::{MemoryLog, ReproductionWindow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const T0: u64 = 1_791_000_000_000_000_000;

/// Fills orders immediately; every reply field derives from the order.
struct Filler;

impl Application for Filler {
    fn on_message(
        &self,
        sender: &mut dyn ApplicationSender,
        message: &OwnedMessage,
    ) -> Result<(), SessionError> {
        if message.msg_type() != &MsgType::NewOrderSingle {
            return Ok(());
        }
        let cl_ord_id = message.get_field_str(11).unwrap_or_default().to_string();
        let order_id = format!("O-{cl_ord_id}");
        sender.send(&MsgType::ExecutionReport, &|body| {
            body.put_str(37, &order_id);
            body.put_str(11, &cl_ord_id);
            body.put_char(150, '0');
            body.put_char(39, '0');
        })?;
        Ok(())
    }
}

struct Client {
    proxy: FixProxy,
    seq: u64,
}

impl Client {
    fn new(clock: Arc<ManualClock>) -> Self {
        let protocol = FixProtocol::new("FIX.4.4");
        let mut proxy = protocol.make_proxy(Arc::new(CapturePublication::new()), clock);
        proxy.set_session(
            SessionId::new(1),
            CompositeKey::new(CompId::new("CLIENT").unwrap(), CompId::new("GW").unwrap()),
        );
        Self { proxy, seq: 0 }
    }

    fn next(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn logon(&mut self) -> Vec<u8> {
        let seq = self.next();
        self.proxy.logon(30, seq, SessionId::new(1), false).unwrap();
        self.proxy.last_frame().to_vec()
    }

    fn order(&mut self, cl_ord_id: &str) -> Vec<u8> {
        let seq = self.next();
        self.proxy
            .application(&MsgType::NewOrderSingle, seq, SessionId::new(1), &|body| {
                body.put_str(11, cl_ord_id);
                body.put_str(55, "EURUSD");
                body.put_char(54, '1');
                body.put_uint(38, 100);
            })
            .unwrap();
        self.proxy.last_frame().to_vec()
    }

    fn test_request(&mut self, id: &str) -> Vec<u8> {
        let seq = self.next();
        self.proxy.test_request(id, seq, SessionId::new(1)).unwrap();
        self.proxy.last_frame().to_vec()
    }

    fn logout(&mut self) -> Vec<u8> {
        let seq = self.next();
        self.proxy.logout(seq, SessionId::new(1)).unwrap();
        self.proxy.last_frame().to_vec()
    }
}

async fn exchange(
    handle: &EngineHandle,
    rx: &mut mpsc::Receiver<Outbound>,
    connection_id: fixgate_core::types::ConnectionId,
    frame: Vec<u8>,
) -> Outbound {
    handle.on_frame(connection_id, frame.into()).await.unwrap();
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

fn msg_type_of(outbound: &Outbound) -> String {
    let Outbound::Frame(frame) = outbound else {
        panic!("expected a frame, got {outbound:?}");
    };
    let text = String::from_utf8_lossy(frame);
    let start = text.find("\x0135=").unwrap() + 4;
    let end = start + text[start..].find('\x01').unwrap();
    text[start..end].to_string()
}

#[tokio::test]
async fn test_live_session_reproduces_without_anomalies() {
    let clock = Arc::new(ManualClock::new(T0));
    let log = Arc::new(MemoryLog::new());
    let stash = Arc::new(StashingMessageHandler::new());
    let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");

    let engine = EngineBuilder::new(config)
        .with_application(Filler)
        .with_clock(clock.clone())
        .with_log(log.clone())
        .with_reproduction_handler(stash.clone())
        .build()
        .unwrap();
    let (handle, _task) = engine.spawn();

    let connection_id = handle.next_connection_id();
    let (tx, mut rx) = handle.transport_channel();
    handle.accept(connection_id, tx).await.unwrap();

    let mut client = Client::new(clock.clone());
    let reply = exchange(&handle, &mut rx, connection_id, client.logon()).await;
    assert_eq!(msg_type_of(&reply), "A");

    for cl_ord_id in ["ORD-1", "ORD-2", "ORD-3"] {
        clock.advance_millis(10);
        let reply = exchange(&handle, &mut rx, connection_id, client.order(cl_ord_id)).await;
        assert_eq!(msg_type_of(&reply), "8");
    }

    clock.advance_millis(10);
    let reply = exchange(&handle, &mut rx, connection_id, client.test_request("ABC")).await;
    assert_eq!(msg_type_of(&reply), "0");

    clock.advance_millis(10);
    let reply = exchange(&handle, &mut rx, connection_id, client.logout()).await;
    assert_eq!(msg_type_of(&reply), "5");
    let closing = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(closing, Outbound::Disconnect(_)));

    let status = handle
        .start_reproduction(ReproductionWindow::all())
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(status.replayed, 6);
    assert!(status.matched >= 5);
    assert_eq!(status.matched, 6);
    assert_eq!(status.anomalies, 0);
    assert!(status.is_clean());

    let reproduced = stash.drain();
    assert_eq!(reproduced.len(), 6);
    assert!(reproduced.iter().all(|m| m.connection_id == connection_id));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_one_reproduction_in_flight() {
    let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");
    let engine = EngineBuilder::new(config).build().unwrap();
    let (handle, _task) = engine.spawn();

    let first = handle.start_reproduction(ReproductionWindow::all()).unwrap();
    assert!(handle.is_reproducing());
    let second = handle.start_reproduction(ReproductionWindow::all());
    assert!(matches!(second, Err(EngineError::ReproductionInFlight)));

    let status = first.wait().await.unwrap();
    assert_eq!(status.records, 0);
    assert!(!handle.is_reproducing());

    handle.shutdown().await.unwrap();
}
