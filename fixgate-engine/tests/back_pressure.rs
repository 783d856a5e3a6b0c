/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! A writer that falls behind delays frames but never loses them.

use fixgate_core::clock::ManualClock;
use fixgate_core::types::{CompId, SessionId};
use fixgate_engine::{EngineBuilder, Outbound};
use fixgate_session::{
    CapturePublication, CompositeKey, DisconnectReason, FixProtocol, SessionConfig,
    SessionProtocol, SessionProxy,
};
use fixgate_store::{MemoryLog, ReproductionWindow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const T0: u64 = 1_791_000_000_000_000_000;

async fn next(rx: &mut mpsc::Receiver<Outbound>) -> Outbound {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

fn text_of(outbound: &Outbound) -> String {
    let Outbound::Frame(frame) = outbound else {
        panic!("expected a frame, got {outbound:?}");
    };
    String::from_utf8_lossy(frame).into_owned()
}

#[tokio::test]
async fn test_full_writer_channel_delays_replies() {
    let clock = Arc::new(ManualClock::new(T0));
    let log = Arc::new(MemoryLog::new());
    let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");
    let engine = EngineBuilder::new(config)
        .with_clock(clock.clone())
        .with_log(log.clone())
        .with_outbound_capacity(1)
        .with_poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let (handle, _task) = engine.spawn();

    let connection_id = handle.next_connection_id();
    let (tx, mut rx) = handle.transport_channel();
    handle.accept(connection_id, tx).await.unwrap();

    let mut client = FixProtocol::new("FIX.4.4").make_proxy(Arc::new(CapturePublication::new()), clock);
    client.set_session(
        SessionId::new(1),
        CompositeKey::new(CompId::new("CLIENT").unwrap(), CompId::new("GW").unwrap()),
    );

    // The Logon reply fills the channel before the TestRequest is handled.
    client.logon(30, 1, SessionId::new(1), false).unwrap();
    handle
        .on_frame(connection_id, client.last_frame().to_vec().into())
        .await
        .unwrap();
    client.test_request("ABC", 2, SessionId::new(1)).unwrap();
    handle
        .on_frame(connection_id, client.last_frame().to_vec().into())
        .await
        .unwrap();

    assert!(text_of(&next(&mut rx).await).contains("\x0135=A\x01"));
    let heartbeat = text_of(&next(&mut rx).await);
    assert!(heartbeat.contains("\x0135=0\x01"));
    assert!(heartbeat.contains("\x01112=ABC\x01"));

    client.logout(3, SessionId::new(1)).unwrap();
    handle
        .on_frame(connection_id, client.last_frame().to_vec().into())
        .await
        .unwrap();
    assert!(text_of(&next(&mut rx).await).contains("\x0135=5\x01"));
    assert_eq!(
        next(&mut rx).await,
        Outbound::Disconnect(DisconnectReason::Logout)
    );

    let status = handle
        .start_reproduction(ReproductionWindow::all())
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(status.replayed, 3);
    assert_eq!(status.matched, 3);
    assert!(status.is_clean());

    handle.shutdown().await.unwrap();
}
