//! Scenarios that exercise `Server` directly: registering through a
//! real accept loop, then reloading configuration and observing the
//! soft-reset side effect on the live session.

mod support;

use std::sync::Arc;
use std::time::Duration;

use sccp_core::codec::{read_frame, write_frame};
use sccp_core::message::{ids, Message};
use sccp_core::{ConfigSnapshot, Host, Server};
use support::{test_config, FakeHost};
use tokio::net::TcpStream;

#[tokio::test]
async fn config_reload_with_changed_dateformat_sends_soft_reset_and_closes() {
    let config: ConfigSnapshot = test_config("SEPRELOAD", 30, 5);
    let host: Arc<dyn Host> = Arc::new(FakeHost::new("default", "100"));
    let server = Arc::new(Server::new(Arc::new(config.clone()), host));

    let running = server.clone();
    tokio::spawn(async move {
        let _ = running.run().await;
    });
    // Give the listener a moment to bind before connecting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut stream = TcpStream::connect("127.0.0.1:2000").await.unwrap();
    write_frame(
        &mut stream,
        ids::REGISTER,
        &Message::Register { name: "SEPRELOAD".into(), device_type: 115, proto_version: 11, max_streams: 2 }.encode(),
    )
    .await
    .unwrap();
    let frame = read_frame(&mut stream).await.unwrap();
    let ack = Message::decode(frame.id, &frame.body).unwrap();
    assert!(matches!(ack, Message::RegisterAck { .. }));
    for _ in 0..3 {
        read_frame(&mut stream).await.unwrap(); // drain bootstrap
    }

    let mut reloaded = config;
    reloaded.devices[0].dateformat = "M.D.Y".into();
    let needing_reset = server.reload_config(Arc::new(reloaded)).await;
    assert_eq!(needing_reset, vec!["SEPRELOAD".to_string()]);

    let frame = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut stream)).await.unwrap().unwrap();
    assert_eq!(frame.id, ids::RESET);
    let reset = Message::decode(frame.id, &frame.body).unwrap();
    assert!(matches!(reset, Message::Reset { hard: false }));

    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0, "session should close shortly after the soft reset");

    server.shutdown().await;
}
