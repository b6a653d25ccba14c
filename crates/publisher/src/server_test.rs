use std::time::Duration;

use spine_metrics::MetricsCollector;
use spine_protocol::{
    decode_frame, decode_header, Frame, FrameBody, L1Body, MessageType, TradeBody,
    FRAME_HEADER_LEN,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::*;

/// Heartbeats disabled unless a test opts in
fn quiet_config() -> PublisherConfig {
    PublisherConfig {
        address: "127.0.0.1".into(),
        port: 0,
        auth_token: "devtoken".into(),
        client_queue_capacity: 100,
        heartbeat_interval: Duration::from_secs(3_600),
    }
}

async fn start(
    config: PublisherConfig,
    metrics: &MetricsCollector,
) -> (ServerHandle, Publisher, std::net::SocketAddr) {
    let server = PublisherServer::bind(config, metrics).await.unwrap();
    let addr = server.local_addr().unwrap();
    let publisher = server.handle();
    (server.spawn(), publisher, addr)
}

async fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
}

async fn read_one_frame(stream: &mut TcpStream) -> Frame {
    let mut header = [0u8; FRAME_HEADER_LEN];
    stream.read_exact(&mut header).await.unwrap();
    let parsed = decode_header(&header).unwrap();

    let mut full = header.to_vec();
    full.resize(FRAME_HEADER_LEN + parsed.body_len as usize, 0);
    stream
        .read_exact(&mut full[FRAME_HEADER_LEN..])
        .await
        .unwrap();
    decode_frame(&full).unwrap()
}

async fn expect_ack(stream: &mut TcpStream, code: u32) {
    let frame = tokio::time::timeout(Duration::from_secs(2), read_one_frame(stream))
        .await
        .expect("timed out waiting for ack");
    match frame.body {
        FrameBody::ControlAck(ack) => assert_eq!(ack.code, code),
        other => panic!("expected ack {code}, got {other:?}"),
    }
}

async fn authed_client(addr: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_line(&mut stream, r#"{"op":"auth","token":"devtoken"}"#).await;
    expect_ack(&mut stream, 200).await;
    stream
}

fn l1_frame() -> Frame {
    Frame::from(L1Body {
        ts_ns: 1_000_000_000,
        symbol_id: 1,
        bid_px: 1_000_000_000,
        bid_sz: 100_000_000,
        ask_px: 1_001_000_000,
        ask_sz: 200_000_000,
        seq: 1,
    })
}

#[tokio::test]
async fn subscriber_receives_matching_frame() {
    let metrics = MetricsCollector::new();
    let (server, publisher, addr) = start(quiet_config(), &metrics).await;

    let mut client = authed_client(addr).await;
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["l1.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;

    // Let the subscription land before publishing
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(publisher.publish("l1.BTCUSDT", &l1_frame()), 1);

    let frame = tokio::time::timeout(Duration::from_secs(2), read_one_frame(&mut client))
        .await
        .unwrap();
    assert_eq!(frame.message_type(), MessageType::L1);
    match frame.body {
        FrameBody::L1(body) => {
            assert_eq!(body.symbol_id, 1);
            assert_eq!(body.bid_px, 1_000_000_000);
            assert_eq!(body.ask_px, 1_001_000_000);
            assert_eq!(body.seq, 1);
        }
        other => panic!("expected L1, got {other:?}"),
    }

    server.stop().await;
}

#[tokio::test]
async fn non_matching_topic_is_not_delivered() {
    let metrics = MetricsCollector::new();
    let (server, publisher, addr) = start(quiet_config(), &metrics).await;

    let mut client = authed_client(addr).await;
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["l1.BTCUSDT"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(publisher.publish("l1.ETHUSDT", &l1_frame()), 0);
    assert_eq!(publisher.publish("trade.BTCUSDT", &l1_frame()), 0);

    // Nothing should arrive
    let mut probe = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_millis(200), client.read(&mut probe)).await;
    assert!(read.is_err(), "unexpected data delivered");

    server.stop().await;
}

#[tokio::test]
async fn subscribe_before_auth_is_rejected_then_bad_token_closes() {
    let metrics = MetricsCollector::new();
    let (server, _publisher, addr) = start(quiet_config(), &metrics).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Unauthenticated subscribe: 401, socket stays open — even the bare
    // form without a topics list
    send_line(&mut stream, r#"{"op":"subscribe"}"#).await;
    expect_ack(&mut stream, 401).await;

    send_line(
        &mut stream,
        r#"{"op":"subscribe","topics":["l1.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut stream, 401).await;

    // Wrong token: 401 and the server closes
    send_line(&mut stream, r#"{"op":"auth","token":"wrong"}"#).await;
    expect_ack(&mut stream, 401).await;

    let mut probe = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut probe))
        .await
        .expect("server should close the socket");
    assert_eq!(read.unwrap(), 0, "expected EOF after failed auth");

    assert_eq!(metrics.counter_value("publisher_auth_failures_total"), 1);
    server.stop().await;
}

#[tokio::test]
async fn unknown_op_and_garbage_get_400() {
    let metrics = MetricsCollector::new();
    let (server, _publisher, addr) = start(quiet_config(), &metrics).await;

    let mut client = authed_client(addr).await;

    send_line(&mut client, r#"{"op":"frobnicate"}"#).await;
    expect_ack(&mut client, 400).await;

    send_line(&mut client, "not json").await;
    expect_ack(&mut client, 400).await;

    // Still usable afterwards
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["trade.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;

    server.stop().await;
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let metrics = MetricsCollector::new();
    let (server, publisher, addr) = start(quiet_config(), &metrics).await;

    let mut client = authed_client(addr).await;
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["trade.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(publisher.publish("trade.BTCUSDT", &l1_frame()), 1);
    let _ = tokio::time::timeout(Duration::from_secs(2), read_one_frame(&mut client))
        .await
        .unwrap();

    send_line(&mut client, r#"{"op":"unsubscribe","topics":["trade.*"]}"#).await;
    expect_ack(&mut client, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(publisher.publish("trade.BTCUSDT", &l1_frame()), 0);
    server.stop().await;
}

#[tokio::test]
async fn heartbeats_arrive_once_authenticated() {
    let metrics = MetricsCollector::new();
    let mut config = quiet_config();
    config.heartbeat_interval = Duration::from_millis(100);
    let (server, _publisher, addr) = start(config, &metrics).await;

    let mut client = authed_client(addr).await;

    let frame = tokio::time::timeout(Duration::from_secs(2), read_one_frame(&mut client))
        .await
        .expect("no heartbeat within 2s");
    assert_eq!(frame.message_type(), MessageType::Heartbeat);
    match frame.body {
        FrameBody::Heartbeat(hb) => assert!(hb.ts_ns > 0),
        other => panic!("expected heartbeat, got {other:?}"),
    }

    server.stop().await;
}

#[tokio::test]
async fn full_queue_drops_and_counts_queue_full() {
    // Current-thread runtime: the publish loop below never yields, so the
    // writer task cannot drain and the bounded queue must overflow
    let metrics = MetricsCollector::new();
    let mut config = quiet_config();
    config.client_queue_capacity = 100;
    let (server, publisher, addr) = start(config, &metrics).await;

    let mut client = authed_client(addr).await;
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["trade.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let frame = Frame::from(TradeBody {
        ts_ns: 1,
        symbol_id: 1,
        price: 1,
        size: 1,
        aggressor: 0,
        seq: 1,
    });
    for _ in 0..1_000 {
        publisher.publish("trade.BTCUSDT", &frame);
    }

    assert!(
        metrics.counter_value("publisher_frames_dropped_queue_full") >= 1,
        "expected drops after overflowing a 100-slot queue with 1000 frames"
    );
    assert_eq!(metrics.counter_value("publisher_frames_dropped_backpressure"), 0);

    server.stop().await;
}

#[tokio::test]
async fn lossless_subscription_counts_backpressure_drops() {
    let metrics = MetricsCollector::new();
    let mut config = quiet_config();
    config.client_queue_capacity = 10;
    let (server, publisher, addr) = start(config, &metrics).await;

    let mut client = authed_client(addr).await;
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["trade.*"],"lossless":true}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let frame = Frame::from(TradeBody {
        ts_ns: 1,
        symbol_id: 1,
        price: 1,
        size: 1,
        aggressor: 0,
        seq: 1,
    });
    for _ in 0..100 {
        publisher.publish("trade.BTCUSDT", &frame);
    }

    assert!(metrics.counter_value("publisher_frames_dropped_backpressure") >= 1);
    server.stop().await;
}

#[tokio::test]
async fn slow_consumer_does_not_affect_others() {
    let metrics = MetricsCollector::new();
    let mut config = quiet_config();
    config.client_queue_capacity = 10;
    let (server, publisher, addr) = start(config, &metrics).await;

    // Fast client reads everything; slow client reads nothing
    let mut fast = authed_client(addr).await;
    send_line(
        &mut fast,
        r#"{"op":"subscribe","topics":["trade.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut fast, 200).await;

    let mut slow = authed_client(addr).await;
    send_line(
        &mut slow,
        r#"{"op":"subscribe","topics":["trade.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut slow, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let frame = Frame::from(TradeBody {
        ts_ns: 1,
        symbol_id: 1,
        price: 1,
        size: 1,
        aggressor: 0,
        seq: 7,
    });

    let total = 50;
    for _ in 0..total {
        publisher.publish("trade.BTCUSDT", &frame);
        // Yield so the fast client's writer can drain its queue
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    for _ in 0..total {
        let got = tokio::time::timeout(Duration::from_secs(2), read_one_frame(&mut fast))
            .await
            .expect("fast client must receive every frame");
        assert_eq!(got.message_type(), MessageType::Trade);
    }

    server.stop().await;
}

#[tokio::test]
async fn active_clients_lists_connections() {
    let metrics = MetricsCollector::new();
    let (server, publisher, addr) = start(quiet_config(), &metrics).await;

    let _client = authed_client(addr).await;
    assert_eq!(publisher.client_count(), 1);
    assert_eq!(publisher.active_clients().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn replay_prefix_topics_match_like_live_topics() {
    let metrics = MetricsCollector::new();
    let (server, publisher, addr) = start(quiet_config(), &metrics).await;
    publisher.register_virtual_prefix("replay.rpl_0001");

    let mut client = authed_client(addr).await;
    send_line(
        &mut client,
        r#"{"op":"subscribe","topics":["replay.rpl_0001.*"],"lossless":false}"#,
    )
    .await;
    expect_ack(&mut client, 200).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(
        publisher.publish("replay.rpl_0001.l1.BTCUSDT", &l1_frame()),
        1
    );
    let frame = tokio::time::timeout(Duration::from_secs(2), read_one_frame(&mut client))
        .await
        .unwrap();
    assert_eq!(frame.message_type(), MessageType::L1);

    publisher.unregister_virtual_prefix("replay.rpl_0001");
    server.stop().await;
}
