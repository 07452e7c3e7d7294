use super::*;
use crate::channels::lark::frame::{HEADER_BIZ_RT, HEADER_TYPE, Header, TYPE_PING};
use crate::config::LarkConfig;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn event_body(event_id: &str) -> Vec<u8> {
    json!({
        "schema": "2.0",
        "header": {"event_id": event_id, "event_type": "im.message.receive_v1"},
        "event": {
            "sender": {"sender_id": {"open_id": "ou_1"}},
            "message": {
                "message_id": "om_1",
                "chat_id": "oc_1",
                "chat_type": "p2p",
                "message_type": "text",
                "content": "{\"text\":\"hello\"}"
            }
        }
    })
    .to_string()
    .into_bytes()
}

fn data_frame(message_id: &str, sum: usize, seq: usize, payload: Vec<u8>) -> Frame {
    let headers = [
        (HEADER_TYPE, TYPE_EVENT.to_string()),
        (HEADER_MESSAGE_ID, message_id.to_string()),
        (HEADER_SUM, sum.to_string()),
        (HEADER_SEQ, seq.to_string()),
    ];
    Frame {
        seq_id: 7,
        log_id: 9,
        service: 3,
        method: METHOD_DATA,
        headers: headers
            .into_iter()
            .map(|(k, v)| Header {
                key: k.to_string(),
                value: v,
            })
            .collect(),
        payload: Some(payload),
        ..Default::default()
    }
}

#[test]
fn test_frame_wire_round_trip_keeps_zero_fields() {
    let ping = Frame::ping(42);
    let decoded = Frame::from_bytes(&ping.to_bytes()).unwrap();
    assert_eq!(decoded, ping);
    assert_eq!(decoded.frame_type(), TYPE_PING);
    assert_eq!(decoded.seq_id, 0);
    assert_eq!(decoded.service, 42);
}

#[test]
fn test_ack_carries_code_and_biz_rt() {
    let frame = data_frame("m1", 1, 0, b"{}".to_vec());
    let ack = frame.ack(Duration::from_millis(12));
    assert_eq!(ack.payload.as_deref(), Some(&br#"{"code":200}"#[..]));
    assert_eq!(ack.header(HEADER_BIZ_RT), Some("12"));
    assert_eq!(ack.seq_id, frame.seq_id);
    assert_eq!(ack.header(HEADER_MESSAGE_ID), Some("m1"));
}

#[test]
fn test_assembler_joins_parts_in_seq_order() {
    let mut asm = PayloadAssembler::new(Duration::from_secs(10));
    assert_eq!(asm.push("m", 1, 0, b"whole".to_vec()), Some(b"whole".to_vec()));
    assert_eq!(asm.push("m", 3, 2, b"c".to_vec()), None);
    assert_eq!(asm.push("m", 3, 0, b"a".to_vec()), None);
    assert_eq!(asm.pending_len(), 1);
    assert_eq!(asm.push("m", 3, 1, b"b".to_vec()), Some(b"abc".to_vec()));
    assert_eq!(asm.pending_len(), 0);
    // out-of-range seq is ignored
    assert_eq!(asm.push("x", 2, 5, b"z".to_vec()), None);
}

#[test]
fn test_service_id_from_url() {
    assert_eq!(
        service_id_from_url("wss://msg-frontier.feishu.cn/ws/v2?device_id=1&service_id=33554678"),
        33_554_678
    );
    assert_eq!(service_id_from_url("wss://example.com/ws"), 0);
    assert_eq!(service_id_from_url("not a url"), 0);
}

#[tokio::test]
async fn test_handler_forwards_event_and_acks() {
    let (tx, mut rx) = mpsc::channel(4);
    let mut handler = FrameHandler::new(tx, None, Duration::from_secs(120));

    let outcome = handler.handle(data_frame("m1", 1, 0, event_body("ev_9"))).await;
    let FrameOutcome::Reply(ack) = outcome else {
        panic!("expected an ack");
    };
    assert_eq!(ack.payload.as_deref(), Some(&br#"{"code":200}"#[..]));

    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.event_id, "ev_9");
    assert_eq!(msg.text, "hello");
}

#[tokio::test]
async fn test_handler_waits_for_all_parts() {
    let (tx, mut rx) = mpsc::channel(4);
    let mut handler = FrameHandler::new(tx, None, Duration::from_secs(120));
    let body = event_body("ev_split");
    let (first, second) = body.split_at(body.len() / 2);

    assert!(matches!(
        handler.handle(data_frame("m2", 2, 0, first.to_vec())).await,
        FrameOutcome::Nothing
    ));
    assert!(rx.try_recv().is_err());
    assert!(matches!(
        handler.handle(data_frame("m2", 2, 1, second.to_vec())).await,
        FrameOutcome::Reply(_)
    ));
    assert_eq!(rx.recv().await.unwrap().event_id, "ev_split");
}

#[tokio::test]
async fn test_handler_pong_updates_ping_interval() {
    let (tx, _rx) = mpsc::channel(1);
    let mut handler = FrameHandler::new(tx, None, Duration::from_secs(120));
    let mut pong = Frame::ping(1);
    pong.set_header(HEADER_TYPE, TYPE_PONG);
    pong.payload = Some(br#"{"PingInterval": 30, "ReconnectCount": -1}"#.to_vec());

    assert!(matches!(handler.handle(pong).await, FrameOutcome::Nothing));
    assert_eq!(handler.ping_interval(), Duration::from_secs(30));
}

#[tokio::test]
async fn test_handler_reports_shutdown_when_receiver_dropped() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let mut handler = FrameHandler::new(tx, None, Duration::from_secs(120));
    assert!(matches!(
        handler.handle(data_frame("m3", 1, 0, event_body("ev_x"))).await,
        FrameOutcome::Shutdown
    ));
}

#[tokio::test]
async fn test_endpoint_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback/ws/endpoint"))
        .and(body_partial_json(json!({"AppID": "cli_test", "AppSecret": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {
                "URL": "wss://frontier.example/ws/v2?device_id=d&service_id=77",
                "ClientConfig": {
                    "ReconnectCount": -1,
                    "ReconnectInterval": 120,
                    "ReconnectNonce": 30,
                    "PingInterval": 90
                }
            }
        })))
        .mount(&server)
        .await;

    let client = Arc::new(LarkClient::new(LarkConfig {
        app_id: "cli_test".into(),
        app_secret: "secret".into(),
        domain: server.uri(),
        ..Default::default()
    }));
    let (tx, _rx) = mpsc::channel(1);
    let endpoint = LongConnection::new(client, tx).endpoint().await.unwrap();
    assert_eq!(endpoint.service_id, 77);
    assert_eq!(endpoint.config.ping_interval, 90);
    assert!(endpoint.url.starts_with("wss://frontier.example"));
}

#[tokio::test]
async fn test_endpoint_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callback/ws/endpoint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1_000_040_343, "msg": "system busy"
        })))
        .mount(&server)
        .await;

    let client = Arc::new(LarkClient::new(LarkConfig {
        domain: server.uri(),
        ..Default::default()
    }));
    let (tx, _rx) = mpsc::channel(1);
    let err = LongConnection::new(client, tx).endpoint().await.unwrap_err();
    assert!(err.to_string().contains("system busy"));
}
