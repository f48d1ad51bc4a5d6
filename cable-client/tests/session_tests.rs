use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cable_client::testing::{MockTransport, MockTransportHandle};
use cable_client::{
    Backoff, Client, ClientOptions, Handler, InboundRequest, PropertyMap, Qos, RetryConfig,
    SessionStatus, StatusCode,
};
use cable_wire::{
    CloseCode, ConnackCode, ConnackPacket, Identity, MessackPacket, MessagePacket, Packet,
    PingPongPacket, RequestPacket, ResponsePacket,
};

struct NoopHandler;
impl Handler for NoopHandler {
    fn on_request(&self, request: InboundRequest) -> ResponsePacket {
        request.respond(StatusCode::NotFound, Vec::new())
    }
}

fn start(options: ClientOptions) -> (Client, MockTransportHandle) {
    let (transport, test_handle) = MockTransport::pair();
    let client = Client::with_transport(Box::new(transport), options, Arc::new(NoopHandler));
    (client, test_handle)
}

fn send_frame(handle: &MockTransportHandle, packet: Packet) {
    let frame = packet.encode().unwrap();
    handle
        .to_engine
        .send(cable_client::TransportEvent::Message(frame.freeze()))
        .unwrap();
}

async fn recv_packet(handle: &mut MockTransportHandle) -> Packet {
    let bytes: Bytes = tokio::time::timeout(Duration::from_secs(1), handle.from_engine.recv())
        .await
        .expect("timed out waiting for outgoing frame")
        .expect("engine dropped outgoing channel");
    Packet::decode(&bytes).unwrap()
}

async fn open_session(options: ClientOptions) -> (Client, MockTransportHandle) {
    let (client, mut handle) = start(options);
    client.connect(Identity::new("user", "client-1", "pw"));

    let Packet::Connect(_connect) = recv_packet(&mut handle).await else {
        panic!("expected outgoing Connect");
    };
    send_frame(
        &handle,
        Packet::Connack(ConnackPacket {
            code: ConnackCode::Accepted,
            props: PropertyMap::new(),
        }),
    );

    for _ in 0..50 {
        if client.status() == SessionStatus::Opened {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(client.status(), SessionStatus::Opened);
    (client, handle)
}

#[tokio::test]
async fn handshake_opens_session_on_connack_accepted() {
    let (client, _handle) = open_session(ClientOptions::default()).await;
    assert!(client.is_ready());
}

#[tokio::test]
async fn send_and_request_fail_with_not_ready_before_open() {
    let (client, _handle) = start(ClientOptions::default());
    let err = client
        .send(1, b"x".to_vec(), Qos::Qos0, PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, cable_client::SessionError::NotReady));

    let err = client
        .request("ping", Vec::new(), PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, cable_client::SessionError::NotReady));
}

#[tokio::test]
async fn qos1_message_retransmits_with_dup_until_acked() {
    let options = ClientOptions {
        message_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let (client, mut handle) = open_session(options).await;

    let send_task = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .send(7, b"hello".to_vec(), Qos::Qos1, PropertyMap::new())
                .await
        }
    });

    let Packet::Message(first) = recv_packet(&mut handle).await else {
        panic!("expected outgoing Message");
    };
    assert!(!first.dup);

    let Packet::Message(retry) = recv_packet(&mut handle).await else {
        panic!("expected retransmitted Message");
    };
    assert!(retry.dup);
    assert_eq!(retry.id, first.id);

    send_frame(
        &handle,
        Packet::Messack(MessackPacket {
            id: first.id,
            props: PropertyMap::new(),
        }),
    );

    let result = tokio::time::timeout(Duration::from_secs(1), send_task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn concurrent_requests_resolve_out_of_order() {
    let (client, mut handle) = open_session(ClientOptions::default()).await;

    let call_a = tokio::spawn({
        let client = client.clone();
        async move { client.request("a", Vec::new(), PropertyMap::new()).await }
    });
    let Packet::Request(req_a) = recv_packet(&mut handle).await else {
        panic!("expected Request a");
    };

    let call_b = tokio::spawn({
        let client = client.clone();
        async move { client.request("b", Vec::new(), PropertyMap::new()).await }
    });
    let Packet::Request(req_b) = recv_packet(&mut handle).await else {
        panic!("expected Request b");
    };

    // Respond out of order: b before a.
    send_frame(
        &handle,
        Packet::Response(ResponsePacket {
            id: req_b.id,
            code: StatusCode::Ok,
            body: b"b-body".to_vec(),
            props: PropertyMap::new(),
        }),
    );
    send_frame(
        &handle,
        Packet::Response(ResponsePacket {
            id: req_a.id,
            code: StatusCode::Ok,
            body: b"a-body".to_vec(),
            props: PropertyMap::new(),
        }),
    );

    let result_a = call_a.await.unwrap().unwrap();
    let result_b = call_b.await.unwrap().unwrap();
    assert_eq!(result_a.body, b"a-body");
    assert_eq!(result_b.body, b"b-body");
}

#[tokio::test]
async fn inbound_request_is_answered_via_handler() {
    let (_client, mut handle) = open_session(ClientOptions::default()).await;

    send_frame(
        &handle,
        Packet::Request(RequestPacket {
            id: 99,
            method: "whoami".to_string(),
            body: Vec::new(),
            props: PropertyMap::new(),
        }),
    );

    let Packet::Response(response) = recv_packet(&mut handle).await else {
        panic!("expected outgoing Response");
    };
    assert_eq!(response.id, 99);
    assert_eq!(response.code, StatusCode::NotFound);
}

#[tokio::test]
async fn qos1_inbound_message_is_acknowledged() {
    let (_client, mut handle) = open_session(ClientOptions::default()).await;

    send_frame(
        &handle,
        Packet::Message(MessagePacket {
            id: 42,
            qos: Qos::Qos1,
            dup: false,
            kind: 3,
            payload: b"payload".to_vec(),
            props: PropertyMap::new(),
        }),
    );

    let Packet::Messack(ack) = recv_packet(&mut handle).await else {
        panic!("expected Messack");
    };
    assert_eq!(ack.id, 42);
}

#[tokio::test]
async fn server_close_drops_session_to_closed_without_retry() {
    let (client, handle) = open_session(ClientOptions::default()).await;
    client.auto_retry(RetryConfig {
        limit: Some(0),
        backoff: Backoff::Const { delay: 0.0 },
        should_suppress: None,
    });
    tokio::time::sleep(Duration::from_millis(5)).await;

    send_frame(
        &handle,
        Packet::Close(cable_wire::ClosePacket {
            code: CloseCode::PolicyViolation,
        }),
    );

    for _ in 0..50 {
        if client.status() == SessionStatus::Closed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(client.status(), SessionStatus::Closed);
}

#[tokio::test]
async fn ping_pong_keeps_session_open() {
    let options = ClientOptions {
        ping_interval: Duration::from_millis(15),
        ping_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let (client, mut handle) = open_session(options).await;

    let Packet::Ping(_) = recv_packet(&mut handle).await else {
        panic!("expected outgoing Ping");
    };
    send_frame(
        &handle,
        Packet::Pong(PingPongPacket {
            props: PropertyMap::new(),
        }),
    );

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(client.status(), SessionStatus::Opened);
}

#[tokio::test]
async fn connack_rejected_without_retry_closes_session() {
    let mut options = ClientOptions::default();
    options.ping_interval = Duration::from_secs(60);
    let (client, mut handle) = start(options);
    client.auto_retry(RetryConfig {
        limit: Some(0),
        backoff: Backoff::Const { delay: 0.0 },
        should_suppress: None,
    });
    client.connect(Identity::new("u", "c", "p"));

    let Packet::Connect(_) = recv_packet(&mut handle).await else {
        panic!("expected outgoing Connect");
    };
    send_frame(
        &handle,
        Packet::Connack(ConnackPacket {
            code: ConnackCode::Rejected,
            props: PropertyMap::new(),
        }),
    );

    for _ in 0..50 {
        if client.status() == SessionStatus::Closed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(client.status(), SessionStatus::Closed);
}
