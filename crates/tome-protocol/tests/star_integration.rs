//! Integration tests: hub and spokes on an in-process room.
//!
//! Every session runs its own loop task; peers are given fixed ids so the
//! handshake values are predictable.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tome_protocol::types::{CLIENT_CONNECTED, CLIENT_DISCONNECTED, HELLO, SERVER_CONNECTED, WORLD};
use tome_protocol::{
    Addressing, Audience, Flow, PeerId, Secret, Session, SessionBuilder, TomeError,
};
use tome_transport::{MemoryNetwork, RoomConfig};

type Seen = mpsc::UnboundedReceiver<(String, Value)>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

fn config() -> RoomConfig {
    RoomConfig::new("tome-test", "ROOM", "PW")
}

fn start(net: &MemoryNetwork, builder: SessionBuilder, id: &str) -> Session {
    let room = net.join_room_as(config(), PeerId::from(id)).unwrap();
    builder.spawn_on(room)
}

fn hub(net: &MemoryNetwork, id: &str) -> Session {
    start(net, SessionBuilder::host(), id)
}

fn spoke(net: &MemoryNetwork, id: &str) -> Session {
    start(net, SessionBuilder::join(), id)
}

/// Builder that forwards every payload of the given types to a channel.
fn recording(builder: SessionBuilder, types: &[&str]) -> (SessionBuilder, Seen) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut builder = builder;
    for msg_type in types {
        let tx = tx.clone();
        let tag = msg_type.to_string();
        builder = builder.subscribe(msg_type, move |data, _ctx| {
            let _ = tx.send((tag.clone(), data.clone()));
            Flow::Continue
        });
    }
    (builder, rx)
}

async fn next(rx: &mut Seen) -> (String, Value) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("channel closed")
}

async fn wait_for_members(session: &Session, expected: &[&str]) {
    let mut expected: Vec<PeerId> = expected.iter().map(|id| PeerId::from(*id)).collect();
    expected.sort();
    for _ in 0..500 {
        if session.members().await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "{} never reached members {expected:?}, has {:?}",
        session.local_id(),
        session.members().await.unwrap()
    );
}

async fn wait_for_hub(session: &Session) -> PeerId {
    for _ in 0..500 {
        if let Some(hub) = session.hub_id().await.unwrap() {
            return hub;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} was never admitted", session.local_id());
}

async fn wait_for_pending(session: &Session, count: usize) {
    for _ in 0..500 {
        if session.pending_requests().await.unwrap() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} never had {count} pending requests", session.local_id());
}

/// Hub and three spokes, all admitted and aware of each other.
async fn star(net: &MemoryNetwork) -> (Session, Session, Session, Session) {
    let h = hub(net, "H");
    let a = spoke(net, "A");
    wait_for_members(&h, &["A"]).await;
    let b = spoke(net, "B");
    wait_for_members(&h, &["A", "B"]).await;
    let c = spoke(net, "C");
    wait_for_members(&h, &["A", "B", "C"]).await;
    wait_for_members(&a, &["B", "C"]).await;
    wait_for_members(&b, &["A", "C"]).await;
    wait_for_members(&c, &["A", "B"]).await;
    (h, a, b, c)
}

// ── Handshake ───────────────────────────────────────────────────────────

/// The hub challenges `AAAAAA` with hash(id) and accepts hash(hash(id)).
#[tokio::test]
async fn handshake_uses_hash_chain_of_spoke_id() {
    init_tracing();
    let net = MemoryNetwork::new();

    let (hub_builder, mut hub_seen) = recording(SessionBuilder::host(), &[WORLD, CLIENT_CONNECTED]);
    let h = start(&net, hub_builder, "H");
    let (spoke_builder, mut spoke_seen) = recording(SessionBuilder::join(), &[HELLO, SERVER_CONNECTED]);
    let a = start(&net, spoke_builder, "AAAAAA");

    assert_eq!(
        next(&mut spoke_seen).await,
        (HELLO.to_string(), json!("LSkp4PG8qZ2WUpJM5zt5adM/9Ck="))
    );
    assert_eq!(next(&mut spoke_seen).await, (SERVER_CONNECTED.to_string(), json!("H")));

    assert_eq!(
        next(&mut hub_seen).await,
        (WORLD.to_string(), json!("h4VPU9KZieCM/ZBYjdzlh8/VjGI="))
    );
    assert_eq!(next(&mut hub_seen).await, (CLIENT_CONNECTED.to_string(), json!("AAAAAA")));

    assert_eq!(wait_for_hub(&a).await, PeerId::from("H"));
    assert_eq!(h.members().await.unwrap(), vec![PeerId::from("AAAAAA")]);
    assert_eq!(h.hub_id().await.unwrap(), Some(PeerId::from("H")));
    assert_eq!(h.pending_requests().await.unwrap(), 0);
}

/// A spoke joining before the hub is challenged once the hub shows up.
#[tokio::test]
async fn spoke_joining_first_is_admitted_later() {
    let net = MemoryNetwork::new();
    let a = spoke(&net, "A");
    assert_eq!(a.hub_id().await.unwrap(), None);

    let h = hub(&net, "H");
    assert_eq!(wait_for_hub(&a).await, PeerId::from("H"));
    wait_for_members(&h, &["A"]).await;
}

/// Sessions built from secrets meet only when the filtered secrets match.
#[tokio::test]
async fn secrets_select_the_room() {
    let net = MemoryNetwork::new();
    let h = Session::host(&net, Some(Secret::from("ab-c?d e f"))).await.unwrap();
    assert_eq!(h.secret(), Some(&Secret::from("ABC?DEF")));

    let good = Session::join(&net, Some(Secret::from("abc?def"))).await.unwrap();
    let stray = Session::join(&net, Some(Secret::from("ABC?XYZ"))).await.unwrap();

    wait_for_hub(&good).await;
    wait_for_members(&h, &[good.local_id().as_str()]).await;
    assert_eq!(stray.hub_id().await.unwrap(), None);
}

// ── Membership ──────────────────────────────────────────────────────────

/// C joining {A, B} learns both; A and B each learn C.
#[tokio::test]
async fn newcomer_and_members_learn_each_other() {
    let net = MemoryNetwork::new();
    let h = hub(&net, "H");
    let a = spoke(&net, "A");
    let b = spoke(&net, "B");
    wait_for_members(&h, &["A", "B"]).await;
    wait_for_members(&a, &["B"]).await;
    wait_for_members(&b, &["A"]).await;

    let c = spoke(&net, "C");
    wait_for_members(&c, &["A", "B"]).await;
    wait_for_members(&a, &["B", "C"]).await;
    wait_for_members(&b, &["A", "C"]).await;
    wait_for_members(&h, &["A", "B", "C"]).await;

    let ids = [PeerId::from("A"), PeerId::from("Z")];
    assert_eq!(c.include(&ids).await.unwrap(), vec![PeerId::from("A")]);
    assert_eq!(c.exclude(&ids).await.unwrap(), vec![PeerId::from("B")]);
}

// ── Relay ───────────────────────────────────────────────────────────────

/// A → B arrives with src = A, payload untouched, and the hub's own
/// listeners never see it.
#[tokio::test]
async fn hub_relays_transparently() {
    let net = MemoryNetwork::new();
    let (hub_builder, mut hub_seen) = recording(SessionBuilder::host(), &["chat", "marker"]);
    let h = start(&net, hub_builder, "H");
    let a = spoke(&net, "A");
    let (b_builder, mut b_seen) = recording(SessionBuilder::join(), &["chat"]);
    let b = start(&net, b_builder, "B");
    wait_for_members(&a, &["B"]).await;
    wait_for_members(&b, &["A"]).await;

    let (src_tx, mut src_rx) = mpsc::unbounded_channel();
    b.subscribe("chat", move |_, ctx| {
        let _ = src_tx.send(ctx.src().clone());
        Flow::Done
    })
    .await
    .unwrap();

    let payload = json!({"text": "hello", "n": [1, 2, 3]});
    a.send_to(&"B".into(), "chat", &payload).await.unwrap();

    assert_eq!(next(&mut b_seen).await, ("chat".to_string(), payload));
    let src = tokio::time::timeout(Duration::from_secs(5), src_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(src, PeerId::from("A"));

    h.send("marker", &json!(null), Addressing::default()).await.unwrap();
    assert_eq!(next(&mut hub_seen).await.0, "marker");
}

/// Request/response between two spokes goes through the hub both ways.
#[tokio::test]
async fn request_between_spokes() {
    let net = MemoryNetwork::new();
    let (_h, a, b, _c) = star(&net).await;

    b.subscribe("ping", |data, ctx| {
        if ctx.request_id().is_some() {
            let n = data.as_u64().unwrap_or(0);
            ctx.respond(json!(n + 1));
        }
        Flow::Continue
    })
    .await
    .unwrap();

    for n in 0..3u64 {
        let reply = a.request_to(&"B".into(), "ping", &n).await.unwrap();
        assert_eq!(reply, json!(n + 1));
    }
    assert_eq!(a.pending_requests().await.unwrap(), 0);
}

/// A reply travels back under the request's type, so a responder on both
/// ends sees it, answers only the request and never the reply.
#[tokio::test]
async fn echo_responders_answer_each_request_once() {
    let net = MemoryNetwork::new();
    let (_h, a, b, _c) = star(&net).await;

    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    for (session, name) in [(&a, "A"), (&b, "B")] {
        let tx = calls_tx.clone();
        session
            .subscribe("ping", move |data, ctx| {
                let _ = tx.send((name, ctx.request_id().is_some()));
                if ctx.request_id().is_some() {
                    ctx.respond(data.clone());
                }
                Flow::Continue
            })
            .await
            .unwrap();
    }

    let reply = a.request_to(&"B".into(), "ping", &1).await.unwrap();
    assert_eq!(reply, json!(1));

    // anything still bouncing between A and B reaches B ahead of this
    let (marker_tx, mut marker) = mpsc::unbounded_channel();
    b.subscribe("marker", move |_, _| {
        let _ = marker_tx.send(());
        Flow::Done
    })
    .await
    .unwrap();
    a.send_to(&"B".into(), "marker", &()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), marker.recv())
        .await
        .unwrap()
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(call) = calls.try_recv() {
        seen.push(call);
    }
    seen.sort();
    assert_eq!(seen, vec![("A", false), ("B", true)]);
}

/// A listener can answer a request with a request of its own.
#[tokio::test]
async fn listener_can_chain_requests() {
    let net = MemoryNetwork::new();
    let (_h, a, b, _c) = star(&net).await;

    b.subscribe("question", |_, ctx| {
        let _follow_up = ctx.request(json!("are you sure?"));
        Flow::Done
    })
    .await
    .unwrap();
    a.subscribe("question", |data, ctx| {
        if data.as_str() == Some("are you sure?") {
            ctx.respond(json!("yes"));
            return Flow::Done;
        }
        Flow::Continue
    })
    .await
    .unwrap();

    let reply = a.request_to(&"B".into(), "question", &"ready?").await.unwrap();
    assert_eq!(reply, json!("are you sure?"));
    wait_for_pending(&b, 0).await;
}

// ── Departure ───────────────────────────────────────────────────────────

/// B leaving rejects A's outstanding request to B and A observes one
/// departure even though both the room and the hub report it.
#[tokio::test]
async fn departure_rejects_pending_and_is_announced_once() {
    let net = MemoryNetwork::new();
    let h = hub(&net, "H");
    let (a_builder, mut a_seen) = recording(SessionBuilder::join(), &[CLIENT_DISCONNECTED, "marker"]);
    let a = start(&net, a_builder, "A");
    let b = spoke(&net, "B");
    wait_for_members(&a, &["B"]).await;
    wait_for_members(&b, &["A"]).await;

    // B never answers
    b.subscribe("ping", |_, _| Flow::Continue).await.unwrap();

    let requester = a.clone();
    let outstanding =
        tokio::spawn(async move { requester.request_to(&"B".into(), "ping", &"anyone?").await });
    wait_for_pending(&a, 1).await;

    b.quit().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), outstanding)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Err(TomeError::RequestAbandoned { peer: "B".into() }));
    assert_eq!(a.pending_requests().await.unwrap(), 0);

    wait_for_members(&h, &["A"]).await;
    h.send_to(&"A".into(), "marker", &0).await.unwrap();

    assert_eq!(next(&mut a_seen).await, (CLIENT_DISCONNECTED.to_string(), json!("B")));
    assert_eq!(next(&mut a_seen).await.0, "marker");
    wait_for_members(&a, &[]).await;
}

/// The hub leaving clears the spoke's hub and sends become impossible.
#[tokio::test]
async fn hub_departure_is_noticed() {
    let net = MemoryNetwork::new();
    let h = hub(&net, "H");
    let (a_builder, mut a_seen) =
        recording(SessionBuilder::join(), &[tome_protocol::types::SERVER_DISCONNECTED]);
    let a = start(&net, a_builder, "A");
    wait_for_hub(&a).await;

    h.quit().await.unwrap();

    assert_eq!(
        next(&mut a_seen).await,
        (tome_protocol::types::SERVER_DISCONNECTED.to_string(), json!("H"))
    );
    assert_eq!(a.hub_id().await.unwrap(), None);
    assert_eq!(
        a.send_to(&"B".into(), "chat", &"hi").await,
        Err(TomeError::NoHub)
    );
}

// ── Dispatch ────────────────────────────────────────────────────────────

/// One-shot listeners fire once; persistent listeners fire every time.
#[tokio::test]
async fn one_shot_and_persistent_listeners() {
    let net = MemoryNetwork::new();
    let (_h, a, b, _c) = star(&net).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let once = tx.clone();
    b.subscribe("tick", move |data, _| {
        let _ = once.send(("once", data.clone()));
        Flow::Done
    })
    .await
    .unwrap();
    let always = tx.clone();
    b.subscribe("tick", move |data, _| {
        let _ = always.send(("always", data.clone()));
        Flow::Continue
    })
    .await
    .unwrap();
    b.subscribe("marker", move |_, _| {
        let _ = tx.send(("marker", Value::Null));
        Flow::Continue
    })
    .await
    .unwrap();

    for i in 0..3 {
        a.send_to(&"B".into(), "tick", &i).await.unwrap();
    }
    a.send_to(&"B".into(), "marker", &()).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if item.0 == "marker" {
            break;
        }
        seen.push(item);
    }
    assert_eq!(
        seen,
        vec![
            ("once", json!(0)),
            ("always", json!(0)),
            ("always", json!(1)),
            ("always", json!(2)),
        ]
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct Chat {
    text: String,
}

/// Typed listeners skip payloads of the wrong shape.
#[tokio::test]
async fn typed_listener_skips_wrong_shape() {
    let net = MemoryNetwork::new();
    let (_h, a, b, _c) = star(&net).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    b.subscribe_typed("chat", move |chat: Chat, ctx| {
        let _ = tx.send((ctx.src().clone(), chat));
        Flow::Done
    })
    .await
    .unwrap();

    a.send_to(&"B".into(), "chat", &42).await.unwrap();
    a.send_to(&"B".into(), "chat", &json!({"text": "hi"})).await.unwrap();

    let (src, chat) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(src, PeerId::from("A"));
    assert_eq!(chat, Chat { text: "hi".into() });
}

/// Broadcast reaches exactly the selected members.
#[tokio::test]
async fn broadcast_with_audience() {
    let net = MemoryNetwork::new();
    let (h, a, b, c) = star(&net).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    for session in [&a, &b, &c] {
        let tx = tx.clone();
        let me = session.local_id().clone();
        session
            .subscribe("news", move |_, _| {
                let _ = tx.send(me.clone());
                Flow::Continue
            })
            .await
            .unwrap();
    }

    h.broadcast("news", &"extra", Audience::Except(vec!["B".into()]))
        .await
        .unwrap();

    let mut got = vec![
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap(),
        tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap(),
    ];
    got.sort();
    assert_eq!(got, vec![PeerId::from("A"), PeerId::from("C")]);

    // a spoke's broadcast goes through the hub to each selected spoke
    a.broadcast("news", &"from a", Audience::Only(vec!["C".into()]))
        .await
        .unwrap();
    let got = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, PeerId::from("C"));
}

// ── Loopback and lifecycle ──────────────────────────────────────────────

/// Default addressing is local delivery, including request/response.
#[tokio::test]
async fn loopback_request() {
    let net = MemoryNetwork::new();
    let h = hub(&net, "H");
    h.subscribe("echo", |data, ctx| {
        if ctx.request_id().is_some() {
            ctx.respond(data.clone());
        }
        Flow::Continue
    })
    .await
    .unwrap();

    let reply = h.request("echo", &json!({"k": 5}), Addressing::default()).await.unwrap();
    assert_eq!(reply, json!({"k": 5}));
}

/// Quitting rejects what is pending and closes the handle.
#[tokio::test]
async fn quit_closes_session() {
    let net = MemoryNetwork::new();
    let h = hub(&net, "H");
    let a = spoke(&net, "A");
    wait_for_hub(&a).await;

    let requester = a.clone();
    let outstanding =
        tokio::spawn(async move { requester.request_to(&"H".into(), "void", &()).await });
    wait_for_pending(&a, 1).await;

    a.quit().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), outstanding)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Err(TomeError::SessionClosed));
    assert_eq!(a.members().await, Err(TomeError::SessionClosed));
    assert_eq!(a.quit().await, Err(TomeError::SessionClosed));

    wait_for_members(&h, &[]).await;
}
