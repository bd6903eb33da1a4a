use std::error::Error;
use std::sync::Arc;

use chatshell::config::ConfigFile;
use chatshell::engine::Engine;
use chatshell::poll::{AuthorizationSet, Inbound, MessagePoller};
use chatshell::transport::{BotIdentity, RoomInfo, RoomKind};
use chatshell_test_utils::{
    ConfigBuilder, FakeTransport, OPERATOR, init_tracing, test_room, with_timeout,
};
use chrono::{Duration, Utc};

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    transport: FakeTransport,
    engine: Engine,
    poller: MessagePoller,
}

async fn harness(cfg: ConfigFile, room: RoomInfo) -> Harness {
    let transport = FakeTransport::new(room.clone());
    let authorized = AuthorizationSet::from_canonical([OPERATOR]);
    let engine = Engine::start(&cfg, Arc::new(transport.clone()), &room, &authorized)
        .await
        .expect("engine should start");
    let bot = BotIdentity {
        display_name: "Shelly".to_string(),
        nickname: "Shelly".to_string(),
        is_bot: true,
    };
    let poller = MessagePoller::new(
        Arc::new(transport.clone()),
        room,
        &bot,
        authorized,
        &cfg.poll,
        engine.handle(),
        Utc::now() - Duration::seconds(60),
    );
    Harness {
        transport,
        engine,
        poller,
    }
}

#[tokio::test]
async fn unauthorized_senders_are_ignored() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut h = harness(ConfigBuilder::new(dir.path()).build(), test_room()).await;

    h.transport.post("intruder@example.com", "cmd touch /tmp/pwned");
    h.transport.post("OPS@example.com", "help");

    let batch = h.poller.poll_once().await?;
    assert_eq!(
        batch,
        vec![Inbound {
            message_id: "msg-2".to_string(),
            sender: OPERATOR.to_string(),
            text: "help".to_string(),
        }]
    );

    h.transport.post("intruder@example.com", "cmd id");
    assert_eq!(h.poller.tick().await, 0);

    assert!(h.engine.registry().is_empty());
    with_timeout(h.engine.shutdown()).await;
    assert!(h.transport.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn repolled_messages_are_dispatched_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut h = harness(ConfigBuilder::new(dir.path()).build(), test_room()).await;

    h.transport.post(OPERATOR, "cmd echo once");
    assert_eq!(h.poller.tick().await, 1);
    assert_eq!(h.poller.tick().await, 0);
    assert_eq!(h.poller.tick().await, 0);
    assert_eq!(h.engine.registry().len(), 1);

    h.transport.post(OPERATOR, "list active");
    assert_eq!(h.poller.tick().await, 1);

    with_timeout(h.engine.shutdown()).await;
    let acks = h
        .transport
        .sent_texts()
        .into_iter()
        .filter(|t| t.starts_with("Received command"))
        .count();
    assert_eq!(acks, 1);
    Ok(())
}

#[tokio::test]
async fn messages_before_the_watermark_are_skipped() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut h = harness(ConfigBuilder::new(dir.path()).build(), test_room()).await;

    h.transport
        .post_at(OPERATOR, "cmd echo stale", Utc::now() - Duration::hours(1));
    assert!(h.poller.poll_once().await?.is_empty());

    with_timeout(h.engine.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn listing_failures_skip_the_tick() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut h = harness(ConfigBuilder::new(dir.path()).build(), test_room()).await;

    h.transport.post(OPERATOR, "help");
    h.transport.fail_next_lists(2);
    assert_eq!(h.poller.tick().await, 0);
    assert_eq!(h.poller.tick().await, 0);
    assert_eq!(h.poller.tick().await, 1);
    assert_eq!(h.transport.list_calls(), 3);

    with_timeout(h.engine.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn group_rooms_strip_the_bot_mention() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let room = RoomInfo {
        kind: RoomKind::Group,
        ..test_room()
    };
    let mut h = harness(ConfigBuilder::new(dir.path()).build(), room).await;

    h.transport.post(OPERATOR, "Shelly cmd echo hi");
    let batch = h.poller.poll_once().await?;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].text, "cmd echo hi");

    with_timeout(h.engine.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn batch_size_limits_each_poll() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut h = harness(ConfigBuilder::new(dir.path()).build(), test_room()).await;

    for _ in 0..12 {
        h.transport.post(OPERATOR, "help");
    }
    let batch = h.poller.poll_once().await?;
    assert_eq!(batch.len(), 10);
    assert_eq!(batch[0].message_id, "msg-3");
    assert_eq!(batch[9].message_id, "msg-12");

    with_timeout(h.engine.shutdown()).await;
    Ok(())
}
