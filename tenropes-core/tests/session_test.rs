mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{CHANNEL, FakeApi, FakeTransport, Gate, channel, page, push_payload};
use tenropes_core::compose::Draft;
use tenropes_core::context::SessionContext;
use tenropes_core::feed::{LivePolicy, PAGE_SIZE};
use tenropes_core::models::{Content, UserMetadata};
use tenropes_core::session::{ChannelSession, FeedEvent, LoadOlder, SessionOptions};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn open_session(
    api: Arc<FakeApi>,
    transport: &FakeTransport,
) -> (ChannelSession<FakeApi>, mpsc::UnboundedReceiver<FeedEvent>) {
    let (events, receiver) = mpsc::unbounded_channel();
    let session = ChannelSession::open(
        &channel(CHANNEL),
        api,
        transport,
        SessionContext::new(),
        SessionOptions {
            policy: LivePolicy::Prepend,
            events: Some(events),
        },
    )
    .await;
    (session, receiver)
}

#[tokio::test]
async fn test_open_loads_initial_page_newest_first() {
    let served = page(CHANNEL, 1_000, PAGE_SIZE);
    let api = Arc::new(FakeApi::with_pages(vec![(0, served.clone())]));
    let (transport, _live) = FakeTransport::new();

    let (session, _events) = open_session(api.clone(), &transport).await;

    let expected: Vec<_> = served.into_iter().rev().collect();
    assert_eq!(session.messages().await, expected);
    assert_eq!(api.history_calls(), 1);
    assert!(session.is_live());

    let feed = session.feed().await;
    assert_eq!(feed.batch_offset(), 0);
    assert!(feed.has_more());
    assert!(!feed.is_fetching_history());
}

#[tokio::test]
async fn test_live_push_is_prepended() {
    let api = Arc::new(FakeApi::with_pages(vec![(0, page(CHANNEL, 1_000, 2))]));
    let (transport, live) = FakeTransport::new();
    let (session, mut events) = open_session(api, &transport).await;

    // timestamp older than everything in the feed
    live.unbounded_send(Ok(push_payload(CHANNEL, "bob", 10, "late")))
        .unwrap();

    let event = events.recv().await.unwrap();
    let FeedEvent::Pushed(pushed) = event else {
        panic!("expected a pushed message, got {event:?}");
    };

    let messages = session.messages().await;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], pushed);
    assert_eq!(messages[0].content, Content::Text("late".to_string()));
    assert_eq!(messages[1].timestamp.timestamp_millis(), 2_000);
}

#[tokio::test]
async fn test_malformed_push_is_dropped() {
    let api = Arc::new(FakeApi::with_pages(vec![(0, page(CHANNEL, 1_000, 2))]));
    let (transport, live) = FakeTransport::new();
    let (session, mut events) = open_session(api, &transport).await;

    live.unbounded_send(Ok("{not json".to_string())).unwrap();
    live.unbounded_send(Ok(push_payload(CHANNEL, "bob", 5_000, "still here")))
        .unwrap();

    assert!(matches!(events.recv().await, Some(FeedEvent::Dropped(_))));
    assert!(matches!(events.recv().await, Some(FeedEvent::Pushed(_))));
    assert_eq!(session.messages().await.len(), 3);
}

#[tokio::test]
async fn test_live_disconnect_is_reported() {
    let api = Arc::new(FakeApi::default());
    let (transport, live) = FakeTransport::new();
    let (_session, mut events) = open_session(api, &transport).await;

    drop(live);

    assert_eq!(events.recv().await, Some(FeedEvent::Disconnected));
}

#[tokio::test]
async fn test_open_without_live_connection_still_loads() {
    let api = Arc::new(FakeApi::with_pages(vec![(0, page(CHANNEL, 1_000, 5))]));
    let transport = FakeTransport::refusing();

    let (session, _events) = open_session(api, &transport).await;

    assert!(!session.is_live());
    assert_eq!(session.messages().await.len(), 5);
}

#[tokio::test]
async fn test_initial_failure_leaves_feed_empty() {
    let api = Arc::new(FakeApi::default());
    api.fail_at(0);
    let (transport, _live) = FakeTransport::new();

    let (session, _events) = open_session(api.clone(), &transport).await;

    assert!(session.messages().await.is_empty());
    assert_eq!(session.load_older().await.unwrap(), LoadOlder::Skipped);
    assert_eq!(api.history_calls(), 1);
}

#[tokio::test]
async fn test_members_are_loaded() {
    let api = Arc::new(FakeApi {
        members: vec![UserMetadata {
            username: "bob".to_string(),
            display_name: "Bob B.".to_string(),
            img: String::new(),
            status: "online".to_string(),
        }],
        ..FakeApi::default()
    });
    let (transport, _live) = FakeTransport::new();

    let (session, _events) = open_session(api, &transport).await;

    let members = session.members().await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].username, "bob");
    assert_eq!(members[0].label(), "Bob B.");
}

#[tokio::test]
async fn test_members_failure_is_not_fatal() {
    let api = Arc::new(FakeApi {
        fail_members: true,
        ..FakeApi::with_pages(vec![(0, page(CHANNEL, 1_000, 3))])
    });
    let (transport, _live) = FakeTransport::new();

    let (session, _events) = open_session(api, &transport).await;

    assert!(session.members().await.is_empty());
    assert_eq!(session.messages().await.len(), 3);
}

#[tokio::test]
async fn test_load_older_until_exhausted() {
    let api = Arc::new(FakeApi::with_pages(vec![
        (0, page(CHANNEL, 300_000, PAGE_SIZE)),
        (40, page(CHANNEL, 200_000, PAGE_SIZE)),
        (80, page(CHANNEL, 100_000, 12)),
    ]));
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;

    assert_eq!(
        session.load_older().await.unwrap(),
        LoadOlder::Appended(PAGE_SIZE)
    );
    assert_eq!(session.feed().await.batch_offset(), 40);

    assert_eq!(session.load_older().await.unwrap(), LoadOlder::Appended(12));
    assert_eq!(session.feed().await.batch_offset(), 80);

    assert_eq!(session.load_older().await.unwrap(), LoadOlder::Exhausted);
    assert!(!session.feed().await.has_more());
    assert_eq!(session.feed().await.batch_offset(), 80);

    // no more network traffic once history is exhausted
    assert_eq!(session.load_older().await.unwrap(), LoadOlder::Skipped);
    assert_eq!(*api.requested_offsets.lock().unwrap(), vec![0, 40, 80, 120]);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2 * PAGE_SIZE + 12);
    assert!(
        messages
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp)
    );
}

#[tokio::test]
async fn test_failed_load_older_can_be_retried() {
    let api = Arc::new(FakeApi::with_pages(vec![
        (0, page(CHANNEL, 300_000, PAGE_SIZE)),
        (40, page(CHANNEL, 200_000, PAGE_SIZE)),
    ]));
    api.fail_at(40);
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;

    assert!(session.load_older().await.is_err());
    {
        let feed = session.feed().await;
        assert_eq!(feed.batch_offset(), 0);
        assert!(feed.has_more());
        assert!(!feed.is_fetching_history());
    }

    api.recover_at(40);
    assert_eq!(
        session.load_older().await.unwrap(),
        LoadOlder::Appended(PAGE_SIZE)
    );
    assert_eq!(*api.requested_offsets.lock().unwrap(), vec![0, 40, 40]);
}

#[tokio::test]
async fn test_concurrent_load_older_issues_one_request() {
    let api = Arc::new(FakeApi {
        gate: Some(Gate::default()),
        ..FakeApi::with_pages(vec![
            (0, page(CHANNEL, 300_000, PAGE_SIZE)),
            (40, page(CHANNEL, 200_000, PAGE_SIZE)),
        ])
    });
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;
    let gate = api.gate.as_ref().unwrap();

    let (first, second) = tokio::join!(session.load_older(), async {
        gate.started.notified().await;
        let second = session.load_older().await;
        gate.release.notify_one();
        second
    });

    assert_eq!(first.unwrap(), LoadOlder::Appended(PAGE_SIZE));
    assert_eq!(second.unwrap(), LoadOlder::Skipped);
    // initial page plus exactly one older page
    assert_eq!(api.history_calls(), 2);
}

#[tokio::test]
async fn test_abandoned_load_older_can_be_retried() {
    let api = Arc::new(FakeApi {
        gate: Some(Gate::default()),
        ..FakeApi::with_pages(vec![
            (0, page(CHANNEL, 300_000, PAGE_SIZE)),
            (40, page(CHANNEL, 200_000, PAGE_SIZE)),
        ])
    });
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;
    let gate = api.gate.as_ref().unwrap();

    let abandoned = timeout(Duration::from_millis(50), session.load_older()).await;
    assert!(abandoned.is_err());
    assert!(!session.feed().await.is_fetching_history());

    let (retry, _) = tokio::join!(session.load_older(), async {
        gate.started.notified().await;
        gate.release.notify_one();
    });

    assert_eq!(retry.unwrap(), LoadOlder::Appended(PAGE_SIZE));
    assert_eq!(*api.requested_offsets.lock().unwrap(), vec![0, 40, 40]);
    let feed = session.feed().await;
    assert_eq!(feed.len(), 2 * PAGE_SIZE);
    assert_eq!(feed.batch_offset(), 40);
}

#[tokio::test]
async fn test_history_arriving_after_close_is_discarded() {
    let api = Arc::new(FakeApi {
        gate: Some(Gate::default()),
        ..FakeApi::with_pages(vec![
            (0, page(CHANNEL, 300_000, PAGE_SIZE)),
            (40, page(CHANNEL, 200_000, PAGE_SIZE)),
        ])
    });
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;
    let gate = api.gate.as_ref().unwrap();

    let (outcome, _) = tokio::join!(session.load_older(), async {
        gate.started.notified().await;
        session.close();
        gate.release.notify_one();
    });

    assert_eq!(outcome.unwrap(), LoadOlder::Stale);
    assert!(session.is_closed());
    let feed = session.feed().await;
    assert_eq!(feed.len(), PAGE_SIZE);
    assert_eq!(feed.batch_offset(), 0);
}

#[tokio::test]
async fn test_close_stops_live_updates() {
    let api = Arc::new(FakeApi::with_pages(vec![(0, page(CHANNEL, 1_000, 2))]));
    let (transport, live) = FakeTransport::new();
    let (session, mut events) = open_session(api, &transport).await;

    session.close();
    tokio::task::yield_now().await;

    // the receiving side is gone with the aborted task
    let _ = live.unbounded_send(Ok(push_payload(CHANNEL, "bob", 9_000, "too late")));
    tokio::task::yield_now().await;

    assert!(!session.is_live());
    assert_eq!(session.messages().await.len(), 2);
    assert!(events.try_recv().is_err());
    assert_eq!(session.load_older().await.unwrap(), LoadOlder::Stale);
}

#[tokio::test]
async fn test_session_tracks_active_channel() {
    let api = Arc::new(FakeApi::default());
    let (transport, _live) = FakeTransport::new();
    let context = SessionContext::new();

    let session = ChannelSession::open(
        &channel(CHANNEL),
        api,
        &transport,
        context.clone(),
        SessionOptions::default(),
    )
    .await;

    assert_eq!(context.active_channel(), Some(CHANNEL));
    assert!(!context.should_alert(Some(CHANNEL)));
    assert!(context.should_alert(Some(CHANNEL + 1)));

    drop(session);

    assert_eq!(context.active_channel(), None);
    assert!(context.should_alert(Some(CHANNEL)));
}

#[tokio::test]
async fn test_send_image_link() {
    let api = Arc::new(FakeApi::default());
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;

    let mut draft = Draft::new("  http://x.com/pic.JPG?w=200  ");
    assert!(session.send(&mut draft).await.unwrap());

    assert_eq!(
        api.sent(),
        vec![(CHANNEL, Content::Image("http://x.com/pic.jpg".to_string()))]
    );
    assert!(draft.is_blank());
    // nothing is inserted locally, the message comes back over the live feed
    assert!(session.messages().await.is_empty());
}

#[tokio::test]
async fn test_send_text_verbatim() {
    let api = Arc::new(FakeApi::default());
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;

    let mut draft = Draft::new("hello world");
    assert!(session.send(&mut draft).await.unwrap());

    assert_eq!(
        api.sent(),
        vec![(CHANNEL, Content::Text("hello world".to_string()))]
    );
}

#[tokio::test]
async fn test_send_blank_draft_is_noop() {
    let api = Arc::new(FakeApi::default());
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;

    let mut draft = Draft::new("   ");
    assert!(!session.send(&mut draft).await.unwrap());
    assert!(api.sent().is_empty());
}

#[tokio::test]
async fn test_send_failure_preserves_draft() {
    let api = Arc::new(FakeApi::default());
    api.fail_send.store(true, Ordering::SeqCst);
    let (transport, _live) = FakeTransport::new();
    let (session, _events) = open_session(api.clone(), &transport).await;

    let mut draft = Draft::new("are you there?");
    let result = session.send(&mut draft).await;

    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to send message to channel 7")
    );
    assert_eq!(draft.as_str(), "are you there?");

    api.fail_send.store(false, Ordering::SeqCst);
    assert!(session.send(&mut draft).await.unwrap());
    assert!(draft.is_blank());
}
