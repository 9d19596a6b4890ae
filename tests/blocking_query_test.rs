mod common;

use blocking_query::Cursor;
use blocking_query::RefToken;
use blocking_query::SourceEvent;
use blocking_query::SourceStatus;
use common::*;
use futures::StreamExt;
use serde_json::json;

const WEB: &str = "service/dc1/service/web";

#[tokio::test]
async fn subscribers_share_one_watch_and_see_every_change() {
    let t = test_client(FakeCatalog::new(json!({ "v": 1 })));
    let a = RefToken::generate();
    let b = RefToken::generate();

    let source = t.client.open(WEB, &a).unwrap();
    let mut rx = source.subscribe();
    assert_eq!(next_body(&mut rx).await, json!({ "v": 1 }));

    let shared = t.client.open(WEB, &b).unwrap();
    assert_eq!(shared.id(), source.id());
    assert_eq!(t.client.subscriber_count(&source), 2);

    t.catalog.update(json!({ "v": 2 }));
    assert_eq!(next_body(&mut rx).await, json!({ "v": 2 }));
    assert_eq!(source.cursor(), Some(Cursor::from(2)));

    wait_until(|| t.catalog.call_count() == 3).await;
    assert_eq!(
        t.catalog.seen_cursors(),
        vec![None, Some(Cursor::from(1)), Some(Cursor::from(2))]
    );
}

#[tokio::test]
async fn last_close_caches_cursor_and_reopen_resumes_from_it() {
    let t = test_client(FakeCatalog::new(json!({ "v": 1 })));
    let a = RefToken::from("a");
    let b = RefToken::from("b");

    let source = t.client.open(WEB, &a).unwrap();
    let mut rx = source.subscribe();
    next_body(&mut rx).await;
    t.client.open(WEB, &b).unwrap();

    t.client.close(&source, &a);
    assert_eq!(source.status(), SourceStatus::Polling);

    t.client.close(&source, &b);
    assert!(matches!(next_event(&mut rx).await, SourceEvent::Closed));
    assert_eq!(t.client.active_sources(), 0);
    assert_eq!(t.client.cached(WEB).unwrap().cursor, Some(Cursor::from(1)));

    let calls_before = t.catalog.call_count();
    let reopened = t.client.open(WEB, &a).unwrap();
    let mut replay = Box::pin(reopened.stream());
    match replay.next().await {
        Some(SourceEvent::Message(response)) => assert_eq!(response.body, json!({ "v": 1 })),
        other => panic!("expected replayed message, got {:?}", other),
    }

    wait_until(|| t.catalog.call_count() == calls_before + 1).await;
    assert_eq!(t.catalog.seen_cursors().last().unwrap(), &Some(Cursor::from(1)));

    let mut rx = reopened.subscribe();
    assert_quiet(&mut rx).await;
    t.catalog.update(json!({ "v": 2 }));
    assert_eq!(next_body(&mut rx).await, json!({ "v": 2 }));
}

#[tokio::test]
async fn aborted_request_resumes_once_transport_is_available() {
    let t = test_client(FakeCatalog::new(json!({ "v": 1 })));
    t.gate.set_available(false);
    t.catalog.abort_next();
    let a = RefToken::from("a");

    let source = t.client.open(WEB, &a).unwrap();
    let mut rx = source.subscribe();

    wait_until(|| t.catalog.call_count() == 1).await;
    assert_quiet(&mut rx).await;
    assert_eq!(source.status(), SourceStatus::Polling);

    t.gate.set_available(true);
    assert_eq!(next_body(&mut rx).await, json!({ "v": 1 }));
}

#[tokio::test]
async fn disabling_blocking_turns_the_watch_into_one_full_fetch() {
    let t = test_client(FakeCatalog::new(json!({ "v": 1 })));
    let a = RefToken::from("a");

    let source = t.client.open(WEB, &a).unwrap();
    let mut rx = source.subscribe();
    next_body(&mut rx).await;
    wait_until(|| t.catalog.call_count() == 2).await;

    t.settings.set_blocking(false);
    t.catalog.update(json!({ "v": 2 }));

    assert_eq!(next_body(&mut rx).await, json!({ "v": 2 }));
    assert!(matches!(next_event(&mut rx).await, SourceEvent::Closed));
    assert_eq!(t.client.active_sources(), 0);
    assert_eq!(t.client.cached(WEB).unwrap().cursor, Some(Cursor::from(2)));

    let again = t.client.open(WEB, &RefToken::from("b")).unwrap();
    let mut rx = again.subscribe();
    assert_eq!(next_body(&mut rx).await, json!({ "v": 2 }));
    assert!(matches!(next_event(&mut rx).await, SourceEvent::Closed));
    assert_eq!(t.catalog.seen_cursors().last().unwrap(), &None);
}

#[tokio::test]
async fn metrics_expose_watch_activity() {
    let t = test_client(FakeCatalog::new(json!([])));
    let a = RefToken::from("a");

    let source = t.client.open(WEB, &a).unwrap();
    let mut rx = source.subscribe();
    next_body(&mut rx).await;

    let text = blocking_query::metrics::gather_metrics();
    assert!(text.contains("blocking_active_sources"));
    assert!(text.contains("blocking_poll_cycles"));
}
