//! Scope lifecycle and ownership tests.
//!
//! The interleavings here are the reason the dispatcher exists: scopes end
//! while their queries are still queued or executing, and every in-flight
//! result must either reach a live inbox or be discarded, with the context
//! released exactly once, after its last outstanding query resolves.

use super::{start_dispatcher, wait_until};
use db_courier::client::MockScript;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_context_released_only_after_last_resolution() {
    let script = MockScript::gated();
    let (dispatcher, sink) = start_dispatcher(&script);

    let scope = dispatcher.begin_scope("session");
    for i in 0..3 {
        scope
            .submit(0, i, &format!("q{i}"), &format!("SELECT {i}"))
            .unwrap();
    }
    let watch = scope.watch();
    scope.end();

    assert!(watch.is_live());
    assert_eq!(watch.pending(), Some(3));

    // resolve the three queries one at a time
    script.release(1);
    wait_until(|| watch.pending() == Some(2)).await;
    assert!(watch.is_live());
    assert_eq!(watch.inbox_len(), Some(0));

    script.release(1);
    wait_until(|| watch.pending() == Some(1)).await;
    assert!(watch.is_live());

    script.release(1);
    wait_until(|| !watch.is_live()).await;

    // every result was discarded, none delivered
    assert!(sink.is_empty());
    assert_eq!(script.executed().len(), 3);

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_discarded_result_does_not_release_a_context_with_work_left() {
    let script = MockScript::gated();
    let (dispatcher, sink) = start_dispatcher(&script);

    let scope = dispatcher.begin_scope("session");
    scope.submit(0, 0, "first", "SELECT 1").unwrap();
    scope.submit(0, 0, "second", "SELECT 2").unwrap();
    let watch = scope.watch();
    drop(scope);

    script.release(1);
    wait_until(|| watch.pending() == Some(1)).await;

    // one query still outstanding: discarded, but alive as an allocation
    assert!(watch.is_live());
    assert_eq!(watch.inbox_len(), Some(0));
    assert!(sink.is_empty());

    script.release(1);
    wait_until(|| !watch.is_live()).await;

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ending_an_idle_scope_releases_it_immediately() {
    let script = MockScript::new();
    let (dispatcher, _sink) = start_dispatcher(&script);

    let scope = dispatcher.begin_scope("session");
    let watch = scope.watch();
    scope.end();

    assert!(!watch.is_live());
    assert_eq!(watch.pending(), None);

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_undrained_results_are_released_with_the_scope() {
    let script = MockScript::new();
    let (dispatcher, sink) = start_dispatcher(&script);

    let scope = dispatcher.begin_scope("session");
    scope.submit(0, 0, "first", "SELECT 1").unwrap();
    scope.submit(0, 0, "second", "SELECT 2").unwrap();
    wait_until(|| scope.inbox_len() == 2).await;

    // the caller walks away without draining
    let watch = scope.watch();
    scope.end();

    assert!(!watch.is_live());
    assert!(sink.is_empty());

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_scope_survives_results_landing_after_its_end() {
    let script = MockScript::gated();
    let (dispatcher, sink) = start_dispatcher(&script);

    // a second scope keeps running while the first dies mid-flight
    let doomed = dispatcher.begin_scope("doomed");
    let survivor = dispatcher.begin_scope("survivor");

    doomed.submit(0, 0, "d", "SELECT 10").unwrap();
    survivor.submit(0, 0, "s", "SELECT 20").unwrap();

    let watch = doomed.watch();
    doomed.end();

    script.release(2);
    wait_until(|| !watch.is_live()).await;
    wait_until(|| survivor.inbox_len() == 1).await;

    assert_eq!(survivor.drain(Duration::from_secs(1)), 1);
    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].module, "survivor");

    dispatcher.shutdown().await;
}
