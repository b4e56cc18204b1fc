//! Submission-to-delivery tests.

use super::{start_dispatcher, wait_until};
use db_courier::client::{MockConnector, MockScript, RowSet};
use db_courier::config::DatabaseConfig;
use db_courier::dispatch::{Dispatcher, QUERY_NAME_MAX};
use db_courier::error::CourierError;
use db_courier::export::RecordingSink;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_results_are_delivered_in_submission_order() {
    let script = MockScript::new();
    let (dispatcher, sink) = start_dispatcher(&script);
    let scope = dispatcher.begin_scope("ranking");

    for i in 0..5 {
        scope
            .submit(0, i, &format!("q{i}"), &format!("SELECT {i}"))
            .unwrap();
    }

    wait_until(|| scope.inbox_len() == 5).await;
    assert_eq!(scope.drain(Duration::from_secs(1)), 5);

    let names: Vec<String> = sink.delivered().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["q0", "q1", "q2", "q3", "q4"]);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_submission_rejected_when_disabled() {
    let script = MockScript::new();
    let sink = Arc::new(RecordingSink::new());
    let dispatcher = Dispatcher::start(
        &DatabaseConfig::default(),
        Box::new(MockConnector::new(script.clone())),
        sink,
    );

    assert!(!dispatcher.is_enabled());
    let scope = dispatcher.begin_scope("ranking");
    let err = scope.submit(0, 0, "nope", "SELECT 1").unwrap_err();
    assert!(matches!(err, CourierError::Disabled));
    assert_eq!(dispatcher.queue_len(), 0);
    assert_eq!(script.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_long_labels_are_truncated() {
    let script = MockScript::new();
    let (dispatcher, sink) = start_dispatcher(&script);
    let scope = dispatcher.begin_scope("ranking");

    let long_name = "a-name-far-longer-than-the-label-width-allows";
    scope.submit(0, 0, long_name, "SELECT 1").unwrap();

    wait_until(|| scope.inbox_len() == 1).await;
    scope.drain(Duration::from_secs(1));

    let delivered = sink.delivered();
    assert_eq!(delivered[0].name.len(), QUERY_NAME_MAX);
    assert_eq!(delivered[0].name, &long_name[..QUERY_NAME_MAX]);

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_fmt_builds_the_query_text() {
    let script = MockScript::new();
    let (dispatcher, sink) = start_dispatcher(&script);
    let scope = dispatcher.begin_scope("ranking");

    let player = "O'Neil";
    scope
        .submit_fmt(
            3,
            11,
            "by-name",
            format_args!(
                "SELECT wins FROM players WHERE name = '{}'",
                db_courier::escape::escape_literal(player)
            ),
        )
        .unwrap();

    wait_until(|| scope.inbox_len() == 1).await;
    scope.drain(Duration::from_secs(1));

    let delivered = sink.delivered();
    assert_eq!(
        delivered[0].query,
        "SELECT wins FROM players WHERE name = 'O\\'Neil'"
    );
    assert_eq!(delivered[0].kind, 3);
    assert_eq!(delivered[0].user_data, 11);

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_grid_matches_the_returned_rows() {
    let script = MockScript::new();
    script.expect_rows(
        "SELECT name, alias FROM players",
        vec![RowSet::new(
            2,
            vec![
                vec![Some("alice".to_string()), None],
                vec![Some("bob".to_string()), Some("bobby".to_string())],
                vec![None, Some("ghost".to_string())],
            ],
        )],
    );
    let (dispatcher, sink) = start_dispatcher(&script);
    let scope = dispatcher.begin_scope("ranking");
    scope
        .submit(0, 0, "aliases", "SELECT name, alias FROM players")
        .unwrap();

    wait_until(|| scope.inbox_len() == 1).await;
    scope.drain(Duration::from_secs(1));

    let delivered = sink.delivered();
    let result = &delivered[0];
    assert!(result.success);
    assert_eq!(result.row_count, 3);
    assert_eq!(result.column_count, 2);

    let grid = result.grid.as_ref().unwrap();
    assert_eq!(grid.row_count() * grid.column_count(), 6);
    assert_eq!(grid.cell(0, 0), Some("alice"));
    assert_eq!(grid.cell(0, 1), None);
    assert_eq!(grid.cell(1, 1), Some("bobby"));
    assert_eq!(grid.cell(2, 0), None);

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_only_the_first_row_set_is_retained() {
    let script = MockScript::new();
    script.expect_rows(
        "CALL weekly_report()",
        vec![
            RowSet::new(1, vec![vec![Some("week".to_string())]]),
            RowSet::new(
                3,
                vec![
                    vec![None, None, None],
                    vec![None, None, None],
                ],
            ),
        ],
    );
    let (dispatcher, sink) = start_dispatcher(&script);
    let scope = dispatcher.begin_scope("ranking");
    scope.submit(0, 0, "report", "CALL weekly_report()").unwrap();

    wait_until(|| scope.inbox_len() == 1).await;
    scope.drain(Duration::from_secs(1));

    let delivered = sink.delivered();
    assert_eq!(delivered[0].row_count, 1);
    assert_eq!(delivered[0].column_count, 1);
    assert_eq!(delivered[0].grid.as_ref().unwrap().cell(0, 0), Some("week"));

    dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_statement_is_surfaced_through_the_success_flag() {
    let script = MockScript::new();
    script.expect_error("SELECT broken", "Unknown column 'broken'");
    let (dispatcher, sink) = start_dispatcher(&script);
    let scope = dispatcher.begin_scope("ranking");
    scope.submit(0, 0, "broken", "SELECT broken").unwrap();

    wait_until(|| scope.inbox_len() == 1).await;
    scope.drain(Duration::from_secs(1));

    let delivered = sink.delivered();
    assert!(!delivered[0].success);
    assert_eq!(delivered[0].row_count, 0);
    assert!(delivered[0].grid.is_none());

    dispatcher.shutdown().await;
}
