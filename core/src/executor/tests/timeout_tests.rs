//! Wall-clock bound and completion fallback

use super::helpers::{json_value, options};
use crate::executor::execute;
use crate::types::{FaultKind, LogKind};
use serde_json::json;
use std::time::{Duration, Instant};

/* ===================== Hard Timeout ===================== */

#[tokio::test]
async fn test_busy_loop_times_out() {
    let started = Instant::now();
    let result = execute("while (true) {}", &options(500)).await;
    let elapsed = started.elapsed();

    assert_eq!(result.fault(), Some(FaultKind::Timeout));
    assert_eq!(result.error(), Some("execution timed out after 500ms"));
    assert!(elapsed >= Duration::from_millis(450), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(700), "returned after {:?}", elapsed);
}

#[tokio::test]
async fn test_timeout_keeps_partial_log() {
    let result = execute(
        r#"
console.log('before');
for (;;) {}
"#,
        &options(200),
    )
    .await;

    assert_eq!(result.fault(), Some(FaultKind::Timeout));
    assert_eq!(result.log.len(), 1);
    assert_eq!(result.log[0].message, "before");
}

#[tokio::test]
async fn test_pending_promise_times_out() {
    let started = Instant::now();
    let result = execute("await new Promise(() => {});", &options(200)).await;

    assert_eq!(result.fault(), Some(FaultKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_busy_loop_after_await_times_out() {
    let result = execute(
        r#"
await new Promise((resolve) => setTimeout(resolve, 10));
while (true) {}
"#,
        &options(300),
    )
    .await;

    assert_eq!(result.fault(), Some(FaultKind::Timeout));
}

#[tokio::test]
async fn test_catch_cannot_swallow_timeout() {
    let result = execute(
        r#"
try {
  while (true) {}
} catch (e) {
  console.log('caught');
}
return 'escaped';
"#,
        &options(200),
    )
    .await;

    assert_eq!(result.fault(), Some(FaultKind::Timeout));
    assert!(result.log.iter().all(|entry| entry.message != "caught"));
}

#[tokio::test]
async fn test_timer_waits_count_against_the_bound() {
    let result = execute(
        "await new Promise((resolve) => setTimeout(resolve, 5_000));",
        &options(200),
    )
    .await;

    assert_eq!(result.fault(), Some(FaultKind::Timeout));
}

/* ===================== Background Work ===================== */

#[tokio::test]
async fn test_background_interval_does_not_block_completion() {
    let started = Instant::now();
    let result = execute(
        r#"
setInterval(() => console.log('tick'), 1_000);
return 'done';
"#,
        &options(5_000),
    )
    .await;

    assert_eq!(json_value(&result), json!("done"));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_abandoned_timer_output_is_not_collected() {
    let result = execute(
        r#"
setTimeout(() => console.log('too late'), 50);
console.log('now');
"#,
        &options(5_000),
    )
    .await;

    assert!(result.is_success());
    assert_eq!(result.log.len(), 1);
    assert_eq!(result.log[0].kind, LogKind::PlainLog);
    assert_eq!(result.log[0].message, "now");
}

#[tokio::test]
async fn test_short_completion_grace() {
    let opts = options(5_000).with_completion_grace_ms(10);
    let result = execute("return 7;", &opts).await;
    assert_eq!(json_value(&result), json!(7));
}
