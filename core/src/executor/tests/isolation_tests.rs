//! Independence of executions

use super::helpers::{json_value, log_of, run};
use crate::types::{Line, LogKind};
use serde_json::json;

#[tokio::test]
async fn test_globals_do_not_leak_between_runs() {
    let source = r#"
globalThis.counter = (globalThis.counter || 0) + 1;
return counter;
"#;

    assert_eq!(json_value(&run(source).await), json!(1));
    assert_eq!(json_value(&run(source).await), json!(1));
}

#[tokio::test]
async fn test_prototype_pollution_does_not_leak() {
    let first = run("Array.prototype.polluted = true; return [].polluted;").await;
    assert_eq!(json_value(&first), json!(true));

    let second = run("return [].polluted === undefined;").await;
    assert_eq!(json_value(&second), json!(true));
}

#[tokio::test]
async fn test_concurrent_executions_keep_separate_logs() {
    let slow = r#"
console.log('slow start');
await new Promise((resolve) => setTimeout(resolve, 50));
console.log('slow end');
return 'slow';
"#;
    let fast = r#"
console.log('fast');
await new Promise((resolve) => setTimeout(resolve, 5));
return 'fast';
"#;

    let (slow_result, fast_result) = tokio::join!(run(slow), run(fast));

    assert_eq!(json_value(&slow_result), json!("slow"));
    assert_eq!(
        log_of(&slow_result),
        vec![
            (LogKind::PlainLog, "slow start".to_string(), Line::Known(2)),
            (LogKind::PlainLog, "slow end".to_string(), Line::Known(4)),
        ]
    );

    assert_eq!(json_value(&fast_result), json!("fast"));
    assert_eq!(
        log_of(&fast_result),
        vec![(LogKind::PlainLog, "fast".to_string(), Line::Known(2))]
    );
}

#[tokio::test]
async fn test_failure_in_one_run_does_not_affect_another() {
    let (failed, ok) = tokio::join!(run("throw new Error('first')"), run("return 'second';"));

    assert_eq!(failed.error(), Some("first"));
    assert_eq!(json_value(&ok), json!("second"));
    assert!(ok.log.is_empty());
}
