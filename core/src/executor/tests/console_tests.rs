//! Line attribution and formatting of captured console output

use super::helpers::{log_of, options, run};
use crate::executor::execute;
use crate::types::{Line, LogKind};

/* ===================== Tagged Lines ===================== */

#[tokio::test]
async fn test_each_method_maps_to_its_kind() {
    let result = run(
        r#"console.log('plain');
console.info('info');
console.warn('warning');
console.error('error');"#,
    )
    .await;

    assert_eq!(
        log_of(&result),
        vec![
            (LogKind::PlainLog, "plain".to_string(), Line::Known(1)),
            (LogKind::Info, "info".to_string(), Line::Known(2)),
            (LogKind::Warning, "warning".to_string(), Line::Known(3)),
            (LogKind::Error, "error".to_string(), Line::Known(4)),
        ]
    );
}

#[tokio::test]
async fn test_multiline_call_reports_first_line() {
    let result = run(
        r#"
console.log(
  'spread',
  'over',
  'lines',
);
"#,
    )
    .await;

    assert_eq!(
        log_of(&result),
        vec![(LogKind::PlainLog, "spread over lines".to_string(), Line::Known(2))]
    );
}

#[tokio::test]
async fn test_calls_inside_loops_and_callbacks() {
    let result = run(
        r#"
for (let i = 0; i < 2; i++) {
  console.log('loop', i);
}
[10].forEach((n) => {
  console.warn('each', n);
});
"#,
    )
    .await;

    assert_eq!(
        log_of(&result),
        vec![
            (LogKind::PlainLog, "loop 0".to_string(), Line::Known(3)),
            (LogKind::PlainLog, "loop 1".to_string(), Line::Known(3)),
            (LogKind::Warning, "each 10".to_string(), Line::Known(6)),
        ]
    );
}

#[tokio::test]
async fn test_empty_call_logs_empty_message() {
    let result = run("console.log();").await;
    assert_eq!(
        log_of(&result),
        vec![(LogKind::PlainLog, String::new(), Line::Known(1))]
    );
}

#[tokio::test]
async fn test_logs_from_timer_callbacks_keep_their_lines() {
    let result = run(
        r#"
await new Promise((resolve) => {
  setTimeout(() => {
    console.info('fired');
    resolve();
  }, 10);
});
"#,
    )
    .await;

    assert_eq!(
        log_of(&result),
        vec![(LogKind::Info, "fired".to_string(), Line::Known(4))]
    );
}

/* ===================== Stack Fallback ===================== */

#[tokio::test]
async fn test_aliased_console_uses_stack_fallback() {
    let result = run(
        r#"const log = console.log;
log('aliased');"#,
    )
    .await;

    assert_eq!(
        log_of(&result),
        vec![(LogKind::PlainLog, "aliased".to_string(), Line::Known(2))]
    );
}

#[tokio::test]
async fn test_computed_access_is_not_tagged_but_still_logged() {
    let result = run("console['log']('computed');").await;

    assert!(result.is_success());
    assert_eq!(result.log.len(), 1);
    assert_eq!(result.log[0].message, "computed");
    assert_eq!(result.log[0].line, Line::Known(1));
}

/* ===================== Formatting ===================== */

#[tokio::test]
async fn test_argument_rendering() {
    let result = run(
        r#"
console.log('str', 42, true, null, undefined);
console.log({ a: 1, b: 'two' });
console.log([1, [2, [3, [4, [5]]]]]);
console.log({ l1: { l2: { l3: { l4: { l5: 'deep' } } } } });
console.log('%s is %d', 'x', 7);
console.log('%d%% done', 50);
console.log('100%%');
"#,
    )
    .await;

    let messages: Vec<String> = result.log.iter().map(|e| e.message.clone()).collect();
    assert_eq!(
        messages,
        vec![
            "str 42 true null undefined",
            "{ a: 1, b: 'two' }",
            "[ 1, [ 2, [ 3, [ 4, [Array] ] ] ] ]",
            "{ l1: { l2: { l3: { l4: [Object] } } } }",
            "%s is %d x 7",
            "%d%% done 50",
            "100%%",
        ]
    );
}

#[tokio::test]
async fn test_util_format_stays_available_explicitly() {
    let result = run("console.log(require('util').format('%s is %d', 'x', 7));").await;
    assert_eq!(result.log[0].message, "x is 7");
}

#[tokio::test]
async fn test_cyclic_argument_is_marked() {
    let result = run("const a = { name: 'a' }; a.self = a; console.log('cycle', a);").await;
    assert_eq!(
        result.log[0].message,
        "cycle <ref *1> { name: 'a', self: [Circular *1] }"
    );
}

#[tokio::test]
async fn test_line_tag_symbol_is_not_forgeable() {
    let result = run(
        r#"
const fake = { [Symbol('line')]: 99 };
console.log('fake', fake);
"#,
    )
    .await;

    assert_eq!(result.log.len(), 1);
    assert_eq!(result.log[0].line, Line::Known(3));
    assert!(result.log[0].message.starts_with("fake {"));
}

/* ===================== Cap ===================== */

#[tokio::test]
async fn test_log_cap_appends_truncation_notice() {
    let mut opts = options(5_000);
    opts.sandbox.max_log_entries = 5;

    let result = execute("for (let i = 0; i < 20; i++) console.log(i);", &opts).await;

    assert!(result.is_success());
    assert_eq!(result.log.len(), 6);
    assert_eq!(result.log[4].message, "4");

    let notice = &result.log[5];
    assert_eq!(notice.kind, LogKind::Info);
    assert_eq!(notice.line, Line::Unknown);
    assert_eq!(notice.message, "... output truncated (5 entry limit)");
}
