//! Sandbox environment tests
//!
//! Each test builds a sandbox directly, evaluates plain (unwrapped) code in
//! it and inspects the globals, the sink and the completion signal.

use super::*;
use crate::types::{Line, LogKind};
use maplit::btreemap;
use rquickjs::{async_with, CatchResultExt, Coerced, Promise};

/* ===================== Helpers ===================== */

struct Harness {
    sandbox: Sandbox,
    sink: DiagnosticSink,
    completion: CompletionSignal,
    watchdog: Watchdog,
}

async fn build_with(options: SandboxOptions, timeout: Duration) -> Harness {
    let sink = DiagnosticSink::new(
        options.max_log_entries,
        options.inspect_depth,
        LineMapping::new(0, ""),
    );
    let completion = CompletionSignal::new();
    let watchdog = Watchdog::new(timeout);
    let sandbox = Sandbox::build(&options, &sink, &completion, &watchdog)
        .await
        .expect("sandbox should build");

    Harness {
        sandbox,
        sink,
        completion,
        watchdog,
    }
}

async fn build(options: SandboxOptions) -> Harness {
    build_with(options, Duration::from_secs(5)).await
}

fn test_options() -> SandboxOptions {
    SandboxOptions::default()
        .with_env(btreemap! {
            "GREETING".to_string() => "hello".to_string(),
        })
        .with_argv(vec!["--flag".to_string()])
}

/// Evaluate `code` and coerce the result to a string; errors come back as text
async fn eval(sandbox: &Sandbox, code: &str) -> Result<String, String> {
    let code = code.to_string();
    sandbox
        .context()
        .with(|ctx| {
            ctx.eval::<Coerced<String>, _>(code)
                .catch(&ctx)
                .map(|value| value.0)
                .map_err(|err| describe_caught(&err, 3))
        })
        .await
}

/* ===================== Globals ===================== */

#[tokio::test]
async fn test_hidden_hooks_are_not_enumerable() {
    let h = build(test_options()).await;

    assert_eq!(
        eval(&h.sandbox, "Object.keys(globalThis).filter(k => k.startsWith('__') && k.endsWith('__')).join(',')")
            .await
            .unwrap(),
        ""
    );
    assert_eq!(
        eval(&h.sandbox, "[typeof __line__, typeof __complete__, typeof __fault__].join()")
            .await
            .unwrap(),
        "function,function,function"
    );

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_expected_globals_exist() {
    let h = build(test_options()).await;

    let names = [
        "console",
        "require",
        "process",
        "Buffer",
        "setTimeout",
        "clearTimeout",
        "setInterval",
        "clearInterval",
        "global",
        "__dirname",
        "__filename",
    ];
    for name in names {
        assert_eq!(
            eval(&h.sandbox, &format!("typeof {} !== 'undefined'", name))
                .await
                .unwrap(),
            "true",
            "missing global {}",
            name
        );
    }
    assert_eq!(eval(&h.sandbox, "global === globalThis").await.unwrap(), "true");

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_sandboxes_do_not_share_globals() {
    let a = build(test_options()).await;
    let b = build(test_options()).await;

    eval(&a.sandbox, "globalThis.leak = 42; process.env.GREETING = 'changed'")
        .await
        .unwrap();

    assert_eq!(eval(&a.sandbox, "leak").await.unwrap(), "42");
    assert_eq!(eval(&b.sandbox, "typeof leak").await.unwrap(), "undefined");
    assert_eq!(eval(&b.sandbox, "process.env.GREETING").await.unwrap(), "hello");

    a.sandbox.shutdown().await;
    b.sandbox.shutdown().await;
}

/* ===================== Console ===================== */

#[tokio::test]
async fn test_console_routes_to_sink() {
    let h = build(test_options()).await;

    eval(
        &h.sandbox,
        r#"
console.log('a', { b: 1 }, __line__(4));
console.warn('careful', __line__(5));
console.error(new Error('bad'), __line__(6));
console.info('untagged');
"#,
    )
    .await
    .unwrap();

    let entries = h.sink.entries();
    assert_eq!(entries.len(), 4);

    assert_eq!(entries[0].kind, LogKind::PlainLog);
    assert_eq!(entries[0].message, "a { b: 1 }");
    assert_eq!(entries[0].line, Line::Known(4));

    assert_eq!(entries[1].kind, LogKind::Warning);
    assert_eq!(entries[1].line, Line::Known(5));

    assert_eq!(entries[2].kind, LogKind::Error);
    assert!(entries[2].message.starts_with("Error: bad"));

    assert_eq!(entries[3].kind, LogKind::Info);
    assert_eq!(entries[3].message, "untagged");

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_user_object_is_never_a_line_tag() {
    let h = build(test_options()).await;

    // Looks like a tag by shape but lacks the private symbol
    eval(&h.sandbox, "console.log('x', { line: 9 }, 9)").await.unwrap();

    let entries = h.sink.entries();
    assert_eq!(entries[0].message, "x { line: 9 } 9");

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_fault_hook_records_error_entry() {
    let h = build(test_options()).await;

    eval(&h.sandbox, "__fault__(new TypeError('nope'))").await.unwrap();

    let entries = h.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, LogKind::Error);
    assert_eq!(entries[0].line, Line::Unknown);
    assert!(entries[0].message.contains("TypeError: nope"));

    h.sandbox.shutdown().await;
}

/* ===================== Completion ===================== */

#[tokio::test]
async fn test_complete_hook_fires_signal_once() {
    let h = build(test_options()).await;
    assert!(!h.completion.is_fired());

    eval(&h.sandbox, "__complete__(); __complete__(); 'ok'").await.unwrap();

    assert!(h.completion.is_fired());
    assert!(!h.completion.fire());

    h.sandbox.shutdown().await;
}

/* ===================== Watchdog ===================== */

#[tokio::test]
async fn test_watchdog_interrupts_busy_loop() {
    let h = build_with(test_options(), Duration::from_millis(50)).await;

    let started = Instant::now();
    let result = eval(&h.sandbox, "while (true) {}").await;

    assert!(result.is_err());
    assert!(h.watchdog.is_tripped());
    assert!(started.elapsed() < Duration::from_secs(2));

    h.sandbox.shutdown().await;
}

#[test]
fn test_watchdog_check() {
    let watchdog = Watchdog::new(Duration::from_secs(60));
    assert!(!watchdog.check());
    assert!(watchdog.remaining() > Duration::from_secs(59));

    let expired = Watchdog::new(Duration::ZERO);
    assert!(expired.check());
    assert!(expired.is_tripped());
    assert_eq!(expired.remaining(), Duration::ZERO);
}

/* ===================== require ===================== */

#[tokio::test]
async fn test_require_builtins() {
    let h = build(test_options()).await;

    assert_eq!(
        eval(&h.sandbox, "require('path').join('a', 'b', '../c')").await.unwrap(),
        "a/c"
    );
    assert_eq!(
        eval(&h.sandbox, "require('node:path') === require('path')").await.unwrap(),
        "true"
    );
    assert_eq!(
        eval(&h.sandbox, "typeof require('os').platform()").await.unwrap(),
        "string"
    );
    assert_eq!(
        eval(&h.sandbox, "require('util').format('%s=%d', 'x', 5)").await.unwrap(),
        "x=5"
    );
    assert_eq!(
        eval(&h.sandbox, "require('util').inspect({ a: { b: { c: { d: 1 } } } }, { depth: 0 })")
            .await
            .unwrap(),
        "{ a: [Object] }"
    );

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_require_unknown_module_throws() {
    let h = build(test_options()).await;

    let err = eval(&h.sandbox, "require('left-pad')").await.unwrap_err();
    assert!(err.contains("Cannot find module 'left-pad'"), "got {}", err);

    assert_eq!(
        eval(
            &h.sandbox,
            "try { require('left-pad') } catch (e) { e.code }"
        )
        .await
        .unwrap(),
        "MODULE_NOT_FOUND"
    );

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_crypto_module() {
    let h = build(test_options()).await;

    assert_eq!(
        eval(
            &h.sandbox,
            "require('crypto').createHash('sha256').update('abc').digest('hex')"
        )
        .await
        .unwrap(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(
        eval(&h.sandbox, "require('crypto').randomBytes(16).length").await.unwrap(),
        "16"
    );
    assert_eq!(
        eval(
            &h.sandbox,
            "/^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$/.test(require('crypto').randomUUID())"
        )
        .await
        .unwrap(),
        "true"
    );

    let err = eval(&h.sandbox, "require('crypto').createHash('whirlpool')")
        .await
        .unwrap_err();
    assert!(err.contains("whirlpool"), "got {}", err);

    h.sandbox.shutdown().await;
}

/* ===================== process / fs ===================== */

#[tokio::test]
async fn test_process_reflects_options() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_path_buf();
    let h = build(test_options().with_cwd(cwd.clone())).await;

    assert_eq!(eval(&h.sandbox, "process.env.GREETING").await.unwrap(), "hello");
    assert_eq!(eval(&h.sandbox, "Object.keys(process.env).length").await.unwrap(), "1");
    assert_eq!(eval(&h.sandbox, "process.argv[2]").await.unwrap(), "--flag");
    assert_eq!(
        eval(&h.sandbox, "process.cwd()").await.unwrap(),
        cwd.display().to_string()
    );
    assert_eq!(
        eval(&h.sandbox, "__filename").await.unwrap(),
        cwd.join(DEFAULT_FILENAME).display().to_string()
    );
    assert_eq!(
        eval(&h.sandbox, "process.hrtime().length").await.unwrap(),
        "2"
    );

    let err = eval(&h.sandbox, "process.exit(0)").await.unwrap_err();
    assert!(err.contains("not supported"), "got {}", err);

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_fs_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let h = build(test_options().with_cwd(dir.path().to_path_buf())).await;

    eval(
        &h.sandbox,
        r#"
const fs = require('fs');
fs.writeFileSync('notes.txt', 'first line');
"#,
    )
    .await
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(),
        "first line"
    );
    assert_eq!(
        eval(&h.sandbox, "require('fs').readFileSync(__dirname + '/notes.txt', 'utf8')")
            .await
            .unwrap(),
        "first line"
    );
    assert_eq!(
        eval(&h.sandbox, "require('fs').readdirSync('.').join()").await.unwrap(),
        "notes.txt"
    );
    assert_eq!(
        eval(&h.sandbox, "require('fs').existsSync('missing.txt')").await.unwrap(),
        "false"
    );

    let err = eval(&h.sandbox, "require('fs').readFileSync('missing.txt', 'utf8')")
        .await
        .unwrap_err();
    assert!(err.contains("ENOENT"), "got {}", err);

    h.sandbox.shutdown().await;
}

/* ===================== Buffer ===================== */

#[tokio::test]
async fn test_buffer_encodings() {
    let h = build(test_options()).await;

    let cases = [
        ("Buffer.from('hello').toString('hex')", "68656c6c6f"),
        ("Buffer.from('aGk=', 'base64').toString()", "hi"),
        ("Buffer.from('68 69', 'hex').length", "1"),
        ("Buffer.from([104, 105]).toString('utf8')", "hi"),
        ("Buffer.concat([Buffer.from('a'), Buffer.from('b')]).toString()", "ab"),
        ("Buffer.alloc(3, 'ab').toString()", "aba"),
        ("Buffer.byteLength('héllo')", "6"),
        ("Buffer.isBuffer(Buffer.alloc(1))", "true"),
        ("Buffer.isBuffer(new Uint8Array(1))", "false"),
        ("JSON.stringify(Buffer.from('hi'))", r#"{"type":"Buffer","data":[104,105]}"#),
        ("Buffer.isEncoding('utf16le')", "false"),
    ];
    for (code, expected) in cases {
        assert_eq!(eval(&h.sandbox, code).await.unwrap(), expected, "{}", code);
    }

    h.sandbox.shutdown().await;
}

/* ===================== Timers ===================== */

#[tokio::test]
async fn test_timers_run_in_order() {
    let h = build(test_options()).await;

    let order: String = async_with!(h.sandbox.context() => |ctx| {
        let promise: Promise = ctx
            .eval(
                r#"
new Promise((resolve) => {
  const seen = [];
  setTimeout(() => seen.push('late'), 30);
  setTimeout(() => seen.push('early'), 5);
  const cancelled = setTimeout(() => seen.push('never'), 10);
  clearTimeout(cancelled);
  setTimeout(() => resolve(seen.join(',')), 60);
});
"#,
            )
            .unwrap();
        promise.into_future::<String>().await.unwrap()
    })
    .await;

    assert_eq!(order, "early,late");
    assert_eq!(h.sandbox.timers().active(), 0);

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_throwing_timer_callback_is_logged() {
    let h = build(test_options()).await;

    let done: bool = async_with!(h.sandbox.context() => |ctx| {
        let promise: Promise = ctx
            .eval(
                r#"
new Promise((resolve) => {
  setTimeout(() => { throw new Error('from timer'); }, 5);
  setTimeout(() => resolve(true), 30);
});
"#,
            )
            .unwrap();
        promise.into_future::<bool>().await.unwrap()
    })
    .await;

    assert!(done);
    let entries = h.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, LogKind::Error);
    assert!(entries[0].message.contains("from timer"));

    h.sandbox.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_abandons_intervals() {
    let h = build(test_options()).await;

    eval(&h.sandbox, "setInterval(() => console.log('tick'), 5); 'scheduled'")
        .await
        .unwrap();
    assert_eq!(h.sandbox.timers().active(), 1);

    let started = Instant::now();
    h.sandbox.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
}
