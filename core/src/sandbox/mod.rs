//! # Sandbox Environment Builder
//!
//! Builds the isolated evaluation context for one execution: a fresh
//! QuickJS runtime and context whose globals are seeded from
//! [`SandboxOptions`] and wired to that execution's [`DiagnosticSink`] and
//! [`CompletionSignal`].
//!
//! ## Layout
//!
//! Rust installs native functions on a private `native` object, then runs
//! `prelude.js` against it. The prelude defines the script-visible globals
//! (`console`, `require`, `process`, `Buffer`, timers) and the hidden hooks
//! the coordinator's wrapper calls (`__line__`, `__complete__`, `__fault__`).
//! Nothing is shared between two sandboxes.

pub mod buffer;
pub mod console;
pub mod host;
pub mod inspect;
pub mod path;
pub mod timers;

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::executor::CompletionSignal;
use rquickjs::{AsyncContext, AsyncRuntime, CaughtError, Ctx, Function, Object};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use console::{DiagnosticSink, LineMapping};
pub use timers::TimerRegistry;

const PRELUDE: &str = include_str!("prelude.js");

/// Name the script sees in `__filename` and `process.argv[1]`
pub const DEFAULT_FILENAME: &str = "scratchpad.js";

/* ===================== Options ===================== */

/// Everything a sandbox is built from
///
/// Built once per execution; the sandbox never reads process-wide state.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    pub cwd: PathBuf,
    pub filename: String,
    pub env: BTreeMap<String, String>,
    pub argv: Vec<String>,
    pub memory_limit_bytes: usize,
    pub max_stack_bytes: usize,
    pub inspect_depth: usize,
    pub max_log_entries: usize,
    /// Origin of `process.uptime()` / `process.hrtime()`
    pub started: Instant,
}

impl SandboxOptions {
    /// Snapshot the host environment according to `config`
    pub fn from_config(config: &Config) -> Self {
        let sandbox = &config.sandbox;
        let cwd = sandbox
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        let env = if sandbox.pass_env {
            std::env::vars().collect()
        } else {
            BTreeMap::new()
        };

        Self {
            cwd,
            filename: DEFAULT_FILENAME.to_string(),
            env,
            argv: Vec::new(),
            memory_limit_bytes: sandbox.memory_limit_bytes,
            max_stack_bytes: sandbox.max_stack_bytes,
            inspect_depth: sandbox.inspect_depth,
            max_log_entries: sandbox.max_log_entries,
            started: Instant::now(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/* ===================== Watchdog ===================== */

/// Wall-clock bound enforced through the engine's interrupt handler
///
/// Once the deadline passes, the handler asks QuickJS to abort whatever
/// bytecode is running and the watchdog stays tripped.
#[derive(Debug, Clone)]
pub struct Watchdog {
    deadline: Instant,
    tripped: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            tripped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::Release);
    }

    /// Interrupt-handler body: `true` aborts the running script
    pub fn check(&self) -> bool {
        if self.is_tripped() {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.trip();
            return true;
        }
        false
    }

    async fn arm(&self, runtime: &AsyncRuntime) {
        let watchdog = self.clone();
        runtime
            .set_interrupt_handler(Some(Box::new(move || watchdog.check())))
            .await;
    }
}

/* ===================== Sandbox ===================== */

/// One isolated evaluation context, used for exactly one execution
pub struct Sandbox {
    runtime: AsyncRuntime,
    context: AsyncContext,
    timers: TimerRegistry,
}

impl Sandbox {
    /// Build a fresh runtime and context seeded from `options`
    pub async fn build(
        options: &SandboxOptions,
        sink: &DiagnosticSink,
        completion: &CompletionSignal,
        watchdog: &Watchdog,
    ) -> rquickjs::Result<Self> {
        let runtime = AsyncRuntime::new()?;
        runtime.set_memory_limit(options.memory_limit_bytes).await;
        runtime.set_max_stack_size(options.max_stack_bytes).await;
        watchdog.arm(&runtime).await;

        let context = AsyncContext::full(&runtime).await?;
        let timers = TimerRegistry::new();

        context
            .with(|ctx| install(&ctx, options, sink, completion, &timers))
            .await?;

        tracing::debug!(cwd = %options.cwd.display(), "sandbox built");

        Ok(Self {
            runtime,
            context,
            timers,
        })
    }

    pub fn context(&self) -> &AsyncContext {
        &self.context
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Cancel outstanding timers and let their tasks unwind before the
    /// runtime is dropped
    pub async fn shutdown(self) {
        let pending = self.timers.active();
        self.timers.cancel_all();
        self.runtime.idle().await;
        tracing::debug!(abandoned_timers = pending, "sandbox shut down");
    }
}

/// Seed the context's globals
fn install<'js>(
    ctx: &Ctx<'js>,
    options: &SandboxOptions,
    sink: &DiagnosticSink,
    completion: &CompletionSignal,
    timers: &TimerRegistry,
) -> rquickjs::Result<()> {
    let native = Object::new(ctx.clone())?;

    console::install(ctx, &native, sink.clone())?;
    timers::install(ctx, &native, timers.clone(), sink.clone())?;
    buffer::install(ctx, &native)?;
    host::install(ctx, &native, options)?;

    let completion = completion.clone();
    native.set(
        "complete",
        Function::new(ctx.clone(), move || {
            completion.fire();
        })?
        .with_name("__complete__")?,
    )?;
    native.set("dirname", options.cwd.display().to_string())?;
    native.set(
        "filename",
        options.cwd.join(&options.filename).display().to_string(),
    )?;

    let function_ctor: Function = ctx.globals().get("Function")?;
    let prelude: Function = function_ctor.call(("native", PRELUDE))?;
    prelude.call::<_, ()>((native,))?;

    Ok(())
}

/// Text of a caught script error, the way the console would print it
pub fn describe_caught(err: &CaughtError<'_>, depth: usize) -> String {
    match err {
        CaughtError::Exception(exception) => inspect::display(exception.as_value(), depth),
        CaughtError::Value(value) => inspect::display(value, depth),
        CaughtError::Error(error) => error.to_string(),
    }
}
