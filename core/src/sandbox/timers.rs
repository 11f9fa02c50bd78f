//! Timer scheduling for one sandbox
//!
//! `setTimeout` / `setInterval` spawn a future on the sandbox's runtime that
//! sleeps on tokio and calls back into the script. Each timer owns a child
//! of the registry's root [`CancellationToken`], so `clearTimeout` cancels
//! one timer and tearing down the sandbox cancels all of them.

use crate::sandbox::console::DiagnosticSink;
use crate::sandbox::describe_caught;
use rquickjs::{CatchResultExt, Ctx, Function, Object};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shortest delay a timer sleeps for
const MIN_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct TimerState {
    next_id: u32,
    active: HashMap<u32, CancellationToken>,
}

#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    state: Arc<Mutex<TimerState>>,
    root: CancellationToken,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocate an id and a cancellation token for a new timer
    pub fn register(&self) -> (u32, CancellationToken) {
        let token = self.root.child_token();
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.active.insert(id, token.clone());
        (id, token)
    }

    /// Cancel one timer; unknown ids are ignored
    pub fn clear(&self, id: u32) -> bool {
        match self.lock().active.remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a timer that ran to completion
    pub fn finish(&self, id: u32) {
        self.lock().active.remove(&id);
    }

    /// Cancel every timer, including ones registered later
    pub fn cancel_all(&self) {
        self.root.cancel();
        self.lock().active.clear();
    }

    pub fn active(&self) -> usize {
        self.lock().active.len()
    }
}

/// Install `setTimer` / `clearTimer` on the prelude's native object
pub fn install<'js>(
    ctx: &Ctx<'js>,
    native: &Object<'js>,
    timers: TimerRegistry,
    sink: DiagnosticSink,
) -> rquickjs::Result<()> {
    let registry = timers.clone();
    let set_timer = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, callback: Function<'js>, delay: f64, repeat: bool| -> u32 {
            let delay = if delay.is_finite() && delay > 0.0 {
                Duration::from_millis(delay as u64).max(MIN_DELAY)
            } else {
                MIN_DELAY
            };

            let (id, token) = registry.register();
            let registry = registry.clone();
            let sink = sink.clone();
            let task_ctx = ctx.clone();

            ctx.spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }

                    if let Err(err) = callback.call::<_, ()>(()).catch(&task_ctx) {
                        sink.error(format!(
                            "Uncaught {}",
                            describe_caught(&err, sink.inspect_depth())
                        ));
                    }

                    if !repeat {
                        break;
                    }
                }
                registry.finish(id);
            });

            tracing::trace!(id, ?delay, repeat, "timer scheduled");
            id
        },
    )?
    .with_name("setTimer")?;
    native.set("setTimer", set_timer)?;

    let clear_timer = Function::new(ctx.clone(), move |id: Option<f64>| {
        if let Some(id) = id.filter(|id| id.is_finite() && *id >= 0.0) {
            timers.clear(id as u32);
        }
    })?
    .with_name("clearTimer")?;
    native.set("clearTimer", clear_timer)?;

    Ok(())
}
