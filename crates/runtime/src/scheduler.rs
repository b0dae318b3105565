//! Revalidation on write.
//!
//! ```text
//!  tracked write ──► property_did_change ──► RenderLoop::schedule
//!                                                  │ notify
//!                          run() ◄─────────────────┘
//!                            │ sleep(debounce)
//!                            └──► flush ──► RenderResult::rerender ...
//! ```
//!
//! Writes landing within one debounce window share a single pass.

use anyhow::Result;
use core::cell::{Cell, RefCell};
use core::time::Duration;
use log::{debug, trace};
use std::rc::{Rc, Weak};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, spawn_local};
use tokio::time::sleep;
use trellis_validator::{install_property_did_change, uninstall_property_did_change};

use crate::render::RenderResult;
use crate::runtime::Runtime;

/// Re-renders its results after tracked writes, at most once per debounce
/// window.
pub struct RenderLoop {
    results: RefCell<Vec<RenderResult>>,
    dirty: Cell<bool>,
    stopped: Cell<bool>,
    passes: Cell<usize>,
    wake: Notify,
    debounce: Duration,
    hook: ChangeHook,
    previous_hook: Option<ChangeHook>,
}

type ChangeHook = Rc<dyn Fn()>;

impl RenderLoop {
    /// A loop that becomes this thread's property-did-change hook. Dropping
    /// it puts back the hook it replaced.
    pub fn install(debounce: Duration) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = Weak::clone(weak);
            let hook: ChangeHook = Rc::new(move || {
                if let Some(render_loop) = weak.upgrade() {
                    render_loop.schedule();
                }
            });
            let previous_hook = install_property_did_change(Rc::clone(&hook));
            Self {
                results: RefCell::new(Vec::new()),
                dirty: Cell::new(false),
                stopped: Cell::new(false),
                passes: Cell::new(0),
                wake: Notify::new(),
                debounce,
                hook,
                previous_hook,
            }
        })
    }

    /// [`Self::install`] with the debounce of `runtime`'s configuration.
    pub fn for_runtime(runtime: &Runtime) -> Rc<Self> {
        Self::install(runtime.config().debounce)
    }

    /// Keep `result` up to date.
    pub fn add(&self, result: RenderResult) {
        self.results.borrow_mut().push(result);
    }

    /// Take back the results, for teardown.
    pub fn take_results(&self) -> Vec<RenderResult> {
        self.results.take()
    }

    /// Mark the loop dirty and wake [`Self::run`].
    pub fn schedule(&self) {
        if !self.dirty.replace(true) {
            trace!(target: "trellis::scheduler", "revalidation scheduled");
            self.wake.notify_one();
        }
    }

    /// Whether a write happened since the last pass.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// How many revalidation passes ran.
    #[inline]
    pub fn passes(&self) -> usize {
        self.passes.get()
    }

    /// Revalidate now if anything was written. Returns whether a pass ran.
    ///
    /// # Errors
    /// Returns the first failing result's error.
    pub fn flush(&self) -> Result<bool> {
        if !self.dirty.replace(false) {
            return Ok(false);
        }
        let results = self.results.borrow();
        debug!(target: "trellis::scheduler", "revalidating {} render results", results.len());
        for result in results.iter() {
            result.rerender()?;
        }
        self.passes.set(self.passes.get() + 1);
        Ok(true)
    }

    /// End [`Self::run`] after its current wait.
    pub fn stop(&self) {
        self.stopped.set(true);
        self.wake.notify_one();
    }

    /// Wait for writes and flush once per debounce window until stopped.
    ///
    /// # Errors
    /// Returns a failing pass's error, which ends the loop.
    pub async fn run(self: Rc<Self>) -> Result<()> {
        loop {
            self.wake.notified().await;
            if self.stopped.get() {
                return Ok(());
            }
            sleep(self.debounce).await;
            self.flush()?;
        }
    }

    /// Run the loop as a task on the current `LocalSet`.
    pub fn spawn(self: &Rc<Self>) -> JoinHandle<Result<()>> {
        spawn_local(Rc::clone(self).run())
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        let previous = self.previous_hook.take();
        if !uninstall_property_did_change(&self.hook, previous) {
            trace!(target: "trellis::scheduler", "a newer hook is installed, leaving it");
        }
    }
}
