//! Walks an updating program.

use anyhow::{Result, anyhow};
use log::{trace, warn};
use std::rc::Rc;

use super::{TryBlock, UpdatingList, UpdatingOpcode};
use crate::environment::Environment;

struct Frame {
    ops: UpdatingList,
    index: usize,
    handler: Option<Rc<TryBlock>>,
}

impl Frame {
    fn next_statement(&mut self) -> Option<Rc<dyn UpdatingOpcode>> {
        let op = self.ops.borrow().get(self.index).cloned()?;
        self.index += 1;
        Some(op)
    }
}

/// Runs updating opcodes, one frame per block being revalidated.
pub struct UpdatingVm {
    env: Rc<Environment>,
    always_revalidate: bool,
    frames: Vec<Frame>,
}

impl UpdatingVm {
    /// A VM patching the DOM of `env`.
    pub const fn new(env: Rc<Environment>, always_revalidate: bool) -> Self {
        Self {
            env,
            always_revalidate,
            frames: Vec::new(),
        }
    }

    /// The environment.
    #[inline]
    pub const fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    /// Whether cache-group guards are ignored.
    #[inline]
    pub const fn always_revalidate(&self) -> bool {
        self.always_revalidate
    }

    /// Revalidate `ops`, with `handler` catching what they throw.
    ///
    /// # Errors
    /// Returns a failure no enclosing [`TryBlock`] could recover from.
    pub fn execute(&mut self, ops: UpdatingList, handler: Option<Rc<TryBlock>>) -> Result<()> {
        let base = self.frames.len();
        self.try_block(ops, handler);
        while self.frames.len() > base {
            let next = self.frames.last_mut().and_then(Frame::next_statement);
            let Some(op) = next else {
                self.frames.pop();
                continue;
            };
            if let Err(error) = op.evaluate(self) {
                self.recover(base, error)?;
            }
        }
        Ok(())
    }

    /// Descend into a block's children.
    pub fn try_block(&mut self, ops: UpdatingList, handler: Option<Rc<TryBlock>>) {
        self.frames.push(Frame {
            ops,
            index: 0,
            handler,
        });
    }

    /// Skip the next `count` opcodes of the current block.
    pub fn skip(&mut self, count: usize) {
        if let Some(frame) = self.frames.last_mut() {
            trace!(target: "trellis::updating", "skipping {count} opcodes");
            frame.index += count;
        }
    }

    /// Abandon the current block and have its handler render it again.
    ///
    /// # Errors
    /// Returns an error when the block has no handler, or the re-render's
    /// failure.
    pub fn throw(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| anyhow!("throw outside a block"))?;
        let handler = frame
            .handler
            .ok_or_else(|| anyhow!("a guard failed outside a try block"))?;
        handler.handle_exception()
    }

    fn recover(&mut self, base: usize, error: anyhow::Error) -> Result<()> {
        let handled = self.frames[base..]
            .iter()
            .rposition(|frame| frame.handler.is_some())
            .map(|position| base + position);
        let Some(position) = handled else {
            return Err(error);
        };
        warn!(target: "trellis::updating", "re-rendering a block after: {error:#}");
        self.frames.truncate(position + 1);
        self.throw()
    }
}
