//! Operand stack.

use alloy_primitives::U256;
use hyla_primitives::STACK_LIMIT;

use crate::VmError;

/// 256-bit word stack bounded by [`STACK_LIMIT`].
#[derive(Debug, Default)]
pub(crate) struct Stack {
    data: Vec<U256>,
}

impl Stack {
    pub(crate) fn new() -> Self {
        Self { data: Vec::with_capacity(64) }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn push(&mut self, value: U256) -> Result<(), VmError> {
        if self.data.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow(STACK_LIMIT));
        }
        self.data.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<U256, VmError> {
        self.data.pop().ok_or(VmError::StackUnderflow { have: 0, need: 1 })
    }

    /// Item `n` from the top, zero-based.
    pub(crate) fn peek(&self, n: usize) -> Result<U256, VmError> {
        let len = self.data.len();
        if n >= len {
            return Err(VmError::StackUnderflow { have: len, need: n + 1 });
        }
        Ok(self.data[len - 1 - n])
    }

    /// Push a copy of item `n`, one-based.
    pub(crate) fn dup(&mut self, n: usize) -> Result<(), VmError> {
        let value = self.peek(n - 1)?;
        self.push(value)
    }

    /// Exchange the top with item `n + 1`, one-based.
    pub(crate) fn swap(&mut self, n: usize) -> Result<(), VmError> {
        let len = self.data.len();
        if n >= len {
            return Err(VmError::StackUnderflow { have: len, need: n + 1 });
        }
        self.data.swap(len - 1, len - 1 - n);
        Ok(())
    }

    /// Check that `pops` items exist and that pushing the difference stays in bounds.
    pub(crate) fn require(&self, pops: usize, pushes: usize) -> Result<(), VmError> {
        let len = self.data.len();
        if len < pops {
            return Err(VmError::StackUnderflow { have: len, need: pops });
        }
        if len - pops + pushes > STACK_LIMIT {
            return Err(VmError::StackOverflow(STACK_LIMIT));
        }
        Ok(())
    }
}
