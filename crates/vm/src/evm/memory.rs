//! Byte-addressed expanding memory.

use alloy_primitives::U256;

/// Word-aligned growable memory of a call frame.
#[derive(Debug, Default)]
pub(crate) struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub(crate) const fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Grow to at least `size` bytes, rounded up to a whole word.
    pub(crate) fn resize(&mut self, size: usize) {
        if size > self.data.len() {
            let words = size.div_ceil(32);
            self.data.resize(words * 32, 0);
        }
    }

    pub(crate) fn set(&mut self, offset: usize, value: &[u8]) {
        if value.is_empty() {
            return;
        }
        self.data[offset..offset + value.len()].copy_from_slice(value);
    }

    /// Copy `value` into `[offset, offset + size)`, zero-filling past its end.
    pub(crate) fn set_padded(&mut self, offset: usize, size: usize, value: &[u8]) {
        if size == 0 {
            return;
        }
        let copied = value.len().min(size);
        self.data[offset..offset + copied].copy_from_slice(&value[..copied]);
        self.data[offset + copied..offset + size].fill(0);
    }

    pub(crate) fn set_word(&mut self, offset: usize, value: U256) {
        self.set(offset, &value.to_be_bytes::<32>());
    }

    pub(crate) fn set_byte(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    pub(crate) fn word(&self, offset: usize) -> U256 {
        U256::from_be_slice(&self.data[offset..offset + 32])
    }

    pub(crate) fn slice(&self, offset: usize, size: usize) -> &[u8] {
        if size == 0 {
            return &[];
        }
        &self.data[offset..offset + size]
    }
}

/// Bytes of `data` starting at `offset`, zero-padded to `size`.
pub(crate) fn padded_slice(data: &[u8], offset: U256, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    if offset < U256::from(data.len()) {
        let start = offset.to::<usize>();
        let end = data.len().min(start.saturating_add(size));
        out[..end - start].copy_from_slice(&data[start..end]);
    }
    out
}
