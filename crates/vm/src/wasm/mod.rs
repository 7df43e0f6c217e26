//! WebAssembly machine.
//!
//! Contracts are prepared once per code hash, then instantiated on `wasmi` for every
//! activation. A call runs the `main` export; a creation runs the optional `init`
//! export with the constructor arguments as input and installs the module itself.

use alloy_primitives::Bytes;

mod host;

mod prep;
pub use prep::{ModuleCache, OpcodeCosts, PreprocessingError, preprocess};

/// Bytes of the argument-length trailer of creation data.
const ARGS_LEN_SIZE: usize = 4;

/// Limits and prices of the Wasm machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WasmConfig {
    /// Wasm gas units per unit of transaction gas.
    pub gas_rate: u64,
    /// Maximum memory in 64 KiB pages.
    pub max_memory: u32,
    /// Maximum stack height in values.
    pub max_stack_height: u32,
    /// Injected instruction costs.
    pub opcode_costs: OpcodeCosts,
}

impl Default for WasmConfig {
    fn default() -> Self {
        Self { gas_rate: 1, max_memory: 64, max_stack_height: 64 * 1024, opcode_costs: OpcodeCosts::default() }
    }
}

/// Wasm machine attached to a [`Machine`](crate::Machine).
#[derive(Clone, Debug, Default)]
pub struct WasmVm {
    config: WasmConfig,
    modules: ModuleCache,
}

impl WasmVm {
    /// Wasm machine with `config`, preparing modules into `modules`.
    pub const fn new(config: WasmConfig, modules: ModuleCache) -> Self {
        Self { config, modules }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &WasmConfig {
        &self.config
    }

    /// Wasm gas units per unit of transaction gas, at least one.
    pub fn gas_rate(&self) -> u64 {
        self.config.gas_rate.max(1)
    }

    /// Prepared module cache.
    pub const fn modules(&self) -> &ModuleCache {
        &self.modules
    }
}

/// Creation data for a Wasm contract: the module, the `init` arguments, and the
/// argument length as a big-endian `u32`.
pub fn encode_create_data(module: &[u8], args: &[u8]) -> Bytes {
    let mut data = Vec::with_capacity(module.len() + args.len() + ARGS_LEN_SIZE);
    data.extend_from_slice(module);
    data.extend_from_slice(args);
    data.extend_from_slice(&(args.len() as u32).to_be_bytes());
    data.into()
}

/// Split creation data into the module and the `init` arguments.
pub(crate) fn split_init_args(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let body_len = data.len().checked_sub(ARGS_LEN_SIZE)?;
    let (body, trailer) = data.split_at(body_len);
    let args_len = u32::from_be_bytes(trailer.try_into().ok()?) as usize;
    let module_len = body_len.checked_sub(args_len)?;
    Some(body.split_at(module_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_data_trailer() {
        let data = encode_create_data(b"\0asm-module", b"args");
        let (module, args) = split_init_args(&data).unwrap();
        assert_eq!(module, b"\0asm-module");
        assert_eq!(args, b"args");

        let data = encode_create_data(b"\0asm", b"");
        assert_eq!(split_init_args(&data), Some((&b"\0asm"[..], &b""[..])));
    }

    #[test]
    fn malformed_trailer() {
        assert!(split_init_args(&[0, 0]).is_none());
        assert!(split_init_args(&[1, 0, 0, 0, 9]).is_none());
    }

    #[test]
    fn zero_rate_is_clamped() {
        let vm = WasmVm::new(WasmConfig { gas_rate: 0, ..Default::default() }, ModuleCache::new());
        assert_eq!(vm.gas_rate(), 1);
    }
}
