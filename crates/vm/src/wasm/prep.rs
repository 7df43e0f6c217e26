//! Preprocessing and caching of Wasm modules.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy_primitives::{Address, B256};
use parity_wasm::elements::{self, Module, Section};
use parking_lot::Mutex;
use pwasm_utils::{
    rules::{InstructionType, Metering, Set},
    stack_height,
};
use thiserror::Error;
use tracing::trace;

use super::WasmConfig;
use crate::VmError;

const GAS_MODULE_NAME: &str = "env";

/// Per-instruction costs injected into every module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeCosts {
    /// Default instruction cost.
    pub regular: u32,
    /// Division multiplier.
    pub div: u32,
    /// Multiplication multiplier.
    pub mul: u32,
    /// Load and store multiplier.
    pub mem: u32,
    /// Cost per grown 64 KiB page.
    pub grow_mem: u32,
}

impl OpcodeCosts {
    fn to_set(self) -> Set {
        let mut meterings = BTreeMap::new();
        meterings.insert(InstructionType::Load, Metering::Fixed(self.mem));
        meterings.insert(InstructionType::Store, Metering::Fixed(self.mem));
        meterings.insert(InstructionType::Div, Metering::Fixed(self.div));
        meterings.insert(InstructionType::Mul, Metering::Fixed(self.mul));
        Set::new(self.regular, meterings).with_grow_cost(self.grow_mem).with_forbidden_floats()
    }
}

impl Default for OpcodeCosts {
    fn default() -> Self {
        Self { regular: 1, div: 16, mul: 4, mem: 2, grow_mem: 8192 }
    }
}

/// Reasons a module is rejected before execution.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreprocessingError {
    /// Bytes are not a Wasm module.
    #[error("deserialization error: {0}")]
    Deserialize(String),
    /// Module uses instructions the gas rules forbid, such as floats.
    #[error("operation forbidden by gas rules")]
    OperationForbiddenByGasRules,
    /// Stack height instrumentation failed.
    #[error("stack limiter error")]
    StackLimiter,
    /// Module declares no memory.
    #[error("memory section should exist")]
    MissingMemorySection,
}

impl From<elements::Error> for PreprocessingError {
    fn from(error: elements::Error) -> Self {
        Self::Deserialize(error.to_string())
    }
}

impl From<PreprocessingError> for VmError {
    fn from(error: PreprocessingError) -> Self {
        Self::WasmModule(error.to_string())
    }
}

fn has_memory(module: &Module) -> bool {
    module.sections().iter().any(|section| matches!(section, Section::Memory(m) if !m.entries().is_empty()))
}

/// Validate a module and instrument it with gas metering and a stack limit.
///
/// The module's memory becomes an `env.memory` import capped at the configured page
/// count, and every block is charged through the `env.gas` host function.
pub fn preprocess(config: &WasmConfig, bytes: &[u8]) -> Result<Module, PreprocessingError> {
    let module = parity_wasm::deserialize_buffer::<Module>(bytes)?;
    if !has_memory(&module) {
        return Err(PreprocessingError::MissingMemorySection);
    }

    let module = pwasm_utils::externalize_mem(module, None, config.max_memory);
    let module = pwasm_utils::inject_gas_counter(module, &config.opcode_costs.to_set(), GAS_MODULE_NAME)
        .map_err(|_| PreprocessingError::OperationForbiddenByGasRules)?;
    stack_height::inject_limiter(module, config.max_stack_height).map_err(|_| PreprocessingError::StackLimiter)
}

/// Prepared modules keyed by contract, shared between machines.
///
/// An entry is reused only while the contract's code hash is unchanged.
#[derive(Clone, Debug, Default)]
pub struct ModuleCache {
    inner: Arc<Mutex<HashMap<Address, (B256, Arc<Module>)>>>,
}

impl ModuleCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepared module for `address`, preprocessing `code` on a miss.
    pub(crate) fn get_or_prepare(
        &self,
        address: Address,
        code_hash: B256,
        code: &[u8],
        config: &WasmConfig,
    ) -> Result<Arc<Module>, PreprocessingError> {
        if let Some((hash, module)) = self.inner.lock().get(&address)
            && *hash == code_hash
        {
            return Ok(Arc::clone(module));
        }
        let module = Arc::new(preprocess(config, code)?);
        trace!(%address, "prepared wasm module");
        self.inner.lock().insert(address, (code_hash, Arc::clone(&module)));
        Ok(module)
    }

    /// Drop the prepared module of `address`.
    pub fn evict(&self, address: &Address) {
        self.inner.lock().remove(address);
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(wat: &str) -> Vec<u8> {
        wat::parse_str(wat).unwrap()
    }

    #[test]
    fn rejects_garbage() {
        let err = preprocess(&WasmConfig::default(), &[0x00, 0x61, 0x73, 0x6d, 0x07]).unwrap_err();
        assert!(matches!(err, PreprocessingError::Deserialize(_)));
    }

    #[test]
    fn requires_memory() {
        let bytes = module(r#"(module (func (export "main")))"#);
        assert!(matches!(
            preprocess(&WasmConfig::default(), &bytes),
            Err(PreprocessingError::MissingMemorySection)
        ));
    }

    #[test]
    fn forbids_floats() {
        let bytes = module(
            r#"(module (memory 1)
                (func (export "main") (drop (f32.add (f32.const 1) (f32.const 2)))))"#,
        );
        assert!(matches!(
            preprocess(&WasmConfig::default(), &bytes),
            Err(PreprocessingError::OperationForbiddenByGasRules)
        ));
    }

    #[test]
    fn injects_gas_import() {
        let bytes = module(r#"(module (memory 1) (func (export "main") (nop)))"#);
        let prepared = preprocess(&WasmConfig::default(), &bytes).unwrap();
        let imports = prepared.import_section().map(|s| s.entries().to_vec()).unwrap_or_default();
        assert!(imports.iter().any(|e| e.module() == "env" && e.field() == "gas"));
        assert!(imports.iter().any(|e| e.module() == "env" && e.field() == "memory"));
    }

    #[test]
    fn cache_tracks_code_hash() {
        let cache = ModuleCache::new();
        let config = WasmConfig::default();
        let bytes = module(r#"(module (memory 1) (func (export "main")))"#);
        let address = Address::repeat_byte(1);

        let first = cache.get_or_prepare(address, B256::repeat_byte(1), &bytes, &config).unwrap();
        let again = cache.get_or_prepare(address, B256::repeat_byte(1), &bytes, &config).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let changed = cache.get_or_prepare(address, B256::repeat_byte(2), &bytes, &config).unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_eq!(cache.len(), 1);

        cache.evict(&address);
        assert!(cache.is_empty());
    }
}
