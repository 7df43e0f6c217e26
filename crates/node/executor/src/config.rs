//! Execution configuration.

use hyla_domain::MAX_TX_BYTES;
use hyla_vm::VmConfig;

/// Execution configuration.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Machine configuration shared by every block.
    pub vm: VmConfig,
    /// Relaxes static checks for local test networks.
    pub test_mode: bool,
    /// Largest accepted encoded transaction.
    pub max_tx_bytes: usize,
    /// Build balance records while processing.
    pub save_balance_record: bool,
    /// Credit block fees to the foundation contract.
    pub process_fee_handle: bool,
    /// Verification workers; zero picks one per four CPUs.
    pub verify_workers: usize,
}

impl ExecutorConfig {
    /// Default Wasm gas rate.
    pub const DEFAULT_WASM_GAS_RATE: u64 = 10_000;

    /// Create a config with the given Wasm gas rate.
    pub fn new(wasm_gas_rate: u64) -> Self {
        Self {
            vm: VmConfig::with_wasm_gas_rate(wasm_gas_rate),
            test_mode: false,
            max_tx_bytes: MAX_TX_BYTES,
            save_balance_record: false,
            process_fee_handle: true,
            verify_workers: 0,
        }
    }

    /// Set test mode.
    #[must_use]
    pub const fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Set the transaction size limit.
    #[must_use]
    pub const fn with_max_tx_bytes(mut self, max_tx_bytes: usize) -> Self {
        self.max_tx_bytes = max_tx_bytes;
        self
    }

    /// Enable or disable balance records.
    #[must_use]
    pub const fn with_balance_records(mut self, enabled: bool) -> Self {
        self.save_balance_record = enabled;
        self
    }

    /// Enable or disable fee distribution.
    #[must_use]
    pub const fn with_fee_handle(mut self, enabled: bool) -> Self {
        self.process_fee_handle = enabled;
        self
    }

    /// Set the number of verification workers.
    #[must_use]
    pub const fn with_verify_workers(mut self, workers: usize) -> Self {
        self.verify_workers = workers;
        self
    }

    /// Workers used to verify a block of `txs` transactions.
    pub fn workers_for(&self, txs: usize) -> usize {
        let workers = if self.verify_workers == 0 {
            let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            cpus.div_ceil(4)
        } else {
            self.verify_workers
        };
        workers.clamp(1, txs.max(1))
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WASM_GAS_RATE)
    }
}
