//! The code-dispatching machine both VMs execute through.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use hyla_domain::{AddressType, BalanceRecord, RecordKind};
use hyla_primitives::{
    CALL_CREATE_DEPTH, CREATE_DATA_GAS, KECCAK256_EMPTY, MAX_CODE_SIZE, create2_address, create_address,
    is_wasm_code,
};
use hyla_state::{SnapshotId, StateError, WorldState};
use tracing::{debug, trace};

use crate::{
    BlockContext, Message, VmError,
    evm::{GasTable, Precompile, StackVm},
    frame::Frame,
    wasm::{ModuleCache, WasmConfig, WasmVm, split_init_args},
};

/// Configuration of both virtual machines.
#[derive(Clone, Debug, Default)]
pub struct VmConfig {
    /// Stack machine prices.
    pub gas_table: GasTable,
    /// Wasm machine limits and gas rate.
    pub wasm: WasmConfig,
    /// Prepared Wasm modules shared by every machine built from this config.
    pub modules: ModuleCache,
}

impl VmConfig {
    /// Config with the given Wasm gas rate and default limits.
    pub fn with_wasm_gas_rate(rate: u64) -> Self {
        Self { wasm: WasmConfig { gas_rate: rate, ..Default::default() }, ..Default::default() }
    }
}

/// A virtual machine that can be attached to a [`Machine`].
#[derive(Clone, Debug)]
pub enum Vm {
    /// EVM-class stack machine.
    Stack(StackVm),
    /// WebAssembly machine.
    Wasm(WasmVm),
}

/// Machine selected for a piece of code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveVm {
    /// Run on the stack machine.
    Stack,
    /// Run on the Wasm machine.
    Wasm,
}

/// Result of a message call.
#[derive(Debug, Default)]
pub struct CallOutcome {
    /// Returned bytes, also set when the callee reverted.
    pub output: Bytes,
    /// Gas handed back to the caller.
    pub gas_left: u64,
    /// Code storage gas spent below this call that was not covered by its own usage.
    pub byte_code_gas: u64,
    /// Transaction-local failure; the call's state changes were reverted.
    pub error: Option<VmError>,
}

impl CallOutcome {
    fn succeeded(gas_left: u64) -> Self {
        Self { gas_left, ..Default::default() }
    }

    fn failed(error: VmError, gas_left: u64) -> Self {
        Self { gas_left, error: Some(error), ..Default::default() }
    }

    /// Whether the call succeeded.
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a contract creation.
#[derive(Debug, Default)]
pub struct CreateOutcome {
    /// Installed code on success, revert data otherwise.
    pub output: Bytes,
    /// Address of the created contract.
    pub address: Address,
    /// Gas handed back to the caller.
    pub gas_left: u64,
    /// Gas spent storing the code.
    pub byte_code_gas: u64,
    /// Transaction-local failure; the creation was reverted.
    pub error: Option<VmError>,
}

impl CreateOutcome {
    /// Whether the creation succeeded.
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Virtual machine factory over a mutable world state.
///
/// Holds both machines side by side and routes each activation by the magic prefix
/// of the code it runs. Value movements by either machine are collected as balance
/// records, and transfer fees charged inside contracts are tracked so the caller can
/// hand them back when a sub-call fails.
#[derive(Debug)]
pub struct Machine<'s> {
    state: &'s mut WorldState,
    block: BlockContext,
    stack: Option<StackVm>,
    wasm: Option<WasmVm>,
    origin: Address,
    gas_price: U256,
    token: Address,
    depth: usize,
    read_only: bool,
    abort: Arc<AtomicBool>,
    otxs: Vec<BalanceRecord>,
    fees: Vec<u64>,
    refund_fees: Vec<u64>,
}

impl<'s> Machine<'s> {
    /// Machine with both VMs attached.
    pub fn new(state: &'s mut WorldState, block: BlockContext, config: &VmConfig) -> Self {
        let mut machine = Self::empty(state, block);
        machine.add_vm(Vm::Stack(StackVm::new(config.gas_table)));
        machine.add_vm(Vm::Wasm(WasmVm::new(config.wasm.clone(), config.modules.clone())));
        machine
    }

    /// Machine with no VM attached.
    pub fn empty(state: &'s mut WorldState, block: BlockContext) -> Self {
        Self {
            state,
            block,
            stack: None,
            wasm: None,
            origin: Address::ZERO,
            gas_price: U256::ZERO,
            token: Address::ZERO,
            depth: 0,
            read_only: false,
            abort: Arc::new(AtomicBool::new(false)),
            otxs: Vec::new(),
            fees: Vec::new(),
            refund_fees: Vec::new(),
        }
    }

    /// Share an externally owned abort flag.
    #[must_use]
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    /// Attach a VM, replacing any VM of the same kind.
    pub fn add_vm(&mut self, vm: Vm) {
        match vm {
            Vm::Stack(vm) => self.stack = Some(vm),
            Vm::Wasm(vm) => self.wasm = Some(vm),
        }
    }

    /// Start a new message: clears depth, records and fees and sets the transaction context.
    pub fn reset(&mut self, msg: &Message) {
        self.origin = msg.origin;
        self.gas_price = msg.gas_price;
        self.token = msg.token;
        self.depth = 0;
        self.read_only = false;
        self.abort.store(false, Ordering::Relaxed);
        self.otxs.clear();
        self.fees.clear();
        self.refund_fees.clear();
    }

    /// Machine able to run `code`.
    pub fn get_real_vm(&self, code: &[u8]) -> Result<ActiveVm, VmError> {
        if is_wasm_code(code) {
            self.wasm.as_ref().map(|_| ActiveVm::Wasm).ok_or(VmError::NoCompatibleVm)
        } else {
            self.stack.as_ref().map(|_| ActiveVm::Stack).ok_or(VmError::NoCompatibleVm)
        }
    }

    /// Flag that interrupts execution when set.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Interrupt execution at the next check.
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Underlying state.
    pub fn state(&self) -> &WorldState {
        self.state
    }

    /// Underlying state, mutably.
    pub fn state_mut(&mut self) -> &mut WorldState {
        self.state
    }

    /// Block context.
    pub const fn block(&self) -> &BlockContext {
        &self.block
    }

    /// Current call depth.
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Balance records of the current message.
    pub fn otxs(&self) -> &[BalanceRecord] {
        &self.otxs
    }

    /// Drain the balance records of the current message.
    pub fn take_otxs(&mut self) -> Vec<BalanceRecord> {
        std::mem::take(&mut self.otxs)
    }

    /// Transfer fees of failed sub-calls, owed back to the transaction.
    pub fn refund_fee(&self) -> u64 {
        self.refund_fees.iter().sum()
    }

    /// Every transfer fee charged during the message.
    pub fn refund_all_fee(&self) -> u64 {
        self.fees.iter().sum::<u64>() + self.refund_fee()
    }

    pub(crate) const fn origin(&self) -> Address {
        self.origin
    }

    pub(crate) const fn gas_price(&self) -> U256 {
        self.gas_price
    }

    pub(crate) const fn token(&self) -> Address {
        self.token
    }

    pub(crate) const fn read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub(crate) fn stack_vm(&self) -> Result<&StackVm, VmError> {
        self.stack.as_ref().ok_or(VmError::NoCompatibleVm)
    }

    pub(crate) fn wasm_vm(&self) -> Result<&WasmVm, VmError> {
        self.wasm.as_ref().ok_or(VmError::NoCompatibleVm)
    }

    pub(crate) fn record(&mut self, record: BalanceRecord) {
        self.otxs.push(record);
    }

    /// Charge a transfer fee; returns its index for [`Machine::refund_fees_from`].
    pub(crate) fn push_fee(&mut self, fee: u64) -> usize {
        self.fees.push(fee);
        self.fees.len() - 1
    }

    pub(crate) fn fee_mark(&self) -> usize {
        self.fees.len()
    }

    /// Move the fees charged since `mark` to the refund list.
    pub(crate) fn refund_fees_from(&mut self, mark: usize) {
        if mark < self.fees.len() {
            let refunded = self.fees.split_off(mark);
            self.refund_fees.extend(refunded);
        }
    }

    /// Call `to`, moving `value` of `token` from `caller`.
    pub fn call(
        &mut self,
        caller: Address,
        to: Address,
        token: Address,
        input: Bytes,
        gas: u64,
        value: U256,
    ) -> Result<CallOutcome, StateError> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }
        if self.state.get_balance(&caller, &token)? < value {
            return Ok(CallOutcome::failed(VmError::InsufficientBalance, gas));
        }

        let snapshot = self.state.snapshot();
        let marks = self.marks();
        if !self.state.exist(&to)? {
            if Precompile::from_address(&to).is_none() && value.is_zero() {
                return Ok(CallOutcome::succeeded(gas));
            }
            self.state.create_account(to)?;
        }
        if !value.is_zero() {
            self.state.sub_balance(caller, token, value)?;
            self.state.add_balance(to, token, value)?;
            let kind = if self.depth == 0 { RecordKind::Transfer } else { RecordKind::Contract };
            self.record(BalanceRecord::new(
                caller,
                to,
                AddressType::Account,
                AddressType::Account,
                kind,
                token,
                value,
            ));
        }

        let frame = self.load_frame(caller, to, to, value, gas, input)?.with_token(token);
        self.finish_call(frame, gas, snapshot, marks)
    }

    /// Call `to` for a transaction whose value was already debited from its inputs.
    ///
    /// The value is credited without a debit, and the depth and balance checks are skipped.
    pub fn utxo_call(
        &mut self,
        caller: Address,
        to: Address,
        token: Address,
        input: Bytes,
        gas: u64,
        value: U256,
    ) -> Result<CallOutcome, StateError> {
        let snapshot = self.state.snapshot();
        let marks = self.marks();
        if !self.state.exist(&to)? {
            if Precompile::from_address(&to).is_none() && value.is_zero() {
                return Ok(CallOutcome::succeeded(gas));
            }
            self.state.create_account(to)?;
        }
        if !value.is_zero() {
            self.state.add_balance(to, token, value)?;
        }

        let frame = self.load_frame(caller, to, to, value, gas, input)?.with_token(token);
        self.finish_call(frame, gas, snapshot, marks)
    }

    /// Run the code of `to` in the context of `caller`.
    pub fn call_code(
        &mut self,
        caller: Address,
        to: Address,
        input: Bytes,
        gas: u64,
        value: U256,
    ) -> Result<CallOutcome, StateError> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }
        if self.state.get_balance(&caller, &Address::ZERO)? < value {
            return Ok(CallOutcome::failed(VmError::InsufficientBalance, gas));
        }
        let snapshot = self.state.snapshot();
        let marks = self.marks();
        let frame = self.load_frame(caller, caller, to, value, gas, input)?;
        self.finish_call(frame, gas, snapshot, marks)
    }

    /// Run the code of `code_address` keeping the parent's caller, address and value.
    pub fn delegate_call(
        &mut self,
        parent_caller: Address,
        address: Address,
        code_address: Address,
        input: Bytes,
        gas: u64,
        value: U256,
    ) -> Result<CallOutcome, StateError> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }
        let snapshot = self.state.snapshot();
        let marks = self.marks();
        let frame = self.load_frame(parent_caller, address, code_address, value, gas, input)?;
        self.finish_call(frame, gas, snapshot, marks)
    }

    /// Call `to` forbidding any state modification below it.
    pub fn static_call(
        &mut self,
        caller: Address,
        to: Address,
        input: Bytes,
        gas: u64,
    ) -> Result<CallOutcome, StateError> {
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(CallOutcome::failed(VmError::Depth, gas));
        }
        let snapshot = self.state.snapshot();
        let marks = self.marks();
        let frame = self.load_frame(caller, to, to, U256::ZERO, gas, input)?;

        let was_read_only = std::mem::replace(&mut self.read_only, true);
        let outcome = self.finish_call(frame, gas, snapshot, marks);
        self.read_only = was_read_only;
        outcome
    }

    /// Deploy `code` at the address derived from the caller's nonce.
    pub fn create(
        &mut self,
        caller: Address,
        code: Bytes,
        gas: u64,
        value: U256,
    ) -> Result<CreateOutcome, StateError> {
        let nonce = self.state.get_nonce(&caller)?;
        let address = create_address(&caller, nonce);
        self.create_at(caller, code, gas, value, address)
    }

    /// Deploy `code` at the address derived from `salt` and the code hash.
    pub fn create2(
        &mut self,
        caller: Address,
        code: Bytes,
        gas: u64,
        value: U256,
        salt: B256,
    ) -> Result<CreateOutcome, StateError> {
        let address = create2_address(&caller, salt, keccak256(&code));
        self.create_at(caller, code, gas, value, address)
    }

    /// Replace the code at `address`, dropping any prepared module of the old code.
    pub fn upgrade(&mut self, caller: Address, address: Address, code: Bytes) -> Result<(), StateError> {
        debug!(%caller, %address, size = code.len(), "upgrade contract");
        self.state.set_code(address, code)?;
        if let Some(wasm) = &self.wasm {
            wasm.modules().evict(&address);
        }
        Ok(())
    }

    fn create_at(
        &mut self,
        caller: Address,
        code: Bytes,
        gas: u64,
        value: U256,
        address: Address,
    ) -> Result<CreateOutcome, StateError> {
        let failed = |error, gas_left| CreateOutcome { gas_left, error: Some(error), ..Default::default() };
        if self.depth > CALL_CREATE_DEPTH {
            return Ok(failed(VmError::Depth, gas));
        }
        let vm = match self.get_real_vm(&code) {
            Ok(vm) => vm,
            Err(err) => return Ok(failed(err, gas)),
        };

        let marks = self.marks();
        if self.depth > 0 {
            if self.state.get_balance(&caller, &Address::ZERO)? < value {
                return Ok(failed(VmError::InsufficientBalance, gas));
            }
            let Some(nonce) = self.state.get_nonce(&caller)?.checked_add(1) else {
                return Ok(failed(VmError::NonceUintOverflow, gas));
            };
            self.state.set_nonce(caller, nonce)?;
        }

        let code_hash = self.state.get_code_hash(&address)?;
        if self.state.get_nonce(&address)? != 0 || (code_hash != B256::ZERO && code_hash != KECCAK256_EMPTY) {
            return Ok(failed(VmError::ContractAddressCollision, 0));
        }

        let snapshot = self.state.snapshot();
        self.state.create_account(address)?;
        self.state.set_nonce(address, 1)?;
        if !value.is_zero() {
            if self.depth > 0 {
                self.state.sub_balance(caller, Address::ZERO, value)?;
                self.record(BalanceRecord::new(
                    caller,
                    address,
                    AddressType::Contract,
                    AddressType::Contract,
                    RecordKind::CreateContract,
                    Address::ZERO,
                    value,
                ));
            }
            self.state.add_balance(address, Address::ZERO, value)?;
        }

        let (frame, rate) = match vm {
            ActiveVm::Stack => {
                let frame = Frame::new(caller, address, value, gas).with_code(address, keccak256(&code), code);
                (frame, 1)
            }
            ActiveVm::Wasm => {
                let Some((module, args)) = split_init_args(&code) else {
                    self.state.revert_to(snapshot);
                    return Ok(failed(VmError::WasmModule("malformed init arguments".to_string()), gas));
                };
                let module = Bytes::copy_from_slice(module);
                self.state.set_code(address, module.clone())?;
                let frame = Frame::new(caller, address, value, gas)
                    .with_code(address, keccak256(&module), module)
                    .with_input(Bytes::copy_from_slice(args));
                let rate = self.wasm_vm().map_or(1, |vm| vm.gas_rate());
                (frame, rate)
            }
        };
        let mut frame = Frame { create: true, ..frame };

        let mut result = self.execute(&mut frame);
        let deployed = match vm {
            ActiveVm::Stack => frame.output.clone(),
            ActiveVm::Wasm => frame.code.clone(),
        };

        let oversized = deployed.len() > MAX_CODE_SIZE;
        let mut byte_code_gas = 0;
        if result.is_ok() && !oversized {
            let store_gas = deployed.len() as u64 * CREATE_DATA_GAS / rate;
            match frame.use_gas(store_gas) {
                Ok(()) => {
                    byte_code_gas = store_gas;
                    self.state.set_code(address, deployed.clone())?;
                }
                Err(_) => result = Err(VmError::CodeStoreOutOfGas),
            }
        }
        if result.is_ok() && oversized {
            result = Err(VmError::MaxCodeSizeExceeded);
        }

        match result {
            Ok(()) => {
                trace!(%address, size = deployed.len(), gas_left = frame.gas, "contract created");
                Ok(CreateOutcome { output: deployed, address, gas_left: frame.gas, byte_code_gas, error: None })
            }
            Err(VmError::State(err)) => Err(err),
            Err(err) => {
                debug!(%address, %err, "contract creation failed");
                self.state.revert_to(snapshot);
                self.unwind(marks);
                let (output, gas_left) =
                    if err.keeps_gas() { (frame.output, frame.gas) } else { (Bytes::new(), 0) };
                Ok(CreateOutcome { output, address, gas_left, byte_code_gas: 0, error: Some(err) })
            }
        }
    }

    fn load_frame(
        &self,
        caller: Address,
        address: Address,
        code_address: Address,
        value: U256,
        gas: u64,
        input: Bytes,
    ) -> Result<Frame, StateError> {
        let code = self.state.get_code(&code_address)?;
        let code_hash = self.state.get_code_hash(&code_address)?;
        Ok(Frame::new(caller, address, value, gas).with_code(code_address, code_hash, code).with_input(input))
    }

    fn marks(&self) -> (usize, usize) {
        (self.otxs.len(), self.fees.len())
    }

    fn unwind(&mut self, (otxs, fees): (usize, usize)) {
        self.otxs.truncate(otxs);
        self.refund_fees_from(fees);
    }

    fn finish_call(
        &mut self,
        mut frame: Frame,
        gas: u64,
        snapshot: SnapshotId,
        marks: (usize, usize),
    ) -> Result<CallOutcome, StateError> {
        let result = self.execute(&mut frame);
        let used = gas.saturating_sub(frame.gas);
        let byte_code_gas = frame.byte_code_gas.saturating_sub(used);
        match result {
            Ok(()) => Ok(CallOutcome { output: frame.output, gas_left: frame.gas, byte_code_gas, error: None }),
            Err(VmError::State(err)) => Err(err),
            Err(err) => {
                trace!(address = %frame.address, %err, depth = self.depth, "call failed");
                self.state.revert_to(snapshot);
                self.unwind(marks);
                let (output, gas_left) =
                    if err.keeps_gas() { (frame.output, frame.gas) } else { (Bytes::new(), 0) };
                Ok(CallOutcome { output, gas_left, byte_code_gas, error: Some(err) })
            }
        }
    }

    /// Run the frame's code on the matching machine, one level deeper.
    fn execute(&mut self, frame: &mut Frame) -> Result<(), VmError> {
        if let Some(precompile) = Precompile::from_address(&frame.code_address) {
            frame.use_gas(precompile.required_gas(&frame.input))?;
            frame.output = precompile.run(&frame.input)?.into();
            return Ok(());
        }
        if frame.code.is_empty() {
            return Ok(());
        }
        let vm = self.get_real_vm(&frame.code)?;
        self.depth += 1;
        let result = match vm {
            ActiveVm::Stack => self.run_stack(frame),
            ActiveVm::Wasm => self.run_wasm(frame),
        };
        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hyla_backend::MemoryStore;

    use super::*;

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);
    const TOKEN: Address = Address::repeat_byte(0x70);

    fn state() -> WorldState {
        let mut state = WorldState::new(Arc::new(MemoryStore::new()));
        state.add_balance(ALICE, Address::ZERO, U256::from(1_000_000)).unwrap();
        state.add_balance(ALICE, TOKEN, U256::from(500)).unwrap();
        state
    }

    fn block() -> BlockContext {
        BlockContext::new(Address::repeat_byte(0xcb), 10, 1_000, 10_000_000)
    }

    #[test]
    fn selects_vm_by_magic() {
        let mut state = state();
        let machine = Machine::new(&mut state, block(), &VmConfig::default());
        assert_eq!(machine.get_real_vm(&[0x60, 0x00]).unwrap(), ActiveVm::Stack);
        assert_eq!(machine.get_real_vm(&[0x00, 0x61, 0x73, 0x6d, 0x01]).unwrap(), ActiveVm::Wasm);
    }

    #[test]
    fn missing_vm_is_reported() {
        let mut state = state();
        let mut machine = Machine::empty(&mut state, block());
        assert!(matches!(machine.get_real_vm(&[0x60]), Err(VmError::NoCompatibleVm)));
        machine.add_vm(Vm::Stack(StackVm::default()));
        assert!(machine.get_real_vm(&[0x60]).is_ok());
        assert!(matches!(machine.get_real_vm(&[0x00, 0x61, 0x73, 0x6d, 0x01]), Err(VmError::NoCompatibleVm)));
    }

    #[test]
    fn plain_transfer_records_balance() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        machine.reset(&Message::new(ALICE, U256::from(1), Address::ZERO));

        let outcome = machine.call(ALICE, BOB, TOKEN, Bytes::new(), 100, U256::from(20)).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 100);
        assert_eq!(machine.otxs().len(), 1);
        assert_eq!(machine.otxs()[0].kind, RecordKind::Transfer);
        assert_eq!(machine.otxs()[0].token, TOKEN);
        drop(machine);

        assert_eq!(state.get_balance(&BOB, &TOKEN).unwrap(), U256::from(20));
        assert_eq!(state.get_balance(&ALICE, &TOKEN).unwrap(), U256::from(480));
    }

    #[test]
    fn call_checks_balance_and_keeps_gas() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let outcome = machine.call(ALICE, BOB, TOKEN, Bytes::new(), 100, U256::from(501)).unwrap();
        assert!(matches!(outcome.error, Some(VmError::InsufficientBalance)));
        assert_eq!(outcome.gas_left, 100);
        assert!(machine.otxs().is_empty());
    }

    #[test]
    fn zero_value_call_to_missing_account_is_noop() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let outcome = machine.call(ALICE, BOB, Address::ZERO, Bytes::new(), 7, U256::ZERO).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 7);
        drop(machine);
        assert!(!state.exist(&BOB).unwrap());
    }

    #[test]
    fn utxo_call_credits_without_debit() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let outcome = machine.utxo_call(BOB, BOB, TOKEN, Bytes::new(), 10, U256::from(9)).unwrap();
        assert!(outcome.is_success());
        assert!(machine.otxs().is_empty());
        drop(machine);
        assert_eq!(state.get_balance(&BOB, &TOKEN).unwrap(), U256::from(9));
    }

    #[test]
    fn precompile_runs_without_code() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let identity = Address::with_last_byte(4);
        let outcome =
            machine.call(ALICE, identity, Address::ZERO, Bytes::from_static(b"echo"), 100, U256::ZERO).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.output, Bytes::from_static(b"echo"));
        assert_eq!(outcome.gas_left, 100 - 18);
    }

    #[test]
    fn fee_refunds() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let mark = machine.fee_mark();
        machine.push_fee(5);
        machine.push_fee(7);
        assert_eq!(machine.refund_fee(), 0);
        assert_eq!(machine.refund_all_fee(), 12);
        machine.refund_fees_from(mark + 1);
        assert_eq!(machine.refund_fee(), 7);
        assert_eq!(machine.refund_all_fee(), 12);

        machine.reset(&Message::default());
        assert_eq!(machine.refund_all_fee(), 0);
    }

    #[test]
    fn create_installs_returned_code() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        // Returns the single byte 0xfe as runtime code.
        let init = Bytes::from_static(&[0x60, 0xfe, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3]);
        let outcome = machine.create(ALICE, init, 100_000, U256::from(3)).unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.byte_code_gas, CREATE_DATA_GAS);
        let address = outcome.address;
        drop(machine);

        assert_eq!(address, create_address(&ALICE, 0));
        assert_eq!(state.get_code(&address).unwrap(), Bytes::from_static(&[0xfe]));
        assert_eq!(state.get_nonce(&address).unwrap(), 1);
        assert_eq!(state.get_balance(&address, &Address::ZERO).unwrap(), U256::from(3));
        // Top-level creation leaves the caller's nonce to the transaction.
        assert_eq!(state.get_nonce(&ALICE).unwrap(), 0);
    }

    #[test]
    fn create_collision() {
        let mut state = state();
        let address = create_address(&ALICE, 0);
        state.set_nonce(address, 1).unwrap();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let outcome = machine.create(ALICE, Bytes::from_static(&[0x00]), 1_000, U256::ZERO).unwrap();
        assert!(matches!(outcome.error, Some(VmError::ContractAddressCollision)));
        assert_eq!(outcome.gas_left, 0);
    }

    #[test]
    fn failed_create_reverts() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        let outcome = machine.create(ALICE, Bytes::from_static(&[0xfe]), 1_000, U256::from(3)).unwrap();
        assert!(matches!(outcome.error, Some(VmError::InvalidOpcode(0xfe))));
        let address = outcome.address;
        drop(machine);
        assert!(!state.exist(&address).unwrap());
    }

    #[test]
    fn upgrade_replaces_code() {
        let mut state = state();
        state.set_code(BOB, Bytes::from_static(&[0x00])).unwrap();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        machine.upgrade(ALICE, BOB, Bytes::from_static(&[0x60, 0x00])).unwrap();
        drop(machine);
        assert_eq!(state.get_code(&BOB).unwrap(), Bytes::from_static(&[0x60, 0x00]));
    }

    #[test]
    fn depth_limit() {
        let mut state = state();
        let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
        machine.depth = CALL_CREATE_DEPTH + 1;
        let outcome = machine.call(ALICE, BOB, Address::ZERO, Bytes::new(), 5, U256::ZERO).unwrap();
        assert!(matches!(outcome.error, Some(VmError::Depth)));
        assert_eq!(outcome.gas_left, 5);
        let outcome = machine.create(ALICE, Bytes::from_static(&[0x00]), 5, U256::ZERO).unwrap();
        assert!(matches!(outcome.error, Some(VmError::Depth)));
    }
}
