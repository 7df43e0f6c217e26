//! Host functions exposed to Wasm contracts and the activation loop.
//!
//! Every host function lives in the `env` module with the `TC_` prefix. Buffers are
//! passed as `(pointer, length)` pairs, addresses as 20 raw bytes and amounts as
//! 32-byte big-endian words. Host prices are expressed in transaction gas and
//! multiplied by the gas rate before they are charged against the Wasm budget.

use std::cell::RefCell;

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use hyla_domain::{AddressType, BalanceRecord, Log, RecordKind, TxSignature};
use hyla_primitives::{cal_new_amount_gas, cal_new_contract_amount_gas};
use hyla_state::{StateError, WorldState};
use tracing::{debug, trace};
use wasmi::{
    Externals, FuncInstance, FuncRef, ImportsBuilder, MemoryDescriptor, MemoryInstance, MemoryRef,
    ModuleImportResolver, ModuleInstance, RuntimeArgs, RuntimeValue, Signature, Trap, TrapKind,
    ValueType::{self, I32, I64},
    memory_units::Pages,
};

use crate::{Machine, VmError, frame::Frame};

const BASE_GAS: u64 = 2;
const WORD_GAS: u64 = 3;
const STORAGE_GET_GAS: u64 = 200;
const STORAGE_SET_GAS: u64 = 20_000;
const STORAGE_DEL_GAS: u64 = 5_000;
const LOG_GAS: u64 = 375;
const LOG_TOPIC_GAS: u64 = 375;
const LOG_DATA_GAS: u64 = 8;
const TRANSFER_GAS: u64 = 9_000;
const BALANCE_GAS: u64 = 400;
const ISSUE_GAS: u64 = 20_000;
const CRYPTO_GAS: u64 = 3_000;
const CALL_CONTRACT_GAS: u64 = 700;
const SELFDESTRUCT_GAS: u64 = 5_000;
const BLOCK_HASH_GAS: u64 = 20;

/// Separator between the action and the parameters of a contract-to-contract call.
const CALL_SEPARATOR: u8 = b'|';

struct HostFunc {
    name: &'static str,
    params: &'static [ValueType],
    ret: Option<ValueType>,
}

const fn host(name: &'static str, params: &'static [ValueType], ret: Option<ValueType>) -> HostFunc {
    HostFunc { name, params, ret }
}

/// Resolvable imports; the position is the host function index.
const HOST_FUNCS: &[HostFunc] = &[
    host("gas", &[I32], None),
    host("TC_InputSize", &[], Some(I32)),
    host("TC_Input", &[I32], None),
    host("TC_Return", &[I32, I32], None),
    host("TC_Revert", &[I32, I32], None),
    host("TC_StorageSetString", &[I32, I32, I32, I32], None),
    host("TC_StorageSetBytes", &[I32, I32, I32, I32], None),
    host("TC_StoragePureSetString", &[I32, I32, I32, I32], None),
    host("TC_StoragePureSetBytes", &[I32, I32, I32, I32], None),
    host("TC_StorageGetString", &[I32, I32, I32, I32], Some(I32)),
    host("TC_StorageGetBytes", &[I32, I32, I32, I32], Some(I32)),
    host("TC_StoragePureGetString", &[I32, I32, I32, I32], Some(I32)),
    host("TC_StoragePureGetBytes", &[I32, I32, I32, I32], Some(I32)),
    host("TC_StorageDel", &[I32, I32], None),
    host("TC_ContractStorageGet", &[I32, I32, I32, I32, I32], Some(I32)),
    host("TC_ContractStoragePureGet", &[I32, I32, I32, I32, I32], Some(I32)),
    host("TC_Notify", &[I32, I32, I32, I32], None),
    host("TC_BlockHash", &[I64, I32], None),
    host("TC_GetCoinbase", &[I32], None),
    host("TC_GetGasLimit", &[], Some(I64)),
    host("TC_GetNumber", &[], Some(I64)),
    host("TC_Now", &[], Some(I64)),
    host("TC_GetTimestamp", &[], Some(I64)),
    host("TC_GetTxGasPrice", &[I32], None),
    host("TC_GetTxOrigin", &[I32], None),
    host("TC_GetMsgSender", &[I32], None),
    host("TC_GetSelfAddress", &[I32], None),
    host("TC_Log0", &[I32, I32], None),
    host("TC_Log1", &[I32, I32, I32], None),
    host("TC_Log2", &[I32, I32, I32, I32], None),
    host("TC_Log3", &[I32, I32, I32, I32, I32], None),
    host("TC_Log4", &[I32, I32, I32, I32, I32, I32], None),
    host("TC_SelfDestruct", &[I32], None),
    host("TC_CheckSign", &[I32, I32, I32], Some(I32)),
    host("TC_Ecrecover", &[I32, I32, I32, I32, I32], Some(I32)),
    host("TC_Issue", &[I32], None),
    host("TC_Transfer", &[I32, I32], None),
    host("TC_TransferToken", &[I32, I32, I32], None),
    host("TC_GetBalance", &[I32, I32], None),
    host("TC_TokenBalance", &[I32, I32, I32], None),
    host("TC_TokenAddress", &[I32], None),
    host("TC_GetMsgValue", &[I32], None),
    host("TC_GetMsgTokenValue", &[I32], None),
    host("TC_CallContract", &[I32, I32, I32, I32, I32, I32, I32], Some(I32)),
];

/// Resolves `env` imports and allocates the contract memory.
struct HostResolver {
    max_memory: u32,
    memory: RefCell<Option<MemoryRef>>,
}

impl HostResolver {
    const fn new(max_memory: u32) -> Self {
        Self { max_memory, memory: RefCell::new(None) }
    }

    fn memory(&self) -> Option<MemoryRef> {
        self.memory.borrow().clone()
    }
}

impl ModuleImportResolver for HostResolver {
    fn resolve_func(&self, field_name: &str, signature: &Signature) -> Result<FuncRef, wasmi::Error> {
        let (index, func) = HOST_FUNCS
            .iter()
            .enumerate()
            .find(|(_, func)| func.name == field_name)
            .ok_or_else(|| wasmi::Error::Instantiation(format!("host function {field_name} not found")))?;
        if signature.params() != func.params || signature.return_type() != func.ret {
            return Err(wasmi::Error::Instantiation(format!("host function {field_name} has a wrong signature")));
        }
        Ok(FuncInstance::alloc_host(Signature::new(func.params, func.ret), index))
    }

    fn resolve_memory(&self, field_name: &str, descriptor: &MemoryDescriptor) -> Result<MemoryRef, wasmi::Error> {
        if field_name != "memory" {
            return Err(wasmi::Error::Instantiation(format!("memory {field_name} not found")));
        }
        let maximum = descriptor.maximum().unwrap_or(self.max_memory).min(self.max_memory);
        let memory = MemoryInstance::alloc(Pages(descriptor.initial() as usize), Some(Pages(maximum as usize)))?;
        *self.memory.borrow_mut() = Some(memory.clone());
        Ok(memory)
    }
}

fn words(len: usize) -> u64 {
    (len as u64).div_ceil(32)
}

fn wasm_module_error(err: wasmi::Error) -> VmError {
    VmError::WasmModule(err.to_string())
}

/// Host side of one Wasm activation.
struct Runtime<'a, 's> {
    machine: &'a mut Machine<'s>,
    frame: &'a mut Frame,
    memory: MemoryRef,
    rate: u64,
    budget: u64,
    used: u64,
    halted: bool,
    pending: Option<VmError>,
}

impl Machine<'_> {
    /// Instantiate the frame's module and run `main`, or `init` for a creation.
    pub(crate) fn run_wasm(&mut self, frame: &mut Frame) -> Result<(), VmError> {
        let vm = self.wasm_vm()?;
        let config = vm.config().clone();
        let rate = vm.gas_rate();
        let prepared = vm.modules().get_or_prepare(frame.code_address, frame.code_hash, &frame.code, &config)?;

        let module = wasmi::Module::from_parity_wasm_module((*prepared).clone()).map_err(wasm_module_error)?;
        let resolver = HostResolver::new(config.max_memory);
        let imports = ImportsBuilder::new().with_resolver("env", &resolver);
        let not_started = ModuleInstance::new(&module, &imports).map_err(wasm_module_error)?;
        if not_started.has_start() {
            return Err(VmError::WasmModule("start function is not supported".to_string()));
        }
        let instance = not_started.assert_no_start();
        let memory = resolver.memory().ok_or_else(|| VmError::WasmModule("missing memory".to_string()))?;

        let entry = if frame.create { "init" } else { "main" };
        if instance.export_by_name(entry).is_none() {
            if frame.create {
                return Ok(());
            }
            return Err(VmError::WasmModule(format!("missing export {entry}")));
        }

        let budget = frame.gas.saturating_mul(rate);
        let mut runtime =
            Runtime { machine: self, frame, memory, rate, budget, used: 0, halted: false, pending: None };
        let result = instance.invoke_export(entry, &[], &mut runtime);
        let Runtime { frame, used, halted, pending, .. } = runtime;

        let gas_used = used / rate + u64::from(used % rate != 0);
        frame.gas = frame.gas.saturating_sub(gas_used);
        trace!(address = %frame.address, entry, gas_used, "wasm activation finished");

        match (result, pending) {
            (_, Some(err)) => Err(err),
            (Ok(_), None) => Ok(()),
            (Err(_), None) if halted => Ok(()),
            (Err(err), None) => {
                debug!(address = %frame.address, %err, "wasm trap");
                Err(VmError::WasmTrap(err.to_string()))
            }
        }
    }
}

impl Runtime<'_, '_> {
    /// Stash `err` as the activation result and unwind the Wasm stack.
    fn trap(&mut self, err: VmError) -> Trap {
        let message = err.to_string();
        self.pending = Some(err);
        Trap::new(TrapKind::Host(Box::new(VmError::WasmTrap(message))))
    }

    /// Stop successfully.
    fn halt(&mut self) -> Trap {
        self.halted = true;
        Trap::new(TrapKind::Host(Box::new(VmError::WasmTrap("halt".to_string()))))
    }

    fn charge_units(&mut self, units: u64) -> Result<(), Trap> {
        let used = self.used.saturating_add(units);
        if used > self.budget {
            self.used = self.budget;
            return Err(self.trap(VmError::OutOfGas));
        }
        self.used = used;
        Ok(())
    }

    /// Charge transaction gas scaled by the rate.
    fn charge(&mut self, gas: u64) -> Result<(), Trap> {
        self.charge_units(gas.saturating_mul(self.rate))
    }

    fn writable(&mut self) -> Result<(), Trap> {
        if self.machine.read_only() {
            return Err(self.trap(VmError::WriteProtection));
        }
        Ok(())
    }

    fn with_state<T>(&mut self, f: impl FnOnce(&mut WorldState) -> Result<T, StateError>) -> Result<T, Trap> {
        let result = f(self.machine.state_mut());
        result.map_err(|err| self.trap(VmError::State(err)))
    }

    fn read(&mut self, ptr: i32, len: i32) -> Result<Vec<u8>, Trap> {
        if ptr < 0 || len < 0 {
            return Err(self.trap(VmError::InvalidApiArgs("negative pointer or length")));
        }
        let result = self.memory.get(ptr as u32, len as usize);
        result.map_err(|_| self.trap(VmError::InvalidApiArgs("memory read out of bounds")))
    }

    fn read_address(&mut self, ptr: i32) -> Result<Address, Trap> {
        self.read(ptr, 20).map(|bytes| Address::from_slice(&bytes))
    }

    fn read_b256(&mut self, ptr: i32) -> Result<B256, Trap> {
        self.read(ptr, 32).map(|bytes| B256::from_slice(&bytes))
    }

    fn read_u256(&mut self, ptr: i32) -> Result<U256, Trap> {
        self.read(ptr, 32).map(|bytes| U256::from_be_slice(&bytes))
    }

    fn write(&mut self, ptr: i32, data: &[u8]) -> Result<(), Trap> {
        if ptr < 0 {
            return Err(self.trap(VmError::InvalidApiArgs("negative pointer")));
        }
        let result = self.memory.set(ptr as u32, data);
        result.map_err(|_| self.trap(VmError::InvalidApiArgs("memory write out of bounds")))
    }

    /// Copy at most `cap` bytes of `data` to `out` and report the full length.
    fn write_capped(&mut self, out: i32, cap: i32, data: &[u8]) -> Result<Option<RuntimeValue>, Trap> {
        if cap < 0 {
            return Err(self.trap(VmError::InvalidApiArgs("negative capacity")));
        }
        let copied = data.len().min(cap as usize);
        self.write(out, &data[..copied])?;
        Ok(Some(RuntimeValue::I32(data.len() as i32)))
    }

    fn emit(&mut self, topics: Vec<B256>, data: Vec<u8>) {
        let block = self.machine.block();
        let log = Log {
            address: self.frame.address,
            topics,
            data: data.into(),
            height: block.number,
            time: block.time,
            ..Default::default()
        };
        self.machine.state_mut().add_log(log);
    }

    fn address_type(&mut self, address: Address) -> Result<AddressType, Trap> {
        let contract = self.with_state(|state| state.is_contract(&address))?;
        Ok(if contract { AddressType::Contract } else { AddressType::Account })
    }

    fn storage_set(&mut self, args: &RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        let key = self.read(args.nth_checked(0)?, args.nth_checked(1)?)?;
        let value = self.read(args.nth_checked(2)?, args.nth_checked(3)?)?;
        self.charge(STORAGE_SET_GAS)?;
        let address = self.frame.address;
        self.with_state(|state| state.set_storage(address, keccak256(&key), value.into()))?;
        Ok(None)
    }

    fn storage_get(
        &mut self,
        address: Address,
        args: &RuntimeArgs<'_>,
        first: usize,
    ) -> Result<Option<RuntimeValue>, Trap> {
        let key = self.read(args.nth_checked(first)?, args.nth_checked(first + 1)?)?;
        let value = self.with_state(|state| state.get_storage(&address, &keccak256(&key)))?;
        self.charge(STORAGE_GET_GAS + WORD_GAS * words(value.len()))?;
        self.write_capped(args.nth_checked(first + 2)?, args.nth_checked(first + 3)?, &value)
    }

    fn storage_del(&mut self, args: &RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        let key = self.read(args.nth_checked(0)?, args.nth_checked(1)?)?;
        self.charge(STORAGE_DEL_GAS)?;
        let address = self.frame.address;
        self.with_state(|state| state.set_storage(address, keccak256(&key), Bytes::new()))?;
        Ok(None)
    }

    fn log(&mut self, args: &RuntimeArgs<'_>, topic_count: usize) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        let mut topics = Vec::with_capacity(topic_count);
        for i in 0..topic_count {
            topics.push(self.read_b256(args.nth_checked(i)?)?);
        }
        let data = self.read(args.nth_checked(topic_count)?, args.nth_checked(topic_count + 1)?)?;
        self.charge(LOG_GAS + LOG_TOPIC_GAS * topic_count as u64 + LOG_DATA_GAS * data.len() as u64)?;
        self.emit(topics, data);
        Ok(None)
    }

    fn notify(&mut self, args: &RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        let event = self.read(args.nth_checked(0)?, args.nth_checked(1)?)?;
        let data = self.read(args.nth_checked(2)?, args.nth_checked(3)?)?;
        self.charge(LOG_GAS + LOG_TOPIC_GAS + LOG_DATA_GAS * data.len() as u64)?;
        self.emit(vec![keccak256(&event)], data);
        Ok(None)
    }

    fn transfer(&mut self, to: Address, token: Address, amount: U256) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        self.charge(TRANSFER_GAS)?;
        if amount.is_zero() {
            return Ok(None);
        }
        let from = self.frame.address;
        let balance = self.with_state(|state| state.get_balance(&from, &token))?;
        if balance < amount {
            return Err(self.trap(VmError::BalanceNotEnough));
        }
        let to_type = self.address_type(to)?;
        if token.is_zero() {
            let fee = match to_type {
                AddressType::Contract => cal_new_contract_amount_gas(amount),
                _ => cal_new_amount_gas(amount),
            };
            self.machine.push_fee(fee);
            self.charge(fee)?;
        }
        self.with_state(|state| {
            state.sub_balance(from, token, amount)?;
            state.add_balance(to, token, amount)
        })?;
        self.machine.record(BalanceRecord::new(
            from,
            to,
            AddressType::Contract,
            to_type,
            RecordKind::Contract,
            token,
            amount,
        ));
        Ok(None)
    }

    fn issue(&mut self, amount: U256) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        self.charge(ISSUE_GAS)?;
        let (address, token) = (self.frame.address, self.frame.code_address);
        self.with_state(|state| state.add_balance(address, token, amount))?;
        self.machine.record(BalanceRecord::new(
            Address::ZERO,
            address,
            AddressType::Empty,
            AddressType::Contract,
            RecordKind::Issue,
            token,
            amount,
        ));
        Ok(None)
    }

    fn self_destruct(&mut self, beneficiary: Address) -> Result<Option<RuntimeValue>, Trap> {
        self.writable()?;
        self.charge(SELFDESTRUCT_GAS)?;
        let address = self.frame.address;
        let to_type = self.address_type(beneficiary)?;
        let balances = self.with_state(|state| state.get_token_balances(&address))?;
        for (token, amount) in balances {
            self.with_state(|state| state.add_balance(beneficiary, token, amount))?;
            self.machine.record(BalanceRecord::new(
                address,
                beneficiary,
                AddressType::Contract,
                to_type,
                RecordKind::Contract,
                token,
                amount,
            ));
        }
        self.with_state(|state| state.suicide(address))?;
        Err(self.halt())
    }

    fn check_sign(&mut self, args: &RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        self.charge(CRYPTO_GAS)?;
        let signer = self.read_address(args.nth_checked(0)?)?;
        let hash = self.read_b256(args.nth_checked(1)?)?;
        let signature = self.read(args.nth_checked(2)?, 65)?;
        let mut raw = [0u8; 65];
        raw.copy_from_slice(&signature);
        let valid = TxSignature(raw).recover_address(&hash).is_ok_and(|recovered| recovered == signer);
        Ok(Some(RuntimeValue::I32(i32::from(valid))))
    }

    fn ecrecover(&mut self, args: &RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        self.charge(CRYPTO_GAS)?;
        let hash = self.read_b256(args.nth_checked(0)?)?;
        let v: i32 = args.nth_checked(1)?;
        let r = self.read_b256(args.nth_checked(2)?)?;
        let s = self.read_b256(args.nth_checked(3)?)?;
        let out: i32 = args.nth_checked(4)?;

        let v = if v >= 27 { v - 27 } else { v };
        if !(0..=1).contains(&v) {
            return Ok(Some(RuntimeValue::I32(0)));
        }
        let mut raw = [0u8; 65];
        raw[..32].copy_from_slice(r.as_slice());
        raw[32..64].copy_from_slice(s.as_slice());
        raw[64] = v as u8;
        match TxSignature(raw).recover_address(&hash) {
            Ok(address) => {
                self.write(out, address.as_slice())?;
                Ok(Some(RuntimeValue::I32(1)))
            }
            Err(_) => Ok(Some(RuntimeValue::I32(0))),
        }
    }

    fn call_contract(&mut self, args: &RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        let to = self.read_address(args.nth_checked(0)?)?;
        let mut input = self.read(args.nth_checked(1)?, args.nth_checked(2)?)?;
        let params = self.read(args.nth_checked(3)?, args.nth_checked(4)?)?;
        input.push(CALL_SEPARATOR);
        input.extend_from_slice(&params);
        self.charge(CALL_CONTRACT_GAS + WORD_GAS * words(input.len()))?;

        let gas = (self.budget - self.used) / self.rate;
        let caller = self.frame.address;
        let result = self.machine.call(caller, to, Address::ZERO, input.into(), gas, U256::ZERO);
        let outcome = result.map_err(|err| self.trap(VmError::State(err)))?;
        self.charge(gas.saturating_sub(outcome.gas_left))?;
        self.frame.byte_code_gas = self.frame.byte_code_gas.saturating_add(outcome.byte_code_gas);

        if let Some(err) = outcome.error {
            if matches!(err, VmError::Reverted) {
                self.frame.output = outcome.output;
            }
            return Err(self.trap(err));
        }
        self.write_capped(args.nth_checked(5)?, args.nth_checked(6)?, &outcome.output)
    }
}

impl Externals for Runtime<'_, '_> {
    fn invoke_index(&mut self, index: usize, args: RuntimeArgs<'_>) -> Result<Option<RuntimeValue>, Trap> {
        let Some(func) = HOST_FUNCS.get(index) else {
            return Err(self.trap(VmError::InvalidApiArgs("unknown host function")));
        };
        if self.machine.interrupted() {
            return Err(self.trap(VmError::Interrupted));
        }

        match func.name {
            "gas" => {
                let units: i32 = args.nth_checked(0)?;
                if units < 0 {
                    return Err(self.trap(VmError::InvalidApiArgs("negative gas")));
                }
                self.charge_units(units as u64)?;
                Ok(None)
            }
            "TC_InputSize" => {
                self.charge(BASE_GAS)?;
                Ok(Some(RuntimeValue::I32(self.frame.input.len() as i32)))
            }
            "TC_Input" => {
                let input = self.frame.input.clone();
                self.charge(BASE_GAS + WORD_GAS * words(input.len()))?;
                self.write(args.nth_checked(0)?, &input)?;
                Ok(None)
            }
            "TC_Return" | "TC_Revert" => {
                let data = self.read(args.nth_checked(0)?, args.nth_checked(1)?)?;
                self.frame.output = data.into();
                if func.name == "TC_Revert" {
                    return Err(self.trap(VmError::Reverted));
                }
                Err(self.halt())
            }
            "TC_StorageSetString" | "TC_StorageSetBytes" | "TC_StoragePureSetString" | "TC_StoragePureSetBytes" => {
                self.storage_set(&args)
            }
            "TC_StorageGetString" | "TC_StorageGetBytes" | "TC_StoragePureGetString" | "TC_StoragePureGetBytes" => {
                let address = self.frame.address;
                self.storage_get(address, &args, 0)
            }
            "TC_StorageDel" => self.storage_del(&args),
            "TC_ContractStorageGet" | "TC_ContractStoragePureGet" => {
                let address = self.read_address(args.nth_checked(0)?)?;
                self.storage_get(address, &args, 1)
            }
            "TC_Notify" => self.notify(&args),
            "TC_BlockHash" => {
                self.charge(BLOCK_HASH_GAS)?;
                let number: i64 = args.nth_checked(0)?;
                let hash = u64::try_from(number).map(|n| self.machine.block().block_hash(n)).unwrap_or_default();
                self.write(args.nth_checked(1)?, hash.as_slice())?;
                Ok(None)
            }
            "TC_GetCoinbase" => {
                self.charge(BASE_GAS)?;
                let coinbase = self.machine.block().coinbase;
                self.write(args.nth_checked(0)?, coinbase.as_slice())?;
                Ok(None)
            }
            "TC_GetGasLimit" => {
                self.charge(BASE_GAS)?;
                Ok(Some(RuntimeValue::I64(self.machine.block().gas_limit as i64)))
            }
            "TC_GetNumber" => {
                self.charge(BASE_GAS)?;
                Ok(Some(RuntimeValue::I64(self.machine.block().number as i64)))
            }
            "TC_Now" | "TC_GetTimestamp" => {
                self.charge(BASE_GAS)?;
                Ok(Some(RuntimeValue::I64(self.machine.block().time as i64)))
            }
            "TC_GetTxGasPrice" => {
                self.charge(BASE_GAS)?;
                let price = self.machine.gas_price();
                self.write(args.nth_checked(0)?, &price.to_be_bytes::<32>())?;
                Ok(None)
            }
            "TC_GetTxOrigin" | "TC_GetMsgSender" | "TC_GetSelfAddress" => {
                self.charge(BASE_GAS)?;
                let address = match func.name {
                    "TC_GetTxOrigin" => self.machine.origin(),
                    "TC_GetMsgSender" => self.frame.caller,
                    _ => self.frame.address,
                };
                self.write(args.nth_checked(0)?, address.as_slice())?;
                Ok(None)
            }
            "TC_Log0" => self.log(&args, 0),
            "TC_Log1" => self.log(&args, 1),
            "TC_Log2" => self.log(&args, 2),
            "TC_Log3" => self.log(&args, 3),
            "TC_Log4" => self.log(&args, 4),
            "TC_SelfDestruct" => {
                let beneficiary = self.read_address(args.nth_checked(0)?)?;
                self.self_destruct(beneficiary)
            }
            "TC_CheckSign" => self.check_sign(&args),
            "TC_Ecrecover" => self.ecrecover(&args),
            "TC_Issue" => {
                let amount = self.read_u256(args.nth_checked(0)?)?;
                self.issue(amount)
            }
            "TC_Transfer" => {
                let to = self.read_address(args.nth_checked(0)?)?;
                let amount = self.read_u256(args.nth_checked(1)?)?;
                self.transfer(to, Address::ZERO, amount)
            }
            "TC_TransferToken" => {
                let to = self.read_address(args.nth_checked(0)?)?;
                let token = self.read_address(args.nth_checked(1)?)?;
                let amount = self.read_u256(args.nth_checked(2)?)?;
                self.transfer(to, token, amount)
            }
            "TC_GetBalance" | "TC_TokenBalance" => {
                self.charge(BALANCE_GAS)?;
                let address = self.read_address(args.nth_checked(0)?)?;
                let (token, out) = if func.name == "TC_TokenBalance" {
                    (self.read_address(args.nth_checked(1)?)?, args.nth_checked(2)?)
                } else {
                    (Address::ZERO, args.nth_checked(1)?)
                };
                let balance = self.with_state(|state| state.get_balance(&address, &token))?;
                self.write(out, &balance.to_be_bytes::<32>())?;
                Ok(None)
            }
            "TC_TokenAddress" => {
                self.charge(BASE_GAS)?;
                let token = self.frame.token;
                self.write(args.nth_checked(0)?, token.as_slice())?;
                Ok(None)
            }
            "TC_GetMsgValue" | "TC_GetMsgTokenValue" => {
                self.charge(BASE_GAS)?;
                let native = self.frame.token.is_zero();
                let value =
                    if native == (func.name == "TC_GetMsgValue") { self.frame.value } else { U256::ZERO };
                self.write(args.nth_checked(0)?, &value.to_be_bytes::<32>())?;
                Ok(None)
            }
            "TC_CallContract" => self.call_contract(&args),
            _ => Err(self.trap(VmError::InvalidApiArgs("unknown host function"))),
        }
    }
}
