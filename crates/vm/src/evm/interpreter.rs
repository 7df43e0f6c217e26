//! Bytecode interpreter of the stack machine.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use hyla_domain::{AddressType, BalanceRecord, Log, RecordKind};
use hyla_primitives::{CALL_STIPEND, cal_new_amount_gas, cal_new_contract_amount_gas};
use hyla_state::{StateError, WorldState};
use tracing::trace;

use super::{
    gas::{
        BLOCK_HASH_GAS, CALL_NEW_ACCOUNT_GAS, CALL_VALUE_TRANSFER_GAS, COPY_GAS, GasTable, ISSUE_GAS, LOG_DATA_GAS,
        LOG_TOPIC_GAS, SELFDESTRUCT_REFUND, SHA3_WORD_GAS, SSTORE_CLEAR_REFUND, SSTORE_RESET_GAS, SSTORE_SET_GAS,
        call_gas, copy_cost, exp_cost, memory_expansion,
    },
    memory::{Memory, padded_slice},
    opcode::{self, *},
    stack::Stack,
};
use crate::{Machine, VmError, frame::Frame};

/// Transferring tokens out of a contract.
const TRANSFER_TOKEN_GAS: u64 = 9_000;

pub(crate) fn to_address(word: U256) -> Address {
    Address::from_word(B256::from(word.to_be_bytes::<32>()))
}

pub(crate) fn from_address(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

const fn is_negative(value: U256) -> bool {
    value.bit(255)
}

fn abs(value: U256) -> U256 {
    if is_negative(value) { value.wrapping_neg() } else { value }
}

fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let quotient = abs(a) / abs(b);
    if is_negative(a) != is_negative(b) { quotient.wrapping_neg() } else { quotient }
}

fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let rem = abs(a) % abs(b);
    if is_negative(a) { rem.wrapping_neg() } else { rem }
}

fn slt(a: U256, b: U256) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

fn sign_extend(byte: U256, value: U256) -> U256 {
    if byte >= U256::from(31) {
        return value;
    }
    let bit = byte.to::<usize>() * 8 + 7;
    let mask = (U256::from(1) << (bit + 1)) - U256::from(1);
    if value.bit(bit) { value | !mask } else { value & mask }
}

fn sar(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256) {
        return if is_negative(value) { U256::MAX } else { U256::ZERO };
    }
    value.arithmetic_shr(shift.to::<usize>())
}

/// Valid `JUMPDEST` positions, skipping push immediates.
fn jump_dests(code: &[u8]) -> Vec<bool> {
    let mut dests = vec![false; code.len()];
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        if op == JUMPDEST {
            dests[pc] = true;
        } else if opcode::is_push(op) {
            pc += opcode::push_size(op);
        }
        pc += 1;
    }
    dests
}

fn address_type(state: &WorldState, address: &Address) -> Result<AddressType, StateError> {
    Ok(if state.is_contract(address)? { AddressType::Contract } else { AddressType::Account })
}

enum Step {
    Next,
    Jump(usize),
    Halt,
}

#[derive(Debug)]
struct Interpreter {
    table: GasTable,
    jumps: Vec<bool>,
    stack: Stack,
    memory: Memory,
    return_data: Bytes,
    pc: usize,
}

impl Machine<'_> {
    /// Run the frame's bytecode to completion.
    pub(crate) fn run_stack(&mut self, frame: &mut Frame) -> Result<(), VmError> {
        let table = self.stack_vm()?.gas_table();
        let mut interpreter = Interpreter {
            table,
            jumps: jump_dests(&frame.code),
            stack: Stack::new(),
            memory: Memory::new(),
            return_data: Bytes::new(),
            pc: 0,
        };
        interpreter.run(self, frame)
    }
}

impl Interpreter {
    fn run(&mut self, m: &mut Machine<'_>, frame: &mut Frame) -> Result<(), VmError> {
        let code = frame.code.clone();
        loop {
            if m.interrupted() {
                return Err(VmError::Interrupted);
            }
            let op = code.get(self.pc).copied().unwrap_or(STOP);
            let info = opcode::info(op).ok_or(VmError::InvalidOpcode(op))?;
            self.stack.require(info.pops, info.pushes)?;
            if info.writes && m.read_only() {
                return Err(VmError::WriteProtection);
            }
            frame.use_gas(info.gas)?;

            match self.step(m, frame, &code, op)? {
                Step::Next => self.pc += 1,
                Step::Jump(dest) => self.pc = dest,
                Step::Halt => return Ok(()),
            }
        }
    }

    fn pop_address(&mut self) -> Result<Address, VmError> {
        self.stack.pop().map(to_address)
    }

    fn pop_b256(&mut self) -> Result<B256, VmError> {
        self.stack.pop().map(|w| B256::from(w.to_be_bytes::<32>()))
    }

    /// Charge for and grow memory to cover `[offset, offset + size)`.
    fn expand(&mut self, frame: &mut Frame, offset: U256, size: U256) -> Result<(usize, usize), VmError> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let (Ok(offset), Ok(size)) = (u64::try_from(offset), u64::try_from(size)) else {
            return Err(VmError::GasUintOverflow);
        };
        let end = offset.checked_add(size).ok_or(VmError::GasUintOverflow)?;
        frame.use_gas(memory_expansion(self.memory.len(), end)?)?;
        self.memory.resize(end as usize);
        Ok((offset as usize, size as usize))
    }

    fn jump_target(&self, dest: U256) -> Result<usize, VmError> {
        let dest = usize::try_from(dest).map_err(|_| VmError::InvalidJump)?;
        if self.jumps.get(dest).copied().unwrap_or(false) {
            return Ok(dest);
        }
        Err(VmError::InvalidJump)
    }

    /// Copy `source[data_offset..]` into memory, as `CALLDATACOPY` and friends do.
    fn copy_to_memory(&mut self, frame: &mut Frame, source: &[u8]) -> Result<(), VmError> {
        let mem_offset = self.stack.pop()?;
        let data_offset = self.stack.pop()?;
        let size = self.stack.pop()?;
        let (mem_offset, size) = self.expand(frame, mem_offset, size)?;
        frame.use_gas(copy_cost(size as u64, COPY_GAS)?)?;
        self.memory.set(mem_offset, &padded_slice(source, data_offset, size));
        Ok(())
    }

    fn step(&mut self, m: &mut Machine<'_>, frame: &mut Frame, code: &[u8], op: u8) -> Result<Step, VmError> {
        let s = &mut self.stack;
        match op {
            STOP => return Ok(Step::Halt),
            ADD => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(a.wrapping_add(b))?;
            }
            MUL => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(a.wrapping_mul(b))?;
            }
            SUB => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(a.wrapping_sub(b))?;
            }
            DIV => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(if b.is_zero() { U256::ZERO } else { a / b })?;
            }
            SDIV => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(sdiv(a, b))?;
            }
            MOD => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(if b.is_zero() { U256::ZERO } else { a % b })?;
            }
            SMOD => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(smod(a, b))?;
            }
            ADDMOD => {
                let (a, b, n) = (s.pop()?, s.pop()?, s.pop()?);
                s.push(a.add_mod(b, n))?;
            }
            MULMOD => {
                let (a, b, n) = (s.pop()?, s.pop()?, s.pop()?);
                s.push(a.mul_mod(b, n))?;
            }
            EXP => {
                let (base, exponent) = (s.pop()?, s.pop()?);
                frame.use_gas(exp_cost(&self.table, exponent))?;
                self.stack.push(base.wrapping_pow(exponent))?;
            }
            SIGNEXTEND => {
                let (byte, value) = (s.pop()?, s.pop()?);
                s.push(sign_extend(byte, value))?;
            }

            LT => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(U256::from(a < b))?;
            }
            GT => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(U256::from(a > b))?;
            }
            SLT => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(U256::from(slt(a, b)))?;
            }
            SGT => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(U256::from(slt(b, a)))?;
            }
            EQ => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(U256::from(a == b))?;
            }
            ISZERO => {
                let a = s.pop()?;
                s.push(U256::from(a.is_zero()))?;
            }
            AND => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(a & b)?;
            }
            OR => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(a | b)?;
            }
            XOR => {
                let (a, b) = (s.pop()?, s.pop()?);
                s.push(a ^ b)?;
            }
            NOT => {
                let a = s.pop()?;
                s.push(!a)?;
            }
            BYTE => {
                let (i, x) = (s.pop()?, s.pop()?);
                let byte = if i < U256::from(32) { x.byte(31 - i.to::<usize>()) } else { 0 };
                s.push(U256::from(byte))?;
            }
            SHL => {
                let (shift, value) = (s.pop()?, s.pop()?);
                s.push(if shift < U256::from(256) { value << shift.to::<usize>() } else { U256::ZERO })?;
            }
            SHR => {
                let (shift, value) = (s.pop()?, s.pop()?);
                s.push(if shift < U256::from(256) { value >> shift.to::<usize>() } else { U256::ZERO })?;
            }
            SAR => {
                let (shift, value) = (s.pop()?, s.pop()?);
                s.push(sar(shift, value))?;
            }

            SHA3 => {
                let (offset, size) = (s.pop()?, s.pop()?);
                let (offset, size) = self.expand(frame, offset, size)?;
                frame.use_gas(copy_cost(size as u64, SHA3_WORD_GAS)?)?;
                let hash = keccak256(self.memory.slice(offset, size));
                self.stack.push(U256::from_be_bytes(hash.0))?;
            }

            ADDRESS => s.push(from_address(frame.address))?,
            BALANCE => {
                frame.use_gas(self.table.balance)?;
                let address = self.pop_address()?;
                let balance = m.state().get_balance(&address, &Address::ZERO)?;
                self.stack.push(balance)?;
            }
            ORIGIN => s.push(from_address(m.origin()))?,
            CALLER => s.push(from_address(frame.caller))?,
            CALLVALUE => s.push(if frame.token.is_zero() { frame.value } else { U256::ZERO })?,
            CALLDATALOAD => {
                let offset = s.pop()?;
                s.push(U256::from_be_slice(&padded_slice(&frame.input, offset, 32)))?;
            }
            CALLDATASIZE => s.push(U256::from(frame.input.len()))?,
            CALLDATACOPY => {
                let input = frame.input.clone();
                self.copy_to_memory(frame, &input)?;
            }
            CODESIZE => s.push(U256::from(code.len()))?,
            CODECOPY => self.copy_to_memory(frame, code)?,
            GASPRICE => s.push(m.gas_price())?,
            EXTCODESIZE => {
                frame.use_gas(self.table.ext_code_size)?;
                let address = self.pop_address()?;
                let size = m.state().get_code(&address)?.len();
                self.stack.push(U256::from(size))?;
            }
            EXTCODECOPY => {
                frame.use_gas(self.table.ext_code_copy)?;
                let address = self.pop_address()?;
                let ext = m.state().get_code(&address)?;
                self.copy_to_memory(frame, &ext)?;
            }
            RETURNDATASIZE => s.push(U256::from(self.return_data.len()))?,
            RETURNDATACOPY => {
                let (mem_offset, data_offset, size) = (s.pop()?, s.pop()?, s.pop()?);
                let end = data_offset.checked_add(size).ok_or(VmError::ReturnDataOutOfBounds)?;
                if end > U256::from(self.return_data.len()) {
                    return Err(VmError::ReturnDataOutOfBounds);
                }
                let (mem_offset, size) = self.expand(frame, mem_offset, size)?;
                frame.use_gas(copy_cost(size as u64, COPY_GAS)?)?;
                let start = data_offset.to::<usize>();
                self.memory.set(mem_offset, &self.return_data[start..start + size]);
            }
            EXTCODEHASH => {
                frame.use_gas(self.table.ext_code_size)?;
                let address = self.pop_address()?;
                let hash = m.state().get_code_hash(&address)?;
                self.stack.push(U256::from_be_bytes(hash.0))?;
            }

            BLOCKHASH => {
                let number = s.pop()?;
                let hash = u64::try_from(number).map(|n| m.block().block_hash(n)).unwrap_or_default();
                s.push(U256::from_be_bytes(hash.0))?;
            }
            COINBASE => s.push(from_address(m.block().coinbase))?,
            TIMESTAMP => s.push(U256::from(m.block().time))?,
            NUMBER => s.push(U256::from(m.block().number))?,
            DIFFICULTY => s.push(U256::ZERO)?,
            GASLIMIT => s.push(U256::from(m.block().gas_limit))?,

            POP => {
                s.pop()?;
            }
            MLOAD => {
                let offset = s.pop()?;
                let (offset, _) = self.expand(frame, offset, U256::from(32))?;
                let word = self.memory.word(offset);
                self.stack.push(word)?;
            }
            MSTORE => {
                let (offset, value) = (s.pop()?, s.pop()?);
                let (offset, _) = self.expand(frame, offset, U256::from(32))?;
                self.memory.set_word(offset, value);
            }
            MSTORE8 => {
                let (offset, value) = (s.pop()?, s.pop()?);
                let (offset, _) = self.expand(frame, offset, U256::from(1))?;
                self.memory.set_byte(offset, value.byte(0));
            }
            SLOAD => {
                frame.use_gas(self.table.sload)?;
                let key = self.pop_b256()?;
                let value = m.state().get_storage(&frame.address, &key)?;
                self.stack.push(U256::try_from_be_slice(&value).unwrap_or_default())?;
            }
            SSTORE => {
                let key = self.pop_b256()?;
                let value = self.stack.pop()?;
                let current = m.state().get_storage(&frame.address, &key)?;
                let was_set = current.iter().any(|b| *b != 0);
                if !was_set && !value.is_zero() {
                    frame.use_gas(SSTORE_SET_GAS)?;
                } else {
                    frame.use_gas(SSTORE_RESET_GAS)?;
                }
                if was_set && value.is_zero() {
                    m.state_mut().add_refund(SSTORE_CLEAR_REFUND);
                }
                let stored =
                    if value.is_zero() { Bytes::new() } else { Bytes::copy_from_slice(&value.to_be_bytes::<32>()) };
                m.state_mut().set_storage(frame.address, key, stored)?;
            }
            JUMP => {
                let dest = s.pop()?;
                return self.jump_target(dest).map(Step::Jump);
            }
            JUMPI => {
                let (dest, cond) = (s.pop()?, s.pop()?);
                if !cond.is_zero() {
                    return self.jump_target(dest).map(Step::Jump);
                }
            }
            PC => s.push(U256::from(self.pc))?,
            MSIZE => s.push(U256::from(self.memory.len()))?,
            GAS => s.push(U256::from(frame.gas))?,
            JUMPDEST => {}

            PUSH1..=PUSH32 => {
                let size = opcode::push_size(op);
                let data = padded_slice(code, U256::from(self.pc + 1), size);
                s.push(U256::from_be_slice(&data))?;
                self.pc += size;
            }
            DUP1..=DUP16 => s.dup((op - DUP1) as usize + 1)?,
            SWAP1..=SWAP16 => s.swap((op - SWAP1) as usize + 1)?,
            LOG0..=LOG4 => self.log(m, frame, (op - LOG0) as usize)?,

            ISSUE => {
                frame.use_gas(ISSUE_GAS)?;
                let amount = s.pop()?;
                let token = frame.code_address;
                m.state_mut().add_balance(frame.address, token, amount)?;
                m.record(BalanceRecord::new(
                    Address::ZERO,
                    frame.address,
                    AddressType::Empty,
                    AddressType::Contract,
                    RecordKind::Issue,
                    token,
                    amount,
                ));
            }
            BALANCE_TOKEN => {
                frame.use_gas(self.table.balance)?;
                let token = self.pop_address()?;
                let address = self.pop_address()?;
                let balance = m.state().get_balance(&address, &token)?;
                self.stack.push(balance)?;
            }
            CALL_TOKEN_ADDRESS => s.push(from_address(frame.token))?,
            TRANSFER_TOKEN => {
                let amount = s.pop()?;
                let token = self.pop_address()?;
                let to = self.pop_address()?;
                let mut gas = TRANSFER_TOKEN_GAS;
                if !m.state().exist(&to)? {
                    gas += CALL_NEW_ACCOUNT_GAS;
                }
                frame.use_gas(gas)?;
                if !amount.is_zero() {
                    if m.state().get_balance(&frame.address, &token)? < amount {
                        return Err(VmError::Reverted);
                    }
                    let to_type = address_type(m.state(), &to)?;
                    m.state_mut().sub_balance(frame.address, token, amount)?;
                    m.state_mut().add_balance(to, token, amount)?;
                    m.record(BalanceRecord::new(
                        frame.address,
                        to,
                        AddressType::Contract,
                        to_type,
                        RecordKind::Contract,
                        token,
                        amount,
                    ));
                }
            }
            MSG_TOKEN_VALUE => s.push(if frame.token.is_zero() { U256::ZERO } else { frame.value })?,

            CREATE | CREATE2 => self.create(m, frame, op)?,
            CALL | CALLCODE | DELEGATECALL | STATICCALL => self.call(m, frame, op)?,
            RETURN | REVERT => {
                let (offset, size) = (s.pop()?, s.pop()?);
                let (offset, size) = self.expand(frame, offset, size)?;
                frame.output = Bytes::copy_from_slice(self.memory.slice(offset, size));
                if op == REVERT {
                    return Err(VmError::Reverted);
                }
                return Ok(Step::Halt);
            }
            SELFDESTRUCT => {
                self.self_destruct(m, frame)?;
                return Ok(Step::Halt);
            }
            _ => return Err(VmError::InvalidOpcode(op)),
        }
        Ok(Step::Next)
    }

    fn log(&mut self, m: &mut Machine<'_>, frame: &mut Frame, topic_count: usize) -> Result<(), VmError> {
        let (offset, size) = (self.stack.pop()?, self.stack.pop()?);
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            topics.push(self.pop_b256()?);
        }
        let (offset, size) = self.expand(frame, offset, size)?;
        let data_gas = LOG_DATA_GAS.checked_mul(size as u64).ok_or(VmError::GasUintOverflow)?;
        frame.use_gas(LOG_TOPIC_GAS * topic_count as u64)?;
        frame.use_gas(data_gas)?;

        let (height, time) = (m.block().number, m.block().time);
        m.state_mut().add_log(Log {
            address: frame.address,
            topics,
            data: Bytes::copy_from_slice(self.memory.slice(offset, size)),
            height,
            time,
            ..Default::default()
        });
        Ok(())
    }

    fn create(&mut self, m: &mut Machine<'_>, frame: &mut Frame, op: u8) -> Result<(), VmError> {
        let value = self.stack.pop()?;
        let (offset, size) = (self.stack.pop()?, self.stack.pop()?);
        let salt = if op == CREATE2 { Some(self.pop_b256()?) } else { None };
        let (offset, size) = self.expand(frame, offset, size)?;
        if salt.is_some() {
            frame.use_gas(copy_cost(size as u64, SHA3_WORD_GAS)?)?;
        }

        let init = Bytes::copy_from_slice(self.memory.slice(offset, size));
        let mut gas = frame.gas;
        if self.table.caps_call_gas() {
            gas -= gas / 64;
        }
        frame.use_gas(gas)?;

        let outcome = match salt {
            Some(salt) => m.create2(frame.address, init, gas, value, salt)?,
            None => m.create(frame.address, init, gas, value)?,
        };
        trace!(address = %outcome.address, ok = outcome.is_success(), "nested create");

        self.stack.push(if outcome.is_success() { from_address(outcome.address) } else { U256::ZERO })?;
        frame.gas = frame.gas.saturating_add(outcome.gas_left);
        frame.byte_code_gas = frame.byte_code_gas.saturating_add(outcome.byte_code_gas);
        self.return_data =
            if matches!(outcome.error, Some(VmError::Reverted)) { outcome.output } else { Bytes::new() };
        Ok(())
    }

    fn call(&mut self, m: &mut Machine<'_>, frame: &mut Frame, op: u8) -> Result<(), VmError> {
        let requested = self.stack.pop()?;
        let to = self.pop_address()?;
        let value = if matches!(op, CALL | CALLCODE) { self.stack.pop()? } else { U256::ZERO };
        let (in_offset, in_size) = (self.stack.pop()?, self.stack.pop()?);
        let (out_offset, out_size) = (self.stack.pop()?, self.stack.pop()?);
        if op == CALL && !value.is_zero() && m.read_only() {
            return Err(VmError::WriteProtection);
        }
        let (in_offset, in_size) = self.expand(frame, in_offset, in_size)?;
        let (out_offset, out_size) = self.expand(frame, out_offset, out_size)?;

        let fee_mark = m.fee_mark();
        let mut base = self.table.calls;
        if !value.is_zero() {
            base += CALL_VALUE_TRANSFER_GAS;
            if op == CALL {
                if m.state().empty(&to)? {
                    base += CALL_NEW_ACCOUNT_GAS;
                }
                let fee = if m.state().is_contract(&to)? {
                    cal_new_contract_amount_gas(value)
                } else {
                    cal_new_amount_gas(value)
                };
                m.push_fee(fee);
                base = base.checked_add(fee).ok_or(VmError::GasUintOverflow)?;
            }
        }
        frame.use_gas(base)?;
        let mut gas = call_gas(&self.table, frame.gas, 0, requested)?;
        frame.use_gas(gas)?;
        if !value.is_zero() {
            gas += CALL_STIPEND;
        }

        let input = Bytes::copy_from_slice(self.memory.slice(in_offset, in_size));
        let outcome = match op {
            CALL => m.call(frame.address, to, Address::ZERO, input, gas, value)?,
            CALLCODE => m.call_code(frame.address, to, input, gas, value)?,
            DELEGATECALL => m.delegate_call(frame.caller, frame.address, to, input, gas, frame.value)?,
            _ => m.static_call(frame.address, to, input, gas)?,
        };

        let success = outcome.is_success();
        if success || matches!(outcome.error, Some(VmError::Reverted)) {
            let copied = outcome.output.len().min(out_size);
            self.memory.set(out_offset, &outcome.output[..copied]);
        }
        if !success {
            m.refund_fees_from(fee_mark);
        }
        self.stack.push(U256::from(success))?;
        frame.gas = frame.gas.saturating_add(outcome.gas_left);
        frame.byte_code_gas = frame.byte_code_gas.saturating_add(outcome.byte_code_gas);
        self.return_data = outcome.output;
        Ok(())
    }

    fn self_destruct(&mut self, m: &mut Machine<'_>, frame: &mut Frame) -> Result<(), VmError> {
        let beneficiary = self.pop_address()?;
        let mut gas = self.table.suicide;
        if self.table.create_by_suicide > 0
            && !m.state().exist(&beneficiary)?
            && !m.state().get_balance(&frame.address, &Address::ZERO)?.is_zero()
        {
            gas += self.table.create_by_suicide;
        }
        frame.use_gas(gas)?;

        if !m.state().has_suicided(&frame.address)? {
            m.state_mut().add_refund(SELFDESTRUCT_REFUND);
        }
        let to_type = address_type(m.state(), &beneficiary)?;
        for (token, amount) in m.state().get_token_balances(&frame.address)? {
            m.state_mut().add_balance(beneficiary, token, amount)?;
            m.record(BalanceRecord::new(
                frame.address,
                beneficiary,
                AddressType::Contract,
                to_type,
                RecordKind::Contract,
                token,
                amount,
            ));
        }
        m.state_mut().suicide(frame.address)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hyla_backend::MemoryStore;
    use hyla_primitives::create_address;
    use rstest::rstest;

    use super::*;
    use crate::{BlockContext, CallOutcome, Message, VmConfig};

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);
    const CONTRACT: Address = Address::repeat_byte(0xcc);
    const TOKEN: Address = Address::repeat_byte(0x70);
    const GAS: u64 = 1_000_000;

    fn neg(n: u64) -> U256 {
        U256::from(n).wrapping_neg()
    }

    fn state_with(code: &[u8]) -> WorldState {
        let mut state = WorldState::new(Arc::new(MemoryStore::new()));
        state.add_balance(ALICE, Address::ZERO, U256::from(1_000)).unwrap();
        state.set_code(CONTRACT, Bytes::copy_from_slice(code)).unwrap();
        state
    }

    fn call(state: &mut WorldState, gas: u64) -> CallOutcome {
        let block = BlockContext::new(Address::repeat_byte(0xcb), 42, 1_700, 8_000_000);
        let mut machine = Machine::new(state, block, &VmConfig::default());
        machine.reset(&Message::new(ALICE, U256::from(3), Address::ZERO));
        machine.call(ALICE, CONTRACT, Address::ZERO, Bytes::new(), gas, U256::ZERO).unwrap()
    }

    fn run(code: &[u8]) -> (CallOutcome, WorldState) {
        let mut state = state_with(code);
        let outcome = call(&mut state, GAS);
        (outcome, state)
    }

    fn word(output: &[u8]) -> U256 {
        U256::from_be_slice(output)
    }

    #[rstest]
    #[case(neg(8), U256::from(2), neg(4))]
    #[case(U256::from(8), neg(2), neg(4))]
    #[case(neg(8), neg(2), U256::from(4))]
    #[case(U256::from(7), U256::ZERO, U256::ZERO)]
    fn signed_division(#[case] a: U256, #[case] b: U256, #[case] expected: U256) {
        assert_eq!(sdiv(a, b), expected);
    }

    #[test]
    fn signed_helpers() {
        assert_eq!(smod(neg(7), U256::from(3)), neg(1));
        assert_eq!(smod(U256::from(7), neg(3)), U256::from(1));
        assert!(slt(neg(1), U256::ZERO));
        assert!(!slt(U256::ZERO, neg(1)));
        assert_eq!(sign_extend(U256::ZERO, U256::from(0xff)), U256::MAX);
        assert_eq!(sign_extend(U256::ZERO, U256::from(0x7f)), U256::from(0x7f));
        assert_eq!(sar(U256::from(1), neg(4)), neg(2));
        assert_eq!(sar(U256::from(300), neg(4)), U256::MAX);
    }

    #[test]
    fn jump_analysis_skips_push_data() {
        let dests = jump_dests(&[0x60, JUMPDEST, JUMPDEST, 0x7f]);
        assert_eq!(dests, vec![false, false, true, false]);
    }

    #[test]
    fn add_and_return() {
        // 3 + 4, stored at 0 and returned.
        let (outcome, _) = run(&[0x60, 0x03, 0x60, 0x04, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3]);
        assert!(outcome.is_success());
        assert_eq!(word(&outcome.output), U256::from(7));
    }

    #[test]
    fn sstore_charges_and_persists() {
        let (outcome, state) = run(&[0x60, 0x2a, 0x60, 0x01, 0x55]);
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, GAS - 3 - 3 - SSTORE_SET_GAS);
        let stored = state.get_storage(&CONTRACT, &B256::with_last_byte(1)).unwrap();
        assert_eq!(word(&stored), U256::from(42));
    }

    #[test]
    fn sstore_clear_refunds() {
        let mut state = state_with(&[0x60, 0x00, 0x60, 0x01, 0x55]);
        state.set_storage(CONTRACT, B256::with_last_byte(1), Bytes::copy_from_slice(&[1u8; 32])).unwrap();
        let outcome = call(&mut state, GAS);
        assert!(outcome.is_success());
        assert_eq!(state.get_refund(), SSTORE_CLEAR_REFUND);
        assert!(state.get_storage(&CONTRACT, &B256::with_last_byte(1)).unwrap().is_empty());
    }

    #[test]
    fn revert_keeps_gas_and_data() {
        let (outcome, _) = run(&[0x60, 0xaa, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xfd]);
        assert!(matches!(outcome.error, Some(VmError::Reverted)));
        assert_eq!(outcome.output, Bytes::from_static(&[0xaa]));
        assert_eq!(outcome.gas_left, GAS - 18);
    }

    #[rstest]
    #[case::past_end(&[0x60, 0x03, 0x56])]
    #[case::into_push_data(&[0x60, 0x5b, 0x60, 0x01, 0x56])]
    fn invalid_jumps(#[case] code: &[u8]) {
        let (outcome, _) = run(code);
        assert!(matches!(outcome.error, Some(VmError::InvalidJump)));
        assert_eq!(outcome.gas_left, 0);
    }

    #[test]
    fn jump_to_dest() {
        let (outcome, _) = run(&[0x60, 0x04, 0x56, 0xfe, 0x5b, 0x00]);
        assert!(outcome.is_success());
    }

    #[test]
    fn stack_underflow() {
        let (outcome, _) = run(&[0x01]);
        assert!(matches!(outcome.error, Some(VmError::StackUnderflow { have: 0, need: 2 })));
    }

    #[test]
    fn failed_call_reverts_state() {
        // Store then hit an invalid opcode.
        let (outcome, state) = run(&[0x60, 0x2a, 0x60, 0x01, 0x55, 0xfe]);
        assert!(matches!(outcome.error, Some(VmError::InvalidOpcode(0xfe))));
        assert!(state.get_storage(&CONTRACT, &B256::with_last_byte(1)).unwrap().is_empty());
    }

    #[test]
    fn static_call_rejects_writes() {
        let mut state = state_with(&[0x60, 0x2a, 0x60, 0x01, 0x55]);
        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        let outcome = machine.static_call(ALICE, CONTRACT, Bytes::new(), GAS).unwrap();
        assert!(matches!(outcome.error, Some(VmError::WriteProtection)));
        assert!(!machine.read_only());
    }

    #[test]
    fn context_opcodes() {
        // NUMBER, TIMESTAMP and GASPRICE written to consecutive words.
        let code = [
            0x43, 0x60, 0x00, 0x52, 0x42, 0x60, 0x20, 0x52, 0x3a, 0x60, 0x40, 0x52, 0x60, 0x60, 0x60, 0x00, 0xf3,
        ];
        let (outcome, _) = run(&code);
        assert!(outcome.is_success());
        assert_eq!(word(&outcome.output[..32]), U256::from(42));
        assert_eq!(word(&outcome.output[32..64]), U256::from(1_700));
        assert_eq!(word(&outcome.output[64..]), U256::from(3));
    }

    #[test]
    fn token_call_value() {
        // CALLVALUE then MSG_TOKEN_VALUE.
        let code = [0x34, 0x60, 0x00, 0x52, 0xc4, 0x60, 0x20, 0x52, 0x60, 0x40, 0x60, 0x00, 0xf3];
        let mut state = state_with(&code);
        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        machine.reset(&Message::new(ALICE, U256::from(1), TOKEN));
        let outcome = machine.utxo_call(ALICE, CONTRACT, TOKEN, Bytes::new(), GAS, U256::from(9)).unwrap();
        assert!(outcome.is_success());
        assert_eq!(word(&outcome.output[..32]), U256::ZERO);
        assert_eq!(word(&outcome.output[32..]), U256::from(9));
    }

    #[test]
    fn issue_mints_contract_token() {
        let mut state = state_with(&[0x60, 0x64, 0xc0, 0x00]);
        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        let outcome = machine.call(ALICE, CONTRACT, Address::ZERO, Bytes::new(), GAS, U256::ZERO).unwrap();
        assert!(outcome.is_success());
        assert_eq!(machine.otxs().len(), 1);
        assert_eq!(machine.otxs()[0].kind, RecordKind::Issue);
        drop(machine);
        assert_eq!(state.get_balance(&CONTRACT, &CONTRACT).unwrap(), U256::from(100));
    }

    #[test]
    fn log_records_topics() {
        let (outcome, state) = run(&[0x60, 0x07, 0x60, 0x00, 0x60, 0x00, 0xa1]);
        assert!(outcome.is_success());
        let logs = state.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].address, CONTRACT);
        assert_eq!(logs[0].topics, vec![B256::with_last_byte(7)]);
        assert_eq!(logs[0].height, 42);
    }

    fn call_bob_with_value(value: u8) -> Vec<u8> {
        let mut code = vec![0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, value, 0x73];
        code.extend_from_slice(BOB.as_slice());
        code.extend_from_slice(&[0x61, 0xff, 0xff, 0xf1, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3]);
        code
    }

    #[test]
    fn nested_value_call_charges_fee() {
        let mut state = state_with(&call_bob_with_value(1));
        state.add_balance(CONTRACT, Address::ZERO, U256::from(1)).unwrap();
        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        let outcome = machine.call(ALICE, CONTRACT, Address::ZERO, Bytes::new(), 2_000_000, U256::ZERO).unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(word(&outcome.output), U256::from(1));
        assert_eq!(machine.otxs().len(), 1);
        assert_eq!(machine.otxs()[0].kind, RecordKind::Contract);
        assert_eq!(machine.refund_all_fee(), cal_new_amount_gas(U256::from(1)));
        assert_eq!(machine.refund_fee(), 0);
        drop(machine);
        assert_eq!(state.get_balance(&BOB, &Address::ZERO).unwrap(), U256::from(1));
    }

    #[test]
    fn failed_nested_call_refunds_fee() {
        let mut state = state_with(&call_bob_with_value(2));
        state.add_balance(CONTRACT, Address::ZERO, U256::from(1)).unwrap();
        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        let outcome = machine.call(ALICE, CONTRACT, Address::ZERO, Bytes::new(), 2_000_000, U256::ZERO).unwrap();
        assert!(outcome.is_success());
        assert_eq!(word(&outcome.output), U256::ZERO);
        assert!(machine.otxs().is_empty());
        assert_eq!(machine.refund_fee(), cal_new_amount_gas(U256::from(2)));
    }

    #[test]
    fn nested_create() {
        // PUSH10 <init> PUSH1 0 MSTORE; CREATE(0, 22, 10); return the address.
        let init = [0x60, 0xfe, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];
        let mut code = vec![0x69];
        code.extend_from_slice(&init);
        code.extend_from_slice(&[
            0x60, 0x00, 0x52, 0x60, 0x0a, 0x60, 0x16, 0x60, 0x00, 0xf0, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00,
            0xf3,
        ]);
        let (outcome, state) = run(&code);
        assert!(outcome.is_success(), "{:?}", outcome.error);

        let created = create_address(&CONTRACT, 0);
        assert_eq!(to_address(word(&outcome.output)), created);
        assert_eq!(state.get_code(&created).unwrap(), Bytes::from_static(&[0xfe]));
        assert_eq!(state.get_nonce(&CONTRACT).unwrap(), 1);
    }

    #[test]
    fn self_destruct_moves_every_balance() {
        let mut code = vec![0x73];
        code.extend_from_slice(BOB.as_slice());
        code.push(0xff);
        let mut state = state_with(&code);
        state.add_balance(CONTRACT, Address::ZERO, U256::from(5)).unwrap();
        state.add_balance(CONTRACT, TOKEN, U256::from(3)).unwrap();

        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        let outcome = machine.call(ALICE, CONTRACT, Address::ZERO, Bytes::new(), GAS, U256::ZERO).unwrap();
        assert!(outcome.is_success());
        assert_eq!(machine.otxs().len(), 2);
        drop(machine);

        assert!(state.has_suicided(&CONTRACT).unwrap());
        assert_eq!(state.get_balance(&BOB, &Address::ZERO).unwrap(), U256::from(5));
        assert_eq!(state.get_balance(&BOB, &TOKEN).unwrap(), U256::from(3));
        assert_eq!(state.get_refund(), SELFDESTRUCT_REFUND);
    }

    #[test]
    fn abort_flag_interrupts_loops() {
        let mut state = state_with(&[0x5b, 0x60, 0x00, 0x56]);
        let mut machine = Machine::new(&mut state, BlockContext::default(), &VmConfig::default());
        machine.cancel();
        let outcome = machine.call(ALICE, CONTRACT, Address::ZERO, Bytes::new(), GAS, U256::ZERO).unwrap();
        assert!(matches!(outcome.error, Some(VmError::Interrupted)));
    }

    #[test]
    fn infinite_loop_runs_out_of_gas() {
        let (outcome, _) = run(&[0x5b, 0x60, 0x00, 0x56]);
        assert!(matches!(outcome.error, Some(VmError::OutOfGas)));
        assert_eq!(outcome.gas_left, 0);
    }
}
