//! Per-transaction state transition.

use std::collections::HashSet;

use alloy_primitives::{Address, Bytes, U256};
use hyla_domain::{
    AddressType, BalanceRecord, CONTRACT_TX_GAS, KeyImage, MULTI_SIGN_NONCE_ADDRESS, RecordKind, SignersInfo,
    Transaction, TxKind, TxOutput, UtxoInput, UtxoKind, UtxoTx,
};
use hyla_primitives::{
    PAR_GAS_PRICE, SystemContract, cal_new_contract_amount_gas, gas_fee, intrinsic_gas, is_wasm_code,
};
use hyla_state::WorldState;
use hyla_vm::{Machine, Message, VmError};
use tracing::{debug, trace};

use crate::{Blacklist, TransitionError, TransitionOutcome, required_utxo_fee};

/// Value source of a transaction.
#[derive(Debug)]
enum Input {
    Account { from: Address, amount: U256 },
    Utxo,
}

/// Value sink of a transaction.
#[derive(Debug)]
enum Output<'a> {
    Account { to: Address, amount: U256 },
    Contract { to: Address, amount: U256, data: &'a Bytes },
    Create { amount: U256, code: &'a Bytes },
    Upgrade { contract: Address, code: &'a Bytes },
    Signers { kind: TxKind, info: &'a SignersInfo },
    Utxo { amount: U256 },
}

/// A transaction as inputs and outputs in a single token.
#[derive(Debug)]
struct TxMessage<'a> {
    kind: TxKind,
    token: Address,
    sender: Option<Address>,
    nonce: u64,
    inputs: Vec<Input>,
    outputs: Vec<Output<'a>>,
    gas: u64,
    gas_price: U256,
    utxo_kind: Option<UtxoKind>,
    native: bool,
}

fn account_output<'a>(
    state: &WorldState,
    to: Address,
    amount: U256,
    data: &'a Bytes,
) -> Result<Output<'a>, TransitionError> {
    if state.is_contract(&to)? {
        Ok(Output::Contract { to, amount, data })
    } else {
        Ok(Output::Account { to, amount })
    }
}

impl<'a> TxMessage<'a> {
    fn new(state: &WorldState, tx: &'a Transaction, sender: Option<Address>) -> Result<Self, TransitionError> {
        let par = U256::from(PAR_GAS_PRICE);
        let kind = tx.kind();
        let msg = match tx {
            Transaction::Transfer(tx) | Transaction::TokenTransfer(tx) => {
                let from = sender.ok_or(TransitionError::MissingSender)?;
                let output = match tx.to {
                    Some(to) => account_output(state, to, tx.value, &tx.data)?,
                    None => Output::Create { amount: tx.value, code: &tx.data },
                };
                Self {
                    kind,
                    token: tx.token,
                    sender: Some(from),
                    nonce: tx.nonce,
                    inputs: vec![Input::Account { from, amount: tx.value }],
                    outputs: vec![output],
                    gas: tx.gas_limit,
                    gas_price: tx.gas_price,
                    utxo_kind: None,
                    native: tx.is_native(),
                }
            }
            Transaction::ContractCreate(tx) => Self {
                kind,
                token: Address::ZERO,
                sender: Some(tx.from),
                nonce: tx.nonce,
                inputs: vec![Input::Account { from: tx.from, amount: tx.value }],
                outputs: vec![Output::Create { amount: tx.value, code: &tx.code }],
                gas: CONTRACT_TX_GAS,
                gas_price: par,
                utxo_kind: None,
                native: true,
            },
            Transaction::ContractUpgrade(tx) => {
                if !state.is_contract(&tx.contract)? {
                    return Err(TransitionError::NotContract(tx.contract));
                }
                Self {
                    kind,
                    token: Address::ZERO,
                    sender: Some(tx.from),
                    nonce: tx.nonce,
                    inputs: vec![Input::Account { from: tx.from, amount: U256::ZERO }],
                    outputs: vec![Output::Upgrade { contract: tx.contract, code: &tx.code }],
                    gas: CONTRACT_TX_GAS,
                    gas_price: par,
                    utxo_kind: None,
                    native: true,
                }
            }
            Transaction::MultiSignAccount(multi) => Self {
                kind,
                token: Address::ZERO,
                sender: Some(MULTI_SIGN_NONCE_ADDRESS),
                nonce: multi.nonce,
                inputs: Vec::new(),
                outputs: vec![Output::Signers { kind: multi.kind, info: &multi.signers }],
                gas: 0,
                gas_price: par,
                utxo_kind: None,
                native: true,
            },
            Transaction::Utxo(tx) => Self::from_utxo(state, tx, sender)?,
        };
        Ok(msg)
    }

    fn from_utxo(state: &WorldState, tx: &'a UtxoTx, sender: Option<Address>) -> Result<Self, TransitionError> {
        let inputs = tx
            .inputs
            .iter()
            .map(|input| match input {
                UtxoInput::Account { amount, .. } => {
                    let from = sender.ok_or(TransitionError::MissingSender)?;
                    Ok(Input::Account { from, amount: *amount })
                }
                UtxoInput::Utxo(_) => Ok(Input::Utxo),
            })
            .collect::<Result<Vec<_>, TransitionError>>()?;
        let outputs = tx
            .outputs
            .iter()
            .map(|output| match output {
                TxOutput::Account { to, amount, data } => account_output(state, *to, *amount, data),
                TxOutput::Utxo { amount, .. } => Ok(Output::Utxo { amount: *amount }),
            })
            .collect::<Result<Vec<_>, TransitionError>>()?;
        Ok(Self {
            kind: TxKind::Utxo,
            token: tx.token,
            sender: tx.account_input().and(sender),
            nonce: tx.account_input().map_or(0, |(nonce, _)| nonce),
            inputs,
            outputs,
            gas: tx.gas(),
            gas_price: U256::from(PAR_GAS_PRICE),
            utxo_kind: Some(tx.kind()),
            native: tx.is_native(),
        })
    }

    /// Whether the transaction pays for the gas it uses.
    const fn charges_gas(&self) -> bool {
        matches!(self.kind, TxKind::Transfer | TxKind::TokenTransfer | TxKind::Utxo)
    }

    /// Whether gas is bought from the sender's native balance up front.
    ///
    /// Native UTXO transactions pay their fee out of their inputs.
    const fn buys_gas(&self) -> bool {
        self.charges_gas() && self.sender.is_some() && !(self.utxo_kind.is_some() && self.native)
    }

    fn payer(&self) -> (Address, AddressType) {
        match self.sender {
            Some(sender) => (sender, AddressType::Account),
            None => (Address::ZERO, AddressType::Private),
        }
    }

    fn intrinsic_gas(&self, state: &WorldState, wasm_rate: u64) -> Result<u64, TransitionError> {
        let rate_for = |code: &[u8]| if is_wasm_code(code) { wasm_rate.max(1) } else { 1 };
        let mut total = 0u64;
        for output in &self.outputs {
            let gas = match output {
                Output::Create { code, .. } | Output::Upgrade { code, .. } => {
                    intrinsic_gas(code, true, rate_for(&code[..]))
                }
                Output::Contract { to, data, .. } => {
                    let code = state.get_code(to)?;
                    intrinsic_gas(data, false, rate_for(&code[..]))
                }
                Output::Account { .. } | Output::Signers { .. } | Output::Utxo { .. } => continue,
            };
            total = gas.and_then(|gas| total.checked_add(gas)).ok_or(TransitionError::GasOverflow)?;
        }
        Ok(total)
    }

    fn runs_code(&self) -> bool {
        self.outputs
            .iter()
            .any(|output| matches!(output, Output::Contract { .. } | Output::Create { .. } | Output::Upgrade { .. }))
    }

    /// Gas owed for moving value, out of `gas` left after the intrinsic charge.
    ///
    /// Transactions that run no code pay everything they bought.
    fn transfer_gas(&self, gas: u64) -> u64 {
        if !self.runs_code() {
            return gas;
        }
        if !self.native {
            return 0;
        }
        self.outputs
            .iter()
            .filter_map(|output| match output {
                Output::Contract { amount, .. } => Some(cal_new_contract_amount_gas(*amount)),
                _ => None,
            })
            .fold(0u64, u64::saturating_add)
    }

    fn account_input_amount(&self) -> U256 {
        self.inputs
            .iter()
            .filter_map(|input| match input {
                Input::Account { amount, .. } => Some(*amount),
                Input::Utxo => None,
            })
            .fold(U256::ZERO, U256::saturating_add)
    }

    fn account_output_amount(&self) -> U256 {
        self.outputs
            .iter()
            .filter_map(|output| match output {
                Output::Account { amount, .. } | Output::Contract { amount, .. } => Some(*amount),
                _ => None,
            })
            .fold(U256::ZERO, U256::saturating_add)
    }
}

/// Applies the transactions of one block in order.
///
/// Tracks the key images spent so far in the block.
#[derive(Debug)]
pub struct Transition {
    blacklist: Blacklist,
    wasm_gas_rate: u64,
    utxo_fee: u64,
    spent: HashSet<KeyImage>,
}

impl Transition {
    /// Transition for a block, with the Wasm gas rate and the UTXO fee coefficient.
    pub fn new(blacklist: Blacklist, wasm_gas_rate: u64, utxo_fee: u64) -> Self {
        Self { blacklist, wasm_gas_rate, utxo_fee, spent: HashSet::new() }
    }

    /// Key images spent by the transactions applied so far.
    pub const fn spent(&self) -> &HashSet<KeyImage> {
        &self.spent
    }

    /// Apply `tx`, sent by `sender`, to the machine's state.
    ///
    /// An error rejects the transaction and leaves the state partially written; the caller
    /// must discard it.
    pub fn apply(
        &mut self,
        machine: &mut Machine<'_>,
        tx: &Transaction,
        sender: Option<Address>,
    ) -> Result<TransitionOutcome, TransitionError> {
        if let Transaction::Utxo(utxo) = tx {
            self.check_utxo(utxo)?;
        }
        let msg = TxMessage::new(machine.state(), tx, sender)?;
        let (payer, _) = msg.payer();
        machine.reset(&Message::new(payer, msg.gas_price, msg.token));
        self.run(machine, &msg)
    }

    fn check_utxo(&mut self, tx: &UtxoTx) -> Result<(), TransitionError> {
        let need = required_utxo_fee(tx, self.utxo_fee);
        if tx.fee < need {
            return Err(TransitionError::UtxoFeeTooLow { have: tx.fee, need });
        }
        for image in tx.key_images() {
            if !self.spent.insert(image) {
                return Err(TransitionError::DoubleSpend(image));
            }
        }
        Ok(())
    }

    fn run(&self, machine: &mut Machine<'_>, msg: &TxMessage<'_>) -> Result<TransitionOutcome, TransitionError> {
        let (payer, payer_type) = msg.payer();
        let next_nonce = match msg.sender {
            Some(sender) => {
                check_nonce(machine.state(), sender, msg.nonce)?;
                Some((sender, msg.nonce.checked_add(1).ok_or(TransitionError::NonceOverflow(sender))?))
            }
            None => None,
        };
        if msg.buys_gas() {
            buy_gas(machine.state_mut(), payer, gas_fee(msg.gas, msg.gas_price))?;
        }
        let intrinsic = msg.intrinsic_gas(machine.state(), self.wasm_gas_rate)?;
        let mut gas =
            msg.gas.checked_sub(intrinsic).ok_or(TransitionError::IntrinsicGas { have: msg.gas, need: intrinsic })?;

        let snapshot = machine.state_mut().snapshot();
        let mut outcome = TransitionOutcome::default();
        let mut records = Vec::new();
        let mut vm_err = None;

        let mut transfer_gas = msg.transfer_gas(gas);
        if transfer_gas > gas {
            vm_err = Some(VmError::OutOfGas);
            transfer_gas = 0;
            gas = 0;
        } else {
            gas -= transfer_gas;
        }
        if vm_err.is_none() {
            vm_err = debit_inputs(machine.state_mut(), msg)?;
        }

        if vm_err.is_none() {
            for output in &msg.outputs {
                match output {
                    Output::Account { to, amount } => {
                        machine.state_mut().add_balance(*to, msg.token, *amount)?;
                        records.push(BalanceRecord::new(
                            payer,
                            *to,
                            payer_type,
                            AddressType::Account,
                            RecordKind::Transfer,
                            msg.token,
                            *amount,
                        ));
                    }
                    Output::Utxo { amount } => records.push(BalanceRecord::new(
                        payer,
                        Address::ZERO,
                        payer_type,
                        AddressType::Utxo,
                        RecordKind::Transfer,
                        msg.token,
                        *amount,
                    )),
                    Output::Contract { to, amount, data } => {
                        outcome.payloads.push((*data).clone());
                        let call = machine.utxo_call(payer, *to, msg.token, (*data).clone(), gas, *amount)?;
                        gas = call.gas_left;
                        outcome.byte_code_gas += call.byte_code_gas;
                        outcome.output = call.output;
                        if let Some(err) = call.error {
                            gas = gas.saturating_add(machine.refund_all_fee());
                            vm_err = Some(err);
                            break;
                        }
                        gas = gas.saturating_add(machine.refund_fee());
                        if !amount.is_zero() {
                            records.push(BalanceRecord::new(
                                payer,
                                *to,
                                payer_type,
                                AddressType::Contract,
                                RecordKind::Transfer,
                                msg.token,
                                *amount,
                            ));
                        }
                        if *to == SystemContract::Blacklist.address() {
                            self.blacklist.apply_output(&outcome.output);
                        }
                    }
                    Output::Create { amount, code } => {
                        let created = machine.create(payer, (*code).clone(), gas, *amount)?;
                        gas = created.gas_left;
                        outcome.byte_code_gas += created.byte_code_gas;
                        outcome.output = created.output;
                        if let Some(err) = created.error {
                            gas = gas.saturating_add(machine.refund_all_fee());
                            vm_err = Some(err);
                            break;
                        }
                        gas = gas.saturating_add(machine.refund_fee());
                        outcome.contract_address = Some(created.address);
                        records.push(BalanceRecord::new(
                            payer,
                            created.address,
                            payer_type,
                            AddressType::Contract,
                            RecordKind::CreateContract,
                            Address::ZERO,
                            *amount,
                        ));
                    }
                    Output::Upgrade { contract, code } => {
                        machine.upgrade(payer, *contract, (*code).clone())?;
                    }
                    Output::Signers { kind, info } => {
                        machine.state_mut().set_signers_info(*kind, info)?;
                    }
                }
            }
        }

        let otxs = machine.take_otxs();
        if let Some(err) = &vm_err {
            debug!(%err, kind = msg.kind.name(), "transaction failed");
            machine.state_mut().revert_to(snapshot);
            records.clear();
            outcome.contract_address = None;
            if let Some(kind) = msg.utxo_kind
                && kind.contains(UtxoKind::UIN)
                && kind.contains(UtxoKind::AOUT)
            {
                let refund = msg.account_output_amount().saturating_sub(msg.account_input_amount());
                if !refund.is_zero() {
                    machine.state_mut().add_balance(payer, msg.token, refund)?;
                }
            }
            if msg.runs_code() {
                gas = gas.saturating_add(transfer_gas);
            }
        } else {
            records.extend(otxs);
        }

        if msg.charges_gas() {
            if msg.sender.is_some() {
                let used = msg.gas - gas;
                gas = gas.saturating_add((used / 2).min(machine.state().get_refund()));
                if gas > 0 {
                    machine.state_mut().add_balance(payer, Address::ZERO, gas_fee(gas, msg.gas_price))?;
                }
            } else {
                gas = 0;
            }
            outcome.gas_used = msg.gas - gas;
            outcome.fee = gas_fee(outcome.gas_used, msg.gas_price);
            records.push(BalanceRecord::new(
                payer,
                SystemContract::Foundation.address(),
                payer_type,
                AddressType::Contract,
                RecordKind::Fee,
                Address::ZERO,
                outcome.fee,
            ));
        }

        if let Some((sender, nonce)) = next_nonce {
            machine.state_mut().set_nonce(sender, nonce)?;
        }

        trace!(kind = msg.kind.name(), gas_used = outcome.gas_used, ok = vm_err.is_none(), "applied transaction");
        outcome.vm_err = vm_err;
        outcome.records = records;
        Ok(outcome)
    }
}

fn check_nonce(state: &WorldState, address: Address, nonce: u64) -> Result<(), TransitionError> {
    let current = state.get_nonce(&address)?;
    if current < nonce {
        return Err(TransitionError::NonceTooHigh { address, state: current, tx: nonce });
    }
    if current > nonce {
        return Err(TransitionError::NonceTooLow { address, state: current, tx: nonce });
    }
    Ok(())
}

fn buy_gas(state: &mut WorldState, address: Address, cost: U256) -> Result<(), TransitionError> {
    let have = state.get_balance(&address, &Address::ZERO)?;
    if have < cost {
        return Err(TransitionError::InsufficientBalanceForGas { address, have, need: cost });
    }
    state.sub_balance(address, Address::ZERO, cost)?;
    Ok(())
}

/// Debit the account inputs; a shortfall fails the transaction without rejecting it.
fn debit_inputs(state: &mut WorldState, msg: &TxMessage<'_>) -> Result<Option<VmError>, TransitionError> {
    for input in &msg.inputs {
        let Input::Account { from, amount } = input else {
            continue;
        };
        if amount.is_zero() {
            continue;
        }
        if state.get_balance(from, &msg.token)? < *amount {
            return Ok(Some(VmError::InsufficientBalance));
        }
        state.sub_balance(*from, msg.token, *amount)?;
    }
    Ok(None)
}
