//! Cross-machine calls through the factory.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256, keccak256};
use hyla_backend::MemoryStore;
use hyla_state::WorldState;
use hyla_vm::{BlockContext, Machine, Message, VmConfig, VmError, encode_create_data};

const ALICE: Address = Address::repeat_byte(0xa1);
const EVM_CONTRACT: Address = Address::repeat_byte(0xe0);
const WASM_CONTRACT: Address = Address::repeat_byte(0xaa);
const GAS: u64 = 1_000_000;

const ECHO: &str = r#"(module
    (import "env" "TC_InputSize" (func $input_size (result i32)))
    (import "env" "TC_Input" (func $input (param i32)))
    (import "env" "TC_StorageSetBytes" (func $set (param i32 i32 i32 i32)))
    (import "env" "TC_Return" (func $ret (param i32 i32)))
    (memory 1)
    (data (i32.const 0) "k")
    (func (export "main")
        (call $input (i32.const 16))
        (call $set (i32.const 0) (i32.const 1) (i32.const 16) (call $input_size))
        (call $ret (i32.const 16) (call $input_size))))"#;

fn state() -> WorldState {
    WorldState::new(Arc::new(MemoryStore::new()))
}

fn block() -> BlockContext {
    BlockContext::new(Address::repeat_byte(0xcb), 7, 1_700_000_000, 10_000_000)
}

/// Stack code that sends "hi" to `target` and returns the reply.
fn forwarder(target: Address) -> Bytes {
    let mut code = vec![0x61, b'h', b'i', 0x60, 0x00, 0x52];
    code.extend_from_slice(&[0x60, 0x02, 0x60, 0x20, 0x60, 0x02, 0x60, 0x1e, 0x60, 0x00]);
    code.push(0x73);
    code.extend_from_slice(target.as_slice());
    code.extend_from_slice(&[0x5a, 0xf1, 0x50, 0x60, 0x02, 0x60, 0x20, 0xf3]);
    code.into()
}

#[test]
fn stack_contract_calls_wasm_contract() {
    let mut state = state();
    state.set_code(EVM_CONTRACT, forwarder(WASM_CONTRACT)).unwrap();
    state.set_code(WASM_CONTRACT, wat::parse_str(ECHO).unwrap().into()).unwrap();

    let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
    machine.reset(&Message::new(ALICE, U256::from(1), Address::ZERO));
    let outcome = machine.call(ALICE, EVM_CONTRACT, Address::ZERO, Bytes::new(), GAS, U256::ZERO).unwrap();
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.output, Bytes::from_static(b"hi"));
    drop(machine);

    assert_eq!(state.get_storage(&WASM_CONTRACT, &keccak256(b"k")).unwrap(), Bytes::from_static(b"hi"));
}

#[test]
fn wasm_create_then_call() {
    let module: Bytes = wat::parse_str(ECHO).unwrap().into();
    let config = VmConfig::default();
    let mut state = state();
    let mut machine = Machine::new(&mut state, block(), &config);
    machine.reset(&Message::new(ALICE, U256::from(1), Address::ZERO));

    let created = machine.create(ALICE, encode_create_data(&module, b""), GAS, U256::ZERO).unwrap();
    assert!(created.is_success(), "{:?}", created.error);
    let outcome =
        machine.call(ALICE, created.address, Address::ZERO, Bytes::from_static(b"ping"), GAS, U256::ZERO).unwrap();
    assert_eq!(outcome.output, Bytes::from_static(b"ping"));
    assert_eq!(config.modules.len(), 1);
}

#[test]
fn failing_init_leaves_no_contract() {
    let module: Bytes =
        wat::parse_str(r#"(module (memory 1) (func (export "init") unreachable) (func (export "main")))"#)
            .unwrap()
            .into();
    let mut state = state();
    let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
    let outcome = machine.create(ALICE, encode_create_data(&module, b""), GAS, U256::ZERO).unwrap();
    assert!(matches!(outcome.error, Some(VmError::WasmTrap(_))));
    assert_eq!(outcome.gas_left, 0);
    let address = outcome.address;
    drop(machine);

    assert!(state.get_code(&address).unwrap().is_empty());
}

#[test]
fn cancelled_machine_stops_wasm() {
    let mut state = state();
    state
        .set_code(WASM_CONTRACT, wat::parse_str(r#"(module (memory 1) (func (export "main") (loop $l (br $l))))"#).unwrap().into())
        .unwrap();
    let mut machine = Machine::new(&mut state, block(), &VmConfig::default());
    machine.cancel();
    let outcome = machine.call(ALICE, WASM_CONTRACT, Address::ZERO, Bytes::new(), GAS, U256::ZERO).unwrap();
    assert!(matches!(outcome.error, Some(VmError::Interrupted)));
}
