//! Opcode values and their static properties.

pub(crate) const STOP: u8 = 0x00;
pub(crate) const ADD: u8 = 0x01;
pub(crate) const MUL: u8 = 0x02;
pub(crate) const SUB: u8 = 0x03;
pub(crate) const DIV: u8 = 0x04;
pub(crate) const SDIV: u8 = 0x05;
pub(crate) const MOD: u8 = 0x06;
pub(crate) const SMOD: u8 = 0x07;
pub(crate) const ADDMOD: u8 = 0x08;
pub(crate) const MULMOD: u8 = 0x09;
pub(crate) const EXP: u8 = 0x0a;
pub(crate) const SIGNEXTEND: u8 = 0x0b;

pub(crate) const LT: u8 = 0x10;
pub(crate) const GT: u8 = 0x11;
pub(crate) const SLT: u8 = 0x12;
pub(crate) const SGT: u8 = 0x13;
pub(crate) const EQ: u8 = 0x14;
pub(crate) const ISZERO: u8 = 0x15;
pub(crate) const AND: u8 = 0x16;
pub(crate) const OR: u8 = 0x17;
pub(crate) const XOR: u8 = 0x18;
pub(crate) const NOT: u8 = 0x19;
pub(crate) const BYTE: u8 = 0x1a;
pub(crate) const SHL: u8 = 0x1b;
pub(crate) const SHR: u8 = 0x1c;
pub(crate) const SAR: u8 = 0x1d;

pub(crate) const SHA3: u8 = 0x20;

pub(crate) const ADDRESS: u8 = 0x30;
pub(crate) const BALANCE: u8 = 0x31;
pub(crate) const ORIGIN: u8 = 0x32;
pub(crate) const CALLER: u8 = 0x33;
pub(crate) const CALLVALUE: u8 = 0x34;
pub(crate) const CALLDATALOAD: u8 = 0x35;
pub(crate) const CALLDATASIZE: u8 = 0x36;
pub(crate) const CALLDATACOPY: u8 = 0x37;
pub(crate) const CODESIZE: u8 = 0x38;
pub(crate) const CODECOPY: u8 = 0x39;
pub(crate) const GASPRICE: u8 = 0x3a;
pub(crate) const EXTCODESIZE: u8 = 0x3b;
pub(crate) const EXTCODECOPY: u8 = 0x3c;
pub(crate) const RETURNDATASIZE: u8 = 0x3d;
pub(crate) const RETURNDATACOPY: u8 = 0x3e;
pub(crate) const EXTCODEHASH: u8 = 0x3f;

pub(crate) const BLOCKHASH: u8 = 0x40;
pub(crate) const COINBASE: u8 = 0x41;
pub(crate) const TIMESTAMP: u8 = 0x42;
pub(crate) const NUMBER: u8 = 0x43;
pub(crate) const DIFFICULTY: u8 = 0x44;
pub(crate) const GASLIMIT: u8 = 0x45;

pub(crate) const POP: u8 = 0x50;
pub(crate) const MLOAD: u8 = 0x51;
pub(crate) const MSTORE: u8 = 0x52;
pub(crate) const MSTORE8: u8 = 0x53;
pub(crate) const SLOAD: u8 = 0x54;
pub(crate) const SSTORE: u8 = 0x55;
pub(crate) const JUMP: u8 = 0x56;
pub(crate) const JUMPI: u8 = 0x57;
pub(crate) const PC: u8 = 0x58;
pub(crate) const MSIZE: u8 = 0x59;
pub(crate) const GAS: u8 = 0x5a;
pub(crate) const JUMPDEST: u8 = 0x5b;

pub(crate) const PUSH1: u8 = 0x60;
pub(crate) const PUSH32: u8 = 0x7f;
pub(crate) const DUP1: u8 = 0x80;
pub(crate) const DUP16: u8 = 0x8f;
pub(crate) const SWAP1: u8 = 0x90;
pub(crate) const SWAP16: u8 = 0x9f;
pub(crate) const LOG0: u8 = 0xa0;
pub(crate) const LOG4: u8 = 0xa4;

pub(crate) const ISSUE: u8 = 0xc0;
pub(crate) const BALANCE_TOKEN: u8 = 0xc1;
pub(crate) const CALL_TOKEN_ADDRESS: u8 = 0xc2;
pub(crate) const TRANSFER_TOKEN: u8 = 0xc3;
pub(crate) const MSG_TOKEN_VALUE: u8 = 0xc4;

pub(crate) const CREATE: u8 = 0xf0;
pub(crate) const CALL: u8 = 0xf1;
pub(crate) const CALLCODE: u8 = 0xf2;
pub(crate) const RETURN: u8 = 0xf3;
pub(crate) const DELEGATECALL: u8 = 0xf4;
pub(crate) const CREATE2: u8 = 0xf5;
pub(crate) const STATICCALL: u8 = 0xfa;
pub(crate) const REVERT: u8 = 0xfd;
pub(crate) const SELFDESTRUCT: u8 = 0xff;

/// Gas tiers of the fixed part of an instruction.
pub(crate) mod tier {
    pub(crate) const ZERO: u64 = 0;
    pub(crate) const BASE: u64 = 2;
    pub(crate) const VERY_LOW: u64 = 3;
    pub(crate) const LOW: u64 = 5;
    pub(crate) const MID: u64 = 8;
    pub(crate) const HIGH: u64 = 10;
    pub(crate) const EXT: u64 = 20;
}

/// Static properties of an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct OpInfo {
    /// Mnemonic.
    pub(crate) name: &'static str,
    /// Items popped.
    pub(crate) pops: usize,
    /// Items pushed.
    pub(crate) pushes: usize,
    /// Fixed gas, charged before the dynamic part.
    pub(crate) gas: u64,
    /// Whether the instruction changes state.
    pub(crate) writes: bool,
}

const fn op(name: &'static str, pops: usize, pushes: usize, gas: u64) -> Option<OpInfo> {
    Some(OpInfo { name, pops, pushes, gas, writes: false })
}

const fn write_op(name: &'static str, pops: usize, pushes: usize, gas: u64) -> Option<OpInfo> {
    Some(OpInfo { name, pops, pushes, gas, writes: true })
}

const PUSH_NAMES: [&str; 32] = [
    "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9", "PUSH10",
    "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17", "PUSH18", "PUSH19",
    "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25", "PUSH26", "PUSH27", "PUSH28",
    "PUSH29", "PUSH30", "PUSH31", "PUSH32",
];
const DUP_NAMES: [&str; 16] = [
    "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10", "DUP11",
    "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
];
const SWAP_NAMES: [&str; 16] = [
    "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9", "SWAP10",
    "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
];
const LOG_NAMES: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];

const fn build_table() -> [Option<OpInfo>; 256] {
    use tier::*;

    let mut t: [Option<OpInfo>; 256] = [None; 256];
    t[STOP as usize] = op("STOP", 0, 0, ZERO);
    t[ADD as usize] = op("ADD", 2, 1, VERY_LOW);
    t[MUL as usize] = op("MUL", 2, 1, LOW);
    t[SUB as usize] = op("SUB", 2, 1, VERY_LOW);
    t[DIV as usize] = op("DIV", 2, 1, LOW);
    t[SDIV as usize] = op("SDIV", 2, 1, LOW);
    t[MOD as usize] = op("MOD", 2, 1, LOW);
    t[SMOD as usize] = op("SMOD", 2, 1, LOW);
    t[ADDMOD as usize] = op("ADDMOD", 3, 1, MID);
    t[MULMOD as usize] = op("MULMOD", 3, 1, MID);
    t[EXP as usize] = op("EXP", 2, 1, HIGH);
    t[SIGNEXTEND as usize] = op("SIGNEXTEND", 2, 1, LOW);

    t[LT as usize] = op("LT", 2, 1, VERY_LOW);
    t[GT as usize] = op("GT", 2, 1, VERY_LOW);
    t[SLT as usize] = op("SLT", 2, 1, VERY_LOW);
    t[SGT as usize] = op("SGT", 2, 1, VERY_LOW);
    t[EQ as usize] = op("EQ", 2, 1, VERY_LOW);
    t[ISZERO as usize] = op("ISZERO", 1, 1, VERY_LOW);
    t[AND as usize] = op("AND", 2, 1, VERY_LOW);
    t[OR as usize] = op("OR", 2, 1, VERY_LOW);
    t[XOR as usize] = op("XOR", 2, 1, VERY_LOW);
    t[NOT as usize] = op("NOT", 1, 1, VERY_LOW);
    t[BYTE as usize] = op("BYTE", 2, 1, VERY_LOW);
    t[SHL as usize] = op("SHL", 2, 1, VERY_LOW);
    t[SHR as usize] = op("SHR", 2, 1, VERY_LOW);
    t[SAR as usize] = op("SAR", 2, 1, VERY_LOW);

    t[SHA3 as usize] = op("SHA3", 2, 1, 30);

    t[ADDRESS as usize] = op("ADDRESS", 0, 1, BASE);
    t[BALANCE as usize] = op("BALANCE", 1, 1, ZERO);
    t[ORIGIN as usize] = op("ORIGIN", 0, 1, BASE);
    t[CALLER as usize] = op("CALLER", 0, 1, BASE);
    t[CALLVALUE as usize] = op("CALLVALUE", 0, 1, BASE);
    t[CALLDATALOAD as usize] = op("CALLDATALOAD", 1, 1, VERY_LOW);
    t[CALLDATASIZE as usize] = op("CALLDATASIZE", 0, 1, BASE);
    t[CALLDATACOPY as usize] = op("CALLDATACOPY", 3, 0, VERY_LOW);
    t[CODESIZE as usize] = op("CODESIZE", 0, 1, BASE);
    t[CODECOPY as usize] = op("CODECOPY", 3, 0, VERY_LOW);
    t[GASPRICE as usize] = op("GASPRICE", 0, 1, BASE);
    t[EXTCODESIZE as usize] = op("EXTCODESIZE", 1, 1, ZERO);
    t[EXTCODECOPY as usize] = op("EXTCODECOPY", 4, 0, ZERO);
    t[RETURNDATASIZE as usize] = op("RETURNDATASIZE", 0, 1, BASE);
    t[RETURNDATACOPY as usize] = op("RETURNDATACOPY", 3, 0, VERY_LOW);
    t[EXTCODEHASH as usize] = op("EXTCODEHASH", 1, 1, ZERO);

    t[BLOCKHASH as usize] = op("BLOCKHASH", 1, 1, EXT);
    t[COINBASE as usize] = op("COINBASE", 0, 1, BASE);
    t[TIMESTAMP as usize] = op("TIMESTAMP", 0, 1, BASE);
    t[NUMBER as usize] = op("NUMBER", 0, 1, BASE);
    t[DIFFICULTY as usize] = op("DIFFICULTY", 0, 1, BASE);
    t[GASLIMIT as usize] = op("GASLIMIT", 0, 1, BASE);

    t[POP as usize] = op("POP", 1, 0, BASE);
    t[MLOAD as usize] = op("MLOAD", 1, 1, VERY_LOW);
    t[MSTORE as usize] = op("MSTORE", 2, 0, VERY_LOW);
    t[MSTORE8 as usize] = op("MSTORE8", 2, 0, VERY_LOW);
    t[SLOAD as usize] = op("SLOAD", 1, 1, ZERO);
    t[SSTORE as usize] = write_op("SSTORE", 2, 0, ZERO);
    t[JUMP as usize] = op("JUMP", 1, 0, MID);
    t[JUMPI as usize] = op("JUMPI", 2, 0, HIGH);
    t[PC as usize] = op("PC", 0, 1, BASE);
    t[MSIZE as usize] = op("MSIZE", 0, 1, BASE);
    t[GAS as usize] = op("GAS", 0, 1, BASE);
    t[JUMPDEST as usize] = op("JUMPDEST", 0, 0, 1);

    let mut i = 0;
    while i < 32 {
        t[PUSH1 as usize + i] = op(PUSH_NAMES[i], 0, 1, VERY_LOW);
        i += 1;
    }
    let mut i = 0;
    while i < 16 {
        t[DUP1 as usize + i] = op(DUP_NAMES[i], i + 1, i + 2, VERY_LOW);
        t[SWAP1 as usize + i] = op(SWAP_NAMES[i], i + 2, i + 2, VERY_LOW);
        i += 1;
    }
    let mut i = 0;
    while i < 5 {
        t[LOG0 as usize + i] = write_op(LOG_NAMES[i], i + 2, 0, 375);
        i += 1;
    }

    t[ISSUE as usize] = write_op("ISSUE", 1, 0, ZERO);
    t[BALANCE_TOKEN as usize] = op("BALANCE_TOKEN", 2, 1, ZERO);
    t[CALL_TOKEN_ADDRESS as usize] = op("CALL_TOKEN_ADDRESS", 0, 1, BASE);
    t[TRANSFER_TOKEN as usize] = write_op("TRANSFER_TOKEN", 3, 0, ZERO);
    t[MSG_TOKEN_VALUE as usize] = op("MSG_TOKEN_VALUE", 0, 1, BASE);

    t[CREATE as usize] = write_op("CREATE", 3, 1, 32_000);
    t[CALL as usize] = op("CALL", 7, 1, ZERO);
    t[CALLCODE as usize] = op("CALLCODE", 7, 1, ZERO);
    t[RETURN as usize] = op("RETURN", 2, 0, ZERO);
    t[DELEGATECALL as usize] = op("DELEGATECALL", 6, 1, ZERO);
    t[CREATE2 as usize] = write_op("CREATE2", 4, 1, 32_000);
    t[STATICCALL as usize] = op("STATICCALL", 6, 1, ZERO);
    t[REVERT as usize] = op("REVERT", 2, 0, ZERO);
    t[SELFDESTRUCT as usize] = write_op("SELFDESTRUCT", 1, 0, ZERO);
    t
}

static TABLE: [Option<OpInfo>; 256] = build_table();

/// Static properties of `opcode`, `None` when undefined.
pub(crate) fn info(opcode: u8) -> Option<&'static OpInfo> {
    TABLE[opcode as usize].as_ref()
}

/// Whether `opcode` is a `PUSHn`.
pub(crate) const fn is_push(opcode: u8) -> bool {
    opcode >= PUSH1 && opcode <= PUSH32
}

/// Immediate bytes following a `PUSHn`.
pub(crate) const fn push_size(opcode: u8) -> usize {
    (opcode - PUSH1) as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entries() {
        assert_eq!(info(ADD).map(|i| i.name), Some("ADD"));
        assert_eq!(info(PUSH32).map(|i| i.name), Some("PUSH32"));
        assert_eq!(info(0x8a).map(|i| (i.pops, i.pushes)), Some((11, 12)));
        assert_eq!(info(0x9f).map(|i| (i.pops, i.pushes)), Some((17, 17)));
        assert_eq!(info(LOG4).map(|i| i.pops), Some(6));
        assert!(info(0x0c).is_none());
        assert!(info(0xfe).is_none());
    }

    #[test]
    fn token_opcodes() {
        assert_eq!(info(ISSUE).map(|i| i.writes), Some(true));
        assert_eq!(info(TRANSFER_TOKEN).map(|i| i.pops), Some(3));
        assert_eq!(info(BALANCE_TOKEN).map(|i| i.pops), Some(2));
        assert_eq!(info(MSG_TOKEN_VALUE).map(|i| i.pushes), Some(1));
    }

    #[test]
    fn push_sizes() {
        assert!(is_push(0x60));
        assert!(!is_push(0x80));
        assert_eq!(push_size(PUSH1), 1);
        assert_eq!(push_size(PUSH32), 32);
    }
}
