//! Bytecode identification.

/// Magic prefix of a WebAssembly module (`\0asm`).
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// Returns `true` when `code` starts with the WebAssembly magic prefix.
///
/// A bare four byte prefix carries no module body, so it is not treated as Wasm.
pub fn is_wasm_code(code: &[u8]) -> bool {
    code.len() > WASM_MAGIC.len() && code[..WASM_MAGIC.len()] == WASM_MAGIC
}
