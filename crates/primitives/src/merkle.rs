//! Binary keccak merkle root.

use alloy_primitives::{B256, b256, keccak256};

/// Root of an empty list.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Computes the merkle root over the keccak of each item.
///
/// Pairs are hashed as `keccak(left ‖ right)`; an odd node is carried up unchanged.
pub fn merkle_root<I, T>(items: I) -> B256
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut level: Vec<B256> = items.into_iter().map(|item| keccak256(item.as_ref())).collect();
    if level.is_empty() {
        return EMPTY_ROOT_HASH;
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(left.as_slice());
                    buf[32..].copy_from_slice(right.as_slice());
                    keccak256(buf)
                }
                [single] => *single,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }
    level[0]
}
