//! Process-wide address blacklist.

use std::{collections::BTreeSet, sync::Arc};

use alloy_primitives::Address;
use hyla_state::{StateError, WorldState};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

/// Edit returned by a successful call to the blacklist contract.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BlacklistUpdate {
    /// Addresses to block.
    #[serde(default)]
    pub add: Vec<Address>,
    /// Addresses to unblock.
    #[serde(default)]
    pub del: Vec<Address>,
}

/// Shared set of blocked addresses.
///
/// Clones share the same set. The set is replaced from contract storage on every commit
/// and edited in flight by blacklist contract calls.
#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    inner: Arc<RwLock<BTreeSet<Address>>>,
}

impl Blacklist {
    /// Blacklist holding `addresses`.
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self { inner: Arc::new(RwLock::new(addresses.into_iter().collect())) }
    }

    /// Whether `address` is blocked.
    pub fn contains(&self, address: &Address) -> bool {
        self.inner.read().contains(address)
    }

    /// First blocked address among `addresses`.
    pub fn find<'a>(&self, addresses: impl IntoIterator<Item = &'a Address>) -> Option<Address> {
        let set = self.inner.read();
        addresses.into_iter().find(|address| set.contains(*address)).copied()
    }

    /// Number of blocked addresses.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether nothing is blocked.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Replace the set with the one stored in `state`.
    pub fn reload(&self, state: &WorldState) -> Result<(), StateError> {
        let addresses = state.blacklist()?;
        debug!(count = addresses.len(), "reload blacklist");
        *self.inner.write() = addresses;
        Ok(())
    }

    /// Apply an update.
    pub fn apply(&self, update: &BlacklistUpdate) {
        let mut set = self.inner.write();
        set.extend(update.add.iter().copied());
        for address in &update.del {
            set.remove(address);
        }
    }

    /// Apply the JSON update returned by the blacklist contract.
    ///
    /// Malformed output is logged and ignored.
    pub fn apply_output(&self, output: &[u8]) {
        match serde_json::from_slice::<BlacklistUpdate>(output) {
            Ok(update) => {
                debug!(add = update.add.len(), del = update.del.len(), "update blacklist");
                self.apply(&update);
            }
            Err(err) => warn!(%err, "ignore malformed blacklist update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use hyla_backend::MemoryStore;

    use super::*;

    const A: Address = Address::repeat_byte(0xa);
    const B: Address = Address::repeat_byte(0xb);

    #[test]
    fn clones_share_the_set() {
        let list = Blacklist::default();
        let clone = list.clone();
        list.apply(&BlacklistUpdate { add: vec![A], del: vec![] });
        assert!(clone.contains(&A));
        assert_eq!(clone.len(), 1);
    }

    #[test]
    fn apply_json_output() {
        let list = Blacklist::new([A]);
        let json = format!(r#"{{"add":["{B}"],"del":["{A}"]}}"#);
        list.apply_output(json.as_bytes());
        assert!(!list.contains(&A));
        assert!(list.contains(&B));
    }

    #[test]
    fn malformed_output_is_ignored() {
        let list = Blacklist::new([A]);
        list.apply_output(b"not json");
        assert!(list.contains(&A));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn find_reports_first_blocked() {
        let list = Blacklist::new([B]);
        assert_eq!(list.find([&A, &B]), Some(B));
        assert_eq!(list.find([&A]), None);
    }

    #[test]
    fn reload_replaces_the_set() {
        let mut state = WorldState::new(Arc::new(MemoryStore::new()));
        state.set_blacklist(&BTreeSet::from([B])).unwrap();
        let list = Blacklist::new([A]);
        list.reload(&state).unwrap();
        assert!(!list.contains(&A));
        assert!(list.contains(&B));
    }
}
