//! Reserved system contract addresses.

use alloy_primitives::Address;

/// Reserved system contracts.
///
/// Each address is the contract name right-aligned in 20 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SystemContract {
    /// Candidate registry.
    Candidates,
    /// Tunable parameters.
    Coefficient,
    /// Governance committee.
    Committee,
    /// Fee sink and award distributor.
    Foundation,
    /// Deposit tracking.
    Pledge,
    /// White-list validators.
    Validators,
    /// Address blacklist.
    Blacklist,
}

const fn right_aligned(name: &[u8]) -> Address {
    let mut bytes = [0u8; 20];
    let offset = 20 - name.len();
    let mut i = 0;
    while i < name.len() {
        bytes[offset + i] = name[i];
        i += 1;
    }
    Address::new(bytes)
}

impl SystemContract {
    /// All system contracts.
    pub const ALL: [Self; 7] = [
        Self::Candidates,
        Self::Coefficient,
        Self::Committee,
        Self::Foundation,
        Self::Pledge,
        Self::Validators,
        Self::Blacklist,
    ];

    /// Contract name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Candidates => "Candidates",
            Self::Coefficient => "Coefficient",
            Self::Committee => "Committee",
            Self::Foundation => "Foundation",
            Self::Pledge => "Pledge",
            Self::Validators => "Validators",
            Self::Blacklist => "Blacklist",
        }
    }

    /// Fixed address of the contract.
    pub const fn address(self) -> Address {
        right_aligned(self.name().as_bytes())
    }

    /// Looks up the system contract at `address`.
    pub fn from_address(address: &Address) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.address() == *address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_right_aligned_names() {
        let addr = SystemContract::Foundation.address();
        assert_eq!(&addr.as_slice()[10..], b"Foundation");
        assert!(addr.as_slice()[..10].iter().all(|b| *b == 0));
    }

    #[test]
    fn addresses_are_distinct() {
        for (i, a) in SystemContract::ALL.iter().enumerate() {
            for b in &SystemContract::ALL[i + 1..] {
                assert_ne!(a.address(), b.address());
            }
        }
    }

    #[test]
    fn lookup_by_address() {
        assert_eq!(
            SystemContract::from_address(&SystemContract::Blacklist.address()),
            Some(SystemContract::Blacklist)
        );
        assert_eq!(SystemContract::from_address(&Address::ZERO), None);
    }
}
