//! Relayer authorization gate

use crate::{types::Address, Error, Result};
use serde::{Deserialize, Serialize};

/// Currently authorized relay identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerGate {
    relayer: Option<Address>,
}

impl RelayerGate {
    /// Gate with no authorized relayer
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently authorized relayer, if any
    pub fn relayer(&self) -> Option<Address> {
        self.relayer
    }

    /// Replace the authorized relayer, returning the previous one
    ///
    /// Owner authorization is the caller's responsibility.
    pub fn set_relayer(&mut self, relayer: Address) -> Option<Address> {
        self.relayer.replace(relayer)
    }

    /// Fail with `NotRelayer` unless `caller` is the authorized relayer
    pub fn require_relayer(&self, caller: &Address) -> Result<()> {
        match self.relayer {
            Some(ref relayer) if relayer == caller => Ok(()),
            _ => Err(Error::NotRelayer(caller.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_gate_rejects_everyone() {
        let gate = RelayerGate::new();
        assert!(matches!(
            gate.require_relayer(&Address::ZERO),
            Err(Error::NotRelayer(_))
        ));
    }

    #[test]
    fn test_set_relayer_replaces() {
        let first = Address::from_bytes([1u8; 32]);
        let second = Address::from_bytes([2u8; 32]);
        let mut gate = RelayerGate::new();

        assert_eq!(gate.set_relayer(first), None);
        assert!(gate.require_relayer(&first).is_ok());

        assert_eq!(gate.set_relayer(second), Some(first));
        assert!(gate.require_relayer(&first).is_err());
        assert!(gate.require_relayer(&second).is_ok());
    }
}
