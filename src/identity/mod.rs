use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::ledger::Timestamp;

pub const ADDRESS_LEN: usize = 20;

/// Opaque account identity: last 20 bytes of `sha256(public key)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::from_digest(Sha256::digest(key.as_bytes()).into())
    }

    /// Account holding the aggregate of all staked value.
    ///
    /// Derived from a domain tag, so no key pair can control it.
    pub fn staking_pool() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"cbdc-ledger/staking-pool");
        Self::from_digest(hasher.finalize().into())
    }

    pub fn is_staking_pool(&self) -> bool {
        *self == Self::staking_pool()
    }

    fn from_digest(digest: [u8; 32]) -> Self {
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(out)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("address must be 20 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let raw = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(raw)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(AddressParseError::Length(bytes.len()));
        }
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

/// Environment-supplied facts about one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn display_and_parse_agree() {
        let sk = SigningKey::generate(&mut OsRng);
        let addr = Address::from_verifying_key(&sk.verifying_key());
        let text = addr.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 2 + ADDRESS_LEN * 2);
        assert_eq!(text.parse::<Address>().unwrap(), addr);
        assert_eq!(text[2..].parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            "0xabcd".parse::<Address>().unwrap_err(),
            AddressParseError::Length(2)
        );
        assert!("0xzz".parse::<Address>().is_err());
    }

    #[test]
    fn pool_address_is_stable_and_distinct() {
        assert_eq!(Address::staking_pool(), Address::staking_pool());
        assert!(Address::staking_pool().is_staking_pool());
        assert!(!Address::from_bytes([1u8; ADDRESS_LEN]).is_staking_pool());
    }

    #[test]
    fn serializes_as_hex_string() {
        let addr = Address::from_bytes([0xab; ADDRESS_LEN]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(ADDRESS_LEN)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
