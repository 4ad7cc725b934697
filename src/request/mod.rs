//! Signed requests: how an external caller proves its identity.
//!
//! The signer commits to the operation and a nonce; the host supplies the
//! timestamp when the request is executed.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::facade::Operation;
use crate::identity::{Address, CallContext};
use crate::ledger::Timestamp;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedRequest {
    pub operation: Operation,
    pub nonce: u64,
    #[serde(with = "crate::request::serde_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "crate::request::serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedRequest {
    pub fn sign(key: &SigningKey, operation: Operation, nonce: u64) -> Result<Self, RequestError> {
        let public_key = key.verifying_key().as_bytes().to_vec();
        let digest = request_digest(&operation, nonce, &public_key)?;
        let signature = key.sign(&digest).to_bytes().to_vec();
        Ok(Self {
            operation,
            nonce,
            public_key,
            signature,
        })
    }

    pub fn digest(&self) -> Result<[u8; 32], RequestError> {
        request_digest(&self.operation, self.nonce, &self.public_key)
    }

    /// Checks the signature and returns the caller it proves.
    pub fn verify(&self) -> Result<Address, RequestError> {
        let key_bytes: [u8; 32] = self
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| RequestError::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| RequestError::MalformedKey)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| RequestError::MalformedSignature)?;
        key.verify_strict(&self.digest()?, &signature)
            .map_err(|_| RequestError::InvalidSignature)?;
        Ok(Address::from_verifying_key(&key))
    }

    pub fn context(&self, now: Timestamp) -> Result<CallContext, RequestError> {
        Ok(CallContext::new(self.verify()?, now))
    }
}

fn request_digest(
    operation: &Operation,
    nonce: u64,
    public_key: &[u8],
) -> Result<[u8; 32], RequestError> {
    let mut hasher = Sha256::new();
    hasher.update(b"cbdc-ledger/request/v1");
    hasher.update(public_key);
    hasher.update(nonce.to_le_bytes());
    hasher.update(serde_json::to_vec(operation)?);
    Ok(hasher.finalize().into())
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("public key is not a valid ed25519 key")]
    MalformedKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not match request")]
    InvalidSignature,
    #[error("failed to encode operation: {0}")]
    Encode(#[from] serde_json::Error),
}

pub(crate) mod serde_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(&encoded).map_err(D::Error::custom)
    }
}
