//! Relay wire format for instructions
//!
//! The relay describes accounts with a 2-bit role instead of the
//! (is_signer, is_writable) pair, and its instruction payload may arrive
//! as a byte array, a `{ "data": [...] }` wrapper, an index-keyed object
//! or a base64 string. Both are normalized here, at deserialization time,
//! so nothing downstream branches on the wire shape.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::{de, Deserialize, Deserializer, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::errors::TransferError;

/// Account role as encoded by the relay
///
/// | wire | role           | signer | writable |
/// |------|----------------|--------|----------|
/// | 0    | Plain          | no     | no       |
/// | 1    | Writable       | no     | yes      |
/// | 2    | Signer         | yes    | no       |
/// | 3    | WritableSigner | yes    | yes      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AccountRole {
    Plain,
    Writable,
    Signer,
    WritableSigner,
}

impl AccountRole {
    pub fn is_signer(self) -> bool {
        matches!(self, Self::Signer | Self::WritableSigner)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Self::Writable | Self::WritableSigner)
    }

    /// Inverse mapping, used when describing instructions to the relay
    pub fn from_flags(is_signer: bool, is_writable: bool) -> Self {
        match (is_signer, is_writable) {
            (false, false) => Self::Plain,
            (false, true) => Self::Writable,
            (true, false) => Self::Signer,
            (true, true) => Self::WritableSigner,
        }
    }
}

impl TryFrom<u8> for AccountRole {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Plain),
            1 => Ok(Self::Writable),
            2 => Ok(Self::Signer),
            3 => Ok(Self::WritableSigner),
            other => Err(format!("unknown account role {}", other)),
        }
    }
}

impl From<AccountRole> for u8 {
    fn from(role: AccountRole) -> Self {
        match role {
            AccountRole::Plain => 0,
            AccountRole::Writable => 1,
            AccountRole::Signer => 2,
            AccountRole::WritableSigner => 3,
        }
    }
}

/// Account reference inside a relay instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayAccount {
    pub address: String,
    pub role: AccountRole,
}

/// Instruction as returned by the relay, payload already normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayInstruction {
    pub program_address: String,
    pub accounts: Vec<RelayAccount>,
    #[serde(deserialize_with = "deserialize_payload")]
    pub data: Vec<u8>,
}

impl RelayInstruction {
    /// Describe a generic instruction in relay wire form
    pub fn from_instruction(ix: &Instruction) -> Self {
        Self {
            program_address: ix.program_id.to_string(),
            accounts: ix
                .accounts
                .iter()
                .map(|meta| RelayAccount {
                    address: meta.pubkey.to_string(),
                    role: AccountRole::from_flags(meta.is_signer, meta.is_writable),
                })
                .collect(),
            data: ix.data.clone(),
        }
    }

    /// Convert into a generic instruction, validating every address
    pub fn to_instruction(&self) -> Result<Instruction, TransferError> {
        let program_id = parse_relay_address(&self.program_address)?;
        let accounts = self
            .accounts
            .iter()
            .map(|account| {
                let pubkey = parse_relay_address(&account.address)?;
                Ok(AccountMeta {
                    pubkey,
                    is_signer: account.role.is_signer(),
                    is_writable: account.role.is_writable(),
                })
            })
            .collect::<Result<Vec<_>, TransferError>>()?;

        Ok(Instruction {
            program_id,
            accounts,
            data: self.data.clone(),
        })
    }
}

fn parse_relay_address(raw: &str) -> Result<Pubkey, TransferError> {
    Pubkey::from_str(raw)
        .map_err(|e| TransferError::protocol(format!("relay returned invalid address '{}': {}", raw, e)))
}

/// Every payload shape the relay is known to produce
#[derive(Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Bytes(Vec<u8>),
    Wrapped { data: Vec<u8> },
    Base64(String),
    Indexed(BTreeMap<String, u8>),
}

fn deserialize_payload<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match WirePayload::deserialize(deserializer)? {
        WirePayload::Bytes(bytes) | WirePayload::Wrapped { data: bytes } => Ok(bytes),
        WirePayload::Base64(encoded) => BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| de::Error::custom(format!("invalid base64 payload: {}", e))),
        WirePayload::Indexed(map) => {
            let mut indexed = map
                .into_iter()
                .map(|(key, byte)| {
                    key.parse::<usize>()
                        .map(|idx| (idx, byte))
                        .map_err(|_| de::Error::custom(format!("invalid payload index '{}'", key)))
                })
                .collect::<Result<Vec<_>, D::Error>>()?;
            indexed.sort_unstable_by_key(|(idx, _)| *idx);
            if indexed.iter().enumerate().any(|(pos, (idx, _))| pos != *idx) {
                return Err(de::Error::custom("payload indices are not contiguous"));
            }
            Ok(indexed.into_iter().map(|(_, byte)| byte).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn decode(data: serde_json::Value) -> Result<RelayInstruction, serde_json::Error> {
        serde_json::from_value(json!({
            "programAddress": Pubkey::new_unique().to_string(),
            "accounts": [],
            "data": data,
        }))
    }

    #[test]
    fn test_role_to_flags_is_total() {
        let cases = [
            (0u8, false, false),
            (1, false, true),
            (2, true, false),
            (3, true, true),
        ];
        for (wire, signer, writable) in cases {
            let role = AccountRole::try_from(wire).unwrap();
            assert_eq!(role.is_signer(), signer, "role {}", wire);
            assert_eq!(role.is_writable(), writable, "role {}", wire);
        }
        assert!(AccountRole::try_from(4).is_err());
    }

    #[test]
    fn test_payload_shapes_normalize_to_same_bytes() {
        let expected = vec![3u8, 64, 66, 15, 0];
        let shapes = [
            json!([3, 64, 66, 15, 0]),
            json!({ "type": "Buffer", "data": [3, 64, 66, 15, 0] }),
            json!({ "0": 3, "1": 64, "2": 66, "3": 15, "4": 0 }),
            json!(BASE64_STANDARD.encode(&expected)),
        ];
        for shape in shapes {
            let ix = decode(shape.clone()).unwrap_or_else(|e| panic!("{}: {}", shape, e));
            assert_eq!(ix.data, expected, "shape {}", shape);
        }
    }

    #[test]
    fn test_indexed_payload_orders_numerically() {
        let mut map = serde_json::Map::new();
        for i in 0..12u8 {
            map.insert(i.to_string(), json!(i));
        }
        let ix = decode(serde_json::Value::Object(map)).unwrap();
        assert_eq!(ix.data, (0..12u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_bad_payloads_rejected() {
        assert!(decode(json!({ "0": 1, "2": 3 })).is_err());
        assert!(decode(json!("***not base64***")).is_err());
        assert!(decode(json!(42)).is_err());
    }

    #[test]
    fn test_to_instruction_maps_roles() {
        let program = Pubkey::new_unique();
        let plain = Pubkey::new_unique();
        let signer = Pubkey::new_unique();
        let raw = json!({
            "programAddress": program.to_string(),
            "accounts": [
                { "address": plain.to_string(), "role": 0 },
                { "address": signer.to_string(), "role": 3 },
            ],
            "data": [9],
        });
        let ix = serde_json::from_value::<RelayInstruction>(raw)
            .unwrap()
            .to_instruction()
            .unwrap();

        assert_eq!(ix.program_id, program);
        assert_eq!(ix.accounts[0], AccountMeta::new_readonly(plain, false));
        assert_eq!(ix.accounts[1], AccountMeta::new(signer, true));
        assert_eq!(ix.data, vec![9]);
    }

    #[test]
    fn test_invalid_address_is_protocol_error() {
        let relay_ix = RelayInstruction {
            program_address: "definitely-not-base58!".to_string(),
            accounts: vec![],
            data: vec![],
        };
        assert!(matches!(
            relay_ix.to_instruction(),
            Err(TransferError::RelayProtocol(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_roles_round_trip_through_flags(signer: bool, writable: bool) {
            let role = AccountRole::from_flags(signer, writable);
            prop_assert_eq!(role.is_signer(), signer);
            prop_assert_eq!(role.is_writable(), writable);
        }
    }
}
