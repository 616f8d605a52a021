//! Typed views of the Sui JSON-RPC payloads the client relies on.
//!
//! The game object is decoded against one fixed layout
//! (`Game { id: UID, balance: Balance<T> }`); any other shape is an error.

use crate::ids::{
    CoinType,
    ObjectId,
    SuiAddress,
    parse_coin_object_type,
};
use serde::{
    Deserialize,
    Deserializer,
};
use serde_json::Value;

/// Sui encodes u64 and i128 quantities as decimal strings.
fn u64_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn i128_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("object {id} unavailable: {reason}")]
    ObjectUnavailable { id: ObjectId, reason: String },
    #[error("object {id} does not match the game schema at `{path}`")]
    UnexpectedShape { id: ObjectId, path: &'static str },
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoinObject {
    pub coin_object_id: ObjectId,
    pub coin_type: String,
    #[serde(deserialize_with = "u64_from_string")]
    pub balance: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinPage {
    pub data: Vec<CoinObject>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

pub fn total_balance(coins: &[CoinObject]) -> u64 {
    coins
        .iter()
        .fold(0u64, |acc, coin| acc.saturating_add(coin.balance))
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub enum Owner {
    AddressOwner(SuiAddress),
    ObjectOwner(ObjectId),
    Shared {
        initial_shared_version: Value,
    },
    Immutable,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ObjectResponse {
    pub data: Option<ObjectData>,
    pub error: Option<Value>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub object_id: ObjectId,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub owner: Option<Owner>,
    pub content: Option<Value>,
}

impl ObjectResponse {
    pub fn into_data(self, id: ObjectId) -> Result<ObjectData, SchemaError> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(SchemaError::ObjectUnavailable {
                id,
                reason: error.to_string(),
            }),
            (None, None) => Err(SchemaError::ObjectUnavailable {
                id,
                reason: "empty response".to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolState {
    pub balance: u64,
}

#[derive(Deserialize)]
#[serde(tag = "dataType", rename_all = "camelCase")]
enum MoveContent {
    MoveObject { fields: GameFields },
    Package {},
}

#[derive(Deserialize)]
struct GameFields {
    #[serde(deserialize_with = "u64_from_string")]
    balance: u64,
}

impl ObjectData {
    pub fn decode_game_pool(&self) -> Result<PoolState, SchemaError> {
        let content = self.content.clone().ok_or(SchemaError::UnexpectedShape {
            id: self.object_id,
            path: "content",
        })?;
        match serde_json::from_value::<MoveContent>(content) {
            Ok(MoveContent::MoveObject { fields }) => Ok(PoolState {
                balance: fields.balance,
            }),
            Ok(MoveContent::Package {}) => Err(SchemaError::UnexpectedShape {
                id: self.object_id,
                path: "content.dataType",
            }),
            Err(_) => Err(SchemaError::UnexpectedShape {
                id: self.object_id,
                path: "content.fields.balance",
            }),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedObjectsPage {
    pub data: Vec<ObjectResponse>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBytes {
    pub tx_bytes: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ExecutionStatus {
    pub status: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Effects {
    pub status: ExecutionStatus,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub owner: Owner,
    pub coin_type: String,
    #[serde(deserialize_with = "i128_from_string")]
    pub amount: i128,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    #[serde(rename_all = "camelCase")]
    Created {
        owner: Owner,
        object_type: String,
        object_id: ObjectId,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub digest: String,
    pub effects: Option<Effects>,
    #[serde(default)]
    pub balance_changes: Vec<BalanceChange>,
    #[serde(default)]
    pub object_changes: Vec<ObjectChange>,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("transaction {digest} returned no effects")]
    MissingEffects { digest: String },
    #[error("transaction {digest} failed: {reason}")]
    Failed { digest: String, reason: String },
}

impl ExecutionResponse {
    pub fn ensure_success(&self) -> Result<(), ExecutionError> {
        let effects = self
            .effects
            .as_ref()
            .ok_or_else(|| ExecutionError::MissingEffects {
                digest: self.digest.clone(),
            })?;
        if effects.status.status == "success" {
            Ok(())
        } else {
            Err(ExecutionError::Failed {
                digest: self.digest.clone(),
                reason: effects
                    .status
                    .error
                    .clone()
                    .unwrap_or_else(|| effects.status.status.clone()),
            })
        }
    }

    /// Net change of `coin_type` held by `owner` across this transaction.
    pub fn net_balance_change(&self, owner: &SuiAddress, coin_type: &CoinType) -> i128 {
        self.balance_changes
            .iter()
            .filter(|change| matches!(&change.owner, Owner::AddressOwner(a) if a == owner))
            .filter(|change| {
                change
                    .coin_type
                    .parse::<CoinType>()
                    .is_ok_and(|ct| &ct == coin_type)
            })
            .map(|change| change.amount)
            .sum()
    }

    /// New `Coin<coin_type>` object sent to `owner`, if any.
    pub fn created_coin(&self, owner: &SuiAddress, coin_type: &CoinType) -> Option<ObjectId> {
        self.object_changes.iter().find_map(|change| match change {
            ObjectChange::Created {
                owner: Owner::AddressOwner(o),
                object_type,
                object_id,
            } if o == owner
                && parse_coin_object_type(object_type).as_ref() == Some(coin_type) =>
            {
                Some(*object_id)
            }
            _ => None,
        })
    }
}
