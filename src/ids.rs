use color_eyre::eyre::{
    Result,
    eyre,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::{
    fmt,
    str::FromStr,
};

pub const ID_LENGTH: usize = 32;

/// 32-byte Sui object id. Addresses share the same encoding.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId([u8; ID_LENGTH]);

pub type SuiAddress = ObjectId;

impl ObjectId {
    pub const fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ID_LENGTH]
    }

    /// `0x1234…abcd` form for narrow panels.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for ObjectId {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .trim()
            .strip_prefix("0x")
            .ok_or_else(|| eyre!("object id '{s}' must start with 0x"))?;
        if digits.is_empty() || digits.len() > ID_LENGTH * 2 {
            return Err(eyre!("object id '{s}' must have 1 to 64 hex digits"));
        }
        let padded = format!("{:0>64}", digits);
        let mut bytes = [0u8; ID_LENGTH];
        hex::decode_to_slice(padded, &mut bytes)
            .map_err(|e| eyre!("object id '{s}' is not valid hex: {e}"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ObjectId::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// The framework package hosting `coin::Coin`.
pub const SUI_FRAMEWORK: ObjectId = {
    let mut bytes = [0u8; ID_LENGTH];
    bytes[ID_LENGTH - 1] = 2;
    ObjectId(bytes)
};

/// Shared `0x8` randomness object.
pub const SUI_RANDOM: ObjectId = {
    let mut bytes = [0u8; ID_LENGTH];
    bytes[ID_LENGTH - 1] = 8;
    ObjectId(bytes)
};

/// Fully qualified Move struct tag without type parameters.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StructTag {
    pub package: ObjectId,
    pub module: String,
    pub name: String,
}

pub type CoinType = StructTag;

impl StructTag {
    pub fn new(package: ObjectId, module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package,
            module: module.into(),
            name: name.into(),
        }
    }
}

impl FromStr for StructTag {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split("::");
        let (Some(package), Some(module), Some(name), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(eyre!("type '{s}' is not of the form 0x…::module::Name"));
        };
        if name.contains('<') {
            return Err(eyre!("type '{s}' carries type parameters"));
        }
        Ok(Self::new(package.parse()?, module, name))
    }
}

impl fmt::Display for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.name)
    }
}

impl Serialize for StructTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StructTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        StructTag::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// `0x2::coin::Coin<T>` for the given coin type.
pub fn coin_object_type(coin_type: &CoinType) -> String {
    format!("{}::coin::Coin<{}>", SUI_FRAMEWORK, coin_type)
}

/// Extracts `T` from a `Coin<T>` object type, whatever address padding the node used.
pub fn parse_coin_object_type(object_type: &str) -> Option<CoinType> {
    let (outer, inner) = object_type.trim().split_once('<')?;
    let inner = inner.strip_suffix('>')?;
    let outer: StructTag = outer.parse().ok()?;
    if outer.package != SUI_FRAMEWORK || outer.module != "coin" || outer.name != "Coin" {
        return None;
    }
    inner.parse().ok()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn object_id__pads_short_forms() {
        // when
        let id: ObjectId = "0x8".parse().unwrap();

        // then
        assert_eq!(id, SUI_RANDOM);
        assert_eq!(
            id.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000008"
        );
    }

    #[test]
    fn object_id__rejects_missing_prefix_and_bad_hex() {
        assert!("1234".parse::<ObjectId>().is_err());
        assert!("0x".parse::<ObjectId>().is_err());
        assert!("0xzz".parse::<ObjectId>().is_err());
        assert!(format!("0x{}", "1".repeat(65)).parse::<ObjectId>().is_err());
    }

    #[test]
    fn object_id__serde_uses_hex_string() {
        let id: ObjectId = "0xabc".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_coin_object_type__matches_short_and_long_framework_address() {
        // given
        let coin_type: CoinType = "0x25fb::faucet_coin::FAUCET_COIN".parse().unwrap();
        let short = "0x2::coin::Coin<0x25fb::faucet_coin::FAUCET_COIN>";
        let long = coin_object_type(&coin_type);

        // then
        assert_eq!(parse_coin_object_type(short), Some(coin_type.clone()));
        assert_eq!(parse_coin_object_type(&long), Some(coin_type));
        assert_eq!(
            parse_coin_object_type("0x2::balance::Balance<0x2::sui::SUI>"),
            None
        );
    }
}
