use crate::ids::SuiAddress;
use base64::{
    Engine,
    engine::general_purpose::STANDARD as BASE64,
};
use blake2::{
    Blake2b,
    Digest,
    digest::consts::U32,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ed25519_dalek::{
    Signer,
    SigningKey,
};

type Blake2b256 = Blake2b<U32>;

pub const ED25519_FLAG: u8 = 0x00;

/// `TransactionData` intent, version 0, Sui app id.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// Local ed25519 key used to sign game transactions.
#[derive(Clone)]
pub struct SuiKeypair {
    signing_key: SigningKey,
    address: SuiAddress,
}

impl std::fmt::Debug for SuiKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiKeypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SuiKeypair {
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let address = derive_address(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Decodes one `sui.keystore` entry. Returns `Ok(None)` for non-ed25519 schemes.
    pub fn from_keystore_entry(entry: &str) -> Result<Option<Self>> {
        let raw = BASE64
            .decode(entry.trim())
            .wrap_err("keystore entry is not valid base64")?;
        let Some((&flag, secret)) = raw.split_first() else {
            return Err(eyre!("keystore entry is empty"));
        };
        if flag != ED25519_FLAG {
            return Ok(None);
        }
        let secret: [u8; 32] = secret
            .try_into()
            .map_err(|_| eyre!("ed25519 keystore entry must carry 32 secret bytes, found {}", secret.len()))?;
        Ok(Some(Self::from_secret(secret)))
    }

    pub fn address(&self) -> SuiAddress {
        self.address
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Serialized signature `flag || sig || pubkey`, base64, over the intent digest of `tx_bytes`.
    pub fn sign_transaction(&self, tx_bytes: &[u8]) -> String {
        let digest = intent_digest(tx_bytes);
        let signature = self.signing_key.sign(&digest);

        let mut serialized = Vec::with_capacity(1 + 64 + 32);
        serialized.push(ED25519_FLAG);
        serialized.extend_from_slice(&signature.to_bytes());
        serialized.extend_from_slice(&self.public_key());
        BASE64.encode(serialized)
    }
}

pub fn intent_digest(tx_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(TRANSACTION_INTENT);
    hasher.update(tx_bytes);
    hasher.finalize().into()
}

pub fn derive_address(public_key: &[u8; 32]) -> SuiAddress {
    let mut hasher = Blake2b256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(public_key);
    SuiAddress::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use ed25519_dalek::{
        Signature,
        Verifier,
        VerifyingKey,
    };

    fn keystore_entry(flag: u8, secret: [u8; 32]) -> String {
        let mut raw = vec![flag];
        raw.extend_from_slice(&secret);
        BASE64.encode(raw)
    }

    #[test]
    fn from_keystore_entry__decodes_ed25519_and_skips_other_schemes() {
        // given
        let ed = keystore_entry(ED25519_FLAG, [7u8; 32]);
        let secp = keystore_entry(0x01, [7u8; 32]);

        // when
        let keypair = SuiKeypair::from_keystore_entry(&ed).unwrap();
        let skipped = SuiKeypair::from_keystore_entry(&secp).unwrap();

        // then
        assert_eq!(
            keypair.unwrap().address(),
            SuiKeypair::from_secret([7u8; 32]).address()
        );
        assert!(skipped.is_none());
    }

    #[test]
    fn from_keystore_entry__rejects_truncated_secret() {
        let entry = BASE64.encode([ED25519_FLAG, 1, 2, 3]);
        assert!(SuiKeypair::from_keystore_entry(&entry).is_err());
    }

    #[test]
    fn sign_transaction__produces_verifiable_serialized_signature() {
        // given
        let keypair = SuiKeypair::from_secret([42u8; 32]);
        let tx_bytes = b"transaction-data";

        // when
        let serialized = BASE64.decode(keypair.sign_transaction(tx_bytes)).unwrap();

        // then
        assert_eq!(serialized.len(), 97);
        assert_eq!(serialized[0], ED25519_FLAG);
        let signature = Signature::from_slice(&serialized[1..65]).unwrap();
        let public_key: [u8; 32] = serialized[65..].try_into().unwrap();
        assert_eq!(public_key, keypair.public_key());
        let verifying_key = VerifyingKey::from_bytes(&public_key).unwrap();
        verifying_key
            .verify(&intent_digest(tx_bytes), &signature)
            .unwrap();
    }

    #[test]
    fn derive_address__hashes_flag_and_public_key() {
        // given
        let keypair = SuiKeypair::from_secret([1u8; 32]);

        // when
        let mut hasher = Blake2b256::new();
        hasher.update([0u8]);
        hasher.update(keypair.public_key());
        let expected: [u8; 32] = hasher.finalize().into();

        // then
        assert_eq!(keypair.address().as_bytes(), &expected);
    }

    #[test]
    fn from_secret__matches_known_ed25519_address() {
        // given
        let secret: [u8; 32] =
            hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
                .unwrap()
                .try_into()
                .unwrap();

        // when
        let keypair = SuiKeypair::from_secret(secret);

        // then
        assert_eq!(
            hex::encode(keypair.public_key()),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );
        assert_eq!(
            hex::encode(keypair.address().as_bytes()),
            "304af458e90e97c841685b8cbbc59b909f3e2cf150df590ada4c81452c29737d"
        );
        assert_eq!(
            hex::encode(intent_digest(b"hello")),
            "721668b482762a913a793cc6c50fd5354c610c633e87e94975aa0d27ba72fef1"
        );
    }
}
