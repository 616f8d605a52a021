use crate::{
    ids::SuiAddress,
    signer::SuiKeypair,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};
use tracing::warn;

pub const DEFAULT_KEYSTORE_PATH: &str = "~/.sui/sui_config/sui.keystore";

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".sui").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => Ok(expand_path(raw)),
        None => default_wallet_dir(),
    }
}

/// Every ed25519 key in a Sui CLI keystore, in file order.
pub fn load_keystore(path: &Path) -> Result<Vec<SuiKeypair>> {
    let data = fs::read(path)
        .wrap_err_with(|| format!("Failed to read keystore {}", path.display()))?;
    let entries: Vec<String> = serde_json::from_slice(&data)
        .wrap_err_with(|| format!("Keystore {} is not a JSON array of keys", path.display()))?;
    let mut keys = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match SuiKeypair::from_keystore_entry(entry)
            .wrap_err_with(|| format!("Invalid keystore entry #{index}"))?
        {
            Some(key) => keys.push(key),
            None => warn!(index, "skipping keystore entry with unsupported signature scheme"),
        }
    }
    Ok(keys)
}

/// Picks the key for `address`, or the first usable key.
pub fn select_keystore_key(
    keys: Vec<SuiKeypair>,
    address: Option<SuiAddress>,
    path: &Path,
) -> Result<SuiKeypair> {
    match address {
        Some(address) => keys
            .into_iter()
            .find(|k| k.address() == address)
            .ok_or_else(|| eyre!("Address {address} not found in keystore {}", path.display())),
        None => keys
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("Keystore {} holds no ed25519 keys", path.display())),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("wallet") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<SuiKeypair> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_wallet_with_password(descriptor, &password)
}

pub fn unlock_wallet_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<SuiKeypair> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    let secret: [u8; 32] = secret.as_slice().try_into().map_err(|_| {
        eyre!(
            "Wallet '{}' does not hold a 32-byte ed25519 secret",
            descriptor.name
        )
    })?;
    Ok(SuiKeypair::from_secret(secret))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use base64::{
        Engine,
        engine::general_purpose::STANDARD as BASE64,
    };
    use tempdir::TempDir;

    fn entry(flag: u8, fill: u8) -> String {
        let mut raw = vec![flag];
        raw.extend_from_slice(&[fill; 32]);
        BASE64.encode(raw)
    }

    #[test]
    fn load_keystore__keeps_ed25519_keys_in_order() {
        // given
        let dir = TempDir::new("keystore").unwrap();
        let path = dir.path().join("sui.keystore");
        let body = serde_json::to_string(&vec![entry(1, 9), entry(0, 3), entry(0, 4)]).unwrap();
        fs::write(&path, body).unwrap();

        // when
        let keys = load_keystore(&path).unwrap();

        // then
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].address(), SuiKeypair::from_secret([3; 32]).address());
        assert_eq!(keys[1].address(), SuiKeypair::from_secret([4; 32]).address());
    }

    #[test]
    fn select_keystore_key__matches_requested_address() {
        // given
        let keys = vec![SuiKeypair::from_secret([3; 32]), SuiKeypair::from_secret([4; 32])];
        let wanted = keys[1].address();

        // when
        let picked = select_keystore_key(keys, Some(wanted), Path::new("k")).unwrap();

        // then
        assert_eq!(picked.address(), wanted);
    }

    #[test]
    fn select_keystore_key__errors_on_unknown_address() {
        let keys = vec![SuiKeypair::from_secret([3; 32])];
        let other = SuiKeypair::from_secret([5; 32]).address();

        assert!(select_keystore_key(keys, Some(other), Path::new("k")).is_err());
        assert!(select_keystore_key(Vec::new(), None, Path::new("k")).is_err());
    }

    #[test]
    fn list_wallets__returns_sorted_wallet_files_only() {
        // given
        let dir = TempDir::new("wallets").unwrap();
        fs::write(dir.path().join("zed.wallet"), "{}").unwrap();
        fs::write(dir.path().join("alice.wallet"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
        assert!(find_wallet(dir.path(), "bob").is_err());
    }
}
