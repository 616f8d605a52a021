use crate::{
    amount::COIN_DECIMALS,
    ids::{
        CoinType,
        ObjectId,
        SUI_RANDOM,
        StructTag,
    },
};
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENT_FILE: &str = "deployment.json";

pub const DEFAULT_MAINNET_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";
pub const DEFAULT_DEVNET_RPC_URL: &str = "https://fullnode.devnet.sui.io:443";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:9000";

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum DeploymentEnv {
    Mainnet,
    Testnet,
    Devnet,
    Localnet,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Mainnet => "mainnet",
            DeploymentEnv::Testnet => "testnet",
            DeploymentEnv::Devnet => "devnet",
            DeploymentEnv::Localnet => "localnet",
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            DeploymentEnv::Mainnet => DEFAULT_MAINNET_RPC_URL,
            DeploymentEnv::Testnet => DEFAULT_TESTNET_RPC_URL,
            DeploymentEnv::Devnet => DEFAULT_DEVNET_RPC_URL,
            DeploymentEnv::Localnet => DEFAULT_LOCAL_RPC_URL,
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Mainnet => "Mainnet",
            DeploymentEnv::Testnet => "Testnet",
            DeploymentEnv::Devnet => "Devnet",
            DeploymentEnv::Localnet => "Localnet",
        };
        write!(f, "{name}")
    }
}

/// Identifiers of the published game and faucet coin packages on one network.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub game_package_id: ObjectId,
    pub game_module: String,
    pub game_object_id: Option<ObjectId>,
    #[serde(default)]
    pub admin_cap_id: Option<ObjectId>,
    pub coin_package_id: ObjectId,
    pub coin_module: String,
    pub coin_struct: String,
    pub treasury_cap_id: Option<ObjectId>,
    #[serde(default = "default_random_id")]
    pub random_id: ObjectId,
    #[serde(default = "default_decimals")]
    pub coin_decimals: u8,
    #[serde(default)]
    pub coin_ticker: Option<String>,
    pub min_bet: u64,
    #[serde(default)]
    pub max_bet: Option<u64>,
}

fn default_random_id() -> ObjectId {
    SUI_RANDOM
}

fn default_decimals() -> u8 {
    COIN_DECIMALS
}

impl DeploymentRecord {
    /// The published testnet deployment the game shipped with.
    pub fn testnet_default() -> Result<Self> {
        Ok(Self {
            recorded_at: Utc::now().to_rfc3339(),
            game_package_id:
                "0x4c194e5cfaf4a52ad9c92408ededad9ab0aaa2ee0391daa7aa1e8b9b3beef916"
                    .parse()?,
            game_module: "flip_coin".to_string(),
            game_object_id: Some(
                "0xfa660dd94024e163a9d7615c4cf5b569cfc8ff4178176aa59c1e0e887fbbc647"
                    .parse()?,
            ),
            admin_cap_id: Some(
                "0x494fc91bf3ce383f3a2d87e482734ea3d8b6cdbf5e651270656c2fad2830a483"
                    .parse()?,
            ),
            coin_package_id:
                "0x25fbc1ddd967fd9a06c9ac3c0ad5dfa480cc4f97060ee5da44f67eed52b178b1"
                    .parse()?,
            coin_module: "faucet_coin".to_string(),
            coin_struct: "FAUCET_COIN".to_string(),
            treasury_cap_id: Some(
                "0xc64c286ab65f13766151f05a10e5a81125396dfa4bb3b1d41c36a9b2ab15b197"
                    .parse()?,
            ),
            random_id: SUI_RANDOM,
            coin_decimals: COIN_DECIMALS,
            coin_ticker: Some("CDQ".to_string()),
            min_bet: 1_000_000,
            max_bet: None,
        })
    }

    /// Blank record for a network the game has not been published to yet.
    pub fn template() -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            game_package_id: ObjectId::default(),
            game_module: "flip_coin".to_string(),
            game_object_id: None,
            admin_cap_id: None,
            coin_package_id: ObjectId::default(),
            coin_module: "faucet_coin".to_string(),
            coin_struct: "FAUCET_COIN".to_string(),
            treasury_cap_id: None,
            random_id: SUI_RANDOM,
            coin_decimals: COIN_DECIMALS,
            coin_ticker: None,
            min_bet: 1_000_000,
            max_bet: None,
        }
    }

    pub fn coin_type(&self) -> CoinType {
        StructTag::new(self.coin_package_id, &self.coin_module, &self.coin_struct)
    }

    pub fn admin_cap_type(&self) -> StructTag {
        StructTag::new(self.game_package_id, &self.game_module, "AdminCap")
    }

    pub fn ticker(&self) -> &str {
        self.coin_ticker.as_deref().unwrap_or(&self.coin_struct)
    }

    /// Identifiers without which no game transaction can be built.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.game_object_id.is_none_or(|id| id.is_zero()) {
            missing.push("game_object_id");
        }
        if self.treasury_cap_id.is_none_or(|id| id.is_zero()) {
            missing.push("treasury_cap_id");
        }
        missing
    }
}

/// Deployment record plus the two ids that must be present to play.
#[derive(Clone, Debug)]
pub struct GameDeployment {
    pub record: DeploymentRecord,
    pub game_object_id: ObjectId,
    pub treasury_cap_id: ObjectId,
}

impl GameDeployment {
    pub fn from_record(record: DeploymentRecord, store_path: &Path) -> Result<Self> {
        let missing = record.missing_fields();
        if !missing.is_empty() {
            return Err(eyre!(
                "Deployment record {} is incomplete: set {}",
                store_path.display(),
                missing.join(", ")
            ));
        }
        let (Some(game_object_id), Some(treasury_cap_id)) =
            (record.game_object_id, record.treasury_cap_id)
        else {
            return Err(eyre!("Deployment record {} is incomplete", store_path.display()));
        };
        Ok(Self {
            record,
            game_object_id,
            treasury_cap_id,
        })
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    env: DeploymentEnv,
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::at(DEPLOYMENTS_ROOT, env)
    }

    pub fn at(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { env, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        write_record(&self.path, record)
    }

    /// Stored record, falling back to the built-in record on testnet.
    pub fn resolve(&self) -> Result<DeploymentRecord> {
        if let Some(record) = self.load()? {
            return Ok(record);
        }
        match self.env {
            DeploymentEnv::Testnet => DeploymentRecord::testnet_default(),
            env => Err(eyre!(format_missing_summary(env, self))),
        }
    }
}

fn format_missing_summary(env: DeploymentEnv, store: &DeploymentStore) -> String {
    format!(
        "No deployment recorded for {env}.\n\nDeployment records file: {}\n\n\
         Run `flip-coin --network {} deployment init` and fill in the package and object ids.",
        store.path().display(),
        env.dir_name(),
    )
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).wrap_err_with(|| {
            format!(
                "Failed to create deployment directory {}",
                env_dir.display()
            )
        })?;
    }
    Ok(env_dir.join(DEPLOYMENT_FILE))
}

fn read_record(path: &Path) -> Result<Option<DeploymentRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).wrap_err("Failed to read deployment record")?;
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    let record = serde_json::from_slice::<DeploymentRecord>(&data)
        .wrap_err_with(|| format!("Failed to parse deployment record {}", path.display()))?;
    Ok(Some(record))
}

fn write_record(path: &Path, record: &DeploymentRecord) -> Result<()> {
    let json =
        serde_json::to_vec_pretty(record).wrap_err("Failed to serialize deployment record")?;
    fs::write(path, json).wrap_err("Failed to write deployment record")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::amount::BetLimits;
    use tempdir::TempDir;

    #[test]
    fn resolve__falls_back_to_builtin_record_on_testnet() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Testnet).unwrap();

        // when
        let record = store.resolve().unwrap();

        // then
        assert_eq!(record.game_module, "flip_coin");
        assert_eq!(
            record.coin_type().to_string(),
            "0x25fbc1ddd967fd9a06c9ac3c0ad5dfa480cc4f97060ee5da44f67eed52b178b1::faucet_coin::FAUCET_COIN"
        );
        assert!(record.missing_fields().is_empty());
    }

    #[test]
    fn resolve__errors_with_store_path_when_other_network_is_unrecorded() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Devnet).unwrap();

        // when
        let err = store.resolve().unwrap_err().to_string();

        // then
        assert!(err.contains("No deployment recorded for Devnet"));
        assert!(err.contains("deployment.json"));
    }

    #[test]
    fn save__persists_record_for_later_load() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::at(dir.path(), DeploymentEnv::Localnet).unwrap();
        let mut record = DeploymentRecord::testnet_default().unwrap();
        record.max_bet = Some(5_000_000);

        // when
        store.save(&record).unwrap();

        // then
        assert_eq!(store.load().unwrap(), Some(record));
    }

    #[test]
    fn game_deployment__requires_game_object_and_treasury_cap() {
        // given
        let mut record = DeploymentRecord::testnet_default().unwrap();
        record.game_object_id = None;
        record.treasury_cap_id = Some(ObjectId::default());

        // when
        let err = GameDeployment::from_record(record, Path::new("x.json"))
            .unwrap_err()
            .to_string();

        // then
        assert!(err.contains("game_object_id, treasury_cap_id"));
    }

    #[test]
    fn template__is_incomplete_until_ids_are_filled_in() {
        let record = DeploymentRecord::template();
        assert_eq!(
            record.missing_fields(),
            vec!["game_object_id", "treasury_cap_id"]
        );
        assert!(record.game_package_id.is_zero());
    }

    #[test]
    fn testnet_default__bounds_bets_by_pool_and_wallet_only() {
        // given
        let record = DeploymentRecord::testnet_default().unwrap();

        // when
        let limits = BetLimits::compute(1_000_000_000, 50_000_000, record.min_bet, record.max_bet);

        // then
        assert_eq!(record.max_bet, None);
        assert_eq!(limits.max, 50_000_000);
        assert_eq!(limits.check(15_000_000), Ok(()));
    }
}
