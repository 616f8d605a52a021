use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use flip_coin_client::{
    amount::parse_coin_amount,
    client::{
        self,
        AppConfig,
        AppController,
        DEFAULT_GAS_BUDGET,
        DEFAULT_POLL_SECS,
        MINT_DEFAULT_COINS,
        WalletConfig,
    },
    deployment::{
        DeploymentEnv,
        DeploymentRecord,
        DeploymentStore,
    },
    ids::{
        ObjectId,
        SuiAddress,
    },
    rpc::SuiRpcClient,
    transactions::CoinSide,
    wallets,
};
use std::{
    sync::OnceLock,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "flip-coin.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "flip-coin",
    about = "Play the Sui coin-flip game from the terminal",
    version
)]
struct Cli {
    /// Network whose deployment record and default RPC endpoint are used
    #[arg(long, value_enum, default_value_t = DeploymentEnv::Testnet, global = true)]
    network: DeploymentEnv,

    /// Override the RPC URL for the selected network
    #[arg(long, env = "FLIP_COIN_RPC_URL", global = true)]
    rpc_url: Option<String>,

    /// Sui CLI keystore holding the player's key
    #[arg(long, default_value = wallets::DEFAULT_KEYSTORE_PATH, global = true)]
    keystore: String,

    /// Keystore address to play as (defaults to the first ed25519 key)
    #[arg(long, global = true)]
    address: Option<SuiAddress>,

    /// Encrypted wallet name to use instead of the Sui keystore
    #[arg(long, global = true)]
    wallet: Option<String>,

    /// Directory containing encrypted wallets (defaults to ~/.sui/wallets)
    #[arg(long, global = true)]
    wallet_dir: Option<String>,

    /// Gas budget attached to every transaction, in MIST
    #[arg(long, default_value_t = DEFAULT_GAS_BUDGET, global = true)]
    gas_budget: u64,

    /// Seconds between background wallet and pool refreshes
    #[arg(long, default_value_t = DEFAULT_POLL_SECS, global = true)]
    poll_secs: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,
    /// Print wallet balance, pool balance and bet range
    Balance,
    /// Mint faucet coins to the active address
    Mint {
        /// Amount in whole or fractional coins
        #[arg(default_value_t = MINT_DEFAULT_COINS.to_string())]
        amount: String,
    },
    /// Place a single bet
    Play {
        /// Stake in whole or fractional coins
        amount: String,
        #[arg(long, value_enum, default_value_t = CoinSide::Heads)]
        side: CoinSide,
    },
    /// Add coins to the game pool
    Deposit { amount: String },
    /// Take coins out of the game pool (AdminCap holder only)
    Withdraw { amount: String },
    /// Fetch an object from the node and print its JSON
    Object { id: ObjectId },
    /// Inspect or create the deployment record for the selected network
    Deployment {
        #[command(subcommand)]
        action: DeploymentAction,
    },
}

#[derive(Subcommand, Debug)]
enum DeploymentAction {
    /// Print the resolved deployment record
    Show,
    /// Write a deployment record (the published testnet ids on testnet, a blank template elsewhere)
    Init {
        /// Replace an existing record
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() -> Result<()> {
    let file_appender = rolling::daily(LOG_DIR, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD
        .set(guard)
        .map_err(|_| eyre!("tracing already initialised"))?;
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!(e))?;
    Ok(())
}

fn app_config(cli: &Cli) -> Result<AppConfig> {
    let wallet = match &cli.wallet {
        Some(name) => WalletConfig::Encrypted {
            name: name.clone(),
            dir: wallets::resolve_wallet_dir(cli.wallet_dir.as_deref())?,
        },
        None => WalletConfig::SuiKeystore {
            path: wallets::expand_path(&cli.keystore),
            address: cli.address,
        },
    };
    if cli.poll_secs == 0 {
        return Err(eyre!("--poll-secs must be at least 1"));
    }
    Ok(AppConfig {
        network: cli.network,
        rpc_url: cli.rpc_url.clone(),
        wallet,
        gas_budget: cli.gas_budget,
        poll_interval: Duration::from_secs(cli.poll_secs),
    })
}

async fn print_balance(config: &AppConfig) -> Result<()> {
    let mut controller = AppController::connect(config)?;
    controller.refresh().await?;
    let snap = controller.build_snapshot();
    println!("Network:  {}", snap.network);
    println!("Address:  {}", snap.address);
    println!(
        "Wallet:   {} in {} coin(s)",
        controller.format_amount(snap.wallet_balance),
        snap.coin_count
    );
    println!("Pool:     {}", controller.format_amount(snap.pool_balance));
    if snap.limits.can_play() {
        println!(
            "Bets:     {} to {}",
            controller.format_amount(snap.limits.min),
            controller.format_amount(snap.limits.max)
        );
    } else {
        println!("Bets:     disabled (pool or wallet too small)");
    }
    if let Some(cap) = snap.admin.cap() {
        println!("Admin:    yes (cap {cap})");
    }
    Ok(())
}

async fn print_object(cli: &Cli, id: ObjectId) -> Result<()> {
    let url = cli
        .rpc_url
        .clone()
        .unwrap_or_else(|| cli.network.default_rpc_url().to_string());
    let rpc = SuiRpcClient::new(url)?;
    let object = rpc.raw_object(id).await?;
    println!("{}", serde_json::to_string_pretty(&object)?);
    Ok(())
}

fn deployment_command(network: DeploymentEnv, action: DeploymentAction) -> Result<()> {
    let store = DeploymentStore::new(network)?;
    match action {
        DeploymentAction::Show => {
            let record = store.resolve()?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            let missing = record.missing_fields();
            if !missing.is_empty() {
                println!("Missing: {}", missing.join(", "));
            }
        }
        DeploymentAction::Init { force } => {
            if !force && store.load()?.is_some() {
                return Err(eyre!(
                    "{} already exists; pass --force to replace it",
                    store.path().display()
                ));
            }
            let record = match network {
                DeploymentEnv::Testnet => DeploymentRecord::testnet_default()?,
                _ => DeploymentRecord::template(),
            };
            store.save(&record)?;
            println!("Wrote {}", store.path().display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;
    let mut cli = Cli::parse();
    tracing::info!(network = %cli.network, "starting flip-coin");

    let command = cli.command.take().unwrap_or(Command::Tui);
    if let Command::Deployment { action } = command {
        return deployment_command(cli.network, action);
    }
    if let Command::Object { id } = command {
        return print_object(&cli, id).await;
    }
    let config = app_config(&cli)?;
    if let Command::Tui = command {
        return client::run_app(config).await;
    }
    if let Command::Balance = command {
        return print_balance(&config).await;
    }

    let mut controller = AppController::connect(&config)?;
    let decimals = controller.decimals();
    match command {
        Command::Mint { amount } => {
            let tx = controller.mint(parse_coin_amount(&amount, decimals)?).await?;
            println!("Minted {} ({})", controller.format_amount(tx.amount), tx.digest);
        }
        Command::Play { amount, side } => {
            let record = controller
                .play(parse_coin_amount(&amount, decimals)?, side)
                .await?;
            println!(
                "{}",
                client::describe_outcome(&record, |n| controller.format_amount(n))
            );
            println!("Digest: {}", record.digest);
        }
        Command::Deposit { amount } => {
            let tx = controller.deposit(parse_coin_amount(&amount, decimals)?).await?;
            println!("Deposited {} ({})", controller.format_amount(tx.amount), tx.digest);
        }
        Command::Withdraw { amount } => {
            let tx = controller.withdraw(parse_coin_amount(&amount, decimals)?).await?;
            println!("Withdrew {} ({})", controller.format_amount(tx.amount), tx.digest);
        }
        Command::Tui | Command::Balance | Command::Object { .. } | Command::Deployment { .. } => {}
    }
    Ok(())
}
