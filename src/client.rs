use crate::{
    amount::{
        BetLimits,
        format_coin_amount,
    },
    deployment::{
        DeploymentEnv,
        DeploymentStore,
        GameDeployment,
    },
    ids::{
        CoinType,
        ObjectId,
        SuiAddress,
    },
    rpc::{
        GameChain,
        SuiRpcClient,
        TxBytes,
    },
    schema::{
        CoinObject,
        ExecutionResponse,
        Owner,
        PoolState,
        total_balance,
    },
    signer::SuiKeypair,
    transactions::{
        CoinSide,
        MoveCall,
        StakePlan,
        deposit_call,
        mint_call,
        plan_stake,
        play_call,
        withdraw_call,
    },
    ui,
    wallets,
};
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    collections::VecDeque,
    path::PathBuf,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{
        self,
        Instant,
    },
};
use tracing::{
    error,
    info,
    warn,
};

pub const DEFAULT_GAS_BUDGET: u64 = 10_000_000;
pub const DEFAULT_POLL_SECS: u64 = 5;
pub const POST_TX_REFRESH_DELAY: Duration = Duration::from_secs(1);
pub const PLAY_HISTORY_DEPTH: usize = 10;
pub const MINT_DEFAULT_COINS: u64 = 10;
const MAX_ERRORS: usize = 50;
const REFRESH_FAILED: &str = "Refresh failed";

#[derive(Clone, Debug)]
pub enum WalletConfig {
    SuiKeystore {
        path: PathBuf,
        address: Option<SuiAddress>,
    },
    Encrypted {
        name: String,
        dir: PathBuf,
    },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: DeploymentEnv,
    pub rpc_url: Option<String>,
    pub wallet: WalletConfig,
    pub gas_budget: u64,
    pub poll_interval: Duration,
}

impl AppConfig {
    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdminStatus {
    Admin(ObjectId),
    NotAdmin,
    /// No admin cap is recorded and none was found in the wallet.
    Unconfigured,
}

impl AdminStatus {
    pub fn cap(&self) -> Option<ObjectId> {
        match self {
            AdminStatus::Admin(cap) => Some(*cap),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlayOutcome {
    Won { payout: u64 },
    Lost { stake: u64 },
    /// The transaction succeeded but moved no coins for the player.
    Undetermined,
}

impl PlayOutcome {
    pub fn from_net_change(net: i128) -> Self {
        match net {
            n if n > 0 => PlayOutcome::Won {
                payout: u64::try_from(n).unwrap_or(u64::MAX),
            },
            n if n < 0 => PlayOutcome::Lost {
                stake: u64::try_from(-n).unwrap_or(u64::MAX),
            },
            _ => PlayOutcome::Undetermined,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayRecord {
    pub played_at: DateTime<Utc>,
    pub side: CoinSide,
    pub stake: u64,
    pub outcome: PlayOutcome,
    pub digest: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxSummary {
    pub digest: String,
    pub amount: u64,
}

#[derive(Clone, Debug)]
pub struct ChainState {
    pub coins: Vec<CoinObject>,
    pub wallet_balance: u64,
    pub pool: PoolState,
    pub admin: AdminStatus,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: DeploymentEnv,
    pub address: SuiAddress,
    pub ticker: String,
    pub decimals: u8,
    pub loaded: bool,
    pub wallet_balance: u64,
    pub coin_count: usize,
    pub pool_balance: u64,
    pub limits: BetLimits,
    pub admin: AdminStatus,
    pub side: CoinSide,
    pub history: Vec<PlayRecord>,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub status: String,
    pub errors: Vec<String>,
}

pub async fn resolve_admin_status<C: GameChain>(
    chain: &C,
    owner: SuiAddress,
    deployment: &GameDeployment,
) -> Result<AdminStatus> {
    let configured = deployment
        .record
        .admin_cap_id
        .filter(|id| !id.is_zero());
    if let Some(cap) = configured {
        match chain.object_owner(cap).await {
            Ok(Owner::AddressOwner(holder)) if holder == owner => {
                return Ok(AdminStatus::Admin(cap));
            }
            Ok(_) => {}
            Err(err) => warn!(%cap, ?err, "admin cap lookup failed; scanning owned objects"),
        }
    }
    let discovered = chain
        .owned_objects_of_type(owner, &deployment.record.admin_cap_type())
        .await
        .wrap_err("admin cap discovery failed")?;
    Ok(match (discovered.first(), configured) {
        (Some(cap), _) => AdminStatus::Admin(*cap),
        (None, Some(_)) => AdminStatus::NotAdmin,
        (None, None) => AdminStatus::Unconfigured,
    })
}

pub async fn fetch_chain_state<C: GameChain>(
    chain: &C,
    owner: SuiAddress,
    deployment: &GameDeployment,
) -> Result<ChainState> {
    let coin_type = deployment.record.coin_type();
    let coins = chain
        .coins(owner, &coin_type)
        .await
        .wrap_err("fetching wallet coins failed")?;
    let pool = chain
        .game_pool(deployment.game_object_id)
        .await
        .wrap_err("fetching game pool failed")?;
    let admin = resolve_admin_status(chain, owner, deployment).await?;
    Ok(ChainState {
        wallet_balance: total_balance(&coins),
        coins,
        pool,
        admin,
        fetched_at: Utc::now(),
    })
}

pub fn load_keypair(config: &WalletConfig) -> Result<SuiKeypair> {
    match config {
        WalletConfig::SuiKeystore { path, address } => {
            let keys = wallets::load_keystore(path)?;
            wallets::select_keystore_key(keys, *address, path)
        }
        WalletConfig::Encrypted { name, dir } => {
            let descriptor = wallets::find_wallet(dir, name)?;
            wallets::unlock_wallet(&descriptor)
        }
    }
}

pub struct AppController<C: GameChain = SuiRpcClient> {
    chain: C,
    keypair: SuiKeypair,
    deployment: GameDeployment,
    coin_type: CoinType,
    network: DeploymentEnv,
    gas_budget: u64,
    pub side: CoinSide,
    pub status: String,
    errors: Vec<String>,
    history: VecDeque<PlayRecord>,
    chain_state: Option<ChainState>,
}

impl AppController<SuiRpcClient> {
    pub fn connect(config: &AppConfig) -> Result<Self> {
        let store = DeploymentStore::new(config.network)?;
        let record = store.resolve()?;
        let deployment = GameDeployment::from_record(record, store.path())?;
        let keypair = load_keypair(&config.wallet)?;
        let url = config.rpc_url();
        info!(network = %config.network, url, address = %keypair.address(), "connecting");
        let chain = SuiRpcClient::new(url)?;
        Ok(Self::new(
            chain,
            keypair,
            deployment,
            config.network,
            config.gas_budget,
        ))
    }
}

impl<C: GameChain> AppController<C> {
    pub fn new(
        chain: C,
        keypair: SuiKeypair,
        deployment: GameDeployment,
        network: DeploymentEnv,
        gas_budget: u64,
    ) -> Self {
        let coin_type = deployment.record.coin_type();
        Self {
            chain,
            keypair,
            deployment,
            coin_type,
            network,
            gas_budget,
            side: CoinSide::default(),
            status: String::from("Ready"),
            errors: Vec::new(),
            history: VecDeque::new(),
            chain_state: None,
        }
    }

    pub fn address(&self) -> SuiAddress {
        self.keypair.address()
    }

    pub fn deployment(&self) -> &GameDeployment {
        &self.deployment
    }

    pub fn decimals(&self) -> u8 {
        self.deployment.record.coin_decimals
    }

    pub fn format_amount(&self, base_units: u64) -> String {
        format!(
            "{} {}",
            format_coin_amount(base_units, self.decimals()),
            self.deployment.record.ticker()
        )
    }

    pub fn chain_state(&self) -> Option<&ChainState> {
        self.chain_state.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &PlayRecord> {
        self.history.iter()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn bet_limits(&self) -> BetLimits {
        let (pool, wallet) = self
            .chain_state
            .as_ref()
            .map(|s| (s.pool.balance, s.wallet_balance))
            .unwrap_or_default();
        let record = &self.deployment.record;
        BetLimits::compute(pool, wallet, record.min_bet, record.max_bet)
    }

    pub fn admin_status(&self) -> AdminStatus {
        self.chain_state
            .as_ref()
            .map(|s| s.admin)
            .unwrap_or(AdminStatus::Unconfigured)
    }

    pub fn toggle_side(&mut self) {
        self.side = self.side.toggle();
    }

    /// Stores a fresh chain state and drops refresh failures it supersedes.
    pub fn ingest_chain_state(&mut self, state: ChainState) {
        self.errors.retain(|e| !e.starts_with(REFRESH_FAILED));
        self.chain_state = Some(state);
    }

    pub async fn refresh(&mut self) -> Result<&ChainState> {
        let state = fetch_chain_state(&self.chain, self.address(), &self.deployment).await?;
        Ok(self.chain_state.insert(state))
    }

    pub fn build_snapshot(&self) -> AppSnapshot {
        let record = &self.deployment.record;
        let state = self.chain_state.as_ref();
        AppSnapshot {
            network: self.network,
            address: self.address(),
            ticker: record.ticker().to_string(),
            decimals: record.coin_decimals,
            loaded: state.is_some(),
            wallet_balance: state.map(|s| s.wallet_balance).unwrap_or_default(),
            coin_count: state.map(|s| s.coins.len()).unwrap_or_default(),
            pool_balance: state.map(|s| s.pool.balance).unwrap_or_default(),
            limits: self.bet_limits(),
            admin: self.admin_status(),
            side: self.side,
            history: self.history.iter().cloned().collect(),
            last_refreshed: state.map(|s| s.fetched_at),
            status: self.status.clone(),
            errors: self.errors.iter().rev().take(5).cloned().collect(),
        }
    }

    pub async fn mint(&mut self, amount: u64) -> Result<TxSummary> {
        if amount == 0 {
            return Err(eyre!("mint amount must be greater than zero"));
        }
        let call = mint_call(&self.deployment, amount);
        let response = self.execute_call(&call).await?;
        Ok(TxSummary {
            digest: response.digest,
            amount,
        })
    }

    pub async fn play(&mut self, amount: u64, side: CoinSide) -> Result<PlayRecord> {
        self.refresh().await?;
        self.bet_limits().check(amount)?;
        let stake = self.prepare_coin(amount).await?;
        let call = play_call(&self.deployment, side, stake);
        let response = self.execute_call(&call).await?;
        let net = response.net_balance_change(&self.address(), &self.coin_type);
        let record = PlayRecord {
            played_at: Utc::now(),
            side,
            stake: amount,
            outcome: PlayOutcome::from_net_change(net),
            digest: response.digest,
        };
        info!(?record.outcome, %side, amount, "coin flipped");
        self.record_play(record.clone());
        Ok(record)
    }

    pub async fn deposit(&mut self, amount: u64) -> Result<TxSummary> {
        if amount == 0 {
            return Err(eyre!("deposit amount must be greater than zero"));
        }
        let coin = self.prepare_coin(amount).await?;
        let call = deposit_call(&self.deployment, coin);
        let response = self.execute_call(&call).await?;
        Ok(TxSummary {
            digest: response.digest,
            amount,
        })
    }

    pub async fn withdraw(&mut self, amount: u64) -> Result<TxSummary> {
        if amount == 0 {
            return Err(eyre!("withdraw amount must be greater than zero"));
        }
        let state = self.refresh().await?;
        let pool = state.pool.balance;
        let Some(cap) = state.admin.cap() else {
            return Err(eyre!(
                "{} does not hold the game's AdminCap; withdraw is admin-only",
                self.address()
            ));
        };
        if amount > pool {
            return Err(eyre!(
                "cannot withdraw {}: pool holds {}",
                self.format_amount(amount),
                self.format_amount(pool)
            ));
        }
        let call = withdraw_call(&self.deployment, cap, amount);
        let response = self.execute_call(&call).await?;
        Ok(TxSummary {
            digest: response.digest,
            amount,
        })
    }

    fn record_play(&mut self, record: PlayRecord) {
        self.history.push_front(record);
        self.history.truncate(PLAY_HISTORY_DEPTH);
    }

    /// Returns a coin holding exactly `amount`, splitting one off when no coin matches.
    async fn prepare_coin(&self, amount: u64) -> Result<ObjectId> {
        let owner = self.address();
        let coins = self
            .chain
            .coins(owner, &self.coin_type)
            .await
            .wrap_err("fetching wallet coins failed")?;
        match plan_stake(&coins, amount)? {
            StakePlan::Exact(id) => Ok(id),
            StakePlan::Pay { inputs } => {
                info!(inputs = inputs.len(), amount, "splitting stake coin");
                let tx = self
                    .chain
                    .build_pay(owner, &inputs, owner, amount, self.gas_budget)
                    .await?;
                let response = self
                    .sign_and_execute(tx)
                    .await
                    .wrap_err("splitting stake coin failed")?;
                response
                    .created_coin(&owner, &self.coin_type)
                    .ok_or_else(|| {
                        eyre!("stake split {} created no coin for {owner}", response.digest)
                    })
            }
        }
    }

    async fn execute_call(&self, call: &MoveCall) -> Result<ExecutionResponse> {
        info!(target = %call.target(), "submitting move call");
        let tx = self
            .chain
            .build_move_call(self.address(), call, self.gas_budget)
            .await?;
        self.sign_and_execute(tx)
            .await
            .wrap_err_with(|| format!("{} transaction failed", call.function))
    }

    async fn sign_and_execute(&self, tx: TxBytes) -> Result<ExecutionResponse> {
        let bytes = tx.decode()?;
        let signature = self.keypair.sign_transaction(&bytes);
        let response = self.chain.execute(&tx, &signature).await?;
        response.ensure_success()?;
        info!(digest = %response.digest, "transaction executed");
        Ok(response)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }
}

pub fn describe_outcome(record: &PlayRecord, format: impl Fn(u64) -> String) -> String {
    match record.outcome {
        PlayOutcome::Won { payout } => {
            format!("{} it is! You won {}", record.side, format(payout))
        }
        PlayOutcome::Lost { stake } => {
            format!("Not {} this time. You lost {}", record.side, format(stake))
        }
        PlayOutcome::Undetermined => format!(
            "Flip {} executed but moved no coins; check the explorer",
            record.digest
        ),
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let controller = AppController::connect(&config)?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        controller,
        config.poll_interval,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;
    res
}

fn sync_status<C: GameChain>(
    controller: &mut AppController<C>,
    snapshot: &mut AppSnapshot,
    status: impl Into<String>,
) {
    controller.set_status(status);
    snapshot.status = controller.status.clone();
    snapshot.errors = controller.errors.iter().rev().take(5).cloned().collect();
}

fn sync_error<C: GameChain>(
    controller: &mut AppController<C>,
    snapshot: &mut AppSnapshot,
    error_msg: impl Into<String>,
) {
    controller.push_errors(vec![error_msg.into()]);
    snapshot.errors = controller.errors.iter().rev().take(5).cloned().collect();
    snapshot.status = controller.status.clone();
}

fn show_processing_status<C: GameChain>(
    controller: &mut AppController<C>,
    snapshot: &mut AppSnapshot,
    ui_state: &mut ui::UiState,
    message: impl Into<String>,
    context: &'static str,
) -> Result<()> {
    sync_status(controller, snapshot, message);
    ui::draw(ui_state, snapshot).wrap_err(context)
}

#[derive(Debug)]
enum SnapshotWorkerCommand {
    FetchNow,
    FetchAfter(Duration),
    Shutdown,
}

enum SnapshotWorkerEvent {
    Snapshot(Box<ChainState>),
    FetchFailed(String),
}

async fn snapshot_worker<C: GameChain>(
    poll_interval: Duration,
    chain: C,
    owner: SuiAddress,
    deployment: GameDeployment,
    mut cmd_rx: mpsc::UnboundedReceiver<SnapshotWorkerCommand>,
    snapshot_tx: mpsc::UnboundedSender<SnapshotWorkerEvent>,
) -> Result<()> {
    async fn fetch_snapshot<C: GameChain>(
        chain: &C,
        owner: SuiAddress,
        deployment: &GameDeployment,
        snapshot_tx: &mpsc::UnboundedSender<SnapshotWorkerEvent>,
    ) -> Result<()> {
        let event = match fetch_chain_state(chain, owner, deployment).await {
            Ok(state) => SnapshotWorkerEvent::Snapshot(Box::new(state)),
            Err(err) => {
                warn!(?err, "snapshot fetch failed");
                SnapshotWorkerEvent::FetchFailed(format!("{REFRESH_FAILED}: {err:#}"))
            }
        };
        snapshot_tx
            .send(event)
            .map_err(|_| eyre!("snapshot receiver dropped"))
    }

    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut deferred: Option<Instant> = None;

    loop {
        let deferred_at = deferred;
        let deferred_fetch = async move {
            match deferred_at {
                Some(at) => time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = ticker.tick() => {
                fetch_snapshot(&chain, owner, &deployment, &snapshot_tx).await?;
            }
            _ = deferred_fetch => {
                deferred = None;
                fetch_snapshot(&chain, owner, &deployment, &snapshot_tx).await?;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    SnapshotWorkerCommand::FetchNow => {
                        fetch_snapshot(&chain, owner, &deployment, &snapshot_tx).await?;
                    }
                    SnapshotWorkerCommand::FetchAfter(delay) => {
                        deferred = Some(Instant::now() + delay);
                    }
                    SnapshotWorkerCommand::Shutdown => break,
                }
            }
        }
    }
    Ok(())
}

async fn run_loop<C: GameChain>(
    mut controller: AppController<C>,
    poll_interval: Duration,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    let (snapshot_cmd_tx, snapshot_cmd_rx) = mpsc::unbounded_channel();
    let (snapshot_event_tx, mut snapshot_event_rx) = mpsc::unbounded_channel();
    let snapshot_handle = tokio::spawn(snapshot_worker(
        poll_interval,
        controller.chain.clone(),
        controller.address(),
        controller.deployment.clone(),
        snapshot_cmd_rx,
        snapshot_event_tx,
    ));

    controller.set_status("Loading wallet and pool...");
    let mut snapshot = controller.build_snapshot();
    ui::draw(ui_state, &snapshot).wrap_err("initial draw failed")?;
    let mut snapshot_worker_closed = false;

    loop {
        tokio::select! {
            maybe_event = snapshot_event_rx.recv() => {
                match maybe_event {
                    Some(SnapshotWorkerEvent::Snapshot(state)) => {
                        let first_load = controller.chain_state().is_none();
                        controller.ingest_chain_state(*state);
                        if first_load {
                            controller.set_status("Ready");
                        }
                        snapshot = controller.build_snapshot();
                        ui::draw(ui_state, &snapshot)
                            .wrap_err("draw after snapshot refresh failed")?;
                    }
                    Some(SnapshotWorkerEvent::FetchFailed(msg)) => {
                        sync_error(&mut controller, &mut snapshot, msg);
                        ui::draw(ui_state, &snapshot)
                            .wrap_err("draw after refresh failure failed")?;
                    }
                    None => {
                        warn!("snapshot worker channel closed");
                        snapshot_worker_closed = true;
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, &snapshot, event) else {
                    continue;
                };
                let (processing, result) = match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {
                        ui::draw(ui_state, &snapshot).wrap_err("redraw failed")?;
                        continue;
                    }
                    ui::UserEvent::ToggleSide => {
                        controller.toggle_side();
                        snapshot.side = controller.side;
                        ui::draw(ui_state, &snapshot)
                            .wrap_err("draw after side change failed")?;
                        continue;
                    }
                    ui::UserEvent::Refresh => {
                        let _ = snapshot_cmd_tx.send(SnapshotWorkerCommand::FetchNow);
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            "Refreshing...",
                            "draw while refreshing failed",
                        )?;
                        continue;
                    }
                    ui::UserEvent::Mint(amount) => {
                        let processing = format!("Minting {}...", controller.format_amount(amount));
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            processing,
                            "draw while minting failed",
                        )?;
                        let result = controller.mint(amount).await.map(|tx| {
                            format!("Minted {} ({})", controller.format_amount(tx.amount), tx.digest)
                        });
                        ("Mint", result)
                    }
                    ui::UserEvent::Play(amount) => {
                        let side = controller.side;
                        let processing = format!(
                            "Flipping for {} on {}...",
                            controller.format_amount(amount),
                            side
                        );
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            processing,
                            "draw while playing failed",
                        )?;
                        let result = controller.play(amount, side).await.map(|record| {
                            describe_outcome(&record, |n| controller.format_amount(n))
                        });
                        ("Play", result)
                    }
                    ui::UserEvent::Deposit(amount) => {
                        let processing = format!(
                            "Depositing {} into the pool...",
                            controller.format_amount(amount)
                        );
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            processing,
                            "draw while depositing failed",
                        )?;
                        let result = controller.deposit(amount).await.map(|tx| {
                            format!("Deposited {} ({})", controller.format_amount(tx.amount), tx.digest)
                        });
                        ("Deposit", result)
                    }
                    ui::UserEvent::Withdraw(amount) => {
                        let processing = format!(
                            "Withdrawing {} from the pool...",
                            controller.format_amount(amount)
                        );
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            processing,
                            "draw while withdrawing failed",
                        )?;
                        let result = controller.withdraw(amount).await.map(|tx| {
                            format!("Withdrew {} ({})", controller.format_amount(tx.amount), tx.digest)
                        });
                        ("Withdraw", result)
                    }
                };
                match result {
                    Ok(message) => {
                        snapshot = controller.build_snapshot();
                        sync_status(&mut controller, &mut snapshot, message);
                        let _ = snapshot_cmd_tx
                            .send(SnapshotWorkerCommand::FetchAfter(POST_TX_REFRESH_DELAY));
                    }
                    Err(e) => {
                        error!(error = ?e, "{processing} failed");
                        sync_error(&mut controller, &mut snapshot, format!("{processing} failed: {e:#}"));
                    }
                }
                ui::draw(ui_state, &snapshot).wrap_err("draw after action failed")?;
            }
        }
    }

    let _ = snapshot_cmd_tx.send(SnapshotWorkerCommand::Shutdown);
    match snapshot_handle.await {
        Ok(Ok(())) => {
            if snapshot_worker_closed {
                return Err(eyre!(
                    "Snapshot worker exited unexpectedly; check the RPC connection"
                ));
            }
        }
        Ok(Err(err)) => {
            return Err(err).wrap_err("snapshot worker failed");
        }
        Err(err) => {
            return Err(eyre!(err)).wrap_err("snapshot worker panicked");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::{
        FakeChain,
        admin_keypair,
        player_keypair,
        test_deployment,
    };

    fn controller_with(chain: &FakeChain, keypair: SuiKeypair) -> AppController<FakeChain> {
        AppController::new(
            chain.clone(),
            keypair,
            test_deployment(),
            DeploymentEnv::Testnet,
            DEFAULT_GAS_BUDGET,
        )
    }

    #[test]
    fn play_outcome__reads_sign_of_net_change() {
        assert_eq!(
            PlayOutcome::from_net_change(2_000_000),
            PlayOutcome::Won { payout: 2_000_000 }
        );
        assert_eq!(
            PlayOutcome::from_net_change(-1_000_000),
            PlayOutcome::Lost { stake: 1_000_000 }
        );
        assert_eq!(PlayOutcome::from_net_change(0), PlayOutcome::Undetermined);
    }

    #[tokio::test]
    async fn resolve_admin_status__reports_admin_for_configured_cap_holder() {
        // given
        let deployment = test_deployment();
        let chain = FakeChain::new(&deployment);
        let admin = admin_keypair().address();
        let cap = chain.grant_admin(admin);

        // when
        let admin_status = resolve_admin_status(&chain, admin, &deployment).await.unwrap();
        let player_status = resolve_admin_status(&chain, player_keypair().address(), &deployment)
            .await
            .unwrap();

        // then
        assert_eq!(admin_status, AdminStatus::Admin(cap));
        assert_eq!(player_status, AdminStatus::NotAdmin);
    }

    #[tokio::test]
    async fn resolve_admin_status__discovers_cap_when_none_is_recorded() {
        // given
        let mut deployment = test_deployment();
        deployment.record.admin_cap_id = None;
        let chain = FakeChain::new(&deployment);
        let admin = admin_keypair().address();

        // when
        let before = resolve_admin_status(&chain, admin, &deployment).await.unwrap();
        let cap = chain.grant_admin(admin);
        let after = resolve_admin_status(&chain, admin, &deployment).await.unwrap();

        // then
        assert_eq!(before, AdminStatus::Unconfigured);
        assert_eq!(after, AdminStatus::Admin(cap));
    }

    #[tokio::test]
    async fn build_snapshot__reflects_fetched_state_and_limits() {
        // given
        let chain = FakeChain::new(&test_deployment());
        let player = player_keypair();
        chain.fund(player.address(), 3_000_000);
        chain.fund(player.address(), 4_000_000);
        chain.set_pool(50_000_000);
        let mut controller = controller_with(&chain, player);

        // when
        controller.refresh().await.unwrap();
        let snapshot = controller.build_snapshot();

        // then
        assert!(snapshot.loaded);
        assert_eq!(snapshot.wallet_balance, 7_000_000);
        assert_eq!(snapshot.coin_count, 2);
        assert_eq!(snapshot.pool_balance, 50_000_000);
        assert_eq!(snapshot.limits.max, 5_000_000);
        assert_eq!(snapshot.ticker, "CDQ");
    }

    #[tokio::test]
    async fn play__records_history_newest_first_and_caps_depth() {
        // given
        let chain = FakeChain::new(&test_deployment());
        let player = player_keypair();
        chain.fund(player.address(), 100_000_000);
        chain.set_pool(1_000_000_000);
        chain.queue_flips([true]);
        let mut controller = controller_with(&chain, player);

        // when
        for _ in 0..PLAY_HISTORY_DEPTH + 2 {
            controller.play(1_000_000, CoinSide::Heads).await.unwrap();
        }

        // then
        let history: Vec<_> = controller.history().collect();
        assert_eq!(history.len(), PLAY_HISTORY_DEPTH);
        assert_eq!(history[0].outcome, PlayOutcome::Lost { stake: 1_000_000 });
        assert!(history[0].played_at >= history[1].played_at);
    }

    #[test]
    fn push_errors__keeps_most_recent_fifty() {
        // given
        let chain = FakeChain::new(&test_deployment());
        let mut controller = controller_with(&chain, player_keypair());

        // when
        controller.push_errors((0..60).map(|i| format!("e{i}")).collect());

        // then
        assert_eq!(controller.errors().len(), MAX_ERRORS);
        assert_eq!(controller.errors()[0], "e10");
        assert_eq!(controller.build_snapshot().errors[0], "e59");
    }

    #[test]
    fn describe_outcome__names_side_and_amount() {
        let record = PlayRecord {
            played_at: Utc::now(),
            side: CoinSide::Tails,
            stake: 1_000_000,
            outcome: PlayOutcome::Won { payout: 1_000_000 },
            digest: "d".to_string(),
        };

        let message = describe_outcome(&record, |n| format!("{n} units"));

        assert_eq!(message, "Tails it is! You won 1000000 units");
    }

    fn spawn_worker(
        chain: &FakeChain,
        owner: SuiAddress,
    ) -> (
        mpsc::UnboundedSender<SnapshotWorkerCommand>,
        mpsc::UnboundedReceiver<SnapshotWorkerEvent>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(snapshot_worker(
            Duration::from_secs(60),
            chain.clone(),
            owner,
            test_deployment(),
            cmd_rx,
            event_tx,
        ));
        (cmd_tx, event_rx, handle)
    }

    fn expect_snapshot(event: Option<SnapshotWorkerEvent>) -> ChainState {
        match event {
            Some(SnapshotWorkerEvent::Snapshot(state)) => *state,
            Some(SnapshotWorkerEvent::FetchFailed(msg)) => panic!("unexpected failure: {msg}"),
            None => panic!("snapshot worker closed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_worker__fetch_after_waits_for_the_delay() {
        // given
        let deployment = test_deployment();
        let chain = FakeChain::new(&deployment);
        let owner = player_keypair().address();
        chain.fund(owner, 5_000_000);
        let (cmd_tx, mut events, handle) = spawn_worker(&chain, owner);
        let initial = expect_snapshot(events.recv().await);
        assert_eq!(initial.wallet_balance, 5_000_000);

        // when
        chain.fund(owner, 2_000_000);
        let start = Instant::now();
        cmd_tx.send(SnapshotWorkerCommand::FetchAfter(POST_TX_REFRESH_DELAY)).unwrap();

        // then
        let early = time::timeout(Duration::from_millis(900), events.recv()).await;
        assert!(early.is_err(), "deferred fetch fired before its delay");
        let refreshed = expect_snapshot(events.recv().await);
        assert!(Instant::now() - start >= POST_TX_REFRESH_DELAY);
        assert_eq!(refreshed.wallet_balance, 7_000_000);

        cmd_tx.send(SnapshotWorkerCommand::Shutdown).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_worker__fetch_now_and_offline_node() {
        // given
        let deployment = test_deployment();
        let chain = FakeChain::new(&deployment);
        let owner = player_keypair().address();
        let (cmd_tx, mut events, handle) = spawn_worker(&chain, owner);
        expect_snapshot(events.recv().await);

        // when
        chain.fund(owner, 3_000_000);
        cmd_tx.send(SnapshotWorkerCommand::FetchNow).unwrap();
        let refreshed = expect_snapshot(events.recv().await);
        chain.set_offline(true);
        cmd_tx.send(SnapshotWorkerCommand::FetchNow).unwrap();
        let failed = events.recv().await;

        // then
        assert_eq!(refreshed.wallet_balance, 3_000_000);
        match failed {
            Some(SnapshotWorkerEvent::FetchFailed(msg)) => {
                assert!(msg.starts_with(REFRESH_FAILED), "got {msg}")
            }
            _ => panic!("offline node should yield a fetch failure"),
        }

        cmd_tx.send(SnapshotWorkerCommand::Shutdown).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_worker__polls_on_its_interval() {
        // given
        let deployment = test_deployment();
        let chain = FakeChain::new(&deployment);
        let owner = player_keypair().address();
        let (cmd_tx, mut events, handle) = spawn_worker(&chain, owner);
        expect_snapshot(events.recv().await);
        let start = Instant::now();

        // when
        let polled = expect_snapshot(events.recv().await);

        // then
        assert!(Instant::now() - start >= Duration::from_secs(60));
        assert_eq!(polled.wallet_balance, 0);

        drop(cmd_tx);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn ingest_chain_state__clears_stale_refresh_failures() {
        // given
        let deployment = test_deployment();
        let chain = FakeChain::new(&deployment);
        let mut controller = controller_with(&chain, player_keypair());
        let state = fetch_chain_state(&chain, controller.address(), &deployment)
            .await
            .unwrap();
        controller.push_errors(vec![
            format!("{REFRESH_FAILED}: node unreachable"),
            "Play failed: insufficient balance".to_string(),
        ]);

        // when
        controller.ingest_chain_state(state);

        // then
        assert_eq!(controller.errors(), ["Play failed: insufficient balance".to_string()]);
    }
}
