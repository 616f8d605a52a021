//! In-memory stand-in for a Sui node running the flip-coin package.
//!
//! Transactions built through [`FakeChain`] are held until executed, then
//! applied to a small ledger of coins, the game pool and the admin cap.

use crate::{
    deployment::{
        DeploymentRecord,
        GameDeployment,
    },
    ids::{
        CoinType,
        ObjectId,
        StructTag,
        SuiAddress,
    },
    rpc::{
        GameChain,
        TxBytes,
    },
    schema::{
        BalanceChange,
        CoinObject,
        Effects,
        ExecutionResponse,
        ExecutionStatus,
        ObjectChange,
        Owner,
        PoolState,
    },
    signer::SuiKeypair,
    transactions::{
        CallArg,
        MoveCall,
    },
};
use base64::{
    Engine,
    engine::general_purpose::STANDARD as BASE64,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    path::Path,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

pub fn player_keypair() -> SuiKeypair {
    SuiKeypair::from_secret([11u8; 32])
}

pub fn admin_keypair() -> SuiKeypair {
    SuiKeypair::from_secret([22u8; 32])
}

pub fn test_deployment() -> GameDeployment {
    let record = match DeploymentRecord::testnet_default() {
        Ok(record) => record,
        Err(err) => panic!("built-in deployment record is invalid: {err}"),
    };
    match GameDeployment::from_record(record, Path::new("deployment.json")) {
        Ok(deployment) => deployment,
        Err(err) => panic!("built-in deployment record is incomplete: {err}"),
    }
}

#[derive(Clone, Debug)]
enum PendingTx {
    Call { signer: SuiAddress, call: MoveCall },
    Pay {
        signer: SuiAddress,
        inputs: Vec<ObjectId>,
        recipient: SuiAddress,
        amount: u64,
    },
}

#[derive(Debug)]
struct Ledger {
    deployment: GameDeployment,
    coin_type: CoinType,
    coins: Vec<(SuiAddress, CoinObject)>,
    pool: u64,
    admin_cap: Option<(ObjectId, SuiAddress)>,
    flips: VecDeque<bool>,
    pending: HashMap<String, PendingTx>,
    next_object: u64,
    next_tx: u64,
    executed: Vec<String>,
    fail_next: Option<String>,
    offline: bool,
}

impl Ledger {
    fn fresh_id(&mut self) -> ObjectId {
        self.next_object += 1;
        let mut bytes = [0u8; 32];
        bytes[0] = 0xf0;
        bytes[24..].copy_from_slice(&self.next_object.to_be_bytes());
        ObjectId::new(bytes)
    }

    fn mint_coin(&mut self, owner: SuiAddress, balance: u64) -> ObjectId {
        let id = self.fresh_id();
        self.coins.push((
            owner,
            CoinObject {
                coin_object_id: id,
                coin_type: self.coin_type.to_string(),
                balance,
            },
        ));
        id
    }

    fn coin_balance(&self, owner: SuiAddress, id: ObjectId) -> Result<u64, String> {
        self.coins
            .iter()
            .find(|(o, c)| *o == owner && c.coin_object_id == id)
            .map(|(_, c)| c.balance)
            .ok_or_else(|| format!("coin {id} is not owned by {owner}"))
    }

    fn take_coin(&mut self, owner: SuiAddress, id: ObjectId) -> Result<u64, String> {
        let index = self
            .coins
            .iter()
            .position(|(o, c)| *o == owner && c.coin_object_id == id)
            .ok_or_else(|| format!("coin {id} is not owned by {owner}"))?;
        Ok(self.coins.remove(index).1.balance)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(eyre!("fake node is unreachable"));
        }
        Ok(())
    }
}

/// Shared handle; clones observe the same ledger.
#[derive(Clone, Debug)]
pub struct FakeChain {
    ledger: Arc<Mutex<Ledger>>,
}

impl FakeChain {
    pub fn new(deployment: &GameDeployment) -> Self {
        let ledger = Ledger {
            deployment: deployment.clone(),
            coin_type: deployment.record.coin_type(),
            coins: Vec::new(),
            pool: 0,
            admin_cap: None,
            flips: VecDeque::new(),
            pending: HashMap::new(),
            next_object: 0,
            next_tx: 0,
            executed: Vec::new(),
            fail_next: None,
            offline: false,
        };
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fund(&self, owner: SuiAddress, balance: u64) -> ObjectId {
        self.ledger().mint_coin(owner, balance)
    }

    pub fn set_pool(&self, balance: u64) {
        self.ledger().pool = balance;
    }

    pub fn pool(&self) -> u64 {
        self.ledger().pool
    }

    /// Places the admin cap at the configured id, or at a fresh id if none is configured.
    pub fn grant_admin(&self, owner: SuiAddress) -> ObjectId {
        let mut ledger = self.ledger();
        let id = match ledger.deployment.record.admin_cap_id {
            Some(id) => id,
            None => ledger.fresh_id(),
        };
        ledger.admin_cap = Some((id, owner));
        id
    }

    /// Queues coin flip results; `true` means the player wins. Unqueued flips lose.
    pub fn queue_flips(&self, wins: impl IntoIterator<Item = bool>) {
        self.ledger().flips.extend(wins);
    }

    pub fn fail_next_execution(&self, reason: impl Into<String>) {
        self.ledger().fail_next = Some(reason.into());
    }

    pub fn set_offline(&self, offline: bool) {
        self.ledger().offline = offline;
    }

    pub fn balance_of(&self, owner: SuiAddress) -> u64 {
        self.ledger()
            .coins
            .iter()
            .filter(|(o, _)| *o == owner)
            .map(|(_, c)| c.balance)
            .sum()
    }

    pub fn coin_count(&self, owner: SuiAddress) -> usize {
        self.ledger()
            .coins
            .iter()
            .filter(|(o, _)| *o == owner)
            .count()
    }

    /// Entry functions (and `pay`) executed successfully, in order.
    pub fn executed(&self) -> Vec<String> {
        self.ledger().executed.clone()
    }

    fn enqueue(&self, tx: PendingTx) -> Result<TxBytes> {
        let mut ledger = self.ledger();
        ledger.check_online()?;
        ledger.next_tx += 1;
        let raw = format!("fake-tx-{}", ledger.next_tx);
        let encoded = BASE64.encode(raw.as_bytes());
        ledger.pending.insert(encoded.clone(), tx);
        Ok(TxBytes::from_base64(encoded))
    }
}

fn object_arg(call: &MoveCall, index: usize) -> Result<ObjectId, String> {
    match call.arguments.get(index) {
        Some(CallArg::Object(id)) => Ok(*id),
        other => Err(format!("argument {index} should be an object, got {other:?}")),
    }
}

fn u64_arg(call: &MoveCall, index: usize) -> Result<u64, String> {
    match call.arguments.get(index) {
        Some(CallArg::U64(n)) => Ok(*n),
        other => Err(format!("argument {index} should be a u64, got {other:?}")),
    }
}

struct Applied {
    deltas: Vec<(SuiAddress, i128)>,
    created: Vec<(SuiAddress, ObjectId)>,
}

fn apply_call(ledger: &mut Ledger, signer: SuiAddress, call: &MoveCall) -> Result<Applied, String> {
    let game_id = ledger.deployment.game_object_id;
    match call.function.as_str() {
        "mint" => {
            let cap = object_arg(call, 0)?;
            if cap != ledger.deployment.treasury_cap_id {
                return Err(format!("{cap} is not the treasury cap"));
            }
            let amount = u64_arg(call, 1)?;
            let coin = ledger.mint_coin(signer, amount);
            Ok(Applied {
                deltas: vec![(signer, i128::from(amount))],
                created: vec![(signer, coin)],
            })
        }
        "play" => {
            if object_arg(call, 0)? != game_id {
                return Err("unknown game object".to_string());
            }
            let heads = match call.arguments.get(2) {
                Some(CallArg::Bool(b)) => *b,
                other => return Err(format!("argument 2 should be a bool, got {other:?}")),
            };
            let stake_id = object_arg(call, 3)?;
            if ledger.pool < ledger.coin_balance(signer, stake_id)?.saturating_mul(10) {
                return Err("MoveAbort(flip_coin::play, 1)".to_string());
            }
            let stake = ledger.take_coin(signer, stake_id)?;
            let won = ledger.flips.pop_front().unwrap_or(false);
            tracing::debug!(heads, won, stake, "fake flip");
            if won {
                ledger.pool -= stake;
                let payout = ledger.mint_coin(signer, stake * 2);
                Ok(Applied {
                    deltas: vec![(signer, i128::from(stake))],
                    created: vec![(signer, payout)],
                })
            } else {
                ledger.pool += stake;
                Ok(Applied {
                    deltas: vec![(signer, -i128::from(stake))],
                    created: Vec::new(),
                })
            }
        }
        "deposit" => {
            if object_arg(call, 0)? != game_id {
                return Err("unknown game object".to_string());
            }
            let amount = ledger.take_coin(signer, object_arg(call, 1)?)?;
            ledger.pool += amount;
            Ok(Applied {
                deltas: vec![(signer, -i128::from(amount))],
                created: Vec::new(),
            })
        }
        "withdraw" => {
            let cap = object_arg(call, 0)?;
            if ledger.admin_cap != Some((cap, signer)) {
                return Err("MoveAbort(flip_coin::withdraw, 0)".to_string());
            }
            let amount = u64_arg(call, 2)?;
            if amount > ledger.pool {
                return Err("MoveAbort(balance::split, 2)".to_string());
            }
            ledger.pool -= amount;
            let coin = ledger.mint_coin(signer, amount);
            Ok(Applied {
                deltas: vec![(signer, i128::from(amount))],
                created: vec![(signer, coin)],
            })
        }
        other => Err(format!("unknown entry function {other}")),
    }
}

fn apply_pay(
    ledger: &mut Ledger,
    signer: SuiAddress,
    inputs: &[ObjectId],
    recipient: SuiAddress,
    amount: u64,
) -> Result<Applied, String> {
    let Some((&primary, rest)) = inputs.split_first() else {
        return Err("pay requires at least one input coin".to_string());
    };
    let mut total = 0u64;
    for id in inputs {
        total += ledger.coin_balance(signer, *id)?;
    }
    if total < amount {
        return Err("InsufficientCoinBalance".to_string());
    }
    for id in rest {
        ledger.take_coin(signer, *id)?;
    }
    if let Some((_, coin)) = ledger
        .coins
        .iter_mut()
        .find(|(_, c)| c.coin_object_id == primary)
    {
        coin.balance = total - amount;
    }
    let created = ledger.mint_coin(recipient, amount);
    let deltas = if recipient == signer {
        Vec::new()
    } else {
        vec![(recipient, i128::from(amount)), (signer, -i128::from(amount))]
    };
    Ok(Applied {
        deltas,
        created: vec![(recipient, created)],
    })
}

fn response(ledger: &Ledger, digest: String, outcome: Result<Applied, String>) -> ExecutionResponse {
    match outcome {
        Ok(applied) => ExecutionResponse {
            digest,
            effects: Some(Effects {
                status: ExecutionStatus {
                    status: "success".to_string(),
                    error: None,
                },
            }),
            balance_changes: applied
                .deltas
                .into_iter()
                .filter(|(_, amount)| *amount != 0)
                .map(|(owner, amount)| BalanceChange {
                    owner: Owner::AddressOwner(owner),
                    coin_type: ledger.coin_type.to_string(),
                    amount,
                })
                .collect(),
            object_changes: applied
                .created
                .into_iter()
                .map(|(owner, object_id)| ObjectChange::Created {
                    owner: Owner::AddressOwner(owner),
                    object_type: crate::ids::coin_object_type(&ledger.coin_type),
                    object_id,
                })
                .collect(),
        },
        Err(reason) => ExecutionResponse {
            digest,
            effects: Some(Effects {
                status: ExecutionStatus {
                    status: "failure".to_string(),
                    error: Some(reason),
                },
            }),
            balance_changes: Vec::new(),
            object_changes: Vec::new(),
        },
    }
}

impl GameChain for FakeChain {
    async fn coins(&self, owner: SuiAddress, coin_type: &CoinType) -> Result<Vec<CoinObject>> {
        let ledger = self.ledger();
        ledger.check_online()?;
        if *coin_type != ledger.coin_type {
            return Ok(Vec::new());
        }
        Ok(ledger
            .coins
            .iter()
            .filter(|(o, _)| *o == owner)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn game_pool(&self, game: ObjectId) -> Result<PoolState> {
        let ledger = self.ledger();
        ledger.check_online()?;
        if game != ledger.deployment.game_object_id {
            return Err(eyre!("object {game} unavailable: notExists"));
        }
        Ok(PoolState {
            balance: ledger.pool,
        })
    }

    async fn object_owner(&self, id: ObjectId) -> Result<Owner> {
        let ledger = self.ledger();
        ledger.check_online()?;
        match ledger.admin_cap {
            Some((cap, owner)) if cap == id => Ok(Owner::AddressOwner(owner)),
            _ => Err(eyre!("object {id} unavailable: notExists")),
        }
    }

    async fn owned_objects_of_type(
        &self,
        owner: SuiAddress,
        struct_type: &StructTag,
    ) -> Result<Vec<ObjectId>> {
        let ledger = self.ledger();
        ledger.check_online()?;
        let admin_type = ledger.deployment.record.admin_cap_type();
        Ok(match ledger.admin_cap {
            Some((cap, holder)) if holder == owner && *struct_type == admin_type => vec![cap],
            _ => Vec::new(),
        })
    }

    async fn build_move_call(
        &self,
        signer: SuiAddress,
        call: &MoveCall,
        _gas_budget: u64,
    ) -> Result<TxBytes> {
        self.enqueue(PendingTx::Call {
            signer,
            call: call.clone(),
        })
    }

    async fn build_pay(
        &self,
        signer: SuiAddress,
        inputs: &[ObjectId],
        recipient: SuiAddress,
        amount: u64,
        _gas_budget: u64,
    ) -> Result<TxBytes> {
        self.enqueue(PendingTx::Pay {
            signer,
            inputs: inputs.to_vec(),
            recipient,
            amount,
        })
    }

    async fn execute(&self, tx: &TxBytes, signature: &str) -> Result<ExecutionResponse> {
        let mut ledger = self.ledger();
        ledger.check_online()?;
        if BASE64.decode(signature).map(|s| s.len()).unwrap_or_default() != 97 {
            return Err(eyre!("invalid user signature"));
        }
        let pending = ledger
            .pending
            .remove(tx.as_base64())
            .ok_or_else(|| eyre!("unknown transaction bytes"))?;
        let digest = format!("fake-{}", tx.as_base64());
        let (label, outcome) = match ledger.fail_next.take() {
            Some(reason) => ("failed".to_string(), Err(reason)),
            None => match &pending {
                PendingTx::Call { signer, call } => {
                    (call.function.clone(), apply_call(&mut ledger, *signer, call))
                }
                PendingTx::Pay {
                    signer,
                    inputs,
                    recipient,
                    amount,
                } => (
                    "pay".to_string(),
                    apply_pay(&mut ledger, *signer, inputs, *recipient, *amount),
                ),
            },
        };
        if outcome.is_ok() {
            ledger.executed.push(label);
        }
        Ok(response(&ledger, digest, outcome))
    }
}
