use crate::{
    deployment::GameDeployment,
    ids::ObjectId,
    schema::CoinObject,
};
use serde_json::{
    Value,
    json,
};
use std::fmt;

/// Argument to a Move entry function, in the encoding `unsafe_moveCall` expects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallArg {
    Object(ObjectId),
    U64(u64),
    Bool(bool),
}

impl CallArg {
    pub fn to_json(&self) -> Value {
        match self {
            CallArg::Object(id) => Value::String(id.to_string()),
            CallArg::U64(n) => Value::String(n.to_string()),
            CallArg::Bool(b) => Value::Bool(*b),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }

    pub fn arguments_json(&self) -> Vec<Value> {
        self.arguments.iter().map(CallArg::to_json).collect()
    }

    pub fn type_arguments_json(&self) -> Vec<Value> {
        self.type_arguments
            .iter()
            .map(|t| json!(t))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum CoinSide {
    #[default]
    Heads,
    Tails,
}

impl CoinSide {
    pub fn toggle(self) -> Self {
        match self {
            CoinSide::Heads => CoinSide::Tails,
            CoinSide::Tails => CoinSide::Heads,
        }
    }

    /// The contract takes the guess as `true` for heads.
    pub fn as_choice(self) -> bool {
        matches!(self, CoinSide::Heads)
    }
}

impl fmt::Display for CoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinSide::Heads => write!(f, "Heads"),
            CoinSide::Tails => write!(f, "Tails"),
        }
    }
}

pub fn mint_call(deployment: &GameDeployment, amount: u64) -> MoveCall {
    let record = &deployment.record;
    MoveCall {
        package: record.coin_package_id,
        module: record.coin_module.clone(),
        function: "mint".to_string(),
        type_arguments: Vec::new(),
        arguments: vec![
            CallArg::Object(deployment.treasury_cap_id),
            CallArg::U64(amount),
        ],
    }
}

pub fn play_call(deployment: &GameDeployment, side: CoinSide, stake: ObjectId) -> MoveCall {
    let record = &deployment.record;
    MoveCall {
        package: record.game_package_id,
        module: record.game_module.clone(),
        function: "play".to_string(),
        type_arguments: Vec::new(),
        arguments: vec![
            CallArg::Object(deployment.game_object_id),
            CallArg::Object(record.random_id),
            CallArg::Bool(side.as_choice()),
            CallArg::Object(stake),
        ],
    }
}

pub fn deposit_call(deployment: &GameDeployment, coin: ObjectId) -> MoveCall {
    let record = &deployment.record;
    MoveCall {
        package: record.game_package_id,
        module: record.game_module.clone(),
        function: "deposit".to_string(),
        type_arguments: Vec::new(),
        arguments: vec![
            CallArg::Object(deployment.game_object_id),
            CallArg::Object(coin),
        ],
    }
}

pub fn withdraw_call(deployment: &GameDeployment, admin_cap: ObjectId, amount: u64) -> MoveCall {
    let record = &deployment.record;
    MoveCall {
        package: record.game_package_id,
        module: record.game_module.clone(),
        function: "withdraw".to_string(),
        type_arguments: Vec::new(),
        arguments: vec![
            CallArg::Object(admin_cap),
            CallArg::Object(deployment.game_object_id),
            CallArg::U64(amount),
        ],
    }
}

/// How to obtain a coin object worth exactly the stake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StakePlan {
    /// An owned coin already holds exactly the amount.
    Exact(ObjectId),
    /// Merge-and-split `inputs` into a fresh coin of the amount sent to self.
    Pay { inputs: Vec<ObjectId> },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("insufficient balance: need {needed} base units, wallet holds {available}")]
pub struct InsufficientBalance {
    pub needed: u64,
    pub available: u64,
}

pub fn plan_stake(coins: &[CoinObject], amount: u64) -> Result<StakePlan, InsufficientBalance> {
    if let Some(exact) = coins.iter().find(|c| c.balance == amount) {
        return Ok(StakePlan::Exact(exact.coin_object_id));
    }

    let mut by_balance: Vec<&CoinObject> = coins.iter().filter(|c| c.balance > 0).collect();
    by_balance.sort_by(|a, b| b.balance.cmp(&a.balance));

    let mut inputs = Vec::new();
    let mut gathered = 0u64;
    for coin in by_balance {
        inputs.push(coin.coin_object_id);
        gathered = gathered.saturating_add(coin.balance);
        if gathered >= amount {
            return Ok(StakePlan::Pay { inputs });
        }
    }
    Err(InsufficientBalance {
        needed: amount,
        available: gathered,
    })
}
