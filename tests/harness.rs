#![allow(non_snake_case)]

use flip_coin_client::{
    client::{
        AppController,
        DEFAULT_GAS_BUDGET,
    },
    deployment::DeploymentEnv,
    signer::SuiKeypair,
    test_helpers::{
        FakeChain,
        test_deployment,
    },
};

mod integration {
    mod admin;
    mod mint;
    mod play;
}

pub fn new_chain() -> FakeChain {
    FakeChain::new(&test_deployment())
}

pub fn controller_for(chain: &FakeChain, keypair: SuiKeypair) -> AppController<FakeChain> {
    AppController::new(
        chain.clone(),
        keypair,
        test_deployment(),
        DeploymentEnv::Testnet,
        DEFAULT_GAS_BUDGET,
    )
}
