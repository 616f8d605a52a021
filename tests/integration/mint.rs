use crate::{
    controller_for,
    new_chain,
};
use flip_coin_client::test_helpers::player_keypair;

#[tokio::test]
async fn mint__credits_a_new_coin_to_the_wallet() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    let address = player.address();
    let mut controller = controller_for(&chain, player);

    // when
    let tx = controller.mint(10_000_000).await.unwrap();

    // then
    assert_eq!(tx.amount, 10_000_000);
    assert!(tx.digest.starts_with("fake-"));
    assert_eq!(chain.balance_of(address), 10_000_000);
    assert_eq!(chain.coin_count(address), 1);
    assert_eq!(chain.executed(), vec!["mint".to_string()]);
}

#[tokio::test]
async fn mint__refresh_sees_the_minted_balance() {
    // given
    let chain = new_chain();
    let mut controller = controller_for(&chain, player_keypair());
    controller.mint(2_500_000).await.unwrap();

    // when
    let state = controller.refresh().await.unwrap();

    // then
    assert_eq!(state.wallet_balance, 2_500_000);
    assert_eq!(state.coins.len(), 1);
}

#[tokio::test]
async fn mint__rejects_zero_without_submitting() {
    let chain = new_chain();
    let mut controller = controller_for(&chain, player_keypair());

    assert!(controller.mint(0).await.is_err());
    assert!(chain.executed().is_empty());
}

#[tokio::test]
async fn mint__reports_failed_execution() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    let address = player.address();
    let mut controller = controller_for(&chain, player);
    chain.fail_next_execution("InsufficientGas");

    // when
    let err = controller.mint(1_000_000).await.unwrap_err();

    // then
    assert!(format!("{err:#}").contains("InsufficientGas"));
    assert_eq!(chain.balance_of(address), 0);
}

#[tokio::test]
async fn refresh__surfaces_unreachable_node() {
    let chain = new_chain();
    let mut controller = controller_for(&chain, player_keypair());
    chain.set_offline(true);

    let err = controller.refresh().await.unwrap_err();

    assert!(format!("{err:#}").contains("unreachable"));
    assert!(controller.chain_state().is_none());
}
