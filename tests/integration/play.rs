use crate::{
    controller_for,
    new_chain,
};
use flip_coin_client::{
    amount::BetError,
    client::PlayOutcome,
    test_helpers::player_keypair,
    transactions::CoinSide,
};

#[tokio::test]
async fn play__win_pays_out_the_stake() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    let address = player.address();
    chain.fund(address, 5_000_000);
    chain.set_pool(100_000_000);
    chain.queue_flips([true]);
    let mut controller = controller_for(&chain, player);

    // when
    let record = controller.play(1_000_000, CoinSide::Tails).await.unwrap();

    // then
    assert_eq!(record.outcome, PlayOutcome::Won { payout: 1_000_000 });
    assert_eq!(record.side, CoinSide::Tails);
    assert_eq!(chain.balance_of(address), 6_000_000);
    assert_eq!(chain.pool(), 99_000_000);
}

#[tokio::test]
async fn play__loss_moves_the_stake_into_the_pool() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    let address = player.address();
    chain.fund(address, 5_000_000);
    chain.set_pool(100_000_000);
    let mut controller = controller_for(&chain, player);

    // when
    let record = controller.play(2_000_000, CoinSide::Heads).await.unwrap();

    // then
    assert_eq!(record.outcome, PlayOutcome::Lost { stake: 2_000_000 });
    assert_eq!(chain.balance_of(address), 3_000_000);
    assert_eq!(chain.pool(), 102_000_000);
    assert_eq!(controller.history().count(), 1);
}

#[tokio::test]
async fn play__uses_an_exact_coin_without_splitting() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    chain.fund(player.address(), 7_000_000);
    chain.fund(player.address(), 1_000_000);
    chain.set_pool(100_000_000);
    let mut controller = controller_for(&chain, player);

    // when
    controller.play(1_000_000, CoinSide::Heads).await.unwrap();

    // then
    assert_eq!(chain.executed(), vec!["play".to_string()]);
}

#[tokio::test]
async fn play__splits_a_stake_coin_when_no_coin_matches() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    let address = player.address();
    chain.fund(address, 2_000_000);
    chain.fund(address, 2_000_000);
    chain.set_pool(100_000_000);
    let mut controller = controller_for(&chain, player);

    // when
    controller.play(3_000_000, CoinSide::Heads).await.unwrap();

    // then
    assert_eq!(
        chain.executed(),
        vec!["pay".to_string(), "play".to_string()]
    );
    assert_eq!(chain.balance_of(address), 1_000_000);
    assert_eq!(chain.coin_count(address), 1);
}

#[tokio::test]
async fn play__rejects_bets_the_pool_cannot_cover() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    chain.fund(player.address(), 50_000_000);
    chain.set_pool(20_000_000);
    let mut controller = controller_for(&chain, player);

    // when
    let err = controller.play(3_000_000, CoinSide::Heads).await.unwrap_err();

    // then
    assert_eq!(
        err.downcast_ref::<BetError>(),
        Some(&BetError::PoolTooSmall {
            pool: 20_000_000,
            required: 30_000_000
        })
    );
    assert!(chain.executed().is_empty());
}

#[tokio::test]
async fn play__rejects_bets_below_minimum() {
    let chain = new_chain();
    let player = player_keypair();
    chain.fund(player.address(), 50_000_000);
    chain.set_pool(100_000_000);
    let mut controller = controller_for(&chain, player);

    let err = controller.play(999_999, CoinSide::Heads).await.unwrap_err();

    assert_eq!(
        err.downcast_ref::<BetError>(),
        Some(&BetError::BelowMinimum { min: 1_000_000 })
    );
}

#[tokio::test]
async fn play__rejects_bets_above_wallet_balance() {
    let chain = new_chain();
    let player = player_keypair();
    chain.fund(player.address(), 2_000_000);
    chain.set_pool(100_000_000);
    let mut controller = controller_for(&chain, player);

    let err = controller.play(3_000_000, CoinSide::Heads).await.unwrap_err();

    assert_eq!(
        err.downcast_ref::<BetError>(),
        Some(&BetError::AboveMaximum { max: 2_000_000 })
    );
}

#[tokio::test]
async fn play__failed_execution_keeps_history_empty() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    chain.fund(player.address(), 1_000_000);
    chain.set_pool(100_000_000);
    chain.fail_next_execution("MoveAbort(flip_coin::play, 1)");
    let mut controller = controller_for(&chain, player);

    // when
    let result = controller.play(1_000_000, CoinSide::Heads).await;

    // then
    assert!(result.is_err());
    assert_eq!(controller.history().count(), 0);
    assert_eq!(chain.pool(), 100_000_000);
}
