use crate::{
    controller_for,
    new_chain,
};
use flip_coin_client::{
    client::AdminStatus,
    test_helpers::{
        admin_keypair,
        player_keypair,
    },
};

#[tokio::test]
async fn deposit__moves_coins_into_the_pool() {
    // given
    let chain = new_chain();
    let player = player_keypair();
    let address = player.address();
    chain.fund(address, 10_000_000);
    chain.set_pool(5_000_000);
    let mut controller = controller_for(&chain, player);

    // when
    let tx = controller.deposit(4_000_000).await.unwrap();

    // then
    assert_eq!(tx.amount, 4_000_000);
    assert_eq!(chain.pool(), 9_000_000);
    assert_eq!(chain.balance_of(address), 6_000_000);
    assert_eq!(
        chain.executed(),
        vec!["pay".to_string(), "deposit".to_string()]
    );
}

#[tokio::test]
async fn deposit__fails_when_wallet_cannot_cover_amount() {
    let chain = new_chain();
    let player = player_keypair();
    chain.fund(player.address(), 1_000_000);
    let mut controller = controller_for(&chain, player);

    assert!(controller.deposit(2_000_000).await.is_err());
    assert!(chain.executed().is_empty());
}

#[tokio::test]
async fn withdraw__pays_the_admin_out_of_the_pool() {
    // given
    let chain = new_chain();
    let admin = admin_keypair();
    let address = admin.address();
    let cap = chain.grant_admin(address);
    chain.set_pool(50_000_000);
    let mut controller = controller_for(&chain, admin);

    // when
    let tx = controller.withdraw(20_000_000).await.unwrap();

    // then
    assert_eq!(tx.amount, 20_000_000);
    assert_eq!(chain.pool(), 30_000_000);
    assert_eq!(chain.balance_of(address), 20_000_000);
    assert_eq!(controller.admin_status(), AdminStatus::Admin(cap));
}

#[tokio::test]
async fn withdraw__is_refused_for_players_without_the_cap() {
    // given
    let chain = new_chain();
    chain.grant_admin(admin_keypair().address());
    chain.set_pool(50_000_000);
    let mut controller = controller_for(&chain, player_keypair());

    // when
    let err = controller.withdraw(1_000_000).await.unwrap_err();

    // then
    assert!(err.to_string().contains("admin-only"));
    assert_eq!(controller.admin_status(), AdminStatus::NotAdmin);
    assert_eq!(chain.pool(), 50_000_000);
}

#[tokio::test]
async fn withdraw__cannot_exceed_the_pool() {
    let chain = new_chain();
    let admin = admin_keypair();
    chain.grant_admin(admin.address());
    chain.set_pool(5_000_000);
    let mut controller = controller_for(&chain, admin);

    let err = controller.withdraw(6_000_000).await.unwrap_err();

    assert!(err.to_string().contains("pool holds 5 CDQ"));
    assert!(chain.executed().is_empty());
}
