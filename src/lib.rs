pub mod amount;

pub mod client;

pub mod deployment;

pub mod ids;

pub mod rpc;

pub mod schema;

pub mod signer;

pub mod transactions;

pub mod ui;

pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
