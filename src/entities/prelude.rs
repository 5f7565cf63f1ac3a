#![allow(unused_imports)]

pub use super::faucet_limit::Entity as FaucetLimit;
pub use super::faucet_log::Entity as FaucetLog;
