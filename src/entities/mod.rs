pub mod faucet_limit;
pub mod faucet_log;
pub mod prelude;
