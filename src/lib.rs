pub mod config;
pub mod history;
pub mod ledger;
pub mod notify;
pub mod storage;
pub mod transaction;
pub mod units;
