pub mod cache;
pub mod client;
pub mod contract;
pub mod cooldown;
pub mod crypto;
pub mod ledger;
pub mod poll;
pub mod reconcile;
pub mod sim;
pub mod store;
pub mod types;

pub use cache::{cache_key, CacheError, CachePurpose, SecureCache};
pub use client::{LotteryClient, LotteryConfig, LotteryError, LotteryState, Round, WinnerStatus};
pub use contract::MoveCall;
pub use cooldown::DrawCooldown;
pub use crypto::{integrity_tag, sha256, verify_tag};
pub use ledger::{LedgerClient, LedgerError, WalletError, WalletSigner};
pub use poll::PollPolicy;
pub use reconcile::{reconcile, Reconciled};
pub use sim::SimLedger;
pub use store::{KvStore, MemoryStore, SledStore, StoreError};
pub use types::*;
