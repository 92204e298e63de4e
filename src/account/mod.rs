//! Account model and provisioning service:
//! - durable records for users, tribes and wallets
//! - atomic create-with-wallet operations
//! - pluggable tribe assignment

pub mod policy;
pub mod store;
pub mod types;

pub use policy::TribeAssignment;
pub use store::{AccountStore, TribeOutcome};
pub use types::{Account, EventState, ExternalId, Role, Tribe, TribeId, Wallet, WalletToken};
