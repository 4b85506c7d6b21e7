// Application layer - ledger services wired to the repository contracts.
// Presentation adapters (the CLI) only talk to the services exported here.

pub mod config;
pub mod error;
pub mod ledger;
pub mod provisioning;
pub mod repositories;
pub mod transaction;
pub mod transfer;

pub use config::*;
pub use error::*;
pub use ledger::*;
pub use provisioning::*;
pub use repositories::*;
pub use transaction::*;
pub use transfer::*;
