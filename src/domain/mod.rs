mod account;
mod error;
mod merchant;
mod money;
mod pagination;
mod repository;
mod service_price;
mod transaction;

pub use account::*;
pub use error::DomainError;
pub use merchant::*;
pub use money::*;
pub use pagination::*;
pub use repository::*;
pub use service_price::*;
pub use transaction::*;
