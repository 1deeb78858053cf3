pub mod allocation;
pub mod credential;
pub mod customer;
pub mod janitor;
pub mod reconciliation;
pub mod subscription;
pub mod test_helpers;
pub mod types;

pub use types::{CredentialId, CustomerId};
