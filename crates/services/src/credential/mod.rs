pub mod pool;
pub mod ports;
pub mod service;

pub use pool::{Capacity, CredentialHealth, CredentialPool, PoolPolicy};
pub use ports::{
    publish_instant, Credential, CredentialError, CredentialHealthReport, CredentialRepository,
    CredentialService, NewCredential, VersionKey,
};
pub use service::{CredentialServiceConfig, CredentialServiceImpl};
