pub mod audit_state_repository;
pub mod credential_repository;
pub mod customer_repository;

pub use audit_state_repository::PostgresAuditStateRepository;
pub use credential_repository::PostgresCredentialRepository;
pub use customer_repository::PostgresCustomerRepository;
