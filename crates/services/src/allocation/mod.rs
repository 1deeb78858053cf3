pub mod allocator;
pub mod ports;
pub mod service;

pub use allocator::{
    active_clients, phone_hash, Allocator, Assignment, AssignmentStrategy, ConsistencyWarning,
};
pub use ports::{AllocationError, AllocationService, CustomerAssignment};
pub use service::{AllocationServiceConfig, AllocationServiceImpl};
