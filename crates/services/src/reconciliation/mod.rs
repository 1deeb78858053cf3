pub mod auditor;
pub mod ports;
pub mod service;
pub mod trigger;

pub use auditor::{CurrentAssignment, CurrentAssignments};
pub use ports::{
    AssignmentSnapshot, AssociationKey, AuditStateRepository, ExitEvent, ExitHistory, ExitReason,
    ReconciliationError, ReconciliationReport, ReconciliationService, ReconciliationTrigger,
    SnapshotEntry,
};
pub use service::{ReconciliationServiceConfig, ReconciliationServiceImpl};
pub use trigger::{CoalescingTrigger, NoopTrigger};
