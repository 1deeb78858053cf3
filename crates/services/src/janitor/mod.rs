pub mod ports;
pub mod service;

pub use ports::{JanitorAction, JanitorError, JanitorReport, JanitorService, DEFAULT_BUFFER_DAYS};
pub use service::{plan, LifecycleJanitor, LifecycleJanitorConfig};
