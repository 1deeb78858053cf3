pub mod ports;
pub mod service;

pub use ports::{
    phone_key, AcknowledgmentMap, ChargeEntry, ChargeLog, Customer, CustomerError,
    CustomerRepository, CustomerService, ObservationNote,
};
pub use service::CustomerServiceImpl;
