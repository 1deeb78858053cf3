pub mod codec;
pub mod expiry;

pub use codec::{
    encode_all, normalize, parse, service_key, service_matches, RawSubscriptions,
    SubscriptionRecord,
};
pub use expiry::{days_remaining, expiry, AccessState, ExpiryPolicy, SubscriptionStatus};
