//! Request admission: host and source-IP allow-listing, then per-client rate limiting.

mod gate;
mod policy;
mod rate_limiter;

pub use gate::{AccessGate, ClientRequest};
pub use policy::AccessPolicy;
pub use rate_limiter::RateLimiter;
