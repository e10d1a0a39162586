//! Request throttling
//!
//! The pieces that keep the crawler within what the upstream tolerates:
//! - Sliding-window admission control shared by all requests
//! - Gaussian pacing between requests
//! - Client identity rotation
//! - Exponential backoff for retries

mod identity;
mod limiter;
mod pacing;
mod retry;

pub use identity::{BrowserFamily, IdentityProfile, IdentityRotator, Platform};
pub use limiter::{AdmissionController, LimiterStats};
pub use pacing::PacingPolicy;
pub use retry::RetryPolicy;
