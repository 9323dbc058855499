//! Rate limiting logic and state management.

mod backend;
mod config;
mod distributed;
mod local;
mod result;
mod service;
mod subject;
mod window;

pub use backend::RateLimiterBackend;
pub use config::RateLimitConfig;
pub use distributed::DistributedRateLimiter;
pub use local::LocalRateLimiter;
pub use result::{RateLimitResult, RateLimitStatus, WindowUsage};
pub use service::RateLimiterService;
pub use subject::{SubjectKey, SubjectType};
pub use window::Window;
