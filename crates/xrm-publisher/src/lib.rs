//! Resilient AMQP publisher: a worker pool with reconnect, publish
//! confirmation, and token-based credential refresh.

mod backoff;
mod credentials;
mod error;
mod pool;
mod session;

pub use backoff::{jittered_retry_delay, REINIT_DELAY, RECONNECT_DELAY};
pub use credentials::{has_embedded_credentials, resolve_and_watch, rewrite_with_token, POLL_INTERVAL};
pub use error::PublishError;
pub use pool::{PoolStats, PublisherConfig, PublisherPool};
pub use session::{ConnectionState, PublisherSession};
