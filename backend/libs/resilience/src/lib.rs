//! Resilience helpers shared by the ingest binaries
//!
//! - **Retry**: exponential backoff with jitter for transient failures,
//!   optionally restricted to errors a predicate accepts
//! - **Timeout**: enforces time limits on async operations such as the
//!   graceful shutdown drain
//!
//! # Example: retry a transient database write
//!
//! ```rust,no_run
//! use resilience::{with_retry_if, RetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RetryConfig::new(3, 200);
//!
//!     let result = with_retry_if(
//!         config,
//!         |e: &String| e.contains("timed out"),
//!         || async { Ok::<_, String>(()) },
//!     )
//!     .await;
//!     assert!(result.is_ok());
//! }
//! ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
