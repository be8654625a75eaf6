//! liveprops testing infrastructure
//!
//! Shared setup for the integration tests of every liveprops crate:
//! tracing initialization, props fixtures and a [`Harness`] wiring an
//! in-memory transport and navigator into a live connection.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```rust,no_run
//! use liveprops_testkit::*;
//!
//! #[test]
//! fn my_test() {
//!     init_tracing();
//!     let harness = Harness::new(chat_snapshot());
//!     // ... test logic
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod logging;

pub use fixtures::*;
pub use harness::*;
pub use logging::*;
