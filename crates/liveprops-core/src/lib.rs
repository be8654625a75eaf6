//! # liveprops-core
//!
//! Vocabulary shared by every liveprops crate:
//!
//! - [`Payload`], [`PropsMap`] and [`Params`]: the JSON shapes that flow from
//!   the channel transport into the props store
//! - [`Topic`]: validated channel topic names such as `"room:42"`
//! - [`LiveError`] and [`ErrorCategory`]: the unified error taxonomy
//! - [`MissingDataPolicy`]: the caller's choice when a declared dependency is
//!   absent
//!
//! This crate has no runtime behavior of its own.

pub mod error;
pub mod payload;
pub mod policy;
pub mod topic;

pub use error::{ErrorCategory, LiveError, LiveResult};
pub use payload::{lookup_field, Params, Payload, PropsMap};
pub use policy::MissingDataPolicy;
pub use topic::Topic;
