//! In-process job update hub.
//!
//! - [`JobEventHub`]: per-job `tokio::sync::broadcast` channels carrying
//!   full [`Job`](omnidocs_core::job::Job) snapshots from the delegation
//!   task to status subscribers.

pub mod hub;

pub use hub::JobEventHub;
