//! Domain model for the documentation conversion service.
//!
//! Pure types only: the [`job::Job`] record and its lifecycle state
//! machine, structured converter progress, inbound request validation and
//! the status events streamed to observers. No I/O lives here.

pub mod error;
pub mod job;
pub mod progress;
pub mod request;
pub mod status_event;
pub mod types;
