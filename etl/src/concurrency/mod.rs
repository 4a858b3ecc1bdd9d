//! Concurrency primitives shared by extraction sessions.
//!
//! The [`gate`] module bounds how many requests are in flight against the remote API across all
//! sessions of a run. The [`shutdown`] module lets the binary stop a run between chunks.

pub mod gate;
pub mod shutdown;
