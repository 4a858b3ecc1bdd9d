//! Concurrent fetching of every page of a session.

pub mod chunks;
pub mod orchestrator;

pub use chunks::chunk_pages;
pub use orchestrator::{FetchOrchestrator, FetchOutput, FetchReport, PageOutcome};
