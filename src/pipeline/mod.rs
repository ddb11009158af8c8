//! # Pipeline Module
//!
//! Producer/consumer plumbing of a measurement run.
//!
//! This module handles:
//! - The run lifecycle and the controller that drives it
//! - Scheduled fetching with a bounded per-request timeout
//! - Link status tracking from fetch outcomes
//! - Orchestrating producer, consumer and drain into a final report

pub mod link;
pub mod poller;
pub mod session;
pub mod state;
