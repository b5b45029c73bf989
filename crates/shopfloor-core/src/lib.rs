//! Operator lease service for shopfloor
//!
//! This crate is the heart of shopfloor, containing:
//! - Lease assignment and clearing (one operator per machine, time-bounded)
//! - The expiry sweeper (idle -> scanning -> idle, every sweep interval)
//! - The supervisor that keeps exactly one sweeper alive per process

mod error;
mod events;
mod service;
mod supervisor;
mod sweeper;

pub use error::*;
pub use events::*;
pub use service::*;
pub use supervisor::*;
pub use sweeper::*;
