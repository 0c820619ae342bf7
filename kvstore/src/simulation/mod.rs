//! Deterministic simulation support.
//!
//! This module provides an in-memory `Storage` implementation with seeded,
//! reproducible fault injection, used to run the node store and the B-tree
//! without touching the file system.
//!
//! # Design Principles
//!
//! 1. All I/O goes through the `Storage` trait and can be simulated
//! 2. All randomness is seeded, so a failing seed replays identically
//! 3. Faults can be injected at every I/O call
//!
//! # Usage
//!
//! ```ignore
//! use simulation::{FaultConfig, SimulatedStorage};
//!
//! let storage = SimulatedStorage::with_config(12345, FaultConfig::low_faults());
//! let nodes = NodeStorage::create(storage, PageLayout::new(1024, 11))?;
//! ```

mod storage;

pub use storage::{FaultConfig, SimulatedStorage, SimulatedStorageStats};
