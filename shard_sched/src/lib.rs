//! Local (per basic block) instruction scheduler for the Shard shader
//! compiler backend.
//!
//! Given a basic block of fully lowered instructions, a latency oracle,
//! and an alias oracle, the scheduler reorders the block to minimize
//! modeled stalls on an in-order execution unit without ever violating
//! a data or control dependency.
//!
//! # Pipeline
//!
//! 1. [`graph::builder::GraphBuilder`] turns the instruction list into
//!    a dependency DAG with a single reverse bucket-based scan.
//! 2. [`graph::fusion`] optionally pairs complementary half-writes and
//!    chained dot-products into single nodes.
//! 3. [`scheduler::ListScheduler`] runs a priority-driven list
//!    scheduling loop with a modeled clock, consulting the
//!    [`heuristics`] chain at every pick.
//! 4. [`driver::LocalScheduler`] orchestrates the above per block,
//!    rewrites instruction lists in place, and reports statistics.
//!
//! Scheduling is deterministic: the same input, oracles, and
//! configuration produce byte-identical output.

pub mod config;
pub mod driver;
pub mod dump;
pub mod graph;
pub mod heuristics;
pub mod nops;
pub mod scheduler;
pub mod stats;

pub use config::SchedConfig;
pub use driver::LocalScheduler;
pub use graph::builder::GraphBuilder;
pub use graph::{DepGraph, NodeId};
pub use scheduler::{ListScheduler, Schedule};
pub use stats::{BlockStats, KernelStats};
