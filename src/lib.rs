//! A high-throughput, multi-worker parallel directory tree walker.
//!
//! [`engine::run`] wires every component together: the multi-root resolver
//! ([`roots`]), the file-backed path FIFO and worker bookkeeping
//! ([`fifo`]), the per-directory scan ([`scanner`]), orthogonal per-entry
//! behaviours ([`secondary`]), output formatting ([`formatter`]), and the
//! worker/manager thread pair ([`worker`], [`manager`]).

pub mod config;
pub mod dirent;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod formatter;
pub mod log;
pub mod manager;
pub mod outputdir;
pub mod privilege;
pub mod redact;
pub mod rlimit;
pub mod roots;
pub mod scanner;
pub mod secondary;
pub mod stats;
pub mod worker;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;
