#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Worker runtime primitives shared by the lectern check engine.
//!
//! The background recheck worker is a single dedicated OS thread; this crate
//! provides the pieces around it: execution classes for logging, named
//! thread spawning, generation-scoped cancellation and a status registry.

mod class;
mod panic;
mod registry;
mod spawn;
mod token;

pub use class::TaskClass;
pub use panic::panic_message;
pub use registry::{WorkerRecord, WorkerRegistry, WorkerState};
pub use spawn::spawn_named_thread;
pub use token::{GenerationClock, GenerationToken};
