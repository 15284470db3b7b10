//! App - wiring and the loops that run around a queue.
//!
//! - **QueueConfig**: recognised options, env loading, validation
//! - **QueueBuilder**: fail-fast construction plus startup recovery
//! - **WorkerGroup**: consumers running a `MessageHandler`
//! - **ReloadLoop**: periodic reload of the recoverable backlog

pub mod builder;
pub mod config;
pub mod reload_loop;
pub mod worker_loop;

pub use self::builder::{BuildError, QueueApp, QueueBuilder};
pub use self::config::QueueConfig;
pub use self::reload_loop::ReloadLoop;
pub use self::worker_loop::{HandlerError, MessageHandler, WorkerGroup};
