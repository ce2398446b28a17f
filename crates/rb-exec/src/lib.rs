// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
//!
//! The crate-wide `unsafe_code` deny is lifted only inside [`child_io`],
//! which needs `libc::kill` to send `SIGTERM`/`SIGKILL` to a process by
//! pid; every other module stays free of it.

mod child_io;
mod engine;
mod env;
mod guard;
mod lines;

pub use child_io::{ChildHandle, SpawnMode};
pub use engine::{Engine, ExecEvent, ExecutionRequest};
pub use env::{build_child_env, InjectedPaths};
pub use guard::{ConcurrencyGuard, ExecutionPermit};
pub use lines::LineSplitter;
