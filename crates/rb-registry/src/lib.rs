// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod manifest;
mod registry;
mod watch;

pub use manifest::MANIFEST_FILE_NAME;
pub use registry::{Mode, Registry};
pub use watch::{ChangeEvent, FileWatcher};
