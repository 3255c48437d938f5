// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`runner`] spawns external programs, either streaming their output to
//!   the operator or capturing it for parsing.
//! - [`compose`] resolves which compose front-end is installed and builds
//!   `-f <descriptor> <action...>` invocations on top of a runner.

pub mod compose;
pub mod runner;

pub use compose::Compose;
pub use runner::{BoxFuture, CapturedOutput, CommandRunner, SystemRunner};
