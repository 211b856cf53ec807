#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod blueprint;
pub mod config;
mod core;
pub mod engine;
mod error;
mod fileset;
mod io;
pub mod notify;
pub mod paths;
pub mod pipeline;
pub mod reload;
pub mod steps;
pub mod theme;
pub mod toolchain;

#[cfg(test)]
mod testing;

pub use crate::blueprint::{Blueprint, TaskGraph};
pub use crate::config::{CONFIG_FILE, Config};
pub use crate::core::{Environment, Profile, TaskContext};
pub use crate::engine::{Outcome, Report, TaskExecution, WatchRule};
pub use crate::error::*;
pub use crate::fileset::{Entry, FileSet};
pub use crate::paths::{Category, Direction, PathResolver};
pub use crate::pipeline::{Asset, FileStep, Pipeline, Step, StepContext};
