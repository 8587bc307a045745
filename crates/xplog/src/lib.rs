#![doc = include_str!("../../../README.md")]
//!

//! This crate re-exports the xplog library: data and event files, naming,
//! recovery and trigger matching.

pub use xplog_core::*;
