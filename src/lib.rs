//! Honyaku - shape-preserving batch translation
//!
//! Accepts a string, a list of strings, or a keyed map of strings and lists,
//! fans every text out through detect, model preparation and translate steps
//! on a pluggable engine, and returns a result with the same shape.

pub mod assemble;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod orchestrator;
pub mod request;
pub mod shape;
pub mod sheet;
