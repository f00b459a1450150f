//! Orchestration Pipeline library: collaborator clients (C1), plan parser
//! (C2), safety validator (C3), action executor (C4), pipeline engine (C5),
//! HTTP/WS surface (C6), and configuration (C7).
//!
//! `main.rs` is a thin binary shell over this library so that integration
//! tests and benches can drive the pipeline without spawning a process.

pub mod api;
pub mod clients;
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod planner;
pub mod prompt;
pub mod safety;
