//! Portcullis — an admission gate for Docker containers.
//!
//! Single Rust binary. Watches container create/start events, resolves each
//! container's image digest, and stops or removes containers whose images are
//! not registered in the local trust policy. Every decision lands in an
//! append-only audit log.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod logging;
pub mod policy;
pub mod runtime;

pub mod decision;
pub mod enforce;
pub mod identity;
pub mod monitor;

pub mod register;
pub mod status;
