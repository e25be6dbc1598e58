//! The mirroring engine: snapshot trees, diff-driven reconciliation, and the
//! persisted library that lets restarts skip already-mirrored files.

pub mod library;
pub mod service;
pub mod snapshot;
pub mod sync;
