//! Shared test utilities for reposync integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a reconciler to scripted and failure-injecting fakes
//! - Builders for sync resources, bindings and templates

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
