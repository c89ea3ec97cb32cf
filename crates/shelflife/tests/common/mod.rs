//! Shared test utilities for shelflife integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp directory and database
//! - Builders for pipeline settings, config JSON and OCR receipt text

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
