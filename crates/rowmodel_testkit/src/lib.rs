//! # rowmodel testkit
//!
//! Test utilities for rowmodel.
//!
//! This crate provides:
//! - [`SpyConnection`]: a call-recording connection with canned query results
//! - Fixture models and the [`TestOrm`] harness
//! - Property-based test generators using proptest
//! - Tracing setup for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowmodel_testkit::prelude::*;
//!
//! #[test]
//! fn creates_a_robot() {
//!     let t = TestOrm::new();
//!     let mut robot = t.orm.entity::<Robot>();
//!     robot.set("name", "R2-D2").unwrap();
//!     robot.create().unwrap();
//!     assert_eq!(t.spy.inserts(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod spy;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::spy::*;
}

pub use fixtures::*;
pub use generators::*;
pub use spy::*;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber that writes through the test harness.
///
/// Respects `RUST_LOG` and falls back to `warn`. Safe to call from every
/// test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
