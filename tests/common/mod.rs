//! Common test utilities for ftp-harvest integration tests

#[allow(dead_code)]
pub mod doubles;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use doubles::*;
pub use fixtures::*;
