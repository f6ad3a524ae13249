//! Common test utilities for userdata-export integration tests

#[allow(dead_code)]
pub mod remote;
#[allow(dead_code)]
pub mod storage;

#[allow(unused_imports)]
pub use remote::*;
#[allow(unused_imports)]
pub use storage::*;
