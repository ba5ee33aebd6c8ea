//! the test_utils folder here will share utils or test components between
//! unit tests across modules
mod certs;
mod common;

pub use certs::*;
pub use common::*;
