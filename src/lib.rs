#![forbid(unsafe_code)]

pub mod config;
pub mod datamodel;
pub mod importers;
pub mod loader;
pub mod parsing;
pub mod queue;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
