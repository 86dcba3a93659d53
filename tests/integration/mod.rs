//! Integration tests for the module host

mod boot;
mod module_lifecycle;
mod replication;
pub mod support;
