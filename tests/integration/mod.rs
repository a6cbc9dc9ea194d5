//! Integration test suite for regtest-pipeline.
//!
//! These tests register node lifecycles on a real `PipelineGraph` and
//! execute them through the `Scheduler`, checking ordering, idempotence
//! and isolation between instances.
//!
//! # Test Categories
//!
//! - `lifecycle_e2e`: start → stop → clean scenarios for one and two instances
//! - `ordering`: clean never overlaps or precedes stop
//! - `idempotence`: repeated start/stop/clean succeed without extra side effects
//! - `failures`: error propagation and duplicate registration
//! - `os_process`: the same flows against a real child process (unix only)
//!
//! Apart from `os_process`, every test uses the in-memory `MockNode`, so
//! no node binary is required.

mod fixtures;

mod failures;
mod lifecycle_e2e;
