pub mod assembler;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod planner;
pub mod queue;
pub mod segment;
pub mod sidecar;
pub mod task;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;
