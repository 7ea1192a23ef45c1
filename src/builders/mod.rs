//! Builders to construct scheduler components from configuration.

pub mod wrapper_builder;

pub use wrapper_builder::{build_memory_bounded_wrapper, WrapperBuilder};
