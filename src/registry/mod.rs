//! # Component Registration
//!
//! Producer discovery and resolution for the orchestration engine.

pub mod producer_registry;

pub use producer_registry::{
    CancelSignal, ProducerContext, ProducerError, ProducerMetadata, ProducerRegistry,
    ProgressHandle, RegistryStats, StepOutput, StepProducer,
};

#[cfg(test)]
pub(crate) use producer_registry::test_support;
