//! The work queue processor: a single-consumer loop that drains
//! [`a2a_storage::Storage`]'s FIFO queue and drives each task through the
//! agent execution loop, plus a parallel cleanup ticker.

pub mod processor;

pub use processor::Processor;
