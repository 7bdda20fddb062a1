//! Byte-stream decoding and response aggregation.

pub mod aggregator;
pub mod decoder;

pub use aggregator::{AggregateOutcome, AggregatorState, Draft, StreamAggregator};
pub use decoder::{decode_stream, Frame, Framing, StreamDecoder};
