// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ferrata.io

//! RTPS endpoint model and behavior.
//!
//! An endpoint is a tagged variant, not a class hierarchy: writer or reader,
//! each stateless or stateful. The listen resource dispatches inbound
//! submessages by matching on the variant, which keeps dispatch exhaustive
//! at compile time.
//!
//! Reliability state machines:
//! - writer side: [`reader_proxy::ChangeForReader`] per reader x change
//! - reader side: [`writer_proxy::WriterProxy`] per matched writer

pub mod endpoint;
pub mod reader_proxy;
pub mod stateful_reader;
pub mod stateful_writer;
pub mod stateless_reader;
pub mod stateless_writer;
pub mod writer_proxy;

pub use endpoint::{Endpoint, EndpointAttributes, EndpointRole, ReaderState, TopicKind, WriterState};
pub use reader_proxy::{ChangeForReader, ChangeForReaderStatus, ReaderProxy};
pub use stateful_reader::StatefulReader;
pub use stateful_writer::StatefulWriter;
pub use stateless_reader::StatelessReader;
pub use stateless_writer::StatelessWriter;
pub use writer_proxy::{ChangeFromWriterStatus, WriterProxy};

use crate::cache::CacheChange;
use crate::types::Locator;

/// Outbound datagram sink.
///
/// The participant's send resource implements this over UDP; tests implement
/// it with an in-memory collector. Implementations must hand the datagram to
/// the kernel before returning (`send_sync` semantics).
pub trait MessageSender: Send + Sync {
    fn send(&self, locator: &Locator, datagram: &[u8]);
}

/// Reader-side user callback.
///
/// Invoked from protocol threads; implementations that may block should hand
/// off to their own executor instead of stalling the listen thread.
pub trait ReaderListener: Send + Sync {
    /// A new sample is available, delivered at most once per (writer, seq).
    fn on_data_available(&self, change: &CacheChange);

    /// The reader matched or unmatched a remote writer.
    fn on_writer_matched(&self, _matched: bool) {}
}

/// Writer-side user callback.
pub trait WriterListener: Send + Sync {
    /// The writer matched or unmatched a remote reader.
    fn on_reader_matched(&self, _matched: bool) {}

    /// Every matched reliable reader acknowledged everything written.
    fn on_all_acknowledged(&self) {}
}
