//! aqea-worker library - stateless extraction worker
//!
//! Polls the master for a work unit, streams raw records from the
//! configured source extractor, converts each into an addressed AQEA entry,
//! and upserts them in batches with progress reports along the way. A
//! concurrent heartbeat loop keeps the master informed regardless of
//! pipeline state.

pub mod convert;
pub mod extractor;
pub mod fallback;
pub mod heartbeat;
pub mod master_client;
pub mod pipeline;
