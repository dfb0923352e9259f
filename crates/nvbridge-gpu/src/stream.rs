//! Bounded command-stream accumulator.
//!
//! Records are appended to a fixed-capacity byte buffer and handed to the
//! [`SubmissionBoundary`] in batches. Flushing happens three ways:
//!
//! - explicitly, via [`CommandStream::flush`];
//! - implicitly, when an incoming record would not fit;
//! - proactively, once the buffer passes the half-full watermark.
//!
//! Ordering is raw concatenation: bytes reach the boundary exactly in append
//! order. A failed explicit flush keeps the buffered bytes for retry; a
//! failed implicit flush aborts the append that needed it.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{SubmissionBoundary, SubmissionError, SubmissionId};

/// Default accumulator capacity.
pub const DEFAULT_STREAM_CAPACITY: usize = 1 << 20;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("command record must be non-empty and no larger than the stream capacity")]
    InvalidParameter,
    #[error("command submission failed: {0}")]
    Submission(#[from] SubmissionError),
}

/// Counters for observability; monotonically increasing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub records_appended: u64,
    pub bytes_appended: u64,
    pub flushes: u64,
    pub flush_failures: u64,
}

struct StreamBuffer {
    buf: Vec<u8>,
    cursor: usize,
    stats: StreamStats,
}

pub struct CommandStream {
    capacity: usize,
    boundary: Arc<dyn SubmissionBoundary>,
    inner: Mutex<StreamBuffer>,
}

impl CommandStream {
    pub fn new(capacity: usize, boundary: Arc<dyn SubmissionBoundary>) -> Self {
        Self {
            capacity,
            boundary,
            inner: Mutex::new(StreamBuffer {
                buf: vec![0; capacity],
                cursor: 0,
                stats: StreamStats::default(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered and not yet submitted.
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().cursor
    }

    pub fn stats(&self) -> StreamStats {
        self.inner.lock().unwrap().stats
    }

    /// Append one record, flushing first if it would not fit and afterwards
    /// if the buffer passes the half-full watermark.
    pub fn push(&self, record: &[u8]) -> Result<(), StreamError> {
        if record.is_empty() || record.len() > self.capacity {
            return Err(StreamError::InvalidParameter);
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.cursor + record.len() > self.capacity {
            // The record that triggered the flush is not buffered yet, so a
            // failure here leaves the stream exactly as it was.
            self.flush_locked(&mut inner)?;
        }

        let start = inner.cursor;
        inner.buf[start..start + record.len()].copy_from_slice(record);
        inner.cursor += record.len();
        inner.stats.records_appended += 1;
        inner.stats.bytes_appended += record.len() as u64;

        if inner.cursor >= self.capacity / 2 {
            // Proactive flush keeps latency down. The record is already
            // buffered at this point: a failure here only means the hand-off
            // did not happen, and the bytes ride the next successful flush.
            // Callers must not re-push the record on this error.
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Submit all buffered bytes. A no-op success when the buffer is empty.
    ///
    /// On failure the buffered bytes are retained; the caller may retry.
    pub fn flush(&self) -> Result<Option<SubmissionId>, StreamError> {
        let mut inner = self.inner.lock().unwrap();
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut StreamBuffer) -> Result<Option<SubmissionId>, StreamError> {
        if inner.cursor == 0 {
            return Ok(None);
        }
        match self.boundary.submit(&inner.buf[..inner.cursor]) {
            Ok(id) => {
                debug!(bytes = inner.cursor, id = id.0, "stream flush");
                inner.cursor = 0;
                inner.stats.flushes += 1;
                Ok(Some(id))
            }
            Err(err) => {
                warn!(bytes = inner.cursor, error = %err, "stream flush failed; bytes retained");
                inner.stats.flush_failures += 1;
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBoundary;

    fn stream(capacity: usize) -> (CommandStream, Arc<RecordingBoundary>) {
        let boundary = Arc::new(RecordingBoundary::new());
        (CommandStream::new(capacity, boundary.clone()), boundary)
    }

    #[test]
    fn empty_record_is_rejected() {
        let (s, _) = stream(64);
        assert_eq!(s.push(&[]), Err(StreamError::InvalidParameter));
    }

    #[test]
    fn appends_below_watermark_stay_buffered() {
        let (s, b) = stream(64);
        s.push(&[1, 2, 3]).unwrap();
        assert_eq!(s.pending(), 3);
        assert_eq!(b.submissions().len(), 0);

        let stats = s.stats();
        assert_eq!(stats.records_appended, 1);
        assert_eq!(stats.bytes_appended, 3);
        assert_eq!(stats.flushes, 0);
    }

    #[test]
    fn watermark_flushes_after_append() {
        let (s, b) = stream(8);
        // 4 bytes == capacity / 2, so the append itself flushes.
        s.push(&[1, 2, 3, 4]).unwrap();
        assert_eq!(s.pending(), 0);
        assert_eq!(b.submissions(), vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn overfull_append_flushes_prior_bytes_first() {
        let (s, b) = stream(10);
        s.push(&[1, 2, 3]).unwrap();
        s.push(&[4, 5, 6, 7, 8, 9, 10, 11]).unwrap();
        let subs = b.submissions();
        // First flush carries only the earlier bytes; the big record flushed
        // separately by the watermark.
        assert_eq!(subs[0], vec![1, 2, 3]);
        assert_eq!(subs[1], vec![4, 5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn failed_explicit_flush_retains_bytes() {
        let (s, b) = stream(64);
        s.push(&[9, 9]).unwrap();
        b.fail_next_submissions(1);
        assert!(matches!(s.flush(), Err(StreamError::Submission(_))));
        assert_eq!(s.pending(), 2);
        // Retry succeeds with the same bytes.
        assert!(s.flush().unwrap().is_some());
        assert_eq!(b.submissions(), vec![vec![9, 9]]);

        let stats = s.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.flush_failures, 1);
    }

    #[test]
    fn failed_watermark_flush_keeps_the_appended_record() {
        let (s, b) = stream(16);
        s.push(&[1, 2, 3, 4, 5, 6]).unwrap();
        b.fail_next_submissions(1);
        // The append succeeds and crosses the watermark; only the proactive
        // hand-off fails. All 12 bytes stay buffered for the next flush.
        assert!(matches!(
            s.push(&[7, 8, 9, 10, 11, 12]),
            Err(StreamError::Submission(_))
        ));
        assert_eq!(s.pending(), 12);
        assert_eq!(s.stats().flush_failures, 1);

        assert!(s.flush().unwrap().is_some());
        assert_eq!(
            b.submissions(),
            vec![vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]]
        );
    }

    #[test]
    fn implicit_flush_leaves_only_the_new_record() {
        let (s, b) = stream(16);
        s.push(&[1, 2, 3, 4, 5, 6]).unwrap();
        b.fail_next_submissions(1);
        // Failed watermark flush parks the buffer at 12 bytes, past the
        // watermark.
        let _ = s.push(&[7, 8, 9, 10, 11, 12]);
        assert_eq!(s.pending(), 12);

        // 12 + 6 > 16 forces the implicit flush; the new record then sits
        // alone in the buffer, below the watermark.
        s.push(&[13, 14, 15, 16, 17, 18]).unwrap();
        assert_eq!(s.pending(), 6);
        assert_eq!(
            b.submissions(),
            vec![vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]]
        );
    }

    #[test]
    fn failed_implicit_flush_aborts_append() {
        let (s, b) = stream(8);
        s.push(&[1, 2, 3]).unwrap();
        b.fail_next_submissions(1);
        // 3 + 6 > 8 forces an implicit flush, which fails; the new record is
        // never buffered.
        assert!(matches!(
            s.push(&[4, 5, 6, 7, 8, 9]),
            Err(StreamError::Submission(_))
        ));
        assert_eq!(s.pending(), 3);
        assert!(b.submissions().is_empty());
    }
}
