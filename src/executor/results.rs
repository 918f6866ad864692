//! ScanResultIterator
//!
//! A closeable, forward-only sequence of entries that owns every scan handle
//! opened for one query. Ownership is an explicit state:
//!
//! ```text
//! Released                      nothing held
//! Single(h)                     direct spatio-temporal scan
//! Phase1Only(index)             attribute lookup, phase 2 not opened
//! Phase1AndPhase2{index, rec}   attribute lookup, both scans open
//! ```
//!
//! `close` releases innermost first, moves to `Released` even when a close
//! fails, and is a no-op once released. Dropping an unreleased iterator
//! closes it.

use std::fmt;

use crate::observability::{Event, Logger, MetricsRegistry};
use crate::record::{Record, RecordCodec};
use crate::store::{Entry, ScanHandle, StoreError, StoreResult};

use super::errors::QueryError;

enum ScanState<H> {
    Released,
    Single(H),
    Phase1Only(H),
    Phase1AndPhase2 { index: H, records: H },
}

impl<H> ScanState<H> {
    fn name(&self) -> &'static str {
        match self {
            ScanState::Released => "RELEASED",
            ScanState::Single(_) => "SINGLE",
            ScanState::Phase1Only(_) => "PHASE1_ONLY",
            ScanState::Phase1AndPhase2 { .. } => "PHASE1_AND_PHASE2",
        }
    }
}

pub struct ScanResultIterator<'m, H: ScanHandle> {
    state: ScanState<H>,
    peeked: Option<Entry>,
    /// Set after a read error; the sequence then ends
    failed: bool,
    metrics: Option<&'m MetricsRegistry>,
}

impl<H: ScanHandle> fmt::Debug for ScanResultIterator<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanResultIterator")
            .field("state", &self.state.name())
            .field("peeked", &self.peeked.is_some())
            .field("failed", &self.failed)
            .finish()
    }
}

impl<'m, H: ScanHandle> ScanResultIterator<'m, H> {
    fn with_state(state: ScanState<H>, metrics: Option<&'m MetricsRegistry>) -> Self {
        Self {
            state,
            peeked: None,
            failed: false,
            metrics,
        }
    }

    /// Result with no scan behind it
    pub fn empty() -> Self {
        Self::with_state(ScanState::Released, None)
    }

    /// Owns the handle of a direct scan
    pub fn single(handle: H, metrics: Option<&'m MetricsRegistry>) -> Self {
        Self::with_state(ScanState::Single(handle), metrics)
    }

    /// Owns the phase-1 handle of an attribute lookup
    pub fn phase1(index: H, metrics: Option<&'m MetricsRegistry>) -> Self {
        Self::with_state(ScanState::Phase1Only(index), metrics)
    }

    /// Current ownership state, for logs and assertions
    pub fn state(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ScanState::Released)
    }

    pub(crate) fn single_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            ScanState::Single(handle) => Some(handle),
            _ => None,
        }
    }

    pub(crate) fn phase1_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            ScanState::Phase1Only(index) | ScanState::Phase1AndPhase2 { index, .. } => Some(index),
            _ => None,
        }
    }

    pub(crate) fn phase2_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            ScanState::Phase1AndPhase2 { records, .. } => Some(records),
            _ => None,
        }
    }

    /// Takes ownership of the phase-2 handle.
    ///
    /// Only valid in `Phase1Only`; otherwise the handle is closed and an
    /// error returned.
    pub(crate) fn attach_phase2(&mut self, mut records: H) -> StoreResult<()> {
        match std::mem::replace(&mut self.state, ScanState::Released) {
            ScanState::Phase1Only(index) => {
                self.state = ScanState::Phase1AndPhase2 { index, records };
                Ok(())
            }
            other => {
                let state = other.name();
                self.state = other;
                let err = StoreError::scan_failed(format!(
                    "cannot attach phase 2 in state {}",
                    state
                ));
                if let Err(close_err) = self.release_one(&mut records, "phase2") {
                    log_close_failure(&close_err, Some(err.code().code()));
                }
                Err(err)
            }
        }
    }

    fn active_mut(&mut self) -> Option<&mut H> {
        match &mut self.state {
            ScanState::Released => None,
            ScanState::Single(handle) | ScanState::Phase1Only(handle) => Some(handle),
            ScanState::Phase1AndPhase2 { records, .. } => Some(records),
        }
    }

    /// True if another entry is available
    pub fn has_next(&mut self) -> StoreResult<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        if self.failed {
            return Ok(false);
        }
        let next = match self.active_mut() {
            Some(handle) => handle.next_entry(),
            None => return Ok(false),
        };
        match next {
            Ok(entry) => {
                self.peeked = entry;
                Ok(self.peeked.is_some())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Next entry, or `None` when the sequence is exhausted
    pub fn next_entry(&mut self) -> StoreResult<Option<Entry>> {
        if self.has_next()? {
            Ok(self.peeked.take())
        } else {
            Ok(None)
        }
    }

    /// Drains and decodes the remaining entries
    pub fn decode_remaining(&mut self, codec: &dyn RecordCodec) -> StoreResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(entry) = self.next_entry()? {
            records.push(codec.decode(&entry.value)?);
        }
        Ok(records)
    }

    /// Releases every owned handle, innermost first.
    ///
    /// Both handles are closed even if the first close fails; the first
    /// error is returned.
    pub fn close(&mut self) -> StoreResult<()> {
        self.peeked = None;
        match std::mem::replace(&mut self.state, ScanState::Released) {
            ScanState::Released => Ok(()),
            ScanState::Single(mut handle) => self.release_one(&mut handle, "single"),
            ScanState::Phase1Only(mut index) => self.release_one(&mut index, "phase1"),
            ScanState::Phase1AndPhase2 {
                mut index,
                mut records,
            } => {
                let inner = self.release_one(&mut records, "phase2");
                let outer = self.release_one(&mut index, "phase1");
                inner.and(outer)
            }
        }
    }

    fn release_one(&self, handle: &mut H, scan: &str) -> StoreResult<()> {
        handle.close()?;
        if let Some(metrics) = self.metrics {
            metrics.increment_scans_closed();
        }
        Logger::event(Event::ScanClosed, &[("scan", scan)]);
        Ok(())
    }

    /// Closes everything while unwinding `err`, which is returned unchanged.
    ///
    /// Close failures are logged, never substituted for `err`.
    pub(crate) fn unwind(mut self, err: impl Into<QueryError>) -> QueryError {
        let err = err.into();
        if let Err(close_err) = self.close() {
            log_close_failure(&close_err, Some(err.code()));
        }
        err
    }
}

impl<H: ScanHandle> Iterator for ScanResultIterator<'_, H> {
    type Item = StoreResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<H: ScanHandle> Drop for ScanResultIterator<'_, H> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            log_close_failure(&e, None);
        }
    }
}

/// Close failures are logged; they never replace the error being returned
fn log_close_failure(err: &StoreError, unwinding: Option<&str>) {
    let mut fields = vec![("code", err.code().code()), ("reason", err.message())];
    if let Some(code) = unwinding {
        fields.push(("unwinding", code));
    }
    Logger::event(Event::ScanCloseFailed, &fields);
}
