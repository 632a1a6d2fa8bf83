use crate::locking::mutex::{AdmissionToken, RateLimitedMutex};
use crate::locking::observer::AdmissionRecord;
use std::time::Duration;

/// RAII guard that releases an admission slot when dropped.
pub struct AdmissionGuard<'a> {
    mutex: &'a RateLimitedMutex,
    record: AdmissionRecord,
    active: bool,
}

impl<'a> AdmissionGuard<'a> {
    pub(crate) fn new(mutex: &'a RateLimitedMutex, record: AdmissionRecord) -> Self {
        Self {
            mutex,
            record,
            active: true,
        }
    }

    pub fn token(&self) -> AdmissionToken {
        self.record.token
    }

    pub fn started_at(&self) -> u64 {
        self.record.started_at
    }

    pub fn waited(&self) -> Duration {
        self.record.waited
    }

    pub fn clock_regressed(&self) -> bool {
        self.record.clock_regressed
    }

    pub fn took_over(&self) -> bool {
        self.record.took_over
    }

    pub fn record(&self) -> &AdmissionRecord {
        &self.record
    }

    /// Releases now. Returns false if a later admission already owns the slot.
    pub fn release(mut self) -> bool {
        self.active = false;
        self.mutex.release(self.record.token)
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            self.mutex.release(self.record.token);
        }
    }
}
