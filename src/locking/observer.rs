// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Observer interfaces for admission instrumentation.
//!
//! Observers let callers surface contention (how long admissions waited,
//! whether a release actually freed the slot) without reaching into the
//! mutex internals. Every hook runs with no internal lock held.

use crate::locking::mutex::AdmissionToken;
use log::{debug, warn};
use std::time::Duration;

/// Facts recorded when a caller is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRecord {
    pub token: AdmissionToken,
    /// Monotonic start timestamp in milliseconds.
    pub started_at: u64,
    /// Real time spent between requesting and receiving admission.
    pub waited: Duration,
    /// The clock read earlier than the previous start, so spacing was skipped.
    pub clock_regressed: bool,
    /// A lease-expired holder was displaced by this admission.
    pub took_over: bool,
}

/// Observer hooks for admission events.
pub trait AdmissionObserver: Send + Sync {
    fn on_admitted(&self, _record: &AdmissionRecord) {}

    /// `cleared` is false when a later admission already owns the slot.
    fn on_released(&self, _token: AdmissionToken, _cleared: bool) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopAdmissionObserver;

impl AdmissionObserver for NoopAdmissionObserver {}

/// Observer that reports unusual admissions through the `log` facade.
#[derive(Debug, Default)]
pub struct LogAdmissionObserver;

impl AdmissionObserver for LogAdmissionObserver {
    fn on_admitted(&self, record: &AdmissionRecord) {
        if record.clock_regressed {
            warn!(
                "Admission {} skipped spacing after the clock moved backward",
                record.token
            );
        }
        if record.took_over {
            warn!(
                "Admission {} displaced a holder whose lease expired",
                record.token
            );
        }
        debug!(
            "Admission {} started at {}ms after waiting {}",
            record.token,
            record.started_at,
            format_duration(record.waited)
        );
    }

    fn on_released(&self, token: AdmissionToken, cleared: bool) {
        if !cleared {
            debug!("Release of {token} left the slot to a later admission");
        }
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.1}s", duration.as_secs_f32())
    } else {
        format!("{:.0}ms", duration.as_millis())
    }
}
