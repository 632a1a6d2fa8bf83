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

//! Paced mutual exclusion.
//!
//! [`RateLimitedMutex`] runs caller-supplied operations one at a time, in
//! arrival order, and keeps the starts of consecutive operations at least a
//! cooldown apart (one second by default). The [`cache`] module builds
//! reference-counted data caches whose loads and refreshes are paced by it.

pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod locking;
pub mod logging;

pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use error::{PacedError, Result};
pub use locking::{AdmissionGuard, HoldPolicy, RateLimitedMutex};
