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

pub mod cooldown;
pub mod guard;
pub mod mutex;
pub mod observer;

pub use cooldown::{
    CooldownDelay, CooldownResolution, CooldownResolver, CooldownSource, DEFAULT_COOLDOWN,
    cooldown_delay, parse_cooldown_override,
};
pub use guard::AdmissionGuard;
pub use mutex::{AdmissionToken, HoldPolicy, RateLimitedMutex, RateLimitedMutexBuilder};
pub use observer::{
    AdmissionObserver, AdmissionRecord, LogAdmissionObserver, NoopAdmissionObserver,
};
