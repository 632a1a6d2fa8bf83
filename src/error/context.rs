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

use crate::error::PacedError;
use std::error::Error as _;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a PacedError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a PacedError) -> Self {
        let (suggestion, details) = match error {
            PacedError::InvalidCooldown(value) => {
                let suggestion = Some(
                    "Cooldown values are whole milliseconds (e.g., '1000') or the word 'off'. \
                     Check --cooldown and PACED_COOLDOWN_MS."
                        .to_string(),
                );
                let details = Some(format!("Rejected value: {value}"));
                (suggestion, details)
            }
            PacedError::ConfigFile(msg) => {
                let suggestion = Some(
                    "Fix or remove paced.toml; missing files fall back to built-in defaults."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            PacedError::InvalidConfig(msg) => {
                let suggestion = Some(
                    "Valid hold policies are 'exclusive' and 'lease'; lease_ms must be greater \
                     than zero."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            PacedError::CacheNotOpen(key) => {
                let suggestion = Some(
                    "Every close must pair with an earlier open of the same key.".to_string(),
                );
                let details = Some(format!("No open element for key {key}"));
                (suggestion, details)
            }
            PacedError::CacheInconsistent(_) => {
                let suggestion = Some(
                    "Close each listener with the same key it was opened with before the last \
                     user closes the key."
                        .to_string(),
                );
                (suggestion, None)
            }
            PacedError::CacheSource(err) => {
                let details = err.source().map(|cause| format!("Caused by: {cause}"));
                (None, details)
            }
            PacedError::ProbeViolation(_) => {
                let suggestion = Some(
                    "Rerun with -vv to log every admission and inspect the timeline.".to_string(),
                );
                (suggestion, None)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
