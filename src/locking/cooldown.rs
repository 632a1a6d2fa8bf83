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

//! Cooldown arithmetic and cooldown override resolution.

use crate::error::PacedError;
use std::fmt;
use std::time::Duration;

/// Minimum spacing between two admissions when nothing else is configured.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1_000);

/// Outcome of comparing the current time against the last admission start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDelay {
    /// No wait is needed.
    Ready,
    /// The clock reads earlier than the last recorded start; spacing is skipped.
    ClockRegressed,
    /// The caller must wait this many milliseconds before it may start.
    Wait(u64),
}

impl CooldownDelay {
    pub fn millis(self) -> u64 {
        match self {
            CooldownDelay::Wait(ms) => ms,
            CooldownDelay::Ready | CooldownDelay::ClockRegressed => 0,
        }
    }

    pub fn is_ready(self) -> bool {
        self.millis() == 0
    }
}

/// Computes how long an admission at `now` must wait given the last start.
///
/// The result is clamped to `[0, cooldown]`.
pub fn cooldown_delay(last_start: Option<u64>, now: u64, cooldown: u64) -> CooldownDelay {
    let Some(last_start) = last_start else {
        return CooldownDelay::Ready;
    };

    if last_start > now {
        return CooldownDelay::ClockRegressed;
    }

    let elapsed = now - last_start;
    let delay = cooldown.saturating_sub(elapsed).min(cooldown);
    if delay == 0 {
        CooldownDelay::Ready
    } else {
        CooldownDelay::Wait(delay)
    }
}

/// Where the effective cooldown came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownSource {
    #[default]
    Default,
    Config,
    Environment,
    Cli,
}

impl fmt::Display for CooldownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CooldownSource::Default => "built-in default",
            CooldownSource::Config => "configuration file",
            CooldownSource::Environment => "environment variable",
            CooldownSource::Cli => "CLI flag",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownResolution {
    pub value: Duration,
    pub source: CooldownSource,
}

/// Parses a cooldown override: whole milliseconds, or `off` for no spacing.
pub fn parse_cooldown_override(value: &str) -> Result<Duration, PacedError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("off") {
        return Ok(Duration::ZERO);
    }

    trimmed
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| PacedError::InvalidCooldown(trimmed.to_string()))
}

/// Resolves the effective cooldown based on CLI > env > config > default precedence.
pub struct CooldownResolver<'a> {
    cli_override: Option<&'a str>,
    env_override: Option<&'a str>,
    config_value: Duration,
    default_value: Duration,
}

impl<'a> CooldownResolver<'a> {
    pub fn new(
        cli_override: Option<&'a str>,
        env_override: Option<&'a str>,
        config_value: Duration,
        default_value: Duration,
    ) -> Self {
        Self {
            cli_override,
            env_override,
            config_value,
            default_value,
        }
    }

    pub fn resolve(self) -> Result<CooldownResolution, PacedError> {
        if let Some(cli_value) = self.cli_override {
            let value = parse_cooldown_override(cli_value)?;
            return Ok(CooldownResolution {
                value,
                source: CooldownSource::Cli,
            });
        }

        if let Some(env_value) = self.env_override {
            let value = parse_cooldown_override(env_value)?;
            return Ok(CooldownResolution {
                value,
                source: CooldownSource::Environment,
            });
        }

        if self.config_value != self.default_value {
            return Ok(CooldownResolution {
                value: self.config_value,
                source: CooldownSource::Config,
            });
        }

        Ok(CooldownResolution {
            value: self.default_value,
            source: CooldownSource::Default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admission_is_ready() {
        assert_eq!(cooldown_delay(None, 0, 1_000), CooldownDelay::Ready);
        assert_eq!(cooldown_delay(None, 42_000, 1_000), CooldownDelay::Ready);
    }

    #[test]
    fn waits_for_remaining_spacing() {
        assert_eq!(cooldown_delay(Some(0), 10, 1_000), CooldownDelay::Wait(990));
        assert_eq!(
            cooldown_delay(Some(1_000), 1_500, 1_000),
            CooldownDelay::Wait(500)
        );
        assert_eq!(
            cooldown_delay(Some(5), 5, 1_000),
            CooldownDelay::Wait(1_000)
        );
    }

    #[test]
    fn elapsed_cooldown_is_ready() {
        assert_eq!(cooldown_delay(Some(0), 1_000, 1_000), CooldownDelay::Ready);
        assert_eq!(cooldown_delay(Some(0), 90_000, 1_000), CooldownDelay::Ready);
    }

    #[test]
    fn backward_clock_skips_spacing() {
        let delay = cooldown_delay(Some(50_000), 12, 1_000);
        assert_eq!(delay, CooldownDelay::ClockRegressed);
        assert_eq!(delay.millis(), 0);
        assert!(delay.is_ready());
    }

    #[test]
    fn zero_cooldown_never_waits() {
        assert_eq!(cooldown_delay(Some(7), 7, 0), CooldownDelay::Ready);
    }

    #[test]
    fn parse_numeric_and_off() {
        assert_eq!(
            parse_cooldown_override(" 1500 ").unwrap(),
            Duration::from_millis(1_500)
        );
        assert_eq!(parse_cooldown_override("OFF").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_rejects_invalid_input() {
        let err = parse_cooldown_override("-3").unwrap_err();
        assert!(matches!(err, PacedError::InvalidCooldown(value) if value == "-3"));
    }

    #[test]
    fn resolver_precedence() {
        let resolution = CooldownResolver::new(
            Some("250"),
            Some("400"),
            Duration::from_millis(2_000),
            DEFAULT_COOLDOWN,
        )
        .resolve()
        .unwrap();
        assert_eq!(resolution.source, CooldownSource::Cli);
        assert_eq!(resolution.value, Duration::from_millis(250));

        let resolution = CooldownResolver::new(
            None,
            Some("400"),
            Duration::from_millis(2_000),
            DEFAULT_COOLDOWN,
        )
        .resolve()
        .unwrap();
        assert_eq!(resolution.source, CooldownSource::Environment);
        assert_eq!(resolution.value, Duration::from_millis(400));
    }

    #[test]
    fn resolver_config_vs_default() {
        let resolution =
            CooldownResolver::new(None, None, Duration::from_millis(2_000), DEFAULT_COOLDOWN)
                .resolve()
                .unwrap();
        assert_eq!(resolution.source, CooldownSource::Config);

        let resolution = CooldownResolver::new(None, None, DEFAULT_COOLDOWN, DEFAULT_COOLDOWN)
            .resolve()
            .unwrap();
        assert_eq!(resolution.source, CooldownSource::Default);
        assert_eq!(resolution.value, DEFAULT_COOLDOWN);
    }
}
