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

use crate::config::PacedConfig;
use crate::error::{PacedError, Result};
use crate::locking::observer::format_duration;
use crate::locking::{
    AdmissionObserver, AdmissionRecord, AdmissionToken, HoldPolicy, LogAdmissionObserver,
};
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Settings for one probe run.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub workers: usize,
    pub calls: usize,
    pub hold: Duration,
    pub cooldown: Option<String>,
    pub json: bool,
}

impl ProbeOptions {
    /// Total admissions the run will request.
    pub fn admissions(&self) -> Result<usize> {
        self.workers.checked_mul(self.calls).ok_or_else(|| {
            PacedError::InvalidConfig(format!(
                "{} workers x {} calls is more admissions than can be recorded",
                self.workers, self.calls
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSample {
    pub worker: usize,
    pub sequence: u64,
    pub started_at: u64,
    pub waited_ms: u64,
    pub clock_regressed: bool,
    pub took_over: bool,
    pub overlapped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub cooldown_ms: u64,
    pub samples: Vec<ProbeSample>,
    pub stale_releases: usize,
    pub violations: Vec<String>,
}

/// Counts releases that found the slot already taken by a later admission.
#[derive(Default)]
struct StaleReleaseCounter {
    stale: AtomicUsize,
    log: LogAdmissionObserver,
}

impl AdmissionObserver for StaleReleaseCounter {
    fn on_admitted(&self, record: &AdmissionRecord) {
        self.log.on_admitted(record);
    }

    fn on_released(&self, token: AdmissionToken, cleared: bool) {
        if !cleared {
            self.stale.fetch_add(1, Ordering::Relaxed);
        }
        self.log.on_released(token, cleared);
    }
}

pub struct ProbeCommand<'a> {
    config: &'a PacedConfig,
}

impl<'a> ProbeCommand<'a> {
    pub fn new(config: &'a PacedConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, options: &ProbeOptions) -> Result<()> {
        let report = self.run(options)?;

        if options.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if report.violations.is_empty() {
            Ok(())
        } else {
            Err(PacedError::ProbeViolation(report.violations.join("; ")))
        }
    }

    pub fn run(&self, options: &ProbeOptions) -> Result<ProbeReport> {
        options.admissions()?;
        let counter = Arc::new(StaleReleaseCounter::default());
        let mutex = self
            .config
            .mutex_builder(options.cooldown.as_deref())?
            .observer(counter.clone())
            .build();
        let exclusive = matches!(mutex.hold_policy(), HoldPolicy::Exclusive);

        let active = AtomicUsize::new(0);
        let samples = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for worker in 0..options.workers {
                let mutex = &mutex;
                let active = &active;
                let samples = &samples;
                scope.spawn(move || {
                    for _ in 0..options.calls {
                        let guard = mutex.admit();
                        let overlapped = active.fetch_add(1, Ordering::SeqCst) > 0;
                        thread::sleep(options.hold);
                        active.fetch_sub(1, Ordering::SeqCst);

                        let sample = ProbeSample {
                            worker,
                            sequence: guard.token().sequence(),
                            started_at: guard.started_at(),
                            waited_ms: u64::try_from(guard.waited().as_millis())
                                .unwrap_or(u64::MAX),
                            clock_regressed: guard.clock_regressed(),
                            took_over: guard.took_over(),
                            overlapped,
                        };
                        drop(guard);
                        samples
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(sample);
                    }
                });
            }
        });

        let cooldown_ms = u64::try_from(mutex.cooldown().as_millis()).unwrap_or(u64::MAX);
        let samples = samples.into_inner().unwrap_or_else(|e| e.into_inner());
        Ok(analyze(
            samples,
            cooldown_ms,
            exclusive,
            counter.stale.load(Ordering::Relaxed),
        ))
    }
}

/// Orders samples by admission and lists every spacing or exclusion breach.
pub fn analyze(
    mut samples: Vec<ProbeSample>,
    cooldown_ms: u64,
    exclusive: bool,
    stale_releases: usize,
) -> ProbeReport {
    samples.sort_by_key(|sample| sample.sequence);

    let mut violations = Vec::new();
    for pair in samples.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.clock_regressed {
            continue;
        }
        let gap = current.started_at.saturating_sub(previous.started_at);
        if gap < cooldown_ms {
            violations.push(format!(
                "admission #{} started {gap}ms after #{} (cooldown {cooldown_ms}ms)",
                current.sequence, previous.sequence
            ));
        }
    }

    if exclusive {
        for sample in samples.iter().filter(|sample| sample.overlapped) {
            violations.push(format!(
                "admission #{} ran while another holder was active",
                sample.sequence
            ));
        }
    }

    ProbeReport {
        cooldown_ms,
        samples,
        stale_releases,
        violations,
    }
}

fn print_report(report: &ProbeReport) {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Worker"),
        Cell::new("Start (ms)"),
        Cell::new("Gap (ms)"),
        Cell::new("Waited"),
        Cell::new("Notes"),
    ]);

    let first_start = report.samples.first().map_or(0, |sample| sample.started_at);
    let mut previous: Option<u64> = None;
    for sample in &report.samples {
        let gap = previous
            .map(|prev| sample.started_at.saturating_sub(prev).to_string())
            .unwrap_or_else(|| "-".to_string());
        previous = Some(sample.started_at);

        let mut notes = Vec::new();
        if sample.clock_regressed {
            notes.push("clock regressed");
        }
        if sample.took_over {
            notes.push("lease takeover");
        }
        if sample.overlapped {
            notes.push("overlap");
        }

        table.add_row(vec![
            Cell::new(sample.sequence.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(sample.worker.to_string()).set_alignment(CellAlignment::Right),
            Cell::new(sample.started_at.saturating_sub(first_start).to_string())
                .set_alignment(CellAlignment::Right),
            Cell::new(gap).set_alignment(CellAlignment::Right),
            Cell::new(format_duration(Duration::from_millis(sample.waited_ms)))
                .set_alignment(CellAlignment::Right),
            Cell::new(notes.join(", ")),
        ]);
    }

    println!("{table}");
    println!(
        "{} admissions, cooldown {}ms, {} stale release(s)",
        report.samples.len(),
        report.cooldown_ms,
        report.stale_releases
    );

    if report.violations.is_empty() {
        println!("{}", "No spacing or exclusion violations".green());
    } else {
        for violation in &report.violations {
            println!("{} {violation}", "violation:".red().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sequence: u64, started_at: u64) -> ProbeSample {
        ProbeSample {
            worker: 0,
            sequence,
            started_at,
            waited_ms: 0,
            clock_regressed: false,
            took_over: false,
            overlapped: false,
        }
    }

    #[test]
    fn analyze_orders_by_sequence() {
        let report = analyze(vec![sample(1, 1_000), sample(0, 0)], 1_000, true, 0);
        assert_eq!(report.samples[0].sequence, 0);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn analyze_flags_short_gaps() {
        let report = analyze(vec![sample(0, 0), sample(1, 400)], 1_000, true, 0);
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("400ms"));
    }

    #[test]
    fn analyze_ignores_gap_after_clock_regression() {
        let mut regressed = sample(1, 5);
        regressed.clock_regressed = true;
        let report = analyze(vec![sample(0, 9_000), regressed], 1_000, true, 0);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn analyze_flags_overlap_only_when_exclusive() {
        let mut overlapped = sample(1, 2_000);
        overlapped.overlapped = true;

        let report = analyze(vec![sample(0, 0), overlapped.clone()], 1_000, true, 0);
        assert_eq!(report.violations.len(), 1);

        let report = analyze(vec![sample(0, 0), overlapped], 1_000, false, 1);
        assert!(report.violations.is_empty());
        assert_eq!(report.stale_releases, 1);
    }

    #[test]
    fn run_with_short_cooldown_has_no_violations() {
        let config = PacedConfig::default();
        let command = ProbeCommand::new(&config).unwrap();
        let report = command
            .run(&ProbeOptions {
                workers: 3,
                calls: 2,
                hold: Duration::from_millis(2),
                cooldown: Some("20".to_string()),
                json: false,
            })
            .unwrap();

        assert_eq!(report.samples.len(), 6);
        assert_eq!(report.cooldown_ms, 20);
        assert!(report.violations.is_empty(), "{:?}", report.violations);
    }

    #[test]
    fn oversized_run_is_rejected_before_spawning() {
        let config = PacedConfig::default();
        let command = ProbeCommand::new(&config).unwrap();
        let err = command
            .run(&ProbeOptions {
                workers: usize::MAX,
                calls: 2,
                hold: Duration::ZERO,
                cooldown: Some("off".to_string()),
                json: false,
            })
            .unwrap_err();

        assert!(matches!(err, PacedError::InvalidConfig(msg) if msg.contains("2 calls")));
    }
}
