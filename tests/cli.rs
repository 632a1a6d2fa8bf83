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

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn paced(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("paced").unwrap();
    cmd.env_remove("PACED_COOLDOWN_MS")
        .arg("--config-dir")
        .arg(config_dir.path());
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("paced")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("probe"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_reports_defaults() {
    let temp = TempDir::new().unwrap();
    paced(&temp)
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"cooldown_ms\": 1000"))
        .stdout(predicate::str::contains("built-in default"));
}

#[test]
fn test_config_env_override() {
    let temp = TempDir::new().unwrap();
    paced(&temp)
        .env("PACED_COOLDOWN_MS", "250")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("250ms (environment variable)"));
}

#[test]
fn test_config_file_is_read() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("paced.toml"),
        "[mutex]\ncooldown_ms = 75\n\n[cache]\nclose_delay_ms = 500\n",
    )
    .unwrap();

    paced(&temp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("75ms (configuration file)"))
        .stdout(predicate::str::contains("Close delay:  500ms"));
}

#[test]
fn test_invalid_cooldown_exits_with_usage_code() {
    let temp = TempDir::new().unwrap();
    paced(&temp)
        .args(["config", "--cooldown", "soon"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid cooldown value: soon"));
}

#[test]
fn test_broken_config_file_exits_with_usage_code() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("paced.toml"), "[mutex\n").unwrap();

    paced(&temp)
        .arg("config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to parse paced.toml"));
}

#[test]
fn test_probe_reports_clean_run() {
    let temp = TempDir::new().unwrap();
    paced(&temp)
        .args([
            "probe",
            "--workers",
            "3",
            "--calls",
            "2",
            "--hold-ms",
            "1",
            "--cooldown",
            "15",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("6 admissions, cooldown 15ms"))
        .stdout(predicate::str::contains("No spacing or exclusion violations"));
}

#[test]
fn test_probe_json_output() {
    let temp = TempDir::new().unwrap();
    let output = paced(&temp)
        .args(["probe", "--workers", "2", "--calls", "1", "--cooldown", "off", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["cooldown_ms"], 0);
    assert_eq!(report["samples"].as_array().unwrap().len(), 2);
    assert!(report["violations"].as_array().unwrap().is_empty());
}
