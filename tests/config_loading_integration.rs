//! Loading machine configurations from disk and running them

mod common;

use common::assert_balanced;
use common::builders::ConfigBuilder;
use sortsim_rs::config::{MachineConfig, PortConfig};
use sortsim_rs::{Machine, SortError};
use std::time::Duration;
use tempfile::TempDir;

const SCENARIO: &str = "\
BELTS
2
1 length 3 destinations 1 2
2 length 2 destinations 2

HOPPERS
1
1 belt 1 capacity 10 speed 100

SACKS
2
1 capacity 2 age 0-3
2 capacity 2 age 4-6

TURNTABLES
2
A N ib 1 E os 1 S ob 2 W null
B N ib 2 E null S os 2 W null

PRESENTS 1
6
0-3
4-6
0-3
4-6
4-6
0-3

ELVES
1
1 sacks 1 2

TIMER 1
";

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_scenario_file_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "scenario1.txt", SCENARIO);

    let mut config = MachineConfig::load(&path).unwrap();
    config.timing = sortsim_rs::config::TimingConfig::fast();
    assert_eq!(config.duration(), Duration::from_secs(1));

    let mut machine = Machine::from_config(&config).unwrap();
    let report = machine.start(Duration::from_millis(400)).unwrap();

    assert_eq!(report.reconciliation.in_sinks, 6);
    assert!(report.drained);
    assert_balanced(&report.reconciliation);
}

#[test]
fn test_formats_agree() {
    let dir = tempfile::tempdir().unwrap();
    let from_text = MachineConfig::load(write(&dir, "machine.txt", SCENARIO)).unwrap();

    let toml_path = dir.path().join("machine.toml");
    let json_path = dir.path().join("machine.json");
    from_text.save(&toml_path).unwrap();
    from_text.save(&json_path).unwrap();

    assert_eq!(MachineConfig::load(&toml_path).unwrap(), from_text);
    assert_eq!(MachineConfig::load(&json_path).unwrap(), from_text);
}

#[test]
fn test_parse_error_carries_line() {
    let dir = tempfile::tempdir().unwrap();
    let broken = SCENARIO.replace("1 capacity 2 age 0-3", "1 capacity two age 0-3");
    let err = MachineConfig::load(write(&dir, "broken.txt", &broken)).unwrap_err();

    match err {
        SortError::Parse { line, .. } => assert_eq!(line, 12),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_json_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MachineConfig::load(write(&dir, "bad.json", "{ \"buffers\": 3 }")).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_build_rejects_sink_with_two_drainers() {
    let config = ConfigBuilder::new()
        .buffer(1, 2, &["a"])
        .sink(1, 2, "a")
        .router(
            "A",
            [
                PortConfig::input(1),
                PortConfig::output_sink(1),
                PortConfig::none(),
                PortConfig::none(),
            ],
        )
        .drainer(1, &[1])
        .drainer(2, &[1])
        .build();

    let err = Machine::from_config(&config).err().unwrap();
    assert!(err.is_config());
    assert!(err.to_string().contains("emptied by both"));
}
