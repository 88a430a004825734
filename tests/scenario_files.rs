use std::io::Write;

use swarm_radio_simulator::kernel::{ModelId, ModelType};
use swarm_radio_simulator::simulation::{ScenarioLoadError, SimulationRunner, load_scenario};
use tempfile::{Builder, NamedTempFile};

fn scenario_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_toml_by_default() {
    let file = scenario_file(
        ".toml",
        r#"
        seed = 42
        end_time_ms = 250
        real_time_scale = 0.0

        [physics]
        step_secs = 0.05

        [[models]]
        type = "station-802.15.4"
        name = "node"
        radio = { max_power_dbm = 3.0 }
        "#,
    );

    let scenario = load_scenario(file.path()).unwrap();
    assert_eq!(scenario.seed, 42);
    assert_eq!(scenario.physics.step_secs, 0.05);
    assert_eq!(scenario.physics.substep_secs, 1.0 / 60.0);
    assert_eq!(scenario.models[0].radio.max_power_dbm, 3.0);
}

#[test]
fn loads_json_and_runs_it() {
    let file = scenario_file(
        ".json",
        r#"{
            "end_time_ms": 300,
            "models": [
                {"type": "station-802.11", "name": "a", "traffic": {"destination": "b", "count": 2, "interval_ms": 100}},
                {"type": "station-802.11", "name": "b", "body": {"position": [3.0, 4.0, 0.0]}},
                {"type": "collision-probe", "parent": "b"}
            ]
        }"#,
    );

    let scenario = load_scenario(file.path()).unwrap();
    let mut runner = SimulationRunner::from_scenario(&scenario).unwrap();
    let summary = runner.run().unwrap();

    assert_eq!(summary.models.len(), 3);
    assert_eq!(summary.models[2].model_type, ModelType::CollisionProbe);
    assert_eq!(summary.models[2].parent, Some(ModelId(2)));
    assert_eq!(summary.models[0].traffic.as_ref().unwrap().delivered, 2);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["models"][0]["model_type"], "station-802.11");
    assert_eq!(json["models"][1]["traffic"]["received"], 2);
    assert!(json["generated_at"].is_string());
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_scenario(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ScenarioLoadError::FileRead(_)), "{}", err);
}

#[test]
fn malformed_and_invalid_files_are_told_apart() {
    let broken = scenario_file(".toml", "end_time_ms = [");
    assert!(matches!(load_scenario(broken.path()).unwrap_err(), ScenarioLoadError::Parse(_)));

    let invalid = scenario_file(
        ".toml",
        r#"
        end_time_ms = 100
        [[models]]
        type = "station-802.11"
        name = "twin"
        [[models]]
        type = "station-802.11"
        name = "twin"
        "#,
    );
    match load_scenario(invalid.path()).unwrap_err() {
        ScenarioLoadError::Validation(message) => assert!(message.contains("Duplicate model name")),
        other => panic!("unexpected error: {}", other),
    }
}
