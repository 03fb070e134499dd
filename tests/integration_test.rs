use std::io::Write;

use racer::config::TrainerConfig;
use racer::environment::Environment;
use racer::network::QNetwork;
use racer::track::{TrackConfig, TrackEnv, OBSERVATION_DIM};
use racer::trainer::Trainer;

fn short_config() -> TrainerConfig {
    TrainerConfig {
        memory_capacity: 500,
        num_of_steps: 300,
        batch_size: 16,
        hidden_layers: vec![16, 16],
        target_sync_every: 50,
        epsilon_decay_steps: 200,
        seed: Some(2024),
        track: TrackConfig {
            max_frames: 200,
            ..TrackConfig::default()
        },
        ..TrainerConfig::default()
    }
}

#[test]
fn test_short_training_run_on_track() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("model.bin");

    let mut trainer = Trainer::on_track(short_config(), Some(model_path.clone())).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.steps, 300);
    assert_eq!(summary.learning_steps, 300 - 15);
    assert_eq!(summary.target_syncs, summary.learning_steps / 50);
    assert!(summary.episodes > 0);
    assert!(summary.last_loss.map_or(false, f32::is_finite));
    assert_eq!(trainer.memory().len(), 300);
    assert!(trainer.environment().frames() <= 300 * 4);

    let current = trainer.current().clone();
    let summary = trainer.finish().unwrap();
    assert_eq!(summary.steps, 300);

    let loaded = QNetwork::load(&model_path).unwrap();
    assert_eq!(loaded, current);
    assert_eq!(loaded.input_size(), OBSERVATION_DIM);
    assert_eq!(loaded.output_size(), 12);
}

#[test]
fn test_resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("model.bin");

    let config = TrainerConfig {
        num_of_steps: 60,
        ..short_config()
    };
    let mut first = Trainer::on_track(config.clone(), Some(model_path.clone())).unwrap();
    first.run().unwrap();
    let trained = first.current().clone();
    first.finish().unwrap();

    let mut second = Trainer::on_track(config, None).unwrap();
    second.load_checkpoint(&model_path).unwrap();
    assert_eq!(second.current(), &trained);
    assert_eq!(second.target(), &trained);
    second.run().unwrap();
}

#[test]
fn test_summary_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");

    let config = TrainerConfig {
        num_of_steps: 40,
        ..short_config()
    };
    let mut trainer = Trainer::on_track(config, None).unwrap();
    trainer.run().unwrap();
    let summary = trainer.finish().unwrap();
    summary.save_json(&path).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["steps"], 40);
}

#[test]
fn test_config_file_drives_training() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
num_of_steps = 25
batch_size = 8
skip_steps = 2
optimizer = "sgd"
seed = 5

[actions]
steer = [-1.0, 1.0]
gas = [1.0]
brake = [0.0]

[track]
max_frames = 50
"#
    )
    .unwrap();

    let config = TrainerConfig::load(file.path()).unwrap();
    let mut trainer = Trainer::on_track(config, None).unwrap();
    assert_eq!(trainer.action_space().num_actions(), 2);

    let summary = trainer.run().unwrap();
    assert_eq!(summary.steps, 25);
    assert_eq!(summary.learning_steps, 25 - 7);
}

#[test]
fn test_seeded_track_is_reproducible() {
    let config = TrackConfig {
        seed: Some(3),
        ..TrackConfig::default()
    };
    let mut a = TrackEnv::new(config.clone()).unwrap();
    let mut b = TrackEnv::new(config).unwrap();
    assert_eq!(a.reset().unwrap(), b.reset().unwrap());
}
