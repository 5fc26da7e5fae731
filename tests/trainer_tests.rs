#[allow(dead_code)]
mod test_helpers;

use burn::tensor::{Tensor, TensorData};
use segtrain::training::SupervisedTrainer;
use segtrain::{CheckpointKind, CpuBackend, TrainError, TrainerConfig};
use tempfile::TempDir;
use test_helpers::*;

#[test]
fn test_train_then_save_flow() {
    let dir = TempDir::new().unwrap();
    let mut trainer = tiny_trainer(quiet_config(dir.path()), 6);
    assert_ok(trainer.train(), "training");

    let state = trainer.state();
    assert_eq!(state.current_epoch, 2);
    assert!(state.epoch_train_loss.is_finite());
    assert!(state.best_eval_loss.is_finite());

    let checkpoints = file_names(&dir.path().join("checkpoints"));
    assert_eq!(checkpoints.len(), 2, "{:?}", checkpoints);
    assert!(checkpoints.iter().any(|n| n.starts_with("best-")));
    assert!(checkpoints.contains(&"last-2.ckpt".to_string()));

    let saved = dir.path().join("final").join("model.ckpt");
    assert_ok(trainer.save(&saved), "explicit save");
    assert!(saved.is_file());
}

#[test]
fn test_resume_continues_from_last_checkpoint() {
    let dir = TempDir::new().unwrap();
    let mut trainer = tiny_trainer(quiet_config(dir.path()), 6);
    assert_ok(trainer.train(), "initial training");
    let steps = trainer.state().current_step;

    let mut resumed: SupervisedTrainer<CpuBackend> = assert_ok(
        SupervisedTrainer::load(dir.path(), CheckpointKind::Last, &Default::default()),
        "load last",
    );
    assert_eq!(resumed.state().current_epoch, 2);
    assert_eq!(resumed.state().current_step, steps);
    assert!(resumed.state().best_eval_loss.is_infinite());
    assert!(!resumed.has_loaders());
    assert!(matches!(resumed.train(), Err(TrainError::Training(_))));

    assert_ok(resumed.prepare_loaders(tiny_dataset(6)), "prepare loaders");
    resumed.config_mut().nb_epochs = 1;
    assert_ok(resumed.train(), "resumed training");
    assert_eq!(resumed.state().current_epoch, 3);
    assert!(resumed.state().current_step > steps);

    // The reset best loss makes the first resumed epoch a new best.
    let checkpoints = file_names(&dir.path().join("checkpoints"));
    assert_eq!(checkpoints, vec!["best-3.ckpt".to_string(), "last-3.ckpt".to_string()]);
}

#[test]
fn test_loaded_network_matches_saved_weights() {
    let dir = TempDir::new().unwrap();
    let mut trainer = tiny_trainer(quiet_config(dir.path()), 4);
    assert_ok(trainer.train(), "training");
    let path = dir.path().join("model.ckpt");
    assert_ok(trainer.save(&path), "save");

    let loaded: SupervisedTrainer<CpuBackend> =
        assert_ok(SupervisedTrainer::load(&path, CheckpointKind::Best, &Default::default()), "load file");
    assert_eq!(loaded.network().config(), trainer.network().config());
    assert_eq!(loaded.config().lr, trainer.config().lr);
    assert_eq!(loaded.loss(), trainer.loss());
    assert_eq!(loaded.optimizer_config(), trainer.optimizer_config());

    let values: Vec<f32> = (0..64).map(|i| (i as f32 / 64.0).sin()).collect();
    let input = || Tensor::<CpuBackend, 4>::from_data(TensorData::new(values.clone(), [1, 1, 8, 8]), &Default::default());
    let expected: Vec<f32> = trainer.network().forward(input()).into_data().iter::<f32>().collect();
    let actual: Vec<f32> = loaded.network().forward(input()).into_data().iter::<f32>().collect();
    for (a, e) in actual.iter().zip(&expected) {
        assert!((a - e).abs() < 1e-5, "{} != {}", a, e);
    }
}

#[test]
fn test_load_best_resets_best_eval_loss() {
    let dir = TempDir::new().unwrap();
    let mut trainer = tiny_trainer(quiet_config(dir.path()), 6);
    assert_ok(trainer.train(), "training");

    let best: SupervisedTrainer<CpuBackend> = assert_ok(
        SupervisedTrainer::load(dir.path(), CheckpointKind::Best, &Default::default()),
        "load best",
    );
    assert!(best.state().current_epoch >= 1);
    assert!(best.state().best_eval_loss.is_infinite());
    assert_eq!(best.state().epochs_without_improvement, 0);
}

#[test]
fn test_missing_checkpoints_are_reported() {
    let dir = TempDir::new().unwrap();
    let err = assert_err(
        SupervisedTrainer::<CpuBackend>::load(dir.path(), CheckpointKind::Best, &Default::default()),
        "empty experiment dir",
    );
    assert!(matches!(err, TrainError::CheckpointNotFound { kind: CheckpointKind::Best, .. }));

    let err = assert_err(
        SupervisedTrainer::<CpuBackend>::load(dir.path().join("nope.ckpt"), CheckpointKind::Last, &Default::default()),
        "missing file",
    );
    assert!(matches!(err, TrainError::FileNotFound(_)));
}

#[test]
fn test_early_stopping_without_learning() {
    let dir = TempDir::new().unwrap();
    let config = TrainerConfig::builder(dir.path())
        .nb_epochs(10)
        .batch_size(2)
        .lr(0.0)
        .early_stopping(1)
        .logging_verbosity(0)
        .build();
    let mut trainer = tiny_trainer(config, 6);
    assert_ok(trainer.train(), "training");

    // Epoch 1 sets the best loss, epoch 2 repeats it and exhausts the patience.
    assert_eq!(trainer.state().current_epoch, 2);
    assert_eq!(trainer.state().epochs_without_improvement, 1);
}

#[test]
fn test_training_without_eval_split_keeps_last_only() {
    let dir = TempDir::new().unwrap();
    let config = TrainerConfig::builder(dir.path())
        .nb_epochs(2)
        .batch_size(3)
        .train_to_val(1.0)
        .logging_verbosity(0)
        .build();
    let mut trainer = tiny_trainer(config, 3);
    assert_ok(trainer.train(), "training");

    assert_eq!(file_names(&dir.path().join("checkpoints")), vec!["last-2.ckpt".to_string()]);
    assert!(trainer.state().best_eval_loss.is_infinite());
}

#[test]
fn test_refresh_clears_previous_runs() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("stale.txt"), b"old").unwrap();
    let config = TrainerConfig::builder(dir.path())
        .nb_epochs(1)
        .batch_size(2)
        .refresh_experiment_dir(true)
        .logging_verbosity(1)
        .num_workers(2)
        .build();
    let mut trainer = tiny_trainer(config, 4);
    assert_ok(trainer.train(), "training");

    let names = file_names(dir.path());
    assert!(!names.contains(&"stale.txt".to_string()));
    assert!(names.contains(&"metrics.jsonl".to_string()));
    assert!(names.contains(&"checkpoints".to_string()));
}
