/// Shared fixtures and result assertions for the integration tests.
use segtrain::{
    CpuBackend, Dataset, OptimizerConfig, SegmentationLoss, SegmentationNetwork, SupervisedTrainer,
    SyntheticSegmentationDataset, TrainerConfig, UNetConfig,
};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// Assert that a Result is Ok and return the unwrapped value.
pub fn assert_ok<T, E: Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("Expected Ok result for {}, but got error: {:?}", context, err),
    }
}

/// Assert that a Result is Err and return the error.
pub fn assert_err<T, E>(result: Result<T, E>, context: &str) -> E {
    match result {
        Err(err) => err,
        Ok(_) => panic!("Expected Err result for {}, but got Ok", context),
    }
}

/// A network small enough to train in a few milliseconds.
pub fn tiny_network() -> SegmentationNetwork<CpuBackend> {
    let config = UNetConfig::new(1, 2).with_nb_levels(1).with_nb_features(vec![2, 4]);
    assert_ok(SegmentationNetwork::new(config, &Default::default()), "tiny network")
}

pub fn tiny_dataset(nb_samples: usize) -> Arc<dyn Dataset<CpuBackend>> {
    Arc::new(assert_ok(
        SyntheticSegmentationDataset::<CpuBackend>::new(nb_samples, [1, 8, 8], [2, 8, 8], Some(2), Default::default()),
        "tiny dataset",
    ))
}

pub fn quiet_config(dir: &Path) -> TrainerConfig {
    TrainerConfig::builder(dir)
        .nb_epochs(2)
        .batch_size(2)
        .lr(1e-2)
        .logging_verbosity(0)
        .build()
}

pub fn tiny_trainer(config: TrainerConfig, nb_samples: usize) -> SupervisedTrainer<CpuBackend> {
    assert_ok(
        SupervisedTrainer::new(
            tiny_network(),
            OptimizerConfig::adam(),
            SegmentationLoss::dice(),
            Some(tiny_dataset(nb_samples)),
            config,
        ),
        "trainer construction",
    )
}

/// Sorted file names of a directory.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
