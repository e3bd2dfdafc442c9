//! End-to-end tests of the training loop
//!
//! This file covers:
//! - The XOR run: loss decreasing from the initial state, best state restored
//! - Stop conditions (convergence, max epoch) and the training state machine
//! - Setup errors reported before any training
//! - Hyperparameter schedules recorded in the history
//! - Regression with preprocessing and softmax classification
//! - Inference, persistence and determinism

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use neural_trainer::config::NetworkConfig;
use neural_trainer::cost::Loss;
use neural_trainer::data::{split_sizes, Dataset};
use neural_trainer::layers::LayerConfig;
use neural_trainer::metrics::Metrics;
use neural_trainer::preprocess::PreprocessKind;
use neural_trainer::utils::{seeded_rng, Activation, SchedulerKind};
use neural_trainer::{Error, Network, StopReason, TrainingState};
use rand::Rng;
use tempfile::NamedTempFile;

fn xor_data() -> Dataset {
    Dataset::new(
        array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        array![[0.0], [1.0], [1.0], [0.0]],
    )
    .unwrap()
}

fn xor_config() -> NetworkConfig {
    NetworkConfig {
        seed: 42,
        batch_size: 4,
        learning_rate: 0.1,
        max_epoch: 500,
        patience: 50,
        loss: Loss::L2,
        name: "xor".to_string(),
        ..Default::default()
    }
}

fn xor_network(config: NetworkConfig) -> Network {
    let mut network = Network::new(config).unwrap();
    network
        .add_layer(LayerConfig::new(4, Activation::relu()))
        .unwrap();
    network
        .add_layer(LayerConfig::new(1, Activation::Sigmoid))
        .unwrap();
    network.set_data(xor_data()).unwrap();
    network
}

// y = 2a - b + 0.5 on uniform inputs
fn regression_data(rows: usize, seed: u64) -> Dataset {
    let mut rng = seeded_rng(seed);
    let inputs = Array2::from_shape_simple_fn((rows, 2), || rng.random_range(-1.0..1.0));
    let outputs = Array2::from_shape_fn((rows, 1), |(i, _)| {
        2.0 * inputs[[i, 0]] - inputs[[i, 1]] + 0.5
    });
    Dataset::new(inputs, outputs).unwrap()
}

fn regression_config() -> NetworkConfig {
    NetworkConfig {
        seed: 3,
        batch_size: 10,
        learning_rate: 0.01,
        adaptive_learning_rate: true,
        momentum: 0.9,
        max_momentum: 0.9,
        max_epoch: 200,
        patience: 20,
        improvement: 0.001,
        preprocess_inputs: vec![
            PreprocessKind::Center,
            PreprocessKind::Decorrelate,
            PreprocessKind::Whiten,
        ],
        preprocess_outputs: vec![PreprocessKind::Normalize],
        name: "regression".to_string(),
        ..Default::default()
    }
}

fn regression_network(config: NetworkConfig, data: Dataset) -> Network {
    let mut network = Network::new(config).unwrap();
    network
        .add_layer(LayerConfig::new(1, Activation::Linear))
        .unwrap();
    network.set_data(data).unwrap();
    network
}

// Three separated blobs, one-hot targets.
fn blobs(rows_per_class: usize, seed: u64) -> Dataset {
    let centers = [(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)];
    let mut rng = seeded_rng(seed);
    let rows = rows_per_class * centers.len();
    let mut inputs = Array2::zeros((rows, 2));
    let mut outputs = Array2::zeros((rows, 3));
    for (i, mut row) in inputs.rows_mut().into_iter().enumerate() {
        let class = i % centers.len();
        let (x, y) = centers[class];
        row[0] = x + rng.random_range(-1.0..1.0);
        row[1] = y + rng.random_range(-1.0..1.0);
        outputs[[i, class]] = 1.0;
    }
    Dataset::new(inputs, outputs).unwrap()
}

// ============================================================================
// XOR Run
// ============================================================================

mod xor_tests {
    use super::*;

    #[test]
    fn test_loss_decreases_over_first_epochs() {
        let mut network = xor_network(xor_config());
        let report = network.learn().unwrap();

        let initial = report.history[0].validation_loss;
        assert!(report.history.len() > 10);
        for record in &report.history[1..=10] {
            assert!(
                record.validation_loss < initial,
                "epoch {} loss {} not below initial {}",
                record.epoch,
                record.validation_loss,
                initial
            );
        }
    }

    #[test]
    fn test_best_state_restored() {
        let mut network = xor_network(xor_config());
        let report = network.learn().unwrap();

        assert_eq!(network.state(), TrainingState::BestRestored);
        let restored = network.validation_loss().unwrap();
        assert_relative_eq!(restored, report.best_validation_loss, epsilon = 1e-12);
        assert_relative_eq!(
            restored,
            report.history[report.optimal_epoch].validation_loss,
            epsilon = 1e-12
        );
        assert!(restored <= report.history[0].validation_loss);
        assert!(report
            .history
            .iter()
            .all(|record| record.validation_loss >= restored * (1.0 - 1e-12)
                || record.epoch > report.optimal_epoch));
    }

    #[test]
    fn test_history_numbering() {
        let mut network = xor_network(xor_config());
        let report = network.learn().unwrap();
        assert_eq!(report.history.len(), report.epochs_run + 1);
        for (index, record) in report.history.iter().enumerate() {
            assert_eq!(record.epoch, index);
        }
        assert_eq!(network.history(), report.history.as_slice());
    }

    #[test]
    fn test_labels_follow_data() {
        let mut network = xor_network(xor_config());
        network
            .set_data(
                xor_data()
                    .with_labels(vec!["a".into(), "b".into()], vec!["xor".into()])
                    .unwrap(),
            )
            .unwrap();
        network.learn().unwrap();
        assert_eq!(network.input_labels(), ["a", "b"]);
        assert_eq!(network.output_labels(), ["xor"]);
    }
}

// ============================================================================
// Stop Conditions
// ============================================================================

mod stop_tests {
    use super::*;

    #[test]
    fn test_max_epoch_reached() {
        let mut network = xor_network(NetworkConfig {
            max_epoch: 5,
            ..xor_config()
        });
        let report = network.learn().unwrap();
        assert_eq!(report.stop_reason, StopReason::MaxEpochReached);
        assert_eq!(report.epochs_run, 5);
        assert_eq!(report.history.len(), 6);
        assert_eq!(network.state(), TrainingState::BestRestored);
    }

    #[test]
    fn test_converges_without_improvement() {
        // steps too small to ever beat the 1% improvement threshold
        let mut network = xor_network(NetworkConfig {
            learning_rate: 1e-12,
            patience: 0,
            ..xor_config()
        });
        let report = network.learn().unwrap();
        assert_eq!(report.stop_reason, StopReason::Converged);
        assert_eq!(report.optimal_epoch, 0);
        assert_eq!(report.epochs_run, 1);
    }

    #[test]
    fn test_patience_counts_epochs_after_best() {
        let mut network = xor_network(NetworkConfig {
            learning_rate: 1e-12,
            patience: 3,
            ..xor_config()
        });
        let report = network.learn().unwrap();
        assert_eq!(report.stop_reason, StopReason::Converged);
        assert_eq!(report.epochs_run, 4);
    }

    #[test]
    fn test_retraining_starts_over() {
        let mut network = xor_network(NetworkConfig {
            max_epoch: 3,
            ..xor_config()
        });
        let first = network.learn().unwrap();
        let second = network.learn().unwrap();
        assert_eq!(first.history, second.history);
    }
}

// ============================================================================
// Setup Errors
// ============================================================================

mod setup_tests {
    use super::*;

    #[test]
    fn test_output_size_mismatch_before_training() {
        let mut network = Network::new(xor_config()).unwrap();
        network
            .add_layer(LayerConfig::new(4, Activation::relu()))
            .unwrap();
        network
            .add_layer(LayerConfig::new(2, Activation::Sigmoid))
            .unwrap();
        network.set_data(xor_data()).unwrap();

        let result = network.learn();
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                expected: 1,
                got: 2,
                ..
            })
        ));
        assert_eq!(network.state(), TrainingState::Uninitialized);
        assert!(network.layers().is_empty());
        assert!(network.history().is_empty());
    }

    #[test]
    fn test_missing_data() {
        let mut network = Network::new(xor_config()).unwrap();
        network
            .add_layer(LayerConfig::new(1, Activation::Sigmoid))
            .unwrap();
        assert!(matches!(network.learn(), Err(Error::MissingData(_))));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let mut network = Network::new(xor_config()).unwrap();
        let empty = Dataset::new(Array2::zeros((0, 2)), Array2::zeros((0, 1))).unwrap();
        assert!(matches!(network.set_data(empty), Err(Error::MissingData(_))));
    }

    #[test]
    fn test_no_layers() {
        let mut network = Network::new(xor_config()).unwrap();
        network.set_data(xor_data()).unwrap();
        assert!(matches!(network.learn(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_sized_layer() {
        let mut network = Network::new(xor_config()).unwrap();
        assert!(network
            .add_layer(LayerConfig::new(0, Activation::Linear))
            .is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = NetworkConfig {
            threads: 0,
            ..xor_config()
        };
        assert!(matches!(Network::new(config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_batch_larger_than_data() {
        let mut network = xor_network(NetworkConfig {
            batch_size: 8,
            ..xor_config()
        });
        assert!(matches!(network.learn(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_test_set_width_checked() {
        let mut network = xor_network(xor_config());
        network
            .set_test_data(Dataset::new(array![[1.0, 0.0, 1.0]], array![[1.0]]).unwrap())
            .unwrap();
        assert!(matches!(
            network.learn(),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_inference_before_training() {
        let network = xor_network(xor_config());
        assert!(matches!(
            network.process(array![[0.0, 1.0]].view()),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(network.validation_loss(), Err(Error::InvalidState(_))));
        assert!(matches!(network.snapshot(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_release_before_training() {
        let mut network = xor_network(xor_config());
        assert!(matches!(network.release(), Err(Error::InvalidState(_))));
    }
}

// ============================================================================
// Data Splits
// ============================================================================

mod split_tests {
    use super::*;

    #[test]
    fn test_batch_aligned_split() {
        let sizes = split_sizes(100, 10, 0.2, 0.2).unwrap();
        assert_eq!((sizes.train, sizes.validation, sizes.test), (60, 20, 20));
    }

    #[test]
    fn test_remainder_shared_by_ratio() {
        // 103 - 20.6 - 10.3 = 72.1 rows -> 7 batches of 10
        let sizes = split_sizes(103, 10, 0.2, 0.1).unwrap();
        assert_eq!(sizes.train, 70);
        assert_eq!(sizes.validation, 22);
        assert_eq!(sizes.test, 11);
    }

    #[test]
    fn test_rounding_up_a_batch() {
        // 4 - 0.8 - 0.8 = 2.4 rows = 0.6 batch of 4 -> rounded to one batch
        let sizes = split_sizes(4, 4, 0.2, 0.2).unwrap();
        assert_eq!((sizes.train, sizes.validation, sizes.test), (4, 0, 0));
    }

    #[test]
    fn test_no_test_ratio() {
        let sizes = split_sizes(100, 10, 0.2, 0.0).unwrap();
        assert_eq!((sizes.train, sizes.validation, sizes.test), (80, 20, 0));
    }

    #[test]
    fn test_no_batch_fits() {
        assert!(matches!(
            split_sizes(5, 10, 0.2, 0.2),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_metrics_use_explicit_test_set() {
        let mut shifted = regression_data(20, 99);
        shifted = Dataset::new(shifted.inputs().clone(), shifted.outputs() + 10.0).unwrap();

        let mut network = regression_network(regression_config(), regression_data(80, 5));
        network.set_test_data(shifted).unwrap();
        let report = network.learn().unwrap();

        let Metrics::Regression { mae, .. } = report.metrics else {
            panic!("expected regression metrics");
        };
        // every prediction is about 10 away, the output range is about 6
        assert!(mae > 1.0, "mae {mae}");
    }
}

// ============================================================================
// Schedules
// ============================================================================

mod schedule_tests {
    use super::*;

    #[test]
    fn test_hyperparameters_recorded_per_epoch() {
        let config = NetworkConfig {
            batch_size: 5,
            batch_size_scheduler: SchedulerKind::Step,
            batch_size_scheduler_value: 2.0,
            batch_size_scheduler_delay: 1,
            max_batch_size_ratio: 0.5,
            scheduler: SchedulerKind::Step,
            scheduler_value: 2.0,
            scheduler_delay: 1,
            adaptive_learning_rate: false,
            momentum: 0.1,
            max_momentum: 0.9,
            momentum_scheduler: SchedulerKind::Exponential,
            momentum_scheduler_value: 1.0,
            momentum_scheduler_delay: 1,
            max_epoch: 4,
            ..regression_config()
        };
        let mut network = regression_network(config, regression_data(100, 1));
        let report = network.learn().unwrap();
        let epochs = &report.history[1..=4];

        // 60 training rows, cap = 30
        let batches: Vec<usize> = epochs.iter().map(|r| r.batch_size).collect();
        assert_eq!(batches, vec![5, 10, 20, 30]);

        let rates: Vec<f64> = epochs.iter().map(|r| r.learning_rate).collect();
        for (rate, expected) in rates.iter().zip([0.01, 0.005, 0.0025, 0.00125]) {
            assert_relative_eq!(*rate, expected, epsilon = 1e-15);
        }

        assert_relative_eq!(epochs[0].momentum, 0.1, epsilon = 1e-12);
        assert_relative_eq!(
            epochs[1].momentum,
            0.9 - 0.8 * (-1.0f64).exp(),
            epsilon = 1e-12
        );
        assert!(epochs[3].momentum > epochs[2].momentum);
    }
}

// ============================================================================
// Regression and Classification
// ============================================================================

mod task_tests {
    use super::*;

    #[test]
    fn test_regression_with_preprocessing() {
        let mut network = regression_network(regression_config(), regression_data(100, 4));
        let report = network.learn().unwrap();

        let Metrics::Regression { mae, mse } = report.metrics else {
            panic!("expected regression metrics");
        };
        assert!(mae < 0.05, "mae {mae}");
        assert!(mse < 0.01, "mse {mse}");

        let predicted = network.process(array![[0.5, -0.5]].view()).unwrap();
        assert!((predicted[[0, 0]] - 2.0).abs() < 0.3, "{predicted}");
    }

    #[test]
    fn test_processing_round_trips() {
        let mut network = regression_network(regression_config(), regression_data(100, 4));
        network.learn().unwrap();

        let inputs = array![[0.3, -0.2], [-0.9, 0.4]];
        let processed = network.preprocess(inputs.view()).unwrap();
        let restored = network.depreprocess(processed.view()).unwrap();
        for (a, b) in inputs.iter().zip(restored.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }

        let outputs = array![[1.5], [-2.0]];
        let normalized = network.depostprocess(outputs.view()).unwrap();
        let back = network.postprocess(normalized.view()).unwrap();
        for (a, b) in outputs.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    // two outputs on one line: (y, -y) with y = 2a - b + 0.5
    fn mirrored_outputs(data: &Dataset) -> Dataset {
        let outputs = Array2::from_shape_fn((data.len(), 2), |(i, j)| {
            let y = data.outputs()[[i, 0]];
            if j == 0 {
                y
            } else {
                -y
            }
        });
        Dataset::new(data.inputs().clone(), outputs).unwrap()
    }

    fn reduced_output_config() -> NetworkConfig {
        NetworkConfig {
            preprocess_outputs: vec![PreprocessKind::Decorrelate, PreprocessKind::Reduce],
            ..regression_config()
        }
    }

    #[test]
    fn test_reduced_outputs_train_on_one_component() {
        let data = mirrored_outputs(&regression_data(100, 4));
        let mut network = regression_network(reduced_output_config(), data);
        let report = network.learn().unwrap();

        assert_eq!(network.layers().last().unwrap().output_size(), 1);
        let Metrics::Regression { mae, .. } = report.metrics else {
            panic!("expected regression metrics");
        };
        assert!(mae < 0.1, "mae {mae}");

        let predicted = network.process(array![[0.5, -0.5]].view()).unwrap();
        assert_eq!(predicted.ncols(), 2);
        assert!((predicted[[0, 0]] - 2.0).abs() < 0.3, "{predicted}");
        assert_relative_eq!(predicted[[0, 1]], -predicted[[0, 0]], epsilon = 1e-9);
    }

    #[test]
    fn test_reduced_postprocess_is_lossy() {
        let data = mirrored_outputs(&regression_data(100, 4));
        let mut network = regression_network(reduced_output_config(), data);
        network.learn().unwrap();

        // on the kept line the round trip is exact
        let on_line = array![[1.5, -1.5]];
        let reduced = network.depostprocess(on_line.view()).unwrap();
        assert_eq!(reduced.ncols(), 1);
        let back = network.postprocess(reduced.view()).unwrap();
        for (a, b) in on_line.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }

        // the dropped direction comes back as zero
        let off_line = array![[1.0, 1.0]];
        let reduced = network.depostprocess(off_line.view()).unwrap();
        let back = network.postprocess(reduced.view()).unwrap();
        assert!(back.iter().all(|v| v.abs() < 1e-9), "{back}");
    }

    #[test]
    fn test_reduced_outputs_check_layer_width() {
        let data = mirrored_outputs(&regression_data(100, 4));

        // wider than the raw outputs: rejected before any preprocessing
        let mut network = Network::new(reduced_output_config()).unwrap();
        network
            .add_layer(LayerConfig::new(3, Activation::Linear))
            .unwrap();
        network.set_data(data.clone()).unwrap();
        assert!(matches!(
            network.learn(),
            Err(Error::DimensionMismatch {
                expected: 2,
                got: 3,
                ..
            })
        ));

        // raw width, but the fitted outputs keep one component
        let mut network = Network::new(reduced_output_config()).unwrap();
        network
            .add_layer(LayerConfig::new(2, Activation::Linear))
            .unwrap();
        network.set_data(data).unwrap();
        assert!(matches!(
            network.learn(),
            Err(Error::DimensionMismatch {
                expected: 1,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_softmax_classification() {
        let config = NetworkConfig {
            seed: 11,
            batch_size: 9,
            learning_rate: 0.01,
            adaptive_learning_rate: true,
            momentum: 0.9,
            max_momentum: 0.9,
            max_epoch: 150,
            patience: 15,
            loss: Loss::CrossEntropy,
            use_class_weights: true,
            preprocess_inputs: vec![PreprocessKind::Standardize],
            name: "blobs".to_string(),
            ..Default::default()
        };
        let mut network = Network::new(config).unwrap();
        network
            .add_layer(LayerConfig::new(8, Activation::Tanh))
            .unwrap();
        network
            .add_layer(LayerConfig::new(3, Activation::Linear))
            .unwrap();
        network.set_data(blobs(30, 8)).unwrap();
        let report = network.learn().unwrap();

        assert!(report.best_validation_loss < report.history[0].validation_loss);
        let Metrics::Classification { accuracy, .. } = report.metrics else {
            panic!("expected classification metrics");
        };
        assert!(accuracy > 80.0, "accuracy {accuracy}");

        let probabilities = network
            .process(array![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]].view())
            .unwrap();
        for (class, row) in probabilities.rows().into_iter().enumerate() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|p| *p >= 0.0));
            let best = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            assert_eq!(best, Some(class));
        }
    }

    #[test]
    fn test_dropout_run_completes() {
        let mut network = xor_network(NetworkConfig {
            dropout: 0.2,
            dropconnect: 0.1,
            max_epoch: 20,
            ..xor_config()
        });
        let report = network.learn().unwrap();
        assert!(report.history.iter().all(|r| r.validation_loss.is_finite()));
        // inference stays deterministic
        let inputs = array![[0.0, 1.0], [1.0, 1.0]];
        assert_eq!(
            network.process(inputs.view()).unwrap(),
            network.process(inputs.view()).unwrap()
        );
    }
}

// ============================================================================
// Inference, Persistence and Determinism
// ============================================================================

mod inference_tests {
    use super::*;

    #[test]
    fn test_process_one_matches_batch() {
        let mut network = xor_network(NetworkConfig {
            max_epoch: 10,
            ..xor_config()
        });
        network.learn().unwrap();
        let inputs = array![[0.0, 1.0], [1.0, 0.0]];
        let batch = network.process(inputs.view()).unwrap();
        for (i, row) in inputs.rows().into_iter().enumerate() {
            assert_eq!(network.process_one(row).unwrap(), batch.row(i));
        }
    }

    #[test]
    fn test_input_width_checked() {
        let mut network = xor_network(NetworkConfig {
            max_epoch: 2,
            ..xor_config()
        });
        network.learn().unwrap();
        assert!(matches!(
            network.process(array![[1.0]].view()),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut network = regression_network(
            NetworkConfig {
                max_epoch: 20,
                ..regression_config()
            },
            regression_data(100, 6),
        );
        network.learn().unwrap();

        let file = NamedTempFile::new().unwrap();
        network.save(file.path()).unwrap();
        let loaded = Network::load(file.path(), 2).unwrap();

        let inputs = array![[0.1, 0.2], [-0.7, 0.9], [1.0, -1.0]];
        assert_eq!(
            loaded.process(inputs.view()).unwrap(),
            network.process(inputs.view()).unwrap()
        );
        assert_eq!(loaded.history(), network.history());
        assert_eq!(loaded.state(), TrainingState::BestRestored);
        assert_eq!(loaded.config().threads, 2);
        assert_eq!(loaded.snapshot().unwrap().layers, network.snapshot().unwrap().layers);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Network::load("does/not/exist.json", 1),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_same_seed_same_run() {
        let mut a = xor_network(NetworkConfig {
            max_epoch: 30,
            ..xor_config()
        });
        let mut b = xor_network(NetworkConfig {
            max_epoch: 30,
            ..xor_config()
        });
        assert_eq!(a.learn().unwrap(), b.learn().unwrap());
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let run = |threads: usize| {
            let mut network = regression_network(
                NetworkConfig {
                    threads,
                    max_epoch: 15,
                    ..regression_config()
                },
                regression_data(100, 2),
            );
            network.learn().unwrap()
        };
        assert_eq!(run(1), run(4));
    }
}
