use ndarray::{array, Array2};
use neural_trainer::architecture::{build_network, load_architecture, ArchitectureConfig};
use neural_trainer::config::NetworkConfig;
use neural_trainer::data::Dataset;
use neural_trainer::layers::LayerConfig;
use neural_trainer::utils::Activation;
use neural_trainer::Network;
use std::error::Error;

// Small MLP learning XOR through the training engine (educational example).
const NUM_HIDDEN: usize = 4;
const NUM_OUTPUTS: usize = 1;
// Training hyperparameters.
const LEARNING_RATE: f64 = 0.1;
const EPOCHS: usize = 500;
const PATIENCE: usize = 50;

// XOR dataset (binary inputs and expected outputs).
fn xor_dataset() -> Result<Dataset, Box<dyn Error>> {
    let inputs = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
    let outputs = array![[0.0], [1.0], [1.0], [0.0]];
    let dataset = Dataset::new(inputs, outputs)?
        .with_labels(vec!["a".into(), "b".into()], vec!["a xor b".into()])?;
    Ok(dataset)
}

// Built-in architecture: 4 ReLU hidden neurons, 1 sigmoid output, full batch.
fn default_architecture() -> ArchitectureConfig {
    ArchitectureConfig {
        network: NetworkConfig {
            seed: 42,
            batch_size: 4,
            learning_rate: LEARNING_RATE,
            max_epoch: EPOCHS,
            patience: PATIENCE,
            name: "xor".to_string(),
            ..Default::default()
        },
        layers: vec![
            LayerConfig::new(NUM_HIDDEN, Activation::relu()),
            LayerConfig::new(NUM_OUTPUTS, Activation::Sigmoid),
        ],
    }
}

// Architecture file given as first argument, built-in one otherwise.
fn architecture_from_args(args: &[String]) -> Result<ArchitectureConfig, Box<dyn Error>> {
    match args.get(1) {
        Some(path) => {
            log::info!("loading architecture from {path}");
            Ok(load_architecture(path)?)
        }
        None => Ok(default_architecture()),
    }
}

// Simple evaluation on XOR samples.
fn test(network: &Network, inputs: &Array2<f64>, expected: &Array2<f64>) -> Result<(), Box<dyn Error>> {
    println!("\nTesting the trained network:");
    let predicted = network.process(inputs.view())?;
    for (i, row) in inputs.rows().into_iter().enumerate() {
        println!(
            "Input: {:.1}, {:.1}, Expected Output: {:.1}, Predicted Output: {:.3}",
            row[0],
            row[1],
            expected[[i, 0]],
            predicted[[i, 0]]
        );
    }
    Ok(())
}

fn run(args: &[String]) -> Result<Network, Box<dyn Error>> {
    let architecture = architecture_from_args(args)?;

    let dataset = xor_dataset()?;
    let inputs = dataset.inputs().clone();
    let expected = dataset.outputs().clone();

    let mut network = build_network(&architecture)?;
    network.set_data(dataset)?;
    let report = network.learn()?;

    println!(
        "Stopped after {} epochs ({:?}), best epoch {}, validation loss {:.6}",
        report.epochs_run, report.stop_reason, report.optimal_epoch, report.best_validation_loss
    );
    test(&network, &inputs, &expected)?;
    Ok(network)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    run(&args)?;
    Ok(())
}
