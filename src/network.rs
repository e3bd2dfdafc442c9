//! Network: layer stack, data splits and the training loop
//!
//! Training follows a fixed sequence:
//!
//! 1. check the configuration, the layer stack and the data
//! 2. shuffle and split the data (batch-aligned training split)
//! 3. fit the preprocessors on the training split and apply them everywhere
//! 4. create the layers, inferring input widths
//! 5. run epochs until the validation loss stops improving for `patience`
//!    epochs or `max_epoch` is reached, keeping the best layer state
//! 6. restore the best state and report
//!
//! # Example
//!
//! ```no_run
//! use neural_trainer::config::NetworkConfig;
//! use neural_trainer::data::Dataset;
//! use neural_trainer::layers::LayerConfig;
//! use neural_trainer::network::Network;
//! use neural_trainer::utils::Activation;
//! use ndarray::array;
//!
//! let mut network = Network::new(NetworkConfig { seed: 42, ..Default::default() }).unwrap();
//! network.add_layer(LayerConfig::new(4, Activation::relu())).unwrap();
//! network.add_layer(LayerConfig::new(1, Activation::Linear)).unwrap();
//! network
//!     .set_data(Dataset::new(array![[0.0], [1.0], [2.0]], array![[0.0], [2.0], [4.0]]).unwrap())
//!     .unwrap();
//! let report = network.learn().unwrap();
//! println!("best epoch {}", report.optimal_epoch);
//! ```

use crate::config::NetworkConfig;
use crate::cost::{average_loss, Cost, Loss};
use crate::data::{split_sizes, Dataset};
use crate::error::{Error, Result};
use crate::io::{self, NetworkSnapshot};
use crate::layers::{DenseLayer, LayerConfig, UpdateParams};
use crate::metrics::{self, Metrics};
use crate::optimizers::OptimizerSettings;
use crate::preprocess::{PreprocessKind, PreprocessSettings, Preprocessor};
use crate::thread_pool::ThreadPool;
use crate::utils::scheduler::{
    build_scheduler, BatchSizeSchedule, LearningRateSchedule, MomentumSchedule,
};
use crate::utils::{permutation, resolve_seed, seeded_rng, softmax_rows};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lifecycle of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingState {
    /// Created, not trained yet.
    Uninitialized,
    /// Checks passed, data split, preprocessors and layers ready.
    Initialized,
    /// Epoch loop running (or aborted by an error).
    Training,
    /// Stopped because the validation loss stopped improving.
    Converged,
    /// Stopped at `max_epoch`.
    MaxEpochReached,
    /// Best kept state restored, ready for inference.
    BestRestored,
}

/// Why the epoch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    MaxEpochReached,
}

/// Losses, metrics and hyperparameters of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: f64,
    pub metrics: Metrics,
    pub learning_rate: f64,
    pub momentum: f64,
    pub batch_size: usize,
}

/// Outcome of [`Network::learn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Epoch whose state was restored (0 is the initial state).
    pub optimal_epoch: usize,
    pub epochs_run: usize,
    pub stop_reason: StopReason,
    pub best_validation_loss: f64,
    /// Test metrics of the restored state.
    pub metrics: Metrics,
    /// One record per epoch, epoch 0 first.
    pub history: Vec<EpochRecord>,
}

/// Preprocessed splits kept for the whole run.
#[derive(Debug, Clone)]
struct PreparedData {
    train_inputs: Array2<f64>,
    train_outputs: Array2<f64>,
    validation_inputs: Array2<f64>,
    validation_outputs: Array2<f64>,
    test_inputs: Array2<f64>,
    /// Raw outputs, metrics compare against the postprocessed predictions.
    test_outputs: Array2<f64>,
}

impl PreparedData {
    // empty validation falls back to the training split
    fn validation(&self) -> (&Array2<f64>, &Array2<f64>) {
        if self.validation_inputs.nrows() == 0 {
            (&self.train_inputs, &self.train_outputs)
        } else {
            (&self.validation_inputs, &self.validation_outputs)
        }
    }
}

/// Feed-forward network with its training loop.
#[derive(Debug)]
pub struct Network {
    config: NetworkConfig,
    layer_configs: Vec<LayerConfig>,
    layers: Vec<DenseLayer>,
    data: Option<Dataset>,
    test_data: Option<Dataset>,
    input_preprocessor: Option<Preprocessor>,
    output_preprocessor: Option<Preprocessor>,
    output_ranges: Option<Array1<f64>>,
    input_labels: Vec<String>,
    output_labels: Vec<String>,
    prepared: Option<PreparedData>,
    cost: Cost,
    pool: ThreadPool,
    rng: StdRng,
    state: TrainingState,
    history: Vec<EpochRecord>,
    optimal_epoch: usize,
}

impl Network {
    /// Creates an untrained network and its worker pool.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `config` does not validate.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPool::new(config.threads)?;
        let cost = Cost::new(config.loss, config.cross_entropy_bias);
        let rng = seeded_rng(config.seed);
        Ok(Self {
            config,
            layer_configs: Vec::new(),
            layers: Vec::new(),
            data: None,
            test_data: None,
            input_preprocessor: None,
            output_preprocessor: None,
            output_ranges: None,
            input_labels: Vec::new(),
            output_labels: Vec::new(),
            prepared: None,
            cost,
            pool,
            rng,
            state: TrainingState::Uninitialized,
            history: Vec::new(),
            optimal_epoch: 0,
        })
    }

    /// Appends a layer to the stack.
    pub fn add_layer(&mut self, layer: LayerConfig) -> Result<()> {
        if layer.size == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer {} must have at least one neuron",
                self.layer_configs.len()
            )));
        }
        self.layer_configs.push(layer);
        Ok(())
    }

    /// Training data, split into train/validation/test by [`learn`](Self::learn).
    pub fn set_data(&mut self, data: Dataset) -> Result<()> {
        if data.is_empty() {
            return Err(Error::MissingData("dataset has no rows".to_string()));
        }
        self.data = Some(data);
        Ok(())
    }

    /// Dedicated test set; the training data is then only split in two.
    pub fn set_test_data(&mut self, data: Dataset) -> Result<()> {
        if data.is_empty() {
            return Err(Error::MissingData("test dataset has no rows".to_string()));
        }
        self.test_data = Some(data);
        Ok(())
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn input_labels(&self) -> &[String] {
        &self.input_labels
    }

    pub fn output_labels(&self) -> &[String] {
        &self.output_labels
    }

    /// Trains the network and restores its best state.
    ///
    /// # Errors
    ///
    /// Configuration and data errors are reported before the first epoch.
    /// Thread pool failures abort the run; the best state kept so far can
    /// still be restored with [`release`](Self::release).
    pub fn learn(&mut self) -> Result<TrainingReport> {
        self.check()?;
        let (train, validation, test) = self.split_data()?;
        self.init_preprocess(&train, &validation, &test)?;
        self.init_layers()?;
        self.state = TrainingState::Initialized;

        self.state = TrainingState::Training;
        let (stop_reason, best_validation_loss) = self.run_epochs()?;
        self.state = match stop_reason {
            StopReason::Converged => TrainingState::Converged,
            StopReason::MaxEpochReached => TrainingState::MaxEpochReached,
        };

        self.release()?;

        let metrics = self.history[self.optimal_epoch].metrics;
        log::info!(
            "{}: stopped ({:?}) after {} epochs, optimal epoch {}, validation loss {:.6}, {}",
            self.config.name,
            stop_reason,
            self.history.len() - 1,
            self.optimal_epoch,
            best_validation_loss,
            metrics
        );

        Ok(TrainingReport {
            optimal_epoch: self.optimal_epoch,
            epochs_run: self.history.len() - 1,
            stop_reason,
            best_validation_loss,
            metrics,
            history: self.history.clone(),
        })
    }

    fn check(&self) -> Result<()> {
        self.config.validate()?;
        let Some(last) = self.layer_configs.last() else {
            return Err(Error::InvalidConfig("network has no layers".to_string()));
        };
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::MissingData("no training data, call set_data first".to_string()))?;

        // a reduced output width is only known once fitted, init_layers checks it
        let reduces_outputs = self.config.preprocess_outputs.contains(&PreprocessKind::Reduce);
        let fits = if reduces_outputs {
            last.size <= data.output_width()
        } else {
            last.size == data.output_width()
        };
        if !fits {
            return Err(Error::mismatch(
                "output layer size",
                data.output_width(),
                last.size,
            ));
        }
        if let Some(test) = &self.test_data {
            if test.input_width() != data.input_width() {
                return Err(Error::mismatch(
                    "test input width",
                    data.input_width(),
                    test.input_width(),
                ));
            }
            if test.output_width() != data.output_width() {
                return Err(Error::mismatch(
                    "test output width",
                    data.output_width(),
                    test.output_width(),
                ));
            }
        }
        Ok(())
    }

    fn split_data(&mut self) -> Result<(Dataset, Dataset, Dataset)> {
        let seed = resolve_seed(self.config.seed);
        self.rng = seeded_rng(seed);

        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::MissingData("no training data, call set_data first".to_string()))?;
        let test_ratio = if self.test_data.is_some() {
            0.0
        } else {
            self.config.test_ratio
        };
        let sizes = split_sizes(
            data.len(),
            self.config.batch_size,
            self.config.validation_ratio,
            test_ratio,
        )?;

        let order = permutation(data.len(), &mut self.rng);
        let (train_rows, rest) = order.split_at(sizes.train);
        let (validation_rows, test_rows) = rest.split_at(sizes.validation);

        let train = data.select(train_rows);
        let validation = data.select(validation_rows);
        let test = match &self.test_data {
            Some(test) => test.clone(),
            None => data.select(test_rows),
        };

        self.input_labels = data.input_labels().to_vec();
        self.output_labels = data.output_labels().to_vec();

        if validation.is_empty() {
            log::warn!(
                "{}: validation split is empty, validation loss uses the training split",
                self.config.name
            );
        }
        if test.is_empty() {
            log::warn!(
                "{}: test split is empty, metrics use the validation split",
                self.config.name
            );
        }
        log::debug!(
            "{}: seed {seed}, split {} train / {} validation / {} test",
            self.config.name,
            train.len(),
            validation.len(),
            test.len()
        );
        Ok((train, validation, test))
    }

    fn init_preprocess(&mut self, train: &Dataset, validation: &Dataset, test: &Dataset) -> Result<()> {
        let input_settings = PreprocessSettings {
            reduction_threshold: self.config.input_reduction_threshold,
            whitening_bias: self.config.whitening_bias,
        };
        let output_settings = PreprocessSettings {
            reduction_threshold: self.config.output_reduction_threshold,
            ..input_settings
        };
        let inputs = Preprocessor::fit(&self.config.preprocess_inputs, train.inputs(), &input_settings)?;
        let outputs =
            Preprocessor::fit(&self.config.preprocess_outputs, train.outputs(), &output_settings)?;
        if outputs.output_width() < outputs.input_width() {
            log::info!(
                "{}: outputs reduced from {} to {} components",
                self.config.name,
                outputs.input_width(),
                outputs.output_width()
            );
        }

        if self.config.use_class_weights && self.config.loss.is_classification() {
            let ratios = train
                .outputs()
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::from_elem(train.output_width(), 0.5));
            log::debug!("{}: class ratios {ratios}", self.config.name);
            self.cost = Cost::weighted(self.config.loss, self.config.cross_entropy_bias, ratios);
        } else {
            self.cost = Cost::new(self.config.loss, self.config.cross_entropy_bias);
        }

        // metrics fall back to validation, then training rows
        let metric_source = if !test.is_empty() {
            test
        } else if !validation.is_empty() {
            validation
        } else {
            train
        };

        let prepared = PreparedData {
            train_inputs: inputs.apply(train.inputs().view())?,
            train_outputs: outputs.apply(train.outputs().view())?,
            validation_inputs: inputs.apply(validation.inputs().view())?,
            validation_outputs: outputs.apply(validation.outputs().view())?,
            test_inputs: inputs.apply(metric_source.inputs().view())?,
            test_outputs: metric_source.outputs().clone(),
        };

        self.output_ranges = Some(metrics::column_ranges(train.outputs()));
        self.input_preprocessor = Some(inputs);
        self.output_preprocessor = Some(outputs);
        self.prepared = Some(prepared);
        Ok(())
    }

    fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            adaptive: self.config.adaptive_learning_rate,
            learning_rate: self.config.learning_rate,
            momentum: self.config.momentum,
            window: self.config.window,
            bias: self.config.optimizer_bias,
        }
    }

    fn init_layers(&mut self) -> Result<()> {
        let (input_width, output_width) = match (&self.input_preprocessor, &self.output_preprocessor) {
            (Some(inputs), Some(outputs)) => (inputs.output_width(), outputs.output_width()),
            _ => {
                return Err(Error::InvalidState(
                    "layers initialized before preprocessing".to_string(),
                ))
            }
        };

        let settings = self.optimizer_settings();
        let mut width = input_width;
        let mut layers = Vec::with_capacity(self.layer_configs.len());
        for layer in &self.layer_configs {
            layers.push(DenseLayer::new(
                width,
                layer.size,
                layer.activation,
                &settings,
                &mut self.rng,
            ));
            width = layer.size;
        }
        if width != output_width {
            return Err(Error::mismatch("output layer size", output_width, width));
        }
        log::debug!(
            "{}: {} layers, {} parameters",
            self.config.name,
            layers.len(),
            layers.iter().map(DenseLayer::parameter_count).sum::<usize>()
        );
        self.layers = layers;
        Ok(())
    }

    fn run_epochs(&mut self) -> Result<(StopReason, f64)> {
        let prepared = self
            .prepared
            .take()
            .ok_or_else(|| Error::InvalidState("training data not prepared".to_string()))?;
        let outcome = self.epoch_loop(&prepared);
        self.prepared = Some(prepared);
        outcome
    }

    fn epoch_loop(&mut self, data: &PreparedData) -> Result<(StopReason, f64)> {
        let config = self.config.clone();
        let n_train = data.train_inputs.nrows();

        let mut learning_rate = LearningRateSchedule::new(
            config.learning_rate,
            build_scheduler(config.scheduler, config.scheduler_value, config.scheduler_delay),
        );
        let mut momentum = MomentumSchedule::new(
            config.momentum,
            config.max_momentum,
            build_scheduler(
                config.momentum_scheduler,
                config.momentum_scheduler_value,
                config.momentum_scheduler_delay,
            ),
        );
        let cap = (config.max_batch_size_ratio * n_train as f64).round() as usize;
        let mut batch_size = BatchSizeSchedule::new(
            config.batch_size,
            cap,
            build_scheduler(
                config.batch_size_scheduler,
                config.batch_size_scheduler_value,
                config.batch_size_scheduler_delay,
            ),
        );

        self.history.clear();
        let (validation_inputs, validation_outputs) = data.validation();

        let mut best = self.loss_on(validation_inputs, validation_outputs)?;
        self.optimal_epoch = 0;
        self.keep();
        self.history.push(EpochRecord {
            epoch: 0,
            train_loss: self.loss_on(&data.train_inputs, &data.train_outputs)?,
            validation_loss: best,
            metrics: self.test_metrics(data)?,
            learning_rate: learning_rate.value(),
            momentum: momentum.value(),
            batch_size: batch_size.value(),
        });
        log::info!("{}: initial validation loss {best:.6}", config.name);

        for epoch in 1..=config.max_epoch {
            let params = UpdateParams {
                learning_rate: learning_rate.value(),
                momentum: momentum.value(),
                l1: config.l1,
                l2: config.l2,
                decay: config.decay,
                tack_on: config.tack_on,
            };
            let batch = batch_size.value().clamp(1, n_train);

            let order = permutation(n_train, &mut self.rng);
            for rows in order.chunks_exact(batch) {
                let inputs = data.train_inputs.select(Axis(0), rows);
                let outputs = data.train_outputs.select(Axis(0), rows);
                self.train_batch(&inputs, &outputs, &params)?;
            }

            let train_loss = self.loss_on(&data.train_inputs, &data.train_outputs)?;
            let validation_loss = self.loss_on(validation_inputs, validation_outputs)?;
            let metrics = self.test_metrics(data)?;

            if improves(validation_loss, best, config.improvement) {
                best = validation_loss;
                self.optimal_epoch = epoch;
                self.keep();
                log::debug!("{}: epoch {epoch} kept as new best", config.name);
            }
            let stagnation = epoch - self.optimal_epoch;

            log::info!(
                "{}: epoch {epoch} train {train_loss:.6} validation {validation_loss:.6} {metrics} \
                 lr {:.3e} momentum {:.3} batch {batch} stagnation {stagnation}",
                config.name,
                params.learning_rate,
                params.momentum,
            );
            self.history.push(EpochRecord {
                epoch,
                train_loss,
                validation_loss,
                metrics,
                learning_rate: params.learning_rate,
                momentum: params.momentum,
                batch_size: batch,
            });

            if stagnation > config.patience {
                return Ok((StopReason::Converged, best));
            }
            if epoch == config.max_epoch {
                break;
            }

            learning_rate.step(epoch, stagnation);
            momentum.step(epoch, stagnation);
            batch_size.step(epoch, stagnation);
            log::debug!(
                "{}: next epoch lr {:.3e} momentum {:.3} batch {}",
                config.name,
                learning_rate.value(),
                momentum.value(),
                batch_size.value()
            );
        }
        Ok((StopReason::MaxEpochReached, best))
    }

    /// One forward/backward/update cycle on a batch.
    fn train_batch(
        &mut self,
        inputs: &Array2<f64>,
        outputs: &Array2<f64>,
        params: &UpdateParams,
    ) -> Result<()> {
        let last = self.layers.len().saturating_sub(1);
        let mut activations = inputs.clone();
        for (index, layer) in self.layers.iter_mut().enumerate() {
            let dropout = if index == last { 0.0 } else { self.config.dropout };
            activations =
                layer.forward_train(&activations, dropout, self.config.dropconnect, &mut self.rng)?;
        }

        let mut error = self.cost.gradient_matrix(outputs, &activations, &self.pool)?;
        for layer in self.layers.iter_mut().rev() {
            error = layer.compute_gradients(&error)?;
        }
        for layer in &mut self.layers {
            layer.update(params, &mut self.rng)?;
        }
        Ok(())
    }

    // raw network output on preprocessed inputs, no softmax
    fn forward(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        let mut activations = inputs.to_owned();
        for layer in &self.layers {
            activations = layer.forward(activations.view())?;
        }
        Ok(activations)
    }

    fn loss_on(&self, inputs: &Array2<f64>, outputs: &Array2<f64>) -> Result<f64> {
        let predicted = self.forward(inputs.view())?;
        let loss = self.cost.loss_matrix(outputs, &predicted, &self.pool)?;
        Ok(average_loss(&loss))
    }

    fn test_metrics(&self, data: &PreparedData) -> Result<Metrics> {
        let predicted = self.finish_outputs(self.forward(data.test_inputs.view())?)?;
        if self.config.loss.is_classification() {
            metrics::classification(
                &data.test_outputs,
                &predicted,
                self.config.classification_threshold,
            )
        } else {
            let ranges = self
                .output_ranges
                .as_ref()
                .ok_or_else(|| Error::InvalidState("output ranges not computed".to_string()))?;
            metrics::regression(&data.test_outputs, &predicted, ranges)
        }
    }

    // softmax for cross-entropy, then back to the raw output scale
    fn finish_outputs(&self, outputs: Array2<f64>) -> Result<Array2<f64>> {
        let outputs = match self.config.loss {
            Loss::CrossEntropy => softmax_rows(outputs.view()),
            _ => outputs,
        };
        self.postprocess(outputs.view())
    }

    /// Loss of the current layers on the validation split (training split if
    /// the validation split is empty).
    pub fn validation_loss(&self) -> Result<f64> {
        let data = self
            .prepared
            .as_ref()
            .ok_or_else(|| Error::InvalidState("network has not been trained".to_string()))?;
        let (inputs, outputs) = data.validation();
        self.loss_on(inputs, outputs)
    }

    /// Snapshots every layer as the best known state.
    pub fn keep(&mut self) {
        for layer in &mut self.layers {
            layer.keep();
        }
    }

    /// Restores every layer to its kept state.
    pub fn release(&mut self) -> Result<()> {
        if self.layers.is_empty() || self.layers.iter().any(|layer| !layer.has_kept_state()) {
            return Err(Error::InvalidState("release called before keep".to_string()));
        }
        for layer in &mut self.layers {
            layer.release()?;
        }
        self.state = TrainingState::BestRestored;
        Ok(())
    }

    fn input_pipeline(&self) -> Result<&Preprocessor> {
        self.input_preprocessor
            .as_ref()
            .ok_or_else(|| Error::InvalidState("input preprocessing not fitted".to_string()))
    }

    fn output_pipeline(&self) -> Result<&Preprocessor> {
        self.output_preprocessor
            .as_ref()
            .ok_or_else(|| Error::InvalidState("output preprocessing not fitted".to_string()))
    }

    /// Raw inputs to network inputs.
    pub fn preprocess(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.input_pipeline()?.apply(inputs)
    }

    /// Network outputs to raw outputs.
    ///
    /// Lossy when the outputs are reduced: the dropped components come back
    /// as zeros before the rotation is undone.
    pub fn postprocess(&self, outputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.output_pipeline()?.revert(outputs)
    }

    /// Network inputs back to raw inputs.
    pub fn depreprocess(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.input_pipeline()?.revert(inputs)
    }

    /// Raw outputs to network outputs.
    pub fn depostprocess(&self, outputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.output_pipeline()?.apply(outputs)
    }

    /// Predicts raw outputs for raw inputs, one row per sample.
    ///
    /// Deterministic: no dropout, no dropconnect.
    pub fn process(&self, inputs: ArrayView2<f64>) -> Result<Array2<f64>> {
        if self.layers.is_empty() {
            return Err(Error::InvalidState("network has not been trained".to_string()));
        }
        let processed = self.preprocess(inputs)?;
        self.finish_outputs(self.forward(processed.view())?)
    }

    /// [`process`](Self::process) for a single sample.
    pub fn process_one(&self, input: ArrayView1<f64>) -> Result<Array1<f64>> {
        let outputs = self.process(input.insert_axis(Axis(0)))?;
        Ok(outputs.row(0).to_owned())
    }

    /// Serializable state of the trained network.
    pub fn snapshot(&self) -> Result<NetworkSnapshot> {
        if self.layers.is_empty() {
            return Err(Error::InvalidState("network has not been trained".to_string()));
        }
        let output_ranges = self
            .output_ranges
            .clone()
            .ok_or_else(|| Error::InvalidState("output ranges not computed".to_string()))?;
        Ok(NetworkSnapshot {
            config: self.config.clone(),
            layers: self.layers.iter().map(DenseLayer::state).collect(),
            input_preprocessor: self.input_pipeline()?.clone(),
            output_preprocessor: self.output_pipeline()?.clone(),
            output_ranges,
            input_labels: self.input_labels.clone(),
            output_labels: self.output_labels.clone(),
            optimal_epoch: self.optimal_epoch,
            history: self.history.clone(),
        })
    }

    /// Rebuilds a network ready for inference, running on `threads` workers.
    pub fn from_snapshot(snapshot: NetworkSnapshot, threads: usize) -> Result<Self> {
        let config = NetworkConfig {
            threads,
            ..snapshot.config
        };
        let mut network = Network::new(config)?;
        let settings = network.optimizer_settings();

        let mut width = snapshot.input_preprocessor.output_width();
        for state in snapshot.layers {
            if state.weights.nrows() != width {
                return Err(Error::mismatch("layer input width", width, state.weights.nrows()));
            }
            width = state.weights.ncols();
            network
                .layer_configs
                .push(LayerConfig::new(width, state.activation));
            let mut layer = DenseLayer::from_state(state, &settings)?;
            layer.keep();
            network.layers.push(layer);
        }
        let output_width = snapshot.output_preprocessor.output_width();
        if width != output_width {
            return Err(Error::mismatch("output layer size", output_width, width));
        }

        network.input_preprocessor = Some(snapshot.input_preprocessor);
        network.output_preprocessor = Some(snapshot.output_preprocessor);
        network.output_ranges = Some(snapshot.output_ranges);
        network.input_labels = snapshot.input_labels;
        network.output_labels = snapshot.output_labels;
        network.optimal_epoch = snapshot.optimal_epoch;
        network.history = snapshot.history;
        network.state = TrainingState::BestRestored;
        Ok(network)
    }

    /// Writes the trained network to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        io::save_snapshot(&self.snapshot()?, path)
    }

    /// Loads a network written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>, threads: usize) -> Result<Self> {
        Self::from_snapshot(io::load_snapshot(path)?, threads)
    }
}

// A decrease of exactly `improvement` (relative) counts; a zero best can
// only be beaten strictly.
fn improves(loss: f64, best: f64, improvement: f64) -> bool {
    let threshold = best * (1.0 - improvement);
    if improvement > 0.0 && best > 0.0 {
        loss <= threshold
    } else {
        loss < threshold
    }
}
