//! Training step and one-epoch loop
//!
//! The loop is generic over the model, the optimizer, the learning-rate
//! schedule and the [`TrainStep`] that decides which parameters receive
//! gradients. Loss is binary cross-entropy on a single logit.

use burn::{
    module::AutodiffModule,
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::scheduler::StepScheduler;
use crate::dataset::WildfireBatch;
use crate::model::BinaryClassifier;
use crate::utils::error::{Result, WildfireError};

/// Loss and accuracy over one pass of the training split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// Sample-weighted mean loss
    pub loss: f64,
    pub accuracy: f64,
    pub samples: usize,
}

/// Which part of a model a training step updates
pub trait TrainStep<B: AutodiffBackend, M: AutodiffModule<B>> {
    /// Logits `[N, 1]` for a batch
    fn forward(&self, model: &M, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Gradients of the parameters this step updates
    fn gradients(&self, model: &M, grads: B::Gradients) -> GradientsParams;

    /// Shape check run before every forward pass
    fn check_input(&self, model: &M, dims: [usize; 4]) -> Result<()>;
}

/// Every parameter of the model is trained
#[derive(Debug, Clone, Copy, Default)]
pub struct FullModel;

impl<B, M> TrainStep<B, M> for FullModel
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + BinaryClassifier<B>,
{
    fn forward(&self, model: &M, images: Tensor<B, 4>) -> Tensor<B, 2> {
        model.logits(images)
    }

    fn gradients(&self, model: &M, grads: B::Gradients) -> GradientsParams {
        GradientsParams::from_grads(grads, model)
    }

    fn check_input(&self, model: &M, dims: [usize; 4]) -> Result<()> {
        model.check_input(dims)
    }
}

/// Mean binary cross-entropy of logits `[N, 1]` against 0/1 targets `[N, 1]`
pub fn bce_with_logits<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
    BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(&logits.device())
        .forward(logits, targets)
}

/// Logits to host values
pub(crate) fn logits_to_vec<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<f32>> {
    logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| WildfireError::Tensor(format!("{:?}", e)))
}

/// Predictions from logits: `sigmoid(logit) >= 0.5` is the same as `logit >= 0`
pub(crate) fn count_correct(logits: &[f32], labels: &[usize]) -> usize {
    logits
        .iter()
        .zip(labels)
        .filter(|(logit, label)| usize::from(**logit >= 0.0) == **label)
        .count()
}

/// Train for exactly one pass over `batches`
///
/// Per batch: forward, loss, backward, one optimizer step at the schedule's
/// current rate, then one schedule step. The first batch error aborts the
/// epoch.
pub fn train_one_epoch<B, M, O, S, T, I>(
    mut model: M,
    optimizer: &mut O,
    scheduler: &mut S,
    step: &T,
    batches: I,
    num_batches: usize,
) -> Result<(M, EpochStats)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
    S: StepScheduler + ?Sized,
    T: TrainStep<B, M>,
    I: IntoIterator<Item = Result<WildfireBatch<B>>>,
{
    let pb = ProgressBar::new(num_batches as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in batches {
        let batch = batch?;
        step.check_input(&model, batch.images.dims())?;
        let batch_size = batch.labels.len();

        let logits = step.forward(&model, batch.images);
        let loss = bce_with_logits(logits.clone(), batch.targets);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        let host_logits = logits_to_vec(logits.detach())?;

        loss_sum += loss_value * batch_size as f64;
        correct += count_correct(&host_logits, &batch.labels);
        total += batch_size;

        let grads = step.gradients(&model, loss.backward());
        model = optimizer.step(scheduler.lr(), model, grads);
        scheduler.step();

        pb.set_message(format!("loss {:.4}", loss_value));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let stats = EpochStats {
        loss: loss_sum / total.max(1) as f64,
        accuracy: correct as f64 / total.max(1) as f64,
        samples: total,
    };
    debug!(
        "Epoch pass done: {} samples, loss {:.4}, acc {:.4}",
        stats.samples, stats.loss, stats.accuracy
    );

    Ok((model, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WildfireNetConfig;
    use crate::training::scheduler::ConstantLr;
    use burn::backend::Autodiff;
    use burn::optim::AdamWConfig;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray>;

    fn synthetic_batch(device: &<TestBackend as Backend>::Device) -> WildfireBatch<TestBackend> {
        let labels = vec![0usize, 1, 0, 1];
        let images = Tensor::<TestBackend, 4>::random(
            [4, 3, 128, 128],
            Distribution::Normal(0.0, 1.0),
            device,
        );
        let targets = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![0i64, 1, 0, 1], [4, 1]),
            device,
        );
        WildfireBatch {
            images,
            targets,
            labels,
        }
    }

    #[test]
    fn test_count_correct_uses_zero_logit_threshold() {
        let logits = [-2.0, 0.0, 0.5, -0.1];
        let labels = [0, 1, 0, 1];
        assert_eq!(count_correct(&logits, &labels), 2);
    }

    #[test]
    fn test_bce_with_logits_matches_closed_form() {
        let device = Default::default();
        let logits = Tensor::<NdArray, 2>::from_floats([[0.0], [0.0]], &device);
        let targets =
            Tensor::<NdArray, 2, Int>::from_data(TensorData::new(vec![0i64, 1], [2, 1]), &device);

        let loss: f64 = bce_with_logits(logits, targets).into_scalar().elem();
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_single_step_updates_parameters() {
        let device = Default::default();
        TestBackend::seed(&device, 42);
        let model = WildfireNetConfig::new()
            .with_dropout(0.4)
            .init::<TestBackend>(&device);
        let before: Vec<f32> = model.fc3.weight.val().into_data().to_vec().unwrap();
        let mut optimizer = AdamWConfig::new()
            .with_weight_decay(1e-4)
            .init::<TestBackend, crate::model::WildfireNet<TestBackend>>();
        let mut scheduler = ConstantLr::new(1e-3);

        let (model, stats) = train_one_epoch(
            model,
            &mut optimizer,
            &mut scheduler,
            &FullModel,
            vec![Ok(synthetic_batch(&device))],
            1,
        )
        .unwrap();

        assert_eq!(stats.samples, 4);
        assert!(stats.loss.is_finite());
        assert!(stats.loss > 0.0);

        let after: Vec<f32> = model.fc3.weight.val().into_data().to_vec().unwrap();
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(&after).any(|(a, b)| a != b));
    }

    #[test]
    fn test_wrong_resolution_is_rejected() {
        let device = Default::default();
        let model = WildfireNetConfig::new()
            .with_input_size(32)
            .init::<TestBackend>(&device);
        let mut optimizer = AdamWConfig::new().init::<TestBackend, crate::model::WildfireNet<TestBackend>>();
        let mut scheduler = ConstantLr::new(1e-3);

        let result = train_one_epoch(
            model,
            &mut optimizer,
            &mut scheduler,
            &FullModel,
            vec![Ok(synthetic_batch(&device))],
            1,
        );
        assert!(matches!(result, Err(WildfireError::Config(_))));
        assert_eq!(scheduler.lr(), 1e-3);
    }

    #[test]
    fn test_batch_error_aborts_epoch() {
        let device = Default::default();
        let model = WildfireNetConfig::new()
            .with_input_size(32)
            .init::<TestBackend>(&device);
        let mut optimizer = AdamWConfig::new().init::<TestBackend, crate::model::WildfireNet<TestBackend>>();
        let mut scheduler = ConstantLr::new(1e-3);

        let batches: Vec<Result<WildfireBatch<TestBackend>>> = vec![Err(WildfireError::ImageLoad(
            "broken.png".into(),
            "truncated".to_string(),
        ))];
        let result = train_one_epoch(model, &mut optimizer, &mut scheduler, &FullModel, batches, 1);
        assert!(matches!(result, Err(WildfireError::ImageLoad(_, _))));
    }
}
