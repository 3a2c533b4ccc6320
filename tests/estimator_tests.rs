use mitra_bench::config::RunConfig;
use mitra_bench::error::{EstimatorError, TrainError};
use mitra_bench::estimator::{
    Dataset, FinetuneBackend, MitraEstimator, MitraParams, ProblemType, Targets, Task,
};

/// Backend that fails with out-of-memory until the support budget fits,
/// and predicts a fixed output per member.
///
/// Classification members emit ten logits: `member` on head 1, zero on the
/// rest, plus `stray_logit` on head 7 to stand in for an unused class head.
#[derive(Debug)]
struct MockBackend {
    max_support: usize,
    budgets_seen: Vec<(usize, usize)>,
    trained: usize,
    fail_with_error: bool,
    stray_logit: f64,
}

impl MockBackend {
    fn new(max_support: usize) -> Self {
        Self {
            max_support,
            budgets_seen: Vec::new(),
            trained: 0,
            fail_with_error: false,
            stray_logit: 0.0,
        }
    }
}

impl FinetuneBackend for MockBackend {
    type Member = usize;

    fn train(
        &mut self,
        config: &RunConfig,
        train: &Dataset,
        valid: &Dataset,
    ) -> Result<Self::Member, TrainError> {
        assert!(!train.is_empty());
        assert!(!valid.is_empty());
        if self.fail_with_error {
            return Err(TrainError::Other(anyhow::anyhow!("weights file is corrupt")));
        }
        let hp = &config.hyperparams_finetuning;
        self.budgets_seen
            .push((hp.max_samples_support, hp.max_samples_query));
        if hp.max_samples_support > self.max_support {
            return Err(TrainError::OutOfMemory);
        }
        self.trained += 1;
        Ok(self.trained)
    }

    fn predict(
        &self,
        member: &Self::Member,
        context: &Dataset,
        x: &[Vec<f64>],
    ) -> anyhow::Result<Vec<Vec<f64>>> {
        assert!(!context.is_empty());
        let m = *member as f64;
        match context.targets {
            Targets::Values(_) => Ok(x.iter().map(|_| vec![0.1 * m]).collect()),
            Targets::Classes(_) => Ok(x
                .iter()
                .map(|_| {
                    let mut logits = vec![0.0; 10];
                    logits[1] = m;
                    logits[7] = self.stray_logit;
                    logits
                })
                .collect()),
        }
    }
}

fn classification_data(n: usize) -> Dataset {
    let features = (0..n).map(|i| vec![i as f64, (i % 3) as f64]).collect();
    let classes = (0..n).map(|i| (i % 2) as i64).collect();
    Dataset::new(features, Targets::Classes(classes)).unwrap()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn regression_data(n: usize) -> Dataset {
    let features = (0..n).map(|i| vec![i as f64]).collect();
    let values = (0..n).map(|i| 2.0 * i as f64).collect();
    Dataset::new(features, Targets::Values(values)).unwrap()
}

#[test]
fn test_fit_and_average_ensemble() {
    let params = MitraParams {
        n_estimators: 3,
        ..Default::default()
    };
    let mut estimator = MitraEstimator::new(params, ProblemType::Binary, MockBackend::new(8192));
    estimator.fit(classification_data(40), None).unwrap();

    assert!(estimator.is_fitted());
    assert_eq!(estimator.members(), &[1, 2, 3]);
    assert_eq!(estimator.oom_retries(), 0);

    let proba = estimator.predict_proba(&[vec![0.0, 0.0]]).unwrap();
    let expected = (sigmoid(1.0) + sigmoid(2.0) + sigmoid(3.0)) / 3.0;
    assert_eq!(proba[0].len(), 2);
    assert!((proba[0][1] - expected).abs() < 1e-12);
    assert!((proba[0][0] + proba[0][1] - 1.0).abs() < 1e-12);
    assert_eq!(estimator.predict_classes(&[vec![1.0, 1.0]]).unwrap(), vec![1]);
}

#[test]
fn test_binary_predictions_ignore_unused_heads() {
    let mut backend = MockBackend::new(8192);
    backend.stray_logit = 40.0;
    let mut estimator = MitraEstimator::new(MitraParams::default(), ProblemType::Binary, backend);
    estimator.fit(classification_data(20), None).unwrap();
    assert_eq!(estimator.classes(), &[0, 1]);

    let rows = vec![vec![0.0, 0.0], vec![3.0, 1.0]];
    let proba = estimator.predict_proba(&rows).unwrap();
    assert!(proba.iter().all(|row| row.len() == 2));
    assert_eq!(estimator.predict_classes(&rows).unwrap(), vec![1, 1]);
}

#[test]
fn test_predicted_classes_are_training_labels() {
    let features = (0..12).map(|i| vec![i as f64]).collect();
    let labels = (0..12).map(|i| if i % 2 == 0 { 3 } else { 8 }).collect();
    let data = Dataset::new(features, Targets::Classes(labels)).unwrap();

    let mut estimator = MitraEstimator::new(
        MitraParams::default(),
        ProblemType::Binary,
        MockBackend::new(8192),
    );
    estimator.fit(data, None).unwrap();
    assert_eq!(estimator.classes(), &[3, 8]);
    assert_eq!(estimator.predict_classes(&[vec![0.0]]).unwrap(), vec![8]);
}

#[test]
fn test_out_of_memory_shrinks_budget_and_retrains_everything() {
    let params = MitraParams {
        n_estimators: 2,
        ..Default::default()
    };
    let mut estimator =
        MitraEstimator::new(params, ProblemType::Multiclass, MockBackend::new(2048));
    estimator.fit(classification_data(30), None).unwrap();

    assert_eq!(estimator.oom_retries(), 2);
    assert_eq!(
        estimator.backend().budgets_seen,
        vec![(8192, 1024), (4096, 1024), (2048, 1024), (2048, 1024)]
    );
    let fitted = estimator.fitted_config().unwrap();
    assert_eq!(fitted.hyperparams_finetuning.max_samples_support, 2048);
    assert_eq!(estimator.members().len(), 2);
}

#[test]
fn test_budget_exhaustion_is_an_error() {
    let mut estimator = MitraEstimator::new(
        MitraParams::default(),
        ProblemType::Regression,
        MockBackend::new(0),
    );
    let err = estimator.fit(regression_data(20), None).unwrap_err();
    assert!(matches!(err, EstimatorError::BudgetExhausted { .. }));
    assert!(!estimator.is_fitted());
}

#[test]
fn test_backend_error_aborts_without_retry() {
    let mut backend = MockBackend::new(8192);
    backend.fail_with_error = true;
    let mut estimator = MitraEstimator::new(MitraParams::default(), ProblemType::Binary, backend);
    let err = estimator.fit(classification_data(10), None).unwrap_err();
    assert!(err.to_string().contains("weights file is corrupt"));
    assert_eq!(estimator.oom_retries(), 0);
}

#[test]
fn test_explicit_validation_data_and_regression_predictions() {
    let mut estimator = MitraEstimator::new(
        MitraParams::default(),
        ProblemType::Regression,
        MockBackend::new(8192),
    );
    estimator
        .fit(regression_data(12), Some(regression_data(4)))
        .unwrap();
    let values = estimator.predict_values(&[vec![1.0], vec![2.0]]).unwrap();
    assert_eq!(values.len(), 2);
    assert!((values[0] - 0.1).abs() < 1e-12);

    let err = estimator.predict_proba(&[vec![1.0]]).unwrap_err();
    assert!(matches!(
        err,
        EstimatorError::WrongTask {
            required: Task::Classification,
            problem: ProblemType::Regression,
            ..
        }
    ));
    assert!(err.to_string().contains("needs a classification problem"));
}

#[test]
fn test_target_kind_must_match_problem() {
    let mut estimator = MitraEstimator::new(
        MitraParams::default(),
        ProblemType::Binary,
        MockBackend::new(8192),
    );
    assert!(matches!(
        estimator.fit(regression_data(10), None),
        Err(EstimatorError::TargetMismatch { .. })
    ));
}

#[test]
fn test_predict_before_fit() {
    let estimator = MitraEstimator::new(
        MitraParams::default(),
        ProblemType::Binary,
        MockBackend::new(8192),
    );
    assert!(matches!(
        estimator.predict_proba(&[vec![0.0]]),
        Err(EstimatorError::NotFitted)
    ));
}

#[test]
fn test_unsupported_problem_type() {
    let err = "ranking".parse::<ProblemType>().unwrap_err();
    assert!(matches!(err, EstimatorError::UnsupportedProblemType(_)));
}
