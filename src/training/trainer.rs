//! Ordinary least squares fit of combined score

use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use sha2::{Digest, Sha256};

use super::artifact::{FeatureImportance, ModelArtifact, MODEL_TYPE};
use super::metrics::Metrics;
use crate::data::dataset::TrainingSample;
use crate::{Result, TotalsError, TrainingConfig};

/// Which side of the split a game falls on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Test,
}

/// Stable split keyed only by the game id
pub fn partition_for(game_id: &str, test_percent: u8) -> Partition {
    let digest = Sha256::digest(game_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    if u64::from_be_bytes(prefix) % 100 < test_percent as u64 {
        Partition::Test
    } else {
        Partition::Train
    }
}

/// Fits and evaluates the linear totals model
pub struct ModelTrainer {
    test_percent: u8,
    min_samples: usize,
}

impl ModelTrainer {
    pub fn new(config: &TrainingConfig) -> Result<Self> {
        if config.test_percent == 0 || config.test_percent >= 100 {
            return Err(TotalsError::Config(format!(
                "test_percent must be between 1 and 99, got {}",
                config.test_percent
            )));
        }
        Ok(ModelTrainer {
            test_percent: config.test_percent,
            min_samples: config.min_samples,
        })
    }

    /// Fit on the train partition and score on the held-out games
    pub fn train(&self, samples: &[TrainingSample], seasons: &[u16]) -> Result<ModelArtifact> {
        if samples.is_empty() || samples.len() < self.min_samples {
            return Err(TotalsError::InsufficientTrainingData {
                samples: samples.len(),
                required: self.min_samples.max(1),
            });
        }

        let feature_names = samples[0].features.names().to_vec();
        for sample in samples {
            if sample.features.names() != feature_names.as_slice() {
                return Err(TotalsError::FeatureShapeMismatch {
                    expected: feature_names.join(", "),
                    found: sample.features.names().join(", "),
                });
            }
        }
        let width = feature_names.len();

        let (train, test): (Vec<&TrainingSample>, Vec<&TrainingSample>) = samples
            .iter()
            .partition(|s| partition_for(&s.game_id, self.test_percent) == Partition::Train);

        if train.len() <= width || test.is_empty() {
            return Err(TotalsError::InsufficientTrainingData {
                samples: train.len(),
                required: width + 1,
            });
        }

        log::info!(
            "Fitting OLS on {} games, holding out {} ({} features)",
            train.len(),
            test.len(),
            width
        );

        let (x, y) = to_arrays(&train, width);
        let dataset = Dataset::new(x.clone(), y);
        let fitted = LinearRegression::new()
            .fit(&dataset)
            .map_err(|e| TotalsError::Fit(e.to_string()))?;

        let coefficients = fitted.params().to_vec();
        let intercept = fitted.intercept();
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TotalsError::Fit("non-finite coefficients".to_string()));
        }

        let in_sample = evaluate(&train, &coefficients, intercept);
        log::debug!("In-sample fit: {}", in_sample);

        let held_out = evaluate(&test, &coefficients, intercept);
        log::info!("Held-out: {}", held_out);

        let feature_importance = rank_importance(&feature_names, &coefficients, &x);

        Ok(ModelArtifact {
            model_type: MODEL_TYPE.to_string(),
            created_at: chrono::Utc::now(),
            feature_names,
            coefficients,
            intercept,
            metrics: held_out.summary(),
            training_samples: train.len(),
            test_samples: test.len(),
            training_seasons: seasons.to_vec(),
            feature_importance,
        })
    }
}

fn to_arrays(samples: &[&TrainingSample], width: usize) -> (Array2<f64>, Array1<f64>) {
    let mut x = Array2::<f64>::zeros((samples.len(), width));
    let mut y = Array1::<f64>::zeros(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        for (j, value) in sample.features.values().iter().enumerate() {
            x[(i, j)] = *value;
        }
        y[i] = sample.actual_total;
    }
    (x, y)
}

fn evaluate(samples: &[&TrainingSample], coefficients: &[f64], intercept: f64) -> Metrics {
    let mut metrics = Metrics::new();
    for sample in samples {
        let predicted = sample
            .features
            .values()
            .iter()
            .zip(coefficients)
            .map(|(x, c)| x * c)
            .sum::<f64>()
            + intercept;
        metrics.update(sample.actual_total, predicted);
    }
    metrics
}

fn rank_importance(names: &[String], coefficients: &[f64], x: &Array2<f64>) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(coefficients)
        .enumerate()
        .map(|(j, (name, coefficient))| {
            let std = x.column(j).std(0.0);
            FeatureImportance {
                feature: name.clone(),
                coefficient: *coefficient,
                importance: coefficient.abs() * std,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureVector, FEATURE_COUNT};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config() -> TrainingConfig {
        TrainingConfig {
            seasons: vec![2024],
            test_percent: 20,
            min_samples: 32,
            in_season_weight: 0.7,
            prior_season_weight: 0.3,
            max_week: 18,
        }
    }

    /// Totals generated from known coefficients plus small noise
    fn synthetic(n: usize, seed: u64) -> (Vec<TrainingSample>, [f64; FEATURE_COUNT]) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut truth = [0.0; FEATURE_COUNT];
        for (j, c) in truth.iter_mut().enumerate() {
            *c = (j as f64 - 7.5) * 0.8;
        }

        let samples = (0..n)
            .map(|i| {
                let mut values = [0.0; FEATURE_COUNT];
                for v in values.iter_mut() {
                    *v = rng.gen_range(-3.0..3.0);
                }
                let total = 44.0
                    + values.iter().zip(&truth).map(|(x, c)| x * c).sum::<f64>()
                    + rng.gen_range(-0.5..0.5);
                TrainingSample {
                    game_id: format!("2024_{:03}_AAA_BBB", i),
                    season: 2024,
                    week: 1 + (i % 18) as u8,
                    features: FeatureVector::standard(values),
                    actual_total: total,
                }
            })
            .collect();

        (samples, truth)
    }

    #[test]
    fn test_partition_is_stable() {
        for id in ["2024_01_KC_BAL", "2024_05_SF_ARI", "2023_18_GB_CHI"] {
            assert_eq!(partition_for(id, 20), partition_for(id, 20));
        }
        assert_eq!(partition_for("any", 0), Partition::Train);
        assert_eq!(partition_for("any", 100), Partition::Test);
    }

    #[test]
    fn test_partition_share() {
        let test = (0..1000)
            .filter(|i| partition_for(&format!("game_{i}"), 20) == Partition::Test)
            .count();
        assert!((120..280).contains(&test), "test share {test}");
    }

    #[test]
    fn test_recovers_known_coefficients() {
        let (samples, truth) = synthetic(300, 7);
        let trainer = ModelTrainer::new(&config()).unwrap();
        let artifact = trainer.train(&samples, &[2024]).unwrap();

        assert_eq!(artifact.coefficients.len(), FEATURE_COUNT);
        for (fitted, expected) in artifact.coefficients.iter().zip(&truth) {
            assert!((fitted - expected).abs() < 0.1, "{fitted} vs {expected}");
        }
        assert!((artifact.intercept - 44.0).abs() < 0.2);
        assert_eq!(artifact.training_samples + artifact.test_samples, 300);
        assert_eq!(artifact.metrics.samples, artifact.test_samples);
        assert!(artifact.metrics.r2_score > 0.95);
        assert!(artifact.metrics.mae < 1.0);
    }

    #[test]
    fn test_importance_sorted() {
        let (samples, _) = synthetic(200, 11);
        let artifact = ModelTrainer::new(&config())
            .unwrap()
            .train(&samples, &[2024])
            .unwrap();

        let importances: Vec<f64> = artifact
            .feature_importance
            .iter()
            .map(|f| f.importance)
            .collect();
        assert!(importances.windows(2).all(|w| w[0] >= w[1]));
        // Largest |coefficient| sits at either end of the feature list
        let top = &artifact.feature_importance[0].feature;
        assert!(top == "home_off_pass_epa" || top == "away_sacks");
    }

    #[test]
    fn test_reproducible() {
        let (samples, _) = synthetic(150, 3);
        let trainer = ModelTrainer::new(&config()).unwrap();
        let a = trainer.train(&samples, &[2024]).unwrap();
        let b = trainer.train(&samples, &[2024]).unwrap();
        assert_eq!(a.coefficients, b.coefficients);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_too_few_samples() {
        let (samples, _) = synthetic(20, 1);
        let err = ModelTrainer::new(&config())
            .unwrap()
            .train(&samples, &[2024])
            .unwrap_err();
        assert!(matches!(
            err,
            TotalsError::InsufficientTrainingData {
                samples: 20,
                required: 32
            }
        ));
    }

    #[test]
    fn test_train_partition_must_exceed_width() {
        let (samples, _) = synthetic(15, 1);
        let mut cfg = config();
        cfg.min_samples = 10;
        let err = ModelTrainer::new(&cfg)
            .unwrap()
            .train(&samples, &[2024])
            .unwrap_err();
        assert!(matches!(err, TotalsError::InsufficientTrainingData { .. }));
    }

    #[test]
    fn test_invalid_test_percent() {
        let mut cfg = config();
        cfg.test_percent = 0;
        assert!(ModelTrainer::new(&cfg).is_err());
    }
}
