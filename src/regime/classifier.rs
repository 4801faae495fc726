//! Current-regime classification over a lookback window
//!
//! The trained model is published as an immutable snapshot. `fit` trains a
//! new model off to the side and swaps it in only on success, so readers
//! never see a half-trained model and a failed retrain keeps the old one.

use super::labels::RegimeLabel;
use super::profiler::{RegimeProfile, RegimeProfiler};
use crate::config::RegimeConfig;
use crate::data::FeatureFrame;
use crate::error::{RegimeError, Result};
use crate::models::{FitReport, RegimeModel};
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque byte storage for model snapshots
pub trait SnapshotStore {
    /// Store the encoded snapshot, replacing any previous one
    fn save(&mut self, bytes: &[u8]) -> Result<()>;

    /// Latest stored snapshot, if any
    fn load(&self) -> Result<Option<Vec<u8>>>;
}

/// What regime the latest row belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    /// HMM state of the last row
    pub regime_id: usize,
    /// Fit-time name of that state
    pub regime_name: RegimeLabel,
    /// Posterior probability of `regime_id` at the last row
    pub confidence: f64,
    /// Posterior over all states at the last row
    pub posterior: Vec<f64>,
    /// Window statistics for `regime_id`
    pub profile: RegimeProfile,
    /// Rows actually used
    pub window_len: usize,
    /// Version of the model that produced this
    pub model_version: u64,
}

impl fmt::Display for RegimeClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (state {}, {:.1}% confidence, {} rows, model v{})",
            self.regime_name.emoji(),
            self.regime_name,
            self.regime_id,
            self.confidence * 100.0,
            self.window_len,
            self.model_version
        )
    }
}

/// Two-phase classifier: `fit` then `classify`
pub struct RegimeClassifier {
    config: RegimeConfig,
    snapshot: ArcSwapOption<RegimeModel>,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            snapshot: ArcSwapOption::empty(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Train a new model and publish it
    ///
    /// The version is taken from the snapshot being replaced at swap time, so
    /// overlapping fits publish distinct, increasing versions.
    pub fn fit(&self, frame: &FeatureFrame) -> Result<FitReport> {
        let mut model = RegimeModel::from_config(&self.config);
        let report = model.fit(frame)?;

        let mut version = 0;
        self.snapshot.rcu(|current| {
            version = current.as_ref().map_or(0, |m| m.version()) + 1;
            Some(Arc::new(model.clone().with_version(version)))
        });
        tracing::info!(version, "Publishing regime model snapshot");
        Ok(report)
    }

    /// Replace the published model
    pub fn publish(&self, model: RegimeModel) {
        tracing::info!(version = model.version(), "Publishing regime model snapshot");
        self.snapshot.store(Some(Arc::new(model)));
    }

    /// Currently published model
    pub fn snapshot(&self) -> Option<Arc<RegimeModel>> {
        self.snapshot.load_full()
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot.load().is_some()
    }

    /// Classify the last row using the configured lookback
    pub fn classify(&self, frame: &FeatureFrame) -> Result<RegimeClassification> {
        self.classify_with_lookback(frame, self.config.lookback_period)
    }

    /// Classify the last row using the last `lookback` rows
    pub fn classify_with_lookback(
        &self,
        frame: &FeatureFrame,
        lookback: usize,
    ) -> Result<RegimeClassification> {
        let model = self.snapshot.load_full().ok_or(RegimeError::ModelNotTrained)?;

        let window = frame.tail(lookback.max(1));
        let decoded = model.predict(&window)?;

        let last = decoded.len() - 1;
        let regime_id = decoded.states[last];
        let posterior: Vec<f64> = decoded.posteriors.row(last).to_vec();
        let confidence = posterior.get(regime_id).copied().unwrap_or(0.0).clamp(0.0, 1.0);
        let regime_name = model.label(regime_id).ok_or_else(|| {
            RegimeError::InvalidInput(format!("state {regime_id} has no label"))
        })?;

        let profiles = RegimeProfiler::new(model.n_regimes()).profile(
            &decoded.states,
            &window,
            model.labels(),
        );

        tracing::debug!(
            regime = %regime_name,
            confidence,
            window_len = window.n_samples(),
            "Classified current regime"
        );

        Ok(RegimeClassification {
            regime_id,
            regime_name,
            confidence,
            posterior,
            profile: profiles[regime_id].clone(),
            window_len: window.n_samples(),
            model_version: model.version(),
        })
    }

    /// Write the published model to a store
    pub fn persist<S: SnapshotStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        let model = self.snapshot.load_full().ok_or(RegimeError::ModelNotTrained)?;
        store.save(&model.to_bytes()?)
    }

    /// Publish the model held by a store; false when the store is empty
    pub fn restore<S: SnapshotStore + ?Sized>(&self, store: &S) -> Result<bool> {
        match store.load()? {
            Some(bytes) => {
                let model = RegimeModel::from_bytes(&bytes)?;
                if !model.is_trained() {
                    return Err(RegimeError::ModelNotTrained);
                }
                self.publish(model);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, three_regime_segments};
    use crate::data::FeatureBuilder;

    #[derive(Default)]
    struct MemoryStore(Option<Vec<u8>>);

    impl SnapshotStore for MemoryStore {
        fn save(&mut self, bytes: &[u8]) -> Result<()> {
            self.0 = Some(bytes.to_vec());
            Ok(())
        }

        fn load(&self) -> Result<Option<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    fn frame() -> FeatureFrame {
        let dataset = generate(&three_regime_segments(), 100.0, 42).unwrap();
        FeatureBuilder::default().build(&dataset, None, &[]).unwrap()
    }

    #[test]
    fn test_classify_before_fit() {
        let classifier = RegimeClassifier::new(RegimeConfig::default());
        assert!(!classifier.is_trained());
        assert!(matches!(
            classifier.classify(&frame()),
            Err(RegimeError::ModelNotTrained)
        ));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let frame = frame();
        let classifier = RegimeClassifier::new(RegimeConfig::default());
        classifier.fit(&frame).unwrap();

        let a = classifier.classify(&frame).unwrap();
        let b = classifier.classify(&frame).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.window_len, 252);
        assert_eq!(a.posterior.len(), 3);
        assert!((0.0..=1.0).contains(&a.confidence));
        assert_eq!(a.profile.state_id, a.regime_id);
    }

    #[test]
    fn test_short_window_is_recorded() {
        let frame = frame();
        let classifier = RegimeClassifier::new(RegimeConfig::default());
        classifier.fit(&frame).unwrap();

        let result = classifier.classify(&frame.tail(30)).unwrap();
        assert_eq!(result.window_len, 30);
    }

    #[test]
    fn test_failed_fit_keeps_snapshot() {
        let frame = frame();
        let classifier = RegimeClassifier::new(RegimeConfig::default());
        classifier.fit(&frame).unwrap();
        let before = classifier.snapshot().unwrap();

        assert!(classifier.fit(&frame.tail(5)).is_err());
        let after = classifier.snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_refit_bumps_version() {
        let frame = frame();
        let classifier = RegimeClassifier::new(RegimeConfig::default());
        classifier.fit(&frame).unwrap();
        classifier.fit(&frame).unwrap();
        assert_eq!(classifier.snapshot().unwrap().version(), 2);
    }

    #[test]
    fn test_concurrent_fits_publish_distinct_versions() {
        let frame = frame();
        let classifier = RegimeClassifier::new(RegimeConfig::default());

        std::thread::scope(|scope| {
            let a = scope.spawn(|| classifier.fit(&frame));
            let b = scope.spawn(|| classifier.fit(&frame));
            a.join().unwrap().unwrap();
            b.join().unwrap().unwrap();
        });

        assert_eq!(classifier.snapshot().unwrap().version(), 2);
        classifier.fit(&frame).unwrap();
        assert_eq!(classifier.snapshot().unwrap().version(), 3);
    }

    #[test]
    fn test_fit_after_restore_continues_numbering() {
        let frame = frame();
        let trained = RegimeClassifier::new(RegimeConfig::default());
        trained.fit(&frame).unwrap();
        trained.fit(&frame).unwrap();

        let mut store = MemoryStore::default();
        trained.persist(&mut store).unwrap();

        let fresh = RegimeClassifier::new(RegimeConfig::default());
        fresh.restore(&store).unwrap();
        fresh.fit(&frame).unwrap();
        assert_eq!(fresh.snapshot().unwrap().version(), 3);
    }

    #[test]
    fn test_persist_and_restore() {
        let frame = frame();
        let trained = RegimeClassifier::new(RegimeConfig::default());
        trained.fit(&frame).unwrap();

        let mut store = MemoryStore::default();
        trained.persist(&mut store).unwrap();

        let fresh = RegimeClassifier::new(RegimeConfig::default());
        assert!(fresh.restore(&store).unwrap());
        assert_eq!(
            fresh.classify(&frame).unwrap(),
            trained.classify(&frame).unwrap()
        );
    }

    #[test]
    fn test_restore_from_empty_store() {
        let classifier = RegimeClassifier::new(RegimeConfig::default());
        assert!(!classifier.restore(&MemoryStore::default()).unwrap());
        assert!(!classifier.is_trained());
    }
}
