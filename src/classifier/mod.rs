mod knn;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use crossbeam_channel::Receiver;

pub use knn::{KnnClassifier, KnnError};

use crate::types::{ClassifierEvent, Pose, Prediction};

pub const NEIGHBOR_COUNT: usize = 5;

pub trait ExampleClassifier: Send + 'static {
    /// Returns how many examples the label holds afterwards.
    fn add_example(&mut self, vector: &[f32], label: u32) -> Result<usize, KnnError>;
    fn predict_class(&self, vector: &[f32], k: usize) -> Result<Prediction, KnnError>;
    fn clear_class(&mut self, label: u32);
    fn clear_all(&mut self);
}

impl ExampleClassifier for KnnClassifier {
    fn add_example(&mut self, vector: &[f32], label: u32) -> Result<usize, KnnError> {
        KnnClassifier::add_example(self, vector, label)?;
        Ok(self.class_example_count().get(&label).copied().unwrap_or(0))
    }

    fn predict_class(&self, vector: &[f32], k: usize) -> Result<Prediction, KnnError> {
        KnnClassifier::predict_class(self, vector, k)
    }

    fn clear_class(&mut self, label: u32) {
        KnnClassifier::clear_class(self, label)
    }

    fn clear_all(&mut self) {
        KnnClassifier::clear_all(self)
    }
}

/// Requests from the UI, applied on the frame loop thread between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifierCommand {
    ClearClass(u32),
    ClearAll,
}

/// Shared "current label" counter. The UI advances it, the frame loop reads it.
#[derive(Clone, Debug, Default)]
pub struct LabelCounter(Arc<AtomicU32>);

impl LabelCounter {
    pub fn new(value: u32) -> Self {
        Self(Arc::new(AtomicU32::new(value)))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }

    pub fn advance(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn reset(&self) {
        self.set(0);
    }

    pub fn mode(&self) -> ClassifierMode {
        ClassifierMode::from_counter(self.get())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifierMode {
    Off,
    Train { label: u32 },
    Predict,
}

impl ClassifierMode {
    /// 0 is off, even values train class `counter / 2`, odd values predict.
    pub fn from_counter(counter: u32) -> Self {
        if counter == 0 {
            ClassifierMode::Off
        } else if counter % 2 == 0 {
            ClassifierMode::Train { label: counter / 2 }
        } else {
            ClassifierMode::Predict
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ClassifierMode::Off => "classifier off".to_string(),
            ClassifierMode::Train { label } => format!("training class {label}"),
            ClassifierMode::Predict => "predicting".to_string(),
        }
    }
}

pub struct PoseClassifier<C: ExampleClassifier = KnnClassifier> {
    classifier: C,
    counter: LabelCounter,
    k: usize,
    commands: Option<Receiver<ClassifierCommand>>,
}

impl PoseClassifier<KnnClassifier> {
    pub fn with_knn(counter: LabelCounter) -> Self {
        Self::new(KnnClassifier::new(), counter)
    }
}

impl<C: ExampleClassifier> PoseClassifier<C> {
    pub fn new(classifier: C, counter: LabelCounter) -> Self {
        Self {
            classifier,
            counter,
            k: NEIGHBOR_COUNT,
            commands: None,
        }
    }

    pub fn with_commands(mut self, commands: Receiver<ClassifierCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn apply_pending_commands(&mut self) {
        let Some(commands) = &self.commands else {
            return;
        };
        while let Ok(command) = commands.try_recv() {
            match command {
                ClassifierCommand::ClearClass(label) => {
                    self.classifier.clear_class(label);
                    log::info!("cleared examples for class {label}");
                }
                ClassifierCommand::ClearAll => {
                    self.classifier.clear_all();
                    log::info!("cleared all examples");
                }
            }
        }
    }

    pub fn process(&mut self, pose: &Pose) -> Option<ClassifierEvent> {
        match self.counter.mode() {
            ClassifierMode::Off => None,
            ClassifierMode::Train { label } => {
                match self.classifier.add_example(&pose.feature_vector(), label) {
                    Ok(total) => Some(ClassifierEvent::ExampleAdded { label, total }),
                    Err(err) => {
                        log::warn!("failed to add example for class {label}: {err}");
                        None
                    }
                }
            }
            ClassifierMode::Predict => {
                match self.classifier.predict_class(&pose.feature_vector(), self.k) {
                    Ok(prediction) => {
                        log::debug!("predicted {}", prediction.display_text());
                        Some(ClassifierEvent::Predicted(prediction))
                    }
                    Err(err) => {
                        log::warn!("pose prediction failed: {err}");
                        None
                    }
                }
            }
        }
    }

    #[cfg(test)]
    fn inner(&self) -> &C {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Keypoint, KeypointName};

    #[derive(Default)]
    struct CountingClassifier {
        adds: Vec<u32>,
        predicts: std::cell::Cell<usize>,
        last_k: std::cell::Cell<usize>,
    }

    impl ExampleClassifier for CountingClassifier {
        fn add_example(&mut self, _vector: &[f32], label: u32) -> Result<usize, KnnError> {
            self.adds.push(label);
            Ok(self.adds.len())
        }

        fn predict_class(&self, _vector: &[f32], k: usize) -> Result<Prediction, KnnError> {
            self.predicts.set(self.predicts.get() + 1);
            self.last_k.set(k);
            Ok(Prediction {
                label: 1,
                confidences: vec![(1, 1.0)],
            })
        }

        fn clear_class(&mut self, label: u32) {
            self.adds.retain(|l| *l != label);
        }

        fn clear_all(&mut self) {
            self.adds.clear();
        }
    }

    fn pose() -> Pose {
        let keypoints = KeypointName::ALL
            .iter()
            .enumerate()
            .map(|(i, name)| Keypoint::new(*name, i as f32, 2.0 * i as f32, 0.9))
            .collect();
        Pose::from_keypoints(keypoints)
    }

    #[test]
    fn counter_modes() {
        assert_eq!(ClassifierMode::from_counter(0), ClassifierMode::Off);
        assert_eq!(ClassifierMode::from_counter(1), ClassifierMode::Predict);
        assert_eq!(
            ClassifierMode::from_counter(2),
            ClassifierMode::Train { label: 1 }
        );
        assert_eq!(
            ClassifierMode::from_counter(6),
            ClassifierMode::Train { label: 3 }
        );
    }

    #[test]
    fn even_counter_adds_exactly_one_example() {
        let counter = LabelCounter::new(4);
        let mut wrapper = PoseClassifier::new(CountingClassifier::default(), counter);

        let event = wrapper.process(&pose());
        assert!(matches!(
            event,
            Some(ClassifierEvent::ExampleAdded { label: 2, total: 1 })
        ));
        assert_eq!(wrapper.inner().adds, vec![2]);
        assert_eq!(wrapper.inner().predicts.get(), 0);
    }

    #[test]
    fn odd_counter_predicts_exactly_once_with_five_neighbours() {
        let counter = LabelCounter::new(3);
        let mut wrapper = PoseClassifier::new(CountingClassifier::default(), counter);

        let event = wrapper.process(&pose());
        assert!(matches!(event, Some(ClassifierEvent::Predicted(_))));
        assert!(wrapper.inner().adds.is_empty());
        assert_eq!(wrapper.inner().predicts.get(), 1);
        assert_eq!(wrapper.inner().last_k.get(), NEIGHBOR_COUNT);
    }

    #[test]
    fn zero_counter_is_pass_through() {
        let counter = LabelCounter::default();
        let mut wrapper = PoseClassifier::new(CountingClassifier::default(), counter);

        assert!(wrapper.process(&pose()).is_none());
        assert!(wrapper.inner().adds.is_empty());
        assert_eq!(wrapper.inner().predicts.get(), 0);
    }

    #[test]
    fn train_then_predict_with_knn() {
        let counter = LabelCounter::new(2);
        let mut wrapper = PoseClassifier::with_knn(counter.clone());
        let trained = pose();
        wrapper.process(&trained);
        wrapper.process(&trained);

        assert_eq!(counter.advance(), 3);
        match wrapper.process(&trained) {
            Some(ClassifierEvent::Predicted(prediction)) => assert_eq!(prediction.label, 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn predicting_without_examples_yields_nothing() {
        let mut wrapper = PoseClassifier::with_knn(LabelCounter::new(1));
        assert!(wrapper.process(&pose()).is_none());
    }

    #[test]
    fn clear_commands_apply_between_frames() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let counter = LabelCounter::new(2);
        let mut wrapper = PoseClassifier::with_knn(counter.clone()).with_commands(rx);
        wrapper.process(&pose());
        counter.set(4);
        wrapper.process(&pose());

        tx.send(ClassifierCommand::ClearClass(1)).unwrap();
        wrapper.apply_pending_commands();
        assert_eq!(wrapper.inner().class_example_count().get(&1), None);
        assert_eq!(wrapper.inner().num_examples(), 1);

        tx.send(ClassifierCommand::ClearAll).unwrap();
        wrapper.apply_pending_commands();
        counter.set(3);
        assert!(wrapper.process(&pose()).is_none());
    }
}
