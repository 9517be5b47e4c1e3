use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

use crate::types::Prediction;

#[derive(Debug, Error, PartialEq)]
pub enum KnnError {
    #[error("no examples have been added yet")]
    Empty,
    #[error("k must be at least 1")]
    ZeroK,
    #[error("vector has {got} dimensions, examples have {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Cosine-similarity nearest-neighbour classifier. Examples are stored
/// L2-normalized so similarity is a plain dot product.
#[derive(Debug, Default)]
pub struct KnnClassifier {
    examples: BTreeMap<u32, Vec<Array1<f32>>>,
    dimension: Option<usize>,
}

impl KnnClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_example(&mut self, vector: &[f32], label: u32) -> Result<(), KnnError> {
        self.check_dimension(vector.len())?;
        self.dimension = Some(vector.len());
        self.examples
            .entry(label)
            .or_default()
            .push(normalized(ArrayView1::from(vector)));
        Ok(())
    }

    pub fn predict_class(&self, vector: &[f32], k: usize) -> Result<Prediction, KnnError> {
        if k == 0 {
            return Err(KnnError::ZeroK);
        }
        if self.num_examples() == 0 {
            return Err(KnnError::Empty);
        }
        self.check_dimension(vector.len())?;

        let query = normalized(ArrayView1::from(vector));
        let query = &query;
        let mut scored: Vec<(f32, u32)> = self
            .examples
            .iter()
            .flat_map(|(label, rows)| rows.iter().map(move |row| (row.dot(query), *label)))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let k = k.min(scored.len());
        // votes and summed similarity per label
        let mut tally: BTreeMap<u32, (usize, f32)> = BTreeMap::new();
        for &(similarity, label) in scored.iter().take(k) {
            let entry = tally.entry(label).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += similarity;
        }

        let mut label = 0;
        let mut best = (0usize, f32::MIN);
        for (&candidate, &(votes, similarity)) in &tally {
            if votes > best.0 || (votes == best.0 && similarity > best.1) {
                label = candidate;
                best = (votes, similarity);
            }
        }

        let confidences = self
            .examples
            .keys()
            .map(|&l| {
                let votes = tally.get(&l).map(|t| t.0).unwrap_or(0);
                (l, votes as f32 / k as f32)
            })
            .collect();

        Ok(Prediction { label, confidences })
    }

    pub fn class_example_count(&self) -> BTreeMap<u32, usize> {
        self.examples
            .iter()
            .map(|(label, rows)| (*label, rows.len()))
            .collect()
    }

    pub fn num_examples(&self) -> usize {
        self.examples.values().map(Vec::len).sum()
    }

    pub fn clear_class(&mut self, label: u32) {
        self.examples.remove(&label);
        if self.examples.is_empty() {
            self.dimension = None;
        }
    }

    pub fn clear_all(&mut self) {
        self.examples.clear();
        self.dimension = None;
    }

    fn check_dimension(&self, got: usize) -> Result<(), KnnError> {
        match self.dimension {
            Some(expected) if expected != got => Err(KnnError::DimensionMismatch { expected, got }),
            _ => Ok(()),
        }
    }
}

fn normalized(vector: ArrayView1<f32>) -> Array1<f32> {
    let norm = vector.dot(&vector).sqrt();
    if norm < 1e-12 {
        vector.to_owned()
    } else {
        vector.mapv(|v| v / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_majority_of_nearest() {
        let mut knn = KnnClassifier::new();
        knn.add_example(&[1.0, 0.0], 1).unwrap();
        knn.add_example(&[0.9, 0.1], 1).unwrap();
        knn.add_example(&[0.0, 1.0], 2).unwrap();

        let prediction = knn.predict_class(&[1.0, 0.05], 2).unwrap();
        assert_eq!(prediction.label, 1);
        assert_eq!(prediction.confidences, vec![(1, 1.0), (2, 0.0)]);
    }

    #[test]
    fn k_is_capped_by_example_count() {
        let mut knn = KnnClassifier::new();
        knn.add_example(&[0.0, 1.0], 3).unwrap();
        let prediction = knn.predict_class(&[0.1, 1.0], 5).unwrap();
        assert_eq!(prediction.label, 3);
        assert_eq!(prediction.confidences, vec![(3, 1.0)]);
    }

    #[test]
    fn scale_does_not_change_similarity() {
        let mut knn = KnnClassifier::new();
        knn.add_example(&[10.0, 0.0], 1).unwrap();
        knn.add_example(&[0.0, 0.5], 2).unwrap();
        assert_eq!(knn.predict_class(&[0.0, 300.0], 1).unwrap().label, 2);
    }

    #[test]
    fn rejects_bad_input() {
        let mut knn = KnnClassifier::new();
        assert_eq!(knn.predict_class(&[1.0], 5).unwrap_err(), KnnError::Empty);
        knn.add_example(&[1.0, 2.0], 1).unwrap();
        assert_eq!(knn.predict_class(&[1.0, 2.0], 0).unwrap_err(), KnnError::ZeroK);
        assert_eq!(
            knn.add_example(&[1.0], 1).unwrap_err(),
            KnnError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn clearing_classes() {
        let mut knn = KnnClassifier::new();
        knn.add_example(&[1.0, 0.0], 1).unwrap();
        knn.add_example(&[0.0, 1.0], 2).unwrap();
        knn.add_example(&[0.0, 1.0], 2).unwrap();
        assert_eq!(knn.class_example_count().get(&2), Some(&2));

        knn.clear_class(2);
        assert_eq!(knn.num_examples(), 1);
        knn.clear_all();
        assert_eq!(knn.num_examples(), 0);
        knn.add_example(&[1.0, 0.0, 0.0], 4).unwrap();
    }
}
