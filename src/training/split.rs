//! Train/test and K-fold splitting

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PipelineError, Result};
use crate::features::FeatureFrame;

/// Split a frame into train and test parts
///
/// The test part holds `ceil(len * test_size)` rows. Without shuffling the
/// test rows are the tail of the frame; with shuffling both parts follow a
/// seeded permutation.
pub fn train_test_split(
    frame: &FeatureFrame,
    test_size: f64,
    shuffle: bool,
    seed: u64,
) -> Result<(FeatureFrame, FeatureFrame)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidInput(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n = frame.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InvalidInput(format!(
            "cannot split {} rows with test_size {}",
            n, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let (train, test) = if shuffle {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let (test, train) = indices.split_at(n_test);
        (train.to_vec(), test.to_vec())
    } else {
        let (train, test) = indices.split_at(n - n_test);
        (train.to_vec(), test.to_vec())
    };

    Ok((frame.take_rows(&train), frame.take_rows(&test)))
}

/// One cross-validation fold
#[derive(Debug, Clone)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Shuffled K-fold indices; the first `n % k` folds get one extra row
pub fn k_fold(n_samples: usize, n_splits: usize, seed: u64) -> Result<Vec<Fold>> {
    if n_splits < 2 {
        return Err(PipelineError::InvalidInput(
            "n_splits must be at least 2".to_string(),
        ));
    }
    if n_samples < n_splits {
        return Err(PipelineError::InvalidInput(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n_samples / n_splits;
    let remainder = n_samples % n_splits;
    let mut folds = Vec::with_capacity(n_splits);
    let mut start = 0;
    for i in 0..n_splits {
        let size = if i < remainder { base + 1 } else { base };
        let validation = indices[start..start + size].to_vec();
        let train = indices[..start]
            .iter()
            .chain(indices[start + size..].iter())
            .copied()
            .collect();
        folds.push(Fold { train, validation });
        start += size;
    }
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn frame(rows: usize) -> FeatureFrame {
        let ts = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let index = (0..rows).map(|i| ts + chrono::Duration::hours(i as i64)).collect();
        let values = Array2::from_shape_fn((rows, 1), |(r, _)| r as f64);
        FeatureFrame::new(index, vec!["x".into()], values).unwrap()
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(&frame(10), 0.2, true, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<f64> = train.column("x").unwrap().to_vec();
        all.extend(test.column("x").unwrap().iter());
        all.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(all, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_without_shuffle_takes_tail() {
        let (train, test) = train_test_split(&frame(10), 0.3, false, 0).unwrap();
        assert_eq!(test.column("x").unwrap().to_vec(), vec![7.0, 8.0, 9.0]);
        assert_eq!(train.len(), 7);
    }

    #[test]
    fn test_split_is_seeded() {
        let a = train_test_split(&frame(20), 0.25, true, 7).unwrap();
        let b = train_test_split(&frame(20), 0.25, true, 7).unwrap();
        assert_eq!(a.1, b.1);
    }

    #[test]
    fn test_split_rejects_bad_size() {
        assert!(train_test_split(&frame(10), 1.0, true, 0).is_err());
        assert!(train_test_split(&frame(1), 0.5, true, 0).is_err());
    }

    #[test]
    fn test_k_fold_covers_every_row_once() {
        let folds = k_fold(10, 3, 1).unwrap();
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.validation.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(folds[0].validation.len(), 4);
        assert!(folds.iter().all(|f| f.train.len() + f.validation.len() == 10));
    }
}
