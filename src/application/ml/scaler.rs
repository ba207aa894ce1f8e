use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::domain::errors::PipelineError;

/// Per-column min-max normalization parameters.
///
/// Fit once over the full training corpus, persisted next to the model, and
/// reused unchanged for every transform afterwards. Refitting at inference
/// time would silently invalidate the stored model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    max: Array1<f64>,
}

impl MinMaxScaler {
    /// Computes per-column minimum and maximum over all rows.
    pub fn fit(matrix: &Array2<f64>) -> Result<Self, PipelineError> {
        if matrix.nrows() == 0 {
            return Err(PipelineError::EmptyCorpus);
        }

        let n_cols = matrix.ncols();
        let mut min = Array1::from_elem(n_cols, f64::INFINITY);
        let mut max = Array1::from_elem(n_cols, f64::NEG_INFINITY);

        for row in matrix.rows() {
            for (j, &value) in row.iter().enumerate() {
                if value < min[j] {
                    min[j] = value;
                }
                if value > max[j] {
                    max[j] = value;
                }
            }
        }

        Ok(Self { min, max })
    }

    /// Rescales each value to `(x - min) / (max - min)`.
    ///
    /// Training-range values land in [0,1]; out-of-range values at inference
    /// time extrapolate beyond it, which the model tolerates. A zero-range
    /// column maps to 0.0 everywhere.
    pub fn transform(&self, matrix: &Array2<f64>) -> Array2<f64> {
        let mut out = matrix.clone();
        for mut row in out.rows_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                let range = self.max[j] - self.min[j];
                *value = if range == 0.0 {
                    0.0
                } else {
                    (*value - self.min[j]) / range
                };
            }
        }
        out
    }

    /// Number of columns this scaler was fit on.
    pub fn num_columns(&self) -> usize {
        self.min.len()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = bincode::serialize(self).context("Failed to serialize scaler")?;
        std::fs::write(path.as_ref(), encoded)
            .with_context(|| format!("Failed to write scaler to {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| PipelineError::ArtifactLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        bincode::deserialize(&bytes).map_err(|e| PipelineError::ArtifactLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_maps_extremes_to_unit_interval() {
        let data = array![[1.0, 10.0], [3.0, 20.0], [5.0, 40.0]];
        let scaler = MinMaxScaler::fit(&data).unwrap();
        let scaled = scaler.transform(&data);

        // Column minima map to exactly 0, maxima to exactly 1.
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[2, 0]], 1.0);
        assert_eq!(scaled[[0, 1]], 0.0);
        assert_eq!(scaled[[2, 1]], 1.0);

        for &v in scaled.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_transform_is_idempotent_across_calls() {
        let data = array![[1.0, 2.0], [4.0, 8.0]];
        let scaler = MinMaxScaler::fit(&data).unwrap();

        let first = scaler.transform(&data);
        let second = scaler.transform(&data);
        assert_eq!(first, second);
    }

    #[test]
    fn test_degenerate_column_maps_to_zero() {
        let data = array![[7.0, 1.0], [7.0, 2.0], [7.0, 3.0]];
        let scaler = MinMaxScaler::fit(&data).unwrap();
        let scaled = scaler.transform(&data);

        for i in 0..3 {
            assert_eq!(scaled[[i, 0]], 0.0);
        }
        assert_eq!(scaled[[2, 1]], 1.0);
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        let data = Array2::<f64>::zeros((0, 4));
        assert!(MinMaxScaler::fit(&data).is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let data = array![[0.0, 5.0], [10.0, 15.0]];
        let scaler = MinMaxScaler::fit(&data).unwrap();

        let path = std::env::temp_dir().join(format!("scaler_rt_{}.bin", std::process::id()));
        scaler.save(&path).unwrap();
        let restored = MinMaxScaler::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(scaler.transform(&data), restored.transform(&data));
    }
}
