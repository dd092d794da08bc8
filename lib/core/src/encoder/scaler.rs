// Per-dimension standardisation statistics
use crate::Vector;
use serde::{Deserialize, Serialize};

/// Mean and scale of every embedding dimension over a reference population
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleStats {
    mean: Vec<f64>,
    scale: Vec<f64>,
    samples: usize,
}

impl ScaleStats {
    /// Fit population mean and standard deviation per dimension.
    ///
    /// Dimensions with zero variance get a scale of `1.0`. Returns `None`
    /// for an empty batch or mixed dimensions.
    pub fn fit(batch: &[Vector]) -> Option<Self> {
        let first = batch.first()?;
        let dim = first.dim();
        if batch.iter().any(|v| v.dim() != dim) {
            return None;
        }

        let n = batch.len() as f64;
        let mut mean = vec![0.0f64; dim];
        for v in batch {
            for (m, x) in mean.iter_mut().zip(v.as_slice()) {
                *m += f64::from(*x);
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut variance = vec![0.0f64; dim];
        for v in batch {
            for ((var, m), x) in variance.iter_mut().zip(&mean).zip(v.as_slice()) {
                let d = f64::from(*x) - m;
                *var += d * d;
            }
        }

        let scale = variance
            .into_iter()
            .map(|var| {
                let std = (var / n).sqrt();
                if std < 10.0 * f64::EPSILON {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Some(Self {
            mean,
            scale,
            samples: batch.len(),
        })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    #[inline]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    #[inline]
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Standardise `vector` in place: divide by scale, and subtract the mean
    /// first when `center` is set. A dimension mismatch leaves it untouched.
    pub fn transform(&self, vector: &mut Vector, center: bool) {
        if vector.dim() != self.dim() {
            return;
        }

        for ((x, m), s) in vector
            .as_mut_slice()
            .iter_mut()
            .zip(&self.mean)
            .zip(&self.scale)
        {
            let shifted = if center { f64::from(*x) - m } else { f64::from(*x) };
            *x = (shifted / s) as f32;
        }
    }
}
