//! Empirical mean/std of the regression channels.
//!
//! Persisted as a small JSON table `{"mean": {key: value}, "std": {key:
//! value}}`, computed once over the training split and read when an encoder
//! is built.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionStats {
    pub mean: BTreeMap<String, f32>,
    pub std: BTreeMap<String, f32>,
}

impl RegressionStats {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&contents).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, contents).map_err(|e| Error::io(path, e))
    }

    /// Mean and population standard deviation of every channel over raw,
    /// unnormalized regression samples.
    pub fn from_samples<const N: usize>(names: &[&str; N], samples: &[[f32; N]]) -> Self {
        let n = samples.len().max(1) as f64;
        let mut stats = Self::default();
        for (k, name) in names.iter().enumerate() {
            let mean = samples.iter().map(|s| s[k] as f64).sum::<f64>() / n;
            let var = samples.iter().map(|s| (s[k] as f64 - mean).powi(2)).sum::<f64>() / n;
            stats.mean.insert(name.to_string(), mean as f32);
            stats.std.insert(name.to_string(), var.sqrt() as f32);
        }
        stats
    }

    /// Pick the named channels in order. Missing keys, non-finite values and
    /// non-positive deviations are configuration errors.
    pub fn normalization<const N: usize>(&self, names: &[&str; N]) -> Result<Normalization<N>> {
        let mut mean = [0f32; N];
        let mut std = [1f32; N];
        for (k, name) in names.iter().enumerate() {
            let m = *self
                .mean
                .get(*name)
                .ok_or_else(|| Error::config(format!("statistics have no mean for {:?}", name)))?;
            let s = *self
                .std
                .get(*name)
                .ok_or_else(|| Error::config(format!("statistics have no std for {:?}", name)))?;
            if !m.is_finite() {
                return Err(Error::config(format!("mean of {:?} is not finite", name)));
            }
            if !(s.is_finite() && s > 0.0) {
                return Err(Error::config(format!("std of {:?} must be positive, got {}", name, s)));
            }
            mean[k] = m;
            std[k] = s;
        }
        Ok(Normalization { mean, std })
    }
}

/// Resolved per-channel constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalization<const N: usize> {
    pub mean: [f32; N],
    pub std: [f32; N],
}

impl<const N: usize> Normalization<N> {
    pub fn normalize(&self, mut values: [f32; N]) -> [f32; N] {
        for (k, v) in values.iter_mut().enumerate() {
            *v = (*v - self.mean[k]) / self.std[k];
        }
        values
    }

    pub fn denormalize(&self, mut values: [f32; N]) -> [f32; N] {
        for (k, v) in values.iter_mut().enumerate() {
            *v = *v * self.std[k] + self.mean[k];
        }
        values
    }
}

/// Where an encoder gets its statistics from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatsSource {
    File { path: PathBuf },
    Inline(RegressionStats),
}

impl StatsSource {
    pub fn load(&self) -> Result<RegressionStats> {
        match self {
            StatsSource::File { path } => RegressionStats::load(path),
            StatsSource::Inline(stats) => Ok(stats.clone()),
        }
    }

    pub(crate) fn rebase(&mut self, base: &Path) {
        if let StatsSource::File { path } = self {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
