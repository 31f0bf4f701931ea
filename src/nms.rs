//! # Non-maximum suppression
//!
//! Greedy suppression over scored candidates. Candidates are ranked with a
//! stable sort, so equal scores keep their input order; then the best
//! remaining candidate is emitted and everything overlapping it by more
//! than the threshold is discarded.

use std::cmp::Reverse;

use log::debug;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::data::ObjectType;
use crate::error::{Error, Result};
use crate::iou::{Overlap, OverlapMode};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsConfig {
    /// Discard candidates whose IoU with an emitted box exceeds this, in `[0, 1]`.
    pub iou_threshold: f32,
    pub max_output: usize,
    /// Only candidates of this class take part.
    pub class_filter: Option<ObjectType>,
    /// Emit the lowest scores first; for debugging.
    pub sort_ascending: bool,
    /// Overlap measure for 3D boxes.
    pub overlap: OverlapMode,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.1,
            max_output: 10000,
            class_filter: None,
            sort_ascending: false,
            overlap: OverlapMode::default(),
        }
    }
}

impl NmsConfig {
    pub fn new(iou_threshold: f32, max_output: usize) -> Result<Self> {
        let config = Self {
            iou_threshold,
            max_output,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(Error::InvalidThreshold(self.iou_threshold));
        }
        Ok(())
    }
}

/// Suppress overlapping candidates. Fails only on an invalid threshold.
pub fn nms<B>(boxes: &[B], config: &NmsConfig) -> Result<Vec<B>>
where
    B: Overlap + Clone,
{
    config.validate()?;

    let mut candidates: Vec<&B> = boxes
        .iter()
        .filter(|b| config.class_filter.map_or(true, |cls| b.class() == cls))
        .collect();
    if config.sort_ascending {
        candidates.sort_by_key(|b| OrderedFloat(b.confidence()));
    } else {
        candidates.sort_by_key(|b| Reverse(OrderedFloat(b.confidence())));
    }

    let mut kept: Vec<B> = Vec::new();
    let mut suppressed = vec![false; candidates.len()];
    for i in 0..candidates.len() {
        if kept.len() >= config.max_output {
            break;
        }
        if suppressed[i] {
            continue;
        }
        let best = candidates[i];
        for j in i + 1..candidates.len() {
            if !suppressed[j] && best.iou(candidates[j], config.overlap) > config.iou_threshold {
                suppressed[j] = true;
            }
        }
        kept.push(best.clone());
    }
    debug!("nms kept {} of {} candidates", kept.len(), boxes.len());
    Ok(kept)
}
