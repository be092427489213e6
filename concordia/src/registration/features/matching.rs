//! Brute-force Hamming matching with ratio test and cross check.

use rayon::prelude::*;

use super::Descriptor;
use crate::registration::config::MatchConfig;

/// A putative correspondence: `query[query_idx]` <-> `train[train_idx]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

/// Best and second-best distances from `d` into `candidates`.
fn two_nearest(d: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32, Option<u32>)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second: Option<u32> = None;
    for (idx, c) in candidates.iter().enumerate() {
        let dist = d.hamming(c);
        match best {
            Some((_, b)) if dist >= b => {
                if second.is_none_or(|s| dist < s) {
                    second = Some(dist);
                }
            }
            _ => {
                second = best.map(|(_, b)| b);
                best = Some((idx, dist));
            }
        }
    }
    best.map(|(idx, dist)| (idx, dist, second))
}

/// Match every query descriptor against `train`.
///
/// A match survives when its distance is at most `max_distance`, it beats
/// the runner-up by the Lowe ratio, and with `cross_check` the train
/// descriptor's own nearest query is the same one. Output is sorted by
/// query index.
pub fn match_descriptors(
    query: &[Descriptor],
    train: &[Descriptor],
    config: &MatchConfig,
) -> Vec<Match> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let reverse: Vec<Option<usize>> = if config.cross_check {
        train
            .par_iter()
            .map(|t| two_nearest(t, query).map(|(idx, _, _)| idx))
            .collect()
    } else {
        Vec::new()
    };

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            let (train_idx, distance, second) = two_nearest(q, train)?;
            if distance > config.max_distance {
                return None;
            }
            if let Some(second) = second {
                if distance as f32 >= config.ratio * second as f32 {
                    return None;
                }
            }
            if config.cross_check && reverse[train_idx] != Some(query_idx) {
                return None;
            }
            Some(Match {
                query_idx,
                train_idx,
                distance,
            })
        })
        .collect()
}
