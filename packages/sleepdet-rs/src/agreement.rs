//! Agreement between event lists.
//!
//! Events are compared by their intersection-over-union score. Two events on
//! different channels never overlap. A detected event and a reference event
//! are matched when each is the other's best remaining candidate and their
//! score is strictly above the threshold; matching repeats until no new pair
//! forms.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DetectionError, Result};
use crate::types::Event;

/// Method name carried by consensus events
pub const CONSENSUS_METHOD: &str = "consensus";

/// Intersection over union of two events, 0 when they share no time or channel.
pub fn overlap_score(a: &Event, b: &Event) -> f64 {
    if a.channel != b.channel {
        return 0.0;
    }
    let intersection = a.offset.min(b.offset) - a.onset.max(b.onset);
    if intersection <= 0.0 {
        return 0.0;
    }
    let union = a.offset.max(b.offset) - a.onset.min(b.onset);
    intersection / union
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub detection: usize,
    pub standard: usize,
    pub score: f64,
}

/// Outcome of matching a detection against a reference list.
///
/// Indices refer to positions in the lists given to [`match_events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub threshold: f64,
    pub matches: Vec<MatchedPair>,
    pub false_positives: Vec<usize>,
    pub false_negatives: Vec<usize>,
}

impl Agreement {
    pub fn true_positives(&self) -> usize {
        self.matches.len()
    }

    /// Matched share of the reference events; 0 for an empty reference.
    pub fn recall(&self) -> f64 {
        ratio(self.matches.len(), self.false_negatives.len())
    }

    /// Matched share of the detected events; 0 for an empty detection.
    pub fn precision(&self) -> f64 {
        ratio(self.matches.len(), self.false_positives.len())
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn summary(&self) -> AgreementSummary {
        AgreementSummary {
            threshold: self.threshold,
            true_positives: self.true_positives(),
            false_positives: self.false_positives.len(),
            false_negatives: self.false_negatives.len(),
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
        }
    }
}

/// Counts and scores of an [`Agreement`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgreementSummary {
    pub threshold: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn ratio(hits: usize, misses: usize) -> f64 {
    if hits + misses == 0 {
        0.0
    } else {
        hits as f64 / (hits + misses) as f64
    }
}

/// Best remaining candidate of each row; ties go to the lower index.
fn best_per_row(scores: &[Vec<f64>]) -> Vec<Option<usize>> {
    scores
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|&(_, &s)| s > 0.0)
                .fold(None, |best: Option<(usize, f64)>, (j, &s)| match best {
                    Some((_, b)) if b >= s => best,
                    _ => Some((j, s)),
                })
                .map(|(j, _)| j)
        })
        .collect()
}

fn unmatched(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter(|&(_, &hit)| !hit)
        .map(|(i, _)| i)
        .collect()
}

/// Match `detection` against `standard`.
///
/// `threshold` is the intersection-over-union score a pair has to exceed and
/// must lie in `[0, 1)`.
pub fn match_events(detection: &[Event], standard: &[Event], threshold: f64) -> Result<Agreement> {
    if !(0.0..1.0).contains(&threshold) {
        return Err(DetectionError::Configuration(format!(
            "agreement threshold must be in [0, 1), got {}",
            threshold
        )));
    }

    let mut scores: Vec<Vec<f64>> = detection
        .iter()
        .map(|d| {
            standard
                .iter()
                .map(|s| {
                    let score = overlap_score(d, s);
                    if score > threshold {
                        score
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect();

    let mut matches = Vec::new();
    loop {
        let det_best = best_per_row(&scores);
        let transposed: Vec<Vec<f64>> = (0..standard.len())
            .map(|j| scores.iter().map(|row| row[j]).collect())
            .collect();
        let std_best = best_per_row(&transposed);

        let round: Vec<(usize, usize)> = det_best
            .iter()
            .enumerate()
            .filter_map(|(i, best)| best.map(|j| (i, j)))
            .filter(|&(i, j)| std_best[j] == Some(i))
            .collect();
        if round.is_empty() {
            break;
        }
        for (i, j) in round {
            matches.push(MatchedPair {
                detection: i,
                standard: j,
                score: scores[i][j],
            });
            scores[i].iter_mut().for_each(|s| *s = 0.0);
            scores.iter_mut().for_each(|row| row[j] = 0.0);
        }
    }
    matches.sort_by_key(|m| m.detection);

    let mut det_matched = vec![false; detection.len()];
    let mut std_matched = vec![false; standard.len()];
    for m in &matches {
        det_matched[m.detection] = true;
        std_matched[m.standard] = true;
    }
    Ok(Agreement {
        threshold,
        false_positives: unmatched(&det_matched),
        false_negatives: unmatched(&std_matched),
        matches,
    })
}

/// Merge several raters' events by per-sample vote.
///
/// A sample belongs to a consensus event when the share of raters marking it
/// is at least `threshold`, which must lie in `(0, 1]`. Votes are counted per
/// channel on a grid of `sample_rate` Hz. Consensus events shorter than
/// `min_duration` are dropped. Each event records the rater events it
/// overlaps in `merged_from` and takes its kind from the first of them.
pub fn consensus(
    raters: &[Vec<Event>],
    threshold: f64,
    sample_rate: f64,
    min_duration: Option<f64>,
) -> Result<Vec<Event>> {
    if raters.len() < 2 {
        return Err(DetectionError::Configuration(format!(
            "consensus needs at least two raters, got {}",
            raters.len()
        )));
    }
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(DetectionError::Configuration(format!(
            "consensus threshold must be in (0, 1], got {}",
            threshold
        )));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(DetectionError::Configuration(format!(
            "consensus sample rate must be positive, got {}",
            sample_rate
        )));
    }

    // channel -> per-rater events
    let mut by_channel: BTreeMap<&str, Vec<Vec<&Event>>> = BTreeMap::new();
    for (r, events) in raters.iter().enumerate() {
        for event in events {
            by_channel
                .entry(event.channel.as_str())
                .or_insert_with(|| vec![Vec::new(); raters.len()])[r]
                .push(event);
        }
    }

    let needed = threshold * raters.len() as f64;
    let mut merged = Vec::new();
    for (channel, per_rater) in by_channel {
        let all = per_rater.iter().flatten();
        let begin = all.clone().map(|e| e.onset).fold(f64::INFINITY, f64::min);
        let end = all.map(|e| e.offset).fold(f64::NEG_INFINITY, f64::max);
        let n = ((end - begin) * sample_rate).round().max(0.0) as usize;
        let to_index = |t: f64| (((t - begin) * sample_rate).round().max(0.0) as usize).min(n);

        let mut votes = vec![0usize; n];
        for events in &per_rater {
            let mut marked = vec![false; n];
            for e in events {
                let (a, b) = (to_index(e.onset), to_index(e.offset));
                if a < b {
                    marked[a..b].fill(true);
                }
            }
            for (v, m) in votes.iter_mut().zip(marked) {
                *v += usize::from(m);
            }
        }

        let mut i = 0;
        while i < n {
            if (votes[i] as f64) < needed - 1e-9 {
                i += 1;
                continue;
            }
            let start = i;
            while i < n && votes[i] as f64 >= needed - 1e-9 {
                i += 1;
            }
            let onset = begin + start as f64 / sample_rate;
            let offset = begin + i as f64 / sample_rate;
            if min_duration.is_some_and(|min| offset - onset < min) {
                continue;
            }
            let members: Vec<&Event> = per_rater
                .iter()
                .flatten()
                .copied()
                .filter(|e| e.onset < offset && e.offset > onset)
                .collect();
            let Some(first) = members.first() else {
                continue;
            };
            let mut event = Event::new(channel, onset, offset, CONSENSUS_METHOD, first.kind);
            event.merged_from = members.iter().map(|e| e.to_ref()).collect();
            merged.push(event);
        }
    }

    merged.sort_by(|a, b| a.onset.total_cmp(&b.onset).then_with(|| a.channel.cmp(&b.channel)));
    log::debug!(
        "consensus of {} raters at {}: {} events",
        raters.len(),
        threshold,
        merged.len()
    );
    Ok(merged)
}
