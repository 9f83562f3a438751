//! Merging of close or overlapping events.
//!
//! Two neighbouring events merge when the gap between the end of the first
//! and the start of the second is at most `min_interval` seconds. Merging is
//! transitive, so a chain of close events collapses into one span. Merged
//! spans are not checked against the method's duration bounds again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::DetectionError;
use crate::types::{ChannelGroup, Diagnostic, Event};

/// Tolerance for treating onsets or durations as equal.
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Cross-channel merges go to the channel whose event starts first;
    /// peak information comes from the event with the larger peak.
    #[default]
    EarliestOnset,
    /// Merges keep the channel and peak information of the longest event.
    LongestDuration,
}

impl FromStr for MergeRule {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "earliest-onset" | "earliest" => Ok(Self::EarliestOnset),
            "longest-duration" | "longest" => Ok(Self::LongestDuration),
            _ => Err(DetectionError::Configuration(format!(
                "Unknown merge rule '{}'. Valid rules: earliest-onset, longest-duration",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub events: Vec<Event>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merger {
    pub min_interval: f64,
    pub rule: MergeRule,
    pub cross_channel: bool,
}

impl Merger {
    pub fn new(min_interval: f64) -> Self {
        Self {
            min_interval,
            rule: MergeRule::default(),
            cross_channel: false,
        }
    }

    pub fn with_rule(mut self, rule: MergeRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn across_channels(mut self, enabled: bool) -> Self {
        self.cross_channel = enabled;
        self
    }

    /// Merge within each channel, then across channels when enabled.
    pub fn merge(&self, events: Vec<Event>, groups: &[ChannelGroup]) -> MergeOutcome {
        let mut by_channel: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in events {
            by_channel.entry(event.channel.clone()).or_default().push(event);
        }
        let mut merged: Vec<Event> = Vec::new();
        for (_, channel_events) in by_channel {
            for cluster in cluster(channel_events, self.min_interval) {
                merged.push(self.combine_within(cluster));
            }
        }

        let mut diagnostics = Vec::new();
        if self.cross_channel {
            let mut pooled: BTreeMap<usize, Vec<Event>> = BTreeMap::new();
            let mut ungrouped = Vec::new();
            for event in merged {
                match group_of(&event.channel, groups) {
                    Some(g) => pooled.entry(g).or_default().push(event),
                    None => ungrouped.push(event),
                }
            }
            merged = ungrouped;
            for (_, group_events) in pooled {
                for cluster in cluster(group_events, self.min_interval) {
                    let (event, diagnostic) = self.combine_across(cluster);
                    merged.push(event);
                    diagnostics.extend(diagnostic);
                }
            }
        }

        sort_events(&mut merged);
        MergeOutcome {
            events: merged,
            diagnostics,
        }
    }

    fn combine_within(&self, cluster: Vec<Event>) -> Event {
        let cluster = match <[Event; 1]>::try_from(cluster) {
            Ok([single]) => return single,
            Err(cluster) => cluster,
        };
        let winner = match self.rule {
            MergeRule::EarliestOnset => pick(&cluster, |a, b| {
                a.peak_value.unwrap_or(f64::NEG_INFINITY) > b.peak_value.unwrap_or(f64::NEG_INFINITY)
            }),
            MergeRule::LongestDuration => pick(&cluster, |a, b| a.duration() > b.duration()),
        };
        absorb(&cluster, winner)
    }

    fn combine_across(&self, cluster: Vec<Event>) -> (Event, Option<Diagnostic>) {
        let cluster = match <[Event; 1]>::try_from(cluster) {
            Ok([single]) => return (single, None),
            Err(cluster) => cluster,
        };
        let key = |e: &Event| match self.rule {
            MergeRule::EarliestOnset => -e.onset,
            MergeRule::LongestDuration => e.duration(),
        };
        let best = cluster.iter().map(key).fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<usize> = (0..cluster.len())
            .filter(|&i| (key(&cluster[i]) - best).abs() <= TIE_EPSILON)
            .collect();

        let mut channels: Vec<&str> = tied.iter().map(|&i| cluster[i].channel.as_str()).collect();
        channels.sort_unstable();
        channels.dedup();

        let winner = tied
            .iter()
            .copied()
            .min_by(|&a, &b| {
                cluster[a]
                    .onset
                    .total_cmp(&cluster[b].onset)
                    .then_with(|| cluster[a].channel.cmp(&cluster[b].channel))
            })
            .unwrap_or(0);

        let diagnostic = (channels.len() > 1).then(|| {
            let err = DetectionError::MergeAmbiguity(format!(
                "channels {} tie under {:?} at {:.3}s; kept {}",
                channels.join(", "),
                self.rule,
                cluster[winner].onset,
                cluster[winner].channel
            ));
            log::warn!("{}", err);
            Diagnostic {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }
        });
        (absorb(&cluster, winner), diagnostic)
    }
}

/// Index of the first group listing `channel`; with no groups every channel
/// belongs to one implicit group.
fn group_of(channel: &str, groups: &[ChannelGroup]) -> Option<usize> {
    if groups.is_empty() {
        return Some(0);
    }
    groups
        .iter()
        .position(|g| g.channels.iter().any(|c| c == channel))
}

fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.onset
            .total_cmp(&b.onset)
            .then_with(|| a.channel.cmp(&b.channel))
            .then_with(|| a.offset.total_cmp(&b.offset))
    });
}

/// Group onset-sorted events into chains separated by more than `min_interval`.
fn cluster(mut events: Vec<Event>, min_interval: f64) -> Vec<Vec<Event>> {
    sort_events(&mut events);
    let mut clusters: Vec<(f64, Vec<Event>)> = Vec::new();
    for event in events {
        match clusters.last_mut() {
            Some((end, members)) if event.onset - *end <= min_interval => {
                *end = end.max(event.offset);
                members.push(event);
            }
            _ => clusters.push((event.offset, vec![event])),
        }
    }
    clusters.into_iter().map(|(_, members)| members).collect()
}

/// Index of the member preferred by `better`; the earlier member wins ties.
fn pick<F>(members: &[Event], better: F) -> usize
where
    F: Fn(&Event, &Event) -> bool,
{
    let mut best = 0;
    for (i, e) in members.iter().enumerate().skip(1) {
        if better(e, &members[best]) {
            best = i;
        }
    }
    best
}

/// The winner's event stretched over the whole cluster, with provenance.
fn absorb(members: &[Event], winner: usize) -> Event {
    let mut merged = members[winner].clone();
    merged.onset = members.iter().map(|e| e.onset).fold(f64::INFINITY, f64::min);
    merged.offset = members
        .iter()
        .map(|e| e.offset)
        .fold(f64::NEG_INFINITY, f64::max);
    merged.area_under_curve = members
        .iter()
        .map(|e| e.area_under_curve)
        .sum::<Option<f64>>();
    merged.merged_from = members
        .iter()
        .flat_map(|e| {
            if e.is_merged() {
                e.merged_from.clone()
            } else {
                vec![e.to_ref()]
            }
        })
        .collect();
    merged
}
