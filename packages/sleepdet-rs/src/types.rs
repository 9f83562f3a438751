use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Original contiguous recording span that was concatenated into a subsegment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRun {
    pub start_time: f64,
    pub end_time: f64,
}

/// Contiguous run of samples for one channel, already cleaned of rejected epochs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subsegment {
    pub channel: String,
    /// Absolute time of the first sample in seconds
    pub start_time: f64,
    pub sample_rate: f64,
    /// Samples in microvolts
    pub samples: Vec<f64>,
    #[serde(default)]
    pub sources: Vec<SourceRun>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub cycle: Option<u32>,
}

impl Subsegment {
    pub fn new(
        channel: impl Into<String>,
        start_time: f64,
        sample_rate: f64,
        samples: Vec<f64>,
    ) -> Self {
        let end_time = start_time + samples.len() as f64 / sample_rate;
        Self {
            channel: channel.into(),
            start_time,
            sample_rate,
            samples,
            sources: vec![SourceRun {
                start_time,
                end_time,
            }],
            stage: None,
            cycle: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_cycle(mut self, cycle: u32) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceRun>) -> Self {
        self.sources = sources;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }

    /// Absolute time of sample `index`
    pub fn time_at(&self, index: usize) -> f64 {
        self.start_time + index as f64 / self.sample_rate
    }

    pub fn label(&self) -> String {
        format!("{}@{:.3}s", self.channel, self.start_time)
    }
}

/// Channels sharing a reference; scopes cross-channel merging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub name: String,
    pub channels: Vec<String>,
}

/// Interchange document consumed by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionInput {
    #[serde(default)]
    pub channel_groups: Vec<ChannelGroup>,
    pub subsegments: Vec<Subsegment>,
}

impl DetectionInput {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .subsegments
            .iter()
            .map(|s| s.channel.clone())
            .collect();
        channels.sort();
        channels.dedup();
        channels
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Spindle,
    SlowWave,
}

/// Positive is the default orientation; Negative marks inverted slow-wave detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

/// Pointer back to a pre-merge event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRef {
    pub channel: String,
    pub onset: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowWaveMorphology {
    pub trough_time: f64,
    pub trough_value: f64,
    /// Zero crossing between the negative and positive half-waves
    pub zero_time: f64,
    pub peak_time: f64,
    pub peak_value: f64,
    pub ptp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub channel: String,
    pub onset: f64,
    pub offset: f64,
    pub peak_time: Option<f64>,
    pub peak_value: Option<f64>,
    pub peak_freq: Option<f64>,
    pub area_under_curve: Option<f64>,
    pub polarity: Polarity,
    pub method: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<EventRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morphology: Option<SlowWaveMorphology>,
}

impl Event {
    pub fn new(
        channel: impl Into<String>,
        onset: f64,
        offset: f64,
        method: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            channel: channel.into(),
            onset,
            offset,
            peak_time: None,
            peak_value: None,
            peak_freq: None,
            area_under_curve: None,
            polarity: Polarity::Positive,
            method: method.into(),
            kind,
            merged_from: Vec::new(),
            morphology: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }

    pub fn is_merged(&self) -> bool {
        !self.merged_from.is_empty()
    }

    pub fn to_ref(&self) -> EventRef {
        EventRef {
            channel: self.channel.clone(),
            onset: self.onset,
            offset: self.offset,
        }
    }
}

/// A (channel, subsegment) unit that produced no events because it could not be processed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub channel: String,
    pub start_time: f64,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
}

/// Per-unit thresholds and counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitStats {
    pub channel: String,
    pub start_time: f64,
    pub duration: f64,
    pub det_value: Option<f64>,
    pub sel_value: Option<f64>,
    pub n_events: usize,
    /// Events per 30-s epoch
    pub density: f64,
    pub elapsed_ms: f64,
    /// Time spent in each processing stage
    #[serde(default)]
    pub stages: Vec<StageTiming>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: f64,
}

/// Named intermediate trace of one subsegment, for external plotting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticTrace {
    pub channel: String,
    pub start_time: f64,
    pub sample_rate: f64,
    pub name: String,
    pub values: Vec<f64>,
}

/// Result of a detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOutput {
    pub run_id: String,
    pub method: String,
    pub created_at: String,
    pub events: Vec<Event>,
    pub skipped: Vec<SkippedUnit>,
    pub diagnostics: Vec<Diagnostic>,
    pub unit_stats: Vec<UnitStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<DiagnosticTrace>,
    pub cancelled: bool,
}
