//! Built-in detection methods.

use super::params::{ParamKind, ParamSpec, HIGHCUT, LOWCUT, MAX_DURATION, MIN_DURATION, MIN_INTERVAL};
use super::{
    Candidates, ConjunctSignal, DetectionRule, FilterKind, MethodSpec, Op, Refinement, Step,
    Threshold, ThresholdKind, Transition, Value, RAW,
};
use crate::error::{DetectionError, Result};
use crate::types::EventKind;

const fn freq(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Frequency, Some(default), description)
}

const fn secs(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Duration, Some(default), description)
}

const fn float(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Float, Some(default), description)
}

const fn int(name: &'static str, default: f64, description: &'static str) -> ParamSpec {
    ParamSpec::new(name, ParamKind::Int, Some(default), description).bounded(1.0, 20.0)
}

const fn lowcut(default: f64) -> ParamSpec {
    freq(LOWCUT, default, "Lower edge of the detection band")
}

const fn highcut(default: f64) -> ParamSpec {
    freq(HIGHCUT, default, "Upper edge of the detection band")
}

const fn min_duration(default: f64) -> ParamSpec {
    secs(MIN_DURATION, default, "Shortest accepted event")
}

const fn max_duration(default: f64) -> ParamSpec {
    secs(MAX_DURATION, default, "Longest accepted event")
}

const fn min_interval(default: f64) -> ParamSpec {
    secs(MIN_INTERVAL, default, "Events closer than this are merged")
}

const fn p(name: &'static str) -> Value {
    Value::Param(name)
}

const fn butterworth_bandpass() -> Op {
    Op::Bandpass {
        low: p(LOWCUT),
        high: p(HIGHCUT),
        filter: FilterKind::Butterworth { order: p("order") },
    }
}

const fn kaiser_bandpass(transition: Transition) -> Op {
    Op::Bandpass {
        low: p(LOWCUT),
        high: p(HIGHCUT),
        filter: FilterKind::Kaiser {
            rolloff: p("rolloff"),
            transition,
        },
    }
}

const fn single(
    trace: &'static str,
    detection: Threshold,
    selection: Option<Threshold>,
) -> DetectionRule {
    DetectionRule::Threshold {
        trace,
        selection_trace: None,
        detection,
        selection,
        ceiling: None,
        candidates: Candidates::Runs,
    }
}

const fn threshold(kind: ThresholdKind, name: &'static str) -> Threshold {
    Threshold::new(kind, Value::Param(name))
}

const SPINDLE_REFINEMENTS: &[Refinement] = &[Refinement::PeakFrequency];

// ============================================================================
// Spindle methods
// ============================================================================

pub const FERRARELLI2007: MethodSpec = MethodSpec {
    name: "Ferrarelli2007",
    kind: EventKind::Spindle,
    description: "FIR bandpass, rectified envelope, thresholds at multiples of the mean rectified amplitude",
    reference: "Ferrarelli F. et al. (2007) Am J Psychiatry 164:483-492",
    params: &[
        lowcut(11.0),
        highcut(15.0),
        freq("rolloff", 0.9, "FIR transition width, inside the band"),
        float("det_thresh", 8.0, "Detection threshold, multiple of the mean rectified signal"),
        float("sel_thresh", 2.0, "Selection threshold, multiple of the mean rectified signal"),
        float("ratio_thresh", 1.5, "Minimum in-band amplitude ratio").bounded(0.0, 1.0e6),
        min_duration(0.3),
        max_duration(3.0),
        min_interval(0.0),
    ],
    steps: &[
        Step::new(RAW, "filtered", kaiser_bandpass(Transition::Inside)),
        Step::new("filtered", "rectified", Op::Rectify),
        Step::new("filtered", "envelope", Op::Envelope),
    ],
    rule: single(
        "envelope",
        threshold(ThresholdKind::MeanTimes, "det_thresh").on("rectified"),
        Some(threshold(ThresholdKind::MeanTimes, "sel_thresh").on("rectified")),
    ),
    // onset and offset transients of strong out-of-band rhythms ring inside the band
    refinements: &[
        Refinement::PowerRatio {
            threshold: Value::Param("ratio_thresh"),
        },
        Refinement::PeakInBand,
    ],
};

pub const NIR2011: MethodSpec = MethodSpec {
    name: "Nir2011",
    kind: EventKind::Spindle,
    description: "Butterworth bandpass, Hilbert amplitude, Gaussian smoothing, mean + SD thresholds",
    reference: "Nir Y. et al. (2011) Neuron 70:153-169",
    params: &[
        lowcut(9.2),
        highcut(16.8),
        int("order", 2.0, "Butterworth order"),
        secs("smoothing", 0.04, "Gaussian kernel SD"),
        float("det_thresh", 3.0, "Detection threshold in SDs above the mean").unbounded_below(),
        float("sel_thresh", 1.0, "Selection threshold in SDs above the mean").unbounded_below(),
        min_duration(0.5),
        max_duration(2.0),
        min_interval(1.0),
    ],
    steps: &[
        Step::new(RAW, "filtered", butterworth_bandpass()),
        Step::new("filtered", "amplitude", Op::Hilbert),
        Step::new("amplitude", "det", Op::Gaussian { sigma: p("smoothing") }),
    ],
    rule: single(
        "det",
        threshold(ThresholdKind::MeanPlusSd, "det_thresh"),
        Some(threshold(ThresholdKind::MeanPlusSd, "sel_thresh")),
    ),
    refinements: SPINDLE_REFINEMENTS,
};

pub const MOELLE2011: MethodSpec = MethodSpec {
    name: "Moelle2011",
    kind: EventKind::Spindle,
    description: "FIR bandpass, moving RMS, moving average, mean + SD threshold",
    reference: "Moelle M. et al. (2011) Sleep 34:1411-1421",
    params: &[
        lowcut(12.0),
        highcut(15.0),
        freq("rolloff", 1.7, "FIR transition width"),
        secs("rms_window", 0.2, "Moving RMS window"),
        secs("smoothing", 0.2, "Moving average window"),
        float("det_thresh", 1.5, "Detection threshold in SDs above the mean").unbounded_below(),
        min_duration(0.5),
        max_duration(3.0),
        min_interval(0.0),
    ],
    steps: &[
        Step::new(RAW, "filtered", kaiser_bandpass(Transition::Outside)),
        Step::new(
            "filtered",
            "rms",
            Op::MovingRms {
                window: p("rms_window"),
                step: None,
            },
        ),
        Step::new("rms", "det", Op::MovingAverage { window: p("smoothing") }),
    ],
    rule: single("det", threshold(ThresholdKind::MeanPlusSd, "det_thresh"), None),
    refinements: SPINDLE_REFINEMENTS,
};

pub const WAMSLEY2012: MethodSpec = MethodSpec {
    name: "Wamsley2012",
    kind: EventKind::Spindle,
    description: "Complex Morlet power at the band centre, smoothed, thresholded against the mean unsmoothed power",
    reference: "Wamsley E.J. et al. (2012) Biol Psychiatry 71:154-161",
    params: &[
        lowcut(12.0),
        highcut(15.0),
        freq("wavelet_sd", 0.8, "Spectral SD of the Morlet wavelet"),
        float("wavelet_n_sd", 1.0, "Wavelet half-length in temporal SDs").bounded(0.5, 10.0),
        secs("smoothing", 0.1, "Moving average window"),
        float("det_thresh", 4.5, "Detection threshold, multiple of the mean power"),
        min_duration(0.3),
        max_duration(3.0),
        min_interval(0.0),
    ],
    steps: &[
        Step::new(
            RAW,
            "amplitude",
            Op::Morlet {
                freq: Value::BandCenter,
                sd: p("wavelet_sd"),
                n_sd: p("wavelet_n_sd"),
            },
        ),
        Step::new("amplitude", "power", Op::Square),
        Step::new("power", "det", Op::MovingAverage { window: p("smoothing") }),
    ],
    rule: single(
        "det",
        threshold(ThresholdKind::MeanTimes, "det_thresh").on("power"),
        None,
    ),
    refinements: SPINDLE_REFINEMENTS,
};

pub const MARTIN2013: MethodSpec = MethodSpec {
    name: "Martin2013",
    kind: EventKind::Spindle,
    description: "FIR bandpass, block RMS, percentile threshold",
    reference: "Martin N. et al. (2013) Neurobiol Aging 34:468-476",
    params: &[
        lowcut(11.5),
        highcut(14.5),
        freq("rolloff", 1.1, "FIR transition width"),
        secs("rms_window", 0.25, "RMS window"),
        secs("rms_step", 0.25, "RMS block step"),
        float("det_thresh", 95.0, "Detection percentile").bounded(0.0, 100.0),
        min_duration(0.5),
        max_duration(3.0),
        min_interval(0.0),
    ],
    steps: &[
        Step::new(RAW, "filtered", kaiser_bandpass(Transition::Outside)),
        Step::new(
            "filtered",
            "det",
            Op::MovingRms {
                window: p("rms_window"),
                step: Some(p("rms_step")),
            },
        ),
    ],
    rule: single("det", threshold(ThresholdKind::Percentile, "det_thresh"), None),
    refinements: SPINDLE_REFINEMENTS,
};

pub const RAY2015: MethodSpec = MethodSpec {
    name: "Ray2015",
    kind: EventKind::Spindle,
    description: "Complex demodulation at the band centre, triangular smoothing, 60-s sliding z-score",
    reference: "Ray L.B. et al. (2015) Front Hum Neurosci 9:16",
    params: &[
        lowcut(11.0),
        highcut(16.0),
        freq("demod_cutoff", 5.0, "Lowpass cutoff applied after demodulation"),
        secs("smoothing", 1.0 / 3.0, "Triangular window"),
        secs("zscore_window", 60.0, "Sliding z-score window"),
        float("det_thresh", 2.33, "Detection z-score").unbounded_below(),
        float("sel_thresh", 0.1, "Selection z-score").unbounded_below(),
        min_duration(0.49),
        ParamSpec::new(MAX_DURATION, ParamKind::Duration, None, "Longest accepted event"),
        min_interval(0.25),
    ],
    steps: &[
        Step::new(
            RAW,
            "prefiltered",
            Op::Bandpass {
                low: Value::Const(0.3),
                high: Value::Const(35.0),
                filter: FilterKind::Butterworth {
                    order: Value::Const(4.0),
                },
            },
        ),
        Step::new(
            "prefiltered",
            "amplitude",
            Op::Demodulate {
                freq: Value::BandCenter,
                cutoff: p("demod_cutoff"),
                order: Value::Const(4.0),
            },
        ),
        Step::new("amplitude", "smoothed", Op::Triangular { window: p("smoothing") }),
        Step::new(
            "smoothed",
            "det",
            Op::WindowedZScore {
                window: p("zscore_window"),
                trimmed: false,
            },
        ),
    ],
    rule: single(
        "det",
        threshold(ThresholdKind::Absolute, "det_thresh"),
        Some(threshold(ThresholdKind::Absolute, "sel_thresh")),
    ),
    refinements: SPINDLE_REFINEMENTS,
};

const LACOURSE_FLOOR: f64 = 1e-12;

pub const LACOURSE2018: MethodSpec = MethodSpec {
    name: "Lacourse2018",
    kind: EventKind::Spindle,
    description: "Four sliding-window features (absolute power, relative power, covariance, correlation) that must all exceed their thresholds",
    reference: "Lacourse K. et al. (2019) J Neurosci Methods 316:3-11",
    params: &[
        lowcut(11.0),
        highcut(16.0),
        freq("broad_lowcut", 0.3, "Lower edge of the broad band"),
        freq("broad_highcut", 30.0, "Upper edge of the broad band"),
        freq("rel_pow_lowcut", 4.5, "Lower edge of the relative power denominator").fixed(),
        freq("rel_pow_highcut", 30.0, "Upper edge of the relative power denominator").fixed(),
        int("sigma_order", 10.0, "Butterworth order of the sigma filter"),
        int("broad_order", 5.0, "Butterworth order of the broad filter"),
        secs("window", 0.3, "Feature window"),
        secs("step", 0.1, "Feature step"),
        secs("rel_window", 2.0, "Relative power window"),
        secs("zscore_window", 30.0, "Trimmed z-score window"),
        float("abs_pow_thresh", 1.25, "log10 absolute sigma power").unbounded_below(),
        float("rel_pow_thresh", 1.6, "Relative power z-score").unbounded_below(),
        float("covar_thresh", 1.3, "Covariance z-score").unbounded_below(),
        float("corr_thresh", 0.69, "Sigma/broad correlation").bounded(-1.0, 1.0),
        min_duration(0.3),
        max_duration(2.5),
        min_interval(0.0),
    ],
    steps: &[
        Step::new(
            RAW,
            "sigma",
            Op::Bandpass {
                low: p(LOWCUT),
                high: p(HIGHCUT),
                filter: FilterKind::Butterworth {
                    order: p("sigma_order"),
                },
            },
        ),
        Step::new(
            RAW,
            "broad",
            Op::Bandpass {
                low: p("broad_lowcut"),
                high: p("broad_highcut"),
                filter: FilterKind::Butterworth {
                    order: p("broad_order"),
                },
            },
        ),
        Step::new(
            "sigma",
            "abs_power",
            Op::MeanSquare {
                window: p("window"),
                step: p("step"),
            },
        ),
        Step::new("abs_power", "abs_pow", Op::Log10 { floor: LACOURSE_FLOOR }),
        Step::new(
            "broad",
            "rel_power",
            Op::RelativePower {
                low: p(LOWCUT),
                high: p(HIGHCUT),
                broad_low: p("rel_pow_lowcut"),
                broad_high: p("rel_pow_highcut"),
                window: p("rel_window"),
                step: p("step"),
            },
        ),
        Step::new("rel_power", "rel_log", Op::Log10 { floor: LACOURSE_FLOOR }),
        Step::new(
            "rel_log",
            "rel_pow",
            Op::WindowedZScore {
                window: p("zscore_window"),
                trimmed: true,
            },
        ),
        Step::pair(
            "sigma",
            "broad",
            "covariance",
            Op::Covariance {
                window: p("window"),
                step: p("step"),
            },
        ),
        Step::new("covariance", "covar_log", Op::Log10 { floor: LACOURSE_FLOOR }),
        Step::new(
            "covar_log",
            "covar",
            Op::WindowedZScore {
                window: p("zscore_window"),
                trimmed: true,
            },
        ),
        Step::pair(
            "sigma",
            "broad",
            "corr",
            Op::Correlation {
                window: p("window"),
                step: p("step"),
            },
        ),
    ],
    rule: DetectionRule::Conjunctive {
        signals: &[
            ConjunctSignal {
                trace: "abs_pow",
                detection: threshold(ThresholdKind::Absolute, "abs_pow_thresh"),
                selection: None,
            },
            ConjunctSignal {
                trace: "rel_pow",
                detection: threshold(ThresholdKind::Absolute, "rel_pow_thresh"),
                selection: None,
            },
            ConjunctSignal {
                trace: "covar",
                detection: threshold(ThresholdKind::Absolute, "covar_thresh"),
                selection: None,
            },
            ConjunctSignal {
                trace: "corr",
                detection: threshold(ThresholdKind::Absolute, "corr_thresh"),
                selection: None,
            },
        ],
        boundary: &["covar", "corr"],
    },
    refinements: SPINDLE_REFINEMENTS,
};

pub const FASST: MethodSpec = MethodSpec {
    name: "FASST",
    kind: EventKind::Spindle,
    description: "Butterworth bandpass, rectified and averaged, percentile threshold",
    reference: "Leclercq Y. et al. (2011) Comput Intell Neurosci 2011:563648",
    params: &[
        lowcut(11.0),
        highcut(18.0),
        int("order", 4.0, "Butterworth order"),
        secs("smoothing", 0.1, "Moving average window"),
        float("det_thresh", 90.0, "Detection percentile").bounded(0.0, 100.0),
        min_duration(0.4),
        max_duration(1.3),
        min_interval(1.0),
    ],
    steps: &[
        Step::new(RAW, "filtered", butterworth_bandpass()),
        Step::new("filtered", "rectified", Op::Rectify),
        Step::new("rectified", "det", Op::MovingAverage { window: p("smoothing") }),
    ],
    rule: single("det", threshold(ThresholdKind::Percentile, "det_thresh"), None),
    refinements: SPINDLE_REFINEMENTS,
};

pub const FASST2: MethodSpec = MethodSpec {
    name: "FASST2",
    kind: EventKind::Spindle,
    description: "Butterworth bandpass, moving RMS and average, percentile threshold",
    reference: "Leclercq Y. et al. (2011) Comput Intell Neurosci 2011:563648",
    params: &[
        lowcut(11.0),
        highcut(18.0),
        int("order", 4.0, "Butterworth order"),
        secs("rms_window", 0.1, "Moving RMS window"),
        secs("smoothing", 0.1, "Moving average window"),
        float("det_thresh", 90.0, "Detection percentile").bounded(0.0, 100.0),
        min_duration(0.4),
        max_duration(1.3),
        min_interval(1.0),
    ],
    steps: &[
        Step::new(RAW, "filtered", butterworth_bandpass()),
        Step::new(
            "filtered",
            "rms",
            Op::MovingRms {
                window: p("rms_window"),
                step: None,
            },
        ),
        Step::new("rms", "det", Op::MovingAverage { window: p("smoothing") }),
    ],
    rule: single("det", threshold(ThresholdKind::Percentile, "det_thresh"), None),
    refinements: SPINDLE_REFINEMENTS,
};

pub const UCSD: MethodSpec = MethodSpec {
    name: "UCSD",
    kind: EventKind::Spindle,
    description: "Real wavelet bank maxima with a narrower selection bank and an in-band amplitude ratio check",
    reference: "Gonzalez C.E. et al. (2017) Sleep 40(4)",
    params: &[
        lowcut(10.0),
        highcut(16.0),
        freq("freq_step", 0.5, "Wavelet bank frequency step"),
        secs("wavelet_duration", 1.0, "Wavelet kernel length"),
        secs("det_width", 0.5, "Detection wavelet width"),
        secs("det_window", 0.5, "Detection smoothing window"),
        secs("sel_width", 0.2, "Selection wavelet width"),
        secs("sel_window", 0.2, "Selection smoothing window"),
        float("det_thresh", 2.0, "Detection threshold in SDs above the median").unbounded_below(),
        float("sel_thresh", 1.0, "Selection threshold in SDs above the median").unbounded_below(),
        float("ratio_thresh", 0.5, "Minimum in-band amplitude ratio").bounded(0.0, 1.0e6),
        min_duration(0.3),
        max_duration(3.0),
        min_interval(0.0),
    ],
    steps: &[
        Step::new(
            RAW,
            "det",
            Op::RealWavelets {
                low: p(LOWCUT),
                high: p(HIGHCUT),
                step: p("freq_step"),
                duration: p("wavelet_duration"),
                width: p("det_width"),
                smoothing: p("det_window"),
            },
        ),
        Step::new(
            RAW,
            "sel",
            Op::RealWavelets {
                low: p(LOWCUT),
                high: p(HIGHCUT),
                step: p("freq_step"),
                duration: p("wavelet_duration"),
                width: p("sel_width"),
                smoothing: p("sel_window"),
            },
        ),
    ],
    rule: DetectionRule::Threshold {
        trace: "det",
        selection_trace: Some("sel"),
        detection: threshold(ThresholdKind::MedianPlusSd, "det_thresh"),
        selection: Some(threshold(ThresholdKind::MedianPlusSd, "sel_thresh")),
        ceiling: None,
        candidates: Candidates::Maxima,
    },
    refinements: &[
        Refinement::PowerRatio {
            threshold: Value::Param("ratio_thresh"),
        },
        Refinement::PeakFrequency,
    ],
};

pub const CONCORDIA: MethodSpec = MethodSpec {
    name: "Concordia",
    kind: EventKind::Spindle,
    description: "Butterworth bandpass, moving RMS and average, low and high detection thresholds",
    reference: "Concordia University sleep laboratory detector",
    params: &[
        lowcut(10.0),
        highcut(16.0),
        int("order", 2.0, "Butterworth order"),
        secs("rms_window", 0.2, "Moving RMS window"),
        secs("smoothing", 0.2, "Moving average window"),
        float("det_thresh", 1.5, "Low detection threshold in SDs above the mean").unbounded_below(),
        float("ceiling_thresh", 10.0, "High threshold in SDs above the mean").unbounded_below(),
        float("sel_thresh", 1.0, "Selection threshold in SDs above the mean").unbounded_below(),
        min_duration(0.5),
        max_duration(3.0),
        min_interval(0.2),
    ],
    steps: &[
        Step::new(RAW, "filtered", butterworth_bandpass()),
        Step::new(
            "filtered",
            "rms",
            Op::MovingRms {
                window: p("rms_window"),
                step: None,
            },
        ),
        Step::new("rms", "det", Op::MovingAverage { window: p("smoothing") }),
    ],
    rule: DetectionRule::Threshold {
        trace: "det",
        selection_trace: None,
        detection: threshold(ThresholdKind::MeanPlusSd, "det_thresh"),
        selection: Some(threshold(ThresholdKind::MeanPlusSd, "sel_thresh")),
        ceiling: Some(threshold(ThresholdKind::MeanPlusSd, "ceiling_thresh")),
        candidates: Candidates::Runs,
    },
    refinements: SPINDLE_REFINEMENTS,
};

// ============================================================================
// Slow-wave methods
// ============================================================================

const SLOW_WAVE_STEPS: &[Step] = &[Step::new(
    RAW,
    "filtered",
    Op::SequentialBandpass {
        low: Value::Param(LOWCUT),
        high: Value::Param(HIGHCUT),
        order: Value::Param("order"),
    },
)];

pub const MASSIMINI2004: MethodSpec = MethodSpec {
    name: "Massimini2004",
    kind: EventKind::SlowWave,
    description: "Zero-crossing slow waves with trough duration, trough amplitude and peak-to-peak criteria",
    reference: "Massimini M. et al. (2004) J Neurosci 24:6862-6870",
    params: &[
        lowcut(0.1),
        highcut(4.0),
        int("order", 2.0, "Butterworth order of each pass"),
        secs("min_trough_duration", 0.3, "Shortest negative half-wave"),
        secs("max_trough_duration", 1.0, "Longest negative half-wave"),
        float("max_trough_amp", -80.0, "Trough must be at or below this value"),
        float("min_ptp", 140.0, "Minimum trough-to-peak amplitude").bounded(0.0, 1.0e6),
        min_duration(0.0),
        ParamSpec::new(MAX_DURATION, ParamKind::Duration, None, "Longest accepted wave"),
        ParamSpec::new("invert", ParamKind::Bool, Some(0.0), "Detect inverted waves"),
    ],
    steps: SLOW_WAVE_STEPS,
    rule: DetectionRule::ZeroCrossing { trace: "filtered" },
    refinements: &[],
};

pub const AASM_MASSIMINI2004: MethodSpec = MethodSpec {
    name: "AASM/Massimini2004",
    kind: EventKind::SlowWave,
    description: "Massimini2004 with AASM amplitude criteria",
    reference: "Massimini M. et al. (2004); AASM scoring manual",
    params: &[
        lowcut(0.1),
        highcut(4.0),
        int("order", 2.0, "Butterworth order of each pass"),
        secs("min_trough_duration", 0.25, "Shortest negative half-wave"),
        secs("max_trough_duration", 1.0, "Longest negative half-wave"),
        float("max_trough_amp", -40.0, "Trough must be at or below this value"),
        float("min_ptp", 75.0, "Minimum trough-to-peak amplitude").bounded(0.0, 1.0e6),
        min_duration(0.0),
        ParamSpec::new(MAX_DURATION, ParamKind::Duration, None, "Longest accepted wave"),
        ParamSpec::new("invert", ParamKind::Bool, Some(0.0), "Detect inverted waves"),
    ],
    steps: SLOW_WAVE_STEPS,
    rule: DetectionRule::ZeroCrossing { trace: "filtered" },
    refinements: &[],
};

/// Every built-in method
pub const METHOD_REGISTRY: &[MethodSpec] = &[
    FERRARELLI2007,
    NIR2011,
    MOELLE2011,
    WAMSLEY2012,
    MARTIN2013,
    RAY2015,
    LACOURSE2018,
    FASST,
    FASST2,
    UCSD,
    CONCORDIA,
    MASSIMINI2004,
    AASM_MASSIMINI2004,
];

/// Built-in methods plus any registered at runtime
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    methods: Vec<&'static MethodSpec>,
}

impl MethodRegistry {
    pub fn builtin() -> Self {
        Self {
            methods: METHOD_REGISTRY.iter().collect(),
        }
    }

    pub fn register(&mut self, spec: &'static MethodSpec) -> Result<()> {
        if self.methods.iter().any(|m| m.name.eq_ignore_ascii_case(spec.name)) {
            return Err(DetectionError::Configuration(format!(
                "a method named '{}' is already registered",
                spec.name
            )));
        }
        spec.validate()?;
        self.methods.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&'static MethodSpec> {
        self.methods
            .iter()
            .copied()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DetectionError::UnknownMethod(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static MethodSpec> + '_ {
        self.methods.iter().copied()
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &'static MethodSpec> + '_ {
        self.iter().filter(move |m| m.kind == kind)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.name).collect()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
