use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "sleepdet",
    version,
    about = "Sleep spindle and slow-wave detection command-line tool",
    long_about = "Detect sleep spindles and slow waves in pre-segmented EEG.\n\
                  Input is a JSON document of subsegments; see `sleepdet validate`."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress messages and warnings on stderr
    #[arg(long, default_value_t = false, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List available detection methods
    Methods(MethodsArgs),
    /// Show the parameter schema of a method
    Params(ParamsArgs),
    /// Run a detection on one input document
    Detect(DetectArgs),
    /// Run a detection on many input documents
    Batch(BatchArgs),
    /// Check an input document and parameters without running
    Validate(ValidateArgs),
    /// Score detected events against reference events
    Agree(AgreeArgs),
    /// Merge several raters' events by vote
    Consensus(ConsensusArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindFilter {
    Spindle,
    Slowwave,
}

#[derive(Args)]
pub struct MethodsArgs {
    /// Only list methods detecting this event kind
    #[arg(long, value_enum)]
    pub kind: Option<KindFilter>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct ParamsArgs {
    /// Method name (case-insensitive)
    #[arg(long, env = "SLEEPDET_METHOD")]
    pub method: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Method, parameter and run options shared by `detect` and `batch`
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Method name (case-insensitive)
    #[arg(long, env = "SLEEPDET_METHOD")]
    pub method: String,

    /// Parameter override as name=value (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub overrides: Vec<String>,

    /// Only process these channels
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<String>>,

    /// Only process subsegments scored as these stages
    #[arg(long, value_delimiter = ',')]
    pub stages: Option<Vec<String>>,

    /// Only process subsegments from these sleep cycles
    #[arg(long, value_delimiter = ',')]
    pub cycles: Option<Vec<u32>>,

    /// Merge events closer than this many seconds (overrides the method's min_interval)
    #[arg(long)]
    pub min_interval: Option<f64>,

    /// Merge overlapping events across channels of the same group
    #[arg(long, default_value_t = false)]
    pub cross_channel: bool,

    /// Which event wins a merge: earliest-onset or longest-duration
    #[arg(long, default_value = "earliest-onset")]
    pub merge_rule: String,

    /// Remove the linear trend of each subsegment first
    #[arg(long, default_value_t = false)]
    pub detrend: bool,

    /// Skip subsegments shorter than this many seconds
    #[arg(long, default_value_t = 0.0)]
    pub min_subsegment: f64,

    /// Process long subsegments in chunks of this many seconds
    #[arg(long)]
    pub chunk: Option<f64>,

    /// Padding around each chunk in seconds
    #[arg(long, default_value_t = 5.0)]
    pub chunk_overlap: f64,

    /// Include every intermediate trace in the output
    #[arg(long, default_value_t = false)]
    pub export_traces: bool,
}

#[derive(Args)]
pub struct DetectArgs {
    /// Input JSON document
    #[arg(long)]
    pub input: String,

    #[command(flatten)]
    pub run: RunArgs,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern selecting input documents
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input documents
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Directory for per-file results (default: JSON lines on stdout)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Keep going after a file fails
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// List the matched files and exit
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input JSON document
    #[arg(long)]
    pub input: String,

    /// Also check the subsegments against this method's parameters
    #[arg(long, env = "SLEEPDET_METHOD")]
    pub method: Option<String>,

    /// Parameter override as name=value (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub overrides: Vec<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct AgreeArgs {
    /// Detected events (result document or JSON array)
    #[arg(long)]
    pub detection: String,

    /// Reference events (result document or JSON array)
    #[arg(long)]
    pub standard: String,

    /// Intersection-over-union score a pair has to exceed
    #[arg(long, default_value_t = 0.2)]
    pub threshold: f64,

    /// Include the matched pairs and unmatched indices
    #[arg(long, default_value_t = false)]
    pub details: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ConsensusArgs {
    /// One event file per rater
    #[arg(long, num_args = 2.., required = true)]
    pub files: Vec<String>,

    /// Share of raters that must mark a sample
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    /// Resolution of the voting grid in Hz
    #[arg(long, default_value_t = 100.0)]
    pub sample_rate: f64,

    /// Drop consensus events shorter than this many seconds
    #[arg(long)]
    pub min_duration: Option<f64>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_detect_list_arguments() {
        let cli = Cli::try_parse_from([
            "sleepdet",
            "detect",
            "--input",
            "night.json",
            "--method",
            "Nir2011",
            "--channels",
            "C3,C4",
            "--cycles",
            "1,2",
            "--set",
            "det_thresh=2.5",
            "--set",
            "min_duration=0.4",
        ])
        .unwrap();
        let Command::Detect(args) = cli.command else {
            panic!("expected detect");
        };
        assert_eq!(args.run.channels, Some(vec!["C3".to_string(), "C4".to_string()]));
        assert_eq!(args.run.cycles, Some(vec![1, 2]));
        assert_eq!(args.run.overrides.len(), 2);
        assert_eq!(args.run.merge_rule, "earliest-onset");
    }

    #[test]
    fn test_consensus_needs_two_files() {
        assert!(Cli::try_parse_from(["sleepdet", "consensus", "--files", "a.json"]).is_err());
        let cli =
            Cli::try_parse_from(["sleepdet", "consensus", "--files", "a.json", "b.json"]).unwrap();
        let Command::Consensus(args) = cli.command else {
            panic!("expected consensus");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.threshold, 0.5);
    }

    #[test]
    fn test_batch_sources_conflict() {
        let result = Cli::try_parse_from([
            "sleepdet", "batch", "--method", "FASST", "--glob", "*.json", "--files", "a.json",
        ]);
        assert!(result.is_err());
    }
}
