pub mod agreement;
pub mod error;
pub mod extract;
pub mod merge;
pub mod method;
pub mod profiling;
pub mod runner;
pub mod slowwave;
pub mod transform;
pub mod types;

pub use agreement::{consensus, match_events, Agreement, AgreementSummary};
pub use error::{DetectionError, Result};
pub use merge::{MergeRule, Merger};
pub use method::{MethodRegistry, MethodSpec, Overrides, ParamSet};
pub use runner::{DetectionRun, MergeOptions, RunOptions};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
