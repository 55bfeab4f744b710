mod category;
mod endpoint;
mod outcome;
mod probe;
mod report;

pub use category::{OwaspCategory, UnknownCategory};
pub use endpoint::{DEFAULT_GENERATOR, DEFAULT_TIMEOUT_SECS, Endpoint, MAX_TIMEOUT_SECS, RateLimit};
pub use outcome::{NOT_RUN_EVIDENCE, Outcome, OutcomeStatus};
pub use probe::{ProbeSpec, Severity};
pub use report::{EndpointSummary, Finding, RunReport, Verdict};
