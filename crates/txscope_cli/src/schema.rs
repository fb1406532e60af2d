//! JSON file formats read by the CLI.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use txscope_core::{
    FailureClass, Propagation, RollbackRules, TransactionMode, TransactionOptions, TxError,
    TxResult, DEFAULT_RESOURCE,
};

/// Transaction options as written in a JSON file.
///
/// Every field is optional; missing fields take the library defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsFile {
    /// Registered resource name.
    pub resource: Option<String>,
    /// `SYNC` or `ASYNC`.
    pub mode: Option<String>,
    /// Read-only hint passed to the provider.
    pub read_only: bool,
    /// Isolation level passed to the provider.
    pub isolation_level: Option<String>,
    /// Propagation mode name, e.g. `REQUIRES_NEW`.
    pub propagation: Option<String>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Extra attempts after the first. Signed so negative values can be reported.
    pub retry_count: i64,
    /// Pause between attempts in milliseconds.
    pub retry_backoff_ms: Option<u64>,
    /// Failure classes that trigger a retry. Absent means all.
    pub rollback_for: Option<Vec<String>>,
}

impl OptionsFile {
    /// Reads an options file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Validates the file and builds options from it.
    pub fn to_options(&self) -> TxResult<TransactionOptions> {
        let retry_count = u32::try_from(self.retry_count).map_err(|_| {
            TxError::configuration(format!(
                "retry_count must be a non-negative integer, got {}",
                self.retry_count
            ))
        })?;

        let mut builder = TransactionOptions::builder()
            .resource(self.resource.as_deref().unwrap_or(DEFAULT_RESOURCE))
            .read_only(self.read_only)
            .retry_count(retry_count);

        if let Some(mode) = &self.mode {
            builder = builder.mode(mode.parse::<TransactionMode>()?);
        }
        if let Some(propagation) = &self.propagation {
            builder = builder.propagation(propagation.parse::<Propagation>()?);
        }
        if let Some(level) = &self.isolation_level {
            builder = builder.isolation_level(level.clone());
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.retry_backoff_ms {
            builder = builder.retry_backoff(Duration::from_millis(ms));
        }
        if let Some(names) = &self.rollback_for {
            let classes = names
                .iter()
                .map(|name| name.parse::<FailureClass>())
                .collect::<TxResult<Vec<_>>>()?;
            builder = builder.rollback_for(RollbackRules::only(classes));
        }

        builder.build()
    }
}

/// Failure a scenario step raises from its body.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectedFailure {
    /// Failure class name, e.g. `provider` or `payment_declined`.
    pub class: String,
    /// Message carried by the failure.
    #[serde(default)]
    pub message: Option<String>,
    /// Fail only on the first `n` attempts. Absent means every attempt.
    #[serde(default)]
    pub attempts: Option<u32>,
}

/// One wrapped call in a scenario tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepFile {
    /// Label used in reports.
    pub name: String,
    /// Options of this call.
    #[serde(default)]
    pub options: OptionsFile,
    /// Keys written into the step's scope before the children run.
    #[serde(default)]
    pub writes: BTreeMap<String, String>,
    /// Time spent in the body, observing the deadline.
    #[serde(default)]
    pub sleep_ms: Option<u64>,
    /// Failure raised after the children ran.
    #[serde(default)]
    pub fail: Option<InjectedFailure>,
    /// Whether the parent carries on when this step fails.
    #[serde(default)]
    pub tolerate_failure: bool,
    /// Nested calls made from the body, in order.
    #[serde(default)]
    pub steps: Vec<StepFile>,
}

/// Faults scripted on the in-memory provider before the run.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderFaults {
    /// Upcoming opens that fail.
    pub fail_opens: u32,
    /// Upcoming commits that fail.
    pub fail_commits: u32,
    /// Upcoming rollbacks that fail.
    pub fail_rollbacks: u32,
}

/// A scenario file: a tree of nested calls run from a fresh call chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Scenario label.
    #[serde(default)]
    pub name: Option<String>,
    /// Provider faults.
    #[serde(default)]
    pub faults: ProviderFaults,
    /// Top-level call.
    pub root: StepFile,
}

impl ScenarioFile {
    /// Reads a scenario file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Validates every step, returning the compiled tree.
    pub fn compile(&self) -> TxResult<Step> {
        Step::compile(&self.root)
    }
}

/// A validated scenario step.
#[derive(Debug, Clone)]
pub struct Step {
    /// Label used in reports.
    pub name: String,
    /// Built options.
    pub options: TransactionOptions,
    /// Keys written into the scope.
    pub writes: BTreeMap<String, String>,
    /// Time spent in the body.
    pub sleep: Option<Duration>,
    /// Parsed injected failure.
    pub fail: Option<(FailureClass, String, Option<u32>)>,
    /// Whether the parent carries on when this step fails.
    pub tolerate_failure: bool,
    /// Nested steps.
    pub steps: Vec<Step>,
}

impl Step {
    fn compile(file: &StepFile) -> TxResult<Self> {
        let named = |err: TxError| match err {
            TxError::Configuration { message } => {
                TxError::configuration(format!("step '{}': {message}", file.name))
            }
            other => other,
        };
        let options = file.options.to_options().map_err(named)?;
        let fail = match &file.fail {
            Some(f) => {
                let class = f.class.parse::<FailureClass>().map_err(named)?;
                let message = f
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", file.name));
                Some((class, message, f.attempts))
            }
            None => None,
        };
        Ok(Self {
            name: file.name.clone(),
            options,
            writes: file.writes.clone(),
            sleep: file.sleep_ms.map(Duration::from_millis),
            fail,
            tolerate_failure: file.tolerate_failure,
            steps: file.steps.iter().map(Step::compile).collect::<TxResult<_>>()?,
        })
    }

    /// Returns the injected failure for `attempt`, if any.
    pub fn failure_for(&self, attempt: u32) -> Option<(&FailureClass, &str)> {
        match &self.fail {
            Some((class, message, limit)) if limit.map_or(true, |n| attempt <= n) => {
                Some((class, message.as_str()))
            }
            _ => None,
        }
    }
}
