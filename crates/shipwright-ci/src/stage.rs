//! Source checks run against the tree before a release.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shipwright_core::Result;
use tracing::info;

use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Builtin source checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// cargo fmt --all -- --check
    CargoFmt,

    /// cargo clippy --all-targets --all-features -- -D warnings
    CargoClippy,
}

impl BuiltinCheck {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::CargoFmt => "cargo_fmt",
            BuiltinCheck::CargoClippy => "cargo_clippy",
        }
    }

    pub fn command(&self) -> Vec<String> {
        let args: &[&str] = match self {
            BuiltinCheck::CargoFmt => &["cargo", "fmt", "--all", "--", "--check"],
            BuiltinCheck::CargoClippy => &[
                "cargo",
                "clippy",
                "--all-targets",
                "--all-features",
                "--",
                "-D",
                "warnings",
            ],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

/// A named command run inside the source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Timeout in seconds, 0 for none.
    pub timeout_secs: u64,
}

impl CheckConfig {
    pub fn from_builtin(check: BuiltinCheck, timeout_secs: u64) -> Self {
        Self {
            name: check.name().to_string(),
            command: check.command(),
            timeout_secs,
        }
    }

    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            timeout_secs,
        }
    }

    fn invocation(&self, source: &Path) -> Invocation {
        let (program, args) = self
            .command
            .split_first()
            .map(|(program, args)| (program.as_str(), args.to_vec()))
            .unwrap_or(("", Vec::new()));
        Invocation::new(program, args)
            .in_dir(source)
            .timeout(self.timeout_secs)
    }

    /// Run the check in `source`, failing on a non-zero exit.
    pub async fn run(&self, source: &Path) -> Result<CommandOutput> {
        info!(check = %self.name, "running check");
        let output = CommandRunner::run_checked(&self.invocation(source)).await?;
        info!(check = %self.name, duration_ms = output.duration_ms, "check passed");
        Ok(output)
    }
}
