//! Probing for optional external tools.
//!
//! Drive sync shells out to `rclone`, document conversion to `pandoc` and
//! diagram rendering to `mmdc`. None of them are required; they are probed once
//! at startup so callers get a clear "unavailable" answer instead of a spawn
//! failure halfway through a request.

use std::fmt;
use std::process::{Command, Stdio};

use tracing::debug;

/// Optional external programs the tool handlers may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalTool {
    /// Drive sync.
    Rclone,
    /// Markdown/Docs conversion.
    Pandoc,
    /// Mermaid diagram rendering.
    MermaidCli,
}

impl ExternalTool {
    /// All probed tools, in report order.
    pub const ALL: [ExternalTool; 3] = [Self::Rclone, Self::Pandoc, Self::MermaidCli];

    /// The executable name looked up on `PATH`.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Rclone => "rclone",
            Self::Pandoc => "pandoc",
            Self::MermaidCli => "mmdc",
        }
    }

    /// What the tool is used for.
    pub fn purpose(&self) -> &'static str {
        match self {
            Self::Rclone => "Drive sync",
            Self::Pandoc => "document conversion",
            Self::MermaidCli => "diagram rendering",
        }
    }
}

impl fmt::Display for ExternalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Result of probing one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAvailability {
    /// The tool ran; first line of its `--version` output.
    Available { version: String },
    /// The tool could not be run.
    Unavailable { reason: String },
}

impl ToolAvailability {
    /// Returns true if the tool can be used.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Snapshot of which optional tools are usable.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<(ExternalTool, ToolAvailability)>,
}

impl Capabilities {
    /// Probes every [`ExternalTool`] by running `<program> --version`.
    pub fn probe() -> Self {
        Self::probe_with(|tool| probe_program(tool.program()))
    }

    /// Builds a snapshot using a custom probe.
    pub fn probe_with(mut probe: impl FnMut(ExternalTool) -> ToolAvailability) -> Self {
        let entries = ExternalTool::ALL
            .iter()
            .map(|tool| (*tool, probe(*tool)))
            .collect();
        Self { entries }
    }

    /// Availability of a single tool.
    pub fn get(&self, tool: ExternalTool) -> Option<&ToolAvailability> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tool)
            .map(|(_, availability)| availability)
    }

    /// Returns true if `tool` was probed and found runnable.
    pub fn is_available(&self, tool: ExternalTool) -> bool {
        self.get(tool).is_some_and(ToolAvailability::is_available)
    }

    /// Returns `Err` with a user-facing message if `tool` is not usable.
    pub fn require(&self, tool: ExternalTool) -> Result<(), String> {
        if self.is_available(tool) {
            Ok(())
        } else {
            Err(format!(
                "{} is unavailable: `{}` was not found on PATH",
                tool.purpose(),
                tool.program()
            ))
        }
    }

    /// Iterates over all probe results.
    pub fn iter(&self) -> impl Iterator<Item = &(ExternalTool, ToolAvailability)> {
        self.entries.iter()
    }
}

fn probe_program(program: &str) -> ToolAvailability {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let version = stdout.lines().next().unwrap_or_default().trim().to_string();
            debug!(program, %version, "external tool available");
            ToolAvailability::Available { version }
        }
        Ok(output) => ToolAvailability::Unavailable {
            reason: format!("`{} --version` exited with {}", program, output.status),
        },
        Err(e) => {
            debug!(program, error = %e, "external tool not found");
            ToolAvailability::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_with_records_every_tool() {
        let caps = Capabilities::probe_with(|tool| match tool {
            ExternalTool::Pandoc => ToolAvailability::Available {
                version: "pandoc 3.1".to_string(),
            },
            _ => ToolAvailability::Unavailable {
                reason: "not found".to_string(),
            },
        });

        assert_eq!(caps.iter().count(), 3);
        assert!(caps.is_available(ExternalTool::Pandoc));
        assert!(!caps.is_available(ExternalTool::Rclone));
        assert!(caps.require(ExternalTool::Pandoc).is_ok());

        let err = caps.require(ExternalTool::Rclone).unwrap_err();
        assert!(err.contains("Drive sync"));
        assert!(err.contains("rclone"));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let result = probe_program("gworkspace-definitely-not-a-real-binary");
        assert!(!result.is_available());
    }

    #[test]
    fn empty_snapshot_reports_nothing_available() {
        let caps = Capabilities::default();
        assert!(caps.get(ExternalTool::MermaidCli).is_none());
        assert!(caps.require(ExternalTool::MermaidCli).is_err());
    }
}
