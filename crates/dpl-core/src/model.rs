use serde::{Deserialize, Serialize};

/// Terminal states are `Reused`, `Deployed` and `Failed`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Reused,
    Deployed,
    Failed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Reused => "reused",
            StepState::Deployed => "deployed",
            StepState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepState::Pending),
            "reused" => Some(StepState::Reused),
            "deployed" => Some(StepState::Deployed),
            "failed" => Some(StepState::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    InProgress,
    Completed,
    Halted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::InProgress => "in_progress",
            RunState::Completed => "completed",
            RunState::Halted => "halted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(RunState::NotStarted),
            "in_progress" => Some(RunState::InProgress),
            "completed" => Some(RunState::Completed),
            "halted" => Some(RunState::Halted),
            _ => None,
        }
    }
}

/// How the engine derives execution order from a step list.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepOrdering {
    /// Declaration order is dependency order; forward references are errors.
    #[default]
    Declaration,
    /// Topological order over constructor-arg references, stable on declaration order.
    Graph,
}

/// Why a step is (re)deployed instead of reused.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployReason {
    New,
    BytecodeChanged,
    ArgsChanged,
    Forced,
}

impl DeployReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployReason::New => "new",
            DeployReason::BytecodeChanged => "bytecode changed",
            DeployReason::ArgsChanged => "constructor args changed",
            DeployReason::Forced => "forced",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_strings_roundtrip() {
        for s in [StepState::Pending, StepState::Reused, StepState::Deployed, StepState::Failed] {
            assert_eq!(StepState::parse(s.as_str()), Some(s));
        }
        for s in [RunState::NotStarted, RunState::InProgress, RunState::Completed, RunState::Halted] {
            assert_eq!(RunState::parse(s.as_str()), Some(s));
        }
        assert_eq!(StepState::parse("bogus"), None);
    }

    #[test]
    fn ordering_defaults_to_declaration() {
        assert_eq!(StepOrdering::default(), StepOrdering::Declaration);
    }
}
