/// Pipeline stage a metric row is recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Script synthesis against the inference endpoint.
    Script,
    /// Short assembly from the generated script.
    Assemble,
    /// Outcome announcement through the messaging bot.
    Notify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Script => "script",
            Stage::Assemble => "assemble",
            Stage::Notify => "notify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Failure,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Success => "success",
            StageOutcome::Failure => "failure",
        }
    }
}
