use std::fmt;

/// The single authoritative stage of a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Idle,
    Capturing,
    QualityChecking,
    Generating,
}

impl Phase {
    /// Forward transitions of the round state machine.
    ///
    /// A reset to `Idle` is always allowed and is not listed here.
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Capturing)
                | (Phase::Capturing, Phase::QualityChecking)
                | (Phase::QualityChecking, Phase::Capturing)
                | (Phase::QualityChecking, Phase::Generating)
                | (Phase::Generating, Phase::Idle)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::QualityChecking => "quality checking",
            Phase::Generating => "generating",
        };
        f.write_str(name)
    }
}
