//! Consumer state machine.

use serde::{Deserialize, Serialize};

/// Where the consumer loop is with the current delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    /// Waiting for a delivery.
    Idle,
    /// A delivery arrived.
    Received,
    /// Parsing and validating the payload.
    Decoding,
    /// Classify, embed and recommend.
    ProcessingPipeline,
    /// Committing the enrichment record.
    Persisting,
    /// Positive acknowledgement in progress.
    Acknowledging,
    /// The current delivery failed and is being rejected.
    Error,
}

impl ConsumerState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: ConsumerState) -> bool {
        use ConsumerState::*;

        matches!(
            (self, target),
            (Idle, Received)
                | (Received, Decoding)
                | (Decoding, ProcessingPipeline)
                | (Decoding, Error)
                | (ProcessingPipeline, Persisting)
                | (ProcessingPipeline, Error)
                | (Persisting, Acknowledging)
                | (Persisting, Error)
                | (Acknowledging, Idle)
                | (Acknowledging, Error)
                | (Error, Idle)
        )
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Received => 1,
            Self::Decoding => 2,
            Self::ProcessingPipeline => 3,
            Self::Persisting => 4,
            Self::Acknowledging => 5,
            Self::Error => 6,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Received,
            2 => Self::Decoding,
            3 => Self::ProcessingPipeline,
            4 => Self::Persisting,
            5 => Self::Acknowledging,
            6 => Self::Error,
            _ => Self::Idle,
        }
    }
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Received => "received",
            Self::Decoding => "decoding",
            Self::ProcessingPipeline => "processing_pipeline",
            Self::Persisting => "persisting",
            Self::Acknowledging => "acknowledging",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ConsumerState; 7] = [
        ConsumerState::Idle,
        ConsumerState::Received,
        ConsumerState::Decoding,
        ConsumerState::ProcessingPipeline,
        ConsumerState::Persisting,
        ConsumerState::Acknowledging,
        ConsumerState::Error,
    ];

    #[test]
    fn happy_path_transitions() {
        use ConsumerState::*;
        let path = [Idle, Received, Decoding, ProcessingPipeline, Persisting, Acknowledging, Idle];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn error_branches() {
        use ConsumerState::*;
        assert!(Decoding.can_transition_to(Error));
        assert!(ProcessingPipeline.can_transition_to(Error));
        assert!(Persisting.can_transition_to(Error));
        assert!(Error.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Error.can_transition_to(Received));
    }

    #[test]
    fn no_skipping_stages() {
        use ConsumerState::*;
        assert!(!Idle.can_transition_to(Decoding));
        assert!(!Decoding.can_transition_to(Persisting));
        assert!(!ProcessingPipeline.can_transition_to(Acknowledging));
    }

    #[test]
    fn u8_conversion_covers_every_state() {
        for state in ALL {
            assert_eq!(ConsumerState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ConsumerState::ProcessingPipeline).unwrap();
        assert_eq!(json, "\"processing_pipeline\"");
        assert_eq!(ConsumerState::ProcessingPipeline.to_string(), "processing_pipeline");
    }
}
