use std::fmt;

/// Lifecycle of one scan over a category's identifier space
///
/// `Idle -> Scanning -> {Completed, Cancelled}`. A crawler returns to `Idle`
/// once the manager has observed the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    /// No scan is active
    Idle,

    /// The scan loop is walking identifiers
    Scanning,

    /// The loop reached the end of its range
    Completed,

    /// A cancellation signal was observed at an identifier boundary
    Cancelled,
}

impl ScanState {
    /// Returns true if the scan has finished, either way
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if the transition is allowed
    pub fn can_transition_to(&self, next: ScanState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Scanning)
                | (Self::Scanning, Self::Completed)
                | (Self::Scanning, Self::Cancelled)
                | (Self::Completed, Self::Idle)
                | (Self::Cancelled, Self::Idle)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
