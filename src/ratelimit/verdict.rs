//! Admission verdicts.

/// Outcome of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the request downstream.
    Allow,
    /// Reject the request.
    Deny {
        /// Seconds until the client may retry, when the algorithm knows it.
        retry_after: Option<u64>,
    },
}

impl Verdict {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// Advertised retry delay in seconds, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny { retry_after } => *retry_after,
        }
    }
}
