//! Transfer saga states
//!
//! State IDs are stored as SMALLINT in `transfers_tb.state`.

use std::fmt;

/// Persisted saga states
///
/// Validating and Authorizing happen before the journal record exists and
/// are never stored. Terminal: COMPLETED (40), REJECTED (-10),
/// COMPENSATED (-30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TransferState {
    /// Intent recorded, conditional debit issued (persist-before-call)
    Debiting = 10,

    /// Sender debited, credit issued - funds are IN-FLIGHT
    /// CRITICAL: Must eventually reach COMPLETED or COMPENSATED
    Crediting = 20,

    /// Terminal: both legs applied
    Completed = 40,

    /// Terminal: debit refused (no funds moved)
    Rejected = -10,

    /// Credit failed, refund to sender pending
    Compensating = -20,

    /// Terminal: sender refunded
    Compensated = -30,
}

impl TransferState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Rejected | TransferState::Compensated
        )
    }

    /// Sender has been debited but the money has not landed anywhere yet
    #[inline]
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TransferState::Crediting | TransferState::Compensating
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(TransferState::Debiting),
            20 => Some(TransferState::Crediting),
            40 => Some(TransferState::Completed),
            -10 => Some(TransferState::Rejected),
            -20 => Some(TransferState::Compensating),
            -30 => Some(TransferState::Compensated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Debiting => "DEBITING",
            TransferState::Crediting => "CREDITING",
            TransferState::Completed => "COMPLETED",
            TransferState::Rejected => "REJECTED",
            TransferState::Compensating => "COMPENSATING",
            TransferState::Compensated => "COMPENSATED",
        }
    }

    /// States the recovery worker resumes
    pub const RESUMABLE: [TransferState; 3] = [
        TransferState::Debiting,
        TransferState::Crediting,
        TransferState::Compensating,
    ];
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferState::from_id(value).ok_or(())
    }
}
