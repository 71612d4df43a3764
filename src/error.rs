//! Error types for the escrow engine.
//!
//! Every engine failure is a synchronous, pre-commit rejection: the first
//! violated precondition aborts the whole invocation and no state mutation
//! or outbound action survives. The adapter surfaces these verbatim.

use crate::amount::Amount;
use crate::campaign::CampaignId;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Failed to open or read the input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing input file argument
    #[error("Missing input file argument. Usage: escrow-engine <invocations.csv>")]
    MissingArgument,

    /// Invocation references a campaign the engine does not track
    #[error("unknown campaign {0}")]
    UnknownCampaign(CampaignId),

    /// Bad creation inputs (zero goal/rate, deadline not in the future,
    /// deposit amount mismatch)
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),

    /// The operation group does not match the method's declared shape
    #[error("structural violation: {0}")]
    StructuralViolation(&'static str),

    /// Declared fee budget does not cover the planned outbound actions
    #[error("insufficient fee: declared {declared}, required {required}")]
    InsufficientFee { declared: Amount, required: Amount },

    /// Token custody cannot cover the required amount
    #[error("insufficient token pool: have {available}, need {required}")]
    InsufficientPool { available: u64, required: u64 },

    /// Bootstrap was already performed for this campaign
    #[error("campaign already bootstrapped")]
    AlreadyBootstrapped,

    /// Campaign is no longer accepting contributions
    #[error("campaign closed to contributions")]
    CampaignClosed,

    /// Caller has no participant record for this campaign
    #[error("caller has not opted in")]
    NotOptedIn,

    /// Contribution would push the raised total past the funding cap
    #[error("contribution exceeds funding cap")]
    CapExceeded,

    /// Funding goal not reached
    #[error("goal not met: raised {raised}, goal {goal}")]
    GoalNotMet { raised: Amount, goal: Amount },

    /// Goal was met, so the failure path is unreachable
    #[error("goal was met")]
    GoalWasMet,

    /// Deadline has passed, so the success path is unreachable
    #[error("deadline passed")]
    DeadlinePassed,

    /// Deadline not yet reached, so the failure path is unreachable
    #[error("deadline not reached")]
    DeadlineNotReached,

    /// Campaign status has already left Open
    #[error("campaign already finalized")]
    AlreadyFinalized,

    /// Method requires a successful campaign
    #[error("campaign did not finalize successfully")]
    NotSuccess,

    /// Method requires a failed campaign
    #[error("campaign has not failed")]
    NotFailed,

    /// Caller has no participant record for this campaign
    #[error("caller is not a participant")]
    NotParticipant,

    /// Participant was already settled
    #[error("already claimed")]
    AlreadyClaimed,

    /// Participant has nothing to refund
    #[error("nothing to refund")]
    NothingToRefund,

    /// Caller lacks the required role
    #[error("unauthorized caller")]
    Unauthorized,

    /// Arithmetic overflow in balance accounting
    #[error("arithmetic overflow")]
    Overflow,
}
