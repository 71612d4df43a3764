//! # Escrow Engine
//!
//! A crowdfunding escrow state machine. The engine mediates a campaign
//! between a developer, an admin, and many investors over a shared ledger:
//! it holds pooled funds and a token allocation, enforces a funding goal
//! and deadline, and deterministically resolves into exactly one of two
//! terminal payout schedules.
//!
//! ## Design Principles
//!
//! - **Pure decision logic**: the engine's only side effect on success is
//!   a list of ledger actions for the adapter to execute atomically
//! - **Injected time**: the current round arrives in every invocation;
//!   the engine keeps no clock, so any schedule is replayable in tests
//! - **Integer arithmetic**: micro-unit `u64` math with u128-widened
//!   ratios; every division truncates (floor semantics)
//! - **Atomic invocations**: every precondition is checked before the
//!   first mutation
//!
//! ## Example
//!
//! ```no_run
//! use escrow_engine::EscrowEngine;
//!
//! let csv = "method,campaign,caller,round,fee,amount,admin,developer,goal,deadline,rate,token\n\
//!            create,,DEV,0,,0.2,ADMIN,DEV,10,100,100,7\n";
//! let mut engine = EscrowEngine::new();
//! engine.process_csv(csv.as_bytes()).unwrap();
//! engine.write_output(std::io::stdout()).unwrap();
//! ```

pub mod amount;
pub mod campaign;
pub mod engine;
pub mod error;
pub mod invocation;

pub use amount::{Amount, CURRENCY_UNIT, MIN_TXN_FEE};
pub use campaign::{
    AccountId, AssetId, Campaign, CampaignId, CampaignStatus, Participant, Round, TokenAmount,
};
pub use engine::{EscrowEngine, Execution, FundingPolicy};
pub use error::{EngineError, Result};
pub use invocation::{
    AttachedTransfer, CreateParams, Invocation, InvocationRecord, LedgerAction, Method,
};
