//! Campaign and participant state.
//!
//! Maintains the invariant: `cash_pool == deposit + raised` while the
//! campaign is open.

use crate::amount::Amount;
use std::fmt;

/// Identifier of a campaign tracked by the engine.
pub type CampaignId = u64;

/// Opaque ledger address of a participant, admin, or developer.
pub type AccountId = String;

/// Identifier of the fungible token asset held in escrow.
pub type AssetId = u64;

/// Monotonic ledger time counter (block height / round number).
pub type Round = u64;

/// Token quantity in base units.
pub type TokenAmount = u64;

/// Percentage of the goal the developer must stake up front.
pub const DEPOSIT_PERCENT: u64 = 2;

/// Percentage of the raised total paid to the admin on success.
pub const ADMIN_FEE_PERCENT: u64 = 2;

/// Lifecycle status of a campaign.
///
/// Transitions only `Open -> Success` or `Open -> Failed`, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    /// Accepting contributions.
    Open,
    /// Goal met before the deadline; investors claim tokens.
    Success,
    /// Deadline passed with the goal unmet; investors refund.
    Failed,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Open => write!(f, "open"),
            CampaignStatus::Success => write!(f, "success"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A single fundraising campaign held in escrow by the engine.
///
/// `admin`, `developer`, `goal`, `deadline`, `rate`, and `token` are fixed
/// at creation. `deposit` and `required_pool` are derived once at creation
/// and each consumed exactly once over the campaign's lifetime.
///
/// `cash_pool` and `token_pool` track the engine's custody balances so
/// self-termination is decidable without querying the ledger.
#[derive(Debug, Clone)]
pub struct Campaign {
    /// Engine-assigned identifier.
    pub id: CampaignId,

    /// Receives the success fee and half the deposit on failure.
    pub admin: AccountId,

    /// Stakes the deposit, seeds the token pool, receives the proceeds.
    pub developer: AccountId,

    /// Funding target in micro-units. Always > 0.
    pub goal: Amount,

    /// Absolute round after which the campaign can only fail.
    pub deadline: Round,

    /// Tokens granted per whole currency unit contributed. Always > 0.
    pub rate: u64,

    /// Asset distributed to investors on success.
    pub token: AssetId,

    /// Running sum of accepted contributions.
    pub raised: Amount,

    /// Lifecycle status. Moves forward only.
    pub status: CampaignStatus,

    /// Developer's upfront stake: `ceil(goal * 2 / 100)`.
    pub deposit: Amount,

    /// Token amount the developer must seed: `floor(goal * rate / unit)`.
    pub required_pool: TokenAmount,

    /// Set once the token pool has been seeded.
    pub bootstrapped: bool,

    /// Currency held in custody (deposit plus unsettled contributions).
    pub cash_pool: Amount,

    /// Tokens held in custody.
    pub token_pool: TokenAmount,
}

impl Campaign {
    /// Creates an open campaign with the derived deposit and pool targets.
    ///
    /// The caller is responsible for having validated the parameters and
    /// collected the deposit payment; `cash_pool` starts at `deposit`.
    /// Returns `None` when `goal * rate` implies a seed pool no `u64`
    /// token balance can hold.
    pub fn new(
        id: CampaignId,
        admin: AccountId,
        developer: AccountId,
        goal: Amount,
        deadline: Round,
        token: AssetId,
        rate: u64,
    ) -> Option<Self> {
        let deposit = deposit_for_goal(goal);
        let required_pool = required_pool_for(goal, rate)?;
        Some(Campaign {
            id,
            admin,
            developer,
            goal,
            deadline,
            rate,
            token,
            raised: Amount::ZERO,
            status: CampaignStatus::Open,
            deposit,
            required_pool,
            bootstrapped: false,
            cash_pool: deposit,
            token_pool: 0,
        })
    }

    /// Returns `true` while the campaign accepts contributions.
    pub fn is_open(&self) -> bool {
        self.status == CampaignStatus::Open
    }

    /// Returns `true` once `round` is at or past the deadline.
    pub fn deadline_passed(&self, round: Round) -> bool {
        round >= self.deadline
    }

    /// Returns `true` when every tracked balance has been drained.
    ///
    /// This is the self-termination trigger: once a terminal campaign is
    /// fully drained its storage can be released.
    pub fn drained(&self) -> bool {
        self.raised.is_zero() && self.cash_pool.is_zero() && self.token_pool == 0
    }

    /// Verifies the open-campaign invariant: `cash_pool == deposit + raised`.
    #[cfg(debug_assertions)]
    pub fn check_invariant(&self) -> bool {
        !self.is_open()
            || self
                .deposit
                .checked_add(self.raised)
                .map(|total| total == self.cash_pool)
                .unwrap_or(false)
    }
}

/// Per-investor record, created by an explicit opt-in.
#[derive(Debug, Clone, Default)]
pub struct Participant {
    /// Cumulative amount paid in. Drops to zero only on refund.
    pub contributed: Amount,

    /// Set exactly once when this investor receives their final settlement.
    pub claimed: bool,
}

/// Derived deposit for a goal: `ceil(goal * DEPOSIT_PERCENT / 100)`.
pub fn deposit_for_goal(goal: Amount) -> Amount {
    goal.percent_ceil(DEPOSIT_PERCENT)
}

/// Derived seed requirement: `floor(goal * rate / CURRENCY_UNIT)` tokens.
///
/// `None` when the requirement exceeds `u64::MAX`.
pub fn required_pool_for(goal: Amount, rate: u64) -> Option<TokenAmount> {
    goal.tokens_at_rate(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(goal_micro: u64, rate: u64) -> Campaign {
        Campaign::new(
            1,
            "ADMIN".into(),
            "DEV".into(),
            Amount::from_micro(goal_micro),
            100,
            7,
            rate,
        )
        .unwrap()
    }

    #[test]
    fn test_new_campaign_derives_deposit_and_pool() {
        let c = campaign(10_000_000, 100);
        assert_eq!(c.deposit, Amount::from_micro(200_000));
        assert_eq!(c.required_pool, 1_000);
        assert_eq!(c.cash_pool, c.deposit);
        assert_eq!(c.raised, Amount::ZERO);
        assert_eq!(c.status, CampaignStatus::Open);
        assert!(!c.bootstrapped);
        assert!(c.check_invariant());
    }

    #[test]
    fn test_deposit_rounds_up() {
        // 2% of 49 micro-units is 0.98; the deposit rounds to 1.
        let c = campaign(49, 1);
        assert_eq!(c.deposit, Amount::from_micro(1));
    }

    #[test]
    fn test_new_rejects_unrepresentable_pool() {
        // 2 whole units at the maximum rate needs 2 * u64::MAX tokens.
        assert!(Campaign::new(
            1,
            "ADMIN".into(),
            "DEV".into(),
            Amount::from_micro(2_000_000),
            100,
            7,
            u64::MAX,
        )
        .is_none());
    }

    #[test]
    fn test_required_pool_truncates() {
        // 1.5 units at 3 tokens/unit -> 4.5 -> 4 tokens.
        let c = campaign(1_500_000, 3);
        assert_eq!(c.required_pool, 4);
    }

    #[test]
    fn test_deadline_comparison_is_inclusive_at_boundary() {
        let c = campaign(10_000_000, 100);
        assert!(!c.deadline_passed(99));
        assert!(c.deadline_passed(100));
        assert!(c.deadline_passed(101));
    }

    #[test]
    fn test_drained_requires_all_pools_empty() {
        let mut c = campaign(10_000_000, 100);
        assert!(!c.drained());
        c.cash_pool = Amount::ZERO;
        assert!(c.drained());
        c.token_pool = 5;
        assert!(!c.drained());
    }
}
