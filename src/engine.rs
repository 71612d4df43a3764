//! Core escrow settlement engine.
//!
//! Processes invocations one at a time against an in-memory state store of
//! campaigns and participant records. Each invocation is atomic: every
//! precondition is checked before the first mutation, and the outbound
//! ledger actions returned on success must be executed by the adapter
//! alongside the state commit. Serialization of concurrent invocations is
//! the ledger's concern; the engine never sees an interleaving.

use crate::amount::{Amount, MIN_TXN_FEE};
use crate::campaign::{
    deposit_for_goal, AccountId, AssetId, Campaign, CampaignId, CampaignStatus, Participant,
    TokenAmount, ADMIN_FEE_PERCENT,
};
use crate::error::{EngineError, Result};
use crate::invocation::{
    AttachedTransfer, CreateParams, Invocation, InvocationRecord, LedgerAction, Method,
};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{Read, Write};

/// Engine-wide policy for contributions past the funding goal.
///
/// Over-funding is accepted by default; the capped variant rejects any
/// contribution that would push `raised` past `goal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FundingPolicy {
    /// No upper bound on the raised total.
    #[default]
    Uncapped,
    /// Reject contributions that would exceed the goal.
    CapAtGoal,
}

/// The committed outcome of one accepted invocation.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Campaign the invocation acted on (freshly assigned for create).
    pub campaign: CampaignId,
    /// Outbound actions the adapter must execute with the commit.
    pub actions: Vec<LedgerAction>,
    /// Set when the invocation drained the last tracked balance and the
    /// campaign's storage was released.
    pub terminated: bool,
}

/// The escrow settlement engine.
///
/// Holds every live campaign and participant record, keyed explicitly so
/// independent campaigns coexist. Time is injected per invocation; the
/// engine keeps no clock of its own.
pub struct EscrowEngine {
    /// Campaigns indexed by engine-assigned ID.
    campaigns: HashMap<CampaignId, Campaign>,

    /// Participant records indexed by campaign and account.
    participants: HashMap<(CampaignId, AccountId), Participant>,

    /// Next campaign ID to assign.
    next_campaign: CampaignId,

    /// Over-funding policy applied to every campaign.
    policy: FundingPolicy,
}

impl EscrowEngine {
    /// Creates an empty engine with the default (uncapped) funding policy.
    pub fn new() -> Self {
        Self::with_policy(FundingPolicy::default())
    }

    /// Creates an empty engine with an explicit funding policy.
    pub fn with_policy(policy: FundingPolicy) -> Self {
        EscrowEngine {
            campaigns: HashMap::new(),
            participants: HashMap::new(),
            next_campaign: 1,
            policy,
        }
    }

    /// Executes a single invocation to completion.
    ///
    /// On error nothing has changed; on success the returned actions must
    /// be carried out atomically with the commit.
    pub fn execute(&mut self, inv: &Invocation) -> Result<Execution> {
        match &inv.method {
            Method::Create(params) => self.create(params, inv),
            method => {
                let id = inv
                    .campaign
                    .ok_or(EngineError::StructuralViolation("missing campaign id"))?;
                let mut actions = match method {
                    Method::OptIn => self.opt_in(id, inv)?,
                    Method::Bootstrap => self.bootstrap(id, inv)?,
                    Method::Contribute => self.contribute(id, inv)?,
                    Method::FinalizeSuccess => self.finalize_success(id, inv)?,
                    Method::Claim => self.claim(id, inv)?,
                    Method::CloseFail => self.close_fail(id, inv)?,
                    Method::Refund => self.refund(id, inv)?,
                    Method::ReclaimAsset => self.reclaim_asset(id, inv)?,
                    Method::Create(_) => unreachable!("handled above"),
                };
                let terminated = match self.maybe_terminate(id) {
                    Some(close_out) => {
                        actions.push(close_out);
                        true
                    }
                    None => false,
                };
                Ok(Execution {
                    campaign: id,
                    actions,
                    terminated,
                })
            }
        }
    }

    /// Opens a new campaign, collecting the developer's deposit.
    fn create(&mut self, params: &CreateParams, inv: &Invocation) -> Result<Execution> {
        if params.goal.is_zero() {
            return Err(EngineError::InvalidParameters("goal must be positive"));
        }
        if params.rate == 0 {
            return Err(EngineError::InvalidParameters("rate must be positive"));
        }
        if params.deadline <= inv.round {
            return Err(EngineError::InvalidParameters(
                "deadline must be strictly in the future",
            ));
        }

        let (sender, paid) = single_payment(inv)?;
        if *sender != params.developer {
            return Err(EngineError::StructuralViolation(
                "deposit payment must come from the developer",
            ));
        }
        let deposit = deposit_for_goal(params.goal);
        if paid != deposit {
            return Err(EngineError::InvalidParameters(
                "deposit payment must equal 2% of goal exactly",
            ));
        }

        let id = self.next_campaign;
        let campaign = Campaign::new(
            id,
            params.admin.clone(),
            params.developer.clone(),
            params.goal,
            params.deadline,
            params.token,
            params.rate,
        )
        .ok_or(EngineError::Overflow)?;
        self.next_campaign += 1;
        self.campaigns.insert(id, campaign);
        debug!(
            "Campaign {}: created with goal {}, deadline round {}, deposit {}",
            id, params.goal, params.deadline, deposit
        );

        Ok(Execution {
            campaign: id,
            actions: Vec::new(),
            terminated: false,
        })
    }

    /// Registers the caller as a participant. Re-opt-in is a no-op.
    fn opt_in(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        if !self.campaigns.contains_key(&id) {
            return Err(EngineError::UnknownCampaign(id));
        }
        no_transfers(inv)?;

        let key = (id, inv.caller.clone());
        if self.participants.contains_key(&key) {
            debug!("Campaign {}: {} already opted in", id, inv.caller);
        } else {
            self.participants.insert(key, Participant::default());
            debug!("Campaign {}: {} opted in", id, inv.caller);
        }
        Ok(Vec::new())
    }

    /// Seeds the token pool from the developer's attached asset transfer.
    fn bootstrap(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if inv.caller != campaign.developer {
            return Err(EngineError::Unauthorized);
        }
        if !campaign.is_open() {
            return Err(EngineError::AlreadyFinalized);
        }
        if campaign.bootstrapped {
            return Err(EngineError::AlreadyBootstrapped);
        }

        let (sender, asset, seeded) = single_asset_transfer(inv)?;
        if *sender != campaign.developer {
            return Err(EngineError::StructuralViolation(
                "seed transfer must come from the developer",
            ));
        }
        if asset != campaign.token {
            return Err(EngineError::StructuralViolation(
                "seed transfer carries the wrong asset",
            ));
        }
        if seeded < campaign.required_pool {
            return Err(EngineError::InsufficientPool {
                available: seeded,
                required: campaign.required_pool,
            });
        }

        let actions = vec![LedgerAction::OptInToken {
            asset: campaign.token,
        }];
        check_fee(inv, &actions)?;

        campaign.token_pool = campaign
            .token_pool
            .checked_add(seeded)
            .ok_or(EngineError::Overflow)?;
        campaign.bootstrapped = true;
        debug!("Campaign {}: bootstrapped with {} tokens", id, seeded);

        Ok(actions)
    }

    /// Accepts a contribution from an opted-in participant.
    fn contribute(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if !campaign.is_open() || campaign.deadline_passed(inv.round) {
            return Err(EngineError::CampaignClosed);
        }

        let (sender, amount) = single_payment(inv)?;
        if *sender != inv.caller {
            return Err(EngineError::StructuralViolation(
                "payment must come from the caller",
            ));
        }
        if amount.is_zero() {
            return Err(EngineError::StructuralViolation(
                "payment amount must be positive",
            ));
        }

        let participant = self
            .participants
            .get_mut(&(id, inv.caller.clone()))
            .ok_or(EngineError::NotOptedIn)?;

        let new_raised = campaign
            .raised
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;
        if self.policy == FundingPolicy::CapAtGoal && new_raised > campaign.goal {
            return Err(EngineError::CapExceeded);
        }
        let new_contributed = participant
            .contributed
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;
        let new_cash = campaign
            .cash_pool
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;

        participant.contributed = new_contributed;
        campaign.raised = new_raised;
        campaign.cash_pool = new_cash;
        debug!(
            "Campaign {}: accepted contribution of {} from {} (raised {})",
            id, amount, inv.caller, campaign.raised
        );

        Ok(Vec::new())
    }

    /// Resolves a funded campaign: admin fee out, proceeds and deposit to
    /// the developer, status to Success.
    fn finalize_success(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if !campaign.is_open() {
            return Err(EngineError::AlreadyFinalized);
        }
        if campaign.deadline_passed(inv.round) {
            return Err(EngineError::DeadlinePassed);
        }
        if campaign.raised < campaign.goal {
            return Err(EngineError::GoalNotMet {
                raised: campaign.raised,
                goal: campaign.goal,
            });
        }
        no_transfers(inv)?;

        let admin_fee = campaign.raised.percent_floor(ADMIN_FEE_PERCENT);
        let net = campaign
            .raised
            .checked_sub(admin_fee)
            .ok_or(EngineError::Overflow)?;
        let developer_take = net
            .checked_add(campaign.deposit)
            .ok_or(EngineError::Overflow)?;
        let paid_out = admin_fee
            .checked_add(developer_take)
            .ok_or(EngineError::Overflow)?;

        let mut actions = Vec::new();
        push_pay(&mut actions, &campaign.admin, admin_fee);
        push_pay(&mut actions, &campaign.developer, developer_take);
        check_fee(inv, &actions)?;

        campaign.status = CampaignStatus::Success;
        campaign.cash_pool = campaign
            .cash_pool
            .checked_sub(paid_out)
            .ok_or(EngineError::Overflow)?;
        campaign.raised = Amount::ZERO;
        debug!(
            "Campaign {}: finalized successfully, admin fee {}, developer take {}",
            id, admin_fee, developer_take
        );

        Ok(actions)
    }

    /// Pays out the caller's token entitlement after success.
    fn claim(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if campaign.status != CampaignStatus::Success {
            return Err(EngineError::NotSuccess);
        }
        let participant = self
            .participants
            .get_mut(&(id, inv.caller.clone()))
            .ok_or(EngineError::NotParticipant)?;
        if participant.claimed {
            return Err(EngineError::AlreadyClaimed);
        }
        no_transfers(inv)?;

        let owed = participant
            .contributed
            .tokens_at_rate(campaign.rate)
            .ok_or(EngineError::Overflow)?;
        if owed > campaign.token_pool {
            return Err(EngineError::InsufficientPool {
                available: campaign.token_pool,
                required: owed,
            });
        }

        let mut actions = Vec::new();
        if owed > 0 {
            actions.push(LedgerAction::TransferToken {
                to: inv.caller.clone(),
                asset: campaign.token,
                amount: owed,
            });
        }
        check_fee(inv, &actions)?;

        participant.claimed = true;
        campaign.token_pool -= owed;
        debug!("Campaign {}: {} claimed {} tokens", id, inv.caller, owed);

        Ok(actions)
    }

    /// Resolves an unfunded campaign after the deadline: splits the deposit
    /// and moves status to Failed.
    fn close_fail(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if !campaign.is_open() {
            return Err(EngineError::AlreadyFinalized);
        }
        if !campaign.deadline_passed(inv.round) {
            return Err(EngineError::DeadlineNotReached);
        }
        if campaign.raised >= campaign.goal {
            return Err(EngineError::GoalWasMet);
        }
        no_transfers(inv)?;

        // Odd micro-unit goes to the developer.
        let (admin_cut, developer_cut) = campaign.deposit.split_half();
        let mut actions = Vec::new();
        push_pay(&mut actions, &campaign.admin, admin_cut);
        push_pay(&mut actions, &campaign.developer, developer_cut);
        check_fee(inv, &actions)?;

        campaign.status = CampaignStatus::Failed;
        campaign.cash_pool = campaign
            .cash_pool
            .checked_sub(campaign.deposit)
            .ok_or(EngineError::Overflow)?;
        debug!(
            "Campaign {}: closed as failed, deposit split {} / {}",
            id, admin_cut, developer_cut
        );

        Ok(actions)
    }

    /// Returns the caller's contribution after failure.
    fn refund(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if campaign.status != CampaignStatus::Failed {
            return Err(EngineError::NotFailed);
        }
        let participant = self
            .participants
            .get_mut(&(id, inv.caller.clone()))
            .ok_or(EngineError::NotParticipant)?;
        if participant.claimed {
            return Err(EngineError::AlreadyClaimed);
        }
        if participant.contributed.is_zero() {
            return Err(EngineError::NothingToRefund);
        }
        no_transfers(inv)?;

        let refunded = participant.contributed;
        let actions = vec![LedgerAction::Pay {
            to: inv.caller.clone(),
            amount: refunded,
        }];
        check_fee(inv, &actions)?;

        let new_raised = campaign
            .raised
            .checked_sub(refunded)
            .ok_or(EngineError::Overflow)?;
        let new_cash = campaign
            .cash_pool
            .checked_sub(refunded)
            .ok_or(EngineError::Overflow)?;
        campaign.raised = new_raised;
        campaign.cash_pool = new_cash;
        participant.contributed = Amount::ZERO;
        participant.claimed = true;
        debug!("Campaign {}: refunded {} to {}", id, refunded, inv.caller);

        Ok(actions)
    }

    /// Returns the residual token pool to the developer after failure.
    ///
    /// Harmless when the pool is already empty: no transfer is planned and
    /// the call is a no-op.
    fn reclaim_asset(&mut self, id: CampaignId, inv: &Invocation) -> Result<Vec<LedgerAction>> {
        let campaign = self
            .campaigns
            .get_mut(&id)
            .ok_or(EngineError::UnknownCampaign(id))?;
        if campaign.status != CampaignStatus::Failed {
            return Err(EngineError::NotFailed);
        }
        if inv.caller != campaign.developer {
            return Err(EngineError::Unauthorized);
        }
        no_transfers(inv)?;

        let remaining = campaign.token_pool;
        let mut actions = Vec::new();
        if remaining > 0 {
            actions.push(LedgerAction::TransferToken {
                to: campaign.developer.clone(),
                asset: campaign.token,
                amount: remaining,
            });
        }
        check_fee(inv, &actions)?;

        campaign.token_pool = 0;
        debug!("Campaign {}: developer reclaimed {} tokens", id, remaining);

        Ok(actions)
    }

    /// Releases a terminal campaign's storage once every tracked balance
    /// has drained to zero.
    ///
    /// Cleanup is engine-initiated; the close-out action is not counted
    /// against the triggering caller's fee budget.
    fn maybe_terminate(&mut self, id: CampaignId) -> Option<LedgerAction> {
        let campaign = self.campaigns.get(&id)?;
        if campaign.is_open() || !campaign.drained() {
            return None;
        }
        let developer = campaign.developer.clone();
        self.campaigns.remove(&id);
        self.participants.retain(|(cid, _), _| *cid != id);
        debug!("Campaign {}: fully settled, releasing storage", id);
        Some(LedgerAction::CloseOut { to: developer })
    }

    /// Replays invocation records from a CSV reader in order.
    ///
    /// Records are processed one at a time; malformed or rejected rows are
    /// logged at warn level and skipped, matching the ledger's behavior of
    /// dropping an invalid invocation without disturbing the rest.
    pub fn process_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (row_idx, result) in csv_reader.deserialize::<InvocationRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!("Row {}: CSV parse error: {}", row_num, e);
                    continue;
                }
            };
            let invocation = match record.parse() {
                Some(invocation) => invocation,
                None => {
                    warn!("Row {}: malformed invocation record", row_num);
                    continue;
                }
            };
            match self.execute(&invocation) {
                Ok(execution) => {
                    for action in &execution.actions {
                        debug!("Row {}: campaign {}: {}", row_num, execution.campaign, action);
                    }
                }
                Err(e) => warn!("Row {}: rejected: {}", row_num, e),
            }
        }

        Ok(())
    }

    /// Writes final engine state as CSV: a campaign table followed by a
    /// participant table. Rows are sorted for deterministic output;
    /// self-terminated campaigns no longer appear.
    pub fn write_output<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);

        csv_writer.write_record([
            "campaign",
            "status",
            "goal",
            "raised",
            "deposit",
            "cash_pool",
            "token_pool",
        ])?;
        let mut campaigns: Vec<_> = self.campaigns.values().collect();
        campaigns.sort_by_key(|c| c.id);
        for campaign in campaigns {
            csv_writer.write_record([
                campaign.id.to_string(),
                campaign.status.to_string(),
                campaign.goal.to_string(),
                campaign.raised.to_string(),
                campaign.deposit.to_string(),
                campaign.cash_pool.to_string(),
                campaign.token_pool.to_string(),
            ])?;
        }

        csv_writer.write_record(["campaign", "account", "contributed", "claimed"])?;
        let mut participants: Vec<_> = self.participants.iter().collect();
        participants.sort_by_key(|(key, _)| (*key).clone());
        for ((campaign, account), participant) in participants {
            csv_writer.write_record([
                campaign.to_string(),
                account.clone(),
                participant.contributed.to_string(),
                participant.claimed.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Returns a campaign by ID, if the engine still tracks it.
    pub fn campaign(&self, id: CampaignId) -> Option<&Campaign> {
        self.campaigns.get(&id)
    }

    /// Returns a participant record, if the engine still tracks it.
    pub fn participant(&self, id: CampaignId, account: &str) -> Option<&Participant> {
        self.participants.get(&(id, account.to_string()))
    }
}

impl Default for EscrowEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the single attached payment required by the method's shape.
fn single_payment(inv: &Invocation) -> Result<(&AccountId, Amount)> {
    match inv.transfers.as_slice() {
        [AttachedTransfer::Payment { sender, amount }] => Ok((sender, *amount)),
        _ => Err(EngineError::StructuralViolation(
            "expected exactly one attached payment",
        )),
    }
}

/// Extracts the single attached asset transfer required by the method's shape.
fn single_asset_transfer(inv: &Invocation) -> Result<(&AccountId, AssetId, TokenAmount)> {
    match inv.transfers.as_slice() {
        [AttachedTransfer::AssetTransfer {
            sender,
            asset,
            amount,
        }] => Ok((sender, *asset, *amount)),
        _ => Err(EngineError::StructuralViolation(
            "expected exactly one attached asset transfer",
        )),
    }
}

/// Rejects any attached transfers for methods that take none.
fn no_transfers(inv: &Invocation) -> Result<()> {
    if inv.transfers.is_empty() {
        Ok(())
    } else {
        Err(EngineError::StructuralViolation(
            "method takes no attached transfers",
        ))
    }
}

/// Fee pooling: the declared budget must cover every planned action.
fn check_fee(inv: &Invocation, actions: &[LedgerAction]) -> Result<()> {
    let required = Amount::from_micro(MIN_TXN_FEE * actions.len() as u64);
    if inv.fee < required {
        return Err(EngineError::InsufficientFee {
            declared: inv.fee,
            required,
        });
    }
    Ok(())
}

/// Appends a payment action, eliding zero amounts.
fn push_pay(actions: &mut Vec<LedgerAction>, to: &AccountId, amount: Amount) {
    if !amount.is_zero() {
        actions.push(LedgerAction::Pay {
            to: to.clone(),
            amount,
        });
    }
}
