//! Invocation envelope, attached transfers, and outbound ledger actions.
//!
//! The envelope carries everything ambient the engine needs to decide an
//! invocation: method, caller, the ordered group of co-submitted transfers,
//! the current round, and the declared fee budget. Time is never read from
//! hidden context; it always arrives here.

use crate::amount::Amount;
use crate::campaign::{AccountId, AssetId, CampaignId, Round, TokenAmount};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Parameters for campaign creation.
#[derive(Debug, Clone)]
pub struct CreateParams {
    /// Receives the success fee and half the deposit on failure.
    pub admin: AccountId,
    /// Stakes the deposit and receives the proceeds.
    pub developer: AccountId,
    /// Funding target in micro-units.
    pub goal: Amount,
    /// Absolute round after which the campaign can only fail.
    pub deadline: Round,
    /// Asset distributed to investors on success.
    pub token: AssetId,
    /// Tokens granted per whole currency unit contributed.
    pub rate: u64,
}

/// Engine method selector with creation parameters inline.
#[derive(Debug, Clone)]
pub enum Method {
    /// Open a new campaign; expects the deposit payment attached.
    Create(CreateParams),
    /// Register the caller as a participant of the campaign.
    OptIn,
    /// Seed the token pool; expects the asset transfer attached.
    Bootstrap,
    /// Pay into the campaign; expects the payment attached.
    Contribute,
    /// Resolve a funded campaign before the deadline.
    FinalizeSuccess,
    /// Collect the caller's token entitlement after success.
    Claim,
    /// Resolve an unfunded campaign after the deadline.
    CloseFail,
    /// Recover the caller's contribution after failure.
    Refund,
    /// Return the residual token pool to the developer after failure.
    ReclaimAsset,
}

/// A transfer co-submitted with an invocation, already settled into the
/// engine's custody by the ledger. The engine validates the group shape
/// and amounts; it never moves these funds itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachedTransfer {
    /// Currency payment into escrow.
    Payment {
        sender: AccountId,
        amount: Amount,
    },
    /// Token transfer into escrow.
    AssetTransfer {
        sender: AccountId,
        asset: AssetId,
        amount: TokenAmount,
    },
}

/// An invocation delivered by the ledger adapter.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Target campaign. `None` only for [`Method::Create`].
    pub campaign: Option<CampaignId>,
    /// Authenticated sender of the invocation.
    pub caller: AccountId,
    /// Requested operation.
    pub method: Method,
    /// Ordered group of co-submitted transfers.
    pub transfers: Vec<AttachedTransfer>,
    /// Current ledger round at execution time.
    pub round: Round,
    /// Declared fee budget for outbound actions.
    pub fee: Amount,
}

/// An outbound effect the adapter must execute atomically with the commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAction {
    /// Currency payment out of escrow.
    Pay { to: AccountId, amount: Amount },
    /// Token transfer out of escrow.
    TransferToken {
        to: AccountId,
        asset: AssetId,
        amount: TokenAmount,
    },
    /// One-time registration of intent to custody an asset.
    OptInToken { asset: AssetId },
    /// Release the campaign's ledger account; residual balance to `to`.
    CloseOut { to: AccountId },
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerAction::Pay { to, amount } => write!(f, "pay {amount} -> {to}"),
            LedgerAction::TransferToken { to, asset, amount } => {
                write!(f, "transfer {amount} of asset {asset} -> {to}")
            }
            LedgerAction::OptInToken { asset } => write!(f, "opt in to asset {asset}"),
            LedgerAction::CloseOut { to } => write!(f, "close out -> {to}"),
        }
    }
}

/// Raw invocation record as read from a scenario CSV.
///
/// Only `method`, `caller`, and `round` are always required; the remaining
/// columns are method-specific and validated by [`InvocationRecord::parse`].
#[derive(Debug, Deserialize)]
pub struct InvocationRecord {
    /// Method name: create, opt_in, bootstrap, contribute, finalize_success,
    /// claim, close_fail, refund, reclaim_asset
    pub method: String,

    /// Target campaign ID (empty for create)
    pub campaign: Option<u64>,

    /// Caller address
    pub caller: String,

    /// Ledger round at which the invocation executes
    pub round: u64,

    /// Declared fee budget in whole units (empty means zero)
    pub fee: Option<Amount>,

    /// Attached transfer amount: whole-unit currency for create/contribute,
    /// integer token count for bootstrap
    pub amount: Option<String>,

    /// Admin address (create only)
    pub admin: Option<String>,

    /// Developer address (create only)
    pub developer: Option<String>,

    /// Funding goal in whole units (create only)
    pub goal: Option<Amount>,

    /// Deadline round (create only)
    pub deadline: Option<u64>,

    /// Tokens per whole currency unit (create only)
    pub rate: Option<u64>,

    /// Token asset ID (create and bootstrap)
    pub token: Option<u64>,
}

impl InvocationRecord {
    /// Parses the raw CSV record into an invocation envelope.
    ///
    /// Returns `None` if the record is malformed (unknown method, missing
    /// method-specific fields, unparseable amounts).
    pub fn parse(&self) -> Option<Invocation> {
        let caller = self.caller.trim().to_string();
        if caller.is_empty() {
            return None;
        }
        let fee = self.fee.unwrap_or(Amount::ZERO);

        let method_name = self.method.trim().to_lowercase();
        let (method, transfers) = match method_name.as_str() {
            "create" => {
                let params = CreateParams {
                    admin: self.field(&self.admin)?,
                    developer: self.field(&self.developer)?,
                    goal: self.goal?,
                    deadline: self.deadline?,
                    token: self.token?,
                    rate: self.rate?,
                };
                let deposit = self.parse_currency_amount()?;
                let transfer = AttachedTransfer::Payment {
                    sender: params.developer.clone(),
                    amount: deposit,
                };
                (Method::Create(params), vec![transfer])
            }
            "opt_in" => (Method::OptIn, Vec::new()),
            "bootstrap" => {
                let seed = self.parse_token_amount()?;
                let transfer = AttachedTransfer::AssetTransfer {
                    sender: caller.clone(),
                    asset: self.token?,
                    amount: seed,
                };
                (Method::Bootstrap, vec![transfer])
            }
            "contribute" => {
                let amount = self.parse_currency_amount()?;
                let transfer = AttachedTransfer::Payment {
                    sender: caller.clone(),
                    amount,
                };
                (Method::Contribute, vec![transfer])
            }
            "finalize_success" => (Method::FinalizeSuccess, Vec::new()),
            "claim" => (Method::Claim, Vec::new()),
            "close_fail" => (Method::CloseFail, Vec::new()),
            "refund" => (Method::Refund, Vec::new()),
            "reclaim_asset" => (Method::ReclaimAsset, Vec::new()),
            _ => return None,
        };

        Some(Invocation {
            campaign: self.campaign,
            caller,
            method,
            transfers,
            round: self.round,
            fee,
        })
    }

    fn field(&self, value: &Option<String>) -> Option<AccountId> {
        let trimmed = value.as_deref()?.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Parses the amount column as whole-unit currency.
    fn parse_currency_amount(&self) -> Option<Amount> {
        let trimmed = self.amount.as_deref()?.trim();
        if trimmed.is_empty() {
            return None;
        }
        Amount::from_str(trimmed).ok()
    }

    /// Parses the amount column as an integer token count.
    fn parse_token_amount(&self) -> Option<TokenAmount> {
        self.amount.as_deref()?.trim().parse().ok()
    }
}
