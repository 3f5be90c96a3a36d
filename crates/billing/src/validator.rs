//! Usage-fact validation with trust-tier dispatch.
//!
//! The same defects are checked for every fact; what changes per
//! executor type is the verdict. Billing-authoritative executors must
//! report clean facts or the run fails — silently under-billing is
//! worse than failing. Hints-only executors (an external graph server
//! outside the trust boundary) get a soft warning instead: billing for
//! that fact is skipped out-of-band reconciliation territory, and the
//! run keeps functioning.

use rr_domain::context::RunContext;
use rr_domain::usage::{TrustTier, UsageFact};

/// A single problem found in a usage fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Defect {
    MissingUsageUnitId,
    MalformedGraphId,
    MissingBillingAccount,
    MissingVirtualKey,
    /// The fact claims a different run/attempt than the relay context.
    RunIdentityMismatch,
}

impl std::fmt::Display for Defect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MissingUsageUnitId => "missing usage_unit_id",
            Self::MalformedGraphId => "malformed graph_id namespace",
            Self::MissingBillingAccount => "missing billing_account_id",
            Self::MissingVirtualKey => "missing virtual_key_id",
            Self::RunIdentityMismatch => "run identity mismatch",
        };
        f.write_str(s)
    }
}

/// Verdict for one fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Commit the fact.
    Ok,
    /// Log, skip this fact's commit, continue the run.
    SoftWarning(Vec<Defect>),
    /// Fail the run before any ledger write.
    HardFailure(Vec<Defect>),
}

/// Validate a usage fact against the run it arrived on.
pub fn validate(ctx: &RunContext, fact: &UsageFact) -> Validation {
    let mut defects = Vec::new();

    if fact
        .usage_unit_id
        .as_deref()
        .map_or(true, |unit| unit.trim().is_empty())
    {
        defects.push(Defect::MissingUsageUnitId);
    }
    if fact.graph_namespace().is_none() {
        defects.push(Defect::MalformedGraphId);
    }
    if fact.billing_account_id.trim().is_empty() {
        defects.push(Defect::MissingBillingAccount);
    }
    if fact.virtual_key_id.trim().is_empty() {
        defects.push(Defect::MissingVirtualKey);
    }
    if fact.run_id != ctx.run_id || fact.attempt != ctx.attempt {
        defects.push(Defect::RunIdentityMismatch);
    }

    if defects.is_empty() {
        return Validation::Ok;
    }

    match fact.executor_type.trust_tier() {
        TrustTier::BillingAuthoritative => Validation::HardFailure(defects),
        TrustTier::HintsOnly => Validation::SoftWarning(defects),
    }
}
