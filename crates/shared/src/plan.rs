//! Plan tiers and the site limits they unlock.
//!
//! A user's tier is derived from what they paid (in cents) and gates how many
//! sites they can monitor. Tiers are stored as lowercase text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::sql_text::text_enum_sqlx;

/// Amounts above this (in cents) buy the Pro tier.
pub const BASE_PLAN_CEILING_CENTS: i64 = 2000;

/// Returned when a stored or supplied enum string is not recognized.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Base,
    Pro,
}

impl PlanTier {
    /// Derive the tier from a paid amount in cents.
    ///
    /// `<= 0` is free, `(0, 2000]` is base, anything above is pro.
    pub fn from_amount_cents(amount: i64) -> Self {
        if amount <= 0 {
            PlanTier::Free
        } else if amount <= BASE_PLAN_CEILING_CENTS {
            PlanTier::Base
        } else {
            PlanTier::Pro
        }
    }

    /// Loose match on a free-form plan name ("Pro Plan", "premium", "Standard").
    pub fn from_plan_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        if lower.contains("pro") || lower.contains("premium") {
            PlanTier::Pro
        } else if lower.contains("base") || lower.contains("standard") {
            PlanTier::Base
        } else {
            PlanTier::Free
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Base => "base",
            PlanTier::Pro => "pro",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Free => "Free",
            PlanTier::Base => "Base",
            PlanTier::Pro => "Pro",
        }
    }

    /// Name written onto subscription rows.
    pub fn plan_name(&self) -> &'static str {
        match self {
            PlanTier::Free => "Free Plan",
            PlanTier::Base => "Base Plan",
            PlanTier::Pro => "Pro Plan",
        }
    }

    /// Monthly list price in USD cents.
    pub fn list_price_cents(&self) -> i64 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Base => 1990,
            PlanTier::Pro => 3990,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            PlanTier::Free => PlanLimits { max_sites: Some(1) },
            PlanTier::Base => PlanLimits { max_sites: Some(5) },
            PlanTier::Pro => PlanLimits { max_sites: None },
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "base" => Ok(PlanTier::Base),
            "pro" => Ok(PlanTier::Pro),
            other => Err(UnknownVariant::new("plan tier", other)),
        }
    }
}

text_enum_sqlx!(PlanTier);

/// Per-tier resource limits. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_sites: Option<u32>,
}

/// Answer to "may this user add another site?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteAllowance {
    pub can_add: bool,
    /// `None` when the tier is unlimited.
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub plan_display_name: &'static str,
}

pub fn can_add_more_sites(current_count: u32, tier: PlanTier) -> SiteAllowance {
    match tier.limits().max_sites {
        Some(limit) => SiteAllowance {
            can_add: current_count < limit,
            limit: Some(limit),
            remaining: Some(limit.saturating_sub(current_count)),
            plan_display_name: tier.display_name(),
        },
        None => SiteAllowance {
            can_add: true,
            limit: None,
            remaining: None,
            plan_display_name: tier.display_name(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(PlanTier::from_amount_cents(-100), PlanTier::Free);
        assert_eq!(PlanTier::from_amount_cents(0), PlanTier::Free);
        assert_eq!(PlanTier::from_amount_cents(1), PlanTier::Base);
        assert_eq!(PlanTier::from_amount_cents(1990), PlanTier::Base);
        assert_eq!(PlanTier::from_amount_cents(2000), PlanTier::Base);
        assert_eq!(PlanTier::from_amount_cents(2001), PlanTier::Pro);
        assert_eq!(PlanTier::from_amount_cents(3990), PlanTier::Pro);
    }

    #[test]
    fn list_prices_derive_back_to_their_tier() {
        for tier in [PlanTier::Base, PlanTier::Pro] {
            assert_eq!(PlanTier::from_amount_cents(tier.list_price_cents()), tier);
        }
    }

    #[test]
    fn loose_plan_name_matching() {
        assert_eq!(PlanTier::from_plan_name("Pro Plan"), PlanTier::Pro);
        assert_eq!(PlanTier::from_plan_name("PREMIUM"), PlanTier::Pro);
        assert_eq!(PlanTier::from_plan_name("Base Plan"), PlanTier::Base);
        assert_eq!(PlanTier::from_plan_name("standard"), PlanTier::Base);
        assert_eq!(PlanTier::from_plan_name(""), PlanTier::Free);
        assert_eq!(PlanTier::from_plan_name("enterprise"), PlanTier::Free);
    }

    #[test]
    fn parse_is_strict() {
        assert_eq!("base".parse::<PlanTier>().unwrap(), PlanTier::Base);
        assert!("Base".parse::<PlanTier>().is_err());
        assert!("gold".parse::<PlanTier>().is_err());
    }

    #[test]
    fn free_allows_exactly_one_site() {
        let first = can_add_more_sites(0, PlanTier::Free);
        assert!(first.can_add);
        assert_eq!(first.remaining, Some(1));

        let second = can_add_more_sites(1, PlanTier::Free);
        assert!(!second.can_add);
        assert_eq!(second.limit, Some(1));
        assert_eq!(second.remaining, Some(0));
    }

    #[test]
    fn base_allows_five_sites() {
        assert!(can_add_more_sites(4, PlanTier::Base).can_add);
        assert!(!can_add_more_sites(5, PlanTier::Base).can_add);
        // over the limit after a downgrade
        assert_eq!(can_add_more_sites(7, PlanTier::Base).remaining, Some(0));
    }

    #[test]
    fn pro_is_unlimited() {
        let allowance = can_add_more_sites(10_000, PlanTier::Pro);
        assert!(allowance.can_add);
        assert_eq!(allowance.limit, None);
        assert_eq!(allowance.plan_display_name, "Pro");
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&PlanTier::Pro).unwrap();
        assert_eq!(json, "\"pro\"");
    }
}
