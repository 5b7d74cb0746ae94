//! Payment Invariants Module
//!
//! Read-only consistency checks over recent orders and subscriptions. These
//! back the admin payment-status report and the worker's hourly sweep.
//!
//! ## Checks
//!
//! 1. **MISSING_SUBSCRIPTION**: paid order whose user has no subscription
//! 2. **USER_PLAN_NOT_UPGRADED**: paid order whose user is still on `free`
//! 3. **MULTIPLE_ACTIVE_SUBSCRIPTIONS**: more than one `active` row per user
//! 4. **TIER_MISMATCH**: user tier differs from their latest active subscription

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use soloboard_shared::{Order, OrderStatus, PlanTier, Subscription, SubscriptionStatus, User};

use crate::error::BillingResult;
use crate::store::BillingStore;

/// How many recent orders/subscriptions the report covers.
pub const RECENT_WINDOW: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentIssueKind {
    MissingSubscription,
    UserPlanNotUpgraded,
    MultipleActiveSubscriptions,
    TierMismatch,
}

impl PaymentIssueKind {
    pub fn severity(&self) -> ViolationSeverity {
        match self {
            PaymentIssueKind::MissingSubscription | PaymentIssueKind::UserPlanNotUpgraded => {
                ViolationSeverity::High
            }
            PaymentIssueKind::MultipleActiveSubscriptions | PaymentIssueKind::TierMismatch => {
                ViolationSeverity::Critical
            }
        }
    }
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    /// Critical - user may be over- or under-entitled right now
    Critical,
    /// High - payment not reflected in entitlements
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// A single failed check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvariantViolation {
    #[serde(rename = "type")]
    pub kind: PaymentIssueKind,
    pub order_no: Option<String>,
    pub user_id: String,
    pub user_email: Option<String>,
    pub message: String,
    pub severity: ViolationSeverity,
    /// Additional context for debugging
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub issue: String,
    pub solution: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSummary {
    pub total_orders: usize,
    pub paid_orders: usize,
    pub created_orders: usize,
    pub total_subscriptions: usize,
    pub active_subscriptions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDiagnostic {
    pub order_no: String,
    pub status: OrderStatus,
    pub amount: i64,
    pub user_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    pub subscription_id: Option<String>,
    pub has_subscription: bool,
    pub user_plan_type: Option<PlanTier>,
    pub user_email: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub subscription_plan: Option<PlanTier>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDiagnostic {
    pub subscription_id: String,
    pub subscription_no: String,
    pub user_id: String,
    pub status: SubscriptionStatus,
    pub plan_type: PlanTier,
    pub plan_name: String,
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDiagnostic {
    pub user: User,
    pub subscriptions: Vec<Subscription>,
}

/// Full report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDiagnosticReport {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub summary: DiagnosticSummary,
    pub orders: Vec<OrderDiagnostic>,
    pub subscriptions: Vec<SubscriptionDiagnostic>,
    pub issues: Vec<InvariantViolation>,
    pub recommendations: Vec<Recommendation>,
    pub specific_order: Option<Order>,
    pub specific_user: Option<UserDiagnostic>,
    pub diagnosis: String,
    pub healthy: bool,
}

/// Optional drill-down targets
#[derive(Debug, Clone, Default)]
pub struct DiagnosticQuery {
    pub order_no: Option<String>,
    pub user_id: Option<String>,
}

/// Service for running payment invariant checks
pub struct InvariantChecker<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> InvariantChecker<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    /// Run all checks and build the report
    pub async fn run(&self, query: &DiagnosticQuery) -> BillingResult<PaymentDiagnosticReport> {
        let orders = self.store.recent_orders(RECENT_WINDOW).await?;
        let subs = self.store.recent_subscriptions(RECENT_WINDOW).await?;

        let mut users: HashMap<String, Option<User>> = HashMap::new();
        let mut user_subs: HashMap<String, Vec<Subscription>> = HashMap::new();
        let mut issues = Vec::new();
        let mut order_rows = Vec::with_capacity(orders.len());

        for order in &orders {
            let mut row = OrderDiagnostic {
                order_no: order.order_no.clone(),
                status: order.status,
                amount: order.amount,
                user_id: order.user_id.clone(),
                paid_at: order.paid_at,
                subscription_id: order.subscription_id.clone(),
                has_subscription: false,
                user_plan_type: None,
                user_email: None,
                subscription_status: None,
                subscription_plan: None,
            };

            if let (OrderStatus::Paid, Some(user_id)) = (order.status, &order.user_id) {
                let user = self.user(&mut users, user_id).await?;
                let latest = self.subs(&mut user_subs, user_id).await?.first().cloned();

                if let Some(user) = &user {
                    row.user_plan_type = Some(user.plan_type);
                    row.user_email = Some(user.email.clone());
                }

                match latest {
                    Some(sub) => {
                        row.has_subscription = true;
                        row.subscription_status = Some(sub.status);
                        row.subscription_plan = Some(sub.plan_type);
                    }
                    None => issues.push(violation(
                        PaymentIssueKind::MissingSubscription,
                        Some(&order.order_no),
                        user_id,
                        user.as_ref(),
                        "Order is paid but no subscription was created".to_string(),
                        serde_json::json!({ "orderId": order.id, "amount": order.amount }),
                    )),
                }

                if let Some(user) = &user {
                    if user.plan_type == PlanTier::Free {
                        issues.push(violation(
                            PaymentIssueKind::UserPlanNotUpgraded,
                            Some(&order.order_no),
                            user_id,
                            Some(user),
                            "User paid but plan is still free".to_string(),
                            serde_json::json!({ "orderId": order.id, "amount": order.amount }),
                        ));
                    }
                }
            }

            order_rows.push(row);
        }

        // Users touched by the window get the per-user checks.
        let user_ids: BTreeSet<String> = orders
            .iter()
            .filter_map(|o| o.user_id.clone())
            .chain(subs.iter().map(|s| s.user_id.clone()))
            .collect();

        for user_id in &user_ids {
            let user = self.user(&mut users, user_id).await?;
            let all = self.subs(&mut user_subs, user_id).await?.clone();
            let active: Vec<&Subscription> = all
                .iter()
                .filter(|s| s.status == SubscriptionStatus::Active)
                .collect();

            if active.len() > 1 {
                issues.push(violation(
                    PaymentIssueKind::MultipleActiveSubscriptions,
                    None,
                    user_id,
                    user.as_ref(),
                    format!("User has {} active subscriptions", active.len()),
                    serde_json::json!({
                        "subscriptionIds": active.iter().map(|s| s.id.clone()).collect::<Vec<_>>(),
                    }),
                ));
            }

            if let (Some(user), Some(latest)) = (&user, active.first()) {
                if user.plan_type != latest.plan_type {
                    issues.push(violation(
                        PaymentIssueKind::TierMismatch,
                        None,
                        user_id,
                        Some(user),
                        format!(
                            "User tier {} does not match active subscription tier {}",
                            user.plan_type, latest.plan_type
                        ),
                        serde_json::json!({
                            "userTier": user.plan_type,
                            "subscriptionId": latest.id,
                            "subscriptionTier": latest.plan_type,
                        }),
                    ));
                }
            }
        }

        let summary = DiagnosticSummary {
            total_orders: orders.len(),
            paid_orders: orders.iter().filter(|o| o.status == OrderStatus::Paid).count(),
            created_orders: orders
                .iter()
                .filter(|o| o.status == OrderStatus::Created)
                .count(),
            total_subscriptions: subs.len(),
            active_subscriptions: subs
                .iter()
                .filter(|s| s.status == SubscriptionStatus::Active)
                .count(),
        };

        let subscription_rows = subs
            .iter()
            .map(|s| SubscriptionDiagnostic {
                subscription_id: s.id.clone(),
                subscription_no: s.subscription_no.clone(),
                user_id: s.user_id.clone(),
                status: s.status,
                plan_type: s.plan_type,
                plan_name: s.plan_name.clone(),
                amount: s.amount,
                current_period_start: s.current_period_start,
                current_period_end: s.current_period_end,
            })
            .collect();

        let specific_order = match &query.order_no {
            Some(order_no) => self.store.find_order_by_no(order_no).await?,
            None => None,
        };
        let specific_user = match &query.user_id {
            Some(user_id) => match self.store.find_user(user_id).await? {
                Some(user) => Some(UserDiagnostic {
                    subscriptions: self.store.subscriptions_for_user(user_id).await?,
                    user,
                }),
                None => None,
            },
            None => None,
        };

        let recommendations = issues.iter().map(recommendation).collect();
        let healthy = issues.is_empty();
        let diagnosis = if healthy {
            "No problems found".to_string()
        } else {
            format!("Found {} issue(s) that need attention", issues.len())
        };

        Ok(PaymentDiagnosticReport {
            checked_at: OffsetDateTime::now_utc(),
            summary,
            orders: order_rows,
            subscriptions: subscription_rows,
            issues,
            recommendations,
            specific_order,
            specific_user,
            diagnosis,
            healthy,
        })
    }

    async fn user(
        &self,
        cache: &mut HashMap<String, Option<User>>,
        user_id: &str,
    ) -> BillingResult<Option<User>> {
        if let Some(hit) = cache.get(user_id) {
            return Ok(hit.clone());
        }
        let user = self.store.find_user(user_id).await?;
        cache.insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    async fn subs<'c>(
        &self,
        cache: &'c mut HashMap<String, Vec<Subscription>>,
        user_id: &str,
    ) -> BillingResult<&'c Vec<Subscription>> {
        if !cache.contains_key(user_id) {
            let subs = self.store.subscriptions_for_user(user_id).await?;
            cache.insert(user_id.to_string(), subs);
        }
        Ok(cache.entry(user_id.to_string()).or_default())
    }
}

fn violation(
    kind: PaymentIssueKind,
    order_no: Option<&str>,
    user_id: &str,
    user: Option<&User>,
    message: String,
    context: serde_json::Value,
) -> InvariantViolation {
    InvariantViolation {
        kind,
        order_no: order_no.map(str::to_string),
        user_id: user_id.to_string(),
        user_email: user.map(|u| u.email.clone()),
        message,
        severity: kind.severity(),
        context,
    }
}

fn recommendation(issue: &InvariantViolation) -> Recommendation {
    let (solution, action) = match issue.kind {
        PaymentIssueKind::MissingSubscription => (
            "Create the subscription manually or re-run the webhook",
            format!(
                "POST /api/admin/fix-payment {{\"orderNo\": \"{}\"}}",
                issue.order_no.as_deref().unwrap_or_default()
            ),
        ),
        PaymentIssueKind::UserPlanNotUpgraded => (
            "Upgrade the user's plan to match the payment",
            format!(
                "POST /api/admin/trigger-webhook {{\"orderNo\": \"{}\"}}",
                issue.order_no.as_deref().unwrap_or_default()
            ),
        ),
        PaymentIssueKind::MultipleActiveSubscriptions => (
            "Cancel the duplicate subscriptions in Creem",
            format!("Review subscriptions of user {}", issue.user_id),
        ),
        PaymentIssueKind::TierMismatch => (
            "Align the user's plan with the active subscription",
            format!("Check the latest webhook deliveries for user {}", issue.user_id),
        ),
    };
    Recommendation {
        issue: issue.message.clone(),
        solution: solution.to_string(),
        action,
    }
}
