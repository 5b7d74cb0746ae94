//! Plan tier propagation onto the user row.

use soloboard_shared::PlanTier;

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

pub struct EntitlementService<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> EntitlementService<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    /// Write `tier` onto the user. A missing user is logged, not an error.
    pub async fn propagate(&self, user_id: &str, tier: PlanTier) -> BillingResult<()> {
        if self.store.set_user_plan(user_id, tier).await? {
            tracing::info!(user_id = %user_id, tier = %tier, "User plan updated");
        } else {
            tracing::warn!(user_id = %user_id, tier = %tier, "Plan update for unknown user");
        }
        Ok(())
    }

    /// Drop the user to `free`. Other active subscriptions are not consulted.
    pub async fn downgrade_to_free(&self, user_id: &str) -> BillingResult<()> {
        self.propagate(user_id, PlanTier::Free).await
    }

    pub async fn tier_for_user(&self, user_id: &str) -> BillingResult<PlanTier> {
        self.store
            .find_user(user_id)
            .await?
            .map(|u| u.plan_type)
            .ok_or_else(|| BillingError::NotFound(format!("User {}", user_id)))
    }
}
