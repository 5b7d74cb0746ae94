//! Revenue from a user's own Creem store
//!
//! Store sales arrive on the same webhook as platform payments but belong to
//! one of the user's monitored sites.

use serde::Serialize;
use time::{Date, OffsetDateTime};

use soloboard_shared::SyncStatus;

use crate::error::MonitorResult;
use crate::store::{SiteStore, SyncRecord};

pub const CREEM_PLATFORM: &str = "CREEM";

/// A paid store order, in cents.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSale {
    pub amount: i64,
    pub currency: String,
    pub site_id: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributedSale {
    pub site_id: String,
    pub revenue_today: i64,
}

pub struct RevenueAttributor<'a> {
    store: &'a dyn SiteStore,
}

impl<'a> RevenueAttributor<'a> {
    pub fn new(store: &'a dyn SiteStore) -> Self {
        Self { store }
    }

    pub async fn attribute(&self, sale: &StoreSale) -> MonitorResult<Option<AttributedSale>> {
        self.attribute_on(sale, OffsetDateTime::now_utc().date()).await
    }

    /// Add the sale to `day` on the site named in metadata, or on the only
    /// CREEM site when there is exactly one. Returns `None` when no site can
    /// be chosen.
    pub async fn attribute_on(
        &self,
        sale: &StoreSale,
        day: Date,
    ) -> MonitorResult<Option<AttributedSale>> {
        let Some(site_id) = self.resolve_site(sale).await? else {
            return Ok(None);
        };

        let revenue_today = self.store.add_revenue(&site_id, day, sale.amount).await?;
        self.store
            .record_sync(
                &site_id,
                SyncRecord {
                    status: SyncStatus::Success,
                    error: None,
                    snapshot: None,
                    at: OffsetDateTime::now_utc(),
                },
            )
            .await?;

        tracing::info!(
            site_id = %site_id,
            amount = sale.amount,
            currency = %sale.currency,
            transaction_id = ?sale.transaction_id,
            revenue_today,
            "Store revenue recorded"
        );
        Ok(Some(AttributedSale {
            site_id,
            revenue_today,
        }))
    }

    async fn resolve_site(&self, sale: &StoreSale) -> MonitorResult<Option<String>> {
        if let Some(site_id) = &sale.site_id {
            if self.store.find_site(site_id).await?.is_some() {
                return Ok(Some(site_id.clone()));
            }
            tracing::warn!(site_id = %site_id, "Store order names an unknown site");
            return Ok(None);
        }

        let mut candidates = self.store.sites_by_platform(CREEM_PLATFORM).await?;
        match candidates.len() {
            1 => Ok(candidates.pop().map(|s| s.id)),
            0 => {
                tracing::warn!(
                    transaction_id = ?sale.transaction_id,
                    "Store order without site_id and no CREEM site configured"
                );
                Ok(None)
            }
            n => {
                tracing::warn!(
                    transaction_id = ?sale.transaction_id,
                    candidates = n,
                    "Store order without site_id matches several CREEM sites, ignoring"
                );
                Ok(None)
            }
        }
    }
}
