//! Locate (or lazily create) the user and order a delivery belongs to.

use soloboard_shared::{NewUser, Order, PlanTier};

use crate::error::{BillingError, BillingResult};
use crate::events::PaymentSession;
use crate::store::BillingStore;

/// Outcome of identity resolution for one delivery.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user_id: String,
    /// True when the user row was created for this delivery.
    pub user_created: bool,
    pub order: Option<Order>,
}

pub struct IdentityResolver<'a> {
    store: &'a dyn BillingStore,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn BillingStore) -> Self {
        Self { store }
    }

    /// Resolve the owning user and, if possible, the order.
    ///
    /// Only a missing user is fatal. A missing order is logged and the
    /// delivery continues without one.
    pub async fn resolve(&self, session: &PaymentSession) -> BillingResult<ResolvedIdentity> {
        let metadata = &session.metadata;
        let payment = session.payment_info.as_ref();
        let email = metadata
            .user_email()
            .or_else(|| payment.and_then(|p| p.payment_email.clone()));

        let (user_id, user_created) = match metadata.user_id() {
            Some(id) => (id, false),
            None => match email.as_deref() {
                Some(email) => self.find_or_create_user(email, session).await?,
                None => {
                    tracing::error!(
                        metadata = ?metadata,
                        "Cannot determine user: no userId in metadata and no payer email"
                    );
                    return Err(BillingError::IdentityUnresolved(
                        "no userId in metadata and no payer email".to_string(),
                    ));
                }
            },
        };

        let order = self.find_order(session).await?;
        if order.is_none() {
            tracing::warn!(
                user_id = %user_id,
                checkout_id = ?session.checkout_id,
                "No order matched this payment, continuing without order update"
            );
        }

        Ok(ResolvedIdentity {
            user_id,
            user_created,
            order,
        })
    }

    async fn find_or_create_user(
        &self,
        email: &str,
        session: &PaymentSession,
    ) -> BillingResult<(String, bool)> {
        if let Some(user) = self.store.find_user_by_email(email).await? {
            tracing::info!(user_id = %user.id, "Found user by payer email");
            return Ok((user.id, false));
        }

        let name = session
            .payment_info
            .as_ref()
            .and_then(|p| p.payment_user_name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email_local_part(email).to_string());

        let inserted = self
            .store
            .insert_user(NewUser {
                id: soloboard_shared::models::new_id(),
                email: email.to_string(),
                name,
                password_hash: None,
                email_verified: false,
                plan_type: PlanTier::Free,
            })
            .await;

        match inserted {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Created user for unmatched payer email");
                Ok((user.id, true))
            }
            Err(BillingError::DuplicateUser(_)) => {
                let user = self.store.find_user_by_email(email).await?.ok_or_else(|| {
                    BillingError::Internal(format!(
                        "user {} reported as duplicate but not found",
                        email
                    ))
                })?;
                tracing::info!(
                    user_id = %user.id,
                    "Payer email created concurrently, using existing user"
                );
                Ok((user.id, false))
            }
            Err(e) => Err(e),
        }
    }

    /// `orderId`, then `order_no`, then the provider checkout/transaction id.
    async fn find_order(&self, session: &PaymentSession) -> BillingResult<Option<Order>> {
        let metadata = &session.metadata;

        if let Some(order_id) = metadata.order_id() {
            if let Some(order) = self.store.find_order(&order_id).await? {
                return Ok(Some(order));
            }
        }

        if let Some(order_no) = metadata.order_no() {
            if let Some(order) = self.store.find_order_by_no(&order_no).await? {
                return Ok(Some(order));
            }
        }

        let transaction_id = session
            .payment_info
            .as_ref()
            .and_then(|p| p.transaction_id.clone());
        for reference in [session.checkout_id.clone(), transaction_id]
            .into_iter()
            .flatten()
        {
            if let Some(order) = self.store.find_order_by_provider_ref(&reference).await? {
                return Ok(Some(order));
            }
        }

        Ok(None)
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Metadata, PaymentInfo};
    use crate::memory::InMemoryBillingStore;
    use serde_json::json;

    fn session_with(meta: serde_json::Value, email: Option<&str>) -> PaymentSession {
        PaymentSession {
            payment_info: Some(PaymentInfo {
                amount: 1990,
                currency: "USD".into(),
                payment_email: email.map(str::to_string),
                ..Default::default()
            }),
            metadata: serde_json::from_value::<Metadata>(meta).unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn metadata_user_id_wins() {
        let store = InMemoryBillingStore::new();
        let resolver = IdentityResolver::new(&store);
        let resolved = resolver
            .resolve(&session_with(json!({"userId": "u1"}), Some("x@example.com")))
            .await
            .unwrap();
        assert_eq!(resolved.user_id, "u1");
        assert!(!resolved.user_created);
        assert!(store.all_users().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_email_creates_free_user_named_after_local_part() {
        let store = InMemoryBillingStore::new();
        let resolver = IdentityResolver::new(&store);
        let resolved = resolver
            .resolve(&session_with(json!({}), Some("jane.doe@example.com")))
            .await
            .unwrap();
        assert!(resolved.user_created);

        let users = store.all_users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "jane.doe");
        assert_eq!(users[0].plan_type, PlanTier::Free);
        assert!(!users[0].email_verified);
        assert!(users[0].password_hash.is_none());
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = InMemoryBillingStore::new();
        let resolver = IdentityResolver::new(&store);
        let first = resolver
            .resolve(&session_with(json!({}), Some("Buyer@Example.com")))
            .await
            .unwrap();
        let second = resolver
            .resolve(&session_with(json!({}), Some("buyer@example.com")))
            .await
            .unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert!(!second.user_created);
    }

    #[tokio::test]
    async fn concurrent_creation_falls_back_to_existing_user() {
        let store = InMemoryBillingStore::new();
        let now = time::OffsetDateTime::now_utc();
        store
            .seed_user_after_next_lookup(soloboard_shared::User {
                id: "u_first".into(),
                email: "race@example.com".into(),
                name: "race".into(),
                password_hash: None,
                email_verified: false,
                plan_type: PlanTier::Free,
                created_at: now,
                updated_at: now,
            })
            .await;

        let resolved = IdentityResolver::new(&store)
            .resolve(&session_with(json!({}), Some("Race@Example.com")))
            .await
            .unwrap();
        assert_eq!(resolved.user_id, "u_first");
        assert!(!resolved.user_created);
        assert_eq!(store.all_users().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_insert_differs_only_in_case() {
        let store = InMemoryBillingStore::new();
        let new_user = |id: &str, email: &str| NewUser {
            id: id.to_string(),
            email: email.to_string(),
            name: id.to_string(),
            password_hash: None,
            email_verified: false,
            plan_type: PlanTier::Free,
        };
        store.insert_user(new_user("u1", "Owner@example.com")).await.unwrap();
        let err = store
            .insert_user(new_user("u2", "owner@EXAMPLE.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::DuplicateUser(_)));
    }

    #[tokio::test]
    async fn no_user_id_and_no_email_is_fatal() {
        let store = InMemoryBillingStore::new();
        let resolver = IdentityResolver::new(&store);
        let err = resolver
            .resolve(&session_with(json!({"orderId": "o1"}), None))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::IdentityUnresolved(_)));
    }

    #[test]
    fn local_part() {
        assert_eq!(email_local_part("a@b.c"), "a");
        assert_eq!(email_local_part("nodomain"), "nodomain");
    }
}
