//! Seam to the external subscription-payment collaborator.
//!
//! Payment processing itself happens elsewhere; this crate only models
//! the handshake the server needs: ask for a checkout session, hand the
//! client secret to the caller. The rest of the workspace never talks
//! to a payment provider directly.

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    /// Secret the front end needs to complete payment. `None` when the
    /// subscription is already active and no payment is due.
    pub client_secret: Option<String>,
    pub subscription_id: String,
}

#[async_trait]
pub trait SubscriptionCheckout: Send + Sync {
    /// Returns an existing subscription's session, or creates a fresh
    /// checkout for the user.
    async fn get_or_create_subscription(
        &self,
        user_id: i64,
        email: &str,
    ) -> anyhow::Result<CheckoutSession>;
}

/// Fails closed when no payment collaborator is configured.
pub struct MissingSubscriptionCheckout;

#[async_trait]
impl SubscriptionCheckout for MissingSubscriptionCheckout {
    async fn get_or_create_subscription(
        &self,
        user_id: i64,
        _email: &str,
    ) -> anyhow::Result<CheckoutSession> {
        Err(anyhow!(
            "no payment collaborator configured; cannot start checkout for user {user_id}"
        ))
    }
}

/// Development and test stand-in: mints deterministic subscription ids
/// and random client secrets without touching any payment network.
pub struct OfflineCheckout;

#[async_trait]
impl SubscriptionCheckout for OfflineCheckout {
    async fn get_or_create_subscription(
        &self,
        user_id: i64,
        _email: &str,
    ) -> anyhow::Result<CheckoutSession> {
        Ok(CheckoutSession {
            client_secret: Some(format!("cs_offline_{}", Uuid::new_v4().simple())),
            subscription_id: format!("sub_offline_{user_id}"),
        })
    }
}
