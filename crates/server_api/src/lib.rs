use std::sync::Arc;

use billing::SubscriptionCheckout;
use chrono::Utc;
use shared::{
    domain::{Domain, EntryId, UserId},
    error::ApiError,
    protocol::{
        CanUseResponse, CheckoutResponse, JournalEntryPayload, JournalExportResponse,
        JournalListResponse, SaveEntryRequest, UsageHistoryEntry, UsageRecorded,
        UsageStatsResponse, UserProfile,
    },
};
use storage::{JournalEntryDraft, Storage, StoredJournalEntry};
use tracing::info;

pub mod auth;

pub use auth::AuthConfig;

/// Free sessions granted per decoder tool before a subscription is
/// required.
pub const FREE_SESSION_QUOTA: i64 = 3;

/// Hard cap on journal entries per user.
pub const MAX_JOURNAL_ENTRIES: i64 = 200;

const USAGE_HISTORY_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub checkout: Arc<dyn SubscriptionCheckout>,
    pub auth: AuthConfig,
}

/// Gate check behind `GET /api/{domain}/can-use`. The quota lives
/// here, server-side; clients only reflect the verdict.
pub async fn can_use(
    ctx: &ApiContext,
    user_id: UserId,
    domain: Domain,
) -> Result<CanUseResponse, ApiError> {
    let is_subscribed = ctx.storage.is_subscribed(user_id).await.map_err(internal)?;
    let usage_count = ctx
        .storage
        .usage_count(user_id, domain)
        .await
        .map_err(internal)?;
    Ok(CanUseResponse {
        can_use: is_subscribed || usage_count < FREE_SESSION_QUOTA,
        usage_count,
        is_subscribed,
    })
}

/// Records one session behind `POST /api/{domain}/use`. Re-checks the
/// quota so a client racing past its gate check gets the 403 instead
/// of a free ride.
pub async fn record_usage(
    ctx: &ApiContext,
    user_id: UserId,
    domain: Domain,
    item_label: &str,
) -> Result<UsageRecorded, ApiError> {
    let item_label = item_label.trim();
    if item_label.is_empty() {
        return Err(ApiError::validation(format!(
            "{} must not be empty",
            domain.item_field()
        )));
    }

    let is_subscribed = ctx.storage.is_subscribed(user_id).await.map_err(internal)?;
    let usage_count = ctx
        .storage
        .usage_count(user_id, domain)
        .await
        .map_err(internal)?;
    if !is_subscribed && usage_count >= FREE_SESSION_QUOTA {
        return Err(ApiError::quota_exceeded(format!(
            "free {} quota exhausted",
            domain.title()
        )));
    }

    ctx.storage
        .record_usage(user_id, domain, item_label)
        .await
        .map_err(internal)?;
    info!(domain = domain.slug(), item_label, "session recorded");
    Ok(UsageRecorded {
        usage_count: usage_count + 1,
        is_subscribed,
    })
}

pub async fn usage_stats(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<UsageStatsResponse, ApiError> {
    let is_subscribed = ctx.storage.is_subscribed(user_id).await.map_err(internal)?;
    let usage = ctx.storage.total_usage(user_id).await.map_err(internal)?;
    let mut per_domain = [0_i64; 3];
    for (slot, domain) in Domain::ALL.into_iter().enumerate() {
        per_domain[slot] = ctx
            .storage
            .usage_count(user_id, domain)
            .await
            .map_err(internal)?;
    }
    let history = ctx
        .storage
        .usage_history(user_id, USAGE_HISTORY_LIMIT)
        .await
        .map_err(internal)?
        .into_iter()
        .map(|event| UsageHistoryEntry {
            domain: event.domain,
            label: event.item_label,
            timestamp: event.created_at,
        })
        .collect();

    Ok(UsageStatsResponse {
        usage,
        is_subscribed,
        history,
        emotion_usage: per_domain[0],
        allergy_usage: per_domain[1],
        belief_usage: per_domain[2],
    })
}

pub async fn user_profile(ctx: &ApiContext, user_id: UserId) -> Result<UserProfile, ApiError> {
    let user = ctx
        .storage
        .user_profile(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(UserProfile {
        id: user.user_id,
        email: user.email,
        first_name: user.first_name,
        created_at: user.created_at,
    })
}

/// `POST /api/get-or-create-subscription`. An already-active
/// subscription yields no client secret; nothing is due.
pub async fn get_or_create_subscription(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<CheckoutResponse, ApiError> {
    if let Some(subscription_id) = ctx
        .storage
        .subscription_id_for_user(user_id)
        .await
        .map_err(internal)?
    {
        return Ok(CheckoutResponse {
            client_secret: None,
            subscription_id,
        });
    }

    let user = ctx
        .storage
        .user_profile(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    let session = ctx
        .checkout
        .get_or_create_subscription(user_id.0, &user.email)
        .await
        .map_err(|e| ApiError::internal(format!("checkout failed: {e}")))?;
    Ok(CheckoutResponse {
        client_secret: session.client_secret,
        subscription_id: session.subscription_id,
    })
}

pub async fn create_journal_entry(
    ctx: &ApiContext,
    user_id: UserId,
    request: SaveEntryRequest,
) -> Result<JournalEntryPayload, ApiError> {
    let draft = validated_draft(request)?;
    let count = ctx
        .storage
        .journal_entry_count(user_id)
        .await
        .map_err(internal)?;
    if count >= MAX_JOURNAL_ENTRIES {
        return Err(ApiError::validation(format!(
            "journal is full ({MAX_JOURNAL_ENTRIES} entries)"
        )));
    }

    let entry_id = ctx
        .storage
        .insert_journal_entry(user_id, &draft)
        .await
        .map_err(internal)?;
    get_journal_entry(ctx, user_id, entry_id).await
}

pub async fn list_journal_entries(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<JournalListResponse, ApiError> {
    let entries = ctx
        .storage
        .list_journal_entries(user_id)
        .await
        .map_err(internal)?;
    let total_count = entries.len() as i64;
    Ok(JournalListResponse {
        entries: entries.into_iter().map(entry_payload).collect(),
        total_count,
    })
}

pub async fn get_journal_entry(
    ctx: &ApiContext,
    user_id: UserId,
    entry_id: EntryId,
) -> Result<JournalEntryPayload, ApiError> {
    let entry = ctx
        .storage
        .journal_entry(user_id, entry_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("journal entry not found"))?;
    Ok(entry_payload(entry))
}

pub async fn update_journal_entry(
    ctx: &ApiContext,
    user_id: UserId,
    entry_id: EntryId,
    request: SaveEntryRequest,
) -> Result<JournalEntryPayload, ApiError> {
    let draft = validated_draft(request)?;
    let updated = ctx
        .storage
        .update_journal_entry(user_id, entry_id, &draft)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::not_found("journal entry not found"));
    }
    get_journal_entry(ctx, user_id, entry_id).await
}

pub async fn delete_journal_entry(
    ctx: &ApiContext,
    user_id: UserId,
    entry_id: EntryId,
) -> Result<(), ApiError> {
    let deleted = ctx
        .storage
        .delete_journal_entry(user_id, entry_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ApiError::not_found("journal entry not found"));
    }
    Ok(())
}

pub async fn journal_export(
    ctx: &ApiContext,
    user_id: UserId,
) -> Result<JournalExportResponse, ApiError> {
    let entries = ctx
        .storage
        .list_journal_entries(user_id)
        .await
        .map_err(internal)?;
    Ok(JournalExportResponse {
        export_date: Utc::now(),
        total_entries: entries.len() as i64,
        entries: entries.into_iter().map(entry_payload).collect(),
    })
}

fn validated_draft(request: SaveEntryRequest) -> Result<JournalEntryDraft, ApiError> {
    let content = request.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::validation("journal content must not be empty"));
    }
    Ok(JournalEntryDraft {
        title: normalize_optional(request.title),
        content,
        mood: request.mood,
        tags: normalize_optional(request.tags),
    })
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn entry_payload(entry: StoredJournalEntry) -> JournalEntryPayload {
    JournalEntryPayload {
        id: entry.entry_id,
        title: entry.title,
        content: entry.content,
        mood: entry.mood,
        tags: entry.tags,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}
