use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, EntryId, Mood, UserId};

/// Body of `GET /api/{domain}/can-use`. A 401 status stands in for the
/// unauthenticated case; this payload only exists on 2xx.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanUseResponse {
    pub can_use: bool,
    pub usage_count: i64,
    pub is_subscribed: bool,
}

/// Body of a successful `POST /api/{domain}/use`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecorded {
    pub usage_count: i64,
    pub is_subscribed: bool,
}

/// 403 body of the use endpoint when the free quota ran out between the
/// gate check and the recording call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaExceededBody {
    pub needs_subscription: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Absent when the subscription is already active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub subscription_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistoryEntry {
    pub domain: Domain,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatsResponse {
    /// Total recorded sessions across all tools.
    pub usage: i64,
    pub is_subscribed: bool,
    pub history: Vec<UsageHistoryEntry>,
    pub emotion_usage: i64,
    pub allergy_usage: i64,
    pub belief_usage: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntryPayload {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of journal create and update requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEntryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalListResponse {
    pub entries: Vec<JournalEntryPayload>,
    pub total_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalExportResponse {
    pub export_date: DateTime<Utc>,
    pub total_entries: i64,
    pub entries: Vec<JournalEntryPayload>,
}
