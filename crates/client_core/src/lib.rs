use std::collections::HashMap;

use catalog::{bucketize, parse_catalog, theme_for, Bucket, BucketTheme, CatalogItem};
use reqwest::{Client, StatusCode};
use shared::{
    domain::{AccessDecision, AccessState, Domain, EntryId},
    error::ApiError,
    protocol::{
        CanUseResponse, CheckoutResponse, JournalEntryPayload, JournalExportResponse,
        JournalListResponse, QuotaExceededBody, SaveEntryRequest, UsageRecorded,
        UsageStatsResponse, UserProfile,
    },
};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

pub mod ritual;

pub use ritual::{
    RitualPhase, RitualSession, RitualStep, DEFAULT_REPLACEMENT_WORD, PRESET_REPLACEMENT_WORDS,
};

/// Free sessions granted per tool before a subscription is required.
/// Enforcement is server-side; this constant only drives display copy.
pub const FREE_SESSION_QUOTA: i64 = 3;

pub fn free_sessions_remaining(used: i64) -> i64 {
    (FREE_SESSION_QUOTA - used).max(0)
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("access check request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("access check returned status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("free session quota exhausted")]
    QuotaExhausted,
    #[error("usage recording request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("usage recording returned status {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal content must not be empty")]
    EmptyContent,
    #[error("sign in required")]
    Unauthorized,
    #[error("journal request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("journal request returned status {0}: {1}")]
    Api(u16, String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

/// HTTP client for the temple backend. Holds the session token, if
/// any; everything else is per-call.
#[derive(Clone)]
pub struct TempleClient {
    http: Client,
    base: Url,
    session_token: Option<String>,
}

impl TempleClient {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            http: Client::new(),
            base: Url::parse(base_url)?,
            session_token: None,
        })
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn set_session_token(&mut self, token: Option<String>) {
        self.session_token = token;
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.get(self.endpoint(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorized(self.http.post(self.endpoint(path)))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// The access gate. 401 means sign in; any other failure is left
    /// to the caller to surface as a retryable error, distinct from
    /// the sign-in view.
    pub async fn check_access(&self, domain: Domain) -> Result<AccessState, GateError> {
        let response = self
            .get(&format!("/api/{}/can-use", domain.slug()))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(AccessState::unauthenticated());
        }
        if !response.status().is_success() {
            return Err(GateError::Status(response.status().as_u16()));
        }

        let verdict: CanUseResponse = response.json().await?;
        Ok(AccessState {
            needs_auth: false,
            needs_subscription: !verdict.can_use,
            can_use: verdict.can_use,
            usage_count: verdict.usage_count,
            is_subscribed: verdict.is_subscribed,
        })
    }

    /// Best-effort session recording. Only the quota signal changes
    /// what the caller does next; other failures are telemetry loss,
    /// not a reason to withhold content.
    pub async fn record_usage(
        &self,
        domain: Domain,
        label: &str,
    ) -> Result<UsageRecorded, UsageError> {
        let body = serde_json::json!({ (domain.item_field()): label });
        let response = self
            .post(&format!("/api/{}/use", domain.slug()))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            if let Ok(marker) = response.json::<QuotaExceededBody>().await {
                if marker.needs_subscription {
                    return Err(UsageError::QuotaExhausted);
                }
            }
            return Err(UsageError::Status(StatusCode::FORBIDDEN.as_u16()));
        }
        if !response.status().is_success() {
            return Err(UsageError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Loads a decoder dataset. Never fails: an unreachable or
    /// malformed dataset renders as an empty catalog.
    pub async fn load_catalog(&self, domain: Domain) -> Vec<CatalogItem> {
        let path = format!("/datasets/{}", domain.dataset_file());
        let text = match self.get(&path).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(domain = domain.slug(), %e, "failed to read dataset body");
                    return Vec::new();
                }
            },
            Ok(response) => {
                warn!(
                    domain = domain.slug(),
                    status = response.status().as_u16(),
                    "dataset fetch failed"
                );
                return Vec::new();
            }
            Err(e) => {
                warn!(domain = domain.slug(), %e, "dataset fetch failed");
                return Vec::new();
            }
        };
        parse_catalog(domain, &text)
    }

    /// `None` when the caller is not signed in.
    pub async fn fetch_user(&self) -> Result<Option<UserProfile>, ClientError> {
        let response = self.get("/api/auth/user").send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }
        Ok(Some(response.json().await?))
    }

    pub async fn usage_stats(&self) -> Result<UsageStatsResponse, ClientError> {
        let response = self.get("/api/usage/stats").send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    pub async fn subscribe(&self) -> Result<CheckoutResponse, ClientError> {
        let response = self.post("/api/get-or-create-subscription").send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    pub async fn list_journal_entries(&self) -> Result<JournalListResponse, JournalError> {
        let response = self.get("/api/journal/entries").send().await?;
        if !response.status().is_success() {
            return Err(journal_api_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Rejects blank content before any request leaves the client.
    pub async fn create_journal_entry(
        &self,
        request: &SaveEntryRequest,
    ) -> Result<JournalEntryPayload, JournalError> {
        ensure_content(request)?;
        let response = self.post("/api/journal/entries").json(request).send().await?;
        if !response.status().is_success() {
            return Err(journal_api_error(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn update_journal_entry(
        &self,
        entry_id: EntryId,
        request: &SaveEntryRequest,
    ) -> Result<JournalEntryPayload, JournalError> {
        ensure_content(request)?;
        let response = self
            .authorized(
                self.http
                    .put(self.endpoint(&format!("/api/journal/entries/{entry_id}"))),
            )
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(journal_api_error(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn get_journal_entry(
        &self,
        entry_id: EntryId,
    ) -> Result<JournalEntryPayload, JournalError> {
        let response = self
            .get(&format!("/api/journal/entries/{entry_id}"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(journal_api_error(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn delete_journal_entry(&self, entry_id: EntryId) -> Result<(), JournalError> {
        let response = self
            .authorized(
                self.http
                    .delete(self.endpoint(&format!("/api/journal/entries/{entry_id}"))),
            )
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(journal_api_error(response).await);
        }
        Ok(())
    }

    pub async fn download_journal(&self) -> Result<JournalExportResponse, JournalError> {
        let response = self.get("/api/journal/download").send().await?;
        if !response.status().is_success() {
            return Err(journal_api_error(response).await);
        }
        Ok(response.json().await?)
    }
}

fn ensure_content(request: &SaveEntryRequest) -> Result<(), JournalError> {
    if request.content.trim().is_empty() {
        return Err(JournalError::EmptyContent);
    }
    Ok(())
}

async fn journal_api_error(response: reqwest::Response) -> JournalError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return JournalError::Unauthorized;
    }
    let message = match response.json::<ApiError>().await {
        Ok(err) => err.message,
        Err(_) => status.to_string(),
    };
    JournalError::Api(status.as_u16(), message)
}

/// Plain-text rendering of a journal export, fixed header and footer
/// around one block per entry.
pub fn render_journal_export(export: &JournalExportResponse) -> String {
    let mut out = String::new();
    out.push_str("SoulArt Temple - Sacred Reflections Journal\n");
    out.push_str(&format!(
        "Export Date: {}\n",
        export.export_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("Total Entries: {}\n\n", export.total_entries));
    out.push_str(&"=".repeat(60));
    out.push_str("\n\n");

    for entry in &export.entries {
        out.push_str(&format!(
            "ENTRY: {}\n",
            entry.title.as_deref().unwrap_or("Untitled Entry")
        ));
        out.push_str(&format!(
            "Date: {}\n",
            entry.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!(
            "Mood: {}\n",
            entry.mood.map(|m| m.as_str()).unwrap_or("-")
        ));
        out.push_str(&format!("Tags: {}\n\n", entry.tags.as_deref().unwrap_or("-")));
        out.push_str(&entry.content);
        out.push_str("\n\n");
        out.push_str(&"-".repeat(40));
        out.push('\n');
    }

    out.push_str("\nEnd of Journal Export\nGenerated by SoulArt Temple\n");
    out
}

/// One interactive tile. Carries the full item so selection never
/// re-parses display text.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub label: String,
    pub subtitle: String,
    pub color: String,
    pub item: CatalogItem,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSection {
    pub bucket: Bucket,
    pub theme: BucketTheme,
    pub tiles: Vec<Tile>,
}

/// Two-column tile layout: buckets 1-3 left, 4-6 right, empty buckets
/// omitted, order fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    pub domain: Domain,
    pub left_title: &'static str,
    pub right_title: &'static str,
    pub left: Vec<BucketSection>,
    pub right: Vec<BucketSection>,
}

pub fn render_buckets(domain: Domain, grouped: &[Vec<CatalogItem>; 6]) -> TileGrid {
    let column = |buckets: &[Bucket]| -> Vec<BucketSection> {
        buckets
            .iter()
            .filter(|bucket| !grouped[bucket.index()].is_empty())
            .map(|bucket| {
                let theme = theme_for(domain, bucket.number());
                let tiles = grouped[bucket.index()]
                    .iter()
                    .map(|item| Tile {
                        label: item.label.clone(),
                        subtitle: item.subtitle(),
                        color: theme.color.clone(),
                        item: item.clone(),
                    })
                    .collect();
                BucketSection {
                    bucket: *bucket,
                    theme,
                    tiles,
                }
            })
            .collect()
    };

    let (left_title, right_title) = catalog::column_titles(domain);
    TileGrid {
        domain,
        left_title,
        right_title,
        left: column(&Bucket::LEFT),
        right: column(&Bucket::RIGHT),
    }
}

/// Navigation requests the shell understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Decoder(Domain),
    Journal,
    Membership,
}

/// The one current view. Exactly one of these is live at a time.
#[derive(Debug, Clone)]
pub enum PageView {
    Home,
    SignInRequired {
        destination: Page,
    },
    /// Gate or load failure; the user may retry the same navigation.
    RetryableError {
        page: Page,
    },
    UpgradeRequired {
        domain: Domain,
        usage_count: i64,
    },
    Catalog {
        domain: Domain,
        grid: TileGrid,
    },
    Ritual {
        session: RitualSession,
    },
    Journal {
        entries: Vec<JournalEntryPayload>,
        total_count: i64,
    },
    Membership {
        profile: UserProfile,
        stats: UsageStatsResponse,
    },
}

/// Session-scoped mutable slots: the per-domain catalogs and the
/// journal entry currently being edited. Created with the shell,
/// discarded with it.
#[derive(Default)]
pub struct SessionState {
    catalogs: HashMap<Domain, Vec<CatalogItem>>,
    editing_entry: Option<EntryId>,
}

/// Owns the current page and dispatches navigation. Every navigation
/// bumps an epoch; a view computed under an older epoch is discarded
/// instead of clobbering whatever the user moved on to.
pub struct Shell {
    client: TempleClient,
    state: SessionState,
    current: PageView,
    epoch: u64,
}

impl Shell {
    pub fn new(client: TempleClient) -> Self {
        Self {
            client,
            state: SessionState::default(),
            current: PageView::Home,
            epoch: 0,
        }
    }

    pub fn client(&self) -> &TempleClient {
        &self.client
    }

    pub fn current(&self) -> &PageView {
        &self.current
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Starts a navigation and returns its ticket.
    pub fn begin_navigation(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Commits a resolved view if its ticket is still current. Stale
    /// completions return false and change nothing.
    pub fn present(&mut self, ticket: u64, view: PageView) -> bool {
        if ticket != self.epoch {
            return false;
        }
        self.current = view;
        true
    }

    pub fn catalog_for(&self, domain: Domain) -> Option<&[CatalogItem]> {
        self.state.catalogs.get(&domain).map(Vec::as_slice)
    }

    pub fn editing_entry(&self) -> Option<EntryId> {
        self.state.editing_entry
    }

    pub fn begin_editing(&mut self, entry_id: EntryId) {
        self.state.editing_entry = Some(entry_id);
    }

    pub fn cancel_editing(&mut self) {
        self.state.editing_entry = None;
    }

    pub async fn open(&mut self, page: Page) {
        let ticket = self.begin_navigation();
        let view = self.resolve_page(page).await;
        self.present(ticket, view);
    }

    async fn resolve_page(&mut self, page: Page) -> PageView {
        match page {
            Page::Home => PageView::Home,
            Page::Decoder(domain) => self.resolve_decoder(domain).await,
            Page::Journal => self.resolve_journal().await,
            Page::Membership => self.resolve_membership().await,
        }
    }

    async fn resolve_decoder(&mut self, domain: Domain) -> PageView {
        let access = match self.client.check_access(domain).await {
            Ok(access) => access,
            Err(e) => {
                warn!(domain = domain.slug(), %e, "access check failed");
                return PageView::RetryableError {
                    page: Page::Decoder(domain),
                };
            }
        };

        match access.decision() {
            AccessDecision::NeedsAuth => PageView::SignInRequired {
                destination: Page::Decoder(domain),
            },
            AccessDecision::NeedsSubscription => PageView::UpgradeRequired {
                domain,
                usage_count: access.usage_count,
            },
            AccessDecision::Allowed => {
                let items = self.client.load_catalog(domain).await;
                let grid = render_buckets(domain, &bucketize(&items));
                self.state.catalogs.insert(domain, items);
                PageView::Catalog { domain, grid }
            }
        }
    }

    async fn resolve_journal(&mut self) -> PageView {
        match self.client.list_journal_entries().await {
            Ok(list) => PageView::Journal {
                entries: list.entries,
                total_count: list.total_count,
            },
            Err(JournalError::Unauthorized) => PageView::SignInRequired {
                destination: Page::Journal,
            },
            Err(e) => {
                warn!(%e, "journal load failed");
                PageView::RetryableError {
                    page: Page::Journal,
                }
            }
        }
    }

    async fn resolve_membership(&mut self) -> PageView {
        let profile = match self.client.fetch_user().await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return PageView::SignInRequired {
                    destination: Page::Membership,
                }
            }
            Err(e) => {
                warn!(%e, "profile load failed");
                return PageView::RetryableError {
                    page: Page::Membership,
                };
            }
        };

        // The dashboard renders with zeroed stats when the stats call
        // fails; the profile is the gating fetch.
        let stats = match self.client.usage_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(%e, "usage stats unavailable");
                UsageStatsResponse::default()
            }
        };

        PageView::Membership { profile, stats }
    }

    /// Tile click: record the session best-effort, then enter the
    /// ritual. Only the quota race diverts back to the gated page so
    /// the paywall shows.
    pub async fn select_tile(&mut self, tile: Tile) {
        let domain = tile.item.domain();
        let ticket = self.begin_navigation();

        match self.client.record_usage(domain, &tile.label).await {
            Ok(recorded) => {
                info!(
                    domain = domain.slug(),
                    label = %tile.label,
                    usage_count = recorded.usage_count,
                    "session recorded"
                );
            }
            Err(UsageError::QuotaExhausted) => {
                let view = self.resolve_decoder(domain).await;
                self.present(ticket, view);
                return;
            }
            Err(e) => {
                // Telemetry loss never blocks the healing content.
                warn!(domain = domain.slug(), %e, "usage recording failed");
            }
        }

        let session = RitualSession::new(domain, tile.item);
        self.present(ticket, PageView::Ritual { session });
    }

    pub fn ritual_mut(&mut self) -> Option<&mut RitualSession> {
        match &mut self.current {
            PageView::Ritual { session } => Some(session),
            _ => None,
        }
    }

    /// Discards the ritual session and re-enters the same domain's
    /// catalog. No step or chosen word survives.
    pub async fn return_to_catalog(&mut self) {
        let domain = match &self.current {
            PageView::Ritual { session } => session.domain(),
            _ => return,
        };
        self.open(Page::Decoder(domain)).await;
    }

    /// Saves the draft (create, or update when an entry is being
    /// edited) and refetches the whole list.
    pub async fn save_journal_entry(
        &mut self,
        request: &SaveEntryRequest,
    ) -> Result<(), JournalError> {
        match self.state.editing_entry {
            Some(entry_id) => {
                self.client.update_journal_entry(entry_id, request).await?;
            }
            None => {
                self.client.create_journal_entry(request).await?;
            }
        }
        self.state.editing_entry = None;
        self.open(Page::Journal).await;
        Ok(())
    }

    pub async fn delete_journal_entry(&mut self, entry_id: EntryId) -> Result<(), JournalError> {
        self.client.delete_journal_entry(entry_id).await?;
        if self.state.editing_entry == Some(entry_id) {
            self.state.editing_entry = None;
        }
        self.open(Page::Journal).await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/ritual_tests.rs"]
mod ritual_tests;
