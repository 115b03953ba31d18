use super::*;
use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use shared::domain::Mood;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

const EMOTION_CSV: &str = "Row,Emotion,Frequency,Chakra,Color,Support\n\
    Row 1,Shame,20,Root - Base of spine,Crimson,Grounding walk\n\
    Row 1,Guilt,30,Root - Base of spine,Crimson,Forgiveness letter\n\
    Row 4,Anger,150,Liver,Forest Green,Cool water\n";

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

fn client_for(base: &str) -> TempleClient {
    TempleClient::new(base)
        .expect("client")
        .with_session_token("test-token")
}

#[derive(Clone, Default)]
struct RecorderState {
    labels: Arc<Mutex<Vec<String>>>,
}

fn happy_router(state: RecorderState) -> Router {
    Router::new()
        .route(
            "/api/:domain/can-use",
            get(|| async {
                Json(json!({"canUse": true, "usageCount": 0, "isSubscribed": false}))
            }),
        )
        .route(
            "/api/:domain/use",
            post(
                |State(state): State<RecorderState>, Json(body): Json<serde_json::Value>| async move {
                    let label = body["emotion"].as_str().unwrap_or_default().to_string();
                    state.labels.lock().expect("lock").push(label);
                    Json(json!({"usageCount": 1, "isSubscribed": false}))
                },
            ),
        )
        .route(
            "/datasets/:file",
            get(|| async { EMOTION_CSV.to_string() }),
        )
        .with_state(state)
}

#[tokio::test]
async fn check_access_maps_401_to_needs_auth_exactly() {
    let router = Router::new().route(
        "/api/:domain/can-use",
        get(|| async { StatusCode::UNAUTHORIZED }),
    );
    let base = spawn_server(router).await;

    let access = client_for(&base)
        .check_access(Domain::Emotion)
        .await
        .expect("access state");
    assert!(access.needs_auth);
    assert!(!access.needs_subscription);
    assert!(!access.can_use);
    assert_eq!(access.usage_count, 0);
    assert!(!access.is_subscribed);
    assert_eq!(access.decision(), AccessDecision::NeedsAuth);
}

#[tokio::test]
async fn check_access_maps_can_use_false_to_needs_subscription() {
    let router = Router::new().route(
        "/api/:domain/can-use",
        get(|| async {
            Json(json!({"canUse": false, "usageCount": 3, "isSubscribed": false}))
        }),
    );
    let base = spawn_server(router).await;

    let access = client_for(&base)
        .check_access(Domain::Allergy)
        .await
        .expect("access state");
    assert!(!access.needs_auth);
    assert!(access.needs_subscription);
    assert_eq!(access.usage_count, 3);
    assert_eq!(access.decision(), AccessDecision::NeedsSubscription);
}

#[tokio::test]
async fn gate_failure_is_distinct_from_sign_in_and_retryable() {
    let router = Router::new().route(
        "/api/:domain/can-use",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let base = spawn_server(router).await;
    let client = client_for(&base);

    let err = client
        .check_access(Domain::Emotion)
        .await
        .expect_err("gate error");
    assert!(matches!(err, GateError::Status(500)));

    let mut shell = Shell::new(client);
    shell.open(Page::Decoder(Domain::Emotion)).await;
    assert!(matches!(
        shell.current(),
        PageView::RetryableError {
            page: Page::Decoder(Domain::Emotion)
        }
    ));
}

#[tokio::test]
async fn decoder_page_renders_two_column_catalog() {
    let base = spawn_server(happy_router(RecorderState::default())).await;
    let mut shell = Shell::new(client_for(&base));

    shell.open(Page::Decoder(Domain::Emotion)).await;
    let PageView::Catalog { domain, grid } = shell.current() else {
        panic!("expected catalog view, got {:?}", shell.current());
    };
    assert_eq!(*domain, Domain::Emotion);
    assert_eq!(grid.left.len(), 1);
    assert_eq!(grid.right.len(), 1);

    let row1 = &grid.left[0];
    assert_eq!(row1.bucket, Bucket::Row1);
    assert_eq!(row1.theme.title, "Foundation Emotions");
    assert_eq!(row1.tiles.len(), 2);
    assert_eq!(row1.tiles[0].label, "Shame");
    assert_eq!(row1.tiles[0].subtitle, "20 Hz");
    // The tile carries the parsed item, not re-parsed display text.
    assert_eq!(row1.tiles[0].item.location(), "Root - Base of spine");

    assert_eq!(grid.right[0].bucket, Bucket::Row4);
    assert!(shell.catalog_for(Domain::Emotion).is_some());
}

#[tokio::test]
async fn selecting_a_tile_records_usage_and_enters_the_ritual() {
    let state = RecorderState::default();
    let base = spawn_server(happy_router(state.clone())).await;
    let mut shell = Shell::new(client_for(&base));

    shell.open(Page::Decoder(Domain::Emotion)).await;
    let tile = match shell.current() {
        PageView::Catalog { grid, .. } => grid.right[0].tiles[0].clone(),
        other => panic!("expected catalog view, got {other:?}"),
    };

    shell.select_tile(tile).await;
    let PageView::Ritual { session } = shell.current() else {
        panic!("expected ritual view, got {:?}", shell.current());
    };
    assert_eq!(session.phase(), RitualPhase::Step(RitualStep::Intention));
    assert_eq!(session.item().label, "Anger");
    assert_eq!(
        state.labels.lock().expect("lock").as_slice(),
        ["Anger".to_string()]
    );
}

#[tokio::test]
async fn recorder_failure_never_blocks_the_ritual() {
    let router = Router::new()
        .route(
            "/api/:domain/can-use",
            get(|| async {
                Json(json!({"canUse": true, "usageCount": 0, "isSubscribed": false}))
            }),
        )
        .route(
            "/api/:domain/use",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route("/datasets/:file", get(|| async { EMOTION_CSV.to_string() }));
    let base = spawn_server(router).await;
    let mut shell = Shell::new(client_for(&base));

    shell.open(Page::Decoder(Domain::Emotion)).await;
    let tile = match shell.current() {
        PageView::Catalog { grid, .. } => grid.left[0].tiles[0].clone(),
        other => panic!("expected catalog view, got {other:?}"),
    };

    shell.select_tile(tile).await;
    assert!(matches!(shell.current(), PageView::Ritual { .. }));
}

#[tokio::test]
async fn quota_race_diverts_to_the_paywall_instead_of_the_ritual() {
    let router = Router::new()
        .route(
            "/api/:domain/can-use",
            get(|| async {
                Json(json!({"canUse": false, "usageCount": 3, "isSubscribed": false}))
            }),
        )
        .route(
            "/api/:domain/use",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"needsSubscription": true})),
                )
            }),
        )
        .route("/datasets/:file", get(|| async { EMOTION_CSV.to_string() }));
    let base = spawn_server(router).await;
    let mut shell = Shell::new(client_for(&base));

    // The gate said yes moments ago; the quota ran out in between.
    let tile = {
        let items = parse_catalog(Domain::Emotion, EMOTION_CSV);
        let grid = render_buckets(Domain::Emotion, &bucketize(&items));
        grid.left[0].tiles[0].clone()
    };
    shell.select_tile(tile).await;

    let PageView::UpgradeRequired {
        domain,
        usage_count,
    } = shell.current()
    else {
        panic!("expected paywall view, got {:?}", shell.current());
    };
    assert_eq!(*domain, Domain::Emotion);
    assert_eq!(*usage_count, 3);
}

#[tokio::test]
async fn unreachable_dataset_renders_an_empty_catalog() {
    let router = Router::new().route(
        "/api/:domain/can-use",
        get(|| async {
            Json(json!({"canUse": true, "usageCount": 0, "isSubscribed": false}))
        }),
    );
    let base = spawn_server(router).await;
    let client = client_for(&base);

    assert!(client.load_catalog(Domain::Belief).await.is_empty());

    let mut shell = Shell::new(client);
    shell.open(Page::Decoder(Domain::Belief)).await;
    let PageView::Catalog { grid, .. } = shell.current() else {
        panic!("expected catalog view, got {:?}", shell.current());
    };
    assert!(grid.left.is_empty());
    assert!(grid.right.is_empty());
}

#[tokio::test]
async fn empty_journal_content_is_rejected_before_any_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_handler = hits.clone();
    let router = Router::new().route(
        "/api/journal/entries",
        post(move || {
            let hits = hits_for_handler.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::CREATED
            }
        }),
    );
    let base = spawn_server(router).await;
    let client = client_for(&base);

    let err = client
        .create_journal_entry(&SaveEntryRequest {
            content: "   \n".to_string(),
            ..Default::default()
        })
        .await
        .expect_err("validation error");
    assert!(matches!(err, JournalError::EmptyContent));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn journal_401_maps_to_the_sign_in_view() {
    let router = Router::new().route(
        "/api/journal/entries",
        get(|| async { StatusCode::UNAUTHORIZED }),
    );
    let base = spawn_server(router).await;
    let mut shell = Shell::new(client_for(&base));

    shell.open(Page::Journal).await;
    assert!(matches!(
        shell.current(),
        PageView::SignInRequired {
            destination: Page::Journal
        }
    ));
}

#[tokio::test]
async fn saving_an_entry_refetches_the_whole_list() {
    let entry = json!({
        "id": "1f2e3d4c-5b6a-4789-9abc-def012345678",
        "content": "First reflection.",
        "mood": "peaceful",
        "createdAt": "2026-08-06T09:00:00Z",
        "updatedAt": "2026-08-06T09:00:00Z"
    });
    let list = json!({"entries": [entry.clone()], "totalCount": 1});
    let created = entry.clone();
    let router = Router::new().route(
        "/api/journal/entries",
        get(move || {
            let list = list.clone();
            async move { Json(list) }
        })
        .post(move || {
            let created = created.clone();
            async move { (StatusCode::CREATED, Json(created)) }
        }),
    );
    let base = spawn_server(router).await;
    let mut shell = Shell::new(client_for(&base));

    shell
        .save_journal_entry(&SaveEntryRequest {
            content: "First reflection.".to_string(),
            mood: Some(Mood::Peaceful),
            ..Default::default()
        })
        .await
        .expect("save");

    let PageView::Journal {
        entries,
        total_count,
    } = shell.current()
    else {
        panic!("expected journal view, got {:?}", shell.current());
    };
    assert_eq!(*total_count, 1);
    assert_eq!(entries[0].content, "First reflection.");
    assert_eq!(entries[0].mood, Some(Mood::Peaceful));
}

#[tokio::test]
async fn editing_routes_the_save_through_update() {
    let puts = Arc::new(AtomicUsize::new(0));
    let puts_for_handler = puts.clone();
    let entry = json!({
        "id": "1f2e3d4c-5b6a-4789-9abc-def012345678",
        "content": "Rewritten.",
        "createdAt": "2026-08-06T09:00:00Z",
        "updatedAt": "2026-08-06T10:00:00Z"
    });
    let updated = entry.clone();
    let list = json!({"entries": [entry], "totalCount": 1});
    let router = Router::new()
        .route(
            "/api/journal/entries",
            get(move || {
                let list = list.clone();
                async move { Json(list) }
            }),
        )
        .route(
            "/api/journal/entries/:id",
            put(move || {
                let updated = updated.clone();
                let puts = puts_for_handler.clone();
                async move {
                    puts.fetch_add(1, Ordering::SeqCst);
                    Json(updated)
                }
            }),
        );
    let base = spawn_server(router).await;
    let mut shell = Shell::new(client_for(&base));

    let entry_id = EntryId(
        "1f2e3d4c-5b6a-4789-9abc-def012345678"
            .parse()
            .expect("uuid"),
    );
    shell.begin_editing(entry_id);
    shell
        .save_journal_entry(&SaveEntryRequest {
            content: "Rewritten.".to_string(),
            ..Default::default()
        })
        .await
        .expect("save");

    assert_eq!(puts.load(Ordering::SeqCst), 1);
    assert_eq!(shell.editing_entry(), None);
    assert!(matches!(shell.current(), PageView::Journal { .. }));
}

#[tokio::test]
async fn membership_renders_with_zeroed_stats_when_stats_fail() {
    let router = Router::new()
        .route(
            "/api/auth/user",
            get(|| async {
                Json(json!({
                    "id": 7,
                    "email": "seeker@example.com",
                    "firstName": "Soraya",
                    "createdAt": "2026-01-01T00:00:00Z"
                }))
            }),
        )
        .route(
            "/api/usage/stats",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
    let base = spawn_server(router).await;
    let mut shell = Shell::new(client_for(&base));

    shell.open(Page::Membership).await;
    let PageView::Membership { profile, stats } = shell.current() else {
        panic!("expected membership view, got {:?}", shell.current());
    };
    assert_eq!(profile.email, "seeker@example.com");
    assert_eq!(stats.usage, 0);
    assert!(stats.history.is_empty());
}

#[tokio::test]
async fn stale_navigation_tickets_are_discarded() {
    let base = spawn_server(Router::new()).await;
    let mut shell = Shell::new(client_for(&base));

    let stale = shell.begin_navigation();
    let current = shell.begin_navigation();

    assert!(!shell.present(
        stale,
        PageView::RetryableError {
            page: Page::Journal
        }
    ));
    assert!(matches!(shell.current(), PageView::Home));

    assert!(shell.present(current, PageView::Home));
}

#[test]
fn free_sessions_remaining_floors_at_zero() {
    assert_eq!(free_sessions_remaining(0), 3);
    assert_eq!(free_sessions_remaining(2), 1);
    assert_eq!(free_sessions_remaining(3), 0);
    assert_eq!(free_sessions_remaining(9), 0);
}

#[test]
fn export_rendering_has_fixed_header_and_footer() {
    let export = JournalExportResponse {
        export_date: "2026-08-06T12:00:00Z".parse().expect("date"),
        total_entries: 1,
        entries: vec![JournalEntryPayload {
            id: EntryId(
                "1f2e3d4c-5b6a-4789-9abc-def012345678"
                    .parse()
                    .expect("uuid"),
            ),
            title: None,
            content: "A quiet morning.".to_string(),
            mood: Some(Mood::Grateful),
            tags: Some("stillness".to_string()),
            created_at: "2026-08-05T07:00:00Z".parse().expect("date"),
            updated_at: "2026-08-05T07:00:00Z".parse().expect("date"),
        }],
    };

    let text = render_journal_export(&export);
    assert!(text.starts_with("SoulArt Temple - Sacred Reflections Journal\n"));
    assert!(text.contains("Total Entries: 1"));
    assert!(text.contains("ENTRY: Untitled Entry"));
    assert!(text.contains("Mood: grateful"));
    assert!(text.contains("A quiet morning."));
    assert!(text.trim_end().ends_with("Generated by SoulArt Temple"));
}
