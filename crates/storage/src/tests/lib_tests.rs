use super::*;

async fn open_storage() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}/storage_test.db", dir.path().display());
    let storage = Storage::new(&url).await.expect("open storage");
    (dir, storage)
}

#[tokio::test]
async fn get_or_create_user_is_idempotent_per_email() {
    let (_dir, storage) = open_storage().await;

    let first = storage
        .get_or_create_user("seeker@example.com", Some("Soraya"))
        .await
        .expect("create user");
    let second = storage
        .get_or_create_user("Seeker@Example.com ", None)
        .await
        .expect("lookup user");
    assert_eq!(first, second);

    let profile = storage
        .user_profile(first)
        .await
        .expect("profile query")
        .expect("profile exists");
    assert_eq!(profile.email, "seeker@example.com");
    assert_eq!(profile.first_name.as_deref(), Some("Soraya"));
}

#[tokio::test]
async fn empty_email_is_rejected() {
    let (_dir, storage) = open_storage().await;
    assert!(storage.get_or_create_user("   ", None).await.is_err());
}

#[tokio::test]
async fn usage_counts_are_scoped_per_domain() {
    let (_dir, storage) = open_storage().await;
    let user = storage
        .get_or_create_user("seeker@example.com", None)
        .await
        .expect("user");

    for label in ["Anger", "Fear", "Grief"] {
        storage
            .record_usage(user, Domain::Emotion, label)
            .await
            .expect("record");
    }
    storage
        .record_usage(user, Domain::Allergy, "Milk")
        .await
        .expect("record");

    assert_eq!(
        storage.usage_count(user, Domain::Emotion).await.expect("count"),
        3
    );
    assert_eq!(
        storage.usage_count(user, Domain::Allergy).await.expect("count"),
        1
    );
    assert_eq!(
        storage.usage_count(user, Domain::Belief).await.expect("count"),
        0
    );
    assert_eq!(storage.total_usage(user).await.expect("total"), 4);
}

#[tokio::test]
async fn usage_history_is_most_recent_first_and_limited() {
    let (_dir, storage) = open_storage().await;
    let user = storage
        .get_or_create_user("seeker@example.com", None)
        .await
        .expect("user");

    for label in ["First", "Second", "Third"] {
        storage
            .record_usage(user, Domain::Belief, label)
            .await
            .expect("record");
    }

    let history = storage.usage_history(user, 2).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].item_label, "Third");
    assert_eq!(history[1].item_label, "Second");
    assert_eq!(history[0].domain, Domain::Belief);
}

#[tokio::test]
async fn subscription_flag_round_trips() {
    let (_dir, storage) = open_storage().await;
    let user = storage
        .get_or_create_user("seeker@example.com", None)
        .await
        .expect("user");

    assert!(!storage.is_subscribed(user).await.expect("flag"));
    storage
        .activate_subscription(user, "sub_123")
        .await
        .expect("activate");
    assert!(storage.is_subscribed(user).await.expect("flag"));
    assert_eq!(
        storage
            .subscription_id_for_user(user)
            .await
            .expect("subscription id"),
        Some("sub_123".to_string())
    );

    // Re-activation replaces the subscription id.
    storage
        .activate_subscription(user, "sub_456")
        .await
        .expect("re-activate");
    assert_eq!(
        storage
            .subscription_id_for_user(user)
            .await
            .expect("subscription id"),
        Some("sub_456".to_string())
    );
}

#[tokio::test]
async fn journal_entries_crud_is_scoped_to_owner() {
    let (_dir, storage) = open_storage().await;
    let alice = storage
        .get_or_create_user("alice@example.com", None)
        .await
        .expect("alice");
    let bob = storage
        .get_or_create_user("bob@example.com", None)
        .await
        .expect("bob");

    let draft = JournalEntryDraft {
        title: Some("Morning pages".to_string()),
        content: "Awoke with gratitude.".to_string(),
        mood: Some(Mood::Grateful),
        tags: Some("morning, ritual".to_string()),
    };
    let entry_id = storage
        .insert_journal_entry(alice, &draft)
        .await
        .expect("insert");

    let loaded = storage
        .journal_entry(alice, entry_id)
        .await
        .expect("query")
        .expect("entry exists");
    assert_eq!(loaded.content, "Awoke with gratitude.");
    assert_eq!(loaded.mood, Some(Mood::Grateful));

    // Other users cannot see, update, or delete the entry.
    assert!(storage
        .journal_entry(bob, entry_id)
        .await
        .expect("query")
        .is_none());
    let update = JournalEntryDraft {
        content: "hijacked".to_string(),
        ..Default::default()
    };
    assert!(!storage
        .update_journal_entry(bob, entry_id, &update)
        .await
        .expect("update"));
    assert!(!storage
        .delete_journal_entry(bob, entry_id)
        .await
        .expect("delete"));

    let update = JournalEntryDraft {
        title: None,
        content: "Rewritten at dusk.".to_string(),
        mood: None,
        tags: None,
    };
    assert!(storage
        .update_journal_entry(alice, entry_id, &update)
        .await
        .expect("update"));
    let loaded = storage
        .journal_entry(alice, entry_id)
        .await
        .expect("query")
        .expect("entry exists");
    assert_eq!(loaded.content, "Rewritten at dusk.");
    assert_eq!(loaded.mood, None);
    assert_eq!(loaded.title, None);

    assert_eq!(storage.journal_entry_count(alice).await.expect("count"), 1);
    assert!(storage
        .delete_journal_entry(alice, entry_id)
        .await
        .expect("delete"));
    assert_eq!(storage.journal_entry_count(alice).await.expect("count"), 0);
}

#[tokio::test]
async fn list_journal_entries_returns_newest_first() {
    let (_dir, storage) = open_storage().await;
    let user = storage
        .get_or_create_user("seeker@example.com", None)
        .await
        .expect("user");

    for content in ["one", "two", "three"] {
        let draft = JournalEntryDraft {
            content: content.to_string(),
            ..Default::default()
        };
        storage
            .insert_journal_entry(user, &draft)
            .await
            .expect("insert");
    }

    let entries = storage.list_journal_entries(user).await.expect("list");
    assert_eq!(entries.len(), 3);
    // Equal timestamps fall back to insertion order, newest first.
    let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["three", "two", "one"]);
}
