//! Integration tests for database operations.

mod common;

use common::setup_db;
use tweet_archive_bot::db::{
    count_processed_content, get_all_conversations, get_conversation, get_mention_log_entry,
    get_processed_content, get_processed_content_record, get_unread_conversations,
    has_replied_to_mention, log_mention, mark_conversation_read, put_processed_content,
    set_our_last_message_id, upsert_conversation, ConversationUpsert, Database,
};

fn conversation(id: &str, last_id: &str, timestamp: &str, unread: bool) -> ConversationUpsert {
    ConversationUpsert {
        conversation_id: id.to_string(),
        last_message_id: last_id.to_string(),
        last_message_timestamp: timestamp.to_string(),
        our_last_message_id: "0".to_string(),
        sender_id: "1".to_string(),
        sender_screen_name: "alice".to_string(),
        recipient_id: "999".to_string(),
        recipient_screen_name: "archivebot".to_string(),
        has_unread_messages: unread,
    }
}

#[tokio::test]
async fn test_processed_content_first_write_wins() {
    let (db, _temp_dir) = setup_db().await;

    assert!(get_processed_content(db.pool(), "100").await.unwrap().is_none());

    assert!(put_processed_content(db.pool(), "100", "bafyfirst").await.unwrap());
    assert!(!put_processed_content(db.pool(), "100", "bafysecond").await.unwrap());

    assert_eq!(
        get_processed_content(db.pool(), "100").await.unwrap().as_deref(),
        Some("bafyfirst")
    );
    assert_eq!(count_processed_content(db.pool()).await.unwrap(), 1);

    let record = get_processed_content_record(db.pool(), "100")
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.storage_cid, "bafyfirst");
    assert!(!record.processed_at.is_empty());
}

#[tokio::test]
async fn test_mention_log() {
    let (db, _temp_dir) = setup_db().await;

    assert!(!has_replied_to_mention(db.pool(), "m1").await.unwrap());

    log_mention(db.pool(), "m1", "bob", Some("2024-05-01T12:00:00Z"))
        .await
        .unwrap();
    // A second log of the same mention is ignored.
    log_mention(db.pool(), "m1", "someone-else", None).await.unwrap();

    assert!(has_replied_to_mention(db.pool(), "m1").await.unwrap());
    let entry = get_mention_log_entry(db.pool(), "m1").await.unwrap().unwrap();
    assert_eq!(entry.author_username, "bob");
    assert_eq!(entry.mention_timestamp.as_deref(), Some("2024-05-01T12:00:00Z"));
}

#[tokio::test]
async fn test_upsert_conversation_overwrites_all_fields() {
    let (db, _temp_dir) = setup_db().await;

    upsert_conversation(db.pool(), &conversation("c1", "10", "2024-01-01T00:00:00Z", true))
        .await
        .unwrap();

    let mut update = conversation("c1", "20", "2024-01-02T00:00:00Z", false);
    update.our_last_message_id = "20".to_string();
    update.sender_id = "999".to_string();
    update.sender_screen_name = "archivebot".to_string();
    upsert_conversation(db.pool(), &update).await.unwrap();

    let stored = get_conversation(db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(stored.last_message_id, "20");
    assert_eq!(stored.our_last_message_id, "20");
    assert_eq!(stored.sender_id.as_deref(), Some("999"));
    assert_eq!(stored.sender_screen_name.as_deref(), Some("archivebot"));
    assert!(!stored.has_unread_messages);
    assert_eq!(get_all_conversations(db.pool()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unread_conversations_newest_first() {
    let (db, _temp_dir) = setup_db().await;

    for (id, ts, unread) in [
        ("old", "2024-01-01T00:00:00Z", true),
        ("read", "2024-01-03T00:00:00Z", false),
        ("new", "2024-01-02T00:00:00Z", true),
    ] {
        upsert_conversation(db.pool(), &conversation(id, "1", ts, unread))
            .await
            .unwrap();
    }

    let unread: Vec<_> = get_unread_conversations(db.pool())
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.conversation_id)
        .collect();
    assert_eq!(unread, vec!["new", "old"]);

    let all: Vec<_> = get_all_conversations(db.pool())
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.conversation_id)
        .collect();
    assert_eq!(all, vec!["read", "new", "old"]);
}

#[tokio::test]
async fn test_mark_read_and_advance_our_last_message() {
    let (db, _temp_dir) = setup_db().await;

    upsert_conversation(db.pool(), &conversation("c1", "10", "2024-01-01T00:00:00Z", true))
        .await
        .unwrap();

    mark_conversation_read(db.pool(), "c1").await.unwrap();
    set_our_last_message_id(db.pool(), "c1", "11").await.unwrap();

    let stored = get_conversation(db.pool(), "c1").await.unwrap().unwrap();
    assert!(!stored.has_unread_messages);
    assert_eq!(stored.our_last_message_id, "11");
    assert_eq!(stored.last_message_id, "10");
    assert!(get_unread_conversations(db.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_new_conversation_defaults_our_last_message() {
    let (db, _temp_dir) = setup_db().await;

    upsert_conversation(db.pool(), &conversation("c1", "10", "2024-01-01T00:00:00Z", true))
        .await
        .unwrap();

    let stored = get_conversation(db.pool(), "c1").await.unwrap().unwrap();
    assert_eq!(stored.our_last_message_id, "0");
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let (db, temp_dir) = setup_db().await;
    put_processed_content(db.pool(), "100", "bafy").await.unwrap();
    log_mention(db.pool(), "m1", "bob", None).await.unwrap();
    db.close().await;

    let reopened = Database::new(&temp_dir.path().join("test.sqlite"))
        .await
        .expect("Failed to reopen database");

    assert_eq!(
        get_processed_content(reopened.pool(), "100").await.unwrap().as_deref(),
        Some("bafy")
    );
    assert!(has_replied_to_mention(reopened.pool(), "m1").await.unwrap());
}
