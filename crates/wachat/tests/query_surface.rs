use serde_json::json;
use wachat::models::{MessageRecord, MessageStatus};
use wachat::query::{
    self, DEFAULT_BUSINESS_PHONE, DEFAULT_BUSINESS_USER_NAME, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
    NewMessage, PageRequest, QueryError,
};
use wachat::relay::{Relay, RelayEvent};
use wachat::sqlite::MessageStore;

fn record(message_id: &str, wa_id: &str, user_name: &str, unix_seconds: u64) -> MessageRecord {
    MessageRecord {
        message_id: message_id.to_string(),
        meta_msg_id: Some(format!("meta-{message_id}")),
        wa_id: wa_id.to_string(),
        user_name: user_name.to_string(),
        message_body: format!("body of {message_id}"),
        timestamp_utc: format!("t{unix_seconds}"),
        timestamp_unix_ms: unix_seconds * 1_000,
        status: MessageStatus::Sent,
        message_type: "text".to_string(),
        from: wa_id.to_string(),
        conversation_id: format!("conv_{wa_id}"),
        payload_id: None,
        phone_number_id: None,
        display_phone_number: None,
        status_history: Vec::new(),
        created_at_utc: "2026-01-10T09:00:00Z".to_string(),
        updated_at_utc: "2026-01-10T09:00:00Z".to_string(),
    }
}

fn seeded_store() -> MessageStore {
    let mut store = MessageStore::open_in_memory().expect("store should open");
    for record in [
        record("m1", "919937320320", "Ravi Kumar", 100),
        record("m2", "919937320320", "Ravi Kumar", 300),
        record("m3", "929967673820", "Neha Joshi", 200),
    ] {
        store.insert_if_absent(&record).expect("insert should succeed");
    }
    store
}

#[test]
fn conversation_list_has_one_row_per_party_newest_first() {
    let conversations = query::list_conversations(&seeded_store()).expect("list should succeed");

    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].wa_id, "919937320320");
    assert_eq!(conversations[0].last_message, "body of m2");
    assert_eq!(conversations[0].message_count, 2);
    assert_eq!(conversations[1].wa_id, "929967673820");

    let encoded = serde_json::to_value(&conversations[0]).expect("row should serialize");
    assert_eq!(
        encoded,
        json!({
            "_id": "919937320320",
            "userName": "Ravi Kumar",
            "lastMessage": "body of m2",
            "lastMessageTime": "t300",
            "messageCount": 2
        })
    );
}

#[test]
fn all_messages_lists_every_party_oldest_first() {
    let messages = query::all_messages(&seeded_store()).expect("query should succeed");
    let ids: Vec<_> = messages.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m3", "m2"]);
}

#[test]
fn party_messages_are_oldest_first() {
    let messages =
        query::messages_for_party(&seeded_store(), "919937320320").expect("query should succeed");
    let ids: Vec<_> = messages.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[test]
fn processed_log_paginates_newest_first() {
    let store = seeded_store();

    let page = query::processed_log(
        &store,
        PageRequest {
            page: Some(2),
            limit: Some(2),
        },
    )
    .expect("page should load");
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].message_id, "m1");
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.total_pages, 2);

    let first = query::processed_log(&store, PageRequest::default()).expect("page should load");
    let ids: Vec<_> = first.data.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m3", "m1"]);
    assert_eq!(first.pagination.page, 1);
    assert_eq!(first.pagination.limit, DEFAULT_PAGE_LIMIT);
}

#[test]
fn page_request_normalizes_out_of_range_values() {
    let request = PageRequest {
        page: Some(0),
        limit: Some(10_000),
    };
    assert_eq!(request.normalized(), (1, MAX_PAGE_LIMIT));
    assert_eq!(
        PageRequest {
            page: None,
            limit: Some(0)
        }
        .normalized(),
        (1, DEFAULT_PAGE_LIMIT)
    );
}

#[test]
fn contact_reads_name_from_party_messages() {
    let store = seeded_store();
    let card = query::contact(&store, "929967673820").expect("contact should resolve");
    assert_eq!(
        serde_json::to_value(&card).expect("card should serialize"),
        json!({"name": "Neha Joshi", "phoneNumber": "929967673820", "isOnline": false})
    );

    let err = query::contact(&store, "000").expect_err("unknown party should fail");
    assert!(matches!(err, QueryError::ContactNotFound(_)));
}

#[test]
fn append_message_stores_business_reply_and_announces_it() {
    let mut store = seeded_store();
    let relay = Relay::default();
    let mut listener = relay.subscribe();

    let stored = query::append_message(
        &mut store,
        &relay,
        "929967673820",
        NewMessage {
            message_body: Some("Sure, sending details now.".to_string()),
            user_name: None,
        },
        DEFAULT_BUSINESS_PHONE,
    )
    .expect("append should succeed");

    assert!(stored.message_id.starts_with("msg_"));
    assert_eq!(stored.user_name, DEFAULT_BUSINESS_USER_NAME);
    assert_eq!(stored.from, DEFAULT_BUSINESS_PHONE);
    assert_eq!(stored.conversation_id, "conv_929967673820");
    assert_eq!(stored.status, MessageStatus::Sent);
    assert!(
        store
            .find_by_message_id(&stored.message_id)
            .expect("lookup should succeed")
            .is_some()
    );

    match listener.try_recv().expect("event should be queued") {
        RelayEvent::NewMessage(record) => assert_eq!(record.message_id, stored.message_id),
        other => panic!("expected newMessage, got {other:?}"),
    }
}

#[test]
fn append_message_rejects_blank_body() {
    let mut store = seeded_store();
    let err = query::append_message(
        &mut store,
        &Relay::default(),
        "929967673820",
        NewMessage {
            message_body: Some("   ".to_string()),
            user_name: None,
        },
        DEFAULT_BUSINESS_PHONE,
    )
    .expect_err("blank body should be rejected");
    assert!(matches!(err, QueryError::EmptyMessageBody));
    assert_eq!(store.count_messages().expect("count should succeed"), 3);
}

#[test]
fn status_update_matches_secondary_id() {
    let mut store = seeded_store();
    let updated = query::update_message_status(&mut store, &Relay::default(), "meta-m3", "read")
        .expect("update should succeed");
    assert_eq!(updated.message_id, "m3");
    assert_eq!(updated.status, MessageStatus::Read);
    assert_eq!(updated.status_history.len(), 1);
}

#[test]
fn invalid_status_is_rejected_before_touching_store() {
    let mut store = seeded_store();
    let err = query::update_message_status(&mut store, &Relay::default(), "m1", "seen")
        .expect_err("unknown status should be rejected");
    assert!(matches!(err, QueryError::InvalidStatus(ref raw) if raw == "seen"));
    assert_eq!(err.code(), "invalid_status");
    assert!(err.is_client_error());

    let record = store
        .find_by_message_id("m1")
        .expect("lookup should succeed")
        .expect("m1 should exist");
    assert_eq!(record.status, MessageStatus::Sent);
    assert!(record.status_history.is_empty());
}

#[test]
fn status_update_for_unknown_message_is_not_found() {
    let mut store = seeded_store();
    let err = query::update_message_status(&mut store, &Relay::default(), "missing", "read")
        .expect_err("unknown message should fail");
    assert!(matches!(err, QueryError::MessageNotFound(_)));
}

#[test]
fn bulk_update_reports_each_item() {
    let mut store = seeded_store();
    let body = json!({
        "updates": [
            {"messageId": "m1", "status": "delivered"},
            {"messageId": "missing", "status": "read"},
            {"messageId": "m2", "status": "bogus"},
            {"status": "read"},
            {"messageId": "meta-m3", "status": "read"}
        ]
    });

    let results = query::bulk_update_statuses(&mut store, &Relay::default(), &body)
        .expect("bulk update should run");

    let successes: Vec<_> = results.iter().map(|result| result.success).collect();
    assert_eq!(successes, vec![true, false, false, false, true]);
    assert!(
        results[1]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("message not found"))
    );
    assert!(
        results[3]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("messageId"))
    );
    assert_eq!(
        serde_json::to_value(&results[0]).expect("result should serialize"),
        json!({"messageId": "m1", "status": "delivered", "success": true})
    );

    let statuses: Vec<_> = ["m1", "m2", "m3"]
        .iter()
        .map(|id| {
            store
                .find_by_message_id(id)
                .expect("lookup should succeed")
                .expect("record should exist")
                .status
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            MessageStatus::Delivered,
            MessageStatus::Sent,
            MessageStatus::Read
        ]
    );
}

#[test]
fn bulk_update_without_updates_array_is_rejected() {
    let mut store = seeded_store();
    for body in [json!({}), json!({"updates": "m1"}), json!([])] {
        let err = query::bulk_update_statuses(&mut store, &Relay::default(), &body)
            .expect_err("malformed body should be rejected");
        assert!(matches!(err, QueryError::InvalidBulkPayload));
    }
}
