//! Integration tests for the oleg-store crate.
//!
//! These tests drive the store and quota tracker through their public API
//! only, the way the bot pipeline uses them.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use oleg_store::{
    Message, QuotaConfig, QuotaOutcome, QuotaTracker, SlidingWindowStore, StoreConfig,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
//  Sliding windows
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn window_is_bounded_after_many_appends() {
    let store = SlidingWindowStore::new(StoreConfig {
        window_size: 50,
        max_chats: 10,
    })
    .unwrap();

    for id in 0..120 {
        store
            .append(Message::new(id, -100, 1, format!("m{id}"), at(id)))
            .await;
    }

    let window = store.window(-100).await;
    assert_eq!(window.len(), 50);
    assert_eq!(window.first().unwrap().id, 70);
    assert_eq!(window.last().unwrap().id, 119);
    assert!(window.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn bot_replies_are_kept_alongside_human_messages() {
    let store = SlidingWindowStore::new(StoreConfig::default()).unwrap();
    store
        .append(Message::new(1, 5, 42, "hey @oleg_bot", at(0)).with_mention(true))
        .await;
    store
        .append(Message::bot_reply(2, 5, 999, "hey yourself", at(1)))
        .await;
    store
        .append(Message::new(3, 5, 42, "ha", at(2)).with_reply_to(2, true))
        .await;

    let window = store.window(5).await;
    assert_eq!(window.len(), 3);
    assert!(window[0].is_addressed());
    assert!(window[1].from_bot);
    assert_eq!(window[2].reply_to_message_id, Some(2));
}

#[tokio::test]
async fn chat_budget_is_enforced_across_many_chats() {
    let store = Arc::new(
        SlidingWindowStore::new(StoreConfig {
            window_size: 3,
            max_chats: 16,
        })
        .unwrap(),
    );

    for chat_id in 0..100 {
        store
            .append(Message::new(chat_id, chat_id, 1, "x", at(chat_id)))
            .await;
    }

    assert_eq!(store.chat_count(), 16);
    // The sixteen most recently active chats survive.
    assert!(store.window(83).await.is_empty());
    assert_eq!(store.window(84).await.len(), 1);
    assert_eq!(store.window(99).await.len(), 1);
}

#[tokio::test]
async fn idle_sweep_keeps_recent_chats() {
    let store = SlidingWindowStore::new(StoreConfig::default()).unwrap();
    store.append(Message::new(1, 1, 1, "old", at(0))).await;
    store
        .append(Message::new(2, 2, 1, "fresh", at(86_000)))
        .await;

    let purged = store.purge_inactive(Duration::hours(24), at(90_000));
    assert_eq!(purged, 1);
    assert_eq!(store.chat_count(), 1);
}

// ═══════════════════════════════════════════════════════════════════════
//  Quota
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn quota_ratio_recovers_after_quiet_period() {
    let quota = QuotaTracker::new(QuotaConfig {
        window: Duration::seconds(3600),
        max_events: 1000,
    })
    .unwrap();

    for n in 0..10 {
        quota.record(QuotaOutcome::Replied, at(n));
    }
    assert!((quota.ratio(at(10)) - 1.0).abs() < 1e-9);

    quota.record(QuotaOutcome::Ignored, at(4000));
    assert_eq!(quota.ratio(at(4000)), 0.0);

    let snap = quota.snapshot(at(4000));
    assert_eq!(snap.total_replies, 10);
    assert_eq!(snap.total_eligible, 11);
    assert!(snap.to_string().contains("replies=10"));
}
