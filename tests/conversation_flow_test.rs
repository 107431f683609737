//! Conversation engine tests
//!
//! Drives whole conversations through the engine with an in-memory sink and
//! a fixed clock.

mod helpers;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use blueberry::models::record::{FlowKind, LogDay, SleepLog, WaterIntake};
use blueberry::state::{ConversationEngine, EngineResult, MemoryRecordSink, RecordSink, SessionPhase, SessionStore};
use helpers::*;

#[tokio::test]
async fn test_sleep_happy_path() {
    let ctx = TestContext::new();

    assert_matches!(ctx.send(0, "/sleep").await, EngineResult::Prompt(p) if p.contains("22-23"));
    assert_matches!(ctx.send(1, "22-23").await, EngineResult::Prompt(p) if p.contains("minute"));
    assert_matches!(ctx.send(2, "30").await, EngineResult::Prompt(p) if p.contains("notes"));

    let record = assert_matches!(ctx.send(3, "slept late").await, EngineResult::Completed(r) => r);
    assert_eq!(record.flow, FlowKind::Sleep);
    assert_eq!(record.user_id, USER);
    assert_eq!(record.event_time, at(3));
    assert_eq!(record.fields["hour_range"], json!([22, 23]));
    assert_eq!(record.fields["minute"], json!(30));
    assert_eq!(record.fields["notes"], json!("slept late"));

    assert!(ctx.store.get(USER).await.is_none());
    assert_eq!(ctx.sink.all().await, vec![record]);
}

#[tokio::test]
async fn test_invalid_answer_keeps_step() {
    let ctx = TestContext::new();
    ctx.script(&["/sleep", "22-23"]).await;

    let result = ctx.send(5, "75").await;
    assert_matches!(result, EngineResult::Reprompt { reason, prompt } => {
        assert!(reason.contains("between 0 and 59"));
        assert!(prompt.contains("minute"));
    });

    let session = ctx.store.get(USER).await.unwrap();
    assert_eq!(session.active().current_step, "minute");
    assert_eq!(session.active().attempts, 1);
    assert!(!session.active().collected_fields.contains_key("minute"));

    assert_matches!(ctx.send(6, "45").await, EngineResult::Prompt(_));
    let session = ctx.store.get(USER).await.unwrap();
    assert_eq!(session.active().current_step, "notes");
    assert_eq!(session.active().attempts, 0);
}

#[tokio::test]
async fn test_hour_range_out_of_order_is_rejected() {
    let ctx = TestContext::new();
    ctx.send(0, "/sleep").await;

    assert_matches!(ctx.send(1, "23-22").await, EngineResult::Reprompt { .. });
    assert_eq!(ctx.current_step().await, Some((FlowKind::Sleep, "hour_range".to_string())));

    assert_matches!(ctx.send(2, "7").await, EngineResult::Prompt(_));
    let session = ctx.store.get(USER).await.unwrap();
    assert_eq!(session.root().collected_fields["hour_range"], json!([7, 7]));
}

#[tokio::test]
async fn test_skip_leaves_notes_empty() {
    let ctx = TestContext::new();
    let result = ctx.script(&["/sleep", "1 2", "5", "/skip"]).await;

    let record = assert_matches!(result, EngineResult::Completed(r) => r);
    assert_eq!(record.fields["notes"], json!(""));
    assert_matches!(SleepLog::from_record(&record).unwrap(), SleepLog::Quick { hour_range: (1, 2), minute: 5, .. });
}

#[tokio::test]
async fn test_nested_flows_return_to_parent() {
    let ctx = TestContext::new();

    let opening = assert_matches!(ctx.send(0, "/wakesleep").await, EngineResult::Prompt(p) => p);
    assert!(opening.contains("sleep cycle"));
    assert!(opening.contains("wake up"));
    assert_eq!(ctx.current_step().await, Some((FlowKind::WakeTime, "hour".to_string())));
    assert_eq!(ctx.store.get(USER).await.unwrap().depth(), 2);

    ctx.send(1, "7").await;
    let bedtime = assert_matches!(ctx.send(2, "0").await, EngineResult::Prompt(p) => p);
    assert!(bedtime.contains("fall asleep"));

    // The finished child is folded into the parent before the next child starts
    let session = ctx.store.get(USER).await.unwrap();
    assert_eq!(session.depth(), 2);
    assert_eq!(session.active().flow, FlowKind::SleepTime);
    assert_eq!(session.root().collected_fields["wake"], json!({"hour": 7, "minute": 0}));
    assert_eq!(session.root().current_step, "sleep");

    ctx.send(3, "23").await;
    assert_matches!(ctx.send(4, "15").await, EngineResult::Prompt(p) if p.contains("notes"));
    assert_eq!(ctx.current_step().await, Some((FlowKind::WakeSleep, "notes".to_string())));
    assert_eq!(ctx.store.get(USER).await.unwrap().depth(), 1);

    let record = assert_matches!(ctx.send(5, "skip").await, EngineResult::Completed(r) => r);
    assert_eq!(record.flow, FlowKind::WakeSleep);
    assert_matches!(SleepLog::from_record(&record).unwrap(), SleepLog::Cycle { sleep, wake, .. } => {
        assert_eq!(sleep.as_pair(), (23, 15));
        assert_eq!(wake.as_pair(), (7, 0));
    });
}

#[tokio::test]
async fn test_nested_flow_can_run_again_after_completing() {
    let ctx = TestContext::new();

    for (round, start) in [0i64, 100].into_iter().enumerate() {
        let script = ["/wakesleep", "7", "0", "23", "15", "skip"];
        let mut last = EngineResult::NoOp;
        for (i, text) in script.iter().enumerate() {
            last = ctx.send(start + i as i64, text).await;
        }
        let record = assert_matches!(last, EngineResult::Completed(r) => r);
        assert_eq!(record.flow, FlowKind::WakeSleep, "round {}", round);
        assert_eq!(record.event_time, at(start + 5));
        assert!(ctx.store.get(USER).await.is_none());
    }

    let stored = ctx.sink.all().await;
    assert_eq!(stored.len(), 2);
    assert_ne!(stored[0].id, stored[1].id);
    assert!(stored.iter().all(|r| r.fields["wake"] == json!({"hour": 7, "minute": 0})));
}

#[tokio::test]
async fn test_sleepcycle_alias_starts_wakesleep() {
    let ctx = TestContext::new();
    ctx.send(0, "/sleepcycle@blueberry_bot").await;
    assert_eq!(ctx.store.get(USER).await.unwrap().root_flow(), FlowKind::WakeSleep);
}

#[tokio::test]
async fn test_expiry_inside_nested_flow() {
    let ctx = TestContext::new();
    ctx.script(&["/wakesleep", "7"]).await;

    assert_matches!(ctx.send(700, "0").await, EngineResult::Expired { flow: FlowKind::WakeSleep });
    assert!(ctx.store.get(USER).await.is_none());
    assert!(ctx.sink.is_empty().await);

    // The message that found the session expired was consumed
    assert_matches!(ctx.send(701, "0").await, EngineResult::NoOp);
}

#[tokio::test]
async fn test_budget_boundary() {
    let ctx = TestContext::new();
    ctx.send(0, "/sleep").await;

    assert_matches!(ctx.send(600, "22-23").await, EngineResult::Prompt(_));
    assert_matches!(ctx.send(601, "30").await, EngineResult::Expired { flow: FlowKind::Sleep });
}

#[tokio::test]
async fn test_cancel_replace_and_resume() {
    let ctx = TestContext::new();
    assert_matches!(ctx.send(0, "/cancel").await, EngineResult::NoOp);

    ctx.script(&["/sleep", "22-23"]).await;
    assert_matches!(ctx.send(2, "/sleep").await, EngineResult::Resumed(p) if p.contains("minute"));
    assert_eq!(ctx.current_step().await, Some((FlowKind::Sleep, "minute".to_string())));

    assert_matches!(
        ctx.send(3, "/register").await,
        EngineResult::Replaced { cancelled: FlowKind::Sleep, prompt } if prompt.contains("name")
    );
    assert_eq!(ctx.current_step().await, Some((FlowKind::Register, "name".to_string())));

    assert_matches!(ctx.send(4, "/cancel").await, EngineResult::Cancelled { flow: FlowKind::Register });
    assert!(ctx.store.get(USER).await.is_none());
    assert_matches!(ctx.send(5, "/cancel").await, EngineResult::NoOp);
}

#[tokio::test]
async fn test_replacement_restarts_budget() {
    let ctx = TestContext::new();
    ctx.send(0, "/register").await;
    ctx.send(50, "/sleep").await;

    // Register's budget would have run out, the new sleep budget has not
    assert_matches!(ctx.send(200, "22-23").await, EngineResult::Prompt(_));
}

#[tokio::test]
async fn test_text_without_session_is_noop() {
    let ctx = TestContext::new();
    assert_matches!(ctx.send(0, "hello").await, EngineResult::NoOp);
    assert_matches!(ctx.send(1, "/unknown").await, EngineResult::NoOp);
    assert!(ctx.store.is_empty().await);
}

#[tokio::test]
async fn test_save_failure_keeps_session_and_retries() {
    let store = SessionStore::new();
    let sink = Arc::new(FlakySink::new(1));
    let engine = ConversationEngine::new(registry(), store.clone(), sink.clone());

    for (i, text) in ["/sleep", "22-23", "30"].iter().enumerate() {
        engine.handle_message_at(USER, text, at(i as i64)).await.unwrap();
    }

    let failed = engine.handle_message_at(USER, "late", at(3)).await.unwrap();
    assert_matches!(failed, EngineResult::SaveFailed { reason } if reason.contains("connection reset"));

    let session = store.get(USER).await.unwrap();
    let pending_id = assert_matches!(session.phase, SessionPhase::AwaitingCommit { record_id, .. } => record_id);

    let retried = engine.handle_message_at(USER, "again", at(20)).await.unwrap();
    let record = assert_matches!(retried, EngineResult::Completed(r) => r);
    assert_eq!(record.id, pending_id);
    assert_eq!(record.event_time, at(3));
    assert_eq!(record.fields["notes"], json!("late"));

    assert_eq!(sink.attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(sink.inner.len().await, 1);
    assert!(store.get(USER).await.is_none());
}

#[tokio::test]
async fn test_same_command_while_awaiting_commit_retries() {
    let store = SessionStore::new();
    let sink = Arc::new(FlakySink::new(1));
    let engine = ConversationEngine::new(registry(), store.clone(), sink.clone());

    for (i, text) in ["/sleep", "22-23", "30", "late"].iter().enumerate() {
        engine.handle_message_at(USER, text, at(i as i64)).await.unwrap();
    }

    let result = engine.handle_message_at(USER, "/sleep", at(10)).await.unwrap();
    assert_matches!(result, EngineResult::Completed(r) if r.flow == FlowKind::Sleep);
}

#[tokio::test]
async fn test_sweep_during_save_does_not_report_the_conversation() {
    let store = SessionStore::new();
    // Far past every budget: anything the sweeper can see gets reaped
    let sink = Arc::new(SweepDuringSave::new(store.clone(), at(100_000), 0));
    let engine = ConversationEngine::new(registry(), store.clone(), sink.clone());

    for (i, text) in ["/sleep", "22-23", "30"].iter().enumerate() {
        engine.handle_message_at(USER, text, at(i as i64)).await.unwrap();
    }
    let result = engine.handle_message_at(USER, "late", at(3)).await.unwrap();

    assert_matches!(result, EngineResult::Completed(r) if r.flow == FlowKind::Sleep);
    assert!(sink.swept.lock().await.is_empty());
    assert!(store.get(USER).await.is_none());
    assert_eq!(sink.inner.inner.len().await, 1);
}

#[tokio::test]
async fn test_failed_save_is_kept_even_if_the_sweeper_ran_meanwhile() {
    let store = SessionStore::new();
    let sink = Arc::new(SweepDuringSave::new(store.clone(), at(100_000), 1));
    let engine = ConversationEngine::new(registry(), store.clone(), sink.clone());

    for (i, text) in ["/sleep", "22-23", "30"].iter().enumerate() {
        engine.handle_message_at(USER, text, at(i as i64)).await.unwrap();
    }
    let result = engine.handle_message_at(USER, "late", at(3)).await.unwrap();

    assert_matches!(result, EngineResult::SaveFailed { .. });
    assert!(sink.swept.lock().await.is_empty());
    let session = store.get(USER).await.unwrap();
    assert_matches!(session.phase, SessionPhase::AwaitingCommit { .. });
}

#[tokio::test]
async fn test_second_registration_is_refused_and_dropped() {
    let ctx = TestContext::new();
    ctx.script(&["/register", "Ada", "ada@example.com"]).await;
    assert_eq!(ctx.sink.len().await, 1);

    ctx.send(10, "/Register").await;
    ctx.send(11, "Ada").await;
    let result = ctx.send(12, "ada@work.example").await;

    assert_matches!(result, EngineResult::Refused { flow: FlowKind::Register, reason } => {
        assert!(reason.contains("already registered"));
    });
    assert!(ctx.store.get(USER).await.is_none());
    assert_eq!(ctx.sink.len().await, 1);

    // Nothing is left waiting for a retry
    assert_matches!(ctx.send(13, "hello").await, EngineResult::NoOp);
}

#[tokio::test]
async fn test_water_intake_is_logged() {
    let ctx = TestContext::new();

    assert_matches!(ctx.send(0, "/water").await, EngineResult::Prompt(p) if p.contains("today or yesterday"));
    assert_matches!(ctx.send(1, "tomorrow").await, EngineResult::Reprompt { .. });
    ctx.send(2, "Yesterday").await;
    ctx.send(3, "21").await;
    assert_matches!(ctx.send(4, "45").await, EngineResult::Prompt(p) if p.contains("How much"));
    assert_matches!(ctx.send(5, "a bucket").await, EngineResult::Reprompt { .. });
    ctx.send(6, "2 glasses").await;

    let record = assert_matches!(ctx.send(7, "/skip").await, EngineResult::Completed(r) => r);
    assert_eq!(record.flow, FlowKind::Water);
    let water = WaterIntake::from_record(&record).unwrap();
    assert_eq!(water.day, LogDay::Yesterday);
    assert_eq!((water.hour, water.minute), (21, 45));
    assert_eq!(water.amount_ml, 500);
    assert!(water.notes.is_empty());
}

#[tokio::test]
async fn test_thought_is_saved_in_one_message() {
    let ctx = TestContext::new();

    ctx.send(0, "/thought").await;
    assert_matches!(ctx.send(1, "   ").await, EngineResult::Reprompt { .. });
    let record = assert_matches!(
        ctx.send(2, "Good day.\nLong walk by the river.").await,
        EngineResult::Completed(r) => r
    );
    assert_eq!(record.flow, FlowKind::Thought);
    assert_eq!(record.fields["content"], json!("Good day.\nLong walk by the river."));

    let journal = ctx.sink.list_recent_of(USER, &[FlowKind::Thought], 5).await.unwrap();
    assert_eq!(journal.len(), 1);
}

#[tokio::test]
async fn test_conflicting_email_is_asked_again() {
    let store = SessionStore::new();
    let sink = MemoryRecordSink::new();
    let engine = ConversationEngine::new(registry(), store.clone(), Arc::new(sink.clone()));

    for text in ["/register", "Ada", "ada@example.com"] {
        engine.handle_message_at(1, text, at(0)).await.unwrap();
    }
    assert_eq!(sink.len().await, 1);

    engine.handle_message_at(2, "/register", at(0)).await.unwrap();
    engine.handle_message_at(2, "Grace", at(1)).await.unwrap();
    let result = engine.handle_message_at(2, "ADA@example.com", at(2)).await.unwrap();
    assert_matches!(result, EngineResult::Reprompt { reason, prompt } => {
        assert!(reason.contains("already registered"));
        assert!(prompt.contains("Grace"));
    });

    let session = store.get(2).await.unwrap();
    assert_eq!(session.phase, SessionPhase::Collecting);
    assert_eq!(session.active().current_step, "email");
    assert_eq!(session.active().attempts, 1);
    assert_eq!(session.root().collected_fields["name"], json!("Grace"));
    assert!(!session.root().collected_fields.contains_key("email"));

    let record = assert_matches!(
        engine.handle_message_at(2, "grace@example.com", at(3)).await.unwrap(),
        EngineResult::Completed(r) => r
    );
    assert_eq!(record.fields["email"], json!("grace@example.com"));
    assert_eq!(sink.len().await, 2);
}

#[tokio::test]
async fn test_single_zone_country_skips_zone_question() {
    let ctx = TestContext::new();
    ctx.send(0, "/set_timezone").await;

    assert_matches!(ctx.send(1, "India").await, EngineResult::Prompt(p) if p.contains("Since when"));
    assert_eq!(ctx.current_step().await, Some((FlowKind::SetTimezone, "effective_from".to_string())));

    let record = assert_matches!(ctx.send(2, "today").await, EngineResult::Completed(r) => r);
    assert_eq!(record.fields["country"], json!("india"));
    assert_eq!(record.fields["timezone_name"], json!("Asia/Kolkata"));
    assert_eq!(record.fields["timezone_offset"], json!("+5:30"));
    assert_eq!(record.fields["effective_from"], json!("today"));
}

#[tokio::test]
async fn test_multi_zone_country_asks_for_zone() {
    let ctx = TestContext::new();
    ctx.send(0, "/set_timezone").await;

    assert_matches!(ctx.send(1, "United States").await, EngineResult::Prompt(p) => {
        assert!(p.contains("Eastern"));
        assert!(p.contains("America/Chicago"));
    });
    assert_matches!(ctx.send(2, "Europe/London").await, EngineResult::Reprompt { .. });
    assert_matches!(ctx.send(3, "central").await, EngineResult::Prompt(_));

    let record = assert_matches!(ctx.send(4, "yesterday").await, EngineResult::Completed(r) => r);
    assert_eq!(record.fields["timezone_name"], json!("America/Chicago"));
    assert_eq!(record.fields["timezone_offset"], json!("-6:00"));
}

#[tokio::test]
async fn test_history_is_capped_and_newest_first() {
    let ctx = TestContext::new();

    for night in 0..7i64 {
        let start = night * 1000;
        for (i, text) in ["/sleep", "22-23", "30", "skip"].iter().enumerate() {
            ctx.send(start + i as i64, text).await;
        }
    }
    ctx.script(&["/set_timezone", "uk", "today"]).await;

    let recent = ctx.sink.list_recent_of(USER, FlowKind::sleep_logs(), 5).await.unwrap();
    assert_eq!(recent.len(), 5);
    assert!(recent.iter().all(|r| r.flow == FlowKind::Sleep));
    assert!(recent.windows(2).all(|w| w[0].event_time >= w[1].event_time));
    assert_eq!(recent[0].event_time, at(6003));

    let everything = ctx.sink.list_recent(USER, 100).await.unwrap();
    assert_eq!(everything.len(), 8);
}

#[tokio::test]
async fn test_sweeper_reaps_abandoned_conversations() {
    use blueberry::state::SessionSweeper;
    use chrono::{Duration, Utc};

    let ctx = TestContext::new();
    let long_ago = Utc::now() - Duration::seconds(700);
    ctx.engine.handle_message_at(USER, "/wakesleep", long_ago).await.unwrap();
    ctx.engine.handle_message_at(USER + 1, "/sleep", Utc::now()).await.unwrap();

    let mut sweeper = SessionSweeper::new(ctx.store.clone(), std::time::Duration::from_millis(10));
    let mut expired = sweeper.start();

    let session = tokio::time::timeout(std::time::Duration::from_secs(2), expired.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.user_id, USER);
    assert_eq!(session.root_flow(), FlowKind::WakeSleep);

    assert!(!ctx.store.contains(USER).await);
    assert!(ctx.store.contains(USER + 1).await);
    sweeper.stop();

    // Nothing left to expire: the next message is simply ignored
    assert_matches!(ctx.engine.handle_message(USER, "7").await.unwrap(), EngineResult::NoOp);
}
