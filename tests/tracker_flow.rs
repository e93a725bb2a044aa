//! Engine behavior within a single session: execution order, wrappers,
//! opaque values, injected failures, and lifecycle errors.

use std::sync::Arc;

use retrace::{opaque, Arg, CallError, Database, Tracker, TrackerConfig, Value};
use tokio::sync::Mutex;

async fn memory_tracker() -> Tracker {
    let db = Database::open_in_memory().unwrap();
    let tracker = Tracker::new(db, TrackerConfig::default());
    tracker.init().await.unwrap();
    tracker
}

#[tokio::test]
async fn basic_functionality_and_execution_order() {
    let tracker = memory_tracker().await;
    let mut doubled = tracker.track_sync("double", |args: Vec<Value>| {
        Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
    });

    let result = doubled.call(vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(10));
    assert!(!tracker.was_last_call_from_db().await);

    // Same arguments again, but a new position in the sequence
    let result = doubled.call(vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(10));
    assert!(!tracker.was_last_call_from_db().await);

    let result = doubled.call(vec![Arg::plain(7i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(14));
    assert!(!tracker.was_last_call_from_db().await);

    let result = doubled.call(vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(10));
    assert!(!tracker.was_last_call_from_db().await);

    tracker.fail_next(|| anyhow::anyhow!("test error")).await;
    let err = doubled.call(vec![Arg::plain(5i64)]).await.unwrap_err();
    assert!(matches!(err, CallError::Injected(_)));
    assert!(err.to_string().contains("test error"));

    // The call after the failure succeeds normally
    let result = doubled.call(vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(10));
    assert!(!tracker.was_last_call_from_db().await);

    // The failed call consumed number 4 without recording anything
    assert_eq!(tracker.history().await, vec![0, 1, 2, 3, 5]);
}

#[tokio::test]
async fn injected_failure_skips_store_and_function() {
    let tracker = memory_tracker().await;
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = calls.clone();
    let mut step = tracker.track_sync("step", move |args: Vec<Value>| {
        seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(args[0].clone())
    });

    step.call(vec![Arg::plain(1i64)]).await.unwrap();
    let history_before = tracker.history().await;

    tracker.fail_next(|| anyhow::anyhow!("boom")).await;
    let err = step.call(vec![Arg::plain(2i64)]).await.unwrap_err();
    assert!(matches!(err, CallError::Injected(_)));

    // Function never ran, store never touched
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(tracker.history().await, history_before);

    // Arming is one-shot: the next call is a normal fresh execution
    let result = step.call(vec![Arg::plain(3i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(3));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn track_method_reads_receiver_at_call_time() {
    let tracker = memory_tracker().await;
    struct Counter {
        base: i64,
    }
    let receiver = Arc::new(Mutex::new(Counter { base: 10 }));

    let mut add = tracker.track_method(
        "add",
        receiver.clone(),
        |receiver: Arc<Mutex<Counter>>, args: Vec<Value>| async move {
            let counter = receiver.lock().await;
            Ok(Value::from(counter.base + args[0].as_i64().unwrap_or(0)))
        },
    );

    let result = add.call(vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(15));

    // Mutating the receiver is visible to later (fresh) calls
    receiver.lock().await.base = 100;
    let result = add.call(vec![Arg::plain(7i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(107));
}

#[tokio::test]
async fn track_object_shares_one_call_counter() {
    let tracker = memory_tracker().await;
    let mut calculator = tracker
        .track_object()
        .method_sync("add", |args: Vec<Value>| {
            Ok(Value::from(10 + args[0].as_i64().unwrap_or(0)))
        })
        .method_sync("mul", |args: Vec<Value>| {
            Ok(Value::from(10 * args[0].as_i64().unwrap_or(0)))
        })
        .build();

    let result = calculator.call("add", vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(15));

    let result = calculator.call("mul", vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(50));

    let result = calculator.call("add", vec![Arg::plain(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(15));

    // Three calls, one shared sequence
    assert_eq!(tracker.history().await, vec![0, 1, 2]);

    let err = calculator
        .call("missing", vec![Arg::plain(1i64)])
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::UnknownMethod(name) if name == "missing"));
}

#[tokio::test]
async fn opaque_arguments_never_cause_divergence() {
    let tracker = memory_tracker().await;
    let mut doubled = tracker.track_sync("double", |args: Vec<Value>| {
        Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
    });

    // Record two calls with plain arguments
    doubled.call(vec![Arg::plain(5i64)]).await.unwrap();
    doubled.call(vec![Arg::plain(5i64)]).await.unwrap();

    // Replay the same positions with opaque arguments of any value
    tracker.init().await.unwrap();
    let result = doubled.call(vec![opaque(999i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(10));
    assert!(tracker.was_last_call_from_db().await);

    let result = doubled.call(vec![opaque(5i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(10));
    assert!(tracker.was_last_call_from_db().await);

    assert_eq!(tracker.history().await, vec![0, 1]);
}

#[tokio::test]
async fn opaque_argument_is_unwrapped_for_the_function() {
    let tracker = memory_tracker().await;
    let mut echo = tracker.track_sync("echo", |args: Vec<Value>| Ok(args[0].clone()));

    // The function sees the real value even though it is exempt from
    // comparison
    let result = echo.call(vec![opaque("secret")]).await.unwrap();
    assert_eq!(result.as_str(), Some("secret"));
}

#[tokio::test]
async fn opaque_result_fields_survive_replay_as_markers() {
    let tracker = memory_tracker().await;
    let mut submit = tracker.track_sync("submit", |_args: Vec<Value>| {
        Ok(Value::Map(vec![
            ("status".to_string(), Value::from("ok")),
            ("request_id".to_string(), Value::Opaque),
        ]))
    });

    let fresh = submit.call(vec![Arg::plain(1i64)]).await.unwrap();
    assert_eq!(fresh.get("status").and_then(Value::as_str), Some("ok"));
    assert!(fresh.get("request_id").is_some_and(Value::is_opaque));

    // Replay: non-opaque fields unchanged, opaque field still a marker
    tracker.init().await.unwrap();
    let replayed = submit.call(vec![Arg::plain(1i64)]).await.unwrap();
    assert!(tracker.was_last_call_from_db().await);
    assert_eq!(replayed, fresh);
}

#[tokio::test]
async fn manual_truncate_discards_from_counter_forward() {
    let tracker = memory_tracker().await;
    let mut step = tracker.track_sync("step", |args: Vec<Value>| Ok(args[0].clone()));

    for n in 0..4i64 {
        step.call(vec![Arg::plain(n)]).await.unwrap();
    }
    assert_eq!(tracker.history().await, vec![0, 1, 2, 3]);

    // Replay two calls, then cut the rest off
    tracker.init().await.unwrap();
    step.call(vec![Arg::plain(0i64)]).await.unwrap();
    step.call(vec![Arg::plain(1i64)]).await.unwrap();
    tracker.truncate().await.unwrap();

    assert_eq!(tracker.history().await, vec![0, 1]);
}

#[tokio::test]
async fn calls_before_init_fail() {
    let db = Database::open_in_memory().unwrap();
    let tracker = Tracker::new(db, TrackerConfig::default());
    let mut step = tracker.track_sync("step", |args: Vec<Value>| Ok(args[0].clone()));

    let err = step.call(vec![Arg::plain(1i64)]).await.unwrap_err();
    assert!(matches!(err, CallError::NotInitialized));
}

#[tokio::test]
async fn calls_after_close_fail() {
    let tracker = memory_tracker().await;
    let mut step = tracker.track_sync("step", |args: Vec<Value>| Ok(args[0].clone()));

    step.call(vec![Arg::plain(1i64)]).await.unwrap();
    tracker.close().await;

    let err = step.call(vec![Arg::plain(1i64)]).await.unwrap_err();
    assert!(matches!(err, CallError::NotInitialized));

    let err = tracker.truncate().await.unwrap_err();
    assert!(matches!(err, CallError::NotInitialized));
}

#[tokio::test]
async fn function_errors_propagate_and_record_nothing() {
    let tracker = memory_tracker().await;
    let mut flaky = tracker.track_sync("flaky", |args: Vec<Value>| {
        if args[0].as_bool().unwrap_or(false) {
            Err(CallError::Function(anyhow::anyhow!("downstream failed")))
        } else {
            Ok(Value::from("fine"))
        }
    });

    let err = flaky.call(vec![Arg::plain(true)]).await.unwrap_err();
    assert!(matches!(err, CallError::Function(_)));
    assert!(err.to_string().contains("downstream failed"));

    // The failed call consumed number 0 but recorded nothing
    assert!(tracker.history().await.is_empty());

    // The next call takes number 1 and records normally
    let result = flaky.call(vec![Arg::plain(false)]).await.unwrap();
    assert_eq!(result.as_str(), Some("fine"));
    assert_eq!(tracker.history().await, vec![1]);
}

#[tokio::test]
async fn async_functions_are_tracked() {
    let tracker = memory_tracker().await;
    let mut slow = tracker.track("slow", |args: Vec<Value>| async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok(Value::from(args[0].as_i64().unwrap_or(0) + 1))
    });

    let result = slow.call(vec![Arg::plain(41i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(42));

    tracker.init().await.unwrap();
    let result = slow.call(vec![Arg::plain(41i64)]).await.unwrap();
    assert_eq!(result.as_i64(), Some(42));
    assert!(tracker.was_last_call_from_db().await);
}
