//! Staged pipeline demo.
//!
//! Run it twice: the first run executes every stage, the second replays
//! the recorded results instantly. Change an argument and every stage
//! from that point forward re-executes.
//!
//! ```sh
//! cargo run --example pipeline
//! ```

use std::time::Duration;

use anyhow::Result;
use retrace::{Arg, Tracker, TrackerConfig, Value};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = TrackerConfig::default().with_verbose(true);
    let tracker = Tracker::open(config).await?;

    let mut stage_one = tracker.track("stage_one", |args: Vec<Value>| async move {
        let x = args[0].as_i64().unwrap_or(0);
        println!("stage one processing {x}...");
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(Value::from(x * 2))
    });

    let mut stage_two = tracker.track("stage_two", |args: Vec<Value>| async move {
        let x = args[0].as_i64().unwrap_or(0);
        println!("stage two processing {x}...");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        Ok(Value::from(x + 10))
    });

    let mut stage_three = tracker.track("stage_three", |args: Vec<Value>| async move {
        let x = args[0].as_i64().unwrap_or(0);
        println!("stage three processing {x}...");
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(Value::from(x.to_string().repeat(3)))
    });

    println!("{}", stage_one.call(vec![Arg::plain(5i64)]).await?);
    println!("{}", stage_two.call(vec![Arg::plain(7i64)]).await?);
    println!("{}", stage_three.call(vec![Arg::plain(9i64)]).await?);
    // A repeated call is a new position in the sequence, so it runs again
    println!("{}", stage_one.call(vec![Arg::plain(5i64)]).await?);
    // Different arguments at a recorded position truncate and re-execute
    println!("{}", stage_two.call(vec![Arg::plain(8i64)]).await?);

    tracker.close().await;
    Ok(())
}
