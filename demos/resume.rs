//! Crash-safe resume demo.
//!
//! Simulates a script that dies halfway through on its first run. Run it
//! again: the completed steps replay from the log and only the remaining
//! work executes.
//!
//! ```sh
//! cargo run --example resume          # fails after step 2
//! cargo run --example resume -- done  # resumes, replays steps 1-2
//! ```

use anyhow::Result;
use retrace::{opaque, Arg, Tracker, TrackerConfig, Value};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let finish = std::env::args().nth(1).as_deref() == Some("done");
    let config = TrackerConfig::default().with_verbose(true);
    let tracker = Tracker::open(config).await?;

    let mut fetch = tracker.track_sync("fetch", |args: Vec<Value>| {
        let source = args[0].as_str().unwrap_or("").to_string();
        println!("fetching {source} (expensive)...");
        Ok(Value::Map(vec![
            ("source".to_string(), Value::from(source)),
            ("rows".to_string(), Value::from(128i64)),
            // Request ids differ per run; keep them out of the log
            ("request_id".to_string(), Value::Opaque),
        ]))
    });

    let mut summarize = tracker.track_sync("summarize", |args: Vec<Value>| {
        let rows = args[0].as_i64().unwrap_or(0);
        println!("summarizing {rows} rows (expensive)...");
        Ok(Value::from(format!("{rows} rows summarized")))
    });

    // The run timestamp changes every invocation; passed opaque so it
    // never causes a divergence.
    let started_at = chrono::Utc::now().to_rfc3339();

    let report = fetch
        .call(vec![Arg::plain("s3://bucket/data"), opaque(started_at)])
        .await?;
    let rows = report.get("rows").and_then(Value::as_i64).unwrap_or(0);
    let summary = summarize.call(vec![Arg::plain(rows)]).await?;
    println!("{summary}");

    if !finish {
        anyhow::bail!("simulated crash before the final step; run again with `done`");
    }

    let mut publish = tracker.track_sync("publish", |args: Vec<Value>| {
        let summary = args[0].as_str().unwrap_or("").to_string();
        println!("publishing: {summary}");
        Ok(Value::from(true))
    });
    publish.call(vec![Arg::plain(summary)]).await?;

    println!("pipeline complete");
    tracker.close().await;
    Ok(())
}
