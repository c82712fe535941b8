//! Follow a shared timeline with the simulated pipeline.
//!
//! Run with: cargo run --example simulated_session -- [seconds-behind]
//! Example: cargo run --example simulated_session -- 5

use playsync_client::{CallbackHandler, ChannelControlClient, ClientBuilder, ClientEvent, Snapshot};
use playsync_core::ClockTime;
use playsync_pipeline::{MediaPipeline, SimulatedPipeline};
use playsync_timing::wall_clock_ns;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let behind_secs: u64 = args.get(1).and_then(|v| v.parse().ok()).unwrap_or(5);

    let pipeline = Arc::new(SimulatedPipeline::new());
    pipeline.set_key_unit_interval(ClockTime::from_millis(500));
    pipeline.set_seek_completion_delay(Some(Duration::from_millis(50)));

    let (control, publisher) = ChannelControlClient::channel();
    let mut client = ClientBuilder::new()
        .pipeline(Arc::clone(&pipeline))
        .control_client(control)
        .event_handler(CallbackHandler::new(|event| match event {
            ClientEvent::Error(message) => eprintln!("error: {}", message),
            other => println!("event: {:?}", other),
        }))
        .build()?;

    client.start("127.0.0.1", 9000).await?;

    // Timeline that started a few seconds ago on the local clock
    let now = ClockTime::from_nanos(wall_clock_ns());
    let base_time = now.saturating_sub(ClockTime::from_secs(behind_secs));
    let snapshot = Snapshot::new("file:///media/demo.mp4")
        .with_base_time(base_time)
        .with_latency(ClockTime::from_millis(200))
        .with_clock("127.0.0.1", 9001);

    println!("Publishing timeline with base time {}", base_time);
    publisher.publish(snapshot.clone());
    tokio::time::sleep(Duration::from_millis(500)).await;

    if let Some(effective) = pipeline.base_time() {
        println!(
            "Pipeline base time {} (seeked {} into the stream)",
            effective,
            effective.saturating_sub(base_time)
        );
    }

    println!("Pausing");
    publisher.publish(snapshot.clone().with_paused(true));
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("Pipeline state: {}", pipeline.current_state());

    println!("Resuming");
    publisher.publish(snapshot.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("Pipeline state: {}", pipeline.current_state());

    println!("Stopping");
    publisher.publish(snapshot.with_stopped(true));
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.stop().await;
    println!("Pipeline state: {}", pipeline.current_state());

    Ok(())
}
