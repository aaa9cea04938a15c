//! End-to-end throughput benchmark for Huddle.
//!
//! Connects N clients to one room of a running server and measures how many
//! fanned-out messages they receive per second.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
};

const SERVER_URL: &str = "ws://127.0.0.1:8080/ws/chat?room_id=benchmark";
const USER_HEADER: &str = "x-user-id";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("Huddle end-to-end throughput benchmark");
    println!("Make sure the server is running: cargo run --release --bin huddle");
    println!();

    run_room_benchmark(num_clients).await;
}

async fn run_room_benchmark(num_clients: usize) {
    println!("Room benchmark: {} clients", num_clients);
    println!("  Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);

    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let msg_count = Arc::clone(&message_count);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_client(client_id, msg_count, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        }));
    }

    // Wait for all clients to connect
    barrier.wait().await;
    println!("All {} clients connected", num_clients);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    // Reset counter and start measurement
    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);
    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();

    println!();
    println!("Clients:        {:>10}", num_clients);
    println!("Duration:       {:>10.2}s", elapsed.as_secs_f64());
    println!("Total messages: {:>10}", total_messages);
    println!("Throughput:     {:>10.0} msg/s", msgs_per_sec);
    println!("Per client:     {:>10.0} msg/s", msgs_per_sec / num_clients as f64);

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    client_id: usize,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut request = SERVER_URL.into_client_request()?;
    request
        .headers_mut()
        .insert(USER_HEADER, format!("bench-{client_id}").parse()?);

    let (ws, _) = connect_async(request).await?;
    let (mut sender, mut receiver) = ws.split();

    // Own join announcement confirms registration
    receiver.next().await;

    barrier.wait().await;

    let frame = Message::Text(serde_json::json!({ "content": "x".repeat(64) }).to_string());

    let recv_count = Arc::clone(&message_count);
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            if let Ok(Message::Text(_)) = result {
                recv_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    // A client whose queue overflows is evicted; its send fails and it stops.
    loop {
        if sender.send(frame.clone()).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
