//! Parallel replicas example
//!
//! Three in-process replicas of one shard answer a query together: each one
//! reads the share of rows it was assigned, the coordinator merges their
//! packets. A second query streams forever until it is cancelled from
//! another thread.
//!
//! # Running the Example
//!
//! ```bash
//! RUST_LOG=query_client=debug cargo run --example parallel_replicas
//! ```

use anyhow::Result;
use arrow::array::Int64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use query_client::{
    ChannelConnection, Connection, FixedPool, Packet, ParallelReplicas, PoolMode, Progress,
    QueryStage, ReplicaEndpoint, ReplicaRequest, ReplicaSettings, Throttler,
};
use std::sync::Arc;
use std::time::Duration;

fn batch(values: Vec<i64>) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    Ok(RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from(values))],
    )?)
}

/// Replica that answers with its share of `0..total`
fn spawn_replica(mut endpoint: ReplicaEndpoint, total: i64) {
    tokio::spawn(async move {
        while let Some(request) = endpoint.next_request().await {
            let query = match request {
                ReplicaRequest::Query(query) => query,
                ReplicaRequest::ExternalTables(_) => continue,
                ReplicaRequest::Cancel => break,
            };
            let (offset, count) = query
                .assignment
                .map(|a| (a.offset as i64, a.count as i64))
                .unwrap_or((0, 1));
            let share: Vec<i64> = (0..total).filter(|v| v % count == offset).collect();

            let progress = Progress {
                rows: share.len() as u64,
                bytes: share.len() as u64 * 8,
                total_rows: total as u64,
            };
            let packets = match batch(share) {
                Ok(block) => vec![Packet::Progress(progress), Packet::data(block), Packet::EndOfStream],
                Err(e) => vec![Packet::exception(1001, e.to_string())],
            };
            endpoint.send_all(packets);
        }
    });
}

/// Replica that streams a block every 50ms until cancelled
fn spawn_endless_replica(mut endpoint: ReplicaEndpoint) {
    tokio::spawn(async move {
        let mut streaming = false;
        let mut next = 0;
        loop {
            tokio::select! {
                request = endpoint.next_request() => match request {
                    Some(ReplicaRequest::Query(_)) => streaming = true,
                    Some(ReplicaRequest::Cancel) => {
                        endpoint.send(Packet::exception(394, "Query was cancelled"));
                        break;
                    }
                    Some(ReplicaRequest::ExternalTables(_)) => {}
                    None => break,
                },
                _ = tokio::time::sleep(Duration::from_millis(50)), if streaming => {
                    let block = match batch(vec![next]) {
                        Ok(block) => block,
                        Err(_) => break,
                    };
                    next += 1;
                    if !endpoint.send(Packet::data(block)) {
                        break;
                    }
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    examples_package::init_logging("query_client=info");

    println!("=== Parallel Replicas Demo ===\n");

    // 1. Three replicas of one shard behind a pool
    println!("1. Starting 3 in-process replicas...");
    let mut connections: Vec<Box<dyn Connection>> = Vec::new();
    for i in 0..3 {
        let (connection, endpoint) = ChannelConnection::new(format!("replica-{}:9000", i));
        spawn_replica(endpoint, 30);
        connections.push(Box::new(connection.with_local(i == 0)));
    }
    let pool = FixedPool::new(connections);
    println!("   Pool has {} idle connection(s)\n", pool.idle_count());

    // 2. Fan the query out
    println!("2. Sending query to all replicas...");
    let settings = ReplicaSettings::default().with_max_parallel_replicas(3);
    let throttler = Some(Throttler::with_max_speed(10 * 1024 * 1024));
    let mut replicas =
        ParallelReplicas::from_pool(&pool, settings, throttler, PoolMode::GetMany, true).await?;
    println!("   Replicas: {}", replicas.dump_addresses());
    replicas
        .send_query("SELECT id FROM hits", "demo-1", QueryStage::Complete, false)
        .await?;

    // 3. Merge the replies
    println!("\n3. Receiving packets:");
    let mut total_rows = 0;
    let mut progress = Progress::default();
    while replicas.has_active_replicas() {
        match replicas.receive_packet().await? {
            Packet::Data { block, extra_info } => {
                total_rows += block.num_rows();
                if let Some(info) = extra_info {
                    println!(
                        "   {} rows from replica #{} ({}{})",
                        block.num_rows(),
                        info.replica_num,
                        info.address,
                        if info.is_local { ", local" } else { "" }
                    );
                }
            }
            Packet::Progress(p) => progress.increment(&p),
            Packet::Exception(e) => println!("   exception: {}", e),
            Packet::EndOfStream => println!("   a replica finished"),
            Packet::ProfileInfo(_) | Packet::Log(_) => {}
        }
    }
    println!(
        "   Total: {} rows (progress reported {} of {})\n",
        total_rows, progress.rows, progress.total_rows
    );
    drop(replicas);
    println!("   Connections back in pool: {}\n", pool.idle_count());

    // 4. Cancel a query from another thread
    println!("4. Cancelling an endless query from another thread...");
    let (connection, endpoint) = ChannelConnection::new("replica-slow:9000");
    spawn_endless_replica(endpoint);
    let mut replicas =
        ParallelReplicas::with_connection(Box::new(connection), ReplicaSettings::default(), None)?;
    replicas
        .send_query("SELECT * FROM numbers()", "demo-2", QueryStage::Complete, false)
        .await?;

    let canceller = replicas.canceller();
    let cancel_thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        canceller.send_cancel();
    });

    match replicas.drain().await? {
        Packet::Exception(e) => println!("   Drain ended with: {}", e),
        other => println!("   Drain ended with {}", other.kind()),
    }
    if cancel_thread.join().is_err() {
        anyhow::bail!("cancel thread panicked");
    }
    replicas.disconnect().await;

    println!("\n=== Demo Complete ===");
    Ok(())
}
