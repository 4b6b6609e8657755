//! Cluster discovery example
//!
//! Three nodes share one in-process coordination service. Each registers
//! itself under the cluster root and watches the others; an observer follows
//! the cluster without joining it. Nodes then leave one by one, and one of
//! them loses its session and comes back.
//!
//! # Running the Example
//!
//! ```bash
//! RUST_LOG=query_discovery=debug cargo run --example cluster_discovery
//! ```

use anyhow::Result;
use query_discovery::{
    ClusterConfig, ClusterDiscovery, CoordinationService, DiscoveryConfig, MemoryCoordination,
    TopologyRegistry,
};
use std::sync::Arc;
use std::time::Duration;

const CLUSTER: &str = "analytics";
const ROOT: &str = "/clickhouse/discovery/analytics";

fn node_config(host: &str, observer: bool) -> DiscoveryConfig {
    DiscoveryConfig::default()
        .with_address(host, 9000)
        .with_cluster(ClusterConfig::new(CLUSTER, ROOT).with_observer(observer))
        .with_refresh_interval(Duration::from_millis(500))
        .with_operation_timeout(Duration::from_secs(2))
}

fn print_topology(label: &str, discovery: &ClusterDiscovery) {
    match discovery.snapshot(CLUSTER) {
        Some(snapshot) => println!(
            "   {} sees v{}: [{}]",
            label,
            snapshot.version(),
            snapshot.addresses().join(", ")
        ),
        None => println!("   {} has no topology yet", label),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    examples_package::init_logging("query_discovery=info");

    println!("=== Cluster Discovery Demo ===\n");

    let zk = Arc::new(MemoryCoordination::new());

    // 1. Observer follows the cluster without joining it
    println!("1. Starting observer...");
    let observer_session: Arc<dyn CoordinationService> = Arc::new(zk.new_session());
    let observer = ClusterDiscovery::new(
        node_config("observer", true),
        observer_session,
        Arc::new(TopologyRegistry::new()),
    )?;
    observer.start().await?;
    print_topology("observer", &observer);

    // 2. Three members join
    println!("\n2. Starting 3 members...");
    let mut sessions = Vec::new();
    let mut members = Vec::new();
    for i in 1..=3 {
        let session = Arc::new(zk.new_session());
        let coordination: Arc<dyn CoordinationService> = session.clone();
        let member = ClusterDiscovery::new(
            node_config(&format!("replica-{}", i), false),
            coordination,
            Arc::new(TopologyRegistry::new()),
        )?;
        member.start().await?;
        println!("   replica-{} joined as {}", i, member.node_id());
        sessions.push(session);
        members.push(member);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    print_topology("observer", &observer);
    print_topology("replica-1", &members[0]);

    // 3. A member loses its session and re-registers
    println!("\n3. Expiring replica-2's session...");
    sessions[1].expire_session();
    tokio::time::sleep(Duration::from_millis(100)).await;
    print_topology("observer", &observer);

    // 4. A member leaves cleanly
    println!("\n4. Shutting down replica-3...");
    if let Some(member) = members.pop() {
        member.shutdown().await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    print_topology("observer", &observer);
    print_topology("replica-1", &members[0]);

    // 5. Cleanup
    println!("\n5. Cleanup...");
    for member in &members {
        member.shutdown().await;
    }
    observer.shutdown().await;
    let (children, _) = zk.list_children(ROOT, None).await?;
    println!("   Members left under {}: {}", ROOT, children.len());

    println!("\n=== Demo Complete ===");
    Ok(())
}
