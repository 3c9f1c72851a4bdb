//! Two peers on one in-process hub: replication, then the id collision
//! that count-based ids produce when both peers write while partitioned.

use anyhow::{bail, Result};
use donorstore_core::config::Config;
use donorstore_core::core_session::{GossipHub, MemoryTransport};
use donorstore_core::{DonorRegistry, PeerId};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::info;

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(5);

struct DemoPeer {
    name: &'static str,
    transport: MemoryTransport,
    registry: DonorRegistry,
}

impl DemoPeer {
    async fn join(hub: &GossipHub, base: &Config, name: &'static str) -> Result<Self> {
        let mut config = base.clone();
        config.session.peer_id = Some(name.to_string());
        config.session.data_dir = None;
        config.store.sync_interval = Duration::ZERO;

        let transport = hub.join(PeerId::new(name));
        let registry = DonorRegistry::set_up(&config, Arc::new(transport.clone())).await?;
        Ok(DemoPeer { name, transport, registry })
    }

    fn print(&self) {
        println!("  {}:", self.name);
        for document in self.registry.get_data() {
            println!("    {}", document.to_json());
        }
    }
}

/// Poll until every peer holds `count` documents with identical contents
async fn converge(peers: &[&DemoPeer], count: usize) -> Result<()> {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    loop {
        let views: Vec<_> = peers.iter().map(|p| p.registry.get_data()).collect();
        if views.iter().all(|v| v.len() == count && v == &views[0]) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("peers did not converge on {} documents within {:?}", count, CONVERGE_TIMEOUT);
        }
        sleep(Duration::from_millis(20)).await;
    }
}

pub async fn run(base: &Config) -> Result<()> {
    let hub = GossipHub::new();
    let alice = DemoPeer::join(&hub, base, "alice").await?;
    let bob = DemoPeer::join(&hub, base, "bob").await?;
    info!(address = %alice.registry.store().address(), "demo peers joined");

    println!("== replication");
    alice.registry.put_data(&json!({"name": "Alice", "bloodType": "O-"}))?;
    converge(&[&alice, &bob], 1).await?;
    bob.registry.put_data(&json!({"name": "Bob", "bloodType": "A+"}))?;
    converge(&[&alice, &bob], 2).await?;
    alice.print();
    bob.print();

    println!("== partitioned writes");
    alice.transport.disconnect().await;
    let from_alice = alice.registry.put_data(&json!({"name": "Carol"}))?;
    let from_bob = bob.registry.put_data(&json!({"name": "Dave"}))?;
    println!("  alice assigned {}, bob assigned {}", from_alice, from_bob);

    alice.transport.reconnect().await;
    alice.registry.store().announce().await?;
    bob.registry.store().announce().await?;
    let expected = if from_alice == from_bob { 3 } else { 4 };
    converge(&[&alice, &bob], expected).await?;

    println!("== after healing");
    alice.print();
    bob.print();
    if from_alice == from_bob {
        println!("  both writes used id {}; only one survives", from_alice);
    }
    Ok(())
}
