// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! In-process validator set.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;

use dbft_core::testing::{
    make_validators, AllowAllPolicy, LocalNetwork, MemoryLedger, MockTransaction, MockWallet,
};
use dbft_core::{ConsensusEngine, ConsensusHandle, ConsensusService};
use dbft_traits::{Clock, Ledger, SystemClock};

use crate::NodeConfig;

type Engine = ConsensusEngine<MemoryLedger, AllowAllPolicy, MockWallet>;

struct Node {
    ledger: Arc<MemoryLedger>,
    handle: ConsensusHandle<MockTransaction>,
    task: JoinHandle<Engine>,
}

/// Run the devnet until the target height is reached or Ctrl+C.
pub async fn run(config: NodeConfig) -> Result<()> {
    let network = LocalNetwork::new();
    let validators = make_validators(config.validators);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut nodes = Vec::new();
    for i in 0..config.validators + config.observers {
        let wallet = if i < config.validators {
            MockWallet::validator(i)
        } else {
            MockWallet::observer()
        };
        let ledger = Arc::new(MemoryLedger::new(validators.clone()));
        let transport = network.add_node(ledger.clone());
        let engine = ConsensusEngine::new(
            ledger.clone(),
            Arc::new(AllowAllPolicy),
            Arc::new(wallet),
            clock.clone(),
            config.consensus.clone(),
        );
        let (service, handle) = ConsensusService::new(engine, transport);
        network.attach(i, handle.clone());
        nodes.push(Node {
            ledger,
            handle,
            task: tokio::spawn(service.run()),
        });
    }
    log::info!(
        "Devnet of {} validators and {} observers created",
        config.validators,
        config.observers
    );

    for i in &config.offline {
        log::warn!("Validator {} is offline", i);
        network.set_offline(*i);
    }
    for id in 0..config.seed_transactions {
        network.submit_transaction(MockTransaction::new(id, 1 + id % 5));
    }
    for node in &nodes {
        node.handle.start()?;
    }

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(config.consensus.block_interval());
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                let height = nodes
                    .iter()
                    .map(|n| n.ledger.current_height())
                    .max()
                    .unwrap_or(0);
                log::info!("Devnet height {}", height);
                if config.target_height.map_or(false, |target| height >= target) {
                    log::info!("Target height reached");
                    break;
                }
            }
        }
    }

    shutdown(nodes, &network, &config).await
}

async fn shutdown(nodes: Vec<Node>, network: &LocalNetwork, config: &NodeConfig) -> Result<()> {
    for node in &nodes {
        // A service that already stopped has nothing left to shut down.
        let _ = node.handle.shutdown();
    }

    let mut chains = Vec::new();
    for (i, node) in nodes.into_iter().enumerate() {
        let engine = node
            .task
            .await
            .with_context(|| format!("Consensus service {} panicked", i))?;
        let snapshot = engine.metrics().snapshot();
        log::info!(
            "Node {}: height={} view={} blocks_relayed={} view_changes={} ignored={}",
            i,
            snapshot.height,
            snapshot.view,
            snapshot.blocks_relayed,
            snapshot.view_changes,
            snapshot.payloads_ignored
        );
        log::debug!("Node {} metrics:\n{}", i, snapshot.to_prometheus());
        if !config.offline.contains(&i) {
            chains.push((i, node.ledger.blocks()));
        }
    }

    if let Some((_, reference)) = chains.first() {
        for (i, chain) in &chains[1..] {
            let common = reference.len().min(chain.len());
            if reference[..common] != chain[..common] {
                log::error!("Node {} diverged from node {}", i, chains[0].0);
            }
        }
    }
    log::info!(
        "{} payloads exchanged, {} blocks relayed",
        network.payload_count(),
        network.relayed_blocks().len()
    );
    Ok(())
}
