// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use dbft_traits::{Hash256, Ledger};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MemoryLedger, MockTransaction};
use crate::block::Block;
use crate::network::Transport;
use crate::service::ConsensusHandle;
use crate::types::InventoryKind;

#[derive(Debug)]
struct Peer {
    ledger: Arc<MemoryLedger>,
    handle: Option<ConsensusHandle<MockTransaction>>,
    online: bool,
}

/// An in-process network connecting consensus services.
///
/// Payloads go to every other online node. A relayed block is persisted into
/// each online node's ledger, which then learns of it through its handle.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    peers: Mutex<Vec<Peer>>,
    relayed: Mutex<Vec<Block<MockTransaction>>>,
    payloads: AtomicUsize,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn peers(&self) -> MutexGuard<'_, Vec<Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a node backed by `ledger`; returns its transport.
    ///
    /// The node receives nothing until [`LocalNetwork::attach`] gives it a
    /// handle.
    pub fn add_node(self: &Arc<Self>, ledger: Arc<MemoryLedger>) -> Arc<LocalTransport> {
        let mut peers = self.peers();
        peers.push(Peer {
            ledger,
            handle: None,
            online: true,
        });
        Arc::new(LocalTransport {
            network: Arc::clone(self),
            index: peers.len() - 1,
        })
    }

    /// Route events for node `index` to `handle`.
    pub fn attach(&self, index: usize, handle: ConsensusHandle<MockTransaction>) {
        if let Some(peer) = self.peers().get_mut(index) {
            peer.handle = Some(handle);
        }
    }

    /// Cut node `index` off: it neither sends nor receives from now on.
    pub fn set_offline(&self, index: usize) {
        if let Some(peer) = self.peers().get_mut(index) {
            peer.online = false;
        }
    }

    /// Put `tx` into every node's mempool.
    pub fn submit_transaction(&self, tx: MockTransaction) {
        for peer in self.peers().iter() {
            peer.ledger.add_to_mempool(tx.clone());
        }
    }

    /// Every block handed to [`Transport::relay`], in call order.
    pub fn relayed_blocks(&self) -> Vec<Block<MockTransaction>> {
        self.relayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of consensus payloads sent so far.
    pub fn payload_count(&self) -> usize {
        self.payloads.load(Ordering::SeqCst)
    }

    fn is_online(&self, index: usize) -> bool {
        self.peers().get(index).map(|p| p.online).unwrap_or(false)
    }
}

/// The [`Transport`] of one node on a [`LocalNetwork`].
#[derive(Debug)]
pub struct LocalTransport {
    network: Arc<LocalNetwork>,
    index: usize,
}

impl LocalTransport {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[async_trait]
impl Transport<MockTransaction> for LocalTransport {
    async fn send_direct(&self, payload: Vec<u8>) -> anyhow::Result<()> {
        if !self.network.is_online(self.index) {
            return Ok(());
        }
        self.network.payloads.fetch_add(1, Ordering::SeqCst);
        for (i, peer) in self.network.peers().iter().enumerate() {
            if i == self.index || !peer.online {
                continue;
            }
            if let Some(handle) = &peer.handle {
                if handle.deliver_payload(payload.clone()).is_err() {
                    log::debug!("Node {} stopped, payload dropped", i);
                }
            }
        }
        Ok(())
    }

    async fn broadcast_inventory(
        &self,
        _kind: InventoryKind,
        hashes: Vec<Hash256>,
    ) -> anyhow::Result<()> {
        if !self.network.is_online(self.index) {
            return Ok(());
        }
        let peers = self.network.peers();
        let Some(me) = peers.get(self.index) else {
            return Ok(());
        };
        let txs: Vec<MockTransaction> = hashes
            .iter()
            .filter_map(|h| me.ledger.mempool_transaction(h))
            .collect();
        for (i, peer) in peers.iter().enumerate() {
            if i == self.index || !peer.online {
                continue;
            }
            for tx in &txs {
                if peer.ledger.add_to_mempool(tx.clone()) {
                    if let Some(handle) = &peer.handle {
                        let _ = handle.transaction_seen(tx.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn relay(&self, block: Block<MockTransaction>) -> anyhow::Result<()> {
        self.network
            .relayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block.clone());
        if !self.network.is_online(self.index) {
            return Ok(());
        }
        for (i, peer) in self.network.peers().iter().enumerate() {
            if !peer.online || !peer.ledger.persist(&block) {
                continue;
            }
            log::debug!("Node {} persisted block {}", i, block.index());
            if let Some(handle) = &peer.handle {
                let _ = handle.height_committed(block.clone());
            }
        }
        Ok(())
    }

    async fn request_missing(&self, hashes: Vec<Hash256>) -> anyhow::Result<()> {
        let peers = self.network.peers();
        let Some(handle) = peers.get(self.index).and_then(|p| p.handle.clone()) else {
            return Ok(());
        };
        for hash in &hashes {
            let found = peers
                .iter()
                .enumerate()
                .filter(|(i, peer)| *i != self.index && peer.online)
                .find_map(|(_, peer)| peer.ledger.mempool_transaction(hash));
            match found {
                Some(tx) => handle.transaction_seen(tx)?,
                None => log::debug!("No peer holds transaction {}", hash),
            }
        }
        Ok(())
    }
}
