// ===============================
// src/snapshot.rs (Snapshot Reader interface)
// ===============================
//
// Semua baca data historis (per block) lewat trait ini, supaya engine dan
// orkestrasi bisa dites dengan reader in-memory.
//
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::chain::ChainReader;
use crate::domain::{LiquidityPosition, PoolSnapshot, ShareBalance};
use crate::subgraph::SubgraphClient;

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// RPC / eth_call gagal (transport, revert, dsb).
    #[error("rpc error: {0}")]
    Rpc(String),
    /// Respons terbaca tapi bentuknya tidak valid.
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("subgraph error: {0}")]
    Subgraph(String),
    #[error("block {0} not found")]
    BlockNotFound(u64),
}

#[async_trait]
pub trait SnapshotReader: Send + Sync {
    async fn positions(&self, vault: Address, block: u64) -> Result<Vec<LiquidityPosition>, SnapshotError>;

    async fn pool_snapshot(&self, vault: Address, block: u64) -> Result<PoolSnapshot, SnapshotError>;

    /// (amount0, amount1) untuk satu posisi pada state pool di `block`.
    async fn underlying_amounts(
        &self,
        vault: Address,
        position: &LiquidityPosition,
        block: u64,
    ) -> Result<(U256, U256), SnapshotError>;

    /// Saldo share-token semua vault pada `block`.
    async fn share_balances(&self, block: u64) -> Result<Vec<ShareBalance>, SnapshotError>;

    async fn total_supply(&self, vault: Address, block: u64) -> Result<U256, SnapshotError>;

    async fn symbol(&self, token: Address) -> Result<String, SnapshotError>;

    async fn timestamp(&self, block: u64) -> Result<u64, SnapshotError>;
}

/// Reader produksi: node EVM untuk state vault/pool, subgraph untuk saldo share.
pub struct LiveSnapshotReader {
    chain: ChainReader,
    subgraph: SubgraphClient,
}

impl LiveSnapshotReader {
    pub fn new(chain: ChainReader, subgraph: SubgraphClient) -> Self {
        Self { chain, subgraph }
    }
}

#[async_trait]
impl SnapshotReader for LiveSnapshotReader {
    async fn positions(&self, vault: Address, block: u64) -> Result<Vec<LiquidityPosition>, SnapshotError> {
        self.chain.positions(vault, block).await
    }

    async fn pool_snapshot(&self, vault: Address, block: u64) -> Result<PoolSnapshot, SnapshotError> {
        self.chain.pool_snapshot(vault, block).await
    }

    async fn underlying_amounts(
        &self,
        vault: Address,
        position: &LiquidityPosition,
        block: u64,
    ) -> Result<(U256, U256), SnapshotError> {
        self.chain.amounts_for_liquidity(vault, position, block).await
    }

    async fn share_balances(&self, block: u64) -> Result<Vec<ShareBalance>, SnapshotError> {
        self.subgraph.share_balances(block).await
    }

    async fn total_supply(&self, vault: Address, block: u64) -> Result<U256, SnapshotError> {
        self.chain.total_supply(vault, block).await
    }

    async fn symbol(&self, token: Address) -> Result<String, SnapshotError> {
        self.chain.symbol(token).await
    }

    async fn timestamp(&self, block: u64) -> Result<u64, SnapshotError> {
        self.chain.block_timestamp(block).await
    }
}
