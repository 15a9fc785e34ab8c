// ===============================
// src/tvl.rs (per-block orchestration: reader -> allocation -> rows)
// ===============================
//
// Alur per block:
// 1) saldo share semua vault (gagal = fatal untuk run)
// 2) per vault: posisi, pool, split, amounts, symbol, totalSupply, allocate
//    - error per vault ditangkap & dicatat, lanjut ke vault berikut
//    - commit ke ledger hanya jika vault sukses penuh
// 3) ratakan ledger jadi OutputRow
//
use std::time::Instant;

use alloy::primitives::{Address, U256};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::allocation::{
    allocate, partition_positions, AllocationError, LiquiditySplit, TokenTotals, VaultAllocation,
    VaultInputs,
};
use crate::domain::{BlockData, Event, OutputRow, ShareBalance, ShareTokenRow, SkipReason};
use crate::emitter::{emit_rows, share_token_rows};
use crate::ledger::{SymbolCache, TvlLedger};
use crate::metrics::{ROWS, SYMBOL_FAILURES, VAULTS, VAULT_SECONDS};
use crate::snapshot::{SnapshotError, SnapshotReader};

#[derive(Debug, Error)]
pub enum TvlError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl TvlError {
    pub fn is_zero_supply(&self) -> bool {
        matches!(self, TvlError::Allocation(AllocationError::ZeroTotalSupply { .. }))
    }
}

#[derive(Debug)]
pub enum VaultOutcome {
    Allocated { users: usize },
    Skipped(SkipReason),
    Failed(TvlError),
}

impl VaultOutcome {
    fn label(&self) -> &'static str {
        match self {
            VaultOutcome::Allocated { .. } => "allocated",
            VaultOutcome::Skipped(SkipReason::NoPositions) => "skipped_no_positions",
            VaultOutcome::Skipped(SkipReason::NoActivePositions) => "skipped_no_active",
            VaultOutcome::Skipped(SkipReason::ZeroLiquidity) => "skipped_zero_liquidity",
            VaultOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct BlockReport {
    pub block: BlockData,
    pub rows: Vec<OutputRow>,
    /// Saldo share sebelum split (file diagnostik).
    pub share_rows: Vec<ShareTokenRow>,
    pub outcomes: Vec<(Address, VaultOutcome)>,
}

impl BlockReport {
    pub fn failures(&self) -> impl Iterator<Item = (&Address, &TvlError)> {
        self.outcomes.iter().filter_map(|(v, o)| match o {
            VaultOutcome::Failed(e) => Some((v, e)),
            _ => None,
        })
    }
}

enum Processed {
    Allocated(VaultAllocation, VaultInputs),
    Skipped(SkipReason),
}

pub struct TvlCalculator<R> {
    reader: R,
    vaults: Vec<Address>,
    symbols: SymbolCache,
    events: Option<mpsc::Sender<Event>>,
}

impl<R: SnapshotReader> TvlCalculator<R> {
    pub fn new(reader: R, vaults: Vec<Address>) -> Self {
        Self { reader, vaults, symbols: SymbolCache::new(), events: None }
    }

    pub fn with_events(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn symbols(&self) -> &SymbolCache {
        &self.symbols
    }

    pub async fn block_data(&self, number: u64) -> Result<BlockData, SnapshotError> {
        let timestamp = self.reader.timestamp(number).await?;
        Ok(BlockData { number, timestamp })
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(ev);
        }
    }

    /// Satu-satunya entry point per block. Error yang dikembalikan = fatal untuk run.
    pub async fn compute_vault_tvl(&mut self, block: BlockData) -> Result<BlockReport, SnapshotError> {
        let balances = self.reader.share_balances(block.number).await?;
        let share_rows = share_token_rows(&block, &balances);
        info!(block = block.number, balances = balances.len(), "share balances loaded");

        let mut ledger = TvlLedger::new();
        let mut working = balances;
        let mut outcomes = Vec::with_capacity(self.vaults.len());

        for vault in self.vaults.clone() {
            info!(%vault, block = block.number, "processing vault");
            let started = Instant::now();
            let result = self.process_vault(vault, block.number, &working).await;
            VAULT_SECONDS.observe(started.elapsed().as_secs_f64());

            let outcome = match result {
                Ok(Processed::Allocated(allocation, inputs)) => {
                    ledger.apply(&allocation);
                    let users = allocation.user_count();
                    self.record(Event::VaultAllocated {
                        block: block.number,
                        vault,
                        active_liquidity: inputs.liquidity.active,
                        inactive_liquidity: inputs.liquidity.inactive,
                        total_supply: inputs.total_supply,
                        users,
                    });
                    working = allocation.balances;
                    VaultOutcome::Allocated { users }
                }
                Ok(Processed::Skipped(reason)) => {
                    info!(%vault, ?reason, "vault skipped");
                    self.record(Event::VaultSkipped { block: block.number, vault, reason });
                    VaultOutcome::Skipped(reason)
                }
                Err(e) => {
                    error!(%vault, block = block.number, error = %e, "error processing vault");
                    self.record(Event::VaultFailed { block: block.number, vault, error: e.to_string() });
                    VaultOutcome::Failed(e)
                }
            };
            VAULTS.with_label_values(&[outcome.label()]).inc();
            outcomes.push((vault, outcome));
        }

        if ledger.is_empty() {
            info!(block = block.number, "no vault allocated at this block");
        }
        let rows = emit_rows(&block, &ledger, &self.symbols);
        let active_rows = rows.iter().filter(|r| r.in_active).count();
        ROWS.with_label_values(&["true"]).inc_by(active_rows as u64);
        ROWS.with_label_values(&["false"]).inc_by((rows.len() - active_rows) as u64);
        self.record(Event::BlockDone { block: block.number, timestamp: block.timestamp, rows: rows.len() });

        Ok(BlockReport { block, rows, share_rows, outcomes })
    }

    async fn process_vault(
        &mut self,
        vault: Address,
        block: u64,
        balances: &[ShareBalance],
    ) -> Result<Processed, TvlError> {
        let positions = self.reader.positions(vault, block).await?;
        let pool = self.reader.pool_snapshot(vault, block).await?;

        if positions.is_empty() {
            return Ok(Processed::Skipped(SkipReason::NoPositions));
        }
        let partition = partition_positions(&positions, pool.tick);
        if partition.active.is_empty() {
            info!(%vault, tick = pool.tick, "no in-range positions found for this vault");
            return Ok(Processed::Skipped(SkipReason::NoActivePositions));
        }
        if partition.inactive.is_empty() {
            info!(%vault, tick = pool.tick, "no out-of-range positions found for this vault");
        }

        let liquidity = LiquiditySplit::from_partition(&partition);
        if liquidity.total().is_zero() {
            return Ok(Processed::Skipped(SkipReason::ZeroLiquidity));
        }

        let mut totals = TokenTotals::default();
        for (status, position) in partition.iter() {
            let (amount0, amount1) = self.reader.underlying_amounts(vault, position, block).await?;
            totals.add(status, amount0, amount1);
        }

        self.resolve_symbol(pool.token0).await;
        self.resolve_symbol(pool.token1).await;

        let total_supply = self.reader.total_supply(vault, block).await?;
        let inputs = VaultInputs { vault, pool, liquidity, totals, total_supply };
        let allocation = allocate(&inputs, balances)?;
        Ok(Processed::Allocated(allocation, inputs))
    }

    /// Sekali per token per run; gagal -> "" (tidak di-retry).
    async fn resolve_symbol(&mut self, token: Address) {
        if self.symbols.contains(&token) {
            return;
        }
        let symbol = match self.reader.symbol(token).await {
            Ok(s) => s,
            Err(e) => {
                warn!(%token, error = %e, "symbol lookup failed, using empty symbol");
                SYMBOL_FAILURES.inc();
                String::new()
            }
        };
        self.symbols.insert(token, symbol);
    }
}

/// Total token_balance untuk satu flag (ringkasan log per block).
pub fn total_balance(rows: &[OutputRow], in_active: bool) -> U256 {
    rows.iter().filter(|r| r.in_active == in_active).map(|r| r.token_balance).sum()
}
