// ===============================
// src/domain.rs
// ===============================
use alloy::primitives::{Address, U256};
use serde::Serialize;

/// Posisi likuiditas di dalam vault, `[tick_lower, tick_upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidityPosition {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot { pub tick: i32, pub token0: Address, pub token1: Address }

/// Saldo share-token satu user pada satu vault. `is_active=false` hanya untuk
/// baris sisa (inactive) hasil split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareBalance { pub user: Address, pub vault: Address, pub balance: U256, pub is_active: bool }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockData { pub number: u64, pub timestamp: u64 }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub block_number: u64,
    pub timestamp: u64,
    #[serde(serialize_with = "ser::address")]
    pub user_address: Address,
    #[serde(serialize_with = "ser::address")]
    pub token_address: Address,
    #[serde(serialize_with = "ser::decimal")]
    pub token_balance: U256,
    pub token_symbol: String,
    pub in_active: bool,
}

impl OutputRow {
    pub const HEADER: [&'static str; 7] = [
        "block_number",
        "timestamp",
        "user_address",
        "token_address",
        "token_balance",
        "token_symbol",
        "in_active",
    ];
}

/// Baris file diagnostik share-token (sebelum split per vault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareTokenRow {
    pub block_number: u64,
    pub timestamp: u64,
    #[serde(serialize_with = "ser::address")]
    pub user: Address,
    #[serde(rename = "contractId", serialize_with = "ser::address")]
    pub contract_id: Address,
    #[serde(serialize_with = "ser::decimal")]
    pub balance: U256,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

impl ShareTokenRow {
    pub const HEADER: [&'static str; 6] =
        ["block_number", "timestamp", "user", "contractId", "balance", "isActive"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason { NoPositions, NoActivePositions, ZeroLiquidity }

// Audit trail (JSONL), lihat recorder.rs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    VaultAllocated {
        block: u64,
        #[serde(serialize_with = "ser::address")]
        vault: Address,
        #[serde(serialize_with = "ser::decimal")]
        active_liquidity: U256,
        #[serde(serialize_with = "ser::decimal")]
        inactive_liquidity: U256,
        #[serde(serialize_with = "ser::decimal")]
        total_supply: U256,
        users: usize,
    },
    VaultSkipped {
        block: u64,
        #[serde(serialize_with = "ser::address")]
        vault: Address,
        reason: SkipReason,
    },
    VaultFailed {
        block: u64,
        #[serde(serialize_with = "ser::address")]
        vault: Address,
        error: String,
    },
    BlockDone { block: u64, timestamp: u64, rows: usize },
}

/// Lower-case `0x…` hex, tanpa checksum.
pub fn fmt_address(addr: &Address) -> String {
    addr.to_string().to_ascii_lowercase()
}

pub(crate) mod ser {
    use alloy::primitives::{Address, U256};
    use serde::Serializer;

    // U256 bawaan serde = hex; output CSV butuh desimal penuh
    pub fn decimal<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn address<S: Serializer>(value: &Address, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::fmt_address(value))
    }
}
