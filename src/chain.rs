// ===============================
// src/chain.rs (EVM node: vault / pool / ERC20 at historical block)
// ===============================
use alloy::{
    primitives::{aliases::I24, Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{BlockId, BlockNumberOrTag},
    sol,
};
use tracing::debug;
use url::Url;

use crate::domain::{LiquidityPosition, PoolSnapshot};
use crate::snapshot::SnapshotError;

sol! {
    #[sol(rpc)]
    contract CLVault {
        function pool() external view returns (address);
        function totalSupply() external view returns (uint256);
        function getPositions()
            external
            view
            returns (int24[] memory lowerTicks, int24[] memory upperTicks, uint128[] memory liquidities);
        function getAmountsForLiquidity(int24 tickLower, int24 tickUpper, uint128 liquidity)
            external
            view
            returns (uint256 amount0, uint256 amount1);
    }
}

sol! {
    #[sol(rpc)]
    contract UniswapV3Pool {
        function slot0()
            external
            view
            returns (
                uint160 sqrtPriceX96,
                int24 tick,
                uint16 observationIndex,
                uint16 observationCardinality,
                uint16 observationCardinalityNext,
                uint8 feeProtocol,
                bool unlocked
            );
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    contract ERC20 {
        function symbol() external view returns (string);
    }
}

fn rpc_err(what: &'static str, target: Address) -> impl FnOnce(alloy::contract::Error) -> SnapshotError {
    move |e| SnapshotError::Rpc(format!("{what} on {target}: {e}"))
}

/// Reader kontrak via HTTP JSON-RPC. Semua call vault/pool dipin ke block historis.
#[derive(Clone)]
pub struct ChainReader {
    provider: DynProvider,
}

impl ChainReader {
    pub fn connect(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self { provider }
    }

    pub async fn positions(&self, vault: Address, block: u64) -> Result<Vec<LiquidityPosition>, SnapshotError> {
        let contract = CLVault::new(vault, self.provider.clone());
        let ret = contract
            .getPositions()
            .block(BlockId::number(block))
            .call()
            .await
            .map_err(rpc_err("getPositions", vault))?;

        positions_from_arrays(&ret.lowerTicks, &ret.upperTicks, &ret.liquidities)
            .map_err(|e| SnapshotError::Malformed(format!("getPositions on {vault}: {e}")))
    }

    pub async fn pool_snapshot(&self, vault: Address, block: u64) -> Result<PoolSnapshot, SnapshotError> {
        let at = BlockId::number(block);
        let pool_addr = CLVault::new(vault, self.provider.clone())
            .pool()
            .block(at)
            .call()
            .await
            .map_err(rpc_err("pool", vault))?;

        let pool = UniswapV3Pool::new(pool_addr, self.provider.clone());
        let slot0 = pool.slot0().block(at).call().await.map_err(rpc_err("slot0", pool_addr))?;
        let token0 = pool.token0().block(at).call().await.map_err(rpc_err("token0", pool_addr))?;
        let token1 = pool.token1().block(at).call().await.map_err(rpc_err("token1", pool_addr))?;

        debug!(%vault, pool = %pool_addr, tick = slot0.tick.as_i32(), block, "pool snapshot");
        Ok(PoolSnapshot { tick: slot0.tick.as_i32(), token0, token1 })
    }

    pub async fn amounts_for_liquidity(
        &self,
        vault: Address,
        position: &LiquidityPosition,
        block: u64,
    ) -> Result<(U256, U256), SnapshotError> {
        let lower = to_i24(position.tick_lower)?;
        let upper = to_i24(position.tick_upper)?;
        let ret = CLVault::new(vault, self.provider.clone())
            .getAmountsForLiquidity(lower, upper, position.liquidity)
            .block(BlockId::number(block))
            .call()
            .await
            .map_err(rpc_err("getAmountsForLiquidity", vault))?;
        Ok((ret.amount0, ret.amount1))
    }

    pub async fn total_supply(&self, vault: Address, block: u64) -> Result<U256, SnapshotError> {
        CLVault::new(vault, self.provider.clone())
            .totalSupply()
            .block(BlockId::number(block))
            .call()
            .await
            .map_err(rpc_err("totalSupply", vault))
    }

    /// Symbol dibaca di block terbaru (metadata, tidak historis).
    pub async fn symbol(&self, token: Address) -> Result<String, SnapshotError> {
        ERC20::new(token, self.provider.clone())
            .symbol()
            .call()
            .await
            .map_err(rpc_err("symbol", token))
    }

    pub async fn block_timestamp(&self, block: u64) -> Result<u64, SnapshotError> {
        let header = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block))
            .await
            .map_err(|e| SnapshotError::Rpc(format!("eth_getBlockByNumber({block}): {e}")))?
            .ok_or(SnapshotError::BlockNotFound(block))?
            .header;
        Ok(header.timestamp)
    }
}

fn to_i24(tick: i32) -> Result<I24, SnapshotError> {
    I24::try_from(tick).map_err(|_| SnapshotError::Malformed(format!("tick {tick} out of int24 range")))
}

/// Gabungkan tiga array paralel dari `getPositions()` jadi posisi.
pub fn positions_from_arrays(
    lower: &[I24],
    upper: &[I24],
    liquidity: &[u128],
) -> Result<Vec<LiquidityPosition>, String> {
    if lower.len() != upper.len() || lower.len() != liquidity.len() {
        return Err(format!(
            "array length mismatch (lower={}, upper={}, liquidity={})",
            lower.len(),
            upper.len(),
            liquidity.len()
        ));
    }

    lower
        .iter()
        .zip(upper)
        .zip(liquidity)
        .map(|((lo, hi), liq)| {
            let p = LiquidityPosition {
                tick_lower: lo.as_i32(),
                tick_upper: hi.as_i32(),
                liquidity: *liq,
            };
            if p.tick_lower >= p.tick_upper {
                return Err(format!("invalid range [{}, {})", p.tick_lower, p.tick_upper));
            }
            Ok(p)
        })
        .collect()
}
