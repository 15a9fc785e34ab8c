// ===============================
// src/allocation.rs (active/inactive TVL allocation)
// ===============================
//
// Engine murni (tanpa I/O):
// 1) klasifikasi posisi vs tick pool  -> active / inactive
// 2) total likuiditas per kelompok
// 3) split saldo share user sesuai rasio likuiditas
// 4) total token underlying per kelompok (diisi caller dari reader)
// 5) distribusi token ke user: balance * total / totalSupply
//
// Semua angka U256; perkalian dilebarkan ke U512 sebelum dibagi.
//
use alloy::primitives::{ruint::UintTryFrom, Address, U256, U512};
use thiserror::Error;

use crate::domain::{LiquidityPosition, PoolSnapshot, ShareBalance};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("vault {vault}: share token total supply is zero")]
    ZeroTotalSupply { vault: Address },
    #[error("vault {vault}: total liquidity is zero")]
    ZeroLiquidity { vault: Address },
    #[error("allocation result does not fit in 256 bits")]
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus { Active, Inactive }

impl LiquidityPosition {
    /// Half-open: `tick_lower <= tick < tick_upper` berarti aktif.
    pub fn range_status(&self, tick: i32) -> RangeStatus {
        if self.tick_lower <= tick && tick < self.tick_upper {
            RangeStatus::Active
        } else {
            RangeStatus::Inactive
        }
    }
}

#[derive(Debug, Default)]
pub struct RangePartition<'a> {
    pub active: Vec<&'a LiquidityPosition>,
    pub inactive: Vec<&'a LiquidityPosition>,
}

impl<'a> RangePartition<'a> {
    pub fn iter(&self) -> impl Iterator<Item = (RangeStatus, &'a LiquidityPosition)> + '_ {
        self.active
            .iter()
            .map(|p| (RangeStatus::Active, *p))
            .chain(self.inactive.iter().map(|p| (RangeStatus::Inactive, *p)))
    }
}

pub fn partition_positions(positions: &[LiquidityPosition], tick: i32) -> RangePartition<'_> {
    let mut out = RangePartition::default();
    for p in positions {
        match p.range_status(tick) {
            RangeStatus::Active => out.active.push(p),
            RangeStatus::Inactive => out.inactive.push(p),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquiditySplit { pub active: U256, pub inactive: U256 }

impl LiquiditySplit {
    pub fn from_partition(partition: &RangePartition<'_>) -> Self {
        let sum = |ps: &[&LiquidityPosition]| {
            ps.iter().fold(U256::ZERO, |acc, p| acc + U256::from(p.liquidity))
        };
        Self { active: sum(partition.active.as_slice()), inactive: sum(partition.inactive.as_slice()) }
    }

    pub fn total(&self) -> U256 {
        self.active + self.inactive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareSplit { pub active: U256, pub inactive: U256 }

/// `a * b / denominator`, dibulatkan ke bawah. `None` kalau pembagi nol.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<Result<U256, AllocationError>> {
    if denominator.is_zero() {
        return None;
    }
    let q = U512::from(a) * U512::from(b) / U512::from(denominator);
    Some(U256::uint_try_from(q).map_err(|_| AllocationError::Overflow))
}

/// Split saldo share: active = B * La / Lt, inactive = B - active (selalu konservatif).
pub fn split_balance(
    vault: Address,
    balance: U256,
    liquidity: &LiquiditySplit,
) -> Result<ShareSplit, AllocationError> {
    let active = mul_div(balance, liquidity.active, liquidity.total())
        .ok_or(AllocationError::ZeroLiquidity { vault })??;
    Ok(ShareSplit { active, inactive: balance - active })
}

/// Bangun working-set baru (tidak memutasi input yang sedang diiterasi).
///
/// Baris vault lain disalin apa adanya. Baris vault ini dengan saldo > 0 diganti
/// dengan porsi aktif, lalu baris inactive ditambahkan di akhir kalau sisanya
/// bukan nol (urutan sama seperti baris aslinya).
pub fn split_share_balances(
    balances: &[ShareBalance],
    vault: Address,
    liquidity: &LiquiditySplit,
) -> Result<Vec<ShareBalance>, AllocationError> {
    let mut out = Vec::with_capacity(balances.len());
    let mut remainders = Vec::new();

    for row in balances {
        if row.vault != vault || !row.is_active || row.balance.is_zero() {
            out.push(*row);
            continue;
        }
        let split = split_balance(vault, row.balance, liquidity)?;
        out.push(ShareBalance { balance: split.active, ..*row });
        if !split.inactive.is_zero() {
            remainders.push(ShareBalance { balance: split.inactive, is_active: false, ..*row });
        }
    }

    out.extend(remainders);
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub active0: U256,
    pub active1: U256,
    pub inactive0: U256,
    pub inactive1: U256,
}

impl TokenTotals {
    pub fn add(&mut self, status: RangeStatus, amount0: U256, amount1: U256) {
        match status {
            RangeStatus::Active => {
                self.active0 += amount0;
                self.active1 += amount1;
            }
            RangeStatus::Inactive => {
                self.inactive0 += amount0;
                self.inactive1 += amount1;
            }
        }
    }
}

/// Kredit token untuk satu baris share (bisa lebih dari satu per user).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTokenCredit {
    pub user: Address,
    pub active0: U256,
    pub active1: U256,
    pub inactive0: U256,
    pub inactive1: U256,
}

/// Semua yang sudah dibaca dari chain untuk satu (vault, block).
#[derive(Debug, Clone, Copy)]
pub struct VaultInputs {
    pub vault: Address,
    pub pool: PoolSnapshot,
    pub liquidity: LiquiditySplit,
    pub totals: TokenTotals,
    pub total_supply: U256,
}

/// Hasil satu vault; belum diterapkan ke ledger (commit dilakukan caller).
#[derive(Debug, Clone)]
pub struct VaultAllocation {
    pub vault: Address,
    pub token0: Address,
    pub token1: Address,
    pub balances: Vec<ShareBalance>,
    pub credits: Vec<UserTokenCredit>,
}

impl VaultAllocation {
    pub fn user_count(&self) -> usize {
        let mut users: Vec<Address> = self.credits.iter().map(|c| c.user).collect();
        users.sort_unstable();
        users.dedup();
        users.len()
    }
}

pub fn allocate(
    inputs: &VaultInputs,
    balances: &[ShareBalance],
) -> Result<VaultAllocation, AllocationError> {
    let vault = inputs.vault;
    if inputs.total_supply.is_zero() {
        return Err(AllocationError::ZeroTotalSupply { vault });
    }

    let balances = split_share_balances(balances, vault, &inputs.liquidity)?;

    let supply = inputs.total_supply;
    let share = |balance: U256, total: U256| -> Result<U256, AllocationError> {
        mul_div(balance, total, supply).ok_or(AllocationError::ZeroTotalSupply { vault })?
    };

    let mut credits = Vec::new();
    for row in balances.iter().filter(|r| r.vault == vault && !r.balance.is_zero()) {
        let t = &inputs.totals;
        credits.push(UserTokenCredit {
            user: row.user,
            active0: share(row.balance, t.active0)?,
            active1: share(row.balance, t.active1)?,
            inactive0: share(row.balance, t.inactive0)?,
            inactive1: share(row.balance, t.inactive1)?,
        });
    }

    Ok(VaultAllocation {
        vault,
        token0: inputs.pool.token0,
        token1: inputs.pool.token1,
        balances,
        credits,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const VAULT: Address = Address::repeat_byte(0xaa);
    const OTHER_VAULT: Address = Address::repeat_byte(0xbb);
    const ALICE: Address = Address::repeat_byte(0x01);
    const BOB: Address = Address::repeat_byte(0x02);

    fn pos(tick_lower: i32, tick_upper: i32, liquidity: u128) -> LiquidityPosition {
        LiquidityPosition { tick_lower, tick_upper, liquidity }
    }

    fn share(user: Address, vault: Address, balance: u64) -> ShareBalance {
        ShareBalance { user, vault, balance: U256::from(balance), is_active: true }
    }

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[rstest]
    #[case(0, RangeStatus::Active)] // tick == tick_lower
    #[case(10, RangeStatus::Active)]
    #[case(19, RangeStatus::Active)]
    #[case(20, RangeStatus::Inactive)] // tick == tick_upper
    #[case(-1, RangeStatus::Inactive)]
    #[case(35, RangeStatus::Inactive)]
    fn range_is_half_open(#[case] tick: i32, #[case] expected: RangeStatus) {
        assert_eq!(pos(0, 20, 1).range_status(tick), expected);
    }

    #[test]
    fn partition_covers_all_liquidity() {
        let positions = [pos(0, 20, 100), pos(20, 30, 50), pos(-50, 5, 7)];
        let partition = partition_positions(&positions, 10);
        let split = LiquiditySplit::from_partition(&partition);

        assert_eq!(partition.active.len(), 2);
        assert_eq!(partition.inactive.len(), 1);
        assert_eq!(split.active, u(107));
        assert_eq!(split.inactive, u(50));
        assert_eq!(split.total(), u(157));
    }

    #[test]
    fn liquidity_sum_does_not_overflow_u128() {
        let positions = [pos(0, 10, u128::MAX), pos(0, 10, u128::MAX)];
        let split = LiquiditySplit::from_partition(&partition_positions(&positions, 5));
        assert_eq!(split.active, U256::from(u128::MAX) * u(2));
    }

    #[rstest]
    #[case(30, 100, 50)]
    #[case(1, 1, 2)]
    #[case(999_999, 3, 7)]
    #[case(7, 0, 9)]
    #[case(7, 9, 0)]
    fn split_conserves_balance(#[case] balance: u64, #[case] active: u64, #[case] inactive: u64) {
        let liquidity = LiquiditySplit { active: u(active), inactive: u(inactive) };
        let split = split_balance(VAULT, u(balance), &liquidity).unwrap();
        assert_eq!(split.active + split.inactive, u(balance));
        assert_eq!(split.active, u(balance * active / (active + inactive)));
    }

    #[test]
    fn split_with_zero_liquidity_is_an_error() {
        let err = split_balance(VAULT, u(5), &LiquiditySplit::default()).unwrap_err();
        assert_eq!(err, AllocationError::ZeroLiquidity { vault: VAULT });
    }

    #[test]
    fn split_share_balances_builds_new_working_set() {
        let liquidity = LiquiditySplit { active: u(100), inactive: u(50) };
        let rows = [
            share(ALICE, VAULT, 30),
            share(BOB, OTHER_VAULT, 40),
            share(BOB, VAULT, 0),
            share(BOB, VAULT, 3), // 3*100/150 = 2, sisa 1
        ];

        let out = split_share_balances(&rows, VAULT, &liquidity).unwrap();

        assert_eq!(
            out,
            vec![
                share(ALICE, VAULT, 20),
                share(BOB, OTHER_VAULT, 40),
                share(BOB, VAULT, 0),
                share(BOB, VAULT, 2),
                ShareBalance { is_active: false, ..share(ALICE, VAULT, 10) },
                ShareBalance { is_active: false, ..share(BOB, VAULT, 1) },
            ]
        );
    }

    #[test]
    fn zero_inactive_remainder_is_not_materialized() {
        let liquidity = LiquiditySplit { active: u(100), inactive: u(0) };
        let out = split_share_balances(&[share(ALICE, VAULT, 30)], VAULT, &liquidity).unwrap();
        assert_eq!(out, vec![share(ALICE, VAULT, 30)]);
    }

    fn scenario_inputs() -> VaultInputs {
        let mut totals = TokenTotals::default();
        totals.add(RangeStatus::Active, u(200), u(400));
        totals.add(RangeStatus::Inactive, u(50), u(10));
        VaultInputs {
            vault: VAULT,
            pool: PoolSnapshot {
                tick: 10,
                token0: Address::repeat_byte(0x10),
                token1: Address::repeat_byte(0x11),
            },
            liquidity: LiquiditySplit { active: u(100), inactive: u(50) },
            totals,
            total_supply: u(1000),
        }
    }

    #[test]
    fn allocate_credits_every_split_row() {
        let alloc = allocate(&scenario_inputs(), &[share(ALICE, VAULT, 30)]).unwrap();

        // 30 -> 20 aktif + 10 inactive
        assert_eq!(alloc.balances.len(), 2);
        assert_eq!(alloc.balances[0].balance, u(20));
        assert_eq!(alloc.balances[1].balance, u(10));
        assert!(!alloc.balances[1].is_active);

        assert_eq!(
            alloc.credits,
            vec![
                UserTokenCredit {
                    user: ALICE,
                    active0: u(4),   // 20*200/1000
                    active1: u(8),   // 20*400/1000
                    inactive0: u(1), // 20*50/1000
                    inactive1: u(0), // 20*10/1000
                },
                UserTokenCredit {
                    user: ALICE,
                    active0: u(2),   // 10*200/1000
                    active1: u(4),   // 10*400/1000
                    inactive0: u(0), // 10*50/1000
                    inactive1: u(0), // 10*10/1000
                },
            ]
        );
        assert_eq!(alloc.user_count(), 1);
    }

    #[test]
    fn inactive_token1_uses_inactive_amount1() {
        let mut inputs = scenario_inputs();
        inputs.totals.inactive0 = u(0);
        inputs.totals.inactive1 = u(1000);
        let alloc = allocate(&inputs, &[share(ALICE, VAULT, 30)]).unwrap();
        let inactive1: U256 = alloc.credits.iter().map(|c| c.inactive1).sum();
        let inactive0: U256 = alloc.credits.iter().map(|c| c.inactive0).sum();
        assert_eq!(inactive1, u(30));
        assert_eq!(inactive0, u(0));
    }

    #[test]
    fn allocate_zero_supply_is_fatal() {
        let mut inputs = scenario_inputs();
        inputs.total_supply = U256::ZERO;
        let err = allocate(&inputs, &[share(ALICE, VAULT, 30)]).unwrap_err();
        assert_eq!(err, AllocationError::ZeroTotalSupply { vault: VAULT });
    }

    #[test]
    fn allocate_ignores_other_vaults_and_empty_rows() {
        let rows = [share(BOB, OTHER_VAULT, 500), share(ALICE, VAULT, 0)];
        let alloc = allocate(&scenario_inputs(), &rows).unwrap();
        assert!(alloc.credits.is_empty());
        assert_eq!(alloc.balances, rows.to_vec());
    }

    #[test]
    fn allocate_is_deterministic() {
        let rows = [share(ALICE, VAULT, 30), share(BOB, VAULT, 77)];
        let a = allocate(&scenario_inputs(), &rows).unwrap();
        let b = allocate(&scenario_inputs(), &rows).unwrap();
        assert_eq!(a.credits, b.credits);
        assert_eq!(a.balances, b.balances);
    }

    #[test]
    fn mul_div_widens_intermediate_product() {
        let big = U256::MAX;
        assert_eq!(mul_div(big, u(3), u(3)), Some(Ok(big)));
        assert_eq!(mul_div(big, u(3), u(1)), Some(Err(AllocationError::Overflow)));
        assert_eq!(mul_div(u(1), u(1), U256::ZERO), None);
    }
}
