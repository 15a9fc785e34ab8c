// ===============================
// src/ledger.rs (per-user token accumulators + symbol cache)
// ===============================
use ahash::AHashMap as HashMap;
use alloy::primitives::{Address, U256};
use indexmap::IndexMap;

use crate::allocation::VaultAllocation;

/// user -> token -> amount, urutan = urutan pertama kali terlihat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTokenAmounts {
    users: IndexMap<Address, IndexMap<Address, U256>>,
}

impl UserTokenAmounts {
    pub fn initialize(&mut self, user: Address, token0: Address, token1: Address) {
        let tokens = self.users.entry(user).or_default();
        tokens.entry(token0).or_insert(U256::ZERO);
        tokens.entry(token1).or_insert(U256::ZERO);
    }

    pub fn add(&mut self, user: Address, token: Address, amount: U256) {
        *self.users.entry(user).or_default().entry(token).or_insert(U256::ZERO) += amount;
    }

    pub fn get(&self, user: &Address, token: &Address) -> Option<U256> {
        self.users.get(user).and_then(|t| t.get(token)).copied()
    }

    pub fn tokens(&self, user: &Address) -> Option<&IndexMap<Address, U256>> {
        self.users.get(user)
    }

    pub fn users(&self) -> impl Iterator<Item = &Address> {
        self.users.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Dua akumulator terpisah, dimiliki caller per block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TvlLedger {
    pub active: UserTokenAmounts,
    pub inactive: UserTokenAmounts,
}

impl TvlLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit hasil satu vault. Kedua token pool diinisialisasi di kedua akumulator
    /// supaya baris aktif tetap muncul walau jumlahnya nol.
    pub fn apply(&mut self, allocation: &VaultAllocation) {
        let (t0, t1) = (allocation.token0, allocation.token1);
        for c in &allocation.credits {
            self.active.initialize(c.user, t0, t1);
            self.inactive.initialize(c.user, t0, t1);

            self.active.add(c.user, t0, c.active0);
            self.active.add(c.user, t1, c.active1);
            self.inactive.add(c.user, t0, c.inactive0);
            self.inactive.add(c.user, t1, c.inactive1);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive.is_empty()
    }
}

/// token address -> symbol, hidup selama proses. String kosong = gagal resolve.
#[derive(Debug, Clone, Default)]
pub struct SymbolCache {
    symbols: HashMap<Address, String>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.symbols.contains_key(token)
    }

    pub fn insert(&mut self, token: Address, symbol: String) {
        self.symbols.insert(token, symbol);
    }

    pub fn symbol(&self, token: &Address) -> &str {
        self.symbols.get(token).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::allocation::UserTokenCredit;

    const T0: Address = Address::repeat_byte(0x10);
    const T1: Address = Address::repeat_byte(0x11);
    const T2: Address = Address::repeat_byte(0x12);

    fn credit(user: Address, a0: u64, a1: u64, i0: u64, i1: u64) -> UserTokenCredit {
        UserTokenCredit {
            user,
            active0: U256::from(a0),
            active1: U256::from(a1),
            inactive0: U256::from(i0),
            inactive1: U256::from(i1),
        }
    }

    fn allocation(token0: Address, token1: Address, credits: Vec<UserTokenCredit>) -> VaultAllocation {
        VaultAllocation {
            vault: Address::repeat_byte(0xaa),
            token0,
            token1,
            balances: vec![],
            credits,
        }
    }

    #[test]
    fn vaults_sharing_a_token_are_merged() {
        let user = Address::repeat_byte(0x01);
        let mut ledger = TvlLedger::new();
        ledger.apply(&allocation(T0, T1, vec![credit(user, 4, 8, 1, 0)]));
        ledger.apply(&allocation(T1, T2, vec![credit(user, 3, 5, 0, 2)]));

        assert_eq!(ledger.active.get(&user, &T0), Some(U256::from(4)));
        assert_eq!(ledger.active.get(&user, &T1), Some(U256::from(11)));
        assert_eq!(ledger.active.get(&user, &T2), Some(U256::from(5)));
        assert_eq!(ledger.inactive.get(&user, &T1), Some(U256::ZERO));
        assert_eq!(ledger.inactive.get(&user, &T2), Some(U256::from(2)));

        let order: Vec<_> = ledger.active.tokens(&user).unwrap().keys().copied().collect();
        assert_eq!(order, vec![T0, T1, T2]);
    }

    #[test]
    fn mixed_case_addresses_share_one_key() {
        let lower = Address::from_str("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();
        let mixed = Address::from_str("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        let mut amounts = UserTokenAmounts::default();
        amounts.add(lower, T0, U256::from(1));
        amounts.add(mixed, T0, U256::from(2));

        assert_eq!(amounts.users().count(), 1);
        assert_eq!(amounts.get(&lower, &T0), Some(U256::from(3)));
    }

    #[test]
    fn empty_allocation_leaves_ledger_empty() {
        let mut ledger = TvlLedger::new();
        ledger.apply(&allocation(T0, T1, vec![]));
        assert!(ledger.is_empty());
    }

    #[test]
    fn unknown_symbol_defaults_to_empty() {
        let mut cache = SymbolCache::new();
        cache.insert(T0, "WETH".into());
        assert_eq!(cache.symbol(&T0), "WETH");
        assert_eq!(cache.symbol(&T1), "");
        assert!(!cache.contains(&T1));
        assert_eq!(cache.len(), 1);
    }
}
