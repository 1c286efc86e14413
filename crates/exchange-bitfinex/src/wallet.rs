//! Wallet balance store.

use rust_decimal::Decimal;
use std::collections::HashMap;

use cycle_trade_core::constants::WalletType;

use crate::messages::WalletRecord;

/// Balance state for one (wallet, currency) slot.
///
/// `available` is `None` until the exchange has computed it; callers must
/// treat that as "unknown" and request a recalculation, never as zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletEntry {
    pub balance: Decimal,
    pub available: Option<Decimal>,
}

/// All wallet balances, keyed by wallet type then currency.
#[derive(Debug, Default)]
pub struct WalletStore {
    wallets: HashMap<WalletType, HashMap<String, WalletEntry>>,
}

impl WalletStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a single wallet row.
    pub fn update(&mut self, record: &WalletRecord) {
        self.wallets
            .entry(record.wallet_type)
            .or_default()
            .insert(
                record.currency.clone(),
                WalletEntry {
                    balance: record.balance,
                    available: record.available,
                },
            );
    }

    /// Upserts every row of a wallet snapshot.
    pub fn update_all(&mut self, records: &[WalletRecord]) {
        for record in records {
            self.update(record);
        }
    }

    /// Total balance; zero for slots never reported.
    #[must_use]
    pub fn balance(&self, wallet_type: WalletType, currency: &str) -> Decimal {
        self.entry(wallet_type, currency)
            .map_or(Decimal::ZERO, |e| e.balance)
    }

    /// Available balance; `None` when unreported or not yet computed.
    #[must_use]
    pub fn available_balance(&self, wallet_type: WalletType, currency: &str) -> Option<Decimal> {
        self.entry(wallet_type, currency).and_then(|e| e.available)
    }

    /// Every (wallet type, currency) slot seen so far.
    #[must_use]
    pub fn wallets_info(&self) -> Vec<(WalletType, String)> {
        let mut info: Vec<(WalletType, String)> = self
            .wallets
            .iter()
            .flat_map(|(wt, currencies)| currencies.keys().map(|c| (*wt, c.clone())))
            .collect();
        info.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
        info
    }

    /// Slots whose available balance the exchange has not computed yet;
    /// each needs an explicit recalculation request.
    #[must_use]
    pub fn missing_available(&self) -> Vec<(WalletType, String)> {
        self.wallets
            .iter()
            .flat_map(|(wt, currencies)| {
                currencies
                    .iter()
                    .filter(|(_, e)| e.available.is_none())
                    .map(|(c, _)| (*wt, c.clone()))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.wallets.clear();
    }

    fn entry(&self, wallet_type: WalletType, currency: &str) -> Option<&WalletEntry> {
        self.wallets.get(&wallet_type)?.get(currency)
    }
}
