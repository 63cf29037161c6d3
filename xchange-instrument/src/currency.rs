use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashSet;

/// A currency or crypto-asset code, e.g. `"USD"`, `"USDT"`, `"TON"`.
///
/// Always upper-cased on construction so map lookups and equality checks never
/// depend on the case a query or upstream payload happened to use.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Display, From, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Currency(SmolStr);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(SmolStr::new(code.as_ref().trim().to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Currency {
    fn from(value: &str) -> Self {
        Currency::new(value)
    }
}

/// The four disjoint routing classes a [`Currency`] can fall into, plus `Unknown`
/// for symbols the router must reject (spec §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum CurrencyClass {
    BridgeFiat,
    BridgeCrypto,
    Crypto,
    Fiat,
    Unknown,
}

impl CurrencyClass {
    pub fn is_known(self) -> bool {
        !matches!(self, CurrencyClass::Unknown)
    }
}

/// The quote asset the Spot provider prices every [`CurrencyClass::Crypto`]
/// against. Distinguished from [`USD`] per spec §3 ("USD and USDT are
/// distinguished from each other").
pub const USDT: &str = "USDT";

/// The fiat unit every [`CurrencyClass::Fiat`] rate is quoted against.
pub const USD: &str = "USD";

/// Classifies currencies into the four routing buckets described in spec §3.
///
/// Owns no rate data — just the static/dynamic membership sets a fresh cache is
/// seeded with. The Crypto/Fiat sets grow as the Spot/Fiat fetchers discover
/// tradeable symbols and priority targets; `bridge_fiat`/`bridge_crypto` are fixed
/// for the lifetime of the process (exactly one of each, per spec §3).
#[derive(Debug, Clone)]
pub struct CurrencyTable {
    bridge_fiat: Currency,
    bridge_crypto: Currency,
    crypto: HashSet<Currency>,
    fiat: HashSet<Currency>,
    /// Whether the parser should treat USD and USDT as interchangeable aliases.
    /// Spec §3 leaves this module-configurable; default `false` (see DESIGN.md).
    pub treat_usd_usdt_as_alias: bool,
}

impl CurrencyTable {
    pub fn new(bridge_fiat: Currency, bridge_crypto: Currency) -> Self {
        Self {
            bridge_fiat,
            bridge_crypto,
            crypto: HashSet::new(),
            fiat: HashSet::new(),
            treat_usd_usdt_as_alias: false,
        }
    }

    pub fn bridge_fiat(&self) -> &Currency {
        &self.bridge_fiat
    }

    pub fn bridge_crypto(&self) -> &Currency {
        &self.bridge_crypto
    }

    /// Register a symbol as tradeable against USDT on the Spot provider.
    pub fn register_crypto(&mut self, currency: Currency) {
        if currency.as_str() != USDT {
            self.crypto.insert(currency);
        }
    }

    /// Register a fiat currency priced against USD by the Fiat provider.
    pub fn register_fiat(&mut self, currency: Currency) {
        if currency.as_str() != USD {
            self.fiat.insert(currency);
        }
    }

    pub fn is_crypto(&self, currency: &Currency) -> bool {
        self.crypto.contains(currency)
    }

    pub fn is_fiat(&self, currency: &Currency) -> bool {
        self.fiat.contains(currency)
    }

    /// Classify a currency into one of the four routing buckets.
    pub fn classify(&self, currency: &Currency) -> CurrencyClass {
        if currency == &self.bridge_fiat {
            return CurrencyClass::BridgeFiat;
        }
        if currency == &self.bridge_crypto {
            return CurrencyClass::BridgeCrypto;
        }
        if currency.as_str() == USDT {
            return CurrencyClass::Crypto;
        }
        if currency.as_str() == USD {
            return CurrencyClass::Fiat;
        }
        if self.crypto.contains(currency) {
            return CurrencyClass::Crypto;
        }
        if self.fiat.contains(currency) {
            return CurrencyClass::Fiat;
        }
        CurrencyClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CurrencyTable {
        let mut table = CurrencyTable::new(Currency::new("rub"), Currency::new("ton"));
        table.register_crypto(Currency::new("btc"));
        table.register_fiat(Currency::new("eur"));
        table
    }

    #[test]
    fn classifies_bridge_endpoints() {
        let table = table();
        assert_eq!(
            table.classify(&Currency::new("RUB")),
            CurrencyClass::BridgeFiat
        );
        assert_eq!(
            table.classify(&Currency::new("TON")),
            CurrencyClass::BridgeCrypto
        );
    }

    #[test]
    fn classifies_quote_assets() {
        let table = table();
        assert_eq!(table.classify(&Currency::new("USDT")), CurrencyClass::Crypto);
        assert_eq!(table.classify(&Currency::new("USD")), CurrencyClass::Fiat);
    }

    #[test]
    fn classifies_registered_members() {
        let table = table();
        assert_eq!(table.classify(&Currency::new("BTC")), CurrencyClass::Crypto);
        assert_eq!(table.classify(&Currency::new("EUR")), CurrencyClass::Fiat);
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let table = table();
        assert_eq!(table.classify(&Currency::new("ZZZ")), CurrencyClass::Unknown);
    }

    #[test]
    fn currency_code_normalizes_case_and_whitespace() {
        assert_eq!(Currency::new(" usd \n"), Currency::new("USD"));
    }
}
