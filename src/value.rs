//! Domain types shared by every component: the fixed key set, the
//! upstream identifiers those keys are bound to, and the tagged value
//! shape returned for each key.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed, configuration-defined price identifiers.
///
/// The set is closed at startup; the service does not accept arbitrary
/// keys at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceKey {
    /// Crypto spot price (e.g. BTC/USD).
    Btc,
    /// FX rate (e.g. EUR/USD).
    EurUsd,
    /// Primary equity market-data ticker.
    Mstr,
    /// Preferred-ticker market-data key.
    Strf,
    /// Preferred-ticker market-data key.
    Strc,
    /// Preferred-ticker market-data key.
    Strk,
    /// Preferred-ticker market-data key.
    Strd,
}

/// All known keys, in the fixed order used by the scheduler and the
/// sequential market-data tail of `fetchAll`.
pub const ALL_KEYS: [PriceKey; 7] = [
    PriceKey::Btc,
    PriceKey::EurUsd,
    PriceKey::Mstr,
    PriceKey::Strf,
    PriceKey::Strc,
    PriceKey::Strk,
    PriceKey::Strd,
];

/// Market-data keys only, in the fixed dispatch order for the sequential
/// tail of `fetchAll`.
pub const MARKET_DATA_KEYS: [PriceKey; 5] = [
    PriceKey::Mstr,
    PriceKey::Strf,
    PriceKey::Strc,
    PriceKey::Strk,
    PriceKey::Strd,
];

/// Keys with no declared quota, fetched concurrently ("parallel head").
pub const NO_QUOTA_KEYS: [PriceKey; 2] = [PriceKey::Btc, PriceKey::EurUsd];

impl PriceKey {
    /// Stable wire identifier. Uppercase ticker symbols for market-data
    /// keys, lowercase identifiers for the others — clients key off this
    /// exact casing.
    pub const fn wire_name(self) -> &'static str {
        match self {
            PriceKey::Btc => "btc",
            PriceKey::EurUsd => "eurUsd",
            PriceKey::Mstr => "MSTR",
            PriceKey::Strf => "STRF",
            PriceKey::Strc => "STRC",
            PriceKey::Strk => "STRK",
            PriceKey::Strd => "STRD",
        }
    }

    /// The upstream identifier this key is bound to. Market-data keys
    /// all share one identifier so they share one quota.
    pub const fn upstream(self) -> Upstream {
        match self {
            PriceKey::Btc => Upstream::Crypto,
            PriceKey::EurUsd => Upstream::Fx,
            PriceKey::Mstr | PriceKey::Strf | PriceKey::Strc | PriceKey::Strk | PriceKey::Strd => {
                Upstream::MarketData
            }
        }
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Identifies one of the three upstream oracles. The Rate Limiter keys
/// its ledgers by this identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Crypto,
    Fx,
    MarketData,
}

impl Upstream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Upstream::Crypto => "crypto",
            Upstream::Fx => "fx",
            Upstream::MarketData => "market-data",
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A price value. Modelled as a tagged variant rather than a bag of
/// optional fields on one struct, so that "a scalar is not a record" is
/// an invariant of the type rather than a convention callers must keep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriceValue {
    /// Used for the crypto key and the FX key.
    Scalar(#[serde(with = "rust_decimal::serde::float")] Decimal),
    /// Market-data record. `high`/`low`/`volume` are optional because not
    /// every market-data response carries them.
    Quote {
        #[serde(with = "rust_decimal::serde::float")]
        price: Decimal,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "rust_decimal::serde::float_option"
        )]
        high: Option<Decimal>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "rust_decimal::serde::float_option"
        )]
        low: Option<Decimal>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "rust_decimal::serde::float_option"
        )]
        volume: Option<Decimal>,
    },
}

impl PriceValue {
    pub fn scalar(value: Decimal) -> Self {
        PriceValue::Scalar(value)
    }

    pub fn quote(price: Decimal) -> Self {
        PriceValue::Quote {
            price,
            high: None,
            low: None,
            volume: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_spec_casing() {
        assert_eq!(PriceKey::Btc.wire_name(), "btc");
        assert_eq!(PriceKey::EurUsd.wire_name(), "eurUsd");
        assert_eq!(PriceKey::Mstr.wire_name(), "MSTR");
        assert_eq!(PriceKey::Strd.wire_name(), "STRD");
    }

    #[test]
    fn market_data_keys_share_one_upstream() {
        for key in MARKET_DATA_KEYS {
            assert_eq!(key.upstream(), Upstream::MarketData);
        }
        assert_eq!(PriceKey::Btc.upstream(), Upstream::Crypto);
        assert_eq!(PriceKey::EurUsd.upstream(), Upstream::Fx);
    }

    #[test]
    fn scalar_serialises_as_bare_number() {
        let v = PriceValue::scalar(Decimal::new(1000050, 2));
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "10000.50");
    }

    #[test]
    fn quote_omits_absent_fields() {
        let v = PriceValue::quote(Decimal::new(42000, 2));
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"price\":420.00"));
        assert!(!json.contains("high"));
    }
}
