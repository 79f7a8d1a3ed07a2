use crate::standardized_types::enums::{OptionRight, OptionStyle, SecurityType};
use crate::standardized_types::new_types::{Price, TickerName};
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};

// Bit layout of the packed properties word. Strike is stored in
// ten-thousandths, expiry as days since 1970-01-01.
const EXPIRY_SHIFT: u32 = 0;
const EXPIRY_BITS: u128 = (1 << 20) - 1;
const RIGHT_SHIFT: u32 = 20;
const STYLE_SHIFT: u32 = 21;
const MARKET_SHIFT: u32 = 22;
const MARKET_BITS: u128 = (1 << 10) - 1;
const TYPE_SHIFT: u32 = 32;
const TYPE_BITS: u128 = (1 << 4) - 1;
const STRIKE_SHIFT: u32 = 36;
const STRIKE_BITS: u128 = u64::MAX as u128;

pub const MAX_MARKET_CODE: u16 = 999;

/// Densely encoded, immutable identity of a tradeable instrument. Carries the
/// ticker root plus a packed word holding market code, security type and, for
/// options, strike, expiry, right and style. The canonical string form
/// `"{root} {base36(properties)}"` round-trips exactly.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SecurityIdentifier {
    root: String,
    properties: u128,
}

impl SecurityIdentifier {
    fn new(root: &str, market_code: u16, security_type: SecurityType) -> Self {
        let mut properties = 0u128;
        properties |= ((market_code as u128) & MARKET_BITS) << MARKET_SHIFT;
        properties |= ((security_type.code() as u128) & TYPE_BITS) << TYPE_SHIFT;
        SecurityIdentifier {
            root: root.to_uppercase(),
            properties,
        }
    }

    pub fn generate_equity(ticker: &str, market_code: u16) -> Self {
        Self::new(ticker, market_code, SecurityType::Equity)
    }

    pub fn generate_forex(pair: &str, market_code: u16) -> Self {
        Self::new(pair, market_code, SecurityType::Forex)
    }

    pub fn generate_future(root: &str, market_code: u16) -> Self {
        Self::new(root, market_code, SecurityType::Future)
    }

    pub fn generate_crypto(pair: &str, market_code: u16) -> Self {
        Self::new(pair, market_code, SecurityType::Crypto)
    }

    pub fn generate_custom(name: &str, market_code: u16) -> Self {
        Self::new(name, market_code, SecurityType::Custom)
    }

    pub fn generate_option(
        underlying: &str,
        market_code: u16,
        expiry: NaiveDate,
        strike: Price,
        right: OptionRight,
        style: OptionStyle,
    ) -> Self {
        let mut sid = Self::new(underlying, market_code, SecurityType::Option);
        let days = expiry
            .signed_duration_since(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .num_days()
            .max(0) as u128;
        let strike_ths = (strike * Decimal::from(10_000))
            .round()
            .to_u64()
            .unwrap_or(0) as u128;
        sid.properties |= (days & EXPIRY_BITS) << EXPIRY_SHIFT;
        sid.properties |= ((right as u128) & 1) << RIGHT_SHIFT;
        sid.properties |= ((style as u128) & 1) << STYLE_SHIFT;
        sid.properties |= (strike_ths & STRIKE_BITS) << STRIKE_SHIFT;
        sid
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn market_code(&self) -> u16 {
        ((self.properties >> MARKET_SHIFT) & MARKET_BITS) as u16
    }

    pub fn security_type(&self) -> SecurityType {
        SecurityType::from_code(((self.properties >> TYPE_SHIFT) & TYPE_BITS) as u8)
            .expect("SecurityIdentifier holds an undecodable security type")
    }

    pub fn strike(&self) -> Price {
        let ths = ((self.properties >> STRIKE_SHIFT) & STRIKE_BITS) as i64;
        Decimal::new(ths, 4)
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        let days = ((self.properties >> EXPIRY_SHIFT) & EXPIRY_BITS) as i64;
        if days == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().checked_add_days(chrono::Days::new(days as u64))
    }

    pub fn option_right(&self) -> OptionRight {
        if (self.properties >> RIGHT_SHIFT) & 1 == 0 {
            OptionRight::Call
        } else {
            OptionRight::Put
        }
    }

    pub fn option_style(&self) -> OptionStyle {
        if (self.properties >> STYLE_SHIFT) & 1 == 0 {
            OptionStyle::American
        } else {
            OptionStyle::European
        }
    }

    /// The chain-grouping identity for option contracts: same root, market
    /// and type with strike and expiry zeroed. Non-options return themselves.
    pub fn canonical(&self) -> SecurityIdentifier {
        if self.security_type() != SecurityType::Option {
            return self.clone();
        }
        Self::new(&self.root, self.market_code(), SecurityType::Option)
    }

    pub fn is_canonical(&self) -> bool {
        self.security_type() == SecurityType::Option && self.expiry().is_none()
    }

    /// Canonical string form, round-trips through `from_str`.
    pub fn to_canonical_string(&self) -> String {
        format!("{} {}", self.root, encode_base36(self.properties))
    }
}

impl fmt::Display for SecurityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for SecurityIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, encoded) = s
            .rsplit_once(' ')
            .ok_or_else(|| format!("Malformed security identifier: {}", s))?;
        let properties = decode_base36(encoded)?;
        let sid = SecurityIdentifier {
            root: root.to_uppercase(),
            properties,
        };
        // Reject words that decode but carry an invalid type nibble.
        SecurityType::from_code(((properties >> TYPE_SHIFT) & TYPE_BITS) as u8)
            .ok_or_else(|| format!("Invalid security type in identifier: {}", s))?;
        Ok(sid)
    }
}

impl Serialize for SecurityIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for SecurityIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SecurityIdentifier::from_str(&s).map_err(serde::de::Error::custom)
    }
}

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn encode_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

fn decode_base36(s: &str) -> Result<u128, String> {
    let mut value: u128 = 0;
    for c in s.bytes() {
        let digit = match c {
            b'0'..=b'9' => (c - b'0') as u128,
            b'A'..=b'Z' => (c - b'A') as u128 + 10,
            b'a'..=b'z' => (c - b'a') as u128 + 10,
            _ => return Err(format!("Invalid base36 digit: {}", c as char)),
        };
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| "Base36 overflow".to_string())?;
    }
    Ok(value)
}

/// An instrument handle: identity plus the human ticker it currently trades
/// under. Equality and hashing go through the identifier only, the ticker is
/// display metadata that can change over time via map files.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub sid: SecurityIdentifier,
    pub ticker: TickerName,
}

impl Symbol {
    pub fn new(sid: SecurityIdentifier, ticker: TickerName) -> Self {
        Symbol {
            sid,
            ticker: ticker.to_uppercase(),
        }
    }

    pub fn security_type(&self) -> SecurityType {
        self.sid.security_type()
    }

    pub fn canonical(&self) -> Symbol {
        Symbol {
            sid: self.sid.canonical(),
            ticker: self.ticker.clone(),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.sid == other.sid
    }
}

impl Eq for Symbol {}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sid.cmp(&other.sid)
    }
}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sid.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}|{}", self.ticker, self.sid.to_canonical_string()))
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (ticker, sid) = s
            .split_once('|')
            .ok_or_else(|| serde::de::Error::custom("Malformed symbol"))?;
        Ok(Symbol {
            ticker: ticker.to_string(),
            sid: SecurityIdentifier::from_str(sid).map_err(serde::de::Error::custom)?,
        })
    }
}

/// Enumerates market names into the small-integer codes packed inside
/// `SecurityIdentifier`. Lives on the engine context, not in a global.
pub struct MarketRegistry {
    codes: DashMap<String, u16>,
    names: DashMap<u16, String>,
    next_code: AtomicU16,
}

impl MarketRegistry {
    pub fn new() -> Self {
        let registry = MarketRegistry {
            codes: DashMap::new(),
            names: DashMap::new(),
            next_code: AtomicU16::new(1),
        };
        for market in ["usa", "cme", "oanda", "binance"] {
            registry.register(market).expect("default market registration");
        }
        registry
    }

    pub fn register(&self, market: &str) -> Result<u16, String> {
        let market = market.to_lowercase();
        if let Some(code) = self.codes.get(&market) {
            return Ok(*code);
        }
        let code = self.next_code.fetch_add(1, Ordering::SeqCst);
        if code > MAX_MARKET_CODE {
            return Err(format!("Market registry exhausted registering: {}", market));
        }
        self.codes.insert(market.clone(), code);
        self.names.insert(code, market);
        Ok(code)
    }

    pub fn code(&self, market: &str) -> Option<u16> {
        self.codes.get(&market.to_lowercase()).map(|c| *c)
    }

    pub fn name(&self, code: u16) -> Option<String> {
        self.names.get(&code).map(|n| n.clone())
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional ticker to symbol cache. Inserts on add-security, cleared on
/// engine reset. Shared, all operations are O(1).
pub struct SymbolCache {
    by_ticker: DashMap<TickerName, Symbol>,
    by_sid: DashMap<SecurityIdentifier, TickerName>,
}

impl SymbolCache {
    pub fn new() -> Self {
        SymbolCache {
            by_ticker: DashMap::new(),
            by_sid: DashMap::new(),
        }
    }

    pub fn insert(&self, symbol: Symbol) {
        self.by_sid.insert(symbol.sid.clone(), symbol.ticker.clone());
        self.by_ticker.insert(symbol.ticker.clone(), symbol);
    }

    pub fn by_ticker(&self, ticker: &str) -> Option<Symbol> {
        self.by_ticker.get(&ticker.to_uppercase()).map(|s| s.clone())
    }

    pub fn ticker_of(&self, sid: &SecurityIdentifier) -> Option<TickerName> {
        self.by_sid.get(sid).map(|t| t.clone())
    }

    pub fn clear(&self) {
        self.by_ticker.clear();
        self.by_sid.clear();
    }
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn equity_identifier_round_trips() {
        let sid = SecurityIdentifier::generate_equity("AAPL", 1);
        let canonical = sid.to_canonical_string();
        let decoded = SecurityIdentifier::from_str(&canonical).unwrap();
        assert_eq!(decoded, sid);
        assert_eq!(decoded.market_code(), 1);
        assert_eq!(decoded.security_type(), SecurityType::Equity);
        assert_eq!(decoded.expiry(), None);
    }

    #[test]
    fn option_identifier_round_trips() {
        let expiry = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let sid = SecurityIdentifier::generate_option(
            "AAPL",
            1,
            expiry,
            dec!(192.50),
            OptionRight::Put,
            OptionStyle::American,
        );
        let decoded = SecurityIdentifier::from_str(&sid.to_canonical_string()).unwrap();
        assert_eq!(decoded, sid);
        assert_eq!(decoded.strike(), dec!(192.50));
        assert_eq!(decoded.expiry(), Some(expiry));
        assert_eq!(decoded.option_right(), OptionRight::Put);
        assert_eq!(decoded.option_style(), OptionStyle::American);
    }

    #[test]
    fn canonical_option_groups_contracts() {
        let expiry = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let call = SecurityIdentifier::generate_option(
            "SPY",
            1,
            expiry,
            dec!(500),
            OptionRight::Call,
            OptionStyle::American,
        );
        let put = SecurityIdentifier::generate_option(
            "SPY",
            1,
            expiry,
            dec!(480),
            OptionRight::Put,
            OptionStyle::American,
        );
        assert_ne!(call, put);
        assert_eq!(call.canonical(), put.canonical());
        assert!(call.canonical().is_canonical());
    }

    #[test]
    fn symbol_equality_ignores_ticker() {
        let sid = SecurityIdentifier::generate_equity("GOOG", 1);
        let a = Symbol::new(sid.clone(), "GOOG".to_string());
        let b = Symbol::new(sid, "GOOGL".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn market_registry_is_stable() {
        let registry = MarketRegistry::new();
        let usa = registry.code("usa").unwrap();
        assert_eq!(registry.register("usa").unwrap(), usa);
        let new_code = registry.register("asx").unwrap();
        assert_eq!(registry.name(new_code).unwrap(), "asx");
    }

    #[test]
    fn symbol_cache_round_trips_and_clears() {
        let cache = SymbolCache::new();
        let symbol = Symbol::new(SecurityIdentifier::generate_equity("MSFT", 1), "MSFT".to_string());
        cache.insert(symbol.clone());
        assert_eq!(cache.by_ticker("msft").unwrap(), symbol);
        assert_eq!(cache.ticker_of(&symbol.sid).unwrap(), "MSFT");
        cache.clear();
        assert!(cache.by_ticker("MSFT").is_none());
    }
}
