//! Read-through market data store.
//!
//! [`MarketData`] wraps a spot source and an option chain source and caches
//! every session it hands out, keyed by (date, instrument). Nothing is ever
//! evicted: the cache lives exactly as long as the store, and the store is
//! shared read-only between concurrent runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::loader::DataError;
use super::sources::{OptionChainSource, SpotSource};
use super::types::{Bar, ContractKey, InstrumentSelector, OptionType, Session, SessionKey};

/// Shared, lazily populated market data.
pub struct MarketData {
    spot: Box<dyn SpotSource>,
    chain: Box<dyn OptionChainSource>,
    expiries: Vec<NaiveDate>,
    sessions: RwLock<HashMap<SessionKey, Session>>,
    contracts: RwLock<HashMap<ContractKey, Arc<[Bar]>>>,
    strikes: RwLock<HashMap<(NaiveDate, OptionType), Arc<[Decimal]>>>,
}

impl MarketData {
    /// Create a store. Only the expiry list is read up front.
    pub fn new(
        spot: impl SpotSource + 'static,
        chain: impl OptionChainSource + 'static,
    ) -> Result<Self, DataError> {
        let expiries = chain.expiries()?;
        Ok(Self {
            spot: Box::new(spot),
            chain: Box::new(chain),
            expiries,
            sessions: RwLock::new(HashMap::new()),
            contracts: RwLock::new(HashMap::new()),
            strikes: RwLock::new(HashMap::new()),
        })
    }

    /// All listed expiries, ascending.
    pub fn expiries(&self) -> &[NaiveDate] {
        &self.expiries
    }

    /// The `rank`-th expiry on or after `date` (rank 0 = nearest).
    pub fn expiry_for(&self, date: NaiveDate, rank: usize) -> Option<NaiveDate> {
        let start = self.expiries.partition_point(|e| *e < date);
        self.expiries.get(start + rank).copied()
    }

    /// Spot dates, ascending.
    pub fn spot_dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        self.spot.dates()
    }

    /// Dates on which both spot data and an eligible expiry exist, and the
    /// option source (if it can tell) has rows, limited to `[start, end]`.
    pub fn trading_dates(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        expiry_rank: usize,
    ) -> Result<Vec<NaiveDate>, DataError> {
        let option_dates: Option<BTreeSet<NaiveDate>> =
            self.chain.trading_dates()?.map(|d| d.into_iter().collect());

        Ok(self
            .spot
            .dates()?
            .into_iter()
            .filter(|d| start.map_or(true, |s| *d >= s))
            .filter(|d| end.map_or(true, |e| *d <= e))
            .filter(|d| self.expiry_for(*d, expiry_rank).is_some())
            .filter(|d| option_dates.as_ref().map_or(true, |set| set.contains(d)))
            .collect())
    }

    /// Strikes listed for an expiry and option type.
    pub fn strikes(
        &self,
        expiry: NaiveDate,
        option_type: OptionType,
    ) -> Result<Arc<[Decimal]>, DataError> {
        let key = (expiry, option_type);
        if let Some(strikes) = read_cached(&self.strikes, &key) {
            return Ok(strikes);
        }
        let strikes: Arc<[Decimal]> = self.chain.strikes(expiry, option_type)?.into();
        Ok(insert_cached(&self.strikes, key, strikes))
    }

    /// Whether a contract's strike is listed.
    pub fn has_strike(&self, contract: &ContractKey) -> Result<bool, DataError> {
        let strikes = self.strikes(contract.expiry, contract.option_type)?;
        Ok(strikes.binary_search(&contract.strike).is_ok())
    }

    /// Spot bars for one date. `DataNotFound` when the session is missing or empty.
    pub fn spot_session(&self, date: NaiveDate) -> Result<Session, DataError> {
        let key = SessionKey {
            date,
            instrument: InstrumentSelector::Spot,
        };
        if let Some(session) = read_cached(&self.sessions, &key) {
            return Ok(session);
        }

        let bars = self.spot.load_session(date)?;
        if bars.is_empty() {
            return Err(DataError::DataNotFound(format!("spot session {}", date)));
        }
        Ok(insert_cached(&self.sessions, key, bars.into()))
    }

    /// Option bars of one contract for one date.
    pub fn option_session(
        &self,
        contract: &ContractKey,
        date: NaiveDate,
    ) -> Result<Session, DataError> {
        let key = SessionKey {
            date,
            instrument: InstrumentSelector::Option(*contract),
        };
        if let Some(session) = read_cached(&self.sessions, &key) {
            return Ok(session);
        }

        let series = self.contract_series(contract)?;
        let bars: Vec<Bar> = series.iter().filter(|b| b.date() == date).cloned().collect();
        if bars.is_empty() {
            return Err(DataError::DataNotFound(format!("{} on {}", contract, date)));
        }
        Ok(insert_cached(&self.sessions, key, bars.into()))
    }

    /// Number of cached sessions.
    pub fn cached_sessions(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn contract_series(&self, contract: &ContractKey) -> Result<Arc<[Bar]>, DataError> {
        if let Some(series) = read_cached(&self.contracts, contract) {
            return Ok(series);
        }
        let series: Arc<[Bar]> = self.chain.load_contract(contract)?.into();
        Ok(insert_cached(&self.contracts, *contract, series))
    }
}

fn read_cached<K, V>(cache: &RwLock<HashMap<K, V>>, key: &K) -> Option<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

/// Insert unless another reader won the race; always return the cached value.
fn insert_cached<K, V>(cache: &RwLock<HashMap<K, V>>, key: K, value: V) -> V
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key)
        .or_insert(value)
        .clone()
}
