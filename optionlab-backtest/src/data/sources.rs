//! Market data sources.
//!
//! A source knows where bars live on disk (or in memory) and how to read
//! them. Sources do not cache bars: [`MarketData`](super::MarketData)
//! layers the read-through cache on top, so every ingestion mode produces
//! the same output contract.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::loader::{finalize_bars, read_bars, read_symbol_bars, DataError};
use super::symbol::parse_symbol;
use super::types::{Bar, ContractKey, OptionType};

/// Source of spot (underlying) bars.
pub trait SpotSource: Send + Sync {
    /// All dates with spot data, ascending.
    fn dates(&self) -> Result<Vec<NaiveDate>, DataError>;

    /// Bars for one date. Fails with `DataNotFound` when the date is absent.
    fn load_session(&self, date: NaiveDate) -> Result<Vec<Bar>, DataError>;
}

/// Source of option contract bars.
pub trait OptionChainSource: Send + Sync {
    /// All listed expiries, ascending.
    fn expiries(&self) -> Result<Vec<NaiveDate>, DataError>;

    /// Strikes available for an expiry and option type, ascending.
    fn strikes(&self, expiry: NaiveDate, option_type: OptionType) -> Result<Vec<Decimal>, DataError>;

    /// Every bar of a contract across all its trading dates.
    fn load_contract(&self, contract: &ContractKey) -> Result<Vec<Bar>, DataError>;

    /// Dates with at least one option row, ascending. `None` when the
    /// source cannot tell, in which case every spot date is eligible.
    fn trading_dates(&self) -> Result<Option<Vec<NaiveDate>>, DataError> {
        Ok(None)
    }
}

fn group_by_date(bars: Vec<Bar>) -> BTreeMap<NaiveDate, Vec<Bar>> {
    let mut sessions: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        sessions.entry(bar.date()).or_default().push(bar);
    }
    sessions
}

/// Spot data held in a single CSV file, partitioned by date on open.
pub struct SpotCsvFile {
    path: PathBuf,
    sessions: BTreeMap<NaiveDate, Vec<Bar>>,
}

impl SpotCsvFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref().to_path_buf();
        let sessions = group_by_date(read_bars(&path)?);
        info!(path = %path.display(), days = sessions.len(), "Loaded spot file");
        Ok(Self { path, sessions })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SpotSource for SpotCsvFile {
    fn dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        Ok(self.sessions.keys().copied().collect())
    }

    fn load_session(&self, date: NaiveDate) -> Result<Vec<Bar>, DataError> {
        self.sessions
            .get(&date)
            .cloned()
            .ok_or_else(|| DataError::DataNotFound(format!("spot session {}", date)))
    }
}

/// Spot data as one CSV per date, named `YYYY-MM-DD.csv` or `YYYYMMDD.csv`.
pub struct SpotCsvFolder {
    root: PathBuf,
}

impl SpotCsvFolder {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DataError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DataError::DataNotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    fn session_path(&self, date: NaiveDate) -> Option<PathBuf> {
        [
            format!("{}.csv", date.format("%Y-%m-%d")),
            format!("{}.csv", date.format("%Y%m%d")),
        ]
        .into_iter()
        .map(|name| self.root.join(name))
        .find(|p| p.exists())
    }
}

impl SpotSource for SpotCsvFolder {
    fn dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let date = NaiveDate::parse_from_str(stem, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(stem, "%Y%m%d"));
            if let Ok(date) = date {
                dates.push(date);
            }
        }
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    fn load_session(&self, date: NaiveDate) -> Result<Vec<Bar>, DataError> {
        let path = self
            .session_path(date)
            .ok_or_else(|| DataError::DataNotFound(format!("spot session {}", date)))?;
        let bars: Vec<Bar> = read_bars(&path)?
            .into_iter()
            .filter(|b| b.date() == date)
            .collect();
        Ok(bars)
    }
}

/// Option data laid out as `<root>/<expiry>/<strike>_<CE|PE>.csv`.
pub struct ExpiryFolderSource {
    root: PathBuf,
    expiry_folders: BTreeMap<NaiveDate, PathBuf>,
    dates: OnceLock<Vec<NaiveDate>>,
}

impl ExpiryFolderSource {
    /// Scan `root` for expiry folders. Folders not named `YYYY-MM-DD` are ignored.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DataError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DataError::DataNotFound(root.display().to_string()));
        }

        let mut expiry_folders = BTreeMap::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Ok(expiry) = NaiveDate::parse_from_str(&name.to_string_lossy(), "%Y-%m-%d") {
                expiry_folders.insert(expiry, entry.path());
            }
        }

        info!(root = %root.display(), expiries = expiry_folders.len(), "Found expiry folders");
        Ok(Self {
            root,
            expiry_folders,
            dates: OnceLock::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder(&self, expiry: NaiveDate) -> Result<&PathBuf, DataError> {
        self.expiry_folders
            .get(&expiry)
            .ok_or_else(|| DataError::DataNotFound(format!("expiry folder {}", expiry)))
    }

    /// Every contract file of every expiry folder.
    fn contract_files(&self) -> Result<Vec<PathBuf>, DataError> {
        let mut files = Vec::new();
        for folder in self.expiry_folders.values() {
            files.extend(csv_files(folder)?);
        }
        Ok(files)
    }

    /// Read every contract file once and collect the dates it covers.
    fn scan_dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        let files = self.contract_files()?;
        let per_file = files
            .par_iter()
            .map(|path| {
                let bars = read_bars(path)?;
                Ok::<_, DataError>(bars.iter().map(Bar::date).collect::<BTreeSet<_>>())
            })
            .collect::<Result<Vec<_>, DataError>>()?;
        let dates: BTreeSet<NaiveDate> = per_file.into_iter().flatten().collect();
        info!(
            root = %self.root.display(),
            files = files.len(),
            days = dates.len(),
            "Scanned option dates"
        );
        Ok(dates.into_iter().collect())
    }
}

fn csv_files(folder: &Path) -> Result<Vec<PathBuf>, DataError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    Ok(files)
}

impl OptionChainSource for ExpiryFolderSource {
    fn expiries(&self) -> Result<Vec<NaiveDate>, DataError> {
        Ok(self.expiry_folders.keys().copied().collect())
    }

    fn strikes(&self, expiry: NaiveDate, option_type: OptionType) -> Result<Vec<Decimal>, DataError> {
        let folder = self.folder(expiry)?;
        let mut strikes = BTreeSet::new();
        for path in csv_files(folder)? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((strike, kind)) = stem.rsplit_once('_') else {
                continue;
            };
            if OptionType::from_str(kind) != Some(option_type) {
                continue;
            }
            if let Ok(strike) = Decimal::from_str(strike) {
                strikes.insert(strike.normalize());
            }
        }
        Ok(strikes.into_iter().collect())
    }

    fn load_contract(&self, contract: &ContractKey) -> Result<Vec<Bar>, DataError> {
        let folder = self.folder(contract.expiry)?;
        let suffix = contract.option_type.as_str();
        let strike = contract.strike.normalize();

        // Files are written either as `21500_CE.csv` or `21500.0_CE.csv`.
        let mut candidates = vec![folder.join(format!("{}_{}.csv", strike, suffix))];
        if strike.fract().is_zero() {
            candidates.push(folder.join(format!("{}.0_{}.csv", strike, suffix)));
        }

        let path = candidates
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| DataError::DataNotFound(format!("contract {}", contract)))?;
        read_bars(&path)
    }

    fn trading_dates(&self) -> Result<Option<Vec<NaiveDate>>, DataError> {
        if let Some(dates) = self.dates.get() {
            return Ok(Some(dates.clone()));
        }
        let dates = self.scan_dates()?;
        Ok(Some(self.dates.get_or_init(|| dates).clone()))
    }
}

/// Option data in one CSV keyed by a `symbol` column.
///
/// The whole file is parsed on open; rows whose symbol cannot be decoded
/// are skipped with a warning.
pub struct CombinedCsvSource {
    contracts: HashMap<ContractKey, Vec<Bar>>,
    dates: BTreeSet<NaiveDate>,
}

impl CombinedCsvSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let grouped = read_symbol_bars(path)?;

        let mut contracts: HashMap<ContractKey, Vec<Bar>> = HashMap::new();
        let mut unknown = 0usize;
        for (symbol, bars) in grouped {
            match parse_symbol(&symbol) {
                Some(parsed) => contracts.entry(parsed.contract).or_default().extend(bars),
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            warn!(path = %path.display(), unknown, "Skipped unrecognised option symbols");
        }

        let contracts: HashMap<_, _> = contracts
            .into_iter()
            .map(|(key, bars)| (key, finalize_bars(bars)))
            .collect();
        let dates = contracts
            .values()
            .flat_map(|bars| bars.iter().map(Bar::date))
            .collect();

        info!(path = %path.display(), contracts = contracts.len(), "Loaded combined option file");
        Ok(Self { contracts, dates })
    }
}

impl OptionChainSource for CombinedCsvSource {
    fn expiries(&self) -> Result<Vec<NaiveDate>, DataError> {
        let expiries: BTreeSet<_> = self.contracts.keys().map(|k| k.expiry).collect();
        Ok(expiries.into_iter().collect())
    }

    fn strikes(&self, expiry: NaiveDate, option_type: OptionType) -> Result<Vec<Decimal>, DataError> {
        let strikes: BTreeSet<_> = self
            .contracts
            .keys()
            .filter(|k| k.expiry == expiry && k.option_type == option_type)
            .map(|k| k.strike)
            .collect();
        Ok(strikes.into_iter().collect())
    }

    fn load_contract(&self, contract: &ContractKey) -> Result<Vec<Bar>, DataError> {
        self.contracts
            .get(contract)
            .cloned()
            .ok_or_else(|| DataError::DataNotFound(format!("contract {}", contract)))
    }

    fn trading_dates(&self) -> Result<Option<Vec<NaiveDate>>, DataError> {
        Ok(Some(self.dates.iter().copied().collect()))
    }
}

/// In-memory spot and option data, for programmatic use and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    spot: BTreeMap<NaiveDate, Vec<Bar>>,
    contracts: HashMap<ContractKey, Vec<Bar>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add spot bars; they are grouped by date.
    pub fn with_spot(mut self, bars: Vec<Bar>) -> Self {
        for (date, session) in group_by_date(bars) {
            let entry = self.spot.entry(date).or_default();
            entry.extend(session);
            *entry = finalize_bars(std::mem::take(entry));
        }
        self
    }

    /// Add bars for one contract.
    pub fn with_contract(mut self, contract: ContractKey, bars: Vec<Bar>) -> Self {
        let entry = self.contracts.entry(contract).or_default();
        entry.extend(bars);
        *entry = finalize_bars(std::mem::take(entry));
        self
    }
}

impl SpotSource for InMemorySource {
    fn dates(&self) -> Result<Vec<NaiveDate>, DataError> {
        Ok(self.spot.keys().copied().collect())
    }

    fn load_session(&self, date: NaiveDate) -> Result<Vec<Bar>, DataError> {
        self.spot
            .get(&date)
            .cloned()
            .ok_or_else(|| DataError::DataNotFound(format!("spot session {}", date)))
    }
}

impl OptionChainSource for InMemorySource {
    fn expiries(&self) -> Result<Vec<NaiveDate>, DataError> {
        let expiries: BTreeSet<_> = self.contracts.keys().map(|k| k.expiry).collect();
        Ok(expiries.into_iter().collect())
    }

    fn strikes(&self, expiry: NaiveDate, option_type: OptionType) -> Result<Vec<Decimal>, DataError> {
        let strikes: BTreeSet<_> = self
            .contracts
            .keys()
            .filter(|k| k.expiry == expiry && k.option_type == option_type)
            .map(|k| k.strike)
            .collect();
        Ok(strikes.into_iter().collect())
    }

    fn load_contract(&self, contract: &ContractKey) -> Result<Vec<Bar>, DataError> {
        self.contracts
            .get(contract)
            .cloned()
            .ok_or_else(|| DataError::DataNotFound(format!("contract {}", contract)))
    }

    fn trading_dates(&self) -> Result<Option<Vec<NaiveDate>>, DataError> {
        let dates: BTreeSet<_> = self
            .contracts
            .values()
            .flat_map(|bars| bars.iter().map(Bar::date))
            .collect();
        Ok(Some(dates.into_iter().collect()))
    }
}
