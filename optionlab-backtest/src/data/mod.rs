pub mod loader;
pub mod sources;
pub mod store;
pub mod symbol;
pub mod types;

pub use loader::{parse_datetime, read_bars, DataError};
pub use sources::{
    CombinedCsvSource, ExpiryFolderSource, InMemorySource, OptionChainSource, SpotCsvFile,
    SpotCsvFolder, SpotSource,
};
pub use store::MarketData;
pub use symbol::{parse_symbol, ParsedSymbol};
pub use types::{
    bar_at, latest_bar, Bar, ContractKey, InstrumentSelector, OptionType, Session, SessionKey,
};
