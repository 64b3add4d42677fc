//! Strategy definitions, strike resolution and entry filters.

pub mod config;
pub mod filter;
pub mod strike;

pub use config::{
    load_config, Action, CombinedBasis, ConfigError, StrategyConfig, StrategyLeg, StrikeSelection,
};
pub use filter::{filters_pass, Comparison, EntryFilter};
pub use strike::{atm_strike, resolve_contract, resolve_strike, ResolvedContract, StrikeError};
