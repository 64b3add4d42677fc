//! Named, serializable indicator definitions.
//!
//! Strategy files and the CLI describe indicators as tagged tables, e.g.
//! `{ name = "RSI", period = 14 }`. [`IndicatorSpec::compute`] dispatches to
//! the pure functions and returns the named output lines.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    adx, atr, bollinger_bands, cci, dema, ema, keltner_channels, macd, momentum, obv,
    rate_of_change, rsi, sma, stochastic, tema, vwap, williams_r, wma, IndicatorError, Line,
    Ohlcv, Result,
};

/// Price series a single-input indicator runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
    /// (high + low + close) / 3
    Typical,
}

impl PriceSource {
    fn series(&self, ohlcv: &Ohlcv) -> Vec<f64> {
        match self {
            PriceSource::Open => ohlcv.open.clone(),
            PriceSource::High => ohlcv.high.clone(),
            PriceSource::Low => ohlcv.low.clone(),
            PriceSource::Close => ohlcv.close.clone(),
            PriceSource::Typical => (0..ohlcv.len())
                .map(|i| (ohlcv.high[i] + ohlcv.low[i] + ohlcv.close[i]) / 3.0)
                .collect(),
        }
    }
}

fn default_ma_period() -> usize {
    20
}

fn default_oscillator_period() -> usize {
    14
}

fn default_momentum_period() -> usize {
    10
}

fn default_d_period() -> usize {
    3
}

fn default_band_width() -> f64 {
    2.0
}

fn default_fast() -> usize {
    12
}

fn default_slow() -> usize {
    26
}

fn default_signal() -> usize {
    9
}

/// An indicator and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum IndicatorSpec {
    #[serde(rename = "SMA")]
    Sma {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "EMA")]
    Ema {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "WMA")]
    Wma {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "DEMA")]
    Dema {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "TEMA")]
    Tema {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "RSI")]
    Rsi {
        #[serde(default = "default_oscillator_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "STOCH")]
    Stochastic {
        #[serde(default = "default_oscillator_period")]
        k_period: usize,
        #[serde(default = "default_d_period")]
        d_period: usize,
    },
    #[serde(rename = "CCI")]
    Cci {
        #[serde(default = "default_ma_period")]
        period: usize,
    },
    #[serde(rename = "WILLR")]
    WilliamsR {
        #[serde(default = "default_oscillator_period")]
        period: usize,
    },
    #[serde(rename = "ATR")]
    Atr {
        #[serde(default = "default_oscillator_period")]
        period: usize,
    },
    #[serde(rename = "BBANDS")]
    BollingerBands {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default = "default_band_width")]
        std_dev: f64,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "KC")]
    KeltnerChannels {
        #[serde(default = "default_ma_period")]
        period: usize,
        #[serde(default = "default_momentum_period")]
        atr_period: usize,
        #[serde(default = "default_band_width")]
        multiplier: f64,
    },
    #[serde(rename = "MACD")]
    Macd {
        #[serde(default = "default_fast")]
        fast: usize,
        #[serde(default = "default_slow")]
        slow: usize,
        #[serde(default = "default_signal")]
        signal: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "ADX")]
    Adx {
        #[serde(default = "default_oscillator_period")]
        period: usize,
    },
    #[serde(rename = "MOM")]
    Momentum {
        #[serde(default = "default_momentum_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "ROC")]
    RateOfChange {
        #[serde(default = "default_momentum_period")]
        period: usize,
        #[serde(default)]
        source: PriceSource,
    },
    #[serde(rename = "OBV")]
    Obv,
    #[serde(rename = "VWAP")]
    Vwap,
}

/// Named output lines of one indicator evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorOutput {
    lines: Vec<(&'static str, Line)>,
}

impl IndicatorOutput {
    fn single(line: Line) -> Self {
        Self {
            lines: vec![("value", line)],
        }
    }

    /// Look up a line by name; `None` selects the primary (first) line.
    pub fn line(&self, name: Option<&str>) -> Option<&Line> {
        match name {
            None => self.lines.first().map(|(_, l)| l),
            Some(name) => self
                .lines
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, l)| l),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.lines.iter().map(|(n, _)| *n).collect()
    }

    pub fn lines(&self) -> &[(&'static str, Line)] {
        &self.lines
    }
}

impl IndicatorSpec {
    /// Evaluate over a bar series.
    pub fn compute(&self, ohlcv: &Ohlcv) -> Result<IndicatorOutput> {
        let (h, l, c, v) = (&ohlcv.high, &ohlcv.low, &ohlcv.close, &ohlcv.volume);

        let output = match self {
            IndicatorSpec::Sma { period, source } => {
                IndicatorOutput::single(sma(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Ema { period, source } => {
                IndicatorOutput::single(ema(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Wma { period, source } => {
                IndicatorOutput::single(wma(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Dema { period, source } => {
                IndicatorOutput::single(dema(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Tema { period, source } => {
                IndicatorOutput::single(tema(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Rsi { period, source } => {
                IndicatorOutput::single(rsi(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Stochastic { k_period, d_period } => {
                let result = stochastic(h, l, c, *k_period, *d_period)?;
                IndicatorOutput {
                    lines: vec![("k", result.k), ("d", result.d)],
                }
            }
            IndicatorSpec::Cci { period } => IndicatorOutput::single(cci(h, l, c, *period)?),
            IndicatorSpec::WilliamsR { period } => {
                IndicatorOutput::single(williams_r(h, l, c, *period)?)
            }
            IndicatorSpec::Atr { period } => IndicatorOutput::single(atr(h, l, c, *period)?),
            IndicatorSpec::BollingerBands {
                period,
                std_dev,
                source,
            } => {
                let bands = bollinger_bands(&source.series(ohlcv), *period, *std_dev)?;
                IndicatorOutput {
                    lines: vec![
                        ("middle", bands.middle),
                        ("upper", bands.upper),
                        ("lower", bands.lower),
                    ],
                }
            }
            IndicatorSpec::KeltnerChannels {
                period,
                atr_period,
                multiplier,
            } => {
                let bands = keltner_channels(h, l, c, *period, *atr_period, *multiplier)?;
                IndicatorOutput {
                    lines: vec![
                        ("middle", bands.middle),
                        ("upper", bands.upper),
                        ("lower", bands.lower),
                    ],
                }
            }
            IndicatorSpec::Macd {
                fast,
                slow,
                signal,
                source,
            } => {
                let result = macd(&source.series(ohlcv), *fast, *slow, *signal)?;
                IndicatorOutput {
                    lines: vec![
                        ("macd", result.macd),
                        ("signal", result.signal),
                        ("histogram", result.histogram),
                    ],
                }
            }
            IndicatorSpec::Adx { period } => {
                let result = adx(h, l, c, *period)?;
                IndicatorOutput {
                    lines: vec![
                        ("adx", result.adx),
                        ("plus_di", result.plus_di),
                        ("minus_di", result.minus_di),
                    ],
                }
            }
            IndicatorSpec::Momentum { period, source } => {
                IndicatorOutput::single(momentum(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::RateOfChange { period, source } => {
                IndicatorOutput::single(rate_of_change(&source.series(ohlcv), *period)?)
            }
            IndicatorSpec::Obv => IndicatorOutput::single(obv(c, v)?),
            IndicatorSpec::Vwap => IndicatorOutput::single(vwap(h, l, c, v)?),
        };

        Ok(output)
    }

    /// Check parameters without any data.
    pub fn validate(&self) -> Result<()> {
        self.compute(&Ohlcv::default()).map(|_| ())
    }

    /// Check that `line` names an output of this indicator.
    pub fn validate_line(&self, line: Option<&str>) -> Result<()> {
        let output = self.compute(&Ohlcv::default())?;
        match output.line(line) {
            Some(_) => Ok(()),
            None => Err(IndicatorError::invalid_parameter(format!(
                "{} has no output line '{}' (available: {})",
                self,
                line.unwrap_or_default(),
                output.names().join(", ")
            ))),
        }
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorSpec::Sma { period, .. } => write!(f, "SMA({})", period),
            IndicatorSpec::Ema { period, .. } => write!(f, "EMA({})", period),
            IndicatorSpec::Wma { period, .. } => write!(f, "WMA({})", period),
            IndicatorSpec::Dema { period, .. } => write!(f, "DEMA({})", period),
            IndicatorSpec::Tema { period, .. } => write!(f, "TEMA({})", period),
            IndicatorSpec::Rsi { period, .. } => write!(f, "RSI({})", period),
            IndicatorSpec::Stochastic { k_period, d_period } => {
                write!(f, "STOCH({},{})", k_period, d_period)
            }
            IndicatorSpec::Cci { period } => write!(f, "CCI({})", period),
            IndicatorSpec::WilliamsR { period } => write!(f, "WILLR({})", period),
            IndicatorSpec::Atr { period } => write!(f, "ATR({})", period),
            IndicatorSpec::BollingerBands {
                period, std_dev, ..
            } => write!(f, "BBANDS({},{})", period, std_dev),
            IndicatorSpec::KeltnerChannels {
                period,
                atr_period,
                multiplier,
            } => write!(f, "KC({},{},{})", period, atr_period, multiplier),
            IndicatorSpec::Macd {
                fast, slow, signal, ..
            } => write!(f, "MACD({},{},{})", fast, slow, signal),
            IndicatorSpec::Adx { period } => write!(f, "ADX({})", period),
            IndicatorSpec::Momentum { period, .. } => write!(f, "MOM({})", period),
            IndicatorSpec::RateOfChange { period, .. } => write!(f, "ROC({})", period),
            IndicatorSpec::Obv => write!(f, "OBV"),
            IndicatorSpec::Vwap => write!(f, "VWAP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohlcv(close: &[f64]) -> Ohlcv {
        Ohlcv {
            open: close.to_vec(),
            high: close.iter().map(|c| c + 1.0).collect(),
            low: close.iter().map(|c| c - 1.0).collect(),
            close: close.to_vec(),
            volume: vec![100.0; close.len()],
        }
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let spec: IndicatorSpec = serde_json::from_str(r#"{"name": "RSI"}"#).unwrap();
        assert_eq!(
            spec,
            IndicatorSpec::Rsi {
                period: 14,
                source: PriceSource::Close
            }
        );

        let spec: IndicatorSpec =
            toml::from_str("name = \"MACD\"\nfast = 5\nslow = 10\n").unwrap();
        assert_eq!(spec.to_string(), "MACD(5,10,9)");
    }

    #[test]
    fn test_compute_single_line() {
        let spec = IndicatorSpec::Sma {
            period: 2,
            source: PriceSource::Close,
        };
        let output = spec.compute(&ohlcv(&[1.0, 3.0, 5.0])).unwrap();
        assert_eq!(output.names(), vec!["value"]);
        assert_eq!(output.line(None).unwrap(), &vec![None, Some(2.0), Some(4.0)]);
    }

    #[test]
    fn test_compute_named_lines() {
        let spec = IndicatorSpec::BollingerBands {
            period: 2,
            std_dev: 2.0,
            source: PriceSource::Close,
        };
        let output = spec.compute(&ohlcv(&[1.0, 3.0])).unwrap();
        assert_eq!(output.line(None), output.line(Some("middle")));
        assert!(output.line(Some("UPPER")).is_some());
        assert!(output.line(Some("signal")).is_none());
    }

    #[test]
    fn test_typical_price_source() {
        let spec = IndicatorSpec::Sma {
            period: 1,
            source: PriceSource::Typical,
        };
        let data = Ohlcv {
            open: vec![0.0],
            high: vec![12.0],
            low: vec![6.0],
            close: vec![9.0],
            volume: vec![0.0],
        };
        assert_eq!(spec.compute(&data).unwrap().line(None).unwrap()[0], Some(9.0));
    }

    #[test]
    fn test_validate() {
        assert!(IndicatorSpec::Ema {
            period: 0,
            source: PriceSource::Close
        }
        .validate()
        .is_err());
        assert!(IndicatorSpec::Macd {
            fast: 26,
            slow: 12,
            signal: 9,
            source: PriceSource::Close
        }
        .validate()
        .is_err());
        assert!(IndicatorSpec::Obv.validate().is_ok());

        let adx = IndicatorSpec::Adx { period: 14 };
        assert!(adx.validate_line(Some("plus_di")).is_ok());
        assert!(adx.validate_line(Some("k")).is_err());
    }
}
