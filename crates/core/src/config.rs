//! Configuration structures for the procurement query system.

use crate::error::{Error, Result};
use crate::types::{FilterParams, QueryParams};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Country allow-list used by the dashboard when none is given.
pub const DEFAULT_COUNTRIES: [&str; 33] = [
    "NO", "HR", "HU", "CH", "CZ", "RO", "LV", "GR", "UK", "SI", "LT", "ES", "FR", "IE", "SE", "NL",
    "PT", "PL", "DK", "MK", "DE", "IT", "BG", "CY", "AT", "LU", "BE", "FI", "EE", "SK", "MT", "LI",
    "IS",
];

/// Main configuration for the query catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default filter parameters.
    pub defaults: DefaultsConfig,
    /// Collection names.
    pub collections: CollectionsConfig,
    /// Histogram bucketing.
    pub histogram: HistogramConfig,
    /// Ranking sizes.
    pub rankings: RankingConfig,
    /// Row-count example.
    pub example: ExampleConfig,
    /// In-memory engine limits.
    pub engine: EngineConfig,
}

impl Config {
    /// Parse a configuration from JSON. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.year_from > self.defaults.year_to {
            return Err(Error::config(format!(
                "year_from {} is after year_to {}",
                self.defaults.year_from, self.defaults.year_to
            )));
        }
        if self.histogram.bucket_width <= 0 || self.histogram.bucket_count == 0 {
            return Err(Error::config("histogram needs a positive width and bucket count"));
        }
        if self.rankings.top_n == 0 || self.rankings.treemap_n == 0 {
            return Err(Error::config("ranking sizes must be positive"));
        }
        if self.engine.max_groups_in_memory == 0 {
            return Err(Error::config("engine.max_groups_in_memory must be positive"));
        }
        Ok(())
    }

    /// Default filter parameters.
    pub fn default_filter(&self) -> FilterParams {
        FilterParams::new(
            self.defaults.year_from,
            self.defaults.year_to,
            self.defaults.countries.clone(),
        )
    }

    /// Default query parameters (no extras set).
    pub fn default_params(&self) -> QueryParams {
        QueryParams::new(self.default_filter())
    }
}

/// Default dashboard filter values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// First year included.
    pub year_from: i64,
    /// Last year included.
    pub year_to: i64,
    /// ISO alpha-2 allow-list.
    pub countries: Vec<String>,
    /// CPV division used by the histogram.
    pub cpv_division: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            year_from: 2008,
            year_to: 2020,
            countries: DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            cpv_division: "50".to_string(),
        }
    }
}

/// Collection names as known to the data-access collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionsConfig {
    /// Contract award notices.
    pub contracts: String,
    /// CPV division descriptions.
    pub cpv: String,
    /// ISO country names.
    pub iso_codes: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            contracts: "eu".to_string(),
            cpv: "cpv".to_string(),
            iso_codes: "iso_codes".to_string(),
        }
    }
}

/// Linear value histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Width of each bucket in euro.
    pub bucket_width: i64,
    /// Number of linear buckets starting at zero.
    pub bucket_count: usize,
    /// Label of the bucket collecting everything else.
    pub overflow_label: String,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bucket_width: 100_000,
            bucket_count: 10,
            overflow_label: ">1000000".to_string(),
        }
    }
}

impl HistogramConfig {
    /// Bucket boundaries: `bucket_count + 1` edges from zero.
    pub fn boundaries(&self) -> Vec<i64> {
        (0..=self.bucket_count as i64)
            .map(|i| i * self.bucket_width)
            .collect()
    }
}

/// Ranking truncation sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Top/bottom ranking length.
    pub top_n: usize,
    /// Companies shown in the treemap.
    pub treemap_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            treemap_n: 15,
        }
    }
}

/// Row-count example query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExampleConfig {
    /// Contracts at or above this value are not counted.
    pub value_cap: f64,
}

impl Default for ExampleConfig {
    fn default() -> Self {
        Self {
            value_cap: 100_000_000.0,
        }
    }
}

/// In-memory aggregation engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Groups a single stage may hold without the allow-disk-use flag.
    pub max_groups_in_memory: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_groups_in_memory: 100_000,
        }
    }
}
