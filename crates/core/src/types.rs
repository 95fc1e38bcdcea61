//! Core data types for the procurement query system.

use serde::{Deserialize, Serialize};
use serde_json::Map;

pub use serde_json::Value;

/// A schemaless document as stored in a collection or emitted by a stage.
pub type Document = Map<String, Value>;

/// Stored field names of a contract document and of the reference collections.
pub mod fields {
    pub const ID: &str = "_id";
    pub const YEAR: &str = "year";
    pub const COUNTRY_CODE: &str = "country_code";
    pub const CPV_CODE: &str = "cpv_code";
    pub const VALUE_EURO: &str = "value_euro";
    pub const AWARD_VALUE_EURO: &str = "award_value_euro";
    pub const NUMBER_OFFERS: &str = "number_offers";
    pub const EU_FUNDED: &str = "eu_funded";
    pub const DISPATCH_DATE: &str = "dispatch_date";
    pub const AWARD_DATE: &str = "award_date";
    pub const AWARDING_ENTITY_NAME: &str = "awarding_entity_name";
    pub const AWARDING_ENTITY_ADDRESS: &str = "awarding_entity_address";
    pub const AWARDING_ENTITY_TOWN: &str = "awarding_entity_town";
    pub const WINNING_ENTITY_NAME: &str = "winning_entity_name";

    pub const CPV_DIVISION: &str = "cpv_division";
    pub const CPV_DIVISION_DESCRIPTION: &str = "cpv_division_description";
    pub const ISO_ALPHA2: &str = "alpha-2";
    pub const ISO_NAME: &str = "name";
}

/// Identifier assigned to a contract by bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub u64);

/// EU-funding indicator of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EuFunds {
    /// Contract received EU funds.
    #[serde(rename = "Y")]
    Yes,
    /// Contract did not receive EU funds.
    #[serde(rename = "N")]
    No,
}

impl EuFunds {
    /// Stored flag value.
    pub fn as_str(self) -> &'static str {
        match self {
            EuFunds::Yes => "Y",
            EuFunds::No => "N",
        }
    }

    /// Parse a stored flag value.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "Y" => Some(EuFunds::Yes),
            "N" => Some(EuFunds::No),
            _ => None,
        }
    }
}

/// First two characters of a CPV code, or the whole code when shorter.
pub fn division_of(cpv_code: &str) -> &str {
    match cpv_code.char_indices().nth(2) {
        Some((idx, _)) => &cpv_code[..idx],
        None => cpv_code,
    }
}

/// One contract award notice.
///
/// Optional fields are omitted from the stored document when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub year: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpv_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_euro: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub award_value_euro: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_offers: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eu_funded: Option<EuFunds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub award_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarding_entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarding_entity_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awarding_entity_town: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_entity_name: Option<String>,
}

impl ContractRecord {
    /// Create a record with only the year set.
    pub fn new(year: i64) -> Self {
        Self {
            year,
            ..Self::default()
        }
    }

    /// CPV division derived from the code.
    pub fn division(&self) -> Option<&str> {
        self.cpv_code.as_deref().map(division_of)
    }

    /// Convert into a stored document.
    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of scalars always serializes to an object.
            _ => Document::new(),
        }
    }

    /// Read a record back from a stored document.
    pub fn from_document(doc: &Document) -> crate::Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }
}

/// CPV division reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpvDivision {
    pub cpv_division: String,
    pub cpv_division_description: String,
}

impl CpvDivision {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            cpv_division: code.into(),
            cpv_division_description: description.into(),
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::CPV_DIVISION.into(), Value::from(self.cpv_division.clone()));
        doc.insert(
            fields::CPV_DIVISION_DESCRIPTION.into(),
            Value::from(self.cpv_division_description.clone()),
        );
        doc
    }
}

/// ISO country reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoCountry {
    #[serde(rename = "alpha-2")]
    pub alpha2: String,
    pub name: String,
}

impl IsoCountry {
    pub fn new(alpha2: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            alpha2: alpha2.into(),
            name: name.into(),
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(fields::ISO_ALPHA2.into(), Value::from(self.alpha2.clone()));
        doc.insert(fields::ISO_NAME.into(), Value::from(self.name.clone()));
        doc
    }
}

/// Year range and country allow-list shared by every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParams {
    pub year_from: i64,
    pub year_to: i64,
    pub countries: Vec<String>,
}

impl FilterParams {
    pub fn new(year_from: i64, year_to: i64, countries: Vec<String>) -> Self {
        Self {
            year_from,
            year_to,
            countries,
        }
    }

    /// Whether a record with these fields passes the range filter.
    pub fn admits(&self, year: i64, country_code: Option<&str>) -> bool {
        year >= self.year_from
            && year <= self.year_to
            && country_code.is_some_and(|c| self.countries.iter().any(|allowed| allowed == c))
    }
}

/// Filter parameters plus the query-specific extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pub filter: FilterParams,
    /// Restrict to EU-funded / non-funded contracts.
    #[serde(default)]
    pub eu_funds: Option<EuFunds>,
    /// Target CPV division for per-division queries.
    #[serde(default)]
    pub cpv_division: Option<String>,
}

impl QueryParams {
    pub fn new(filter: FilterParams) -> Self {
        Self {
            filter,
            eu_funds: None,
            cpv_division: None,
        }
    }

    pub fn with_eu_funds(mut self, eu_funds: EuFunds) -> Self {
        self.eu_funds = Some(eu_funds);
        self
    }

    pub fn with_cpv_division(mut self, division: impl Into<String>) -> Self {
        self.cpv_division = Some(division.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_of() {
        assert_eq!(division_of("45233120"), "45");
        assert_eq!(division_of("7"), "7");
        assert_eq!(division_of(""), "");
        assert_eq!(division_of("50"), "50");
    }

    #[test]
    fn test_record_document_omits_absent_fields() {
        let mut record = ContractRecord::new(2015);
        record.country_code = Some("PT".to_string());
        record.eu_funded = Some(EuFunds::Yes);

        let doc = record.to_document();
        assert_eq!(doc.get(fields::YEAR), Some(&Value::from(2015)));
        assert_eq!(doc.get(fields::EU_FUNDED), Some(&Value::from("Y")));
        assert!(!doc.contains_key(fields::VALUE_EURO));
        assert!(!doc.contains_key(fields::CPV_CODE));

        let back = ContractRecord::from_document(&doc).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_filter_admits() {
        let filter = FilterParams::new(2010, 2012, vec!["PT".into(), "ES".into()]);
        assert!(filter.admits(2010, Some("PT")));
        assert!(filter.admits(2012, Some("ES")));
        assert!(!filter.admits(2013, Some("PT")));
        assert!(!filter.admits(2011, Some("FR")));
        assert!(!filter.admits(2011, None));
    }

    #[test]
    fn test_eu_funds_flag() {
        assert_eq!(EuFunds::from_flag("Y"), Some(EuFunds::Yes));
        assert_eq!(EuFunds::from_flag("N"), Some(EuFunds::No));
        assert_eq!(EuFunds::from_flag("?"), None);
        assert_eq!(EuFunds::No.as_str(), "N");
    }

    #[test]
    fn test_iso_country_document() {
        let doc = IsoCountry::new("PT", "Portugal").to_document();
        assert_eq!(doc.get("alpha-2"), Some(&Value::from("PT")));
        assert_eq!(doc.get("name"), Some(&Value::from("Portugal")));
    }
}
