//! Core event model, date decoding and identifier derivation for evcal.

use chrono::{Months, NaiveDate, TimeDelta};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod query;

pub use query::{
    run_query, EventPage, EventQuery, QueryError, QueryParams, SortDir, SortField,
    DEFAULT_PAGE_SIZE,
};

pub const CRATE_NAME: &str = "evcal-core";

static WIDGET_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Date\((\d+),(\d+),(\d+)\)").expect("valid widget date regex"));

/// Structured postal fields as delivered by the widget API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    #[serde(default, alias = "Address1")]
    pub line1: Option<String>,
    #[serde(default, alias = "Address2")]
    pub line2: Option<String>,
    #[serde(default, alias = "Address3")]
    pub line3: Option<String>,
    #[serde(default, alias = "Town")]
    pub town: Option<String>,
    #[serde(default, alias = "County")]
    pub county: Option<String>,
    #[serde(default, alias = "Postcode")]
    pub postcode: Option<String>,
    #[serde(default, alias = "Country")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressView {
    pub raw: Option<PostalAddress>,
    pub formatted: String,
}

impl AddressView {
    pub fn from_raw(raw: Option<PostalAddress>) -> Self {
        let formatted = format_address(raw.as_ref());
        Self { raw, formatted }
    }
}

/// Full event record (detail view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub external_id: String,
    pub name: String,
    #[serde(with = "iso_date_or_empty", default)]
    pub start_date: Option<NaiveDate>,
    #[serde(with = "iso_date_or_empty", default)]
    pub end_date: Option<NaiveDate>,
    pub location: String,
    #[serde(default)]
    pub lat_lng: String,
    #[serde(default)]
    pub address: AddressView,
    pub category: String,
    #[serde(default)]
    pub detail_html: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub doc_hash: String,
}

impl Event {
    /// The listing/filtering projection persisted next to the detail view.
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            start_date: self.start_date,
            location: self.location.clone(),
            category: self.category.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

/// Lightweight per-event record used for listing and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub name: String,
    #[serde(with = "iso_date_or_empty", default)]
    pub start_date: Option<NaiveDate>,
    pub location: String,
    pub category: String,
    #[serde(default)]
    pub source_url: String,
}

/// Decode the widget API's `/Date(year,monthIndex,day)/` encoding.
///
/// The month is zero-based. Out-of-range month or day values roll over into
/// the neighbouring month/year, matching how the upstream produced them.
/// Anything that does not carry the pattern decodes to `None`.
pub fn decode_widget_date(raw: &str) -> Option<NaiveDate> {
    let caps = WIDGET_DATE_RE.captures(raw)?;
    let year: i32 = caps[1].parse().ok()?;
    let month_index: u32 = caps[2].parse().ok()?;
    let day: i64 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)?
        .checked_add_months(Months::new(month_index))?
        .checked_add_signed(TimeDelta::try_days(day - 1)?)
}

/// `YYYY-MM-DD`, or an empty string when there is no date.
pub fn iso_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Deterministic 128-bit identifier over `name + start_date + handle`, hex encoded.
pub fn derive_event_id(name: &str, start_date: &str, handle: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(start_date.as_bytes());
    hasher.update(handle.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Single-line postal address: non-blank components joined by ", ".
pub fn format_address(address: Option<&PostalAddress>) -> String {
    let Some(addr) = address else {
        return String::new();
    };
    [
        &addr.line1,
        &addr.line2,
        &addr.line3,
        &addr.town,
        &addr.county,
        &addr.postcode,
        &addr.country,
    ]
    .into_iter()
    .filter_map(|part| part.as_deref().map(str::trim))
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Serde adapter storing `Option<NaiveDate>` as `YYYY-MM-DD` or `""`.
pub mod iso_date_or_empty {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::iso_date(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}
