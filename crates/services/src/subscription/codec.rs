//! Pipe-delimited subscription record format.
//!
//! Stored form, one entry per subscription, entries joined by `;`:
//!
//! ```text
//! service|startDate|paidFlag|durationMonths|toleranceDate|originalPaymentDate
//! ```
//!
//! Dates are ISO-8601, `paidFlag` is `"0"` or `"1"`, `toleranceDate` may be empty.
//! Legacy rows also use `,` or `+` as entry separators and may omit trailing fields;
//! both are accepted on read, only the canonical form is written.
//!
//! A legacy separator only splits text that does not already read as one clean
//! entry, so names such as "Disney+" or "Netflix, Premium" survive a reload. Service
//! names must not contain `;` or `|`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::expiry;

/// Separator used when writing entries
pub const ENTRY_SEPARATOR: char = ';';

const FIELD_SEPARATOR: char = '|';

/// Legacy entry separators accepted on read after `;`, in priority order
const LEGACY_SEPARATORS: [char; 2] = [',', '+'];

/// Characters a stored service name cannot carry
pub const RESERVED_NAME_CHARS: [char; 2] = [ENTRY_SEPARATOR, FIELD_SEPARATOR];

/// Longest subscription term accepted from callers
pub const MAX_DURATION_MONTHS: u32 = 1200;

/// Largest manual adjustment, in days, accepted from callers
pub const MAX_ADJUST_DAYS: i64 = 36_500;

/// Date arithmetic on a subscription left the representable range
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Subscription dates out of range")]
pub struct DateOutOfRange;

/// Fallback duration when neither the entry nor the account carries one
const FALLBACK_DURATION_MONTHS: u32 = 1;

/// One subscription of a customer to a shared-credential service
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub service_name: String,
    pub start_date: DateTime<Utc>,
    pub paid: bool,
    pub duration_months: u32,
    pub tolerance_until: Option<DateTime<Utc>>,
    pub original_payment_date: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// New paid subscription starting at `start_date`
    pub fn new(service_name: impl Into<String>, start_date: DateTime<Utc>, duration_months: u32) -> Self {
        Self {
            service_name: service_name.into(),
            start_date,
            paid: true,
            duration_months: duration_months.max(1),
            tolerance_until: None,
            original_payment_date: start_date,
        }
    }

    /// Normalized service key used for matching and association keys
    pub fn service_key(&self) -> String {
        service_key(&self.service_name)
    }

    /// Expiry, or `None` when it cannot be represented
    pub fn checked_expiry(&self) -> Option<DateTime<Utc>> {
        expiry::expiry(self.start_date, self.duration_months)
    }

    /// Expiry, saturating at the latest representable instant.
    ///
    /// Decoded records and records accepted by the customer service always have a
    /// representable expiry.
    pub fn expiry(&self) -> DateTime<Utc> {
        self.checked_expiry().unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Debtor: the subscription is marked unpaid
    pub fn is_debtor(&self) -> bool {
        !self.paid
    }

    /// Renewal moves the start to the later of the current expiry and `now`,
    /// so an early renewal keeps the remaining days.
    ///
    /// Leaves the record untouched when the renewed term cannot be represented.
    pub fn renew(
        &mut self,
        now: DateTime<Utc>,
        duration_months: Option<u32>,
    ) -> Result<(), DateOutOfRange> {
        let current_expiry = self.checked_expiry().ok_or(DateOutOfRange)?;
        let new_start = current_expiry.max(now);
        let months = duration_months.unwrap_or(self.duration_months).max(1);
        expiry::expiry(new_start, months).ok_or(DateOutOfRange)?;

        self.start_date = new_start;
        self.original_payment_date = new_start;
        self.paid = true;
        self.tolerance_until = None;
        self.duration_months = months;
        Ok(())
    }

    /// Manual day adjustment: shifts the start, keeps the original payment date.
    pub fn shift_days(&mut self, days: i64) -> Result<(), DateOutOfRange> {
        let start = Duration::try_days(days)
            .and_then(|delta| self.start_date.checked_add_signed(delta))
            .ok_or(DateOutOfRange)?;
        expiry::expiry(start, self.duration_months).ok_or(DateOutOfRange)?;
        self.start_date = start;
        Ok(())
    }

    /// Canonical 6-field encoding
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.service_name.trim(),
            format_date(&self.start_date),
            if self.paid { "1" } else { "0" },
            self.duration_months,
            self.tolerance_until
                .as_ref()
                .map(format_date)
                .unwrap_or_default(),
            format_date(&self.original_payment_date),
        )
    }

    /// Decode a single entry, applying defaults to absent trailing fields.
    ///
    /// Returns `None` for entries that do not describe a subscription: blank or
    /// `null` service, leading pipe, missing or unreadable start date, or an expiry
    /// that cannot be represented.
    pub fn decode(entry: &str, default_duration: Option<u32>) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with(FIELD_SEPARATOR) {
            return None;
        }

        let mut fields = entry.split(FIELD_SEPARATOR).map(str::trim);

        let service_name = fields.next()?;
        if service_name.is_empty() || service_name.eq_ignore_ascii_case("null") {
            return None;
        }

        let start_date = fields.next().and_then(parse_date)?;
        let paid = fields.next().map(parse_paid_flag).unwrap_or(false);
        let duration_months = fields
            .next()
            .and_then(|d| d.parse::<u32>().ok())
            .filter(|d| *d >= 1)
            .unwrap_or_else(|| default_duration.filter(|d| *d >= 1).unwrap_or(FALLBACK_DURATION_MONTHS));
        let tolerance_until = fields.next().and_then(parse_date);
        let original_payment_date = fields.next().and_then(parse_date).unwrap_or(start_date);

        let record = Self {
            service_name: service_name.to_string(),
            start_date,
            paid,
            duration_months,
            tolerance_until,
            original_payment_date,
        };
        record.checked_expiry()?;
        Some(record)
    }
}

/// Whether `name` can be stored and read back unchanged
pub fn is_storable_service_name(name: &str) -> bool {
    let key = service_key(name);
    !key.is_empty() && key != "null" && !name.contains(RESERVED_NAME_CHARS)
}

/// Raw subscription data as found in stored rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSubscriptions {
    /// Already split into entries
    Entries(Vec<String>),
    /// Single string, possibly several entries joined by a separator
    Text(String),
}

impl From<&str> for RawSubscriptions {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawSubscriptions {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for RawSubscriptions {
    fn from(value: Vec<String>) -> Self {
        Self::Entries(value)
    }
}

impl RawSubscriptions {
    fn entries(&self) -> Vec<&str> {
        match self {
            Self::Entries(entries) => entries.iter().map(String::as_str).collect(),
            Self::Text(text) => {
                let text = text.trim();
                if text.contains(ENTRY_SEPARATOR) {
                    return text.split(ENTRY_SEPARATOR).collect();
                }
                match LEGACY_SEPARATORS.iter().find(|sep| text.contains(**sep)) {
                    Some(sep) if !is_clean_entry(text) => text.split(*sep).collect(),
                    _ => vec![text],
                }
            }
        }
    }
}

/// Decode raw data into records.
///
/// Malformed entries are dropped. When two entries share a service key the one
/// with the later expiry wins and keeps the position of the first occurrence.
pub fn parse(raw: &RawSubscriptions, default_duration: Option<u32>) -> Vec<SubscriptionRecord> {
    let mut records: Vec<SubscriptionRecord> = Vec::new();

    for entry in raw.entries() {
        let Some(record) = SubscriptionRecord::decode(entry, default_duration) else {
            if !entry.trim().is_empty() {
                tracing::debug!("Dropping malformed subscription entry: {:?}", entry);
            }
            continue;
        };

        let key = record.service_key();
        match records.iter_mut().find(|r| r.service_key() == key) {
            Some(existing) => {
                tracing::debug!("Duplicate subscription entry for service key {}", key);
                if record.expiry() > existing.expiry() {
                    *existing = record;
                }
            }
            None => records.push(record),
        }
    }

    records
}

/// Canonical entry strings for raw data. `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &RawSubscriptions, default_duration: Option<u32>) -> Vec<String> {
    parse(raw, default_duration)
        .iter()
        .map(SubscriptionRecord::encode)
        .collect()
}

/// Stored form of a record list
pub fn encode_all(records: &[SubscriptionRecord]) -> String {
    records
        .iter()
        .map(SubscriptionRecord::encode)
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string())
}

/// Lowercased, trimmed service name with collapsed whitespace
pub fn service_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fuzzy service match: case-insensitive containment in either direction.
///
/// "Viki" matches "Viki Pass" and "Viki Pass" matches "viki". Empty names never match.
pub fn service_matches(a: &str, b: &str) -> bool {
    let a = service_key(a);
    let b = service_key(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

fn parse_paid_flag(flag: &str) -> bool {
    flag == "1" || flag.eq_ignore_ascii_case("true")
}

/// A single entry in which every present field parses
fn is_clean_entry(entry: &str) -> bool {
    let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() > 6 || SubscriptionRecord::decode(entry, None).is_none() {
        return false;
    }

    let blank_or = |index: usize, valid: fn(&str) -> bool| {
        fields.get(index).map_or(true, |f| f.is_empty() || valid(*f))
    };
    blank_or(2, is_paid_flag)
        && blank_or(3, is_duration)
        && blank_or(4, is_date)
        && blank_or(5, is_date)
}

fn is_paid_flag(flag: &str) -> bool {
    ["0", "1", "true", "false"]
        .iter()
        .any(|v| flag.eq_ignore_ascii_case(v))
}

fn is_duration(value: &str) -> bool {
    value.parse::<u32>().is_ok()
}

fn is_date(value: &str) -> bool {
    parse_date(value).is_some()
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
