//! Timezone model and the fixed catalog of supported zones

use std::fmt;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use sqlx::FromRow;

use crate::utils::helpers::parse_offset;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserTimezone {
    pub id: i64,
    pub telegram_id: i64,
    pub timezone_name: String,
    pub timezone_offset: String,
    pub effective_from: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl UserTimezone {
    /// The stored offset, UTC when it cannot be parsed
    pub fn offset(&self) -> FixedOffset {
        parse_offset(&self.timezone_offset).unwrap_or_else(utc_offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTimezoneRequest {
    pub telegram_id: i64,
    pub timezone_name: String,
    pub timezone_offset: String,
    pub effective_from: NaiveDate,
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Countries with supported timezones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    India,
    Uk,
    Us,
}

impl Country {
    /// Resolve free text such as "United Kingdom" or "usa"
    pub fn from_alias(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "india" => Some(Country::India),
            "uk" | "united kingdom" | "great britain" | "britain" => Some(Country::Uk),
            "us" | "usa" | "united states" | "united states of america" | "america" => Some(Country::Us),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::India => "india",
            Country::Uk => "uk",
            Country::Us => "us",
        }
    }

    /// Zones offered for this country, in display order
    pub fn zones(&self) -> Vec<&'static TimezoneOption> {
        TIMEZONES.iter().filter(|tz| tz.country == *self).collect()
    }
}

/// One selectable timezone
#[derive(Debug, PartialEq, Eq)]
pub struct TimezoneOption {
    pub name: &'static str,
    pub label: &'static str,
    pub country: Country,
    pub offset: &'static str,
}

pub static TIMEZONES: [TimezoneOption; 8] = [
    TimezoneOption { name: "Asia/Kolkata", label: "IST", country: Country::India, offset: "+5:30" },
    TimezoneOption { name: "Europe/London", label: "GMT/BST", country: Country::Uk, offset: "+0:00" },
    TimezoneOption { name: "Pacific/Honolulu", label: "Hawaii", country: Country::Us, offset: "-10:00" },
    TimezoneOption { name: "America/Anchorage", label: "Alaska", country: Country::Us, offset: "-9:00" },
    TimezoneOption { name: "America/Los_Angeles", label: "Pacific", country: Country::Us, offset: "-8:00" },
    TimezoneOption { name: "America/Denver", label: "Mountain", country: Country::Us, offset: "-7:00" },
    TimezoneOption { name: "America/Chicago", label: "Central", country: Country::Us, offset: "-6:00" },
    TimezoneOption { name: "America/New_York", label: "Eastern", country: Country::Us, offset: "-5:00" },
];

/// Look a zone up by its IANA name
pub fn find_timezone(name: &str) -> Option<&'static TimezoneOption> {
    TIMEZONES.iter().find(|tz| tz.name == name)
}

/// Since when a newly chosen timezone applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveFrom {
    #[serde(rename = "sincefirstday")]
    SinceRegistration,
    Yesterday,
    Today,
}

impl EffectiveFrom {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "sincefirstday" | "since registration" | "registration" => Some(EffectiveFrom::SinceRegistration),
            "yesterday" => Some(EffectiveFrom::Yesterday),
            "today" => Some(EffectiveFrom::Today),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveFrom::SinceRegistration => "sincefirstday",
            EffectiveFrom::Yesterday => "yesterday",
            EffectiveFrom::Today => "today",
        }
    }

    /// Resolve to a calendar date
    pub fn resolve(&self, today: NaiveDate, registered_on: Option<NaiveDate>) -> NaiveDate {
        match self {
            EffectiveFrom::SinceRegistration => registered_on.unwrap_or(today),
            EffectiveFrom::Yesterday => today - Duration::days(1),
            EffectiveFrom::Today => today,
        }
    }
}

impl fmt::Display for EffectiveFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
