use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Timelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref HOURS_RANGE: Regex =
        Regex::new(r"^\s*(\d{1,2})\s*-\s*(\d{1,2})\s*$").expect("Invalid active hours regex");
}

/// Local-time window during which a poller runs, written `"HH-HH"`.
///
/// The start hour is inclusive and the end hour exclusive. A window whose
/// end is before its start wraps midnight: `"22-02"` covers 22:00 to 01:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveHours {
    start: u32,
    end: u32,
}

impl ActiveHours {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start > 23 {
            bail!("Active hours start must be between 0 and 23, got {}", start);
        }
        if end > 24 {
            bail!("Active hours end must be between 0 and 24, got {}", end);
        }
        if start == end {
            bail!("Active hours {}-{} describe an empty window", start, end);
        }
        Ok(Self { start, end })
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        let end = self.end % 24;
        if self.start < end {
            hour >= self.start && hour < end
        } else {
            hour >= self.start || hour < end
        }
    }

    /// Whether `now` falls in the window, in the machine's local time zone.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.contains_hour(now.with_timezone(&Local).hour())
    }
}

impl FromStr for ActiveHours {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let captures = HOURS_RANGE
            .captures(s)
            .with_context(|| format!("Active hours must look like \"HH-HH\", got {:?}", s))?;
        let start: u32 = captures[1].parse()?;
        let end: u32 = captures[2].parse()?;
        Self::new(start, end)
    }
}

impl fmt::Display for ActiveHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.start, self.end)
    }
}
