//! Query-string filter for `GET /transactions`.
//!
//! `type`, `date1` and `date2` are each optional and compose independently:
//! a non-empty `type` adds an equality clause, and the dates add either a
//! half-open range, an exact-date match, or a one-sided bound.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::FieldError;
use crate::models::{parse_date, Transaction};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub date1: Option<String>,
    #[serde(default)]
    pub date2: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateClause {
    /// `from <= date < to`
    Between { from: DateTime<Utc>, to: DateTime<Utc> },
    On(DateTime<Utc>),
    Since(DateTime<Utc>),
    Before(DateTime<Utc>),
}

impl DateClause {
    pub fn matches(&self, date: Option<DateTime<Utc>>) -> bool {
        let Some(d) = date else { return false };
        match *self {
            DateClause::Between { from, to } => from <= d && d < to,
            DateClause::On(at) => d == at,
            DateClause::Since(from) => d >= from,
            DateClause::Before(to) => d < to,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub kind: Option<String>,
    pub date: Option<DateClause>,
}

impl TransactionFilter {
    /// Builds the filter from raw query parameters. Empty strings count as
    /// absent. The type clause and the date clause are always combined.
    pub fn from_query(q: &TransactionQuery) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let date1 = parse_param("date1", q.date1.as_deref(), &mut errors);
        let date2 = parse_param("date2", q.date2.as_deref(), &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }

        let date = match (date1, date2) {
            (Some(a), Some(b)) if a == b => Some(DateClause::On(a)),
            (Some(from), Some(to)) => Some(DateClause::Between { from, to }),
            (Some(from), None) => Some(DateClause::Since(from)),
            (None, Some(to)) => Some(DateClause::Before(to)),
            (None, None) => None,
        };
        let kind = non_empty(q.kind.as_deref()).map(str::to_string);
        Ok(Self { kind, date })
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(kind) = &self.kind {
            if tx.kind.as_deref() != Some(kind.as_str()) {
                return false;
            }
        }
        self.date.map_or(true, |clause| clause.matches(tx.date))
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_param(name: &str, raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<DateTime<Utc>> {
    let raw = non_empty(raw)?;
    match parse_date(raw) {
        Some(d) => Some(d),
        None => {
            errors.push(FieldError::query(name, "Invalid date"));
            None
        }
    }
}
