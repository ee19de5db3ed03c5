//! Constrained query translation.
//!
//! The reasoning service proposes *intent fields* (a flat JSON mapping such
//! as `{"branch": "P-(Pension)", "date": "2024-01"}`); this module turns
//! them into a [`StructuredFilter`] through a fixed, auditable table. The
//! filter type can only express read predicates over the document catalogue
//! — there is no variant for mutation, so no input can produce one. Anything
//! outside the table is rejected with [`TranslateError::UnsupportedIntent`]
//! and reflected back to the model as a tool-result error.

use chrono::{Days, Months, NaiveDate};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Half-open date window `[from, until)` over the document date column.
///
/// Either bound may be absent, leaving that side of the window open.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

/// Bounded, read-only filter over document catalogue fields.
///
/// Text predicates are partial, case-insensitive matches; the date predicate
/// is a half-open range. Constructed exclusively by [`translate`], executed
/// once, then discarded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredFilter {
    pub gr_no: Option<String>,
    pub branch: Option<String>,
    pub subject_en: Option<String>,
    pub subject_gu: Option<String>,
    pub date: Option<DateRange>,
}

impl StructuredFilter {
    /// Returns `true` when no predicate is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gr_no.is_none()
            && self.branch.is_none()
            && self.subject_en.is_none()
            && self.subject_gu.is_none()
            && self.date.is_none()
    }
}

/// Errors raised when intent fields cannot be expressed as a filter.
#[derive(Debug, Error, Diagnostic)]
pub enum TranslateError {
    /// The field is not in the fixed predicate table. This includes every
    /// write-shaped request; mutation is unrepresentable here by design.
    #[error("unsupported intent field: {field}")]
    #[diagnostic(
        code(finbot::query::unsupported_intent),
        help("Only gr_no, branch, subject_en, subject_gu, date, from_date and to_date are supported.")
    )]
    UnsupportedIntent { field: String },

    #[error("invalid value for {field}: {message}")]
    #[diagnostic(code(finbot::query::invalid_value))]
    InvalidValue { field: &'static str, message: String },

    /// `date` and `from_date`/`to_date` are alternative spellings of the
    /// same predicate; asking for both is ambiguous.
    #[error("'date' cannot be combined with 'from_date'/'to_date'")]
    #[diagnostic(
        code(finbot::query::conflicting_dates),
        help("Use 'date' for a single year/month/day, or an explicit from_date/to_date range.")
    )]
    ConflictingDates,
}

/// Translates model-proposed intent fields into a [`StructuredFilter`].
///
/// The predicate table:
///
/// | field        | predicate                                          |
/// |--------------|----------------------------------------------------|
/// | `gr_no`      | partial case-insensitive match                     |
/// | `branch`     | partial case-insensitive match                     |
/// | `subject_en` | partial case-insensitive match                     |
/// | `subject_gu` | partial case-insensitive match                     |
/// | `date`       | half-open year/month/day window                    |
/// | `from_date`  | inclusive lower bound (half-open range start)      |
/// | `to_date`    | inclusive upper bound, stored as `to + 1d` (open)  |
pub fn translate(intent: &serde_json::Map<String, Value>) -> Result<StructuredFilter, TranslateError> {
    let mut filter = StructuredFilter::default();
    let mut from_date: Option<NaiveDate> = None;
    let mut to_date: Option<NaiveDate> = None;
    let mut single_date: Option<DateRange> = None;

    for (field, value) in intent {
        match field.as_str() {
            "gr_no" => filter.gr_no = Some(text_value("gr_no", value)?),
            "branch" => filter.branch = Some(text_value("branch", value)?),
            "subject_en" => filter.subject_en = Some(text_value("subject_en", value)?),
            "subject_gu" => filter.subject_gu = Some(text_value("subject_gu", value)?),
            "date" => single_date = Some(date_window(&text_value("date", value)?)?),
            "from_date" => from_date = Some(parse_date("from_date", &text_value("from_date", value)?)?),
            "to_date" => to_date = Some(parse_date("to_date", &text_value("to_date", value)?)?),
            other => {
                return Err(TranslateError::UnsupportedIntent {
                    field: other.to_string(),
                });
            }
        }
    }

    filter.date = match (single_date, from_date, to_date) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            return Err(TranslateError::ConflictingDates);
        }
        (Some(range), None, None) => Some(range),
        (None, None, None) => None,
        (None, from, to) => Some(DateRange {
            from,
            // to_date is inclusive in the caller's terms.
            until: to.map(|d| d + Days::new(1)),
        }),
    };

    Ok(filter)
}

fn text_value(field: &'static str, value: &Value) -> Result<String, TranslateError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(TranslateError::InvalidValue {
            field,
            message: "empty string".to_string(),
        }),
        other => Err(TranslateError::InvalidValue {
            field,
            message: format!("expected a string, got {other}"),
        }),
    }
}

/// Expands a single `date` intent into a half-open window at the stated
/// granularity: `YYYY`, `YYYY-MM`, or `YYYY-MM-DD`.
fn date_window(raw: &str) -> Result<DateRange, TranslateError> {
    let parts: Vec<&str> = raw.split('-').collect();
    let window = match parts.as_slice() {
        [year] => {
            let y = parse_year(year)?;
            let from = NaiveDate::from_ymd_opt(y, 1, 1);
            let until = NaiveDate::from_ymd_opt(y + 1, 1, 1);
            from.zip(until)
        }
        [year, month] => {
            let y = parse_year(year)?;
            let m: u32 = month.parse().map_err(|_| invalid_date(raw))?;
            NaiveDate::from_ymd_opt(y, m, 1).map(|from| (from, from + Months::new(1)))
        }
        [_, _, _] => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .map(|from| (from, from + Days::new(1))),
        _ => None,
    };

    window
        .map(|(from, until)| DateRange {
            from: Some(from),
            until: Some(until),
        })
        .ok_or_else(|| invalid_date(raw))
}

fn parse_year(raw: &str) -> Result<i32, TranslateError> {
    if raw.len() != 4 {
        return Err(invalid_date(raw));
    }
    raw.parse().map_err(|_| invalid_date(raw))
}

fn invalid_date(raw: &str) -> TranslateError {
    TranslateError::InvalidValue {
        field: "date",
        message: format!("'{raw}' is not a YYYY, YYYY-MM or YYYY-MM-DD date"),
    }
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, TranslateError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| TranslateError::InvalidValue {
        field,
        message: format!("'{raw}' is not a YYYY-MM-DD date"),
    })
}
