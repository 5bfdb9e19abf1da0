use regex::Regex;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entry::HistoryEntry;

/// Reserved identity query; matches every row and is not user-editable.
pub const SELECT_ALL_NAME: &str = "*** Select All ***";

/// Columns a history query may constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryColumn {
    Project,
    Run,
    Clone,
    Gen,
    ClientName,
    ClientPath,
    Username,
    Team,
    CoreVersion,
    FramesCompleted,
    FrameTimeSecs,
    Result,
    Assigned,
    Finished,
    WorkUnitName,
    KFactor,
    CoreName,
    Frames,
    Atoms,
    BaseCredit,
    PreferredDays,
    MaximumDays,
}

impl HistoryColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            HistoryColumn::Project => "project",
            HistoryColumn::Run => "run",
            HistoryColumn::Clone => "clone",
            HistoryColumn::Gen => "gen",
            HistoryColumn::ClientName => "client_name",
            HistoryColumn::ClientPath => "client_path",
            HistoryColumn::Username => "username",
            HistoryColumn::Team => "team",
            HistoryColumn::CoreVersion => "core_version",
            HistoryColumn::FramesCompleted => "frames_completed",
            HistoryColumn::FrameTimeSecs => "frame_time_secs",
            HistoryColumn::Result => "result",
            HistoryColumn::Assigned => "assigned",
            HistoryColumn::Finished => "finished",
            HistoryColumn::WorkUnitName => "work_unit_name",
            HistoryColumn::KFactor => "k_factor",
            HistoryColumn::CoreName => "core_name",
            HistoryColumn::Frames => "frames",
            HistoryColumn::Atoms => "atoms",
            HistoryColumn::BaseCredit => "base_credit",
            HistoryColumn::PreferredDays => "preferred_days",
            HistoryColumn::MaximumDays => "maximum_days",
        }
    }

    fn is_text(&self) -> bool {
        matches!(
            self,
            HistoryColumn::ClientName
                | HistoryColumn::ClientPath
                | HistoryColumn::Username
                | HistoryColumn::CoreVersion
                | HistoryColumn::Result
                | HistoryColumn::Assigned
                | HistoryColumn::Finished
                | HistoryColumn::WorkUnitName
                | HistoryColumn::CoreName
        )
    }
}

/// Comparison operators for one query field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
}

impl QueryOperator {
    fn sql(&self) -> &'static str {
        match self {
            QueryOperator::Equal => "=",
            QueryOperator::NotEqual => "!=",
            QueryOperator::GreaterThan => ">",
            QueryOperator::GreaterThanOrEqual => ">=",
            QueryOperator::LessThan => "<",
            QueryOperator::LessThanOrEqual => "<=",
            QueryOperator::Like => "LIKE",
            QueryOperator::NotLike => "NOT LIKE",
        }
    }
}

/// Typed comparison value; the model carries no nulls by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

/// One (column, operator, value) predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryField {
    pub column: HistoryColumn,
    pub op: QueryOperator,
    pub value: QueryValue,
}

impl QueryField {
    /// A field is translatable when the operator and value fit the column:
    /// LIKE needs a text pattern on a text column. Anything else is logged
    /// and skipped rather than raised.
    fn is_supported(&self) -> bool {
        match self.op {
            QueryOperator::Like | QueryOperator::NotLike => {
                self.column.is_text() && matches!(self.value, QueryValue::Text(_))
            }
            _ => true,
        }
    }
}

/// Named, ordered set of predicates joined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    pub name: String,
    pub fields: Vec<QueryField>,
}

impl QueryParameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// The reserved identity query: no constraints, every row matches.
    pub fn select_all() -> Self {
        Self::new(SELECT_ALL_NAME)
    }

    pub fn is_select_all(&self) -> bool {
        self.name == SELECT_ALL_NAME
    }

    /// Build a parameterized WHERE clause. Unsupported fields are skipped
    /// with a warning; an empty result means no filtering.
    pub(crate) fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        for field in &self.fields {
            if !field.is_supported() {
                warn!(
                    column = field.column.column_name(),
                    op = field.op.sql(),
                    "unsupported query field skipped"
                );
                continue;
            }

            clauses.push(format!(
                "{} {} ?",
                field.column.column_name(),
                field.op.sql()
            ));
            params.push(match &field.value {
                QueryValue::Integer(v) => Box::new(*v),
                QueryValue::Real(v) => Box::new(*v),
                QueryValue::Text(v) => Box::new(v.clone()),
            });
        }

        (clauses.join(" AND "), params)
    }

    /// In-memory translation of the same predicates, for filtering already
    /// fetched rows without going back to storage.
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        self.fields.iter().all(|field| field_matches(field, entry))
    }
}

fn field_matches(field: &QueryField, entry: &HistoryEntry) -> bool {
    if !field.is_supported() {
        warn!(
            column = field.column.column_name(),
            "unsupported query field skipped"
        );
        return true;
    }

    let Some(value) = column_value(field.column, entry) else {
        // Stored NULL never satisfies a constraint.
        return false;
    };

    match field.op {
        QueryOperator::Like => like_matches(&field.value, &value),
        QueryOperator::NotLike => !like_matches(&field.value, &value),
        op => compare(&value, &field.value, op),
    }
}

fn like_matches(pattern: &QueryValue, value: &QueryValue) -> bool {
    let (QueryValue::Text(pattern), QueryValue::Text(value)) = (pattern, value) else {
        return false;
    };
    like_to_regex(pattern).is_match(value)
}

fn compare(left: &QueryValue, right: &QueryValue, op: QueryOperator) -> bool {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (QueryValue::Integer(a), QueryValue::Integer(b)) => a.partial_cmp(b),
        (QueryValue::Real(a), QueryValue::Real(b)) => a.partial_cmp(b),
        (QueryValue::Integer(a), QueryValue::Real(b)) => (*a as f64).partial_cmp(b),
        (QueryValue::Real(a), QueryValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (QueryValue::Text(a), QueryValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    };

    let Some(ordering) = ordering else {
        return false;
    };

    match op {
        QueryOperator::Equal => ordering == Ordering::Equal,
        QueryOperator::NotEqual => ordering != Ordering::Equal,
        QueryOperator::GreaterThan => ordering == Ordering::Greater,
        QueryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        QueryOperator::LessThan => ordering == Ordering::Less,
        QueryOperator::LessThanOrEqual => ordering != Ordering::Greater,
        QueryOperator::Like | QueryOperator::NotLike => false,
    }
}

fn column_value(column: HistoryColumn, entry: &HistoryEntry) -> Option<QueryValue> {
    let value = match column {
        HistoryColumn::Project => QueryValue::Integer(entry.project.project as i64),
        HistoryColumn::Run => QueryValue::Integer(entry.project.run as i64),
        HistoryColumn::Clone => QueryValue::Integer(entry.project.clone as i64),
        HistoryColumn::Gen => QueryValue::Integer(entry.project.generation as i64),
        HistoryColumn::ClientName => QueryValue::Text(entry.client_name.clone()),
        HistoryColumn::ClientPath => QueryValue::Text(entry.client_path.clone()),
        HistoryColumn::Username => QueryValue::Text(entry.username.clone()?),
        HistoryColumn::Team => QueryValue::Integer(entry.team?),
        HistoryColumn::CoreVersion => QueryValue::Text(entry.core_version.clone()?),
        HistoryColumn::FramesCompleted => QueryValue::Integer(entry.frames_completed),
        HistoryColumn::FrameTimeSecs => QueryValue::Integer(entry.frame_time_secs),
        HistoryColumn::Result => QueryValue::Text(format!("{:?}", entry.result)),
        HistoryColumn::Assigned => QueryValue::Text(entry.assigned?.to_rfc3339()),
        HistoryColumn::Finished => QueryValue::Text(entry.finished?.to_rfc3339()),
        HistoryColumn::WorkUnitName => QueryValue::Text(entry.work_unit_name.clone()?),
        HistoryColumn::KFactor => QueryValue::Real(entry.k_factor?),
        HistoryColumn::CoreName => QueryValue::Text(entry.core_name.clone()?),
        HistoryColumn::Frames => QueryValue::Integer(entry.frames?),
        HistoryColumn::Atoms => QueryValue::Integer(entry.atoms?),
        HistoryColumn::BaseCredit => QueryValue::Real(entry.base_credit?),
        HistoryColumn::PreferredDays => QueryValue::Real(entry.preferred_days?),
        HistoryColumn::MaximumDays => QueryValue::Real(entry.maximum_days?),
    };
    Some(value)
}

/// Translate a SQL LIKE pattern to an anchored, case-insensitive regex:
/// `%` matches any run, `_` any single character, everything else literally.
pub(crate) fn like_to_regex(pattern: &str) -> Regex {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push_str("(?i)^");
    for c in pattern.chars() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    // The translation only emits valid syntax; a compile failure would mean
    // the escaping above is broken.
    Regex::new(&translated).unwrap_or_else(|_| Regex::new("^$").unwrap())
}
