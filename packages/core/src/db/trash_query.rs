//! Trash Query
//!
//! Value objects describing which trash entries to list and in what order,
//! plus the converter seam that turns them into SQL. The store only supplies
//! the base `SELECT ... FROM trash`; filter and sort clauses come from a
//! [`TrashQueryConverter`], so callers can plug in their own criteria mapping.

use crate::models::{ContentId, LocationId, TrashEntry};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while converting a trash query into SQL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid criterion: {0}")]
    InvalidCriterion(String),
}

/// Render a timestamp the way `trash.trashed_at` stores it
///
/// Fixed precision keeps lexicographic order equal to chronological order.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Filter over trash entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TrashCriterion {
    /// Entries of any of these content items
    ContentIds(Vec<ContentId>),
    /// Entries whose original parent is this location
    ParentLocation(LocationId),
    TrashedSince(DateTime<Utc>),
    /// Entries whose original depth lies in `min..=max`
    DepthBetween { min: i64, max: i64 },
    /// All nested criteria must match
    And(Vec<TrashCriterion>),
}

/// Sort clause over trash entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "direction", rename_all = "snake_case")]
pub enum TrashSortClause {
    TrashedAt(SortDirection),
    Depth(SortDirection),
    Priority(SortDirection),
    Path(SortDirection),
    LocationId(SortDirection),
}

/// A page of trash entries
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashQuery {
    pub criterion: Option<TrashCriterion>,
    pub sort_clauses: Vec<TrashSortClause>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl TrashQuery {
    pub fn new(criterion: TrashCriterion) -> Self {
        Self {
            criterion: Some(criterion),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, clause: TrashSortClause) -> Self {
        self.sort_clauses.push(clause);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// Matching entries for one page, plus the total count ignoring paging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashResult {
    pub items: Vec<TrashEntry>,
    pub total_count: usize,
}

/// SQL text with its positional parameters
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    sql: String,
    params: Vec<Value>,
}

impl SqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a `?` placeholder bound to `value`
    pub fn push_param(&mut self, value: impl Into<Value>) {
        self.sql.push('?');
        self.params.push(value.into());
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

/// Turns trash query value objects into SQL clauses
pub trait TrashQueryConverter: Send + Sync {
    /// Append a boolean SQL condition for `criterion` to `filter`
    fn convert_criterion(
        &self,
        criterion: &TrashCriterion,
        filter: &mut SqlFragment,
    ) -> Result<(), QueryError>;

    /// ORDER BY terms (without the keyword) for `clauses`
    fn convert_sort_clauses(&self, clauses: &[TrashSortClause]) -> String;
}

/// Maps criteria onto the columns of the `trash` table
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlTrashQueryConverter;

impl TrashQueryConverter for SqlTrashQueryConverter {
    fn convert_criterion(
        &self,
        criterion: &TrashCriterion,
        filter: &mut SqlFragment,
    ) -> Result<(), QueryError> {
        match criterion {
            TrashCriterion::ContentIds(ids) if ids.is_empty() => filter.push_sql("1 = 0"),
            TrashCriterion::ContentIds(ids) => {
                filter.push_sql("content_id IN (");
                for (index, id) in ids.iter().enumerate() {
                    if index > 0 {
                        filter.push_sql(", ");
                    }
                    filter.push_param(*id);
                }
                filter.push_sql(")");
            }
            TrashCriterion::ParentLocation(parent_id) => {
                filter.push_sql("parent_id = ");
                filter.push_param(*parent_id);
            }
            TrashCriterion::TrashedSince(since) => {
                filter.push_sql("trashed_at >= ");
                filter.push_param(format_timestamp(since));
            }
            TrashCriterion::DepthBetween { min, max } => {
                if min > max {
                    return Err(QueryError::InvalidCriterion(format!(
                        "depth range {}..={} is empty",
                        min, max
                    )));
                }
                filter.push_sql("depth BETWEEN ");
                filter.push_param(*min);
                filter.push_sql(" AND ");
                filter.push_param(*max);
            }
            TrashCriterion::And(criteria) if criteria.is_empty() => filter.push_sql("1 = 1"),
            TrashCriterion::And(criteria) => {
                filter.push_sql("(");
                for (index, nested) in criteria.iter().enumerate() {
                    if index > 0 {
                        filter.push_sql(" AND ");
                    }
                    self.convert_criterion(nested, filter)?;
                }
                filter.push_sql(")");
            }
        }
        Ok(())
    }

    fn convert_sort_clauses(&self, clauses: &[TrashSortClause]) -> String {
        let mut terms: Vec<String> = clauses
            .iter()
            .map(|clause| {
                let (column, direction) = match clause {
                    TrashSortClause::TrashedAt(d) => ("trashed_at", d),
                    TrashSortClause::Depth(d) => ("depth", d),
                    TrashSortClause::Priority(d) => ("priority", d),
                    TrashSortClause::Path(d) => ("path_string", d),
                    TrashSortClause::LocationId(d) => ("location_id", d),
                };
                format!("{} {}", column, direction.as_sql())
            })
            .collect();

        // Stable paging needs a total order
        if !clauses
            .iter()
            .any(|clause| matches!(clause, TrashSortClause::LocationId(_)))
        {
            terms.push("location_id ASC".to_string());
        }

        terms.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_ids_criterion_binds_every_id() {
        let mut filter = SqlFragment::new();
        SqlTrashQueryConverter
            .convert_criterion(&TrashCriterion::ContentIds(vec![200, 201]), &mut filter)
            .unwrap();

        assert_eq!(filter.sql(), "content_id IN (?, ?)");
        assert_eq!(filter.params(), &[Value::Integer(200), Value::Integer(201)]);
    }

    #[test]
    fn test_nested_and_criterion() {
        let criterion = TrashCriterion::And(vec![
            TrashCriterion::ParentLocation(5),
            TrashCriterion::DepthBetween { min: 1, max: 3 },
        ]);
        let mut filter = SqlFragment::new();
        SqlTrashQueryConverter
            .convert_criterion(&criterion, &mut filter)
            .unwrap();

        assert_eq!(filter.sql(), "(parent_id = ? AND depth BETWEEN ? AND ?)");
        assert_eq!(filter.params().len(), 3);
    }

    #[test]
    fn test_empty_criteria_are_constant_conditions() {
        let mut filter = SqlFragment::new();
        SqlTrashQueryConverter
            .convert_criterion(&TrashCriterion::ContentIds(vec![]), &mut filter)
            .unwrap();
        assert_eq!(filter.sql(), "1 = 0");

        let mut filter = SqlFragment::new();
        SqlTrashQueryConverter
            .convert_criterion(&TrashCriterion::And(vec![]), &mut filter)
            .unwrap();
        assert_eq!(filter.sql(), "1 = 1");
    }

    #[test]
    fn test_inverted_depth_range_rejected() {
        let mut filter = SqlFragment::new();
        let err = SqlTrashQueryConverter
            .convert_criterion(&TrashCriterion::DepthBetween { min: 4, max: 2 }, &mut filter)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidCriterion(_)));
    }

    #[test]
    fn test_sort_clauses_always_end_with_location_id() {
        let order = SqlTrashQueryConverter.convert_sort_clauses(&[
            TrashSortClause::TrashedAt(SortDirection::Descending),
            TrashSortClause::Depth(SortDirection::Ascending),
        ]);
        assert_eq!(order, "trashed_at DESC, depth ASC, location_id ASC");

        let order = SqlTrashQueryConverter
            .convert_sort_clauses(&[TrashSortClause::LocationId(SortDirection::Descending)]);
        assert_eq!(order, "location_id DESC");
    }

    #[test]
    fn test_timestamp_format_sorts_chronologically() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(format_timestamp(&earlier), "2024-01-02T03:04:05.000000Z");
    }
}
