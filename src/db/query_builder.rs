use sea_orm::{
    sea_query::IntoCondition, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QuerySelect, Select,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// `{page, limit}` as sent by callers. Use [`PageRequest::normalize`] before querying.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    /// Page size; clamped to the configured maximum
    #[serde(default)]
    pub limit: Option<u64>,
}

fn default_page() -> u64 {
    1
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: None,
        }
    }
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page,
            limit: Some(limit),
        }
    }

    /// Applies defaults and clamps to `[1, max_limit]`.
    pub fn normalize(self, default_limit: u64, max_limit: u64) -> PageWindow {
        let max_limit = max_limit.max(1);
        PageWindow {
            page: self.page.max(1),
            limit: self.limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }
}

/// A normalized page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
}

impl PageWindow {
    /// Calculate zero-based offset for pagination
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Standard pagination response metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if total == 0 || limit == 0 {
            0
        } else {
            total.div_ceil(limit)
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, window: PageWindow, total: u64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(window.page, window.limit, total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Accumulates AND-ed filter clauses shared by a list's count and page queries.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    condition: Condition,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self {
            condition: Condition::all(),
        }
    }

    /// Add an exact match condition
    pub fn eq<C, V>(mut self, column: C, value: V) -> Self
    where
        C: ColumnTrait,
        V: Into<sea_orm::Value>,
    {
        self.condition = self.condition.add(column.eq(value));
        self
    }

    pub fn eq_opt<C, V>(self, column: C, value: Option<V>) -> Self
    where
        C: ColumnTrait,
        V: Into<sea_orm::Value>,
    {
        match value {
            Some(value) => self.eq(column, value),
            None => self,
        }
    }

    pub fn gte_opt<C, V>(mut self, column: C, value: Option<V>) -> Self
    where
        C: ColumnTrait,
        V: Into<sea_orm::Value>,
    {
        if let Some(value) = value {
            self.condition = self.condition.add(column.gte(value));
        }
        self
    }

    pub fn lte_opt<C, V>(mut self, column: C, value: Option<V>) -> Self
    where
        C: ColumnTrait,
        V: Into<sea_orm::Value>,
    {
        if let Some(value) = value {
            self.condition = self.condition.add(column.lte(value));
        }
        self
    }

    pub fn lt_opt<C, V>(mut self, column: C, value: Option<V>) -> Self
    where
        C: ColumnTrait,
        V: Into<sea_orm::Value>,
    {
        if let Some(value) = value {
            self.condition = self.condition.add(column.lt(value));
        }
        self
    }

    /// Add a LIKE condition for text search; blank patterns are ignored
    pub fn contains_opt<C: ColumnTrait>(mut self, column: C, pattern: Option<&str>) -> Self {
        if let Some(pattern) = pattern.map(str::trim).filter(|p| !p.is_empty()) {
            self.condition = self.condition.add(column.contains(pattern));
        }
        self
    }

    pub fn add<F: IntoCondition>(mut self, clause: F) -> Self {
        self.condition = self.condition.add(clause.into_condition());
        self
    }

    pub fn add_if<F: IntoCondition>(self, when: bool, clause: impl FnOnce() -> F) -> Self {
        if when {
            self.add(clause())
        } else {
            self
        }
    }

    pub fn build(self) -> Condition {
        self.condition
    }
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// Exclusive upper bound for an inclusive `..=date` range over timestamps.
pub fn end_of_day_exclusive(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date.succ_opt().unwrap_or(date))
}

/// Runs the count query and the page query for one filter.
///
/// `order` is applied to the page query only.
pub async fn fetch_page<E, C, F>(
    conn: &C,
    filter: Condition,
    order: F,
    window: PageWindow,
) -> Result<Page<E::Model>, DbErr>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Send + Sync,
    C: ConnectionTrait,
    F: FnOnce(Select<E>) -> Select<E>,
{
    let total = E::find().filter(filter.clone()).count(conn).await?;
    let data = order(E::find().filter(filter))
        .limit(window.limit)
        .offset(window.offset())
        .all(conn)
        .await?;

    Ok(Page::new(data, window, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 20, 0)]
    #[case(1, 20, 1)]
    #[case(20, 20, 1)]
    #[case(21, 20, 2)]
    #[case(101, 10, 11)]
    fn pages_round_up(#[case] total: u64, #[case] limit: u64, #[case] pages: u64) {
        assert_eq!(PaginationMeta::new(1, limit, total).pages, pages);
    }

    #[test]
    fn normalize_applies_defaults_and_caps() {
        let window = PageRequest::default().normalize(20, 100);
        assert_eq!(window, PageWindow { page: 1, limit: 20 });

        let window = PageRequest::new(0, 5000).normalize(20, 100);
        assert_eq!(window, PageWindow { page: 1, limit: 100 });

        let window = PageRequest::new(3, 0).normalize(20, 100);
        assert_eq!(window, PageWindow { page: 3, limit: 1 });
        assert_eq!(window.offset(), 2);
    }

    #[test]
    fn add_if_only_applies_enabled_clauses() {
        use crate::entities::ledger_document;
        use sea_orm::{DbBackend, QueryTrait};

        let condition = FilterBuilder::new()
            .add_if(true, || ledger_document::Column::Balance.gt(0))
            .add_if(false, || ledger_document::Column::CreditAmount.gt(0))
            .add(Condition::any().add(ledger_document::Column::Notes.is_null()))
            .build();
        let sql = ledger_document::Entity::find()
            .filter(condition)
            .build(DbBackend::Sqlite)
            .to_string();

        assert!(sql.contains(r#""balance" > 0"#));
        assert!(sql.contains(r#""notes" IS NULL"#));
        assert!(!sql.contains("credit_amount\" >"));
    }

    #[test]
    fn day_bounds_cover_the_whole_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(start_of_day(date).to_rfc3339(), "2024-02-29T00:00:00+00:00");
        assert_eq!(
            end_of_day_exclusive(date).to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
    }
}
