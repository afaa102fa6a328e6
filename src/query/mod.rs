//! Generic filter/sort/projection/pagination builder for admin listings.
//!
//! Flow Overview:
//! 1) Each listable resource describes its fields with a [`Schema`].
//! 2) [`ListQuery::parse`] turns raw query-string pairs into a typed query,
//!    collecting every violation into one `Error::Validation`.
//! 3) Stores render the same [`Filter`] value twice: once for the total count
//!    and once for the page (`sql` for Postgres, `eval` for memory).
//!
//! Recognised keys: `page`, `limit`, `sort`, `fields`, `search`; any other key
//! is a field filter, either exact (`status=new`) or a range when suffixed with
//! `_gt`, `_gte`, `_lt` or `_lte` (`created_at_gte=2024-01-01`).

pub mod eval;
pub mod sql;

use chrono::{DateTime, NaiveDate, Utc};
use std::{cmp::Ordering, fmt::Debug};

use crate::error::{Error, FieldError};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const DEFAULT_MAX_LIMIT: u32 = 100;

const KEY_PAGE: &str = "page";
const KEY_LIMIT: &str = "limit";
const KEY_SORT: &str = "sort";
const KEY_FIELDS: &str = "fields";
const KEY_SEARCH: &str = "search";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Text restricted to a fixed set of lowercase values.
    Enum(&'static [&'static str]),
    Bool,
    Integer,
    Timestamp,
}

impl FieldKind {
    const fn is_ordered(self) -> bool {
        matches!(self, Self::Integer | Self::Timestamp)
    }
}

/// Describes the queryable surface of one collection.
pub trait Schema: Copy + Eq + Debug + Send + Sync + 'static {
    const FIELDS: &'static [Self];
    /// Keys accepted by `fields=`; `id` is always returned.
    const PROJECTION: &'static [&'static str];
    /// Text fields matched by `search=`.
    const SEARCH: &'static [Self];
    const DEFAULT_SORT: &'static [SortKey<Self>];

    /// Name used in query strings.
    fn name(self) -> &'static str;
    /// Storage column; must be a trusted identifier.
    fn column(self) -> &'static str;
    fn kind(self) -> FieldKind;

    fn filterable(self) -> bool {
        true
    }

    fn sortable(self) -> bool {
        true
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::FIELDS.iter().copied().find(|field| field.name() == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Bool(bool),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Compare two values of the same variant; mixed variants never compare.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn parse(kind: FieldKind, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match kind {
            FieldKind::Text => Ok(Self::Text(raw.to_string())),
            FieldKind::Enum(allowed) => {
                let value = raw.to_lowercase();
                if allowed.contains(&value.as_str()) {
                    Ok(Self::Text(value))
                } else {
                    Err(format!("must be one of: {}", allowed.join(", ")))
                }
            }
            FieldKind::Bool => match raw.to_lowercase().as_str() {
                "true" | "1" => Ok(Self::Bool(true)),
                "false" | "0" => Ok(Self::Bool(false)),
                _ => Err("must be true or false".to_string()),
            },
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|_| "must be an integer".to_string()),
            FieldKind::Timestamp => parse_timestamp(raw)
                .map(Self::Timestamp)
                .ok_or_else(|| "must be an RFC 3339 timestamp or YYYY-MM-DD date".to_string()),
        }
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    const SUFFIXES: [(&'static str, Self); 4] = [
        ("_gte", Self::Gte),
        ("_lte", Self::Lte),
        ("_gt", Self::Gt),
        ("_lt", Self::Lt),
    ];

    /// Split `created_at_gte` into (`created_at`, `Gte`); plain keys are `Eq`.
    fn split_key(key: &str) -> (&str, Self) {
        for (suffix, op) in Self::SUFFIXES {
            if let Some(field) = key.strip_suffix(suffix) {
                return (field, op);
            }
        }
        (key, Self::Eq)
    }

    #[must_use]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition<F> {
    pub field: F,
    pub op: Comparison,
    pub value: Value,
}

/// Filter predicate shared by the count and the page read.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter<F> {
    pub conditions: Vec<Condition<F>>,
    pub search: Option<String>,
}

impl<F: Schema> Default for Filter<F> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            search: None,
        }
    }
}

impl<F: Schema> Filter<F> {
    #[must_use]
    pub fn with(mut self, field: F, op: Comparison, value: Value) -> Self {
        self.conditions.push(Condition { field, op, value });
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey<F> {
    pub field: F,
    pub direction: Direction,
}

#[derive(Clone, Copy, Debug)]
pub struct QueryLimits {
    default_limit: u32,
    max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryLimits {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }

    #[must_use]
    pub fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self.default_limit = self.default_limit.min(self.max_limit);
        self
    }

    #[must_use]
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }
}

/// One page of records plus the total matching the filter.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[derive(Clone, Debug)]
pub struct ListQuery<F> {
    pub filter: Filter<F>,
    pub sort: Vec<SortKey<F>>,
    pub projection: Option<Vec<&'static str>>,
    pub page: u32,
    pub limit: u32,
}

impl<F: Schema> ListQuery<F> {
    /// Unfiltered first page with the default sort.
    #[must_use]
    pub fn new(limits: QueryLimits) -> Self {
        Self {
            filter: Filter::default(),
            sort: F::DEFAULT_SORT.to_vec(),
            projection: None,
            page: 1,
            limit: limits.default_limit,
        }
    }

    /// Build a query from raw query-string pairs.
    ///
    /// # Errors
    /// Returns `Error::Validation` listing every unknown field, badly typed
    /// value, unsupported operator and invalid page/limit.
    pub fn parse(params: &[(String, String)], limits: QueryLimits) -> Result<Self, Error> {
        let mut query = Self::new(limits);
        let mut errors = Vec::new();

        for (key, raw) in params {
            let key = key.trim();
            if raw.trim().is_empty() {
                continue;
            }
            match key {
                KEY_PAGE => match raw.trim().parse::<i64>() {
                    Ok(page) if page >= 1 => {
                        query.page = u32::try_from(page).unwrap_or(u32::MAX);
                    }
                    Ok(_) => errors.push(FieldError::new(KEY_PAGE, "page must be at least 1")),
                    Err(_) => errors.push(FieldError::new(KEY_PAGE, "page must be an integer")),
                },
                KEY_LIMIT => match raw.trim().parse::<i64>() {
                    Ok(limit) if limit >= 1 => {
                        let clamped = limit.min(i64::from(limits.max_limit));
                        query.limit = u32::try_from(clamped).unwrap_or(limits.max_limit);
                    }
                    Ok(_) => errors.push(FieldError::new(KEY_LIMIT, "limit must be at least 1")),
                    Err(_) => errors.push(FieldError::new(KEY_LIMIT, "limit must be an integer")),
                },
                KEY_SORT => match parse_sort::<F>(raw) {
                    Ok(sort) if !sort.is_empty() => query.sort = sort,
                    Ok(_) => {}
                    Err(mut errs) => errors.append(&mut errs),
                },
                KEY_FIELDS => match parse_projection::<F>(raw) {
                    Ok(fields) => query.projection = Some(fields),
                    Err(mut errs) => errors.append(&mut errs),
                },
                KEY_SEARCH => {
                    if F::SEARCH.is_empty() {
                        errors.push(FieldError::new(KEY_SEARCH, "search is not supported here"));
                    } else {
                        query.filter.search = Some(raw.trim().to_string());
                    }
                }
                _ => match parse_condition::<F>(key, raw) {
                    Ok(condition) => query.filter.conditions.push(condition),
                    Err(err) => errors.push(err),
                },
            }
        }

        if errors.is_empty() {
            Ok(query)
        } else {
            Err(Error::Validation(errors))
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    #[must_use]
    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit.max(1)))
    }

    /// Drop every key not in the projection (keeping `id`) from a JSON object.
    #[must_use]
    pub fn project(&self, item: serde_json::Value) -> serde_json::Value {
        let Some(fields) = &self.projection else {
            return item;
        };
        match item {
            serde_json::Value::Object(mut map) => {
                map.retain(|key, _| key == "id" || fields.contains(&key.as_str()));
                serde_json::Value::Object(map)
            }
            other => other,
        }
    }
}

fn parse_condition<F: Schema>(key: &str, raw: &str) -> Result<Condition<F>, FieldError> {
    let (name, op) = Comparison::split_key(key);
    let field = F::from_name(name)
        .filter(|field| field.filterable())
        .ok_or_else(|| FieldError::new(key, "unknown filter field"))?;
    if op != Comparison::Eq && !field.kind().is_ordered() {
        return Err(FieldError::new(
            key,
            "range filters require a numeric or date field",
        ));
    }
    let value = Value::parse(field.kind(), raw).map_err(|message| FieldError::new(key, message))?;
    Ok(Condition { field, op, value })
}

fn parse_sort<F: Schema>(raw: &str) -> Result<Vec<SortKey<F>>, Vec<FieldError>> {
    let mut keys = Vec::new();
    let mut errors = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        let (name, direction) = match token.strip_prefix('-') {
            Some(name) => (name, Direction::Desc),
            None => (token.strip_prefix('+').unwrap_or(token), Direction::Asc),
        };
        match F::from_name(name).filter(|field| field.sortable()) {
            Some(field) => keys.push(SortKey { field, direction }),
            None => errors.push(FieldError::new(
                KEY_SORT,
                format!("cannot sort by '{name}'"),
            )),
        }
    }
    if errors.is_empty() {
        Ok(keys)
    } else {
        Err(errors)
    }
}

fn parse_projection<F: Schema>(raw: &str) -> Result<Vec<&'static str>, Vec<FieldError>> {
    let mut fields = Vec::new();
    let mut errors = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        match F::PROJECTION.iter().find(|known| **known == name) {
            Some(known) => fields.push(*known),
            None => errors.push(FieldError::new(
                KEY_FIELDS,
                format!("unknown field '{name}'"),
            )),
        }
    }
    if errors.is_empty() {
        Ok(fields)
    } else {
        Err(errors)
    }
}
