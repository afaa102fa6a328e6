//! In-memory evaluation of a [`ListQuery`] for the memory store.
//!
//! Ordering mirrors Postgres: missing values sort last ascending and first
//! descending, and ties fall back to ascending id.

use std::cmp::Ordering;
use uuid::Uuid;

use super::{Direction, Filter, ListQuery, Page, Schema, SortKey, Value};

/// A stored row that can be inspected field by field.
pub trait Record<F: Schema> {
    fn id(&self) -> Uuid;
    fn value(&self, field: F) -> Option<Value>;
}

impl<F: Schema> Filter<F> {
    pub fn matches<R: Record<F>>(&self, record: &R) -> bool {
        let conditions = self.conditions.iter().all(|condition| {
            record
                .value(condition.field)
                .and_then(|value| value.compare(&condition.value))
                .is_some_and(|ordering| condition.op.holds(ordering))
        });
        conditions && self.search_matches(record)
    }

    fn search_matches<R: Record<F>>(&self, record: &R) -> bool {
        let Some(needle) = &self.search else {
            return true;
        };
        let needle = needle.to_lowercase();
        F::SEARCH.iter().any(|field| match record.value(*field) {
            Some(Value::Text(text)) => text.to_lowercase().contains(&needle),
            _ => false,
        })
    }
}

pub fn compare<F: Schema, R: Record<F>>(a: &R, b: &R, sort: &[SortKey<F>]) -> Ordering {
    for key in sort {
        let ordering = match (a.value(key.field), b.value(key.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => left.compare(&right).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id().cmp(&b.id())
}

/// Filter, sort and slice `records`; `total` counts every match.
pub fn paginate<'a, F, R, I>(records: I, query: &ListQuery<F>) -> Page<R>
where
    F: Schema,
    R: Record<F> + Clone + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut matched: Vec<&R> = records
        .into_iter()
        .filter(|record| query.filter.matches(*record))
        .collect();
    matched.sort_by(|a, b| compare(*a, *b, &query.sort));

    let total = matched.len() as u64;
    let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
    let items = matched
        .into_iter()
        .skip(offset)
        .take(query.limit as usize)
        .cloned()
        .collect();
    Page { items, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryLimits, parse_timestamp, tests::Doc};
    use chrono::{DateTime, Duration, Utc};

    #[derive(Clone, Debug)]
    struct Row {
        id: Uuid,
        title: String,
        state: &'static str,
        score: Option<i64>,
        created_at: DateTime<Utc>,
    }

    impl Record<Doc> for Row {
        fn id(&self) -> Uuid {
            self.id
        }

        fn value(&self, field: Doc) -> Option<Value> {
            match field {
                Doc::Title => Some(Value::Text(self.title.clone())),
                Doc::State => Some(Value::Text(self.state.to_string())),
                Doc::Score => self.score.map(Value::Integer),
                Doc::Flagged => Some(Value::Bool(false)),
                Doc::CreatedAt => Some(Value::Timestamp(self.created_at)),
            }
        }
    }

    fn rows(count: i64) -> Vec<Row> {
        let base = parse_timestamp("2024-03-01").unwrap_or_default();
        (0..count)
            .map(|i| Row {
                id: Uuid::from_u128(u128::try_from(i).unwrap_or_default() + 1),
                title: format!("Row {i}"),
                state: if i % 2 == 0 { "open" } else { "closed" },
                score: if i == 0 { None } else { Some(i) },
                created_at: base + Duration::minutes(i),
            })
            .collect()
    }

    fn query(pairs: &[(&str, &str)]) -> ListQuery<Doc> {
        let params: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        match ListQuery::parse(&params, QueryLimits::new()) {
            Ok(query) => query,
            Err(err) => panic!("query should parse: {err:?}"),
        }
    }

    #[test]
    fn page_size_follows_total() {
        let rows = rows(23);
        for (page, expected) in [("1", 10), ("2", 10), ("3", 3), ("4", 0)] {
            let result = paginate(&rows, &query(&[("page", page)]));
            assert_eq!(result.total, 23);
            assert_eq!(result.items.len(), expected, "page {page}");
        }
    }

    #[test]
    fn default_sort_is_newest_first() {
        let rows = rows(5);
        let result = paginate(&rows, &query(&[("limit", "2"), ("page", "2")]));
        let titles: Vec<&str> = result.items.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Row 2", "Row 1"]);
    }

    #[test]
    fn filters_and_search_combine() {
        let rows = rows(10);
        let result = paginate(
            &rows,
            &query(&[("state", "open"), ("score_gte", "4"), ("search", "ROW")]),
        );
        assert_eq!(result.total, 3);
        assert!(result.items.iter().all(|r| r.state == "open"));
    }

    #[test]
    fn missing_values_sort_last_ascending() {
        let rows = rows(3);
        let asc = paginate(&rows, &query(&[("sort", "score")]));
        assert_eq!(asc.items.last().map(|r| r.score), Some(None));
        let desc = paginate(&rows, &query(&[("sort", "-score")]));
        assert_eq!(desc.items.first().map(|r| r.score), Some(None));
    }

    #[test]
    fn ties_break_on_id() {
        let mut rows = rows(3);
        for row in &mut rows {
            row.state = "open";
        }
        let result = paginate(&rows, &query(&[("sort", "state")]));
        let ids: Vec<Uuid> = result.items.iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
