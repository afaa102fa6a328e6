//! Postgres rendering of a [`ListQuery`].
//!
//! Columns come from [`Schema::column`] (trusted identifiers); every value is
//! bound as a parameter.

use sqlx::{Postgres, QueryBuilder};

use super::{Comparison, Direction, Filter, ListQuery, Schema, SortKey, Value};

const fn operator(op: Comparison) -> &'static str {
    match op {
        Comparison::Eq => " = ",
        Comparison::Gt => " > ",
        Comparison::Gte => " >= ",
        Comparison::Lt => " < ",
        Comparison::Lte => " <= ",
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Text(text) => builder.push_bind(text.clone()),
        Value::Bool(flag) => builder.push_bind(*flag),
        Value::Integer(number) => builder.push_bind(*number),
        Value::Timestamp(at) => builder.push_bind(*at),
    };
}

/// Escape `%`, `_` and `\` so a search term only matches literally.
#[must_use]
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append ` WHERE …` for the filter (always present, `TRUE` when empty).
pub fn push_filter<F: Schema>(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter<F>) {
    builder.push(" WHERE TRUE");
    for condition in &filter.conditions {
        builder
            .push(" AND ")
            .push(condition.field.column())
            .push(operator(condition.op));
        push_value(builder, &condition.value);
    }

    if let Some(term) = &filter.search
        && !F::SEARCH.is_empty()
    {
        let pattern = format!("%{}%", escape_like(term));
        builder.push(" AND (");
        for (index, field) in F::SEARCH.iter().enumerate() {
            if index > 0 {
                builder.push(" OR ");
            }
            builder
                .push(field.column())
                .push(" ILIKE ")
                .push_bind(pattern.clone());
        }
        builder.push(")");
    }
}

/// Append ` ORDER BY …, id ASC`.
pub fn push_order<F: Schema>(builder: &mut QueryBuilder<'_, Postgres>, sort: &[SortKey<F>]) {
    builder.push(" ORDER BY ");
    for key in sort {
        builder.push(key.field.column()).push(match key.direction {
            Direction::Asc => " ASC, ",
            Direction::Desc => " DESC, ",
        });
    }
    builder.push("id ASC");
}

/// Append ORDER BY, LIMIT and OFFSET for one page.
pub fn push_page<F: Schema>(builder: &mut QueryBuilder<'_, Postgres>, query: &ListQuery<F>) {
    push_order(builder, &query.sort);
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(query.limit))
        .push(" OFFSET ")
        .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryLimits, tests::Doc};

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
    fn renders_filter_with_placeholders() {
        let query = query(&[("state", "open"), ("score_lt", "9"), ("search", "50%")]);
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM docs");
        push_filter(&mut builder, &query.filter);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM docs WHERE TRUE AND state = $1 AND score < $2 AND (title ILIKE $3)"
        );
    }

    #[test]
    fn renders_page_with_id_tiebreak() {
        let query = query(&[("sort", "-score,title"), ("page", "3"), ("limit", "5")]);
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM docs");
        push_filter(&mut builder, &query.filter);
        push_page(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM docs WHERE TRUE ORDER BY score DESC, title ASC, id ASC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
    }
}
