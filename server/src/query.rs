//! Repeated query parameters (`?comic_ids=1&comic_ids=2`), which axum's
//! `Query` extractor cannot collect into a list.

use serde_json::json;

use crate::error::{AppError, FieldError};

pub const COMIC_IDS: &str = "comic_ids";

/// Decoded `(key, value)` pairs in query order.
fn pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    match urlencoding::decode(&raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw,
    }
}

/// Every `comic_ids` value as an integer, in query order.
///
/// Any integer is accepted here, negative ones included; whether a comic
/// exists is for the lookup to decide. All malformed values are reported
/// together, and a query without the key is rejected as a missing field.
pub fn comic_ids(query: Option<&str>) -> Result<Vec<i64>, AppError> {
    let mut ids = Vec::new();
    let mut errors = Vec::new();
    let mut seen = 0usize;

    for (key, value) in pairs(query.unwrap_or_default()) {
        if key != COMIC_IDS {
            continue;
        }
        match value.trim().parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => errors.push(FieldError::not_an_integer(vec![
                json!("query"),
                json!(COMIC_IDS),
                json!(seen),
            ])),
        }
        seen += 1;
    }

    if seen == 0 {
        return Err(AppError::Validation(vec![FieldError::missing(vec![
            json!("query"),
            json!(COMIC_IDS),
        ])]));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(result: Result<Vec<i64>, AppError>) -> Vec<FieldError> {
        match result {
            Err(AppError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn collects_repeated_values_in_order() {
        let ids = comic_ids(Some("comic_ids=10&comic_ids=5&comic_ids=10")).unwrap();
        assert_eq!(ids, vec![10, 5, 10]);
    }

    #[test]
    fn ignores_other_keys() {
        let ids = comic_ids(Some("page=2&comic_ids=3&x")).unwrap();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn decodes_percent_escapes() {
        let ids = comic_ids(Some("comic%5Fids=%34%32")).unwrap();
        assert_eq!(ids, vec![42]);
    }

    #[test]
    fn keeps_integers_outside_the_id_range() {
        let ids = comic_ids(Some("comic_ids=-1&comic_ids=4294967296")).unwrap();
        assert_eq!(ids, vec![-1, 4_294_967_296]);
    }

    #[test]
    fn missing_key_is_field_required() {
        for query in [None, Some(""), Some("ids=1")] {
            let errors = errors(comic_ids(query));
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].msg, "field required");
            assert_eq!(errors[0].loc, vec![json!("query"), json!("comic_ids")]);
        }
    }

    #[test]
    fn every_bad_value_is_reported() {
        let errors = errors(comic_ids(Some("comic_ids=1&comic_ids=c&comic_ids=2.5")));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].loc[2], json!(1));
        assert_eq!(errors[1].loc[2], json!(2));
        assert_eq!(errors[1].msg, "value is not a valid integer");
    }
}
