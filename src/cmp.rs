//! Total order over typed [`Value`]s, with an explicit `Incomparable` result
//! instead of a panic for pairs that have no defined order.

use crate::btree::OrderedKey;
use crate::timestamp::parse_timestamp;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl Comparison {
    pub fn is_equal(self) -> bool {
        matches!(self, Comparison::Equal)
    }
}

/// Compares two values. `Null` on either side is always `Incomparable`, as
/// is any cross-type pair outside the two reconciliation rules below:
/// `Integer`/`Float` compare numerically, and `Text`/`Timestamp` parses the
/// text with the timestamp parser (a parse failure is `Incomparable`, not an
/// error — comparators never fail).
pub fn compare(a: &Value, b: &Value) -> Comparison {
    use Value::*;
    match (a, b) {
        (Null, _) | (_, Null) => Comparison::Incomparable,
        (Integer(x), Integer(y)) => order(x, y),
        (Text(x), Text(y)) => order(&x.as_bytes(), &y.as_bytes()),
        (Boolean(x), Boolean(y)) => order(x, y),
        (Timestamp(x), Timestamp(y)) => order(x, y),
        (Float(x), Float(y)) => order_f64(*x, *y),
        (Integer(x), Float(y)) => order_f64(*x as f64, *y),
        (Float(x), Integer(y)) => order_f64(*x, *y as f64),
        (Text(t), Timestamp(ts)) => match parse_timestamp(t) {
            Ok(parsed) => order(&parsed, ts),
            Err(_) => Comparison::Incomparable,
        },
        (Timestamp(ts), Text(t)) => match parse_timestamp(t) {
            Ok(parsed) => order(ts, &parsed),
            Err(_) => Comparison::Incomparable,
        },
        _ => Comparison::Incomparable,
    }
}

fn order<T: PartialOrd>(x: T, y: T) -> Comparison {
    match x.partial_cmp(&y) {
        Some(std::cmp::Ordering::Less) => Comparison::Less,
        Some(std::cmp::Ordering::Equal) => Comparison::Equal,
        Some(std::cmp::Ordering::Greater) => Comparison::Greater,
        None => Comparison::Incomparable,
    }
}

fn order_f64(x: f64, y: f64) -> Comparison {
    order(x, y)
}

impl OrderedKey for Value {
    fn key_cmp(&self, other: &Self) -> Comparison {
        compare(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn integers_order_numerically() {
        assert_eq!(compare(&Value::Integer(1), &Value::Integer(2)), Comparison::Less);
        assert_eq!(compare(&Value::Integer(2), &Value::Integer(2)), Comparison::Equal);
        assert_eq!(compare(&Value::Integer(3), &Value::Integer(2)), Comparison::Greater);
    }

    #[test]
    fn text_orders_by_bytes() {
        assert_eq!(
            compare(&Value::Text("a".into()), &Value::Text("b".into())),
            Comparison::Less
        );
    }

    #[test]
    fn booleans_order_false_before_true() {
        assert_eq!(
            compare(&Value::Boolean(false), &Value::Boolean(true)),
            Comparison::Less
        );
    }

    #[test]
    fn null_is_always_incomparable() {
        assert_eq!(compare(&Value::Null, &Value::Integer(1)), Comparison::Incomparable);
        assert_eq!(compare(&Value::Integer(1), &Value::Null), Comparison::Incomparable);
        assert_eq!(compare(&Value::Null, &Value::Null), Comparison::Incomparable);
    }

    #[test]
    fn mismatched_types_are_incomparable_by_default() {
        assert_eq!(
            compare(&Value::Integer(1), &Value::Boolean(true)),
            Comparison::Incomparable
        );
    }

    #[test]
    fn integer_and_float_compare_numerically() {
        assert_eq!(compare(&Value::Integer(2), &Value::Float(2.5)), Comparison::Less);
        assert_eq!(compare(&Value::Float(2.0), &Value::Integer(2)), Comparison::Equal);
    }

    #[test]
    fn text_and_timestamp_reconcile_via_parsing() {
        let ts: DateTime<Utc> = DateTime::from_timestamp_micros(0).unwrap();
        assert_eq!(
            compare(&Value::Text("1970-01-01 00:00:00".into()), &Value::Timestamp(ts)),
            Comparison::Equal
        );
        assert_eq!(
            compare(&Value::Text("not a date".into()), &Value::Timestamp(ts)),
            Comparison::Incomparable
        );
    }
}
