use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A document's fields as stored in the document store
pub type Fields = serde_json::Map<String, Value>;

/// Key under which the provider-assigned identifier is attached to query results
pub const ID_FIELD: &str = "_id";

/// Comparison operator of a query condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    fn accepts(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Operator::Ne, ord) => ord != Some(Ordering::Equal),
            (_, None) => false,
            (Operator::Eq, Some(ord)) => ord == Ordering::Equal,
            (Operator::Lt, Some(ord)) => ord == Ordering::Less,
            (Operator::Le, Some(ord)) => ord != Ordering::Greater,
            (Operator::Gt, Some(ord)) => ord == Ordering::Greater,
            (Operator::Ge, Some(ord)) => ord != Ordering::Less,
        }
    }
}

/// Field/operator/value predicate; `field` may be a dotted path into nested objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Documents missing the field never match
    pub fn matches(&self, doc: &Fields) -> bool {
        match lookup(doc, &self.field) {
            Some(actual) => self.op.accepts(compare_values(actual, &self.value)),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort key of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Resolve a dotted path such as `message.title`
pub fn lookup<'a>(doc: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Numbers compare numerically, strings lexically, bools false < true.
/// Mixed types are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort documents by each order in turn; missing fields sort first
pub fn sort_documents<T>(docs: &mut [(T, Fields)], ordering: &[Order]) {
    if ordering.is_empty() {
        return;
    }

    docs.sort_by(|(_, a), (_, b)| {
        for order in ordering {
            let ord = match (lookup(a, &order.field), lookup(b, &order.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
