use serde_json::{Number, Value};

/// Extra columns written onto a pivot row.
pub type PivotAttributes = serde_json::Map<String, Value>;

/// Raw input assigned to a pivot attribute.
///
/// A top-level value is cast to a sequence before normalization: `List` and
/// JSON arrays yield their elements, anything else becomes a one-element
/// sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotValue<R> {
    /// Identifiers (numbers or numeric strings), `{"model": id, "attributes": {..}}`
    /// maps, or arrays of those. Other JSON shapes are ignored.
    Json(Value),
    /// A related record, linked without extra attributes.
    Model(R),
    /// A related record with extra pivot attributes.
    Linked { model: R, attributes: PivotAttributes },
    List(Vec<PivotValue<R>>),
}

impl<R> PivotValue<R> {
    /// A primary-key identifier.
    pub fn id(id: i64) -> Self {
        Self::Json(Value::from(id))
    }

    pub fn linked(model: R, attributes: PivotAttributes) -> Self {
        Self::Linked { model, attributes }
    }

    /// Casts the value to the sequence normalization iterates over.
    pub fn into_sequence(self) -> Vec<PivotValue<R>> {
        match self {
            Self::List(items) => items,
            Self::Json(Value::Array(items)) => items.into_iter().map(Self::Json).collect(),
            other => vec![other],
        }
    }
}

impl<R> From<Value> for PivotValue<R> {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl<R> From<i64> for PivotValue<R> {
    fn from(id: i64) -> Self {
        Self::Json(Value::from(id))
    }
}

impl<R> From<Vec<PivotValue<R>>> for PivotValue<R> {
    fn from(items: Vec<PivotValue<R>>) -> Self {
        Self::List(items)
    }
}

/// One normalized entry of the staging area.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPivot<R> {
    /// `None` when an identifier did not resolve to a stored record.
    pub model: Option<R>,
    pub attributes: PivotAttributes,
}

impl<R> StagedPivot<R> {
    pub fn new(model: Option<R>, attributes: PivotAttributes) -> Self {
        Self { model, attributes }
    }

    pub fn is_resolved(&self) -> bool {
        self.model.is_some()
    }
}

/// Result of reading a property through the behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum Property<R> {
    /// The staged pivots of the virtual attribute.
    Pivots(Vec<StagedPivot<R>>),
    /// A real property of the host.
    Attribute(Value),
}

/// Interprets a JSON value as a primary-key identifier.
///
/// Numbers qualify as-is. Strings qualify when they hold a finite decimal
/// number, surrounding whitespace allowed.
pub fn numeric_key(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

fn parse_numeric(raw: &str) -> Option<Number> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Number::from(int));
    }
    // f64 parsing also accepts "inf" and "nan"
    if text
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}
