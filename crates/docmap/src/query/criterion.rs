//! Per-field search criteria and the conversion from filter field values.

use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a text criterion is matched against the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum MatchStyle {
    /// `^value`
    Prefix,
    /// `value` anywhere in the field.
    #[default]
    Contain,
    /// Exact equality.
    Equal,
}

/// Comparison used for scalar criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Operator {
    /// Equality (the default).
    #[default]
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl Operator {
    /// The query operator key, or `None` for plain equality.
    pub fn key(self) -> Option<&'static str> {
        match self {
            Operator::Eq => None,
            Operator::Ne => Some("$ne"),
            Operator::Gt => Some("$gt"),
            Operator::Gte => Some("$gte"),
            Operator::Lt => Some("$lt"),
            Operator::Lte => Some("$lte"),
        }
    }
}

/// Lower and upper bounds of a range criterion. Every bound is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeClause {
    /// Inclusive lower bound.
    pub gte: Option<Bson>,
    /// Exclusive lower bound.
    pub gt: Option<Bson>,
    /// Inclusive upper bound.
    pub lte: Option<Bson>,
    /// Exclusive upper bound.
    pub lt: Option<Bson>,
}

impl RangeClause {
    /// The bound operators as a document, or `None` when no bound is set.
    pub fn to_document(&self) -> Option<Document> {
        let mut doc = Document::new();
        let bounds = [
            ("$gte", &self.gte),
            ("$gt", &self.gt),
            ("$lte", &self.lte),
            ("$lt", &self.lt),
        ];
        for (op, bound) in bounds {
            if let Some(value) = bound {
                doc.insert(op, value.clone());
            }
        }
        (!doc.is_empty()).then_some(doc)
    }
}

/// The value a filter field contributes.
#[derive(Debug, Clone, PartialEq)]
pub enum CriterionValue {
    /// Not specified; contributes nothing.
    Unset,
    /// Text; an empty string is unspecified but can take the free-text keyword.
    Text(String),
    /// Membership in a set of values.
    Set(Vec<Bson>),
    /// Range bounds.
    Range(RangeClause),
    /// A single comparable value.
    Scalar(Bson),
}

/// One field of a filter, ready to be turned into a clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    /// Name of the filter field, resolved against the target schema.
    pub field: String,
    /// The field's value.
    pub value: CriterionValue,
    /// Match style for text values.
    pub match_style: MatchStyle,
    /// Match style used when the free-text keyword applies to this field.
    pub keyword: Option<MatchStyle>,
    /// Comparison for scalar values.
    pub operator: Operator,
    /// Explicit storage key, bypassing schema resolution.
    pub storage_key: Option<String>,
}

impl Criterion {
    /// Creates a criterion with default matching.
    pub fn new(field: impl Into<String>, value: CriterionValue) -> Self {
        Self {
            field: field.into(),
            value,
            match_style: MatchStyle::default(),
            keyword: None,
            operator: Operator::default(),
            storage_key: None,
        }
    }

    /// Sets the text match style.
    pub fn matching(mut self, style: MatchStyle) -> Self {
        self.match_style = style;
        self
    }

    /// Lets the free-text keyword apply to this field.
    pub fn keyword(mut self, style: MatchStyle) -> Self {
        self.keyword = Some(style);
        self
    }

    /// Sets the scalar comparison.
    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    /// Overrides the storage key.
    pub fn stored_as(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }
}

/// Conversion from a filter field value into a [`CriterionValue`].
///
/// Zero numbers and `false` are "not specified". Wrapping a value in
/// `Option` makes `Some(0)` and `Some(false)` real criteria.
pub trait ToCriterion {
    /// The criterion for this value as a plain field.
    fn to_criterion(&self) -> CriterionValue;

    /// The criterion when the value is explicitly present (`Some`).
    fn to_present_criterion(&self) -> CriterionValue {
        self.to_criterion()
    }

    /// The criterion for `None`.
    fn absent() -> CriterionValue
    where
        Self: Sized,
    {
        CriterionValue::Unset
    }
}

impl<T: ToCriterion> ToCriterion for Option<T> {
    fn to_criterion(&self) -> CriterionValue {
        match self {
            Some(value) => value.to_present_criterion(),
            None => T::absent(),
        }
    }
}

impl ToCriterion for String {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Text(self.clone())
    }

    fn absent() -> CriterionValue {
        CriterionValue::Text(String::new())
    }
}

impl<T: Clone + Into<Bson>> ToCriterion for Vec<T> {
    fn to_criterion(&self) -> CriterionValue {
        if self.is_empty() {
            CriterionValue::Unset
        } else {
            CriterionValue::Set(self.iter().cloned().map(Into::into).collect())
        }
    }
}

macro_rules! zero_omitted {
    ($($ty:ty),*) => {
        $(
            impl ToCriterion for $ty {
                fn to_criterion(&self) -> CriterionValue {
                    if *self == <$ty>::default() {
                        CriterionValue::Unset
                    } else {
                        CriterionValue::Scalar(Bson::from(*self))
                    }
                }

                fn to_present_criterion(&self) -> CriterionValue {
                    CriterionValue::Scalar(Bson::from(*self))
                }
            }
        )*
    };
}

zero_omitted!(i32, i64, u32, f32, f64, bool);

impl ToCriterion for ObjectId {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Scalar(Bson::ObjectId(*self))
    }
}

impl ToCriterion for DateTime<Utc> {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Scalar(Bson::DateTime(bson::DateTime::from_chrono(*self)))
    }
}

fn date(value: Option<DateTime<Utc>>) -> Option<Bson> {
    value.map(|v| Bson::DateTime(bson::DateTime::from_chrono(v)))
}

/// Numeric bounds. `min`/`max` are inclusive, `lower`/`upper` exclusive.
/// An inclusive bound wins over the exclusive one on the same side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberRange {
    /// Inclusive lower bound.
    pub min: Option<f64>,
    /// Exclusive lower bound.
    pub lower: Option<f64>,
    /// Inclusive upper bound.
    pub max: Option<f64>,
    /// Exclusive upper bound.
    pub upper: Option<f64>,
}

impl NumberRange {
    /// Inclusive range `[min, max]`.
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Default::default()
        }
    }
}

impl ToCriterion for NumberRange {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Range(RangeClause {
            gte: self.min.map(Bson::Double),
            gt: self.min.is_none().then_some(self.lower).flatten().map(Bson::Double),
            lte: self.max.map(Bson::Double),
            lt: self.max.is_none().then_some(self.upper).flatten().map(Bson::Double),
        })
    }
}

/// Integer bounds, with the same rules as [`NumberRange`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntRange {
    /// Inclusive lower bound.
    pub min: Option<i64>,
    /// Exclusive lower bound.
    pub lower: Option<i64>,
    /// Inclusive upper bound.
    pub max: Option<i64>,
    /// Exclusive upper bound.
    pub upper: Option<i64>,
}

impl ToCriterion for IntRange {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Range(RangeClause {
            gte: self.min.map(Bson::Int64),
            gt: self.min.is_none().then_some(self.lower).flatten().map(Bson::Int64),
            lte: self.max.map(Bson::Int64),
            lt: self.max.is_none().then_some(self.upper).flatten().map(Bson::Int64),
        })
    }
}

/// Inclusive date bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRange {
    /// Inclusive lower bound.
    pub min: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub max: Option<DateTime<Utc>>,
}

impl ToCriterion for DateRange {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Range(RangeClause {
            gte: date(self.min),
            lte: date(self.max),
            ..Default::default()
        })
    }
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive end.
    pub end: Option<DateTime<Utc>>,
}

impl ToCriterion for TimeRange {
    fn to_criterion(&self) -> CriterionValue {
        CriterionValue::Range(RangeClause {
            gte: date(self.start),
            lt: date(self.end),
            ..Default::default()
        })
    }
}
