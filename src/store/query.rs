//! Query definitions evaluated by document stores.

use super::{Document, Fields};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Replaceable filter/order definition applied on top of a collection query.
pub type QueryFn = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// Wrap a closure as a [`QueryFn`].
///
/// ```
/// use spatio_live::store::{query_fn, Query};
///
/// let f = query_fn(|q| q.where_eq("kind", "cafe").limit(10));
/// let q = f(Query::collection("places"));
/// assert_eq!(q.limit, Some(10));
/// ```
pub fn query_fn<F>(f: F) -> QueryFn
where
    F: Fn(Query) -> Query + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// A single field predicate. Fields are dotted paths into the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Gte { field: String, value: Value },
    Lte { field: String, value: Value },
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq { field, .. } | Filter::Gte { field, .. } | Filter::Lte { field, .. } => {
                field
            }
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get_path(self.field()) else {
            return false;
        };

        match self {
            Filter::Eq { value, .. } => actual == value,
            Filter::Gte { value, .. } => {
                matches!(compare_values(actual, value), Some(Ordering::Greater | Ordering::Equal))
            }
            Filter::Lte { value, .. } => {
                matches!(compare_values(actual, value), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

/// Order two JSON values of the same kind. Values of different kinds do not
/// compare, so range filters never match across types.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Collection query: filters, ordering and limit.
///
/// Evaluation follows realtime document store semantics: filter, then order
/// (documents missing an order field are excluded, ties break on id), then
/// limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Inclusive range `[start, end]` on a field.
    pub fn where_range(
        self,
        field: impl Into<String>,
        start: impl Into<Value>,
        end: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        self.where_gte(field.clone(), start).where_lte(field, end)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
            && self.order_by.iter().all(|o| doc.get_path(&o.field).is_some())
    }

    /// Evaluate the query over `(id, fields)` pairs of its collection.
    pub fn apply<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = (&'a String, &'a Fields)>,
    {
        let mut results: Vec<Document> = docs
            .into_iter()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .filter(|doc| self.matches(doc))
            .collect();

        results.sort_by(|a, b| self.compare(a, b));

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for order in &self.order_by {
            let ordering = match (a.get_path(&order.field), b.get_path(&order.field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            let ordering = match order.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        for filter in &self.filters {
            match filter {
                Filter::Eq { field, value } => write!(f, " {} == {}", field, value)?,
                Filter::Gte { field, value } => write!(f, " {} >= {}", field, value)?,
                Filter::Lte { field, value } => write!(f, " {} <= {}", field, value)?,
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }
        Ok(())
    }
}
