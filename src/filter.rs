// Declarative predicates over the task indexes

use rusqlite::types::Value;

/// Indexed fields of the task collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    Id,
    Title,
    CreatedTime,
    UpdatedTime,
    TargetTime,
    DoneTime,
    Mode,
    /// Multi-entry: title of any history entry
    HistoryTitle,
    /// Multi-entry: record time of any history entry
    HistoryRecordTime,
}

impl IndexField {
    /// Column backing this field, and whether it lives in the history index
    fn column(self) -> (&'static str, bool) {
        match self {
            IndexField::Id => ("id", false),
            IndexField::Title => ("title", false),
            IndexField::CreatedTime => ("created_time", false),
            IndexField::UpdatedTime => ("updated_time", false),
            IndexField::TargetTime => ("target_time", false),
            IndexField::DoneTime => ("done_time", false),
            IndexField::Mode => ("mode", false),
            IndexField::HistoryTitle => ("title", true),
            IndexField::HistoryRecordTime => ("record_time", true),
        }
    }

    pub fn is_multi_entry(self) -> bool {
        self.column().1
    }
}

/// Value types that can be compared against an index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::String(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::String(value)
    }
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{}", s),
            IndexValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Single comparison against an indexed field
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field to filter on
    pub field: IndexField,
    /// Comparison operator
    pub op: FilterOp,
    /// Value to compare against
    pub value: IndexValue,
}

impl Filter {
    pub fn new(field: IndexField, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }
}

/// Comparison operators for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,       // ==
    Ne,       // !=
    Gt,       // >
    Lt,       // <
    Gte,      // >=
    Lte,      // <=
    Contains, // LIKE %value%
}

impl FilterOp {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::Contains => "LIKE",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}

/// Filters composed with boolean combinators
#[derive(Debug, Clone)]
pub enum Predicate {
    Where(Filter),
    /// True when every member holds; empty is true
    And(Vec<Predicate>),
    /// True when any member holds; empty is false
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn field(field: IndexField, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        Predicate::Where(Filter::new(field, op, value))
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut members) => {
                members.push(other);
                Predicate::And(members)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut members) => {
                members.push(other);
                Predicate::Or(members)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Compile into a SQL condition over `tasks t`, pushing bound values onto `params`
    pub(crate) fn to_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::Where(filter) => filter_sql(filter, params),
            Predicate::And(members) => join_sql(members, " AND ", "1", params),
            Predicate::Or(members) => join_sql(members, " OR ", "0", params),
        }
    }
}

/// Sort direction, always by id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

fn join_sql(members: &[Predicate], sep: &str, empty: &str, params: &mut Vec<Value>) -> String {
    if members.is_empty() {
        return empty.to_string();
    }

    let parts: Vec<String> = members.iter().map(|m| format!("({})", m.to_sql(params))).collect();
    parts.join(sep)
}

fn filter_sql(filter: &Filter, params: &mut Vec<Value>) -> String {
    let value = match (&filter.value, filter.op) {
        (IndexValue::String(s), FilterOp::Contains) => Value::Text(format!("%{}%", escape_like(s))),
        (IndexValue::Int(i), FilterOp::Contains) => Value::Text(format!("%{}%", i)),
        (IndexValue::String(s), _) => Value::Text(s.clone()),
        (IndexValue::Int(i), _) => Value::Integer(*i),
    };
    params.push(value);
    let placeholder = match filter.op {
        FilterOp::Contains => format!("?{} ESCAPE '\\'", params.len()),
        _ => format!("?{}", params.len()),
    };

    let (column, multi_entry) = filter.field.column();
    if multi_entry {
        format!(
            "EXISTS (SELECT 1 FROM task_history_index h WHERE h.task_id = t.id AND h.{} {} {})",
            column,
            filter.op.to_sql(),
            placeholder
        )
    } else {
        format!("t.{} {} {}", column, filter.op.to_sql(), placeholder)
    }
}

/// Escape `LIKE` wildcards so they match literally
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
