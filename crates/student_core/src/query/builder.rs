//! Query, ordering, aggregate and assignment descriptions plus SQL rendering.

use super::column::{FieldValue, StudentColumn};
use super::{QueryError, QueryResult};
use crate::db::schema::ColumnType;
use rusqlite::types::Value;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// One filter condition. Build with the `StudentColumn` helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Compare {
        column: StudentColumn,
        op: CompareOp,
        value: FieldValue,
    },
    Like {
        column: StudentColumn,
        pattern: String,
    },
}

impl Predicate {
    fn render(&self, binds: &mut Vec<Value>) -> QueryResult<String> {
        match self {
            Self::Compare { column, op, value } => {
                if value.is_null() {
                    return match op {
                        CompareOp::Eq => Ok(format!("{column} IS NULL")),
                        CompareOp::Ne => Ok(format!("{column} IS NOT NULL")),
                        _ => Err(type_mismatch(*column, value.type_name())),
                    };
                }
                check_operand(*column, value)?;
                binds.push(value.to_sql_value());
                Ok(format!("{column} {} ?", op.sql()))
            }
            Self::Like { column, pattern } => {
                if column.kind() != ColumnType::Text {
                    return Err(type_mismatch(*column, "text pattern"));
                }
                binds.push(Value::Text(pattern.clone()));
                Ok(format!("{column} LIKE ?"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: StudentColumn,
    pub direction: Direction,
}

impl From<StudentColumn> for Order {
    fn from(column: StudentColumn) -> Self {
        column.asc()
    }
}

/// Lazy description of a student query.
///
/// Nothing runs until the description is handed to a session operation such
/// as `all`, `first`, `count` or `update_where`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentQuery {
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    limit: Option<u32>,
    offset: u32,
}

impl StudentQuery {
    /// Matches every record, in store order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition; all conditions must hold.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Appends a sort key. Plain columns sort ascending.
    pub fn order_by(mut self, order: impl Into<Order>) -> Self {
        self.order.push(order.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn ordering(&self) -> &[Order] {
        &self.order
    }

    pub fn row_limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn row_offset(&self) -> u32 {
        self.offset
    }

    /// Whether ordering, limit or offset were applied.
    pub fn has_modifiers(&self) -> bool {
        !self.order.is_empty() || self.limit.is_some() || self.offset > 0
    }

    /// Renders `" WHERE a AND b"`, or an empty string with no predicates.
    pub(crate) fn where_clause(&self, binds: &mut Vec<Value>) -> QueryResult<String> {
        if self.predicates.is_empty() {
            return Ok(String::new());
        }

        let conditions = self
            .predicates
            .iter()
            .map(|predicate| predicate.render(binds))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(format!(" WHERE {}", conditions.join(" AND ")))
    }

    /// Renders ordering, limit and offset.
    pub(crate) fn tail_clause(&self, binds: &mut Vec<Value>) -> String {
        let mut sql = String::new();

        if !self.order.is_empty() {
            let keys = self
                .order
                .iter()
                .map(|order| match order.direction {
                    Direction::Asc => format!("{} ASC", order.column),
                    Direction::Desc => format!("{} DESC", order.column),
                })
                .collect::<Vec<_>>();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(i64::from(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(Value::Integer(i64::from(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Integer(i64::from(self.offset)));
        }

        sql
    }
}

/// Scalar aggregate computed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// Number of non-null values.
    Count(StudentColumn),
    /// Integer columns only; `Null` over an empty match.
    Sum(StudentColumn),
    Min(StudentColumn),
    Max(StudentColumn),
}

impl Aggregate {
    pub(crate) fn render(self) -> QueryResult<String> {
        match self {
            Self::Count(column) => Ok(format!("count({column})")),
            Self::Sum(column) => {
                if column.kind() != ColumnType::Integer {
                    return Err(type_mismatch(column, "sum"));
                }
                Ok(format!("sum({column})"))
            }
            Self::Min(column) => Ok(format!("min({column})")),
            Self::Max(column) => Ok(format!("max({column})")),
        }
    }

    /// Type of the produced value.
    pub(crate) fn result_kind(self) -> ColumnType {
        match self {
            Self::Count(_) | Self::Sum(_) => ColumnType::Integer,
            Self::Min(column) | Self::Max(column) => column.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignedValue {
    Set(FieldValue),
    Increment(i64),
}

/// One `SET` item of a store-side bulk update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: StudentColumn,
    pub value: AssignedValue,
}

impl Assignment {
    pub(crate) fn render(&self, binds: &mut Vec<Value>) -> QueryResult<String> {
        let column = self.column;
        if column == StudentColumn::Id {
            return Err(QueryError::ImmutableColumn(column));
        }

        match &self.value {
            AssignedValue::Set(value) => {
                if !value.is_null() {
                    check_operand(column, value)?;
                }
                binds.push(value.to_sql_value());
                Ok(format!("{column} = ?"))
            }
            AssignedValue::Increment(delta) => {
                if column.kind() != ColumnType::Integer {
                    return Err(type_mismatch(column, "increment"));
                }
                binds.push(Value::Integer(*delta));
                Ok(format!("{column} = {column} + ?"))
            }
        }
    }
}

/// Row of a column projection, in the requested column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedRow {
    fields: Vec<(StudentColumn, FieldValue)>,
}

impl ProjectedRow {
    pub(crate) fn new(fields: Vec<(StudentColumn, FieldValue)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: StudentColumn) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(current, _)| *current == column)
            .map(|(_, value)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Display for ProjectedRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (index, value) in self.values().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        if self.fields.len() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

fn check_operand(column: StudentColumn, value: &FieldValue) -> QueryResult<()> {
    if value.kind() == Some(column.kind()) {
        Ok(())
    } else {
        Err(type_mismatch(column, value.type_name()))
    }
}

fn type_mismatch(column: StudentColumn, found: &'static str) -> QueryError {
    QueryError::TypeMismatch {
        column,
        expected: column.kind(),
        found,
    }
}
