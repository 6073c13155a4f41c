use indexmap::IndexMap;

use super::literal::SqlExpr;
use super::{SqlArgs, SqlError};

/// Condition or data map consumed by the statement builders, iterated in
/// insertion order.
pub type Conditions = IndexMap<String, SqlExpr>;

/// A composed statement: parameterized SQL text plus its argument map.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: SqlArgs,
}

/// `SELECT <columns> FROM <table> WHERE <clause>;`
pub fn select(table: &str, columns: &str, conds: &Conditions) -> Statement {
    let mut args = SqlArgs::new();
    let clause = where_clause(conds, &mut args, "");
    Statement {
        sql: format!("SELECT {} FROM {} WHERE {};", columns, table, clause),
        args,
    }
}

/// `INSERT [IGNORE] INTO <table>(<cols>) VALUES (<placeholders>);`
///
/// Every value must be a scalar or a value-position literal; a whole-clause
/// fragment cannot stand in for a column value.
pub fn insert(table: &str, data: &Conditions, ignore_duplicates: bool) -> Result<Statement, SqlError> {
    let mut args = SqlArgs::new();
    let mut columns = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());

    for (column, expr) in data {
        columns.push(format!("`{}`", column));
        let (snippet, is_value) = add_value(expr, &mut args, column);
        if !is_value {
            return Err(SqlError::InvalidInsertValue(column.clone()));
        }
        values.push(snippet);
    }

    let ignore = if ignore_duplicates { "IGNORE " } else { "" };
    Ok(Statement {
        sql: format!(
            "INSERT {}INTO {}({}) VALUES ({});",
            ignore,
            table,
            columns.join(", "),
            values.join(", ")
        ),
        args,
    })
}

/// `UPDATE <table> SET <assignments> WHERE <clause>;`
///
/// Assignment placeholders get a `data_` namespace and condition placeholders
/// a `conds_` one, so the same column on both sides never collides.
pub fn update(table: &str, data: &Conditions, conds: &Conditions) -> Statement {
    let mut args = SqlArgs::new();
    let mut assignments = Vec::with_capacity(data.len());
    for (key, expr) in data {
        add_condition(key, expr, &mut assignments, &mut args, "data_");
    }
    let clause = where_clause(conds, &mut args, "conds_");
    Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {};",
            table,
            assignments.join(", "),
            clause
        ),
        args,
    }
}

/// `DELETE FROM <table> WHERE <clause>;`
pub fn delete(table: &str, conds: &Conditions) -> Statement {
    let mut args = SqlArgs::new();
    let clause = where_clause(conds, &mut args, "");
    Statement {
        sql: format!("DELETE FROM {} WHERE {};", table, clause),
        args,
    }
}

/// Renders an `AND`-joined clause, recording arguments into `args`.
/// An empty map yields `1 = 1` so "no filter" stays syntactically valid.
pub fn where_clause(conds: &Conditions, args: &mut SqlArgs, prefix: &str) -> String {
    let mut clause = Vec::with_capacity(conds.len());
    for (key, expr) in conds {
        add_condition(key, expr, &mut clause, args, prefix);
    }
    if clause.is_empty() {
        return "1 = 1".to_string();
    }
    clause.join(" AND ")
}

fn add_condition(
    key: &str,
    expr: &SqlExpr,
    clause: &mut Vec<String>,
    args: &mut SqlArgs,
    prefix: &str,
) {
    let (snippet, is_value) = add_value(expr, args, &format!("{}{}", prefix, key));
    if is_value {
        clause.push(format!("{} = {}", key, snippet));
    } else {
        clause.push(snippet);
    }
}

/// Returns the SQL snippet for an expression and whether it stands in value
/// position. Scalars become a single named parameter; fragments splice their
/// prerendered text and merge their argument maps.
fn add_value(expr: &SqlExpr, args: &mut SqlArgs, value_name: &str) -> (String, bool) {
    match expr {
        SqlExpr::Value(v) => {
            args.insert(value_name.to_string(), v.clone());
            (format!("%({})s", value_name), true)
        }
        SqlExpr::Literal(fragment) => {
            args.extend(fragment.args().iter().map(|(k, v)| (k.clone(), v.clone())));
            (fragment.text().to_string(), true)
        }
        SqlExpr::Condition(fragment) => {
            args.extend(fragment.args().iter().map(|(k, v)| (k.clone(), v.clone())));
            (fragment.text().to_string(), false)
        }
    }
}
