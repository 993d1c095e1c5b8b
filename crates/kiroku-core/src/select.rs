use rusqlite::types::Value;

use crate::error::KirokuError;
use crate::resource::QueryMapping;

/// SQL words that may appear bare inside a predicate without being column
/// references.
const KEYWORDS: &[&str] = &[
    "AND", "OR", "NOT", "NULL", "IS", "IN", "LIKE", "GLOB", "BETWEEN", "ESCAPE", "ASC", "DESC",
    "COLLATE", "NOCASE", "CASE", "WHEN", "THEN", "ELSE", "END", "EXISTS", "CAST", "AS",
];

/// Virtual projection column mapped to a row-count aggregate.
const COUNT_COLUMN: &str = "count";

/// Composes a final query from a router mapping plus caller-supplied
/// criteria. Pure: produces SQL text and arguments, never touches a
/// connection.
///
/// When the base mapping is a join, logical column names in predicates,
/// projections and ordering are rewritten to their qualified expressions;
/// a reference to a column outside the remapped projection is rejected.
#[derive(Debug, Clone)]
pub struct SelectionBuilder {
    table: String,
    projection_map: Vec<(String, String)>,
    where_parts: Vec<String>,
    args: Vec<Value>,
}

impl SelectionBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection_map: Vec::new(),
            where_parts: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn from_mapping(mapping: &QueryMapping) -> Self {
        let mut builder = Self::new(mapping.table.clone());
        builder.projection_map = mapping.projection.clone();
        if let Some(fixed) = &mapping.fixed_where {
            builder.where_parts.push(format!("({fixed})"));
            builder.args.extend(mapping.fixed_args.iter().cloned());
        }
        builder
    }

    /// Append a caller predicate, rewriting logical column names.
    pub fn and_where(&mut self, clause: &str, args: Vec<Value>) -> Result<&mut Self, KirokuError> {
        let rewritten = self.rewrite(clause)?;
        self.where_parts.push(format!("({rewritten})"));
        self.args.extend(args);
        Ok(self)
    }

    pub fn build_select(
        &self,
        projection: &[&str],
        order_by: Option<&str>,
    ) -> Result<(String, Vec<Value>), KirokuError> {
        let columns = self.expand_projection(projection)?;
        let mut sql = format!("SELECT {columns} FROM {}", self.table);
        self.append_where(&mut sql);
        if let Some(order) = order_by {
            let order = self.rewrite(order)?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        Ok((sql, self.args.clone()))
    }

    pub fn build_update(
        &self,
        set: &[(&str, Value)],
    ) -> Result<(String, Vec<Value>), KirokuError> {
        self.require_single_table()?;
        if set.is_empty() {
            return Err(KirokuError::Validation("update with empty set".into()));
        }
        let assignments: Vec<String> = set.iter().map(|(col, _)| format!("{col} = ?")).collect();
        let mut sql = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        self.append_where(&mut sql);
        let mut args: Vec<Value> = set.iter().map(|(_, v)| v.clone()).collect();
        args.extend(self.args.iter().cloned());
        Ok((sql, args))
    }

    pub fn build_delete(&self) -> Result<(String, Vec<Value>), KirokuError> {
        self.require_single_table()?;
        let mut sql = format!("DELETE FROM {}", self.table);
        self.append_where(&mut sql);
        Ok((sql, self.args.clone()))
    }

    fn append_where(&self, sql: &mut String) {
        if !self.where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_parts.join(" AND "));
        }
    }

    fn require_single_table(&self) -> Result<(), KirokuError> {
        if self.table.contains(" JOIN ") {
            return Err(KirokuError::Validation(format!(
                "cannot mutate a joined view: {}",
                self.table
            )));
        }
        Ok(())
    }

    fn expand_projection(&self, projection: &[&str]) -> Result<String, KirokuError> {
        if projection.is_empty() {
            if self.projection_map.is_empty() {
                return Ok("*".into());
            }
            let all: Vec<String> = self
                .projection_map
                .iter()
                .map(|(logical, expr)| format!("{expr} AS {logical}"))
                .collect();
            return Ok(all.join(", "));
        }
        let mut columns = Vec::with_capacity(projection.len());
        for col in projection {
            if col.eq_ignore_ascii_case(COUNT_COLUMN) {
                columns.push(format!("COUNT(*) AS {COUNT_COLUMN}"));
                continue;
            }
            let expr = self.resolve_column(col)?;
            if expr == *col {
                columns.push(expr);
            } else {
                columns.push(format!("{expr} AS {col}"));
            }
        }
        Ok(columns.join(", "))
    }

    fn resolve_column(&self, name: &str) -> Result<String, KirokuError> {
        if self.projection_map.is_empty() || name.contains('.') {
            return Ok(name.to_string());
        }
        self.projection_map
            .iter()
            .find(|(logical, _)| logical == name)
            .map(|(_, expr)| expr.clone())
            .ok_or_else(|| {
                KirokuError::Validation(format!(
                    "column '{name}' is not part of the projection for {}",
                    self.table
                ))
            })
    }

    /// Rewrite bare identifiers in a predicate through the projection map.
    /// Quoted strings, numbers, keywords, placeholders and function names
    /// pass through untouched.
    fn rewrite(&self, clause: &str) -> Result<String, KirokuError> {
        let mut out = String::with_capacity(clause.len());
        let chars: Vec<char> = clause.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                // String literal; '' escapes a quote.
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            out.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                continue;
            }
            if c.is_ascii_alphabetic() || c == '_' {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let mut lookahead = i;
                while lookahead < chars.len() && chars[lookahead].is_ascii_whitespace() {
                    lookahead += 1;
                }
                let is_function = lookahead < chars.len() && chars[lookahead] == '(';
                let upper = word.to_ascii_uppercase();
                if is_function || KEYWORDS.contains(&upper.as_str()) {
                    out.push_str(&word);
                } else {
                    out.push_str(&self.resolve_column(&word)?);
                }
                continue;
            }
            out.push(c);
            i += 1;
        }
        Ok(out)
    }
}
