//! Source table extraction and projection analysis
//!
//! Discovery runs every model's rendered SQL through [`analyze_statement`]
//! to find the tables it reads from (the graph edges), the output columns
//! it produces, and whether its projection carries a bare `*`.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectName, Query, Select, SelectItem,
    SelectItemQualifiedWildcardKind, SetExpr, Statement, TableFactor, TableWithJoins, Visit,
    Visitor,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;

/// One output column of a query's projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    /// Output name (`*` for a bare wildcard, `t.*` for a qualified one)
    pub name: String,

    /// Source columns contributing to the output, `table.column` or bare
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Analysis of a single query statement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Tables the query reads from, sorted, with CTE names excluded
    pub sources: Vec<String>,

    /// Projection columns in declaration order
    pub columns: Vec<OutputColumn>,

    /// Whether the projection contains a bare `*`
    pub has_wildcard: bool,
}

/// Convert an `ObjectName` to a dotted string, skipping non-identifier parts
pub fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .filter_map(|part| part.as_ident())
        .map(|ident| ident.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

/// Collects every relation reference plus every CTE name defined along the way
struct SourceCollector {
    relations: BTreeSet<String>,
    ctes: HashSet<String>,
}

impl Visitor for SourceCollector {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        self.relations.insert(object_name_to_string(relation));
        ControlFlow::Continue(())
    }

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.clone());
            }
        }
        ControlFlow::Continue(())
    }
}

/// Extract the tables a statement reads from.
///
/// CTE names are not real sources: a reference to one resolves within the
/// statement, so they are dropped from the result. Schema-qualified names
/// are kept as written.
pub fn extract_sources(stmt: &Statement) -> Vec<String> {
    let mut collector = SourceCollector {
        relations: BTreeSet::new(),
        ctes: HashSet::new(),
    };
    let _ = stmt.visit(&mut collector);

    collector
        .relations
        .into_iter()
        .filter(|rel| !collector.ctes.contains(rel))
        .collect()
}

/// Analyze a statement's sources and projection.
///
/// Non-query statements yield their sources and an empty projection.
pub fn analyze_statement(stmt: &Statement) -> QueryAnalysis {
    let mut analysis = QueryAnalysis {
        sources: extract_sources(stmt),
        ..QueryAnalysis::default()
    };

    if let Statement::Query(query) = stmt {
        analyze_query(query, &mut analysis);
    }
    analysis
}

fn analyze_query(query: &Query, analysis: &mut QueryAnalysis) {
    analyze_set_expr(&query.body, analysis);
}

fn analyze_set_expr(set_expr: &SetExpr, analysis: &mut QueryAnalysis) {
    match set_expr {
        SetExpr::Select(select) => analyze_select(select, analysis),
        // For UNION/INTERSECT/EXCEPT the output columns come from the left
        // operand by SQL convention.
        SetExpr::SetOperation { left, .. } => analyze_set_expr(left, analysis),
        SetExpr::Query(inner) => analyze_query(inner, analysis),
        _ => {}
    }
}

fn analyze_select(select: &Select, analysis: &mut QueryAnalysis) {
    let mut aliases: HashMap<String, String> = HashMap::new();
    let mut from_tables: Vec<String> = Vec::new();
    for table in &select.from {
        collect_from_tables(table, &mut aliases, &mut from_tables);
    }

    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                let name = expr_output_name(expr);
                let sources = collect_expr_sources(expr, &aliases);
                analysis.columns.push(OutputColumn { name, sources });
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let sources = collect_expr_sources(expr, &aliases);
                analysis.columns.push(OutputColumn {
                    name: alias.value.clone(),
                    sources,
                });
            }
            SelectItem::QualifiedWildcard(kind, _) => {
                let table = match kind {
                    SelectItemQualifiedWildcardKind::ObjectName(name) => {
                        object_name_to_string(name)
                    }
                    SelectItemQualifiedWildcardKind::Expr(expr) => format!("{expr}"),
                };
                let resolved = aliases.get(&table).cloned().unwrap_or(table);
                analysis.columns.push(OutputColumn {
                    name: format!("{resolved}.*"),
                    sources: vec![format!("{resolved}.*")],
                });
            }
            SelectItem::Wildcard(_) => {
                analysis.has_wildcard = true;
                analysis.columns.push(OutputColumn {
                    name: "*".to_string(),
                    sources: from_tables.iter().map(|t| format!("{t}.*")).collect(),
                });
            }
        }
    }
}

fn collect_from_tables(
    table_with_joins: &TableWithJoins,
    aliases: &mut HashMap<String, String>,
    tables: &mut Vec<String>,
) {
    collect_table_factor(&table_with_joins.relation, aliases, tables);
    for join in &table_with_joins.joins {
        collect_table_factor(&join.relation, aliases, tables);
    }
}

fn collect_table_factor(
    factor: &TableFactor,
    aliases: &mut HashMap<String, String>,
    tables: &mut Vec<String>,
) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let table = object_name_to_string(name);
            if let Some(alias) = alias {
                aliases.insert(alias.name.value.clone(), table.clone());
            }
            tables.push(table);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_from_tables(table_with_joins, aliases, tables);
        }
        _ => {}
    }
}

/// Output name for an unaliased projection expression
fn expr_output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_else(|| expr.to_string()),
        other => other.to_string(),
    }
}

/// Column references inside an expression, with table aliases resolved
fn collect_expr_sources(expr: &Expr, aliases: &HashMap<String, String>) -> Vec<String> {
    let mut sources: BTreeSet<String> = BTreeSet::new();
    collect_expr_sources_into(expr, aliases, &mut sources);
    sources.into_iter().collect()
}

fn collect_expr_sources_into(
    expr: &Expr,
    aliases: &HashMap<String, String>,
    sources: &mut BTreeSet<String>,
) {
    match expr {
        Expr::Identifier(ident) => {
            sources.insert(ident.value.clone());
        }
        Expr::CompoundIdentifier(idents) => {
            if let Some((column, qualifier)) = idents.split_last() {
                let table = qualifier
                    .iter()
                    .map(|i| i.value.clone())
                    .collect::<Vec<_>>()
                    .join(".");
                let resolved = aliases.get(&table).cloned().unwrap_or(table);
                if resolved.is_empty() {
                    sources.insert(column.value.clone());
                } else {
                    sources.insert(format!("{}.{}", resolved, column.value));
                }
            }
        }
        Expr::Function(func) => {
            if let FunctionArguments::List(list) = &func.args {
                for arg in &list.args {
                    match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                            collect_expr_sources_into(e, aliases, sources);
                        }
                        FunctionArg::Named {
                            arg: FunctionArgExpr::Expr(e),
                            ..
                        } => {
                            collect_expr_sources_into(e, aliases, sources);
                        }
                        _ => {}
                    }
                }
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_expr_sources_into(left, aliases, sources);
            collect_expr_sources_into(right, aliases, sources);
        }
        Expr::UnaryOp { expr, .. } => collect_expr_sources_into(expr, aliases, sources),
        Expr::Cast { expr, .. } => collect_expr_sources_into(expr, aliases, sources),
        Expr::Nested(inner) => collect_expr_sources_into(inner, aliases, sources),
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            collect_expr_sources_into(inner, aliases, sources);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                collect_expr_sources_into(op, aliases, sources);
            }
            for case_when in conditions {
                collect_expr_sources_into(&case_when.condition, aliases, sources);
                collect_expr_sources_into(&case_when.result, aliases, sources);
            }
            if let Some(else_expr) = else_result {
                collect_expr_sources_into(else_expr, aliases, sources);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "analyze_test.rs"]
mod tests;
