use serde_json::Value;

use crate::definitions::{Aggregation, TimeGranularity};
use crate::dialect::Dialect;
use crate::request::SortDirection;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    /// SQL taken verbatim from a definition (`expr`, metric `expression`).
    Raw(String),
    Literal(Value),
    Function {
        func: Function,
        args: Vec<SqlExpr>,
    },
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Aggregate {
        agg: Aggregation,
        expr: Box<SqlExpr>,
    },
    Window {
        func: Box<SqlExpr>,
        partition_by: Vec<SqlExpr>,
        order_by: Vec<OrderItem>,
        frame: WindowFrame,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
}

impl SqlExpr {
    pub fn column(name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn null() -> Self {
        SqlExpr::Literal(Value::Null)
    }

    pub fn string(value: impl Into<String>) -> Self {
        SqlExpr::Literal(Value::String(value.into()))
    }

    /// `DATE_TRUNC(CAST(expr AS DATETIME), grain)` in the dialect's spelling.
    pub fn truncate_time(expr: SqlExpr, grain: TimeGranularity) -> Self {
        SqlExpr::Function {
            func: Function::DateTrunc(grain),
            args: vec![SqlExpr::Function {
                func: Function::CastDatetime,
                args: vec![expr],
            }],
        }
    }

    /// Integer position of a truncated time value, for RANGE window frames.
    /// Consecutive `grain` periods differ by `grain.ordinal_step()`.
    pub fn period_ordinal(expr: SqlExpr, grain: TimeGranularity) -> Self {
        SqlExpr::Function {
            func: Function::PeriodOrdinal(grain),
            args: vec![expr],
        }
    }

    pub fn aggregate(agg: Aggregation, expr: SqlExpr) -> Self {
        SqlExpr::Aggregate {
            agg,
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    DateTrunc(TimeGranularity),
    CastDatetime,
    NullIf,
    /// Day number for DAY and WEEK, month number for MONTH and coarser.
    PeriodOrdinal(TimeGranularity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    Divide,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrame {
    /// `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`
    Unbounded,
    /// `RANGE BETWEEN <preceding> PRECEDING AND CURRENT ROW` over a numeric
    /// order key, so missing periods never widen the window.
    Range { preceding: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn aliased(expr: SqlExpr, alias: impl Into<String>) -> Self {
        SelectItem {
            expr,
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    /// Physical tables are qualified (`project.dataset.table`); CTE names are plain identifiers.
    pub qualified: bool,
}

impl TableRef {
    pub fn physical(name: impl Into<String>) -> Self {
        TableRef {
            name: name.into(),
            alias: None,
            qualified: true,
        }
    }

    pub fn cte(name: impl Into<String>) -> Self {
        TableRef {
            name: name.into(),
            alias: None,
            qualified: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Vec<SqlExpr>,
    pub qualify: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> String {
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_ident(alias)),
                    None => expr_sql,
                }
            })
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_items.join(", "),
            self.render_table_ref(&query.from)
        );

        if let Some(where_sql) = self.render_predicates(&query.filters) {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        if !query.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.render_list(&query.group_by)));
        }
        if let Some(having_sql) = self.render_predicates(&query.having) {
            sql.push_str(&format!(" HAVING {having_sql}"));
        }
        if let Some(qualify_sql) = self.render_predicates(&query.qualify) {
            sql.push_str(&format!(" QUALIFY {qualify_sql}"));
        }
        if !query.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.render_order_by(&query.order_by)));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        sql
    }

    /// Branches joined with `UNION ALL`.
    pub fn render_union_all(&self, branches: &[SelectQuery]) -> String {
        branches
            .iter()
            .map(|b| self.render_select(b))
            .collect::<Vec<_>>()
            .join(" UNION ALL ")
    }

    /// Predicates ANDed together without the leading keyword.
    pub fn render_predicates(&self, predicates: &[SqlExpr]) -> Option<String> {
        if predicates.is_empty() {
            return None;
        }
        let rendered: Vec<String> = predicates.iter().map(|p| self.render_expr(p)).collect();
        Some(rendered.join(" AND "))
    }

    pub fn render_list(&self, exprs: &[SqlExpr]) -> String {
        exprs
            .iter()
            .map(|e| self.render_expr(e))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn render_order_by(&self, items: &[OrderItem]) -> String {
        items
            .iter()
            .map(|o| {
                let expr = self.render_expr(&o.expr);
                let dir = match o.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("{expr} {dir}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_table_ref(&self, table: &TableRef) -> String {
        let name = if table.qualified {
            self.dialect.qualify_table(&table.name)
        } else {
            self.dialect.quote_ident(&table.name)
        };
        match &table.alias {
            Some(alias) => format!("{name} {}", self.dialect.quote_ident(alias)),
            None => name,
        }
    }

    pub fn render_expr(&self, expr: &SqlExpr) -> String {
        match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    self.dialect.quote_ident(t),
                    self.dialect.quote_ident(name)
                ),
                None => self.dialect.quote_ident(name),
            },
            SqlExpr::Raw(sql) => sql.clone(),
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::Function { func, args } => {
                let rendered_args: Vec<String> = args.iter().map(|a| self.render_expr(a)).collect();
                self.dialect.render_function(func, rendered_args)
            }
            SqlExpr::BinaryOp { op, left, right } => {
                let left = self.render_expr(left);
                let right = self.render_expr(right);
                let op_sql = match op {
                    SqlBinaryOperator::Divide => "/",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "!=",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                    SqlBinaryOperator::Like => "LIKE",
                    SqlBinaryOperator::ILike => return self.dialect.render_ilike(&left, &right),
                };
                format!("({left} {op_sql} {right})")
            }
            SqlExpr::Aggregate { agg, expr } => self
                .dialect
                .render_aggregation(agg, &self.render_expr(expr)),
            SqlExpr::Window {
                func,
                partition_by,
                order_by,
                frame,
            } => {
                let mut spec = Vec::new();
                if !partition_by.is_empty() {
                    spec.push(format!("PARTITION BY {}", self.render_list(partition_by)));
                }
                if !order_by.is_empty() {
                    spec.push(format!("ORDER BY {}", self.render_order_by(order_by)));
                }
                spec.push(match frame {
                    WindowFrame::Unbounded => {
                        "ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW".to_string()
                    }
                    WindowFrame::Range { preceding: 0 } => {
                        "RANGE BETWEEN CURRENT ROW AND CURRENT ROW".to_string()
                    }
                    WindowFrame::Range { preceding } => {
                        format!("RANGE BETWEEN {preceding} PRECEDING AND CURRENT ROW")
                    }
                });
                format!("{} OVER ({})", self.render_expr(func), spec.join(" "))
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.render_expr(expr),
                    not_kw,
                    self.render_list(list)
                )
            }
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { "NOT " } else { "" };
                format!("{} IS {}NULL", self.render_expr(expr), not_kw)
            }
        }
    }
}
