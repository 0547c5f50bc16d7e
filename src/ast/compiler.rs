/// AST → SQL compiler.
///
/// Renders feature queries and catalog statements built as AST nodes into
/// SQL text for the external query engine.
use super::types::*;

/// Compile a query AST into a SQL string.
pub fn compile(query: &Query) -> String {
    match query {
        Query::Select(s) => compile_select(s),
        Query::Insert(i) => compile_insert(i),
    }
}

fn compile_select(select: &SelectQuery) -> String {
    let mut parts = Vec::new();

    let mut select_clause = String::from("SELECT ");
    if select.projections.is_empty() {
        select_clause.push('*');
    } else {
        let items: Vec<String> = select.projections.iter().map(compile_select_item).collect();
        select_clause.push_str(&items.join(", "));
    }
    parts.push(select_clause);

    // FROM
    if !select.from.is_empty() {
        let tables: Vec<String> = select.from.iter().map(compile_table_ref).collect();
        parts.push(format!("FROM {}", tables.join(", ")));
    }

    // WHERE
    if let Some(ref filter) = select.filter {
        parts.push(format!("WHERE {}", compile_expr(filter)));
    }

    // GROUP BY
    if !select.group_by.is_empty() {
        let groups: Vec<String> = select.group_by.iter().map(compile_expr).collect();
        parts.push(format!("GROUP BY {}", groups.join(", ")));
    }

    parts.join(" ")
}

fn compile_select_item(item: &SelectItem) -> String {
    let expr_str = compile_expr(&item.expr);
    match &item.alias {
        Some(a) => format!("{} AS {}", expr_str, a),
        None => expr_str,
    }
}

fn compile_table_ref(table: &TableRef) -> String {
    match &table.alias {
        Some(a) => format!("{} AS {}", table.name, a),
        None => table.name.clone(),
    }
}

/// Render a single expression. Used for catalog defining expressions.
pub fn compile_expr(expr: &Expression) -> String {
    match expr {
        Expression::Column { table, name } => format!("{}.{}", table, name),
        Expression::Literal(lit) => compile_literal(lit),
        Expression::BinaryOp { left, op, right } => {
            format!(
                "{} {} {}",
                compile_expr(left),
                operator_str(*op),
                compile_expr(right)
            )
        }
        Expression::Function { name, args } => {
            let args_str: Vec<String> = args.iter().map(compile_expr).collect();
            format!("{}({})", name, args_str.join(", "))
        }
        Expression::Fragment(text) => text.clone(),
    }
}

pub(crate) fn operator_str(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
    }
}

fn compile_literal(lit: &Literal) -> String {
    match lit {
        Literal::Integer(i) => i.to_string(),
        Literal::Number(n) => n.clone(),
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn compile_insert(insert: &InsertQuery) -> String {
    let columns = if insert.columns.is_empty() {
        String::new()
    } else {
        format!(" ({})", insert.columns.join(", "))
    };

    let row_strs: Vec<String> = insert
        .rows
        .iter()
        .map(|row| {
            let vals: Vec<String> = row.iter().map(compile_expr).collect();
            format!("({})", vals.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {}{} VALUES {}",
        insert.table,
        columns,
        row_strs.join(", ")
    )
}
