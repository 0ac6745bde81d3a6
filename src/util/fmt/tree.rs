use std::io::Write;

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

pub fn print_program_string(program: &Program) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_expr_string(expr: &Expr) -> String {
    let mut buf = Vec::with_capacity(512);
    print_expr(&mut buf, 0, expr).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_program(w: &mut impl Write, program: &Program) -> std::io::Result<()> {
    for def in &program.definitions {
        print_function(w, 0, def)?;
    }
    Ok(())
}

fn print_function(w: &mut impl Write, i: usize, def: &FunctionDef) -> std::io::Result<()> {
    sp(w, i)?;
    write!(w, "function {}(", def.name)?;
    for (idx, param) in def.parameters.iter().enumerate() {
        if idx > 0 {
            write!(w, " ")?;
        }
        write!(w, "{param}")?;
    }
    writeln!(w, ")")?;
    print_statements(w, i + 1, &def.body)
}

fn print_statements(w: &mut impl Write, i: usize, list: &StatementList) -> std::io::Result<()> {
    sp(w, i)?;
    writeln!(w, "statements ({})", list.span)?;
    for statement in &list.statements {
        print_expr(w, i + 1, statement)?;
    }
    Ok(())
}

pub fn print_expr(w: &mut impl Write, i: usize, expr: &Expr) -> std::io::Result<()> {
    sp(w, i)?;
    let span = expr.span;
    match &expr.kind {
        ExprKind::Variable(ident) => {
            writeln!(w, "ident {ident} ({span})")?;
        }
        ExprKind::Number(val) => {
            writeln!(w, "int {val} ({span})")?;
        }
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {op:?} ({span})")?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)?;
        }
        ExprKind::Call { callee, args } => {
            writeln!(w, "call {callee} ({span})")?;
            if !args.is_empty() {
                sp(w, i + 1)?;
                writeln!(w, "arguments")?;
                for arg in args {
                    print_expr(w, i + 2, arg)?;
                }
            }
        }
        ExprKind::Let {
            binding,
            initializer,
        } => {
            writeln!(w, "let {binding} ({span})")?;
            print_expr(w, i + 1, initializer)?;
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            writeln!(w, "if ({span})")?;
            print_expr(w, i + 1, condition)?;
            print_expr(w, i + 1, then_branch)?;
            print_expr(w, i + 1, else_branch)?;
        }
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
