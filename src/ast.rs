// program    ::= function*
// function   ::= 'def' ID '(' ID* ')' stmt_list
// stmt_list  ::= expr* ';'
// expr       ::= 'let' ID '=' expr
//              | 'if' expr ['then'] expr ['else'] expr
//              | primary OP primary
//              | ID '(' primary* ')'
//              | primary
// primary    ::= ID | integer
//
// There is no precedence: a binary expression is exactly one operator between
// two primaries.

use std::fmt;

use crate::token::Span;

#[derive(Debug, PartialEq, Default)]
pub struct Program {
    pub definitions: Vec<FunctionDef>,
}

#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub parameters: Vec<Ident>,
    pub body: StatementList,
}

/// A non-empty run of expressions terminated by `;`. Its value is the value
/// of the last statement.
#[derive(Debug, PartialEq)]
pub struct StatementList {
    pub statements: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Variable(Ident),
    Number(i32),
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Let {
        binding: Ident,
        initializer: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    /// `=`, which stores into the variable on the left.
    Assign,
    /// Operator punctuation the lexer accepts but lowering rejects.
    Unrecognized(char),
}

impl BinaryOperator {
    pub fn from_char(c: char) -> BinaryOperator {
        match c {
            '+' => BinaryOperator::Add,
            '-' => BinaryOperator::Sub,
            '*' => BinaryOperator::Mul,
            '/' => BinaryOperator::Div,
            '=' => BinaryOperator::Assign,
            other => BinaryOperator::Unrecognized(other),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            BinaryOperator::Add => '+',
            BinaryOperator::Sub => '-',
            BinaryOperator::Mul => '*',
            BinaryOperator::Div => '/',
            BinaryOperator::Assign => '=',
            BinaryOperator::Unrecognized(c) => c,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub name: Box<str>,
    pub span: Span,
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
