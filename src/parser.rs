use crate::{
    ast::{BinaryOperator, Expr, ExprKind, FunctionDef, Ident, Program, StatementList},
    lexer::{self, extract},
    token::{Spanned, Token, TokenKind},
};

type Result<T, E = ()> = std::result::Result<T, E>;

/// On failure, carries whatever was parsed before the first error alongside
/// the errors themselves. The partial value must not be treated as a
/// successful parse.
pub type ParseResult<T> = Result<T, (T, Vec<Spanned<Error>>)>;

pub fn parse_program(src: &str, tokens: &mut Vec<Token>) -> ParseResult<Program> {
    let mut program = Program::default();
    let errors = parse(src, tokens, |p| p.parse_program(&mut program));
    if errors.is_empty() {
        Ok(program)
    } else {
        Err((program, errors))
    }
}

/// Parses a single expression which must span the whole input.
pub fn parse_expr(src: &str, tokens: &mut Vec<Token>) -> Result<Expr, Vec<Spanned<Error>>> {
    let mut parsed = None;
    let errors = parse(src, tokens, |p| {
        let expr = p.parse_exp()?;
        p.consume(TokenKind::Eof)?;
        parsed = Some(expr);
        Ok(())
    });
    match parsed {
        Some(expr) if errors.is_empty() => Ok(expr),
        _ => Err(errors),
    }
}

fn parse<'src, 'tok>(
    src: &'src str,
    tokens: &'tok mut Vec<Token>,
    f: impl FnOnce(&mut Parser<'src, 'tok>) -> Result<()>,
) -> Vec<Spanned<Error>> {
    assert!(tokens.is_empty());

    lexer::lex(src, tokens);
    let mut p = Parser::new(src, tokens);
    let success = f(&mut p).is_ok();

    // Every failure is recorded exactly where it is detected.
    assert_eq!(success, p.errors.is_empty());
    p.errors
}

struct Parser<'src, 'tok> {
    src: &'src str,
    tokens: &'tok [Token],
    cursor: usize,
    errors: Vec<Spanned<Error>>,
}

/// A saved cursor position, see [`Parser::mark`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Mark(usize);

impl Parser<'_, '_> {
    /// Parses function definitions until the end of input. The first failing
    /// definition aborts the whole parse.
    fn parse_program(&mut self, program: &mut Program) -> Result<()> {
        while !self.is(TokenKind::Eof) {
            let definition = self.parse_function_def()?;
            log::debug!(
                "parsed function {} with {} parameter(s)",
                definition.name,
                definition.parameters.len()
            );
            program.definitions.push(definition);
        }
        Ok(())
    }

    fn parse_function_def(&mut self) -> Result<FunctionDef> {
        self.consume(TokenKind::Def)?;
        let name = self.parse_ident()?;

        self.consume(TokenKind::LParen)?;
        let mut parameters = Vec::new();
        while self.is(TokenKind::Identifier) {
            parameters.push(self.parse_ident()?);
        }
        self.consume(TokenKind::RParen)?;

        let body = self.parse_statement_list()?;
        Ok(FunctionDef {
            name,
            parameters,
            body,
        })
    }

    fn parse_statement_list(&mut self) -> Result<StatementList> {
        let start = self.peek().span();
        let mut statements = Vec::new();
        while self.except([TokenKind::Semicolon]) {
            statements.push(self.parse_exp()?);
        }
        let end = self.consume(TokenKind::Semicolon)?;

        let span = start.to(end.span());
        if statements.is_empty() {
            self.error(span.wrap(Error::EmptyStatementList));
            return Err(());
        }
        Ok(StatementList { statements, span })
    }

    /// Dispatches on the current token and, for primaries, on the token that
    /// follows it. The primary is re-read by the delegate after the cursor is
    /// reset.
    fn parse_exp(&mut self) -> Result<Expr> {
        match self.peek().kind {
            TokenKind::Let => self.parse_let_exp(),
            TokenKind::If => self.parse_if_exp(),
            _ => {
                let mark = self.mark();
                let primary = self.parse_primary()?;
                let next = self.peek().kind;
                if next.is_binary_operator() {
                    self.reset(mark);
                    self.parse_bin_exp()
                } else if next.is_bracket() {
                    self.reset(mark);
                    self.parse_callee_exp()
                } else {
                    Ok(primary)
                }
            }
        }
    }

    /// `primary OP primary`, with no chaining on either side.
    fn parse_bin_exp(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;

        let op_token = self.peek();
        if !op_token.kind.is_binary_operator() {
            self.error(op_token.span().wrap(Error::ExpectedOperator {
                actual: op_token.kind,
            }));
            return Err(());
        }
        self.advance();
        let op = BinaryOperator::from_char(extract::operator(op_token, self.src));

        let rhs = self.parse_primary()?;
        let span = lhs.span.to(rhs.span);
        Ok(Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        })
    }

    /// `ID ( primary* )`. Arguments are bare numbers or identifiers.
    fn parse_callee_exp(&mut self) -> Result<Expr> {
        let callee = self.parse_ident()?;
        self.consume(TokenKind::LParen)?;

        let mut args = Vec::new();
        while matches!(self.peek().kind, TokenKind::Number | TokenKind::Identifier) {
            args.push(self.parse_primary()?);
        }
        let end = self.consume(TokenKind::RParen)?;

        let span = callee.span.to(end.span());
        Ok(Expr {
            kind: ExprKind::Call { callee, args },
            span,
        })
    }

    fn parse_let_exp(&mut self) -> Result<Expr> {
        let start = self.consume(TokenKind::Let)?;
        let binding = self.parse_ident()?;
        self.consume(TokenKind::Assign)?;
        let initializer = self.parse_exp()?;

        let span = start.span().to(initializer.span);
        Ok(Expr {
            kind: ExprKind::Let {
                binding,
                initializer: Box::new(initializer),
            },
            span,
        })
    }

    /// `if expr [then] expr [else] expr`. Both keywords are optional, but the
    /// else branch is always required.
    fn parse_if_exp(&mut self) -> Result<Expr> {
        let start = self.consume(TokenKind::If)?;
        let condition = self.parse_exp()?;
        self.take(TokenKind::Then);
        let then_branch = self.parse_exp()?;
        self.take(TokenKind::Else);
        let else_branch = self.parse_exp()?;

        let span = start.span().to(else_branch.span);
        Ok(Expr {
            kind: ExprKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek();
        let kind = match token.kind {
            TokenKind::Number => {
                let Ok(value) = extract::int(token, self.src) else {
                    self.error(token.span().wrap(Error::ParseInt));
                    return Err(());
                };
                ExprKind::Number(value)
            }
            TokenKind::Identifier => ExprKind::Variable(self.ident_of(token)),
            other => {
                let error = Error::UnexpectedTokenInExpr { token: other };
                self.error(token.span().wrap(error));
                return Err(());
            }
        };
        self.advance();
        Ok(Expr {
            kind,
            span: token.span(),
        })
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.consume(TokenKind::Identifier)?;
        Ok(self.ident_of(token))
    }

    fn ident_of(&self, token: Token) -> Ident {
        Ident {
            name: extract::ident(token, self.src),
            span: token.span(),
        }
    }
}

impl<'src, 'tok> Parser<'src, 'tok> {
    fn new(src: &'src str, tokens: &'tok [Token]) -> Parser<'src, 'tok> {
        debug_assert!(tokens.last().is_some_and(Token::is_eof));
        Parser {
            src,
            tokens,
            cursor: 0,
            errors: Vec::with_capacity(1),
        }
    }
}

impl Parser<'_, '_> {
    /// Records an error. Callers return the `Err(())` sentinel right after.
    fn error(&mut self, error: Spanned<Error>) {
        log::error!("syntax error: {error:#}");
        self.errors.push(error);
    }

    /// Returns the current token without advancing.
    ///
    /// Reading past the end keeps yielding the end-of-input sentinel.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => Token::eof_for(self.src),
        }
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if !c.is_eof() {
            self.cursor += 1;
        }
        c
    }

    /// Saves the cursor so that [`Parser::reset`] can re-read from here.
    fn mark(&self) -> Mark {
        Mark(self.cursor)
    }

    /// Restores a cursor saved by [`Parser::mark`].
    fn reset(&mut self, Mark(cursor): Mark) {
        debug_assert!(cursor <= self.cursor);
        self.cursor = cursor;
    }

    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not,
    /// records an error.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        let c = self.peek();
        if self.is(expect) {
            self.advance();
            Ok(c)
        } else {
            self.error(c.span().wrap(Error::Unexpected {
                actual: c.kind,
                expected: expect,
            }));
            Err(())
        }
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    fn except(&self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek().kind;
        c != TokenKind::Eof && except.into_iter().all(|e| c != e)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected token {expected:?}, but got {actual:?}")]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    #[error("unexpected token {token:?} in expression")]
    UnexpectedTokenInExpr { token: TokenKind },
    #[error("expected an operator, but got {actual:?}")]
    ExpectedOperator { actual: TokenKind },
    #[error("empty statement list")]
    EmptyStatementList,
    #[error("parse int error, out of bounds")]
    ParseInt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{token::Span, util::test_utils::tree_tests};
    use pretty_assertions::assert_eq;

    fn parser_over<'t>(src: &'t str, tokens: &'t mut Vec<Token>) -> Parser<'t, 't> {
        lexer::lex(src, tokens);
        Parser::new(src, tokens)
    }

    #[test]
    fn test_reset_rereads_primary_and_operator() {
        let src = "a + b";
        let tokens = &mut Vec::new();
        let mut p = parser_over(src, tokens);

        let mark = p.mark();
        let first = p.parse_primary().unwrap();
        // Exactly one token of lookahead past the primary: the operator.
        assert_eq!(p.cursor, 1);
        assert_eq!(p.peek().kind, TokenKind::Operator);

        p.reset(mark);
        assert_eq!(p.cursor, 0);
        let again = p.parse_primary().unwrap();
        assert_eq!(first, again);
        assert_eq!(p.advance().text(src), "+");
        assert_eq!(p.parse_primary().unwrap().span, Span::new_of_bounds(4..5));
        assert!(p.peek().is_eof());
    }

    #[test]
    fn test_parse_exp_consumes_binary_exactly() {
        let src = "a + b c";
        let tokens = &mut Vec::new();
        let mut p = parser_over(src, tokens);

        let expr = p.parse_exp().unwrap();
        let ExprKind::Binary { op, lhs, rhs } = expr.kind else {
            panic!("expected binary expression, got {expr:?}");
        };
        assert_eq!(op, BinaryOperator::Add);
        assert!(matches!(lhs.kind, ExprKind::Variable(ref i) if &*i.name == "a"));
        assert!(matches!(rhs.kind, ExprKind::Variable(ref i) if &*i.name == "b"));
        // The following primary is left for the next statement.
        assert_eq!(p.peek().text(src), "c");
        assert!(p.errors.is_empty());
    }

    #[test]
    fn test_advance_stops_at_eof() {
        let tokens = &mut Vec::new();
        let mut p = parser_over("x", tokens);
        p.advance();
        assert!(p.advance().is_eof());
        assert!(p.advance().is_eof());
        assert_eq!(p.cursor, 1);
    }

    #[test]
    fn test_failed_program_keeps_parsed_prefix() {
        let src = "def one() 1; def two() ; def three() 3;";
        let (program, errors) = parse_program(src, &mut Vec::new()).unwrap_err();
        let names: Vec<_> = program
            .definitions
            .iter()
            .map(|d| d.name.name.to_string())
            .collect();
        assert_eq!(names, ["one"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].inner, Error::EmptyStatementList);
    }

    tree_tests!(
        use parser;

        fn test_number_expr() {
            let expr = "12345";
            let tree_ok = "int 12345 (0..5)";
        }

        fn test_identifier_expr() {
            let expr = "myVar";
            let tree_ok = "ident myVar (0..5)";
        }

        fn test_binary_addition_expr() {
            let expr = "a + b";
            let tree_ok = "
                binary Add (0..5)
                  ident a (0..1)
                  ident b (4..5)
            ";
        }

        fn test_binary_subtraction_expr() {
            let expr = "a - 1";
            let tree_ok = "
                binary Sub (0..5)
                  ident a (0..1)
                  int 1 (4..5)
            ";
        }

        fn test_binary_multiplication_expr() {
            let expr = "2*3";
            let tree_ok = "
                binary Mul (0..3)
                  int 2 (0..1)
                  int 3 (2..3)
            ";
        }

        fn test_binary_division_expr() {
            let expr = "a / b";
            let tree_ok = "
                binary Div (0..5)
                  ident a (0..1)
                  ident b (4..5)
            ";
        }

        fn test_assignment_expr() {
            let expr = "x=y";
            let tree_ok = "
                binary Assign (0..3)
                  ident x (0..1)
                  ident y (2..3)
            ";
        }

        fn test_assignment_to_number_still_parses() {
            let expr = "1 = 2";
            let tree_ok = "
                binary Assign (0..5)
                  int 1 (0..1)
                  int 2 (4..5)
            ";
        }

        fn test_unrecognized_operator_parses() {
            let expr = "a % b";
            let tree_ok = "
                binary Unrecognized('%') (0..5)
                  ident a (0..1)
                  ident b (4..5)
            ";
        }

        fn test_call_no_args() {
            let expr = "f()";
            let tree_ok = "call f (0..3)";
        }

        fn test_call_multiple_args() {
            let expr = "add(a 2 b)";
            let tree_ok = "
                call add (0..10)
                  arguments
                    ident a (4..5)
                    int 2 (6..7)
                    ident b (8..9)
            ";
        }

        fn test_let_expr() {
            let expr = "let y = 5";
            let tree_ok = "
                let y (0..9)
                  int 5 (8..9)
            ";
        }

        fn test_let_with_binary_initializer() {
            let expr = "let y = a * b";
            let tree_ok = "
                let y (0..13)
                  binary Mul (8..13)
                    ident a (8..9)
                    ident b (12..13)
            ";
        }

        fn test_if_with_keywords() {
            let expr = "if 1 then 2 else 3";
            let tree_ok = "
                if (0..18)
                  int 1 (3..4)
                  int 2 (10..11)
                  int 3 (17..18)
            ";
        }

        fn test_if_without_keywords() {
            let expr = "if c a b";
            let tree_ok = "
                if (0..8)
                  ident c (3..4)
                  ident a (5..6)
                  ident b (7..8)
            ";
        }

        fn test_if_only_then_keyword() {
            let expr = "if c then a b";
            let tree_ok = "
                if (0..13)
                  ident c (3..4)
                  ident a (10..11)
                  ident b (12..13)
            ";
        }

        fn test_if_nested_in_branches() {
            let expr = "if a then if b then 1 else 2 else x + 1";
            let tree_ok = "
                if (0..39)
                  ident a (3..4)
                  if (10..28)
                    ident b (13..14)
                    int 1 (20..21)
                    int 2 (27..28)
                  binary Add (34..39)
                    ident x (34..35)
                    int 1 (38..39)
            ";
        }

        fn test_function_two_params() {
            let program = "def add(a b) a+b;";
            let tree_ok = "
                function add(a b)
                  statements (13..17)
                    binary Add (13..16)
                      ident a (13..14)
                      ident b (15..16)
            ";
        }

        fn test_function_no_params_multiple_statements() {
            let program = "def f(x) let y = 5 x=y y;";
            let tree_ok = "
                function f(x)
                  statements (9..25)
                    let y (9..18)
                      int 5 (17..18)
                    binary Assign (19..22)
                      ident x (19..20)
                      ident y (21..22)
                    ident y (23..24)
            ";
        }

        fn test_program_multiple_functions() {
            let program = "
                def one() 1;
                def two() one();
            ";
            let tree_ok = "
                function one()
                  statements (27..29)
                    int 1 (27..28)
                function two()
                  statements (56..62)
                    call one (56..61)
            ";
        }

        fn test_empty_program() {
            let program = "  ";
            let tree_ok = "";
        }

        fn test_error_missing_def() {
            let program = "add(a b) a+b;";
            let expected_errors = &["0..3: expected token Def, but got Identifier"];
        }

        fn test_error_missing_function_name() {
            let program = "def (a) a;";
            let expected_errors = &["4..5: expected token Identifier, but got LParen"];
        }

        fn test_error_missing_left_paren() {
            let program = "def f a) a;";
            let expected_errors = &["6..7: expected token LParen, but got Identifier"];
        }

        fn test_error_non_identifier_parameter() {
            let program = "def f(a 1) a;";
            let expected_errors = &["8..9: expected token RParen, but got Number"];
        }

        fn test_error_missing_semicolon() {
            let program = "def f(a) a";
            let expected_errors = &["10..10: expected token Semicolon, but got Eof"];
        }

        fn test_error_empty_statement_list() {
            let program = "def f() ;";
            let expected_errors = &["8..9: empty statement list"];
        }

        fn test_error_missing_semicolon_before_next_def() {
            let program = "def f() 1 def g() 2;";
            let expected_errors = &["10..13: unexpected token Def in expression"];
        }

        fn test_error_first_definition_aborts_rest() {
            let program = "def f() 1; def g( 2; def h() 3;";
            let tree_error = "
                function f()
                  statements (8..10)
                    int 1 (8..9)
            ";
            let expected_errors = &["18..19: expected token RParen, but got Number"];
        }

        fn test_error_binary_chain_is_not_an_expression() {
            let program = "def f(a) a + 1 + 2;";
            let expected_errors = &["15..16: unexpected token Operator in expression"];
        }

        fn test_error_nested_call_argument() {
            let expr = "f(g(1))";
            let expected_errors = &["3..4: expected token RParen, but got LParen"];
        }

        fn test_error_operator_argument() {
            let expr = "f(a + b)";
            let expected_errors = &["4..5: expected token RParen, but got Operator"];
        }

        fn test_error_bracket_after_number() {
            let expr = "1(2)";
            let expected_errors = &["0..1: expected token Identifier, but got Number"];
        }

        fn test_error_closing_brace_after_primary() {
            let expr = "f}";
            let expected_errors = &["1..2: expected token LParen, but got RBrace"];
        }

        fn test_error_binary_missing_rhs() {
            let expr = "a +";
            let expected_errors = &["3..3: unexpected token Eof in expression"];
        }

        fn test_error_let_missing_equals() {
            let expr = "let y 5";
            let expected_errors = &["6..7: expected token Assign, but got Number"];
        }

        fn test_error_let_missing_name() {
            let expr = "let = 5";
            let expected_errors = &["4..5: expected token Identifier, but got Assign"];
        }

        fn test_error_if_missing_else_branch() {
            let expr = "if 1 then 2 else";
            let expected_errors = &["16..16: unexpected token Eof in expression"];
        }

        fn test_error_if_misplaced_else_keyword() {
            let expr = "if 1 else 2 3";
            let expected_errors = &["5..9: unexpected token Else in expression"];
        }

        fn test_error_number_out_of_range() {
            let expr = "2147483648";
            let expected_errors = &["0..10: parse int error, out of bounds"];
        }

        fn test_error_unknown_character() {
            let expr = "$";
            let expected_errors = &["0..1: unexpected token Unknown in expression"];
        }

        fn test_error_trailing_tokens() {
            let expr = "a b";
            let expected_errors = &["2..3: expected token Eof, but got Identifier"];
        }
    );
}
