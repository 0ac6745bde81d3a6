use std::collections::HashMap;

use crate::{
    ast::{BinaryOperator, Expr, ExprKind, FunctionDef, Ident, Program, StatementList},
    ir::{self, ArithOp, BlockId, Builder, FunctionId, Module, Value},
    token::{Span, Spanned},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// On failure, carries the module holding every function lowered before the
/// failing one. The failing function itself is never part of it.
pub type LowerResult = Result<Module, (Module, Spanned<Error>)>;

/// Lowers every definition in order. The first failing definition aborts the
/// rest.
pub fn lower_program(module_name: &str, program: &Program) -> LowerResult {
    let mut cx = Codegen::new(Module::new(module_name));
    for def in &program.definitions {
        if let Err(error) = cx.lower_function(def) {
            return Err((cx.builder.finish(), error));
        }
    }
    log::debug!("lowered {} functions", program.definitions.len());
    Ok(cx.builder.finish())
}

struct Codegen {
    builder: Builder,
    /// Storage slots of the function being lowered. Cleared per function.
    symbols: HashMap<Box<str>, Value>,
}

impl Codegen {
    fn new(module: Module) -> Codegen {
        Codegen {
            builder: Builder::new(module),
            symbols: HashMap::new(),
        }
    }

    fn lower_function(&mut self, def: &FunctionDef) -> Result<()> {
        let name = &def.name.name;
        if self.builder.module().get_function(name).is_some() {
            return error(def.name.span, Error::Redefinition(name.clone()));
        }

        let params = def.parameters.iter().map(|p| p.name.clone()).collect();
        let id = self.builder.declare_function(name, params);
        match self.lower_function_body(id, def) {
            Ok(()) => {
                log::debug!("lowered function `{name}`");
                Ok(())
            }
            Err(error) => {
                self.builder.remove_function(id);
                log::debug!("removed function `{name}` after failure");
                Err(error)
            }
        }
    }

    fn lower_function_body(&mut self, id: FunctionId, def: &FunctionDef) -> Result<()> {
        self.symbols.clear();
        let entry = self.builder.append_block(id, "entry");
        self.builder.position_at_end(id, entry);

        // Parameters live in slots so that they can be assigned like locals.
        for (idx, param) in def.parameters.iter().enumerate() {
            let slot = self.builder.build_alloca(&param.name);
            self.builder.build_store(Value::Arg(idx), slot);
            self.symbols.insert(param.name.clone(), slot);
        }

        let value = self.lower_statement_list(&def.body)?;
        self.builder.build_return(value);

        ir::verify_function(self.builder.function(id))
            .or_else(|e| error(def.name.span, Error::Malformed(e)))
    }

    fn lower_statement_list(&mut self, list: &StatementList) -> Result<Value> {
        let mut last = None;
        for statement in &list.statements {
            last = Some(self.lower_expr(statement)?);
        }
        // The parser never produces an empty list.
        Ok(last.unwrap_or(Value::Const(0)))
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Const(*n)),
            ExprKind::Variable(ident) => {
                let slot = self.lookup(ident)?;
                Ok(self.builder.build_load(slot, &ident.name))
            }
            ExprKind::Binary {
                op: BinaryOperator::Assign,
                lhs,
                rhs,
            } => self.lower_assign(lhs, rhs),
            ExprKind::Binary { op, lhs, rhs } => self.lower_arith(expr.span, *op, lhs, rhs),
            ExprKind::Call { callee, args } => self.lower_call(expr.span, callee, args),
            ExprKind::Let {
                binding,
                initializer,
            } => self.lower_let(binding, initializer),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch),
        }
    }

    fn lower_assign(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        let ExprKind::Variable(target) = &lhs.kind else {
            return error(lhs.span, Error::InvalidAssignmentTarget);
        };
        let value = self.lower_expr(rhs)?;
        let slot = self.lookup(target)?;
        self.builder.build_store(value, slot);
        Ok(value)
    }

    fn lower_arith(
        &mut self,
        span: Span,
        op: BinaryOperator,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value> {
        let lhs = self.lower_expr(lhs)?;
        let rhs = self.lower_expr(rhs)?;
        let (op, name) = match op {
            BinaryOperator::Add => (ArithOp::Add, "addtmp"),
            BinaryOperator::Sub => (ArithOp::Sub, "subtmp"),
            BinaryOperator::Mul => (ArithOp::Mul, "multmp"),
            BinaryOperator::Div => (ArithOp::SDiv, "divtmp"),
            BinaryOperator::Assign | BinaryOperator::Unrecognized(_) => {
                return error(span, Error::InvalidOperator(op.as_char()));
            }
        };
        Ok(self.builder.build_binary(op, lhs, rhs, name))
    }

    fn lower_call(&mut self, span: Span, callee: &Ident, args: &[Expr]) -> Result<Value> {
        let Some(function) = self.builder.module().get_function(&callee.name) else {
            return error(callee.span, Error::UnknownFunction(callee.name.clone()));
        };
        if function.arity() != args.len() {
            let error_kind = Error::ArityMismatch {
                callee: callee.name.clone(),
                expected: function.arity(),
                actual: args.len(),
            };
            return error(span, error_kind);
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_expr(arg)?);
        }
        Ok(self.builder.build_call(&callee.name, values, "calltmp"))
    }

    /// Binds a fresh slot, shadowing any earlier slot of the same name, and
    /// yields the stored value.
    fn lower_let(&mut self, binding: &Ident, initializer: &Expr) -> Result<Value> {
        let value = self.lower_expr(initializer)?;
        let slot = self.builder.build_alloca(&binding.name);
        self.builder.build_store(value, slot);
        self.symbols.insert(binding.name.clone(), slot);
        Ok(value)
    }

    fn lower_if(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<Value> {
        let cond = self.lower_expr(condition)?;
        let cond = self.builder.build_icmp_ne(cond, Value::Const(0), "ifcond");

        let (function, _) = self.position();
        let then_block = self.builder.create_block(function, "then");
        let else_block = self.builder.create_block(function, "else");
        let merge_block = self.builder.create_block(function, "ifcont");
        self.builder.build_cond_br(cond, then_block, else_block);

        let then_value = self.lower_branch(then_block, then_branch, merge_block)?;
        let else_value = self.lower_branch(else_block, else_branch, merge_block)?;

        self.builder.attach_block(function, merge_block);
        self.builder.position_at_end(function, merge_block);
        Ok(self.builder.build_phi(vec![then_value, else_value], "iftmp"))
    }

    /// Lowers one arm of a conditional into `block`, then jumps to `merge`.
    /// Returns the arm's value along with the block control actually leaves
    /// from, which differs from `block` when the arm nests conditionals.
    fn lower_branch(
        &mut self,
        block: BlockId,
        branch: &Expr,
        merge: BlockId,
    ) -> Result<(Value, BlockId)> {
        let (function, _) = self.position();
        self.builder.attach_block(function, block);
        self.builder.position_at_end(function, block);
        let value = self.lower_expr(branch)?;
        self.builder.build_br(merge);
        let (_, end) = self.position();
        Ok((value, end))
    }
}

impl Codegen {
    fn lookup(&self, ident: &Ident) -> Result<Value> {
        match self.symbols.get(&ident.name) {
            Some(slot) => Ok(*slot),
            None => error(ident.span, Error::UnknownSymbol(ident.name.clone())),
        }
    }

    fn position(&self) -> (FunctionId, BlockId) {
        self.builder
            .current_function()
            .zip(self.builder.current_block())
            .expect("expressions are lowered inside a positioned function")
    }
}

fn error<T>(span: Span, error: Error) -> Result<T> {
    let error = span.wrap(error);
    log::error!("lowering error: {error:#}");
    Err(error)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown variable `{0}`")]
    UnknownSymbol(Box<str>),
    #[error("unknown function `{0}`")]
    UnknownFunction(Box<str>),
    #[error("function `{callee}` expects {expected} arguments, but got {actual}")]
    ArityMismatch {
        callee: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("left-hand side of `=` must be a variable")]
    InvalidAssignmentTarget,
    #[error("invalid binary operator `{0}`")]
    InvalidOperator(char),
    #[error("function `{0}` is already defined")]
    Redefinition(Box<str>),
    #[error("malformed function: {0}")]
    Malformed(ir::VerifyError),
}
