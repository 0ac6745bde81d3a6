//! A reference evaluator for lowered modules.

use super::{ArithOp, BlockId, Function, Inst, Local, Module, Terminator, Value};

/// Calls nested deeper than this fail instead of exhausting the native stack.
pub const MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("call to undefined function `{0}`")]
    UnknownFunction(Box<str>),
    #[error("function `{callee}` expects {expected} arguments, but got {actual}")]
    ArityMismatch {
        callee: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("division overflow")]
    DivisionOverflow,
    #[error("call depth exceeded {}", MAX_CALL_DEPTH)]
    StackOverflow,
    #[error("malformed function `{function}`: {reason}")]
    Malformed {
        function: Box<str>,
        reason: &'static str,
    },
}

/// Runs `name` with the given arguments and returns its result.
///
/// Arithmetic wraps on overflow, as `add`/`sub`/`mul` do without flags.
pub fn call(module: &Module, name: &str, args: &[i32]) -> Result<i32, EvalError> {
    Interpreter { module, depth: 0 }.call(name, args)
}

struct Interpreter<'m> {
    module: &'m Module,
    depth: usize,
}

#[derive(Copy, Clone, Debug)]
enum Cell {
    Int(i32),
    Bool(bool),
    Slot(usize),
}

struct Frame<'a> {
    function: &'a Function,
    args: &'a [i32],
    locals: Vec<Option<Cell>>,
    slots: Vec<Option<i32>>,
}

impl<'m> Interpreter<'m> {
    fn call(&mut self, name: &str, args: &[i32]) -> Result<i32, EvalError> {
        let function = self
            .module
            .get_function(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.into()))?;
        if function.arity() != args.len() {
            return Err(EvalError::ArityMismatch {
                callee: name.into(),
                expected: function.arity(),
                actual: args.len(),
            });
        }
        if self.depth == MAX_CALL_DEPTH {
            return Err(EvalError::StackOverflow);
        }

        self.depth += 1;
        let result = self.run(function, args);
        self.depth -= 1;
        result
    }

    fn run(&mut self, function: &'m Function, args: &[i32]) -> Result<i32, EvalError> {
        let mut frame = Frame {
            function,
            args,
            locals: vec![None; function.locals.len()],
            slots: Vec::new(),
        };
        let mut block = function
            .entry()
            .ok_or_else(|| frame.malformed("no entry block"))?;
        let mut prev = None;
        loop {
            let data = function.block(block);
            for inst in data.insts() {
                self.exec(&mut frame, inst, prev)?;
            }
            let terminator = data
                .terminator()
                .ok_or_else(|| frame.malformed("block without terminator"))?;
            let next = match *terminator {
                Terminator::Ret(value) => return frame.int(value),
                Terminator::Br(target) => target,
                Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if frame.bool(cond)? {
                        then_block
                    } else {
                        else_block
                    }
                }
            };
            prev = Some(block);
            block = next;
        }
    }

    fn exec(
        &mut self,
        frame: &mut Frame<'_>,
        inst: &Inst,
        prev: Option<BlockId>,
    ) -> Result<(), EvalError> {
        match inst {
            Inst::Alloca { dst } => {
                frame.slots.push(None);
                frame.set(*dst, Cell::Slot(frame.slots.len() - 1));
            }
            Inst::Load { dst, slot } => {
                let slot = frame.slot(*slot)?;
                let value = frame.slots[slot]
                    .ok_or_else(|| frame.malformed("load from an uninitialized slot"))?;
                frame.set(*dst, Cell::Int(value));
            }
            Inst::Store { value, slot } => {
                let value = frame.int(*value)?;
                let slot = frame.slot(*slot)?;
                frame.slots[slot] = Some(value);
            }
            Inst::Binary { dst, op, lhs, rhs } => {
                let lhs = frame.int(*lhs)?;
                let rhs = frame.int(*rhs)?;
                let value = match op {
                    ArithOp::Add => lhs.wrapping_add(rhs),
                    ArithOp::Sub => lhs.wrapping_sub(rhs),
                    ArithOp::Mul => lhs.wrapping_mul(rhs),
                    ArithOp::SDiv if rhs == 0 => return Err(EvalError::DivisionByZero),
                    ArithOp::SDiv => lhs.checked_div(rhs).ok_or(EvalError::DivisionOverflow)?,
                };
                frame.set(*dst, Cell::Int(value));
            }
            Inst::ICmpNe { dst, lhs, rhs } => {
                let ne = frame.int(*lhs)? != frame.int(*rhs)?;
                frame.set(*dst, Cell::Bool(ne));
            }
            Inst::Call { dst, callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| frame.int(*arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = self.call(callee, &args)?;
                frame.set(*dst, Cell::Int(value));
            }
            Inst::Phi { dst, incoming } => {
                let (value, _) = incoming
                    .iter()
                    .find(|(_, from)| Some(*from) == prev)
                    .ok_or_else(|| frame.malformed("phi has no value for the taken edge"))?;
                let value = frame.int(*value)?;
                frame.set(*dst, Cell::Int(value));
            }
        }
        Ok(())
    }
}

impl Frame<'_> {
    fn malformed(&self, reason: &'static str) -> EvalError {
        EvalError::Malformed {
            function: self.function.name.clone(),
            reason,
        }
    }

    fn set(&mut self, dst: Local, cell: Cell) {
        self.locals[dst.0] = Some(cell);
    }

    fn get(&self, value: Value) -> Result<Cell, EvalError> {
        match value {
            Value::Const(c) => Ok(Cell::Int(c)),
            Value::Arg(idx) => self
                .args
                .get(idx)
                .copied()
                .map(Cell::Int)
                .ok_or_else(|| self.malformed("argument index out of range")),
            Value::Local(local) => self.locals[local.0]
                .ok_or_else(|| self.malformed("use of a value before its definition")),
        }
    }

    fn int(&self, value: Value) -> Result<i32, EvalError> {
        match self.get(value)? {
            Cell::Int(i) => Ok(i),
            _ => Err(self.malformed("expected an i32 operand")),
        }
    }

    fn bool(&self, value: Value) -> Result<bool, EvalError> {
        match self.get(value)? {
            Cell::Bool(b) => Ok(b),
            _ => Err(self.malformed("expected an i1 operand")),
        }
    }

    fn slot(&self, value: Value) -> Result<usize, EvalError> {
        match self.get(value)? {
            Cell::Slot(slot) => Ok(slot),
            _ => Err(self.malformed("expected a ptr operand")),
        }
    }
}
