//! The lowered intermediate representation: a module of functions made of
//! basic blocks in SSA form.
//!
//! The textual form printed through [`std::fmt::Display`] mirrors LLVM's
//! assembly syntax closely enough to be read by anyone familiar with it, but
//! it is a diagnostic surface only and is never parsed back.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

pub use self::{
    builder::Builder,
    verify::{verify_function, VerifyError},
};

mod builder;
pub mod interp;
mod verify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: Box<str>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<Box<str>>) -> Module {
        Module {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Functions in declaration order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| &*f.name == name)
    }

    fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0]
    }
}

/// Index of a function within its module.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FunctionId(usize);

/// A function taking and returning `i32` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: Box<str>,
    params: Vec<Box<str>>,
    locals: Vec<LocalData>,
    blocks: Vec<Block>,
    /// Blocks attached to the function body, in print order. Blocks are
    /// created detached and appended once emission reaches them.
    layout: Vec<BlockId>,
    names: Names,
}

impl Function {
    fn new(name: Box<str>, params: Vec<Box<str>>) -> Function {
        let mut names = Names::default();
        let params = params
            .into_iter()
            .map(|param| names.unique(&param))
            .collect();
        Function {
            name,
            params,
            locals: Vec::new(),
            blocks: Vec::new(),
            layout: Vec::new(),
            names,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the `i32` parameters, in order.
    pub fn params(&self) -> &[Box<str>] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Returns the attached blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.layout.iter().map(|&id| (id, &self.blocks[id.0]))
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn is_attached(&self, id: BlockId) -> bool {
        self.layout.contains(&id)
    }

    /// Returns the blocks whose terminator may transfer control to `target`.
    pub fn predecessors(&self, target: BlockId) -> Vec<BlockId> {
        self.blocks()
            .filter(|(_, block)| {
                block
                    .terminator
                    .as_ref()
                    .is_some_and(|t| t.successors().contains(&target))
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn type_of(&self, value: Value) -> Type {
        match value {
            Value::Const(_) | Value::Arg(_) => Type::I32,
            Value::Local(local) => self.locals[local.0].ty,
        }
    }

    fn new_block(&mut self, label: &str) -> BlockId {
        let label = self.names.unique(label);
        self.blocks.push(Block {
            label,
            insts: Vec::new(),
            terminator: None,
        });
        BlockId(self.blocks.len() - 1)
    }

    fn attach_block(&mut self, id: BlockId) {
        if !self.is_attached(id) {
            self.layout.push(id);
        }
    }

    fn new_local(&mut self, hint: &str, ty: Type) -> Local {
        let name = self.names.unique(hint);
        self.locals.push(LocalData { name, ty });
        Local(self.locals.len() - 1)
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    fn operand(&self, value: Value) -> Operand<'_> {
        Operand(self, value)
    }

    fn typed(&self, value: Value) -> Typed<'_> {
        Typed(self, value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    label: Box<str>,
    insts: Vec<Inst>,
    terminator: Option<Terminator>,
}

impl Block {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn terminator(&self) -> Option<&Terminator> {
        self.terminator.as_ref()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    I32,
    I1,
    Ptr,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::I32 => "i32",
            Type::I1 => "i1",
            Type::Ptr => "ptr",
        })
    }
}

/// An SSA value usable as an instruction operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Const(i32),
    /// The n-th function parameter.
    Arg(usize),
    /// The result of an instruction.
    Local(Local),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Local(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalData {
    name: Box<str>,
    ty: Type,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    SDiv,
}

impl ArithOp {
    fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::SDiv => "sdiv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// Reserves an `i32` storage slot, yielding its address.
    Alloca { dst: Local },
    Load { dst: Local, slot: Value },
    Store { value: Value, slot: Value },
    Binary {
        dst: Local,
        op: ArithOp,
        lhs: Value,
        rhs: Value,
    },
    /// Integer comparison for inequality, yielding an `i1`.
    ICmpNe { dst: Local, lhs: Value, rhs: Value },
    Call {
        dst: Local,
        callee: Box<str>,
        args: Vec<Value>,
    },
    Phi {
        dst: Local,
        incoming: Vec<(Value, BlockId)>,
    },
}

impl Inst {
    pub fn is_phi(&self) -> bool {
        matches!(self, Inst::Phi { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Inst::Call { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Value),
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            Terminator::Br(target) => vec![target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Terminator::Ret(_) => Vec::new(),
        }
    }
}

/// Per-function name table. Values and block labels share one namespace, so
/// a repeated hint gets a numeric suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Names {
    used: HashSet<Box<str>>,
    counters: HashMap<Box<str>, u32>,
}

impl Names {
    fn unique(&mut self, hint: &str) -> Box<str> {
        if self.used.insert(hint.into()) {
            return hint.into();
        }
        let counter = self.counters.entry(hint.into()).or_insert(0);
        loop {
            *counter += 1;
            let candidate: Box<str> = format!("{hint}{counter}").into();
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define i32 @{}(", self.name)?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "i32 %{param}")?;
        }
        writeln!(f, ") {{")?;

        for (idx, (_, block)) in self.blocks().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.label)?;
            for inst in &block.insts {
                write!(f, "  ")?;
                self.fmt_inst(f, inst)?;
                writeln!(f)?;
            }
            if let Some(terminator) = &block.terminator {
                write!(f, "  ")?;
                self.fmt_terminator(f, terminator)?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl Function {
    fn fmt_inst(&self, f: &mut fmt::Formatter<'_>, inst: &Inst) -> fmt::Result {
        let local = |local: &Local| &self.locals[local.0].name;
        match inst {
            Inst::Alloca { dst } => write!(f, "%{} = alloca i32", local(dst)),
            Inst::Load { dst, slot } => {
                write!(f, "%{} = load i32, {}", local(dst), self.typed(*slot))
            }
            Inst::Store { value, slot } => {
                write!(f, "store {}, {}", self.typed(*value), self.typed(*slot))
            }
            Inst::Binary { dst, op, lhs, rhs } => write!(
                f,
                "%{} = {} {}, {}",
                local(dst),
                op.mnemonic(),
                self.typed(*lhs),
                self.operand(*rhs),
            ),
            Inst::ICmpNe { dst, lhs, rhs } => write!(
                f,
                "%{} = icmp ne {}, {}",
                local(dst),
                self.typed(*lhs),
                self.operand(*rhs),
            ),
            Inst::Call { dst, callee, args } => {
                write!(f, "%{} = call i32 @{callee}(", local(dst))?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.typed(*arg))?;
                }
                write!(f, ")")
            }
            Inst::Phi { dst, incoming } => {
                write!(f, "%{} = phi i32 ", local(dst))?;
                for (idx, (value, block)) in incoming.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    let label = &self.blocks[block.0].label;
                    write!(f, "[ {}, %{label} ]", self.operand(*value))?;
                }
                Ok(())
            }
        }
    }

    fn fmt_terminator(&self, f: &mut fmt::Formatter<'_>, terminator: &Terminator) -> fmt::Result {
        let label = |block: &BlockId| &self.blocks[block.0].label;
        match terminator {
            Terminator::Br(target) => write!(f, "br label %{}", label(target)),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                self.typed(*cond),
                label(then_block),
                label(else_block),
            ),
            Terminator::Ret(value) => write!(f, "ret {}", self.typed(*value)),
        }
    }
}

/// Displays a value as a bare operand: `5`, `%a`.
struct Operand<'f>(&'f Function, Value);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Operand(function, value) = self;
        match *value {
            Value::Const(c) => write!(f, "{c}"),
            Value::Arg(idx) => write!(f, "%{}", function.params[idx]),
            Value::Local(local) => write!(f, "%{}", function.locals[local.0].name),
        }
    }
}

/// Displays a value prefixed with its type: `i32 5`, `ptr %a1`.
struct Typed<'f>(&'f Function, Value);

impl fmt::Display for Typed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Typed(function, value) = self;
        write!(f, "{} {}", function.type_of(*value), function.operand(*value))
    }
}
