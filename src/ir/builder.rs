use super::{ArithOp, BlockId, Function, FunctionId, Inst, Local, Module, Terminator, Type, Value};

/// Owns the module under construction and the point where new instructions
/// are emitted.
pub struct Builder {
    module: Module,
    position: Option<Position>,
}

#[derive(Copy, Clone, Debug)]
struct Position {
    function: FunctionId,
    block: BlockId,
}

impl Builder {
    pub fn new(module: Module) -> Builder {
        Builder {
            module,
            position: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    /// Adds a function with the given signature and no blocks.
    pub fn declare_function(&mut self, name: &str, params: Vec<Box<str>>) -> FunctionId {
        self.module.functions.push(Function::new(name.into(), params));
        FunctionId(self.module.functions.len() - 1)
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.module.functions[id.0]
    }

    /// Removes the most recently declared function, leaving every earlier one
    /// in place. Clears the emission point if it was inside that function.
    pub fn remove_function(&mut self, id: FunctionId) -> Function {
        debug_assert_eq!(id.0 + 1, self.module.functions.len());
        if self.position.is_some_and(|p| p.function == id) {
            self.position = None;
        }
        self.module.functions.remove(id.0)
    }

    /// Creates a block that is not yet part of the function layout.
    pub fn create_block(&mut self, function: FunctionId, label: &str) -> BlockId {
        self.module.function_mut(function).new_block(label)
    }

    /// Places a detached block at the end of the function layout.
    pub fn attach_block(&mut self, function: FunctionId, block: BlockId) {
        self.module.function_mut(function).attach_block(block);
    }

    pub fn append_block(&mut self, function: FunctionId, label: &str) -> BlockId {
        let block = self.create_block(function, label);
        self.attach_block(function, block);
        block
    }

    pub fn position_at_end(&mut self, function: FunctionId, block: BlockId) {
        self.position = Some(Position { function, block });
    }

    pub fn current_function(&self) -> Option<FunctionId> {
        self.position.map(|p| p.function)
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.position.map(|p| p.block)
    }

    /// Reserves a slot in the entry block, after any slots already there.
    pub fn build_alloca(&mut self, name: &str) -> Value {
        let function = self.current_mut();
        let dst = function.new_local(name, Type::Ptr);
        let entry = function
            .entry()
            .expect("function under construction has an entry block");
        let insts = &mut function.block_mut(entry).insts;
        let at = insts
            .iter()
            .take_while(|inst| matches!(inst, Inst::Alloca { .. }))
            .count();
        insts.insert(at, Inst::Alloca { dst });
        Value::Local(dst)
    }

    pub fn build_load(&mut self, slot: Value, name: &str) -> Value {
        self.emit(name, Type::I32, |dst| Inst::Load { dst, slot })
    }

    pub fn build_store(&mut self, value: Value, slot: Value) {
        self.push(Inst::Store { value, slot });
    }

    pub fn build_binary(&mut self, op: ArithOp, lhs: Value, rhs: Value, name: &str) -> Value {
        self.emit(name, Type::I32, |dst| Inst::Binary { dst, op, lhs, rhs })
    }

    pub fn build_icmp_ne(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.emit(name, Type::I1, |dst| Inst::ICmpNe { dst, lhs, rhs })
    }

    pub fn build_call(&mut self, callee: &str, args: Vec<Value>, name: &str) -> Value {
        let callee = callee.into();
        self.emit(name, Type::I32, |dst| Inst::Call { dst, callee, args })
    }

    pub fn build_phi(&mut self, incoming: Vec<(Value, BlockId)>, name: &str) -> Value {
        self.emit(name, Type::I32, |dst| Inst::Phi { dst, incoming })
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn build_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn build_return(&mut self, value: Value) {
        self.terminate(Terminator::Ret(value));
    }
}

impl Builder {
    fn position(&self) -> Position {
        self.position.expect("builder must be positioned before emitting")
    }

    fn current_mut(&mut self) -> &mut Function {
        let Position { function, .. } = self.position();
        self.module.function_mut(function)
    }

    fn emit(&mut self, name: &str, ty: Type, make: impl FnOnce(Local) -> Inst) -> Value {
        let dst = self.current_mut().new_local(name, ty);
        self.push(make(dst));
        Value::Local(dst)
    }

    fn push(&mut self, inst: Inst) {
        let Position { block, .. } = self.position();
        self.current_mut().block_mut(block).insts.push(inst);
    }

    fn terminate(&mut self, terminator: Terminator) {
        let Position { block, .. } = self.position();
        let block = self.current_mut().block_mut(block);
        debug_assert!(block.terminator.is_none(), "block already terminated");
        block.terminator = Some(terminator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_allocas_are_grouped_in_entry() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", vec!["x".into()]);
        let entry = b.append_block(f, "entry");
        b.position_at_end(f, entry);
        let x = b.build_alloca("x");
        b.build_store(Value::Arg(0), x);
        let next = b.append_block(f, "next");
        b.build_br(next);
        b.position_at_end(f, next);
        let y = b.build_alloca("y");
        b.build_store(Value::Const(1), y);
        b.build_return(Value::Const(0));

        let function = b.function(f);
        let entry_insts = function.block(entry).insts();
        assert_eq!(entry_insts.len(), 3);
        assert!(matches!(entry_insts[0], Inst::Alloca { .. }));
        assert!(matches!(entry_insts[1], Inst::Alloca { .. }));
        assert!(matches!(entry_insts[2], Inst::Store { .. }));
        assert_eq!(function.block(next).insts().len(), 1);
        assert_eq!(&*function.params()[0], "x");
    }

    #[test]
    fn test_detached_blocks_are_not_printed() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", Vec::new());
        let entry = b.append_block(f, "entry");
        let later = b.create_block(f, "later");
        b.position_at_end(f, entry);
        b.build_return(Value::Const(3));

        let function = b.function(f);
        assert!(!function.is_attached(later));
        assert_eq!(function.blocks().count(), 1);
        assert_eq!(
            function.to_string(),
            "define i32 @f() {\nentry:\n  ret i32 3\n}\n"
        );
    }

    #[test]
    fn test_remove_function_clears_position() {
        let mut b = Builder::new(Module::new("m"));
        let kept = b.declare_function("kept", Vec::new());
        let entry = b.append_block(kept, "entry");
        b.position_at_end(kept, entry);
        b.build_return(Value::Const(1));

        let dropped = b.declare_function("dropped", Vec::new());
        let entry = b.append_block(dropped, "entry");
        b.position_at_end(dropped, entry);
        let removed = b.remove_function(dropped);

        assert_eq!(removed.name(), "dropped");
        assert_eq!(b.current_block(), None);
        let module = b.finish();
        assert_eq!(module.functions().len(), 1);
        assert!(module.get_function("kept").is_some());
        assert!(module.get_function("dropped").is_none());
    }
}
