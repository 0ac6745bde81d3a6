use super::{Function, Inst};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("function `{function}` has no blocks")]
    NoBody { function: Box<str> },
    #[error("block `{block}` has no terminator")]
    MissingTerminator { block: Box<str> },
    #[error("block `{block}` branches to a block outside of the function body")]
    DetachedSuccessor { block: Box<str> },
    #[error("phi in block `{block}` must precede every other instruction")]
    MisplacedPhi { block: Box<str> },
    #[error("phi in block `{block}` lists `{incoming}`, which is not a predecessor")]
    NotAPredecessor { block: Box<str>, incoming: Box<str> },
    #[error("phi in block `{block}` has {actual} incoming values for {expected} predecessors")]
    IncomingCount {
        block: Box<str>,
        expected: usize,
        actual: usize,
    },
}

/// Checks the structural well-formedness of a finished function.
pub fn verify_function(function: &Function) -> Result<(), VerifyError> {
    if function.entry().is_none() {
        return Err(VerifyError::NoBody {
            function: function.name.clone(),
        });
    }

    for (id, block) in function.blocks() {
        let label = || block.label.clone();

        let Some(terminator) = &block.terminator else {
            return Err(VerifyError::MissingTerminator { block: label() });
        };
        if !terminator
            .successors()
            .into_iter()
            .all(|succ| function.is_attached(succ))
        {
            return Err(VerifyError::DetachedSuccessor { block: label() });
        }

        let leading_phis = block.insts.iter().take_while(|i| i.is_phi()).count();
        if block.insts[leading_phis..].iter().any(Inst::is_phi) {
            return Err(VerifyError::MisplacedPhi { block: label() });
        }

        let predecessors = function.predecessors(id);
        let phis = block.insts[..leading_phis].iter().filter_map(|inst| match inst {
            Inst::Phi { incoming, .. } => Some(incoming),
            _ => None,
        });
        for incoming in phis {
            if let Some((_, stray)) = incoming
                .iter()
                .find(|(_, from)| !predecessors.contains(from))
            {
                return Err(VerifyError::NotAPredecessor {
                    block: label(),
                    incoming: function.block(*stray).label.clone(),
                });
            }
            if incoming.len() != predecessors.len() {
                return Err(VerifyError::IncomingCount {
                    block: label(),
                    expected: predecessors.len(),
                    actual: incoming.len(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Module, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_function_without_blocks() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", Vec::new());
        assert_eq!(
            verify_function(b.function(f)),
            Err(VerifyError::NoBody {
                function: "f".into()
            })
        );
    }

    #[test]
    fn test_missing_terminator() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", Vec::new());
        let entry = b.append_block(f, "entry");
        b.position_at_end(f, entry);
        b.build_binary(crate::ir::ArithOp::Add, Value::Const(1), Value::Const(2), "addtmp");
        assert_eq!(
            verify_function(b.function(f)),
            Err(VerifyError::MissingTerminator {
                block: "entry".into()
            })
        );
    }

    #[test]
    fn test_branch_to_detached_block() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", Vec::new());
        let entry = b.append_block(f, "entry");
        let lost = b.create_block(f, "lost");
        b.position_at_end(f, entry);
        b.build_br(lost);
        assert_eq!(
            verify_function(b.function(f)),
            Err(VerifyError::DetachedSuccessor {
                block: "entry".into()
            })
        );
    }

    #[test]
    fn test_phi_from_non_predecessor() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", Vec::new());
        let entry = b.append_block(f, "entry");
        let other = b.append_block(f, "other");
        let join = b.append_block(f, "join");
        b.position_at_end(f, entry);
        b.build_br(join);
        b.position_at_end(f, other);
        b.build_return(Value::Const(0));
        b.position_at_end(f, join);
        let phi = b.build_phi(vec![(Value::Const(1), other)], "iftmp");
        b.build_return(phi);
        assert_eq!(
            verify_function(b.function(f)),
            Err(VerifyError::NotAPredecessor {
                block: "join".into(),
                incoming: "other".into(),
            })
        );
    }

    #[test]
    fn test_well_formed_diamond() {
        let mut b = Builder::new(Module::new("m"));
        let f = b.declare_function("f", vec!["c".into()]);
        let entry = b.append_block(f, "entry");
        let then_block = b.append_block(f, "then");
        let else_block = b.append_block(f, "else");
        let merge = b.append_block(f, "ifcont");
        b.position_at_end(f, entry);
        let cond = b.build_icmp_ne(Value::Arg(0), Value::Const(0), "ifcond");
        b.build_cond_br(cond, then_block, else_block);
        b.position_at_end(f, then_block);
        b.build_br(merge);
        b.position_at_end(f, else_block);
        b.build_br(merge);
        b.position_at_end(f, merge);
        let phi = b.build_phi(
            vec![(Value::Const(1), then_block), (Value::Const(2), else_block)],
            "iftmp",
        );
        b.build_return(phi);
        assert_eq!(verify_function(b.function(f)), Ok(()));
    }
}
