//! Structural verification
//!
//! Checks exactly the invariants the mutation protocol and code generation
//! rely on: operands point at live instructions, use lists mirror operand
//! lists, every instruction sits at one position of one block, and blocks end
//! in a single terminator. Operand types must match what each instruction
//! declares, and every use must be dominated by its definition.

use rustc_hash::FxHashMap;

use super::function::{Function, IrError};
use super::instr::{InstId, Opcode, Operand};
use super::module::Module;
use super::types::Type;

/// Verify every function of a module, including call targets
pub fn verify_module(module: &Module) -> Result<(), IrError> {
    for func in module.functions() {
        verify_function(func)?;
        verify_calls(module, func)?;
    }
    Ok(())
}

/// Verify a single function in isolation
pub fn verify_function(func: &Function) -> Result<(), IrError> {
    let fail = |reason: String| IrError::Malformed {
        function: func.name.clone(),
        reason,
    };

    if func.blocks().is_empty() {
        return Err(fail("function has no blocks".to_string()));
    }

    // Placement: every live instruction appears exactly once, in its parent
    let mut placed: FxHashMap<InstId, usize> = FxHashMap::default();
    for block in func.blocks() {
        for &id in block.insts() {
            let inst = func
                .try_inst(id)
                .ok_or_else(|| fail(format!("block '{}' lists removed {}", block.name, id)))?;
            if inst.parent() != block.id {
                return Err(fail(format!(
                    "{} is listed in '{}' but its parent is {}",
                    id,
                    block.name,
                    inst.parent()
                )));
            }
            *placed.entry(id).or_default() += 1;
        }
    }
    if let Some((id, _)) = placed.iter().find(|(_, n)| **n > 1) {
        return Err(fail(format!("{} appears more than once", id)));
    }
    let live = func.arena.iter().filter(|slot| slot.is_some()).count();
    if live != placed.len() {
        return Err(fail(format!(
            "{} live instructions but {} placed in blocks",
            live,
            placed.len()
        )));
    }

    // Operands and the use-list mirror
    let mut expected_users: FxHashMap<InstId, Vec<InstId>> = FxHashMap::default();
    for id in func.instructions() {
        let inst = func.inst(id);
        for operand in inst.operands() {
            match *operand {
                Operand::Inst(producer) => {
                    let producer_inst = func.try_inst(producer).ok_or_else(|| {
                        fail(format!("{} references removed instruction {}", id, producer))
                    })?;
                    if !producer_inst.ty().is_value() {
                        return Err(fail(format!("{} uses void result of {}", id, producer)));
                    }
                    expected_users.entry(producer).or_default().push(id);
                }
                Operand::Arg(idx) if idx as usize >= func.params.len() => {
                    return Err(fail(format!("{} references missing argument #{}", id, idx)));
                }
                _ => {}
            }
        }
        for target in inst.targets() {
            if target.0 as usize >= func.blocks().len() {
                return Err(fail(format!("{} branches to unknown block {}", id, target)));
            }
        }
        check_shape(func, id).map_err(fail)?;
    }
    for id in func.instructions() {
        let mut actual = func.users(id).to_vec();
        let mut expected = expected_users.remove(&id).unwrap_or_default();
        actual.sort();
        expected.sort();
        if actual != expected {
            return Err(fail(format!(
                "use list of {} is {:?}, operands say {:?}",
                id, actual, expected
            )));
        }
    }

    // Terminators: exactly one, at the end of every block
    for block in func.blocks() {
        let terminators = block
            .insts()
            .iter()
            .filter(|&&id| func.inst(id).is_terminator())
            .count();
        if terminators != 1 || func.terminator(block.id).is_none() {
            return Err(fail(format!(
                "block '{}' must end with exactly one terminator",
                block.name
            )));
        }
    }

    check_dominance(func).map_err(fail)?;

    Ok(())
}

fn check_shape(func: &Function, id: InstId) -> Result<(), String> {
    let inst = func.inst(id);
    let ops = inst.operands();
    let arity = |n: usize| {
        if ops.len() == n {
            Ok(())
        } else {
            Err(format!("{} '{}' expects {} operands, has {}", id, inst.opcode().mnemonic(), n, ops.len()))
        }
    };
    let expect_ty = |index: usize, expected: Type| {
        let actual = func.operand_type(&ops[index]);
        if actual == Some(expected) {
            Ok(())
        } else {
            let shown = actual.map_or_else(|| "nothing".to_string(), |t| t.to_string());
            Err(format!("operand {} of {} is {}, expected {}", index, id, shown, expected))
        }
    };

    match inst.opcode() {
        op if op.is_binary() => {
            arity(2)?;
            expect_ty(0, inst.ty())?;
            expect_ty(1, inst.ty())
        }
        Opcode::ICmp(_) => {
            arity(2)?;
            match func.operand_type(&ops[0]) {
                Some(ty) if ty.is_value() => expect_ty(1, ty),
                _ => Err(format!("{} compares a non-value", id)),
            }
        }
        Opcode::Select => {
            arity(3)?;
            expect_ty(0, Type::I1)?;
            expect_ty(1, inst.ty())?;
            expect_ty(2, inst.ty())
        }
        Opcode::Br => match (ops.len(), inst.targets().len()) {
            (0, 1) => Ok(()),
            (1, 2) => expect_ty(0, Type::I1),
            _ => Err(format!("{} is a malformed branch", id)),
        },
        Opcode::Ret => match (ops.len(), func.ret) {
            (0, Type::Void) => Ok(()),
            (1, ret) if ret != Type::Void => expect_ty(0, ret),
            _ => Err(format!("{} does not match return type {}", id, func.ret)),
        },
        _ => Ok(()),
    }
}

/// Successor lists, indexed by block
fn successors(func: &Function) -> Vec<Vec<usize>> {
    func.blocks()
        .iter()
        .map(|block| match func.terminator(block.id) {
            Some(term) => func.inst(term).targets().iter().map(|t| t.0 as usize).collect(),
            None => vec![],
        })
        .collect()
}

/// Dominator sets of the reachable blocks (`None` for unreachable ones).
///
/// Iterates `dom(b) = {b} + intersection of dom(p) over predecessors p`
/// to a fixed point.
fn dominators(func: &Function) -> Vec<Option<Vec<bool>>> {
    let n = func.blocks().len();
    let succs = successors(func);

    let mut reachable = vec![false; n];
    let mut stack = vec![0usize];
    while let Some(b) = stack.pop() {
        if !std::mem::replace(&mut reachable[b], true) {
            stack.extend(succs[b].iter().copied());
        }
    }

    let mut preds: Vec<Vec<usize>> = vec![vec![]; n];
    for (b, targets) in succs.iter().enumerate() {
        if reachable[b] {
            for &t in targets {
                preds[t].push(b);
            }
        }
    }

    let mut dom: Vec<Option<Vec<bool>>> =
        (0..n).map(|b| reachable[b].then(|| vec![true; n])).collect();
    if let Some(entry) = dom.first_mut() {
        *entry = Some((0..n).map(|i| i == 0).collect());
    }

    let mut changed = true;
    while changed {
        changed = false;
        for b in 1..n {
            if !reachable[b] {
                continue;
            }
            let mut set = vec![true; n];
            for &p in &preds[b] {
                if let Some(pd) = &dom[p] {
                    for (s, &d) in set.iter_mut().zip(pd) {
                        *s &= d;
                    }
                }
            }
            set[b] = true;
            if dom[b].as_ref() != Some(&set) {
                dom[b] = Some(set);
                changed = true;
            }
        }
    }
    dom
}

/// Every use must be dominated by its definition: an earlier position in the
/// same block, or a block that dominates the user's block. Uses in
/// unreachable blocks are not checked.
fn check_dominance(func: &Function) -> Result<(), String> {
    let dom = dominators(func);
    for block in func.blocks() {
        let Some(block_dom) = &dom[block.id.0 as usize] else { continue };
        for (pos, &id) in block.insts().iter().enumerate() {
            for producer in func.inst(id).operands().iter().filter_map(|op| op.as_inst()) {
                let def_block = func.inst(producer).parent();
                let dominated = if def_block == block.id {
                    block.insts()[..pos].contains(&producer)
                } else {
                    block_dom[def_block.0 as usize]
                };
                if !dominated {
                    return Err(format!(
                        "{} in '{}' uses {}, whose definition does not dominate it",
                        id,
                        block.name,
                        func.display_operand(Operand::Inst(producer))
                    ));
                }
            }
        }
    }
    Ok(())
}

fn verify_calls(module: &Module, func: &Function) -> Result<(), IrError> {
    for id in func.instructions() {
        let inst = func.inst(id);
        if inst.opcode() != Opcode::Call {
            continue;
        }
        let callee_name = inst.callee().unwrap_or_default();
        let callee = module.function(callee_name).ok_or_else(|| IrError::Malformed {
            function: func.name.clone(),
            reason: format!("{} calls unknown function @{}", id, callee_name),
        })?;
        let args_match = callee.params.len() == inst.operands().len()
            && callee
                .params
                .iter()
                .zip(inst.operands())
                .all(|(param, arg)| func.operand_type(arg) == Some(param.ty));
        if !args_match || callee.ret != inst.ty() {
            return Err(IrError::Malformed {
                function: func.name.clone(),
                reason: format!("{} does not match the signature of @{}", id, callee_name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::function::Param;
    use crate::ir::instr::{BlockId, InstData};
    use crate::ir::parser::parse_module;

    fn simple_add() -> Function {
        let mut func = Function::new(
            "simple_add",
            vec![
                Param { name: "a".into(), ty: Type::I32 },
                Param { name: "b".into(), ty: Type::I32 },
            ],
            Type::I32,
        );
        let mut b = IrBuilder::new(&mut func);
        let (a0, a1) = (b.arg(0), b.arg(1));
        let sum = b.add(Type::I32, a0, a1);
        b.ret(Some(sum));
        func
    }

    #[test]
    fn test_well_formed() {
        assert_eq!(verify_function(&simple_add()), Ok(()));
    }

    #[test]
    fn test_missing_terminator() {
        let mut func = simple_add();
        let ret = func.terminator(BlockId(0)).unwrap();
        func.remove_inst(ret).unwrap();
        assert!(matches!(verify_function(&func), Err(IrError::Malformed { .. })));
    }

    #[test]
    fn test_corrupted_use_list() {
        let mut func = simple_add();
        let add = func.block(BlockId(0)).insts()[0];
        func.arena[add.0 as usize].as_mut().unwrap().users.clear();
        let err = verify_function(&func).unwrap_err();
        assert!(err.to_string().contains("use list"));
    }

    #[test]
    fn test_instruction_in_two_blocks() {
        let mut func = simple_add();
        let other = func.add_block("other");
        let add = func.block(BlockId(0)).insts()[0];
        func.blocks[other.0 as usize].insts.push(add);
        assert!(verify_function(&func).is_err());
    }

    #[test]
    fn test_bad_argument_index() {
        let mut func = simple_add();
        let ret = func.terminator(BlockId(0)).unwrap();
        func.insert_before(
            ret,
            InstData::binary(Opcode::Mul, Type::I32, Operand::Arg(5), Operand::Arg(0)),
        );
        let err = verify_function(&func).unwrap_err();
        assert!(err.to_string().contains("missing argument"));
    }

    #[test]
    fn test_unknown_callee() {
        let mut caller = Function::new("caller", vec![], Type::I32);
        {
            let mut b = IrBuilder::new(&mut caller);
            let r = b.call(Type::I32, "nowhere", vec![]);
            b.ret(Some(Operand::Inst(r)));
        }
        let mut module = Module::new("m");
        module.add_function(caller).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.to_string().contains("unknown function @nowhere"));
    }

    fn malformed(func: &Function) -> String {
        match verify_function(func) {
            Err(IrError::Malformed { reason, .. }) => reason,
            other => panic!("expected a malformed function, got {:?}", other),
        }
    }

    #[test]
    fn test_operand_type_mismatch() {
        let mut func = Function::new(
            "mixed",
            vec![
                Param { name: "a".into(), ty: Type::I32 },
                Param { name: "b".into(), ty: Type::I64 },
            ],
            Type::I32,
        );
        {
            let mut b = IrBuilder::new(&mut func);
            let (a0, a1) = (b.arg(0), b.arg(1));
            let sum = b.add(Type::I32, a0, a1);
            b.ret(Some(sum));
        }
        assert!(malformed(&func).contains("operand 1 of v0 is i64, expected i32"));
    }

    #[test]
    fn test_return_and_select_types() {
        let mut func = Function::new("ret", vec![Param { name: "a".into(), ty: Type::I64 }], Type::I32);
        {
            let mut b = IrBuilder::new(&mut func);
            let a = b.arg(0);
            b.ret(Some(a));
        }
        assert!(malformed(&func).contains("expected i32"));

        let mut func = Function::new(
            "sel",
            vec![
                Param { name: "c".into(), ty: Type::I1 },
                Param { name: "a".into(), ty: Type::I32 },
                Param { name: "b".into(), ty: Type::I64 },
            ],
            Type::I32,
        );
        {
            let mut b = IrBuilder::new(&mut func);
            let (c, x, y) = (b.arg(0), b.arg(1), b.arg(2));
            let s = b.select(Type::I32, c, x, y);
            b.ret(Some(s));
        }
        assert!(malformed(&func).contains("operand 2 of v0 is i64"));
    }

    #[test]
    fn test_call_argument_types() {
        let mut callee = Function::new("callee", vec![Param { name: "v".into(), ty: Type::I64 }], Type::I64);
        {
            let mut b = IrBuilder::new(&mut callee);
            let v = b.arg(0);
            b.ret(Some(v));
        }
        let mut caller = Function::new("caller", vec![Param { name: "x".into(), ty: Type::I32 }], Type::I64);
        {
            let mut b = IrBuilder::new(&mut caller);
            let x = b.arg(0);
            let r = b.call(Type::I64, "callee", vec![x]);
            b.ret(Some(Operand::Inst(r)));
        }
        let mut module = Module::new("m");
        module.add_function(caller).unwrap();
        module.add_function(callee).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.to_string().contains("does not match the signature of @callee"));
    }

    #[test]
    fn test_definition_must_dominate_use() {
        let source = r#"
define i32 @f(i1 %c) {
entry:
  br i1 %c, label %a, label %b
a:
  %v = add i32 1, 2
  br label %b
b:
  ret i32 %v
}
"#;
        let module = parse_module("m", source).unwrap();
        let err = verify_module(&module).unwrap_err();
        assert!(err.to_string().contains("uses %v, whose definition does not dominate it"));
    }

    #[test]
    fn test_use_before_definition_in_block() {
        let source = "define i32 @f(i32 %a) {\n  %x = add i32 %y, 1\n  %y = add i32 %a, 1\n  ret i32 %x\n}\n";
        let module = parse_module("m", source).unwrap();
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_dominating_definitions_accepted() {
        // Definitions reach through a diamond and around a loop; the
        // unreachable block is not checked.
        let source = r#"
define i64 @f(i64 %n, i1 %c) {
entry:
  %base = add i64 %n, 1
  br i1 %c, label %left, label %right
left:
  br label %join
right:
  br label %join
join:
  %sum = mul i64 %base, 2
  br label %loop
loop:
  %step = add i64 %sum, %base
  %again = icmp slt i64 %step, 0
  br i1 %again, label %loop, label %exit
exit:
  ret i64 %step
dead:
  ret i64 %late
later:
  %late = add i64 %n, 2
  br label %dead
}
"#;
        let module = parse_module("m", source).unwrap();
        verify_module(&module).unwrap();
    }
}
