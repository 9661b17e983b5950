//! Structural and ownership verification.
//!
//! [`verify_function`] checks the invariants every pass must preserve:
//! referential integrity, use-list consistency, block shape and the
//! ownership rules for trivial values. All violations are collected rather
//! than stopping at the first one.

use thiserror::Error;

use crate::function::{BlockId, Function, InstId, SilStage, ValueDef, ValueId};
use crate::inst::InstKind;
use crate::ownership::{LoadOwnershipQualifier, OwnershipKind, StoreOwnershipQualifier};

/// A violated IR invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{inst} uses {value}, which is not defined by a live instruction")]
    DanglingOperand { inst: InstId, value: ValueId },

    #[error("use list of {value} does not match the operands of {inst}")]
    UseListMismatch { value: ValueId, inst: InstId },

    #[error("{block} does not end in a terminator")]
    MissingTerminator { block: BlockId },

    #[error("terminator {inst} in the middle of {block}")]
    MisplacedTerminator { inst: InstId, block: BlockId },

    #[error("{inst} passes {found} arguments to {dest}, which takes {expected}")]
    BranchArity {
        inst: InstId,
        dest: BlockId,
        expected: usize,
        found: usize,
    },

    #[error("trivial value {value} has ownership {ownership}")]
    TrivialWithOwnership {
        value: ValueId,
        ownership: OwnershipKind,
    },

    #[error("{inst} ({kind}) ends the lifetime of trivial value {value}")]
    LifetimeEndOnTrivial {
        inst: InstId,
        kind: &'static str,
        value: ValueId,
    },

    #[error("{inst} ({kind}) has a qualifier that does not match the triviality of its type")]
    QualifierMismatch { inst: InstId, kind: &'static str },

    #[error("{value} still has move-only wrapped type {ty}")]
    MoveOnlyWrapped { value: ValueId, ty: String },

    #[error("{inst} ({kind}) cannot carry move-only wrapped value {value}")]
    MoveOnlyWrappedOperand {
        inst: InstId,
        kind: &'static str,
        value: ValueId,
    },
}

/// Verify `func`, returning every violation found.
pub fn verify_function(func: &Function) -> Result<(), Vec<VerifyError>> {
    let mut verifier = FunctionVerifier {
        func,
        errors: Vec::new(),
    };
    verifier.run();
    if verifier.errors.is_empty() {
        Ok(())
    } else {
        Err(verifier.errors)
    }
}

/// Check that no value outside the function signature carries the
/// move-only wrapper.
///
/// Entry block arguments are part of the signature and are not checked.
pub fn verify_no_move_only_wrapped(func: &Function) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();
    let mut check = |value: ValueId| {
        let ty = func.value_type(value);
        if ty.is_move_only_wrapped() {
            errors.push(VerifyError::MoveOnlyWrapped {
                value,
                ty: ty.to_string(),
            });
        }
    };
    for block in func.blocks() {
        if !block.is_entry() {
            block.args().iter().copied().for_each(&mut check);
        }
        for &inst in block.insts() {
            func.inst(inst).results().iter().copied().for_each(&mut check);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

struct FunctionVerifier<'a> {
    func: &'a Function,
    errors: Vec<VerifyError>,
}

impl<'a> FunctionVerifier<'a> {
    fn run(&mut self) {
        self.check_blocks();
        self.check_operands();
        self.check_ownership();
    }

    fn emit(&mut self, error: VerifyError) {
        self.errors.push(error);
    }

    fn check_blocks(&mut self) {
        let func = self.func;
        for block in func.blocks() {
            let Some((&last, body)) = block.insts().split_last() else {
                self.emit(VerifyError::MissingTerminator { block: block.id() });
                continue;
            };
            for &inst in body {
                if func.inst(inst).kind().is_terminator() {
                    self.emit(VerifyError::MisplacedTerminator {
                        inst,
                        block: block.id(),
                    });
                }
            }
            match func.inst(last).kind() {
                InstKind::Branch { dest, args } => self.check_arity(last, *dest, args.len()),
                InstKind::CondBranch {
                    true_dest,
                    true_args,
                    false_dest,
                    false_args,
                    ..
                } => {
                    self.check_arity(last, *true_dest, true_args.len());
                    self.check_arity(last, *false_dest, false_args.len());
                }
                kind if kind.is_terminator() => {}
                _ => self.emit(VerifyError::MissingTerminator { block: block.id() }),
            }
        }
    }

    fn check_arity(&mut self, inst: InstId, dest: BlockId, found: usize) {
        let expected = self.func.block(dest).args().len();
        if expected != found {
            self.emit(VerifyError::BranchArity {
                inst,
                dest,
                expected,
                found,
            });
        }
    }

    fn check_operands(&mut self) {
        let func = self.func;
        for inst in func.instructions() {
            let data = func.inst(inst);
            let operands = data.kind().operands();
            for &value in operands.iter().chain(data.type_dependent_operands()) {
                if !func.is_value_live(value) {
                    self.emit(VerifyError::DanglingOperand { inst, value });
                }
                if !func.uses(value).iter().any(|u| u.user == inst) {
                    self.emit(VerifyError::UseListMismatch { value, inst });
                }
            }
        }
        for value in func.value_ids() {
            if !func.is_value_live(value) {
                continue;
            }
            for u in func.uses(value) {
                let user = func.inst(u.user);
                let listed = if u.type_dependent {
                    user.type_dependent_operands().contains(&value)
                } else {
                    user.kind().operands().contains(&value)
                };
                if user.is_erased() || !listed {
                    self.emit(VerifyError::UseListMismatch {
                        value,
                        inst: u.user,
                    });
                }
            }
        }
    }

    fn check_ownership(&mut self) {
        let func = self.func;
        for block in func.blocks() {
            for &arg in block.args() {
                self.check_trivial_value(arg);
            }
            for &inst in block.insts() {
                let data = func.inst(inst);
                for &result in data.results() {
                    self.check_trivial_value(result);
                }
                if !data.kind().accepts_move_only_wrapped() {
                    self.check_no_wrapped_values(inst);
                }
                match data.kind() {
                    InstKind::DestroyValue { operand } | InstKind::EndBorrow { operand } => {
                        if func.is_trivial(func.value_type(*operand)) {
                            self.emit(VerifyError::LifetimeEndOnTrivial {
                                inst,
                                kind: data.kind().name(),
                                value: *operand,
                            });
                        }
                    }
                    InstKind::Load { address, qualifier } => {
                        let trivial = func.is_trivial(func.value_type(*address));
                        let trivial_qualifier = *qualifier == LoadOwnershipQualifier::Trivial;
                        if *qualifier != LoadOwnershipQualifier::Unqualified
                            && trivial != trivial_qualifier
                        {
                            self.emit(VerifyError::QualifierMismatch {
                                inst,
                                kind: data.kind().name(),
                            });
                        }
                    }
                    InstKind::Store { src, qualifier, .. } => {
                        let trivial = func.is_trivial(func.value_type(*src));
                        let trivial_qualifier = *qualifier == StoreOwnershipQualifier::Trivial;
                        if *qualifier != StoreOwnershipQualifier::Unqualified
                            && trivial != trivial_qualifier
                        {
                            self.emit(VerifyError::QualifierMismatch {
                                inst,
                                kind: data.kind().name(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_trivial_value(&mut self, value: ValueId) {
        let func = self.func;
        let ty = func.value_type(value);
        if ty.is_address() || !func.is_trivial(ty) {
            return;
        }
        let ownership = func.ownership_kind(value);
        // Lowered code may keep unowned trivial block arguments.
        let allowed = match (func.value_def(value), ownership) {
            (_, OwnershipKind::None) => true,
            (ValueDef::Argument { .. }, OwnershipKind::Unowned) => {
                func.stage() == SilStage::Lowered
            }
            _ => false,
        };
        if !allowed {
            self.emit(VerifyError::TrivialWithOwnership { value, ownership });
        }
    }

    fn check_no_wrapped_values(&mut self, inst: InstId) {
        let func = self.func;
        let data = func.inst(inst);
        for value in data.kind().operands().into_iter().chain(data.results().iter().copied()) {
            if func.value_type(value).is_move_only_wrapped() {
                self.emit(VerifyError::MoveOnlyWrappedOperand {
                    inst,
                    kind: data.kind().name(),
                    value,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::types::{SilType, Type, TypeTable};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn new_func() -> Function {
        Function::new("f", Arc::new(TypeTable::new()))
    }

    #[test]
    fn test_well_formed_function() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let bb1 = func.add_block();
        let arg = func.add_argument(
            bb0,
            SilType::object(Type::int(64).move_only()),
            OwnershipKind::Owned,
        );
        let phi = func.add_argument(
            bb1,
            SilType::object(Type::int(64).move_only()),
            OwnershipKind::Owned,
        );
        let mut b = Builder::at_end(&mut func, bb0);
        b.branch(bb1, vec![arg]);
        b.position_at_end(bb1);
        b.destroy_value(phi);
        let unit = b.tuple(vec![]);
        b.return_(unit);

        assert_eq!(verify_function(&func), Ok(()));
        assert_eq!(
            verify_no_move_only_wrapped(&func),
            Err(vec![VerifyError::MoveOnlyWrapped {
                value: phi,
                ty: "$@moveOnly Builtin.Int64".to_string()
            }])
        );
    }

    #[test]
    fn test_missing_terminator_and_arity() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let bb1 = func.add_block();
        func.add_argument(bb1, SilType::object(Type::int(64)), OwnershipKind::None);
        let br = Builder::at_end(&mut func, bb0).branch(bb1, vec![]);

        let errors = verify_function(&func).unwrap_err();
        assert_eq!(
            errors,
            vec![
                VerifyError::BranchArity {
                    inst: br,
                    dest: bb1,
                    expected: 1,
                    found: 0
                },
                VerifyError::MissingTerminator { block: bb1 },
            ]
        );
    }

    #[test]
    fn test_lifetime_end_on_trivial_value() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let arg = func.add_argument(bb0, SilType::object(Type::int(64)), OwnershipKind::None);
        let mut b = Builder::at_end(&mut func, bb0);
        let destroy = b.destroy_value(arg);
        b.return_(arg);

        let errors = verify_function(&func).unwrap_err();
        assert_eq!(
            errors,
            vec![VerifyError::LifetimeEndOnTrivial {
                inst: destroy,
                kind: "destroy_value",
                value: arg
            }]
        );
    }

    #[test]
    fn test_trivial_argument_with_ownership() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let arg = func.add_argument(bb0, SilType::object(Type::int(64)), OwnershipKind::Owned);
        Builder::at_end(&mut func, bb0).return_(arg);

        let errors = verify_function(&func).unwrap_err();
        assert!(errors.contains(&VerifyError::TrivialWithOwnership {
            value: arg,
            ownership: OwnershipKind::Owned
        }));
    }

    #[test]
    fn test_unowned_trivial_argument_only_in_lowered_code() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let arg = func.add_argument(bb0, SilType::object(Type::int(64)), OwnershipKind::Unowned);
        Builder::at_end(&mut func, bb0).return_(arg);

        assert_eq!(
            verify_function(&func),
            Err(vec![VerifyError::TrivialWithOwnership {
                value: arg,
                ownership: OwnershipKind::Unowned
            }])
        );
        func.set_stage(SilStage::Lowered);
        assert_eq!(verify_function(&func), Ok(()));
    }

    #[test]
    fn test_wrapped_value_returned() {
        let mut func = new_func();
        let entry = func.add_block();
        let bb1 = func.add_block();
        let phi = func.add_argument(
            bb1,
            SilType::object(Type::int(64).move_only()),
            OwnershipKind::Owned,
        );
        let mut b = Builder::at_end(&mut func, entry);
        b.unreachable();
        b.position_at_end(bb1);
        let ret = b.return_(phi);

        assert_eq!(
            verify_function(&func),
            Err(vec![VerifyError::MoveOnlyWrappedOperand {
                inst: ret,
                kind: "return",
                value: phi
            }])
        );
    }

    #[test]
    fn test_wrapped_literal_result() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let lit = func.insert_instruction(
            bb0,
            0,
            InstKind::IntegerLiteral { value: 1 },
            vec![SilType::object(Type::int(64).move_only())],
        );
        Builder::at_end(&mut func, bb0).unreachable();

        let errors = verify_function(&func).unwrap_err();
        assert!(errors.contains(&VerifyError::MoveOnlyWrappedOperand {
            inst: lit,
            kind: "integer_literal",
            value: func.inst(lit).result()
        }));
    }

    #[test]
    fn test_load_qualifier_mismatch() {
        let mut func = new_func();
        let bb0 = func.add_block();
        let mut b = Builder::at_end(&mut func, bb0);
        let addr = b.alloc_stack(Type::NativeObject);
        let val = b.load(addr, LoadOwnershipQualifier::Trivial).unwrap();
        b.return_(val);

        let errors = verify_function(&func).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            VerifyError::QualifierMismatch { kind: "load", .. }
        ));
    }

    #[test]
    fn test_error_display() {
        let err = VerifyError::BranchArity {
            inst: InstId(3),
            dest: BlockId(2),
            expected: 1,
            found: 0,
        };
        assert_eq!(
            err.to_string(),
            "inst#3 passes 0 arguments to bb2, which takes 1"
        );
    }
}
