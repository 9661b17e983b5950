//! Randomized properties of move-only type elimination.
//!
//! Functions are generated from a fixed set of seeds by chaining fragments
//! that wrap entry arguments and use the wrapped values through copies,
//! borrows, memory, aggregates and control flow.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ossa_ir::{
    verify_function, verify_no_move_only_wrapped, BlockId, Builder, Function,
    LoadOwnershipQualifier, OwnershipKind, SilType, StoreOwnershipQualifier, Type, TypeTable,
    ValueId,
};
use ossa_opt::{eliminate_move_only_types, EliminationMode};

const SEEDS: std::ops::Range<u64> = 0..64;

fn types() -> TypeTable {
    let mut types = TypeTable::new();
    types.declare_class("Klass", vec![Type::int(64)]).unwrap();
    types
        .declare_struct("Point", vec![Type::int(64), Type::int(64)])
        .unwrap();
    types
        .declare_struct("Holder", vec![Type::int(64), Type::class("Klass")])
        .unwrap();
    types
        .declare_enum("MaybeInt", vec![None, Some(Type::int(64))])
        .unwrap();
    types
}

// ============================================================================
// Generator
// ============================================================================

/// Entry arguments the fragments draw from.
struct Params {
    int: ValueId,
    opt: ValueId,
    klass: ValueId,
    all: Vec<(Type, ValueId)>,
}

struct FunctionGen {
    rng: StdRng,
}

impl FunctionGen {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn generate(&mut self, name: &str) -> Function {
        let mut func = Function::new(name, Arc::new(types()));
        let entry = func.add_block();
        let mut all = Vec::new();
        for ty in [
            Type::int(64),
            Type::structure("Point"),
            Type::enumeration("MaybeInt"),
            Type::class("Klass"),
            Type::structure("Holder"),
        ] {
            let ownership = if func.types().is_trivial(&ty) {
                OwnershipKind::None
            } else {
                OwnershipKind::Owned
            };
            let arg = func.add_argument(entry, SilType::object(ty.clone()), ownership);
            all.push((ty, arg));
        }
        let params = Params {
            int: all[0].1,
            opt: all[2].1,
            klass: all[3].1,
            all,
        };

        let mut block = entry;
        for _ in 0..self.rng.gen_range(1..10) {
            let (ty, x) = params.all[self.rng.gen_range(0..params.all.len())].clone();
            block = match self.rng.gen_range(0..10) {
                0 => copy_and_destroy(&mut func, block, x, false),
                1 => copy_and_destroy(&mut func, block, x, true),
                2 => borrow_scope(&mut func, block, x),
                3 => through_memory(&mut func, block, &ty, x),
                4 => store_borrowed(&mut func, block, &ty, x),
                5 => unwrap_again(&mut func, block, x),
                6 => aggregate(&mut func, block, &params, self.rng.gen_bool(0.5)),
                7 => enum_payload(&mut func, block, &params),
                8 => switch_on_enum(&mut func, block, &params),
                _ => phi(&mut func, block, &ty, x),
            };
        }

        let mut b = Builder::at_end(&mut func, block);
        let unit = b.tuple(vec![]);
        b.return_(unit);
        func
    }
}

fn copy_and_destroy(func: &mut Function, block: BlockId, x: ValueId, explicit: bool) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(x);
    let c = if explicit {
        b.explicit_copy_value(w)
    } else {
        b.copy_value(w)
    };
    b.destroy_value(c);
    b.destroy_value(w);
    block
}

fn borrow_scope(func: &mut Function, block: BlockId, x: ValueId) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(x);
    let borrowed = b.begin_borrow(w);
    b.debug_value(borrowed, "borrowed");
    b.end_borrow(borrowed);
    b.destroy_value(w);
    block
}

fn through_memory(func: &mut Function, block: BlockId, ty: &Type, x: ValueId) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(x);
    let slot = b.alloc_stack(ty.clone().move_only());
    b.store(w, slot, StoreOwnershipQualifier::Init).unwrap();
    let borrowed = b.load_borrow(slot).unwrap();
    b.end_borrow(borrowed);
    let taken = b.load(slot, LoadOwnershipQualifier::Take).unwrap();
    b.destroy_value(taken);
    b.dealloc_stack(slot);
    block
}

fn store_borrowed(func: &mut Function, block: BlockId, ty: &Type, x: ValueId) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(x);
    let slot = b.alloc_stack(ty.clone().move_only());
    let borrowed = b.begin_borrow(w);
    b.store_borrow(borrowed, slot).unwrap();
    b.dealloc_stack(slot);
    b.end_borrow(borrowed);
    b.destroy_value(w);
    block
}

fn unwrap_again(func: &mut Function, block: BlockId, x: ValueId) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(x);
    let u = b.move_only_wrapper_to_copyable(w);
    b.debug_value(u, "u");
    let trivial = b.func().is_trivial(b.func().value_type(u));
    if !trivial {
        b.destroy_value(u);
    }
    block
}

fn aggregate(func: &mut Function, block: BlockId, params: &Params, destructure: bool) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let first = b.copyable_to_move_only_wrapper(params.int);
    let (ty, second) = if destructure {
        (Type::structure("Holder"), b.copyable_to_move_only_wrapper(params.klass))
    } else {
        (Type::structure("Point"), b.copyable_to_move_only_wrapper(params.int))
    };
    let s = b.struct_(ty.move_only(), vec![first, second]);
    let field = b.struct_extract(s, 0).unwrap();
    b.debug_value(field, "field");
    if destructure {
        for part in b.destructure_struct(s).unwrap() {
            b.destroy_value(part);
        }
    } else {
        b.destroy_value(s);
    }
    block
}

fn enum_payload(func: &mut Function, block: BlockId, params: &Params) -> BlockId {
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(params.int);
    let some = b.enum_(Type::enumeration("MaybeInt").move_only(), 1, Some(w));
    let payload = b.unchecked_enum_data(some, 1).unwrap();
    b.destroy_value(payload);
    block
}

fn switch_on_enum(func: &mut Function, block: BlockId, params: &Params) -> BlockId {
    let some_bb = func.add_block();
    let none_bb = func.add_block();
    let join = func.add_block();
    let payload = func.add_argument(
        some_bb,
        SilType::object(Type::int(64).move_only()),
        OwnershipKind::Owned,
    );
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(params.opt);
    b.switch_enum(w, vec![(1, some_bb)], Some(none_bb));
    b.position_at_end(some_bb);
    b.destroy_value(payload);
    b.branch(join, vec![]);
    b.position_at_end(none_bb);
    b.branch(join, vec![]);
    join
}

fn phi(func: &mut Function, block: BlockId, ty: &Type, x: ValueId) -> BlockId {
    let next = func.add_block();
    let arg = func.add_argument(
        next,
        SilType::object(ty.clone().move_only()),
        OwnershipKind::Owned,
    );
    let mut b = Builder::at_end(func, block);
    let w = b.copyable_to_move_only_wrapper(x);
    b.branch(next, vec![w]);
    b.position_at_end(next);
    b.destroy_value(arg);
    next
}

// ============================================================================
// Helpers
// ============================================================================

fn generate(seed: u64) -> Function {
    FunctionGen::new(seed).generate(&format!("gen{}", seed))
}

/// Wrapped values outside the signature, with whether their unwrapped type
/// is trivial.
fn wrapped_values(func: &Function) -> Vec<(ValueId, bool)> {
    let mut values = Vec::new();
    for block in func.blocks() {
        let args = if block.is_entry() { &[][..] } else { block.args() };
        let results = block
            .insts()
            .iter()
            .flat_map(|&i| func.inst(i).results().iter().copied());
        for value in args.iter().copied().chain(results) {
            let ty = func.value_type(value);
            if ty.is_move_only_wrapped() {
                values.push((value, func.is_trivial(&ty.removing_move_only_wrapper())));
            }
        }
    }
    values
}

fn live_values(func: &Function) -> Vec<ValueId> {
    let mut values = Vec::new();
    for block in func.blocks() {
        values.extend_from_slice(block.args());
        for &inst in block.insts() {
            values.extend_from_slice(func.inst(inst).results());
        }
    }
    values
}

fn instruction_kinds(func: &Function) -> Vec<&'static str> {
    func.instructions()
        .map(|i| func.inst(i).kind().name())
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_generated_functions_are_well_formed() {
    for seed in SEEDS {
        let func = generate(seed);
        assert_eq!(verify_function(&func), Ok(()), "seed {}", seed);
    }
}

#[test]
fn test_elimination_is_idempotent() {
    for seed in SEEDS {
        for mode in [EliminationMode::TrivialOnly, EliminationMode::All] {
            let mut func = generate(seed);
            eliminate_move_only_types(&mut func, mode);
            assert!(
                !eliminate_move_only_types(&mut func, mode),
                "seed {} mode {:?} changed on the second run",
                seed,
                mode
            );
        }
    }
}

#[test]
fn test_trivial_only_strips_exactly_the_trivial_values() {
    for seed in SEEDS {
        let original = generate(seed);
        let wrapped = wrapped_values(&original);

        let mut trivial_only = original.clone();
        eliminate_move_only_types(&mut trivial_only, EliminationMode::TrivialOnly);
        let mut all = original.clone();
        eliminate_move_only_types(&mut all, EliminationMode::All);

        for &(value, trivial) in &wrapped {
            let stripped_early = !trivial_only.value_type(value).is_move_only_wrapped();
            let stripped_late = !all.value_type(value).is_move_only_wrapped();
            assert_eq!(stripped_early, trivial, "seed {} value {}", seed, value);
            assert!(stripped_late, "seed {} value {}", seed, value);
        }
    }
}

#[test]
fn test_trivial_values_have_no_ownership() {
    for seed in SEEDS {
        for mode in [EliminationMode::TrivialOnly, EliminationMode::All] {
            let mut func = generate(seed);
            eliminate_move_only_types(&mut func, mode);
            for value in live_values(&func) {
                let ty = func.value_type(value);
                if ty.is_object() && func.is_trivial(ty) {
                    assert_eq!(
                        func.ownership_kind(value),
                        OwnershipKind::None,
                        "seed {} value {}",
                        seed,
                        value
                    );
                }
            }
        }
    }
}

#[test]
fn test_no_dangling_uses_after_repair() {
    for seed in SEEDS {
        for mode in [EliminationMode::TrivialOnly, EliminationMode::All] {
            let mut func = generate(seed);
            eliminate_move_only_types(&mut func, mode);
            assert_eq!(verify_function(&func), Ok(()), "seed {} mode {:?}", seed, mode);
            for inst in func.instructions() {
                for operand in func.inst(inst).kind().operands() {
                    assert!(func.is_value_live(operand), "seed {} {}", seed, inst);
                }
            }
        }
    }
}

#[test]
fn test_full_elimination_leaves_no_wrapped_values() {
    for seed in SEEDS {
        let mut func = generate(seed);
        eliminate_move_only_types(&mut func, EliminationMode::All);
        assert_eq!(verify_no_move_only_wrapped(&func), Ok(()), "seed {}", seed);
    }
}

#[test]
fn test_staged_elimination_matches_direct_elimination() {
    for seed in SEEDS {
        let mut staged = generate(seed);
        eliminate_move_only_types(&mut staged, EliminationMode::TrivialOnly);
        eliminate_move_only_types(&mut staged, EliminationMode::All);

        let mut direct = generate(seed);
        eliminate_move_only_types(&mut direct, EliminationMode::All);

        assert_eq!(
            instruction_kinds(&staged),
            instruction_kinds(&direct),
            "seed {}",
            seed
        );
    }
}
