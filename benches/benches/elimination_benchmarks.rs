//! Move-Only Type Elimination Benchmarks
//!
//! Measures the eliminator and the verifier on synthetic raw functions
//! made of a chain of blocks, each passing wrapped values through a phi.

use std::sync::Arc;

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use ossa_ir::{verify_function, Builder, Function, OwnershipKind, SilType, Type, TypeTable};
use ossa_opt::{eliminate_move_only_types, EliminationMode};

const SIZES: [usize; 3] = [16, 128, 1024];

/// A function with `blocks` blocks after the entry, each receiving a
/// wrapped integer and a wrapped class reference as phi arguments.
fn chain_function(blocks: usize) -> Function {
    let mut types = TypeTable::new();
    types.declare_class("Klass", vec![Type::int(64)]).unwrap();

    let mut func = Function::new(format!("chain{}", blocks), Arc::new(types));
    let entry = func.add_block();
    let int = func.add_argument(entry, SilType::object(Type::int(64)), OwnershipKind::None);
    let klass = func.add_argument(
        entry,
        SilType::object(Type::class("Klass")),
        OwnershipKind::Owned,
    );

    let mut current = entry;
    for _ in 0..blocks {
        let next = func.add_block();
        let a = func.add_argument(
            next,
            SilType::object(Type::int(64).move_only()),
            OwnershipKind::Owned,
        );
        let k = func.add_argument(
            next,
            SilType::object(Type::class("Klass").move_only()),
            OwnershipKind::Owned,
        );

        let mut b = Builder::at_end(&mut func, current);
        let wa = b.copyable_to_move_only_wrapper(int);
        let wk = b.copyable_to_move_only_wrapper(klass);
        b.branch(next, vec![wa, wk]);

        b.position_at_end(next);
        let copy = b.copy_value(a);
        let borrowed = b.begin_borrow(k);
        b.debug_value(borrowed, "k");
        b.end_borrow(borrowed);
        b.destroy_value(copy);
        b.destroy_value(a);
        b.destroy_value(k);
        current = next;
    }

    let mut b = Builder::at_end(&mut func, current);
    let unit = b.tuple(vec![]);
    b.return_(unit);
    func
}

// ============================================================================
// Elimination Benchmarks
// ============================================================================

fn bench_elimination(c: &mut Criterion) {
    let mut group = c.benchmark_group("move_only_elimination");

    for size in SIZES {
        let func = chain_function(size);
        group.throughput(Throughput::Elements(func.instruction_count() as u64));

        for (label, mode) in [
            ("trivial_only", EliminationMode::TrivialOnly),
            ("all", EliminationMode::All),
        ] {
            group.bench_with_input(BenchmarkId::new(label, size), &func, |b, func| {
                b.iter_batched(
                    || func.clone(),
                    |mut func| black_box(eliminate_move_only_types(&mut func, mode)),
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

// ============================================================================
// Verifier Benchmarks
// ============================================================================

fn bench_verifier(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_function");

    for size in SIZES {
        let mut func = chain_function(size);
        eliminate_move_only_types(&mut func, EliminationMode::All);
        group.throughput(Throughput::Elements(func.instruction_count() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &func, |b, func| {
            b.iter(|| black_box(verify_function(black_box(func)).is_ok()))
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Main
// ============================================================================

criterion_group!(benches, bench_elimination, bench_verifier);

criterion_main!(benches);
