//! Ownership SSA Benchmarks
//!
//! Performance benchmarks for the IR and its passes.
//! Run with: cargo bench -p ossa-benchmarks

// Cargo needs a lib target; the benchmarks live in benches/.
