//! Move-only type elimination.
//!
//! After the move checker has run, the move-only wrapper has done its job
//! and is erased from every value of a function. Removing the wrapper can
//! make a value trivial, which in turn invalidates instructions that only
//! make sense for values with a lifetime: copies, borrows, destroys,
//! ownership-qualified memory operations and forwarding ownership kinds.
//!
//! Elimination runs in two phases:
//!
//! 1. **Scan**: strip the wrapper from every eligible block argument and
//!    instruction result, collecting the producers and the
//!    non-type-dependent users of each stripped value.
//! 2. **Repair**: visit each collected instruction exactly once and apply
//!    the repair policy of its kind.
//!
//! All type rewrites finish before any repair starts, so no repair depends
//! on the order instructions are visited in, and a single drain of the
//! worklist suffices.

use indexmap::IndexSet;
use ossa_ir::{
    Builder, Function, InstId, InstKind, LoadOwnershipQualifier, OwnershipKind, SilStage,
    StoreOwnershipQualifier, ValueId,
};
use tracing::{debug, error, info, trace};

use crate::pass::{FunctionPass, InvalidationKind};

// ============================================================================
// Configuration
// ============================================================================

/// Which wrapped values the eliminator strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EliminationMode {
    /// Only values whose unwrapped type is trivial. Used early in the
    /// mandatory pipeline, before non-trivial move-only values are checked.
    TrivialOnly,
    /// Every wrapped value.
    #[default]
    All,
}

impl EliminationMode {
    pub fn is_trivial_only(self) -> bool {
        self == EliminationMode::TrivialOnly
    }
}

/// Counters describing one elimination run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EliminationStats {
    /// Block arguments whose wrapper was removed
    pub arguments_stripped: usize,
    /// Instruction results whose wrapper was removed
    pub results_stripped: usize,
    /// Instructions drained from the worklist
    pub instructions_visited: usize,
    /// Instructions modified in place
    pub instructions_updated: usize,
    /// Instructions erased, including rewritten borrow-scoped memory ops
    pub instructions_erased: usize,
}

impl EliminationStats {
    /// Whether any value was stripped.
    pub fn changed(&self) -> bool {
        self.arguments_stripped + self.results_stripped > 0
    }
}

// ============================================================================
// Pass
// ============================================================================

/// Function pass wrapping [`eliminate_move_only_types`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOnlyTypeEliminator {
    mode: EliminationMode,
}

impl MoveOnlyTypeEliminator {
    pub fn new(mode: EliminationMode) -> Self {
        Self { mode }
    }

    /// The early flavour, stripping only trivial values.
    pub fn trivial_only() -> Self {
        Self::new(EliminationMode::TrivialOnly)
    }

    pub fn mode(&self) -> EliminationMode {
        self.mode
    }
}

impl FunctionPass for MoveOnlyTypeEliminator {
    fn name(&self) -> &'static str {
        match self.mode {
            EliminationMode::TrivialOnly => "trivial-move-only-type-eliminator",
            EliminationMode::All => "move-only-type-eliminator",
        }
    }

    fn run(&mut self, func: &mut Function) -> InvalidationKind {
        if eliminate_move_only_types(func, self.mode) {
            // Block structure and edges are never touched.
            InvalidationKind::Instructions
        } else {
            InvalidationKind::Nothing
        }
    }
}

/// Strip the move-only wrapper from `func` and repair the instructions that
/// depended on it. Returns whether anything changed.
///
/// Functions deserialized from an already canonical module are skipped:
/// their wrappers were eliminated before serialization.
///
/// # Panics
///
/// Panics if `func` is not in raw form, or if a stripped value reaches an
/// instruction kind the eliminator has no repair policy for.
pub fn eliminate_move_only_types(func: &mut Function, mode: EliminationMode) -> bool {
    eliminate_move_only_types_with_stats(func, mode).changed()
}

/// Like [`eliminate_move_only_types`], returning the run's counters.
pub fn eliminate_move_only_types_with_stats(
    func: &mut Function,
    mode: EliminationMode,
) -> EliminationStats {
    if func.was_deserialized_canonical() {
        debug!(function = func.name(), "skipping deserialized canonical function");
        return EliminationStats::default();
    }
    assert_eq!(
        func.stage(),
        SilStage::Raw,
        "move-only type elimination only runs on raw functions (@{})",
        func.name()
    );

    let mut eliminator = Eliminator {
        func,
        mode,
        touched_args: IndexSet::new(),
        touched_insts: IndexSet::new(),
        stats: EliminationStats::default(),
    };
    eliminator.scan();
    eliminator.repair();

    let stats = eliminator.stats;
    if stats.changed() {
        info!(
            function = eliminator.func.name(),
            ?mode,
            arguments = stats.arguments_stripped,
            results = stats.results_stripped,
            updated = stats.instructions_updated,
            erased = stats.instructions_erased,
            "eliminated move-only types"
        );
    }
    stats
}

// ============================================================================
// Repair Policies
// ============================================================================

/// How an instruction is repaired once the values around it lost their
/// wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepairPolicy {
    /// `load`: qualify as `[trivial]` if the loaded type is trivial.
    QualifyTrivialLoad,
    /// `store`: qualify as `[trivial]` if the stored type is trivial.
    QualifyTrivialStore,
    /// `load_borrow`: replace by `load [trivial]` if the type is trivial.
    RewriteTrivialLoadBorrow,
    /// `store_borrow`: replace by `store [trivial]` if the type is trivial.
    RewriteTrivialStoreBorrow,
    /// Copies and borrows of a trivial value are identities.
    ForwardOperandIfTrivialResult,
    /// Wrapper conversions are identities once the wrapper is gone.
    ForwardOperand,
    /// Lifetime ends of a trivial value are dropped.
    EraseIfTrivialOperand,
    /// Forwarding extraction from a trivial operand forwards no ownership.
    /// Covers destructures as well as single-field extraction.
    ClearForwardingIfTrivialOperand,
    /// Forwarding construction of a trivial result forwards no ownership.
    ClearForwardingIfTrivialResult,
    /// The instruction stays valid as is.
    NoUpdate,
}

/// The repair policy of each instruction kind, or `None` for kinds that
/// must never see a stripped value.
fn repair_policy(kind: &InstKind) -> Option<RepairPolicy> {
    use RepairPolicy::*;

    let policy = match kind {
        InstKind::Load { .. } => QualifyTrivialLoad,
        InstKind::Store { .. } => QualifyTrivialStore,
        InstKind::LoadBorrow { .. } => RewriteTrivialLoadBorrow,
        InstKind::StoreBorrow { .. } => RewriteTrivialStoreBorrow,

        InstKind::CopyValue { .. }
        | InstKind::ExplicitCopyValue { .. }
        | InstKind::BeginBorrow { .. } => ForwardOperandIfTrivialResult,

        InstKind::MoveOnlyWrapperToCopyableValue { .. }
        | InstKind::CopyableToMoveOnlyWrapperValue { .. } => ForwardOperand,

        InstKind::DestroyValue { .. } | InstKind::EndBorrow { .. } => EraseIfTrivialOperand,

        InstKind::StructExtract { .. }
        | InstKind::TupleExtract { .. }
        | InstKind::UncheckedEnumData { .. }
        | InstKind::DestructureStruct { .. }
        | InstKind::DestructureTuple { .. }
        | InstKind::SwitchEnum { .. } => ClearForwardingIfTrivialOperand,

        InstKind::Struct { .. } | InstKind::Tuple { .. } | InstKind::Enum { .. } => {
            ClearForwardingIfTrivialResult
        }

        InstKind::AllocStack { .. }
        | InstKind::DeallocStack { .. }
        | InstKind::DestroyAddr { .. }
        | InstKind::DebugValue { .. }
        | InstKind::StructElementAddr { .. }
        | InstKind::TupleElementAddr { .. }
        | InstKind::UncheckedTakeEnumDataAddr { .. }
        | InstKind::RefElementAddr { .. }
        | InstKind::UncheckedAddrCast { .. }
        | InstKind::SelectEnum { .. }
        | InstKind::SelectValue { .. }
        | InstKind::MarkDependence { .. }
        | InstKind::Upcast { .. }
        | InstKind::UnconditionalCheckedCast { .. }
        | InstKind::OpenExistentialRef { .. }
        | InstKind::ConvertFunction { .. }
        | InstKind::RefToBridgeObject { .. }
        | InstKind::BridgeObjectToRef { .. }
        | InstKind::ClassMethod { .. }
        | InstKind::Branch { .. }
        | InstKind::CheckedCastBranch { .. } => NoUpdate,

        InstKind::IntegerLiteral { .. }
        | InstKind::FunctionRef { .. }
        | InstKind::Apply { .. }
        | InstKind::UncheckedOwnershipConversion { .. }
        | InstKind::CondBranch { .. }
        | InstKind::Return { .. }
        | InstKind::Unreachable => return None,
    };
    Some(policy)
}

// ============================================================================
// Eliminator
// ============================================================================

struct Eliminator<'f> {
    func: &'f mut Function,
    mode: EliminationMode,
    touched_args: IndexSet<ValueId>,
    touched_insts: IndexSet<InstId>,
    stats: EliminationStats,
}

impl<'f> Eliminator<'f> {
    /// Strip `value` if it is wrapped and the mode allows it. Returns
    /// whether the value was stripped.
    fn strip(&mut self, value: ValueId) -> bool {
        let ty = self.func.value_type(value);
        if !ty.is_move_only_wrapped() {
            return false;
        }
        if self.mode.is_trivial_only() && !self.func.is_trivial(&ty.removing_move_only_wrapper()) {
            return false;
        }
        let stripped = self.func.unsafely_eliminate_move_only_wrapper(value);
        debug_assert!(stripped);
        debug!(value = %value, ty = %self.func.value_type(value), "stripped move-only wrapper");
        true
    }

    fn record_users(&mut self, value: ValueId) {
        let users: Vec<InstId> = self
            .func
            .non_type_dependent_uses(value)
            .map(|u| u.user)
            .collect();
        self.touched_insts.extend(users);
    }

    fn scan(&mut self) {
        let blocks: Vec<_> = self
            .func
            .blocks()
            .iter()
            .map(|bb| (bb.is_entry(), bb.args().to_vec(), bb.insts().to_vec()))
            .collect();

        for (is_entry, args, insts) in blocks {
            // Entry arguments belong to the signature; wrapped parameters
            // are converted in the prologue instead.
            if !is_entry {
                for arg in args {
                    if !self.strip(arg) {
                        continue;
                    }
                    if self.func.is_trivial(self.func.value_type(arg)) {
                        self.func.set_argument_ownership_kind(arg, OwnershipKind::None);
                    }
                    self.touched_args.insert(arg);
                    self.record_users(arg);
                    self.stats.arguments_stripped += 1;
                }
            }

            for inst in insts {
                let results = self.func.inst(inst).results().to_vec();
                for result in results {
                    if !self.strip(result) {
                        continue;
                    }
                    self.touched_insts.insert(inst);
                    self.record_users(result);
                    self.stats.results_stripped += 1;
                }
            }
        }
        trace!(
            arguments = self.touched_args.len(),
            instructions = self.touched_insts.len(),
            "scanned function"
        );
    }

    fn repair(&mut self) {
        while let Some(inst) = self.touched_insts.pop() {
            debug_assert!(self.func.is_live(inst), "{} visited after erasure", inst);
            self.stats.instructions_visited += 1;
            self.visit(inst);
        }
    }

    fn visit(&mut self, inst: InstId) {
        let kind = self.func.inst(inst).kind();
        let Some(policy) = repair_policy(kind) else {
            let name = kind.name();
            error!(
                inst = %inst,
                kind = name,
                function = self.func.name(),
                "no move-only repair policy"
            );
            panic!(
                "move-only type eliminator reached {} ({}) in @{}, which has no repair policy",
                inst,
                name,
                self.func.name()
            );
        };

        match policy {
            RepairPolicy::QualifyTrivialLoad => {
                if self.result_is_trivial(inst) {
                    self.func.set_load_qualifier(inst, LoadOwnershipQualifier::Trivial);
                    self.updated(inst);
                }
            }
            RepairPolicy::QualifyTrivialStore => {
                if self.operand_is_trivial(inst) {
                    self.func.set_store_qualifier(inst, StoreOwnershipQualifier::Trivial);
                    self.updated(inst);
                }
            }
            RepairPolicy::RewriteTrivialLoadBorrow => {
                if self.result_is_trivial(inst) {
                    let address = self.first_operand(inst);
                    let old = self.func.inst(inst).result();
                    let new = match Builder::before(self.func, inst)
                        .emit_load_value_operation(address, LoadOwnershipQualifier::Trivial)
                    {
                        Ok(value) => value,
                        Err(err) => panic!("cannot rewrite {} as a load: {}", inst, err),
                    };
                    self.func.replace_all_uses_with(old, new);
                    self.erase(inst);
                }
            }
            RepairPolicy::RewriteTrivialStoreBorrow => {
                if self.operand_is_trivial(inst) {
                    let (src, dest) = match self.func.inst(inst).kind() {
                        InstKind::StoreBorrow { src, dest } => (*src, *dest),
                        other => unreachable!("store_borrow policy on {}", other.name()),
                    };
                    if let Err(err) = Builder::before(self.func, inst).emit_store_value_operation(
                        src,
                        dest,
                        StoreOwnershipQualifier::Trivial,
                    ) {
                        panic!("cannot rewrite {} as a store: {}", inst, err);
                    }
                    self.erase(inst);
                }
            }
            RepairPolicy::ForwardOperandIfTrivialResult => {
                if self.result_is_trivial(inst) {
                    self.forward_operand(inst);
                }
            }
            RepairPolicy::ForwardOperand => self.forward_operand(inst),
            RepairPolicy::EraseIfTrivialOperand => {
                if self.operand_is_trivial(inst) {
                    self.erase(inst);
                }
            }
            RepairPolicy::ClearForwardingIfTrivialOperand => {
                if self.operand_is_trivial(inst) {
                    self.clear_forwarding(inst);
                }
            }
            RepairPolicy::ClearForwardingIfTrivialResult => {
                if self.result_is_trivial(inst) {
                    self.clear_forwarding(inst);
                }
            }
            RepairPolicy::NoUpdate => {}
        }
    }

    fn first_operand(&self, inst: InstId) -> ValueId {
        self.func.inst(inst).kind().operands()[0]
    }

    fn operand_is_trivial(&self, inst: InstId) -> bool {
        let operand = self.first_operand(inst);
        self.func.is_trivial(self.func.value_type(operand))
    }

    fn result_is_trivial(&self, inst: InstId) -> bool {
        let result = self.func.inst(inst).result();
        self.func.is_trivial(self.func.value_type(result))
    }

    /// Replace the result of `inst` by its operand and erase `inst`.
    ///
    /// Entry arguments keep their wrapper, so an operand may still be
    /// wrapped while the result is not. Such an operand is unwrapped with an
    /// explicit conversion first.
    fn forward_operand(&mut self, inst: InstId) {
        let operand = self.first_operand(inst);
        let result = self.func.inst(inst).result();
        let replacement = if self.func.value_type(operand) == self.func.value_type(result) {
            operand
        } else {
            debug_assert!(self.func.value_type(operand).is_move_only_wrapped());
            let unwrapped = Builder::before(self.func, inst).move_only_wrapper_to_copyable(operand);
            debug!(value = %unwrapped, operand = %operand, "unwrapped entry argument");
            unwrapped
        };
        self.func.replace_all_uses_with(result, replacement);
        self.erase(inst);
    }

    fn clear_forwarding(&mut self, inst: InstId) {
        self.func.set_forwarding_ownership_kind(inst, OwnershipKind::None);
        self.updated(inst);
    }

    fn updated(&mut self, inst: InstId) {
        debug!(inst = %inst, kind = self.func.inst(inst).kind().name(), "updated instruction");
        self.stats.instructions_updated += 1;
    }

    fn erase(&mut self, inst: InstId) {
        debug!(inst = %inst, kind = self.func.inst(inst).kind().name(), "erasing instruction");
        self.func.erase_instruction(inst);
        self.stats.instructions_erased += 1;
    }
}
