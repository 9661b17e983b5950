//! Functions, basic blocks and SSA values.
//!
//! A [`Function`] owns three arenas (blocks, instructions, values) indexed
//! by [`BlockId`], [`InstId`] and [`ValueId`]. Every value keeps a use list
//! that mirrors the operands of the instructions using it, so consumers can
//! be enumerated without scanning the body.
//!
//! Erased instructions stay in the arena, marked dead, so stale ids never
//! alias a newer instruction.

use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;
use tracing::trace;

use crate::inst::InstKind;
use crate::ownership::{LoadOwnershipQualifier, OwnershipKind, StoreOwnershipQualifier};
use crate::types::{SilType, TypeTable};

// ============================================================================
// Identifiers
// ============================================================================

/// SSA value identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Instruction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst#{}", self.0)
    }
}

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The entry block (block 0)
    pub const ENTRY: BlockId = BlockId(0);
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Pipeline stage of a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SilStage {
    /// Straight out of IR generation; mandatory passes have not run yet.
    #[default]
    Raw,
    /// Mandatory passes have run.
    Canonical,
    /// Address-lowered, ready for code generation.
    Lowered,
}

impl fmt::Display for SilStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SilStage::Raw => write!(f, "raw"),
            SilStage::Canonical => write!(f, "canonical"),
            SilStage::Lowered => write!(f, "lowered"),
        }
    }
}

// ============================================================================
// Values and Uses
// ============================================================================

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Block argument. Arguments carry their own ownership kind.
    Argument {
        block: BlockId,
        index: u32,
        ownership: OwnershipKind,
    },
    /// Result `index` of an instruction.
    Result { inst: InstId, index: u32 },
}

/// One operand edge from a value to an instruction using it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: InstId,
    /// The use only records a type dependency and carries no data.
    pub type_dependent: bool,
}

#[derive(Debug, Clone)]
struct ValueData {
    ty: SilType,
    def: ValueDef,
    uses: Vec<Use>,
}

// ============================================================================
// Instructions and Blocks
// ============================================================================

/// An instruction as stored in its function.
#[derive(Debug, Clone)]
pub struct InstData {
    kind: InstKind,
    results: Vec<ValueId>,
    type_dependent_operands: Vec<ValueId>,
    block: BlockId,
    erased: bool,
}

impl InstData {
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    pub fn results(&self) -> &[ValueId] {
        &self.results
    }

    /// The single result. Panics if the instruction has none.
    pub fn result(&self) -> ValueId {
        self.results[0]
    }

    pub fn type_dependent_operands(&self) -> &[ValueId] {
        &self.type_dependent_operands
    }

    /// Block the instruction lives (or lived) in.
    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

/// A basic block: arguments followed by an ordered instruction list.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    id: BlockId,
    args: Vec<ValueId>,
    insts: Vec<InstId>,
}

impl BasicBlock {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    pub fn is_entry(&self) -> bool {
        self.id == BlockId::ENTRY
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A function body in ownership SSA form.
#[derive(Debug, Clone)]
pub struct Function {
    name: SmolStr,
    stage: SilStage,
    deserialized_canonical: bool,
    types: Arc<TypeTable>,
    blocks: Vec<BasicBlock>,
    insts: Vec<InstData>,
    values: Vec<ValueData>,
}

impl Function {
    pub fn new(name: impl Into<SmolStr>, types: Arc<TypeTable>) -> Self {
        Self {
            name: name.into(),
            stage: SilStage::Raw,
            deserialized_canonical: false,
            types,
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> SilStage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: SilStage) {
        self.stage = stage;
    }

    /// Whether this body was imported from an already canonical module.
    pub fn was_deserialized_canonical(&self) -> bool {
        self.deserialized_canonical
    }

    pub fn set_deserialized_canonical(&mut self, deserialized: bool) {
        self.deserialized_canonical = deserialized;
    }

    /// Layout context used for triviality queries.
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Whether `ty` is trivial in this function's layout context.
    pub fn is_trivial(&self, ty: &SilType) -> bool {
        self.types.is_trivial(ty.ast_type())
    }

    // ------------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------------

    /// Append a new block in layout order. The first block is the entry.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            args: Vec::new(),
            insts: Vec::new(),
        });
        id
    }

    /// Append an argument to `block`.
    pub fn add_argument(
        &mut self,
        block: BlockId,
        ty: SilType,
        ownership: OwnershipKind,
    ) -> ValueId {
        let index = self.blocks[block.0 as usize].args.len() as u32;
        let value = self.push_value(
            ty,
            ValueDef::Argument {
                block,
                index,
                ownership,
            },
        );
        self.blocks[block.0 as usize].args.push(value);
        value
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    // ------------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------------

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.0 as usize]
    }

    pub fn is_live(&self, id: InstId) -> bool {
        !self.insts[id.0 as usize].erased
    }

    /// Live instructions in layout order.
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.blocks.iter().flat_map(|bb| bb.insts.iter().copied())
    }

    /// Number of live instructions.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|bb| bb.insts.len()).sum()
    }

    /// Insert a new instruction at `position` within `block`, creating one
    /// result value per entry of `result_types`.
    pub fn insert_instruction(
        &mut self,
        block: BlockId,
        position: usize,
        kind: InstKind,
        result_types: Vec<SilType>,
    ) -> InstId {
        let id = InstId(self.insts.len() as u32);
        for operand in kind.operands() {
            self.values[operand.0 as usize].uses.push(Use {
                user: id,
                type_dependent: false,
            });
        }
        self.insts.push(InstData {
            kind,
            results: Vec::with_capacity(result_types.len()),
            type_dependent_operands: Vec::new(),
            block,
            erased: false,
        });
        for (index, ty) in result_types.into_iter().enumerate() {
            let value = self.push_value(
                ty,
                ValueDef::Result {
                    inst: id,
                    index: index as u32,
                },
            );
            self.insts[id.0 as usize].results.push(value);
        }
        self.blocks[block.0 as usize].insts.insert(position, id);
        id
    }

    /// Record that `inst` depends on the type of `value` without using its
    /// data.
    pub fn add_type_dependent_operand(&mut self, inst: InstId, value: ValueId) {
        self.insts[inst.0 as usize].type_dependent_operands.push(value);
        self.values[value.0 as usize].uses.push(Use {
            user: inst,
            type_dependent: true,
        });
    }

    /// Remove `inst` from its block and drop its operand uses.
    ///
    /// # Panics
    ///
    /// Panics if any result still has uses; callers must redirect them
    /// first.
    pub fn erase_instruction(&mut self, inst: InstId) {
        let data = &self.insts[inst.0 as usize];
        assert!(!data.erased, "{} erased twice", inst);
        for &result in &data.results {
            assert!(
                self.values[result.0 as usize].uses.is_empty(),
                "erasing {} ({}) while {} still has uses",
                inst,
                data.kind.name(),
                result
            );
        }
        trace!(inst = %inst, kind = data.kind.name(), "erasing instruction");

        let block = data.block;
        let mut operands = data.kind.operands();
        operands.extend(data.type_dependent_operands.iter().copied());
        for operand in operands {
            self.values[operand.0 as usize]
                .uses
                .retain(|u| u.user != inst);
        }
        self.blocks[block.0 as usize].insts.retain(|&i| i != inst);
        self.insts[inst.0 as usize].erased = true;
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        debug_assert_eq!(
            self.value_type(old),
            self.value_type(new),
            "replacing {} with a value of a different type",
            old
        );
        let uses = std::mem::take(&mut self.values[old.0 as usize].uses);
        for u in &uses {
            let inst = &mut self.insts[u.user.0 as usize];
            if u.type_dependent {
                for operand in inst.type_dependent_operands.iter_mut() {
                    if *operand == old {
                        *operand = new;
                    }
                }
            } else {
                for operand in inst.kind.operands_mut() {
                    if *operand == old {
                        *operand = new;
                    }
                }
            }
        }
        self.values[new.0 as usize].uses.extend(uses);
    }

    /// Set the forwarding ownership kind of a forwarding instruction.
    ///
    /// # Panics
    ///
    /// Panics if the instruction does not forward ownership.
    pub fn set_forwarding_ownership_kind(&mut self, inst: InstId, kind: OwnershipKind) {
        let data = &mut self.insts[inst.0 as usize];
        let name = data.kind.name();
        assert!(
            data.kind.set_forwarding_ownership(kind),
            "{} is not a forwarding instruction",
            name
        );
    }

    /// Set the ownership qualifier of a `load`.
    ///
    /// # Panics
    ///
    /// Panics if `inst` is not a `load`.
    pub fn set_load_qualifier(&mut self, inst: InstId, new: LoadOwnershipQualifier) {
        match &mut self.insts[inst.0 as usize].kind {
            InstKind::Load { qualifier, .. } => *qualifier = new,
            other => panic!("{} has no load ownership qualifier", other.name()),
        }
    }

    /// Set the ownership qualifier of a `store`.
    ///
    /// # Panics
    ///
    /// Panics if `inst` is not a `store`.
    pub fn set_store_qualifier(&mut self, inst: InstId, new: StoreOwnershipQualifier) {
        match &mut self.insts[inst.0 as usize].kind {
            InstKind::Store { qualifier, .. } => *qualifier = new,
            other => panic!("{} has no store ownership qualifier", other.name()),
        }
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    fn push_value(&mut self, ty: SilType, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            def,
            uses: Vec::new(),
        });
        id
    }

    pub fn value_type(&self, value: ValueId) -> &SilType {
        &self.values[value.0 as usize].ty
    }

    pub fn value_def(&self, value: ValueId) -> ValueDef {
        self.values[value.0 as usize].def
    }

    /// The defining instruction of an instruction result.
    pub fn defining_inst(&self, value: ValueId) -> Option<InstId> {
        match self.value_def(value) {
            ValueDef::Result { inst, .. } => Some(inst),
            ValueDef::Argument { .. } => None,
        }
    }

    /// Whether the value's definition is still part of the function.
    pub fn is_value_live(&self, value: ValueId) -> bool {
        match self.value_def(value) {
            ValueDef::Argument { .. } => true,
            ValueDef::Result { inst, .. } => self.is_live(inst),
        }
    }

    /// All values ever created, including results of erased instructions.
    pub fn value_ids(&self) -> impl Iterator<Item = ValueId> {
        (0..self.values.len() as u32).map(ValueId)
    }

    pub fn uses(&self, value: ValueId) -> &[Use] {
        &self.values[value.0 as usize].uses
    }

    pub fn has_uses(&self, value: ValueId) -> bool {
        !self.values[value.0 as usize].uses.is_empty()
    }

    /// Uses that carry data, skipping type-dependent ones.
    pub fn non_type_dependent_uses(&self, value: ValueId) -> impl Iterator<Item = &Use> + '_ {
        self.values[value.0 as usize]
            .uses
            .iter()
            .filter(|u| !u.type_dependent)
    }

    /// Ownership kind of a value.
    ///
    /// Arguments report their stored kind. Results derive it from the
    /// defining instruction; forwarding instructions and applies yield
    /// `None` for trivial results.
    pub fn ownership_kind(&self, value: ValueId) -> OwnershipKind {
        let data = &self.values[value.0 as usize];
        match data.def {
            ValueDef::Argument { ownership, .. } => ownership,
            ValueDef::Result { inst, .. } => {
                let kind = &self.insts[inst.0 as usize].kind;
                if kind.has_trivial_result_rule() && self.is_trivial(&data.ty) {
                    OwnershipKind::None
                } else {
                    kind.result_ownership()
                }
            }
        }
    }

    /// Set the ownership kind of a block argument.
    ///
    /// # Panics
    ///
    /// Panics if `arg` is an instruction result.
    pub fn set_argument_ownership_kind(&mut self, arg: ValueId, kind: OwnershipKind) {
        match &mut self.values[arg.0 as usize].def {
            ValueDef::Argument { ownership, .. } => *ownership = kind,
            ValueDef::Result { .. } => panic!("{} is not a block argument", arg),
        }
    }

    /// Reinterpret `value` in place as its type without the move-only
    /// wrapper. Returns `false` if the type was not wrapped.
    ///
    /// This does not touch any instruction. It is sound only because a
    /// wrapped type and its underlying type share a layout; callers are
    /// responsible for repairing every instruction whose well-formedness
    /// depended on the wrapper.
    pub fn unsafely_eliminate_move_only_wrapper(&mut self, value: ValueId) -> bool {
        self.values[value.0 as usize].ty.strip_move_only_in_place()
    }
}

// ============================================================================
// Modules
// ============================================================================

/// A set of functions sharing one type table.
#[derive(Debug, Clone)]
pub struct Module {
    types: Arc<TypeTable>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(types: TypeTable) -> Self {
        Self {
            types: Arc::new(types),
            functions: Vec::new(),
        }
    }

    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    /// Create an empty raw-stage function.
    pub fn add_function(&mut self, name: impl Into<SmolStr>) -> &mut Function {
        let func = Function::new(name, Arc::clone(&self.types));
        self.functions.push(func);
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn int_fn() -> Function {
        Function::new("f", Arc::new(TypeTable::new()))
    }

    #[test]
    fn test_blocks_and_arguments() {
        let mut func = int_fn();
        let entry = func.add_block();
        let bb1 = func.add_block();
        assert_eq!(entry, BlockId::ENTRY);
        assert_eq!(bb1, BlockId(1));

        let arg = func.add_argument(bb1, SilType::object(Type::int(64)), OwnershipKind::None);
        assert_eq!(func.block(bb1).args(), &[arg]);
        assert!(matches!(
            func.value_def(arg),
            ValueDef::Argument { block, index: 0, .. } if block == bb1
        ));
        assert!(func.block(entry).is_entry());
        assert!(!func.block(bb1).is_entry());
    }

    #[test]
    fn test_insert_tracks_uses() {
        let mut func = int_fn();
        let bb0 = func.add_block();
        let arg = func.add_argument(
            bb0,
            SilType::object(Type::int(64).move_only()),
            OwnershipKind::Owned,
        );
        let copy = func.insert_instruction(
            bb0,
            0,
            InstKind::CopyValue { operand: arg },
            vec![SilType::object(Type::int(64).move_only())],
        );
        let copied = func.inst(copy).result();
        let destroy = func.insert_instruction(
            bb0,
            1,
            InstKind::DestroyValue { operand: copied },
            vec![],
        );

        assert_eq!(func.uses(arg).len(), 1);
        assert_eq!(func.uses(arg)[0].user, copy);
        assert_eq!(func.uses(copied)[0].user, destroy);
        assert_eq!(func.instructions().collect::<Vec<_>>(), vec![copy, destroy]);
    }

    #[test]
    fn test_rauw_and_erase() {
        let mut func = int_fn();
        let bb0 = func.add_block();
        let ty = SilType::object(Type::int(64));
        let arg = func.add_argument(bb0, ty.clone(), OwnershipKind::None);
        let copy = func.insert_instruction(
            bb0,
            0,
            InstKind::CopyValue { operand: arg },
            vec![ty.clone()],
        );
        let copied = func.inst(copy).result();
        let ret = func.insert_instruction(bb0, 1, InstKind::Return { operand: copied }, vec![]);

        func.replace_all_uses_with(copied, arg);
        assert!(!func.has_uses(copied));
        assert_eq!(func.inst(ret).kind().operands(), vec![arg]);

        func.erase_instruction(copy);
        assert!(!func.is_live(copy));
        assert!(!func.is_value_live(copied));
        assert_eq!(func.uses(arg), &[Use { user: ret, type_dependent: false }]);
        assert_eq!(func.instruction_count(), 1);
    }

    #[test]
    #[should_panic(expected = "still has uses")]
    fn test_erase_with_uses_panics() {
        let mut func = int_fn();
        let bb0 = func.add_block();
        let ty = SilType::object(Type::int(64));
        let arg = func.add_argument(bb0, ty.clone(), OwnershipKind::None);
        let copy = func.insert_instruction(bb0, 0, InstKind::CopyValue { operand: arg }, vec![ty]);
        let copied = func.inst(copy).result();
        func.insert_instruction(bb0, 1, InstKind::Return { operand: copied }, vec![]);
        func.erase_instruction(copy);
    }

    #[test]
    fn test_type_dependent_uses_are_filtered() {
        let mut func = int_fn();
        let bb0 = func.add_block();
        let ty = SilType::object(Type::int(64));
        let arg = func.add_argument(bb0, ty.clone(), OwnershipKind::None);
        let lit = func.insert_instruction(bb0, 0, InstKind::IntegerLiteral { value: 1 }, vec![ty]);
        func.add_type_dependent_operand(lit, arg);

        assert_eq!(func.uses(arg).len(), 1);
        assert_eq!(func.non_type_dependent_uses(arg).count(), 0);
    }

    #[test]
    fn test_unsafely_eliminate_wrapper_and_argument_ownership() {
        let mut func = int_fn();
        let bb0 = func.add_block();
        let arg = func.add_argument(
            bb0,
            SilType::object(Type::int(32).move_only()),
            OwnershipKind::Owned,
        );
        assert!(func.unsafely_eliminate_move_only_wrapper(arg));
        assert!(!func.unsafely_eliminate_move_only_wrapper(arg));
        assert_eq!(func.value_type(arg), &SilType::object(Type::int(32)));
        assert_eq!(func.ownership_kind(arg), OwnershipKind::Owned);
        func.set_argument_ownership_kind(arg, OwnershipKind::None);
        assert_eq!(func.ownership_kind(arg), OwnershipKind::None);
    }

    #[test]
    fn test_module_functions() {
        let mut module = Module::new(TypeTable::new());
        module.add_function("a");
        module.add_function("b").set_stage(SilStage::Canonical);
        assert_eq!(module.functions().len(), 2);
        assert_eq!(module.function("b").unwrap().stage(), SilStage::Canonical);
        assert!(module.function("c").is_none());
    }
}
