//! Instruction kinds.
//!
//! [`InstKind`] is a closed sum type. Every instruction keeps its value
//! operands inline; results live in the owning [`Function`](crate::Function)
//! and are described by the instruction's result types.

use smol_str::SmolStr;

use crate::function::{BlockId, ValueId};
use crate::ownership::{LoadOwnershipQualifier, OwnershipKind, StoreOwnershipQualifier};

/// The kind of an instruction together with its operands and attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    // Literals and references
    IntegerLiteral {
        value: i128,
    },
    FunctionRef {
        name: SmolStr,
    },
    ClassMethod {
        operand: ValueId,
        method: SmolStr,
    },
    Apply {
        callee: ValueId,
        args: Vec<ValueId>,
    },

    // Stack memory
    AllocStack {
        name: Option<SmolStr>,
    },
    DeallocStack {
        address: ValueId,
    },

    // Memory access
    Load {
        address: ValueId,
        qualifier: LoadOwnershipQualifier,
    },
    Store {
        src: ValueId,
        dest: ValueId,
        qualifier: StoreOwnershipQualifier,
    },
    LoadBorrow {
        address: ValueId,
    },
    StoreBorrow {
        src: ValueId,
        dest: ValueId,
    },
    DestroyAddr {
        address: ValueId,
    },

    // Copies, borrows and lifetime ends
    CopyValue {
        operand: ValueId,
    },
    ExplicitCopyValue {
        operand: ValueId,
    },
    BeginBorrow {
        operand: ValueId,
    },
    EndBorrow {
        operand: ValueId,
    },
    DestroyValue {
        operand: ValueId,
    },
    UncheckedOwnershipConversion {
        operand: ValueId,
        to: OwnershipKind,
    },

    // Move-only wrapper conversions
    MoveOnlyWrapperToCopyableValue {
        operand: ValueId,
        ownership: OwnershipKind,
    },
    CopyableToMoveOnlyWrapperValue {
        operand: ValueId,
        ownership: OwnershipKind,
    },

    // Aggregates
    Struct {
        elements: Vec<ValueId>,
        forwarding: OwnershipKind,
    },
    Tuple {
        elements: Vec<ValueId>,
        forwarding: OwnershipKind,
    },
    Enum {
        case: u32,
        payload: Option<ValueId>,
        forwarding: OwnershipKind,
    },
    StructExtract {
        operand: ValueId,
        field: u32,
        forwarding: OwnershipKind,
    },
    TupleExtract {
        operand: ValueId,
        index: u32,
        forwarding: OwnershipKind,
    },
    UncheckedEnumData {
        operand: ValueId,
        case: u32,
        forwarding: OwnershipKind,
    },
    DestructureStruct {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    DestructureTuple {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    SelectEnum {
        operand: ValueId,
        cases: Vec<(u32, ValueId)>,
        default: Option<ValueId>,
    },
    SelectValue {
        operand: ValueId,
        cases: Vec<(ValueId, ValueId)>,
        default: Option<ValueId>,
    },

    // Address projections
    StructElementAddr {
        address: ValueId,
        field: u32,
    },
    TupleElementAddr {
        address: ValueId,
        index: u32,
    },
    UncheckedTakeEnumDataAddr {
        address: ValueId,
        case: u32,
    },
    RefElementAddr {
        operand: ValueId,
        field: u32,
    },

    // Casts and dependencies
    UncheckedAddrCast {
        address: ValueId,
    },
    Upcast {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    UnconditionalCheckedCast {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    OpenExistentialRef {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    ConvertFunction {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    RefToBridgeObject {
        operand: ValueId,
        bits: ValueId,
        forwarding: OwnershipKind,
    },
    BridgeObjectToRef {
        operand: ValueId,
        forwarding: OwnershipKind,
    },
    MarkDependence {
        value: ValueId,
        base: ValueId,
        forwarding: OwnershipKind,
    },

    // Debug info
    DebugValue {
        operand: ValueId,
        name: SmolStr,
    },

    // Terminators
    Branch {
        dest: BlockId,
        args: Vec<ValueId>,
    },
    CondBranch {
        condition: ValueId,
        true_dest: BlockId,
        true_args: Vec<ValueId>,
        false_dest: BlockId,
        false_args: Vec<ValueId>,
    },
    SwitchEnum {
        operand: ValueId,
        cases: Vec<(u32, BlockId)>,
        default: Option<BlockId>,
        forwarding: OwnershipKind,
    },
    CheckedCastBranch {
        operand: ValueId,
        success: BlockId,
        failure: BlockId,
        forwarding: OwnershipKind,
    },
    Return {
        operand: ValueId,
    },
    Unreachable,
}

impl InstKind {
    /// Textual mnemonic, as printed.
    pub fn name(&self) -> &'static str {
        match self {
            InstKind::IntegerLiteral { .. } => "integer_literal",
            InstKind::FunctionRef { .. } => "function_ref",
            InstKind::ClassMethod { .. } => "class_method",
            InstKind::Apply { .. } => "apply",
            InstKind::AllocStack { .. } => "alloc_stack",
            InstKind::DeallocStack { .. } => "dealloc_stack",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::LoadBorrow { .. } => "load_borrow",
            InstKind::StoreBorrow { .. } => "store_borrow",
            InstKind::DestroyAddr { .. } => "destroy_addr",
            InstKind::CopyValue { .. } => "copy_value",
            InstKind::ExplicitCopyValue { .. } => "explicit_copy_value",
            InstKind::BeginBorrow { .. } => "begin_borrow",
            InstKind::EndBorrow { .. } => "end_borrow",
            InstKind::DestroyValue { .. } => "destroy_value",
            InstKind::UncheckedOwnershipConversion { .. } => "unchecked_ownership_conversion",
            InstKind::MoveOnlyWrapperToCopyableValue { .. } => "moveonlywrapper_to_copyable",
            InstKind::CopyableToMoveOnlyWrapperValue { .. } => "copyable_to_moveonlywrapper",
            InstKind::Struct { .. } => "struct",
            InstKind::Tuple { .. } => "tuple",
            InstKind::Enum { .. } => "enum",
            InstKind::StructExtract { .. } => "struct_extract",
            InstKind::TupleExtract { .. } => "tuple_extract",
            InstKind::UncheckedEnumData { .. } => "unchecked_enum_data",
            InstKind::DestructureStruct { .. } => "destructure_struct",
            InstKind::DestructureTuple { .. } => "destructure_tuple",
            InstKind::SelectEnum { .. } => "select_enum",
            InstKind::SelectValue { .. } => "select_value",
            InstKind::StructElementAddr { .. } => "struct_element_addr",
            InstKind::TupleElementAddr { .. } => "tuple_element_addr",
            InstKind::UncheckedTakeEnumDataAddr { .. } => "unchecked_take_enum_data_addr",
            InstKind::RefElementAddr { .. } => "ref_element_addr",
            InstKind::UncheckedAddrCast { .. } => "unchecked_addr_cast",
            InstKind::Upcast { .. } => "upcast",
            InstKind::UnconditionalCheckedCast { .. } => "unconditional_checked_cast",
            InstKind::OpenExistentialRef { .. } => "open_existential_ref",
            InstKind::ConvertFunction { .. } => "convert_function",
            InstKind::RefToBridgeObject { .. } => "ref_to_bridge_object",
            InstKind::BridgeObjectToRef { .. } => "bridge_object_to_ref",
            InstKind::MarkDependence { .. } => "mark_dependence",
            InstKind::DebugValue { .. } => "debug_value",
            InstKind::Branch { .. } => "br",
            InstKind::CondBranch { .. } => "cond_br",
            InstKind::SwitchEnum { .. } => "switch_enum",
            InstKind::CheckedCastBranch { .. } => "checked_cast_br",
            InstKind::Return { .. } => "return",
            InstKind::Unreachable => "unreachable",
        }
    }

    /// Value operands in order.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstKind::IntegerLiteral { .. }
            | InstKind::FunctionRef { .. }
            | InstKind::AllocStack { .. }
            | InstKind::Unreachable => Vec::new(),

            InstKind::ClassMethod { operand, .. }
            | InstKind::CopyValue { operand }
            | InstKind::ExplicitCopyValue { operand }
            | InstKind::BeginBorrow { operand }
            | InstKind::EndBorrow { operand }
            | InstKind::DestroyValue { operand }
            | InstKind::UncheckedOwnershipConversion { operand, .. }
            | InstKind::MoveOnlyWrapperToCopyableValue { operand, .. }
            | InstKind::CopyableToMoveOnlyWrapperValue { operand, .. }
            | InstKind::StructExtract { operand, .. }
            | InstKind::TupleExtract { operand, .. }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::DestructureStruct { operand, .. }
            | InstKind::DestructureTuple { operand, .. }
            | InstKind::RefElementAddr { operand, .. }
            | InstKind::Upcast { operand, .. }
            | InstKind::UnconditionalCheckedCast { operand, .. }
            | InstKind::OpenExistentialRef { operand, .. }
            | InstKind::ConvertFunction { operand, .. }
            | InstKind::BridgeObjectToRef { operand, .. }
            | InstKind::DebugValue { operand, .. }
            | InstKind::SwitchEnum { operand, .. }
            | InstKind::CheckedCastBranch { operand, .. }
            | InstKind::Return { operand } => vec![*operand],

            InstKind::DeallocStack { address }
            | InstKind::Load { address, .. }
            | InstKind::LoadBorrow { address }
            | InstKind::DestroyAddr { address }
            | InstKind::StructElementAddr { address, .. }
            | InstKind::TupleElementAddr { address, .. }
            | InstKind::UncheckedTakeEnumDataAddr { address, .. }
            | InstKind::UncheckedAddrCast { address } => vec![*address],

            InstKind::Store { src, dest, .. } | InstKind::StoreBorrow { src, dest } => {
                vec![*src, *dest]
            }
            InstKind::RefToBridgeObject { operand, bits, .. } => vec![*operand, *bits],
            InstKind::MarkDependence { value, base, .. } => vec![*value, *base],

            InstKind::Apply { callee, args } => {
                let mut ops = vec![*callee];
                ops.extend(args.iter().copied());
                ops
            }
            InstKind::Struct { elements, .. } | InstKind::Tuple { elements, .. } => {
                elements.clone()
            }
            InstKind::Enum { payload, .. } => payload.iter().copied().collect(),
            InstKind::SelectEnum {
                operand,
                cases,
                default,
            } => {
                let mut ops = vec![*operand];
                ops.extend(cases.iter().map(|(_, v)| *v));
                ops.extend(default.iter().copied());
                ops
            }
            InstKind::SelectValue {
                operand,
                cases,
                default,
            } => {
                let mut ops = vec![*operand];
                for (case, result) in cases {
                    ops.push(*case);
                    ops.push(*result);
                }
                ops.extend(default.iter().copied());
                ops
            }
            InstKind::Branch { args, .. } => args.clone(),
            InstKind::CondBranch {
                condition,
                true_args,
                false_args,
                ..
            } => {
                let mut ops = vec![*condition];
                ops.extend(true_args.iter().copied());
                ops.extend(false_args.iter().copied());
                ops
            }
        }
    }

    /// Mutable references to the value operands, in the same order as
    /// [`InstKind::operands`].
    pub fn operands_mut(&mut self) -> Vec<&mut ValueId> {
        match self {
            InstKind::IntegerLiteral { .. }
            | InstKind::FunctionRef { .. }
            | InstKind::AllocStack { .. }
            | InstKind::Unreachable => Vec::new(),

            InstKind::ClassMethod { operand, .. }
            | InstKind::CopyValue { operand }
            | InstKind::ExplicitCopyValue { operand }
            | InstKind::BeginBorrow { operand }
            | InstKind::EndBorrow { operand }
            | InstKind::DestroyValue { operand }
            | InstKind::UncheckedOwnershipConversion { operand, .. }
            | InstKind::MoveOnlyWrapperToCopyableValue { operand, .. }
            | InstKind::CopyableToMoveOnlyWrapperValue { operand, .. }
            | InstKind::StructExtract { operand, .. }
            | InstKind::TupleExtract { operand, .. }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::DestructureStruct { operand, .. }
            | InstKind::DestructureTuple { operand, .. }
            | InstKind::RefElementAddr { operand, .. }
            | InstKind::Upcast { operand, .. }
            | InstKind::UnconditionalCheckedCast { operand, .. }
            | InstKind::OpenExistentialRef { operand, .. }
            | InstKind::ConvertFunction { operand, .. }
            | InstKind::BridgeObjectToRef { operand, .. }
            | InstKind::DebugValue { operand, .. }
            | InstKind::SwitchEnum { operand, .. }
            | InstKind::CheckedCastBranch { operand, .. }
            | InstKind::Return { operand } => vec![operand],

            InstKind::DeallocStack { address }
            | InstKind::Load { address, .. }
            | InstKind::LoadBorrow { address }
            | InstKind::DestroyAddr { address }
            | InstKind::StructElementAddr { address, .. }
            | InstKind::TupleElementAddr { address, .. }
            | InstKind::UncheckedTakeEnumDataAddr { address, .. }
            | InstKind::UncheckedAddrCast { address } => vec![address],

            InstKind::Store { src, dest, .. } | InstKind::StoreBorrow { src, dest } => {
                vec![src, dest]
            }
            InstKind::RefToBridgeObject { operand, bits, .. } => vec![operand, bits],
            InstKind::MarkDependence { value, base, .. } => vec![value, base],

            InstKind::Apply { callee, args } => {
                let mut ops = vec![callee];
                ops.extend(args.iter_mut());
                ops
            }
            InstKind::Struct { elements, .. } | InstKind::Tuple { elements, .. } => {
                elements.iter_mut().collect()
            }
            InstKind::Enum { payload, .. } => payload.iter_mut().collect(),
            InstKind::SelectEnum {
                operand,
                cases,
                default,
            } => {
                let mut ops = vec![operand];
                ops.extend(cases.iter_mut().map(|(_, v)| v));
                ops.extend(default.iter_mut());
                ops
            }
            InstKind::SelectValue {
                operand,
                cases,
                default,
            } => {
                let mut ops = vec![operand];
                for (case, result) in cases.iter_mut() {
                    ops.push(case);
                    ops.push(result);
                }
                ops.extend(default.iter_mut());
                ops
            }
            InstKind::Branch { args, .. } => args.iter_mut().collect(),
            InstKind::CondBranch {
                condition,
                true_args,
                false_args,
                ..
            } => {
                let mut ops = vec![condition];
                ops.extend(true_args.iter_mut());
                ops.extend(false_args.iter_mut());
                ops
            }
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Branch { .. }
                | InstKind::CondBranch { .. }
                | InstKind::SwitchEnum { .. }
                | InstKind::CheckedCastBranch { .. }
                | InstKind::Return { .. }
                | InstKind::Unreachable
        )
    }

    /// Successor blocks of a terminator, empty for everything else.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Branch { dest, .. } => vec![*dest],
            InstKind::CondBranch {
                true_dest,
                false_dest,
                ..
            } => vec![*true_dest, *false_dest],
            InstKind::SwitchEnum { cases, default, .. } => {
                let mut succs: Vec<_> = cases.iter().map(|(_, bb)| *bb).collect();
                succs.extend(default.iter().copied());
                succs
            }
            InstKind::CheckedCastBranch {
                success, failure, ..
            } => vec![*success, *failure],
            _ => Vec::new(),
        }
    }

    /// Forwarding ownership kind, for instructions whose result ownership
    /// is derived from an operand.
    pub fn forwarding_ownership(&self) -> Option<OwnershipKind> {
        match self {
            InstKind::Struct { forwarding, .. }
            | InstKind::Tuple { forwarding, .. }
            | InstKind::Enum { forwarding, .. }
            | InstKind::StructExtract { forwarding, .. }
            | InstKind::TupleExtract { forwarding, .. }
            | InstKind::UncheckedEnumData { forwarding, .. }
            | InstKind::DestructureStruct { forwarding, .. }
            | InstKind::DestructureTuple { forwarding, .. }
            | InstKind::Upcast { forwarding, .. }
            | InstKind::UnconditionalCheckedCast { forwarding, .. }
            | InstKind::OpenExistentialRef { forwarding, .. }
            | InstKind::ConvertFunction { forwarding, .. }
            | InstKind::RefToBridgeObject { forwarding, .. }
            | InstKind::BridgeObjectToRef { forwarding, .. }
            | InstKind::MarkDependence { forwarding, .. }
            | InstKind::SwitchEnum { forwarding, .. }
            | InstKind::CheckedCastBranch { forwarding, .. } => Some(*forwarding),
            InstKind::MoveOnlyWrapperToCopyableValue { ownership, .. }
            | InstKind::CopyableToMoveOnlyWrapperValue { ownership, .. } => Some(*ownership),
            _ => None,
        }
    }

    /// Overwrite the forwarding ownership kind. Returns `false` if this kind
    /// does not forward ownership.
    pub fn set_forwarding_ownership(&mut self, kind: OwnershipKind) -> bool {
        match self {
            InstKind::Struct { forwarding, .. }
            | InstKind::Tuple { forwarding, .. }
            | InstKind::Enum { forwarding, .. }
            | InstKind::StructExtract { forwarding, .. }
            | InstKind::TupleExtract { forwarding, .. }
            | InstKind::UncheckedEnumData { forwarding, .. }
            | InstKind::DestructureStruct { forwarding, .. }
            | InstKind::DestructureTuple { forwarding, .. }
            | InstKind::Upcast { forwarding, .. }
            | InstKind::UnconditionalCheckedCast { forwarding, .. }
            | InstKind::OpenExistentialRef { forwarding, .. }
            | InstKind::ConvertFunction { forwarding, .. }
            | InstKind::RefToBridgeObject { forwarding, .. }
            | InstKind::BridgeObjectToRef { forwarding, .. }
            | InstKind::MarkDependence { forwarding, .. }
            | InstKind::SwitchEnum { forwarding, .. }
            | InstKind::CheckedCastBranch { forwarding, .. } => {
                *forwarding = kind;
                true
            }
            InstKind::MoveOnlyWrapperToCopyableValue { ownership, .. }
            | InstKind::CopyableToMoveOnlyWrapperValue { ownership, .. } => {
                *ownership = kind;
                true
            }
            _ => false,
        }
    }

    /// Ownership kind of this instruction's results before the trivial
    /// result rule is applied (see [`InstKind::has_trivial_result_rule`]).
    pub fn result_ownership(&self) -> OwnershipKind {
        if let Some(forwarding) = self.forwarding_ownership() {
            return forwarding;
        }
        match self {
            InstKind::Load { qualifier, .. } => qualifier.result_ownership(),
            InstKind::LoadBorrow { .. } | InstKind::BeginBorrow { .. } => {
                OwnershipKind::Guaranteed
            }
            InstKind::CopyValue { .. }
            | InstKind::ExplicitCopyValue { .. }
            | InstKind::Apply { .. } => OwnershipKind::Owned,
            InstKind::UncheckedOwnershipConversion { to, .. } => *to,
            _ => OwnershipKind::None,
        }
    }

    /// Whether a value of move-only wrapped type may appear among this
    /// instruction's operands or results.
    ///
    /// Wrapped values live only between the wrapper conversions and the
    /// move checker. Literals, calls, returns, conditional branches and raw
    /// ownership conversions never see one.
    pub fn accepts_move_only_wrapped(&self) -> bool {
        match self {
            InstKind::IntegerLiteral { .. }
            | InstKind::FunctionRef { .. }
            | InstKind::Apply { .. }
            | InstKind::UncheckedOwnershipConversion { .. }
            | InstKind::CondBranch { .. }
            | InstKind::Return { .. }
            | InstKind::Unreachable => false,

            InstKind::ClassMethod { .. }
            | InstKind::AllocStack { .. }
            | InstKind::DeallocStack { .. }
            | InstKind::Load { .. }
            | InstKind::Store { .. }
            | InstKind::LoadBorrow { .. }
            | InstKind::StoreBorrow { .. }
            | InstKind::DestroyAddr { .. }
            | InstKind::CopyValue { .. }
            | InstKind::ExplicitCopyValue { .. }
            | InstKind::BeginBorrow { .. }
            | InstKind::EndBorrow { .. }
            | InstKind::DestroyValue { .. }
            | InstKind::MoveOnlyWrapperToCopyableValue { .. }
            | InstKind::CopyableToMoveOnlyWrapperValue { .. }
            | InstKind::Struct { .. }
            | InstKind::Tuple { .. }
            | InstKind::Enum { .. }
            | InstKind::StructExtract { .. }
            | InstKind::TupleExtract { .. }
            | InstKind::UncheckedEnumData { .. }
            | InstKind::DestructureStruct { .. }
            | InstKind::DestructureTuple { .. }
            | InstKind::SelectEnum { .. }
            | InstKind::SelectValue { .. }
            | InstKind::StructElementAddr { .. }
            | InstKind::TupleElementAddr { .. }
            | InstKind::UncheckedTakeEnumDataAddr { .. }
            | InstKind::RefElementAddr { .. }
            | InstKind::UncheckedAddrCast { .. }
            | InstKind::Upcast { .. }
            | InstKind::UnconditionalCheckedCast { .. }
            | InstKind::OpenExistentialRef { .. }
            | InstKind::ConvertFunction { .. }
            | InstKind::RefToBridgeObject { .. }
            | InstKind::BridgeObjectToRef { .. }
            | InstKind::MarkDependence { .. }
            | InstKind::DebugValue { .. }
            | InstKind::Branch { .. }
            | InstKind::SwitchEnum { .. }
            | InstKind::CheckedCastBranch { .. } => true,
        }
    }

    /// Whether a trivial result of this instruction has ownership `None`
    /// regardless of [`InstKind::result_ownership`].
    pub fn has_trivial_result_rule(&self) -> bool {
        self.forwarding_ownership().is_some() || matches!(self, InstKind::Apply { .. })
    }
}
