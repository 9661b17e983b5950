//! Instruction builder.
//!
//! A [`Builder`] inserts instructions at a fixed insertion point: either
//! the end of a block or directly before an existing instruction. Result
//! types are derived from operands wherever the instruction kind
//! determines them.

use smol_str::SmolStr;

use crate::function::{BlockId, Function, InstId, ValueId};
use crate::inst::InstKind;
use crate::ownership::{LoadOwnershipQualifier, OwnershipKind, StoreOwnershipQualifier};
use crate::types::{SilType, Type};
use crate::{IrError, Result};

#[derive(Debug, Clone, Copy)]
enum InsertPoint {
    End,
    Before(InstId),
}

/// Builds instructions into a [`Function`].
pub struct Builder<'f> {
    func: &'f mut Function,
    block: BlockId,
    point: InsertPoint,
}

impl<'f> Builder<'f> {
    /// Insert at the end of `block`.
    pub fn at_end(func: &'f mut Function, block: BlockId) -> Self {
        Self {
            func,
            block,
            point: InsertPoint::End,
        }
    }

    /// Insert immediately before `inst`.
    pub fn before(func: &'f mut Function, inst: InstId) -> Self {
        let block = func.inst(inst).block();
        Self {
            func,
            block,
            point: InsertPoint::Before(inst),
        }
    }

    pub fn func(&self) -> &Function {
        &*self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        &mut *self.func
    }

    /// Move the insertion point to the end of `block`.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = block;
        self.point = InsertPoint::End;
    }

    fn insert(&mut self, kind: InstKind, result_types: Vec<SilType>) -> InstId {
        let insts = self.func.block(self.block).insts();
        let position = match self.point {
            InsertPoint::End => insts.len(),
            InsertPoint::Before(anchor) => insts
                .iter()
                .position(|&i| i == anchor)
                .unwrap_or(insts.len()),
        };
        self.func.insert_instruction(self.block, position, kind, result_types)
    }

    fn insert_single(&mut self, kind: InstKind, ty: SilType) -> ValueId {
        let inst = self.insert(kind, vec![ty]);
        self.func.inst(inst).result()
    }

    fn ty(&self, value: ValueId) -> SilType {
        self.func.value_type(value).clone()
    }

    fn expect_address(&self, value: ValueId) -> Result<SilType> {
        let ty = self.ty(value);
        if ty.is_address() {
            Ok(ty)
        } else {
            Err(IrError::ExpectedAddress { ty: ty.to_string() })
        }
    }

    /// Ownership an aggregate takes from its operands: the first operand
    /// with a lifetime decides, otherwise `None`.
    fn merged_ownership(&self, operands: &[ValueId]) -> OwnershipKind {
        operands
            .iter()
            .map(|&v| self.func.ownership_kind(v))
            .find(|k| *k != OwnershipKind::None)
            .unwrap_or(OwnershipKind::None)
    }

    // ------------------------------------------------------------------------
    // Literals and references
    // ------------------------------------------------------------------------

    pub fn integer_literal(&mut self, ty: Type, value: i128) -> ValueId {
        self.insert_single(InstKind::IntegerLiteral { value }, SilType::object(ty))
    }

    pub fn function_ref(&mut self, name: impl Into<SmolStr>, ty: Type) -> ValueId {
        self.insert_single(
            InstKind::FunctionRef { name: name.into() },
            SilType::object(ty),
        )
    }

    pub fn class_method(
        &mut self,
        operand: ValueId,
        method: impl Into<SmolStr>,
        ty: Type,
    ) -> ValueId {
        self.insert_single(
            InstKind::ClassMethod {
                operand,
                method: method.into(),
            },
            SilType::object(ty),
        )
    }

    pub fn apply(&mut self, callee: ValueId, args: Vec<ValueId>, result: Type) -> ValueId {
        self.insert_single(InstKind::Apply { callee, args }, SilType::object(result))
    }

    // ------------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------------

    pub fn alloc_stack(&mut self, ty: Type) -> ValueId {
        self.insert_single(InstKind::AllocStack { name: None }, SilType::address(ty))
    }

    pub fn dealloc_stack(&mut self, address: ValueId) -> InstId {
        self.insert(InstKind::DeallocStack { address }, vec![])
    }

    pub fn load(&mut self, address: ValueId, qualifier: LoadOwnershipQualifier) -> Result<ValueId> {
        let ty = self.expect_address(address)?.object_type();
        Ok(self.insert_single(InstKind::Load { address, qualifier }, ty))
    }

    pub fn store(
        &mut self,
        src: ValueId,
        dest: ValueId,
        qualifier: StoreOwnershipQualifier,
    ) -> Result<InstId> {
        self.expect_address(dest)?;
        Ok(self.insert(
            InstKind::Store {
                src,
                dest,
                qualifier,
            },
            vec![],
        ))
    }

    pub fn load_borrow(&mut self, address: ValueId) -> Result<ValueId> {
        let ty = self.expect_address(address)?.object_type();
        Ok(self.insert_single(InstKind::LoadBorrow { address }, ty))
    }

    pub fn store_borrow(&mut self, src: ValueId, dest: ValueId) -> Result<InstId> {
        self.expect_address(dest)?;
        Ok(self.insert(InstKind::StoreBorrow { src, dest }, vec![]))
    }

    pub fn destroy_addr(&mut self, address: ValueId) -> InstId {
        self.insert(InstKind::DestroyAddr { address }, vec![])
    }

    /// Load a value, downgrading the qualifier to `[trivial]` when the
    /// loaded type is trivial.
    pub fn emit_load_value_operation(
        &mut self,
        address: ValueId,
        qualifier: LoadOwnershipQualifier,
    ) -> Result<ValueId> {
        let ty = self.expect_address(address)?.object_type();
        let qualifier = if self.func.is_trivial(&ty) {
            LoadOwnershipQualifier::Trivial
        } else {
            qualifier
        };
        self.load(address, qualifier)
    }

    /// Store a value, downgrading the qualifier to `[trivial]` when the
    /// stored type is trivial.
    pub fn emit_store_value_operation(
        &mut self,
        src: ValueId,
        dest: ValueId,
        qualifier: StoreOwnershipQualifier,
    ) -> Result<InstId> {
        let qualifier = if self.func.is_trivial(self.func.value_type(src)) {
            StoreOwnershipQualifier::Trivial
        } else {
            qualifier
        };
        self.store(src, dest, qualifier)
    }

    // ------------------------------------------------------------------------
    // Copies, borrows and lifetime ends
    // ------------------------------------------------------------------------

    pub fn copy_value(&mut self, operand: ValueId) -> ValueId {
        let ty = self.ty(operand);
        self.insert_single(InstKind::CopyValue { operand }, ty)
    }

    pub fn explicit_copy_value(&mut self, operand: ValueId) -> ValueId {
        let ty = self.ty(operand);
        self.insert_single(InstKind::ExplicitCopyValue { operand }, ty)
    }

    pub fn begin_borrow(&mut self, operand: ValueId) -> ValueId {
        let ty = self.ty(operand);
        self.insert_single(InstKind::BeginBorrow { operand }, ty)
    }

    pub fn end_borrow(&mut self, operand: ValueId) -> InstId {
        self.insert(InstKind::EndBorrow { operand }, vec![])
    }

    pub fn destroy_value(&mut self, operand: ValueId) -> InstId {
        self.insert(InstKind::DestroyValue { operand }, vec![])
    }

    pub fn unchecked_ownership_conversion(
        &mut self,
        operand: ValueId,
        to: OwnershipKind,
    ) -> ValueId {
        let ty = self.ty(operand);
        self.insert_single(InstKind::UncheckedOwnershipConversion { operand, to }, ty)
    }

    // ------------------------------------------------------------------------
    // Move-only wrapper conversions
    // ------------------------------------------------------------------------

    /// Unwrap a move-only value into its copyable type.
    pub fn move_only_wrapper_to_copyable(&mut self, operand: ValueId) -> ValueId {
        let ty = self.ty(operand).removing_move_only_wrapper();
        let ownership = self.func.ownership_kind(operand);
        self.insert_single(
            InstKind::MoveOnlyWrapperToCopyableValue { operand, ownership },
            ty,
        )
    }

    /// Wrap a copyable value in the move-only modifier.
    pub fn copyable_to_move_only_wrapper(&mut self, operand: ValueId) -> ValueId {
        let ty = self.ty(operand).wrapped_in_move_only();
        // A wrapped value is never trivial, so it always carries a lifetime.
        let ownership = match self.func.ownership_kind(operand) {
            OwnershipKind::None => OwnershipKind::Owned,
            other => other,
        };
        self.insert_single(
            InstKind::CopyableToMoveOnlyWrapperValue { operand, ownership },
            ty,
        )
    }

    // ------------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------------

    pub fn struct_(&mut self, ty: Type, elements: Vec<ValueId>) -> ValueId {
        let forwarding = self.merged_ownership(&elements);
        self.insert_single(
            InstKind::Struct {
                elements,
                forwarding,
            },
            SilType::object(ty),
        )
    }

    pub fn tuple(&mut self, elements: Vec<ValueId>) -> ValueId {
        let ty = Type::Tuple(
            elements
                .iter()
                .map(|&e| self.func.value_type(e).ast_type().clone())
                .collect(),
        );
        let forwarding = self.merged_ownership(&elements);
        self.insert_single(
            InstKind::Tuple {
                elements,
                forwarding,
            },
            SilType::object(ty),
        )
    }

    pub fn enum_(&mut self, ty: Type, case: u32, payload: Option<ValueId>) -> ValueId {
        let forwarding = payload
            .map(|p| self.func.ownership_kind(p))
            .unwrap_or(OwnershipKind::None);
        self.insert_single(
            InstKind::Enum {
                case,
                payload,
                forwarding,
            },
            SilType::object(ty),
        )
    }

    pub fn struct_extract(&mut self, operand: ValueId, field: u32) -> Result<ValueId> {
        let field_ty = self
            .func
            .types()
            .field_type(self.func.value_type(operand).ast_type(), field)?;
        let forwarding = self.func.ownership_kind(operand);
        Ok(self.insert_single(
            InstKind::StructExtract {
                operand,
                field,
                forwarding,
            },
            SilType::object(field_ty),
        ))
    }

    pub fn tuple_extract(&mut self, operand: ValueId, index: u32) -> Result<ValueId> {
        let elem_ty = self
            .func
            .types()
            .field_type(self.func.value_type(operand).ast_type(), index)?;
        let forwarding = self.func.ownership_kind(operand);
        Ok(self.insert_single(
            InstKind::TupleExtract {
                operand,
                index,
                forwarding,
            },
            SilType::object(elem_ty),
        ))
    }

    pub fn unchecked_enum_data(&mut self, operand: ValueId, case: u32) -> Result<ValueId> {
        let enum_ty = self.func.value_type(operand).ast_type().clone();
        let payload = self
            .func
            .types()
            .case_payload(&enum_ty, case)?
            .ok_or_else(|| IrError::NoPayload {
                ty: enum_ty.to_string(),
                case,
            })?;
        let forwarding = self.func.ownership_kind(operand);
        Ok(self.insert_single(
            InstKind::UncheckedEnumData {
                operand,
                case,
                forwarding,
            },
            SilType::object(payload),
        ))
    }

    pub fn destructure_struct(&mut self, operand: ValueId) -> Result<Vec<ValueId>> {
        let fields = self
            .func
            .types()
            .stored_fields(self.func.value_type(operand).ast_type())?;
        let forwarding = self.func.ownership_kind(operand);
        let inst = self.insert(
            InstKind::DestructureStruct {
                operand,
                forwarding,
            },
            fields.into_iter().map(SilType::object).collect(),
        );
        Ok(self.func.inst(inst).results().to_vec())
    }

    pub fn destructure_tuple(&mut self, operand: ValueId) -> Result<Vec<ValueId>> {
        let elems = self
            .func
            .types()
            .stored_fields(self.func.value_type(operand).ast_type())?;
        let forwarding = self.func.ownership_kind(operand);
        let inst = self.insert(
            InstKind::DestructureTuple {
                operand,
                forwarding,
            },
            elems.into_iter().map(SilType::object).collect(),
        );
        Ok(self.func.inst(inst).results().to_vec())
    }

    pub fn select_enum(
        &mut self,
        operand: ValueId,
        cases: Vec<(u32, ValueId)>,
        default: Option<ValueId>,
        ty: Type,
    ) -> ValueId {
        self.insert_single(
            InstKind::SelectEnum {
                operand,
                cases,
                default,
            },
            SilType::object(ty),
        )
    }

    pub fn select_value(
        &mut self,
        operand: ValueId,
        cases: Vec<(ValueId, ValueId)>,
        default: Option<ValueId>,
        ty: Type,
    ) -> ValueId {
        self.insert_single(
            InstKind::SelectValue {
                operand,
                cases,
                default,
            },
            SilType::object(ty),
        )
    }

    // ------------------------------------------------------------------------
    // Address projections
    // ------------------------------------------------------------------------

    pub fn struct_element_addr(&mut self, address: ValueId, field: u32) -> Result<ValueId> {
        let base = self.expect_address(address)?;
        let field_ty = self.func.types().field_type(base.ast_type(), field)?;
        Ok(self.insert_single(
            InstKind::StructElementAddr { address, field },
            SilType::address(field_ty),
        ))
    }

    pub fn tuple_element_addr(&mut self, address: ValueId, index: u32) -> Result<ValueId> {
        let base = self.expect_address(address)?;
        let elem_ty = self.func.types().field_type(base.ast_type(), index)?;
        Ok(self.insert_single(
            InstKind::TupleElementAddr { address, index },
            SilType::address(elem_ty),
        ))
    }

    pub fn unchecked_take_enum_data_addr(
        &mut self,
        address: ValueId,
        case: u32,
    ) -> Result<ValueId> {
        let base = self.expect_address(address)?;
        let payload = self
            .func
            .types()
            .case_payload(base.ast_type(), case)?
            .ok_or_else(|| IrError::NoPayload {
                ty: base.ast_type().to_string(),
                case,
            })?;
        Ok(self.insert_single(
            InstKind::UncheckedTakeEnumDataAddr { address, case },
            SilType::address(payload),
        ))
    }

    pub fn ref_element_addr(&mut self, operand: ValueId, field: u32) -> Result<ValueId> {
        let field_ty = self
            .func
            .types()
            .field_type(self.func.value_type(operand).ast_type(), field)?;
        Ok(self.insert_single(
            InstKind::RefElementAddr { operand, field },
            SilType::address(field_ty),
        ))
    }

    // ------------------------------------------------------------------------
    // Casts and dependencies
    // ------------------------------------------------------------------------

    pub fn unchecked_addr_cast(&mut self, address: ValueId, to: Type) -> Result<ValueId> {
        self.expect_address(address)?;
        Ok(self.insert_single(InstKind::UncheckedAddrCast { address }, SilType::address(to)))
    }

    pub fn upcast(&mut self, operand: ValueId, to: Type) -> ValueId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert_single(InstKind::Upcast { operand, forwarding }, SilType::object(to))
    }

    pub fn unconditional_checked_cast(&mut self, operand: ValueId, to: Type) -> ValueId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert_single(
            InstKind::UnconditionalCheckedCast {
                operand,
                forwarding,
            },
            SilType::object(to),
        )
    }

    pub fn open_existential_ref(&mut self, operand: ValueId, opened: Type) -> ValueId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert_single(
            InstKind::OpenExistentialRef {
                operand,
                forwarding,
            },
            SilType::object(opened),
        )
    }

    pub fn convert_function(&mut self, operand: ValueId, to: Type) -> ValueId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert_single(
            InstKind::ConvertFunction {
                operand,
                forwarding,
            },
            SilType::object(to),
        )
    }

    pub fn ref_to_bridge_object(&mut self, operand: ValueId, bits: ValueId) -> ValueId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert_single(
            InstKind::RefToBridgeObject {
                operand,
                bits,
                forwarding,
            },
            SilType::object(Type::BridgeObject),
        )
    }

    pub fn bridge_object_to_ref(&mut self, operand: ValueId, to: Type) -> ValueId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert_single(
            InstKind::BridgeObjectToRef {
                operand,
                forwarding,
            },
            SilType::object(to),
        )
    }

    pub fn mark_dependence(&mut self, value: ValueId, base: ValueId) -> ValueId {
        let ty = self.ty(value);
        let forwarding = self.func.ownership_kind(value);
        self.insert_single(
            InstKind::MarkDependence {
                value,
                base,
                forwarding,
            },
            ty,
        )
    }

    pub fn debug_value(&mut self, operand: ValueId, name: impl Into<SmolStr>) -> InstId {
        self.insert(
            InstKind::DebugValue {
                operand,
                name: name.into(),
            },
            vec![],
        )
    }

    // ------------------------------------------------------------------------
    // Terminators
    // ------------------------------------------------------------------------

    pub fn branch(&mut self, dest: BlockId, args: Vec<ValueId>) -> InstId {
        self.insert(InstKind::Branch { dest, args }, vec![])
    }

    pub fn cond_branch(
        &mut self,
        condition: ValueId,
        true_dest: BlockId,
        true_args: Vec<ValueId>,
        false_dest: BlockId,
        false_args: Vec<ValueId>,
    ) -> InstId {
        self.insert(
            InstKind::CondBranch {
                condition,
                true_dest,
                true_args,
                false_dest,
                false_args,
            },
            vec![],
        )
    }

    pub fn switch_enum(
        &mut self,
        operand: ValueId,
        cases: Vec<(u32, BlockId)>,
        default: Option<BlockId>,
    ) -> InstId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert(
            InstKind::SwitchEnum {
                operand,
                cases,
                default,
                forwarding,
            },
            vec![],
        )
    }

    pub fn checked_cast_branch(
        &mut self,
        operand: ValueId,
        success: BlockId,
        failure: BlockId,
    ) -> InstId {
        let forwarding = self.func.ownership_kind(operand);
        self.insert(
            InstKind::CheckedCastBranch {
                operand,
                success,
                failure,
                forwarding,
            },
            vec![],
        )
    }

    pub fn return_(&mut self, operand: ValueId) -> InstId {
        self.insert(InstKind::Return { operand }, vec![])
    }

    pub fn unreachable(&mut self) -> InstId {
        self.insert(InstKind::Unreachable, vec![])
    }
}
