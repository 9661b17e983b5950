//! Types of the ownership SSA IR.
//!
//! A [`SilType`] pairs a formal [`Type`] with a value category (object or
//! address). The only type-level modifier is the move-only wrapper,
//! [`Type::MoveOnly`], which marks a value as non-copyable for the
//! benefit of the move checker. Once checking is done the wrapper is
//! erased again by the move-only type eliminator.
//!
//! Triviality is a property of a type relative to the [`TypeTable`] of
//! the enclosing module: a trivial type is bitwise copyable and has
//! nothing to destroy.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::{IrError, Result};

// ============================================================================
// Formal Types
// ============================================================================

/// A formal type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Builtin integer of the given bit width
    Int(u16),
    /// Builtin IEEE float of the given bit width
    Float(u16),
    /// Untyped pointer
    RawPointer,
    /// Reference-counted native object
    NativeObject,
    /// Reference-counted object with spare bits
    BridgeObject,
    /// Reference to a class instance
    Class(SmolStr),
    /// Nominal struct, looked up in the [`TypeTable`]
    Struct(SmolStr),
    /// Nominal enum, looked up in the [`TypeTable`]
    Enum(SmolStr),
    /// Tuple of element types
    Tuple(Vec<Type>),
    /// Class-bound existential
    Existential(SmolStr),
    /// Function value. Thin functions carry no context and are trivial.
    Function {
        params: Vec<Type>,
        result: Box<Type>,
        thin: bool,
    },
    /// The move-only wrapper around an underlying type
    MoveOnly(Box<Type>),
}

impl Type {
    pub fn int(bits: u16) -> Self {
        Type::Int(bits)
    }

    pub fn class(name: impl Into<SmolStr>) -> Self {
        Type::Class(name.into())
    }

    pub fn structure(name: impl Into<SmolStr>) -> Self {
        Type::Struct(name.into())
    }

    pub fn enumeration(name: impl Into<SmolStr>) -> Self {
        Type::Enum(name.into())
    }

    /// Wrap this type in the move-only modifier. Already wrapped types are
    /// returned unchanged.
    pub fn move_only(self) -> Self {
        match self {
            Type::MoveOnly(_) => self,
            other => Type::MoveOnly(Box::new(other)),
        }
    }

    pub fn is_move_only_wrapped(&self) -> bool {
        matches!(self, Type::MoveOnly(_))
    }

    /// The type underneath the move-only wrapper, or `self` if unwrapped.
    pub fn removing_move_only_wrapper(&self) -> &Type {
        match self {
            Type::MoveOnly(inner) => inner,
            other => other,
        }
    }

    /// Whether this is a reference type (class, object or existential).
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::NativeObject | Type::BridgeObject | Type::Class(_) | Type::Existential(_)
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(bits) => write!(f, "Builtin.Int{}", bits),
            Type::Float(bits) => write!(f, "Builtin.FPIEEE{}", bits),
            Type::RawPointer => write!(f, "Builtin.RawPointer"),
            Type::NativeObject => write!(f, "Builtin.NativeObject"),
            Type::BridgeObject => write!(f, "Builtin.BridgeObject"),
            Type::Class(name) | Type::Struct(name) | Type::Enum(name) => write!(f, "{}", name),
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, ")")
            }
            Type::Existential(proto) => write!(f, "any {}", proto),
            Type::Function {
                params,
                result,
                thin,
            } => {
                if *thin {
                    write!(f, "@convention(thin) ")?;
                }
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", result)
            }
            Type::MoveOnly(inner) => write!(f, "@moveOnly {}", inner),
        }
    }
}

// ============================================================================
// Lowered Types
// ============================================================================

/// Whether a value is the object itself or the address of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    Object,
    Address,
}

/// The type of an IR value: a formal type plus a value category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SilType {
    ty: Type,
    category: ValueCategory,
}

impl SilType {
    pub fn object(ty: Type) -> Self {
        Self {
            ty,
            category: ValueCategory::Object,
        }
    }

    pub fn address(ty: Type) -> Self {
        Self {
            ty,
            category: ValueCategory::Address,
        }
    }

    pub fn ast_type(&self) -> &Type {
        &self.ty
    }

    pub fn category(&self) -> ValueCategory {
        self.category
    }

    pub fn is_address(&self) -> bool {
        self.category == ValueCategory::Address
    }

    pub fn is_object(&self) -> bool {
        self.category == ValueCategory::Object
    }

    /// The object type this type refers to.
    pub fn object_type(&self) -> SilType {
        SilType::object(self.ty.clone())
    }

    /// The address of a value of this type.
    pub fn address_type(&self) -> SilType {
        SilType::address(self.ty.clone())
    }

    pub fn is_move_only_wrapped(&self) -> bool {
        self.ty.is_move_only_wrapped()
    }

    /// This type with the move-only wrapper removed, keeping the category.
    pub fn removing_move_only_wrapper(&self) -> SilType {
        Self {
            ty: self.ty.removing_move_only_wrapper().clone(),
            category: self.category,
        }
    }

    /// This type wrapped in the move-only modifier, keeping the category.
    pub fn wrapped_in_move_only(&self) -> SilType {
        Self {
            ty: self.ty.clone().move_only(),
            category: self.category,
        }
    }

    /// Drop the wrapper in place. Returns `false` if there was none.
    ///
    /// Only reachable through `Function::unsafely_eliminate_move_only_wrapper`.
    pub(crate) fn strip_move_only_in_place(&mut self) -> bool {
        match std::mem::replace(&mut self.ty, Type::Tuple(Vec::new())) {
            Type::MoveOnly(inner) => {
                self.ty = *inner;
                true
            }
            other => {
                self.ty = other;
                false
            }
        }
    }
}

impl fmt::Display for SilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            ValueCategory::Object => write!(f, "${}", self.ty),
            ValueCategory::Address => write!(f, "$*{}", self.ty),
        }
    }
}

// ============================================================================
// Type Table
// ============================================================================

/// Nominal type declarations of a module.
///
/// Answers layout questions that depend on declarations: field and payload
/// types, and whether a type is trivial.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    structs: FxHashMap<SmolStr, Vec<Type>>,
    enums: FxHashMap<SmolStr, Vec<Option<Type>>>,
    classes: FxHashMap<SmolStr, Vec<Type>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_fresh(&self, name: &SmolStr) -> Result<()> {
        if self.structs.contains_key(name)
            || self.enums.contains_key(name)
            || self.classes.contains_key(name)
        {
            return Err(IrError::DuplicateType { name: name.clone() });
        }
        Ok(())
    }

    /// Declare a struct with the given stored field types.
    pub fn declare_struct(&mut self, name: impl Into<SmolStr>, fields: Vec<Type>) -> Result<Type> {
        let name = name.into();
        self.check_fresh(&name)?;
        self.structs.insert(name.clone(), fields);
        Ok(Type::Struct(name))
    }

    /// Declare an enum. Each case has an optional payload type.
    pub fn declare_enum(
        &mut self,
        name: impl Into<SmolStr>,
        cases: Vec<Option<Type>>,
    ) -> Result<Type> {
        let name = name.into();
        self.check_fresh(&name)?;
        self.enums.insert(name.clone(), cases);
        Ok(Type::Enum(name))
    }

    /// Declare a class with the given stored field types.
    pub fn declare_class(&mut self, name: impl Into<SmolStr>, fields: Vec<Type>) -> Result<Type> {
        let name = name.into();
        self.check_fresh(&name)?;
        self.classes.insert(name.clone(), fields);
        Ok(Type::Class(name))
    }

    /// Stored field types of a struct, tuple or class, in declaration order.
    ///
    /// Fields of a move-only wrapped aggregate are themselves wrapped.
    pub fn stored_fields(&self, ty: &Type) -> Result<Vec<Type>> {
        match ty {
            Type::MoveOnly(inner) => Ok(self
                .stored_fields(inner)?
                .into_iter()
                .map(Type::move_only)
                .collect()),
            Type::Struct(name) => self
                .structs
                .get(name)
                .cloned()
                .ok_or_else(|| IrError::UnknownType { name: name.clone() }),
            Type::Class(name) => self
                .classes
                .get(name)
                .cloned()
                .ok_or_else(|| IrError::UnknownType { name: name.clone() }),
            Type::Tuple(elems) => Ok(elems.clone()),
            other => Err(IrError::NotAnAggregate {
                ty: other.to_string(),
            }),
        }
    }

    /// Type of the stored field `index` of a struct, tuple or class.
    pub fn field_type(&self, ty: &Type, index: u32) -> Result<Type> {
        self.stored_fields(ty)?
            .into_iter()
            .nth(index as usize)
            .ok_or_else(|| IrError::FieldOutOfRange {
                ty: ty.to_string(),
                index,
            })
    }

    /// Payload type of enum case `case`, `None` for payload-less cases.
    ///
    /// Payloads of a move-only wrapped enum are themselves wrapped.
    pub fn case_payload(&self, ty: &Type, case: u32) -> Result<Option<Type>> {
        match ty {
            Type::MoveOnly(inner) => Ok(self.case_payload(inner, case)?.map(Type::move_only)),
            Type::Enum(name) => {
                let cases = self
                    .enums
                    .get(name)
                    .ok_or_else(|| IrError::UnknownType { name: name.clone() })?;
                cases
                    .get(case as usize)
                    .cloned()
                    .ok_or_else(|| IrError::FieldOutOfRange {
                        ty: ty.to_string(),
                        index: case,
                    })
            }
            other => Err(IrError::NotAnAggregate {
                ty: other.to_string(),
            }),
        }
    }

    /// Whether values of `ty` are trivial: bitwise copyable with nothing
    /// to destroy.
    ///
    /// A move-only wrapped type is never trivial. Unknown nominal types are
    /// treated as non-trivial.
    pub fn is_trivial(&self, ty: &Type) -> bool {
        let mut in_progress = FxHashSet::default();
        self.is_trivial_inner(ty, &mut in_progress)
    }

    fn is_trivial_inner<'a>(&'a self, ty: &'a Type, in_progress: &mut FxHashSet<&'a str>) -> bool {
        match ty {
            Type::Int(_) | Type::Float(_) | Type::RawPointer => true,
            Type::NativeObject | Type::BridgeObject | Type::Class(_) | Type::Existential(_) => {
                false
            }
            Type::Function { thin, .. } => *thin,
            Type::MoveOnly(_) => false,
            Type::Tuple(elems) => elems.iter().all(|e| self.is_trivial_inner(e, in_progress)),
            Type::Struct(name) => {
                let Some(fields) = self.structs.get(name) else {
                    return false;
                };
                // A struct that contains itself by value is malformed.
                if !in_progress.insert(name.as_str()) {
                    return false;
                }
                let trivial = fields.iter().all(|f| self.is_trivial_inner(f, in_progress));
                in_progress.remove(name.as_str());
                trivial
            }
            Type::Enum(name) => {
                let Some(cases) = self.enums.get(name) else {
                    return false;
                };
                if !in_progress.insert(name.as_str()) {
                    return false;
                }
                let trivial = cases
                    .iter()
                    .flatten()
                    .all(|p| self.is_trivial_inner(p, in_progress));
                in_progress.remove(name.as_str());
                trivial
            }
        }
    }
}
