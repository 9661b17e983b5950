//! Ownership SSA intermediate representation.
//!
//! The IR models functions as control-flow graphs of basic blocks whose
//! values carry an explicit ownership discipline:
//!
//! - **Typed values**: every value has a [`SilType`], a formal type plus an
//!   object/address category
//! - **Ownership kinds**: values are `@owned`, `@guaranteed`, `@unowned` or
//!   `@none`; trivial values are always `@none`
//! - **Use lists**: each value knows its users, so rewrites such as
//!   replace-all-uses-with are cheap
//! - **Move-only wrapper**: [`Type::MoveOnly`] marks a value as
//!   non-copyable until the move checker has run
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ossa_ir::{Builder, Function, OwnershipKind, SilType, Type, TypeTable};
//!
//! let mut func = Function::new("id", Arc::new(TypeTable::new()));
//! let bb0 = func.add_block();
//! let arg = func.add_argument(bb0, SilType::object(Type::int(64)), OwnershipKind::None);
//! Builder::at_end(&mut func, bb0).return_(arg);
//! assert!(ossa_ir::verify_function(&func).is_ok());
//! ```

use smol_str::SmolStr;
use thiserror::Error;

mod builder;
pub mod function;
pub mod inst;
pub mod ownership;
mod pretty;
pub mod types;
mod verify;

pub use builder::Builder;
pub use function::{
    BasicBlock, BlockId, Function, InstData, InstId, Module, SilStage, Use, ValueDef, ValueId,
};
pub use inst::InstKind;
pub use ownership::{LoadOwnershipQualifier, OwnershipKind, StoreOwnershipQualifier};
pub use pretty::{pretty_print_function, pretty_print_instruction, pretty_print_module};
pub use types::{SilType, Type, TypeTable, ValueCategory};
pub use verify::{verify_function, verify_no_move_only_wrapped, VerifyError};

/// Errors raised while declaring types or building instructions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("type `{name}` is already declared")]
    DuplicateType { name: SmolStr },

    #[error("cannot find type `{name}`")]
    UnknownType { name: SmolStr },

    #[error("`{ty}` has no stored fields")]
    NotAnAggregate { ty: String },

    #[error("no field {index} on type `{ty}`")]
    FieldOutOfRange { ty: String, index: u32 },

    #[error("case {case} of `{ty}` has no payload")]
    NoPayload { ty: String, case: u32 },

    #[error("expected an address, found `{ty}`")]
    ExpectedAddress { ty: String },
}

/// Result type for IR construction
pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            IrError::FieldOutOfRange {
                ty: "Point".into(),
                index: 3
            }
            .to_string(),
            "no field 3 on type `Point`"
        );
        assert_eq!(
            IrError::ExpectedAddress {
                ty: "$Builtin.Int64".into()
            }
            .to_string(),
            "expected an address, found `$Builtin.Int64`"
        );
    }
}
