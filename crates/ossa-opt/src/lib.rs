//! Optimization passes over the ownership SSA IR.
//!
//! # Passes
//!
//! - **Trivial move-only type eliminator**: strips the move-only wrapper
//!   from values whose underlying type is trivial
//! - **Move-only type eliminator**: strips the wrapper everywhere
//!
//! # Example
//!
//! ```
//! use ossa_opt::{InvalidationLog, PassManager, PassManagerOptions};
//! use ossa_ir::{Module, TypeTable};
//!
//! let mut module = Module::new(TypeTable::new());
//! let mut manager = PassManager::from_names(
//!     ["trivial-move-only-type-eliminator", "move-only-type-eliminator"],
//!     PassManagerOptions { verify_after_each_pass: true },
//! )?;
//! let report = manager.run(&mut module, &mut InvalidationLog::new())?;
//! assert!(!report.any_changed());
//! # Ok::<(), ossa_opt::PassError>(())
//! ```

use smol_str::SmolStr;
use thiserror::Error;

use ossa_ir::VerifyError;

pub mod move_only;
pub mod pass;

pub use move_only::{
    eliminate_move_only_types, eliminate_move_only_types_with_stats, EliminationMode,
    EliminationStats, MoveOnlyTypeEliminator,
};
pub use pass::{
    AnalysisInvalidator, FunctionPass, InvalidationKind, InvalidationLog, PassKind, PassManager,
    PassManagerOptions, PassRun, PipelineReport,
};

/// Errors raised while building or running a pass pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error("unknown pass `{name}`")]
    UnknownPass { name: String },

    #[error("verification failed after `{pass}` on @{function}: {}", join_errors(.errors))]
    Verification {
        pass: &'static str,
        function: SmolStr,
        errors: Vec<VerifyError>,
    },
}

fn join_errors(errors: &[VerifyError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for pass operations
pub type Result<T> = std::result::Result<T, PassError>;
