//! Function pass infrastructure.
//!
//! A [`PassManager`] runs a pipeline of [`FunctionPass`]es over every
//! function of a [`Module`]. Passes report what they invalidated; the
//! manager forwards that to an [`AnalysisInvalidator`] so cached analyses
//! can be dropped.

use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;
use tracing::{debug, debug_span};

use ossa_ir::{verify_function, Function, Module};

use crate::move_only::{EliminationMode, MoveOnlyTypeEliminator};
use crate::{PassError, Result};

// ============================================================================
// Passes and Invalidation
// ============================================================================

/// What a pass run invalidated, from least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvalidationKind {
    /// Nothing changed.
    Nothing,
    /// Instructions were added, removed or modified; block structure and
    /// edges are intact.
    Instructions,
    /// Branches were changed.
    Branches,
    /// Anything may have changed.
    FunctionBody,
}

impl InvalidationKind {
    pub fn changed(self) -> bool {
        self != InvalidationKind::Nothing
    }
}

/// A transformation of one function at a time.
pub trait FunctionPass {
    /// Name used in pipelines and logs.
    fn name(&self) -> &'static str;

    /// Transform `func`, returning what was invalidated.
    fn run(&mut self, func: &mut Function) -> InvalidationKind;
}

/// Receives invalidation notices from the pass manager.
pub trait AnalysisInvalidator {
    fn invalidate(&mut self, function: &str, kind: InvalidationKind);
}

/// Invalidator that records every notice it receives.
#[derive(Debug, Clone, Default)]
pub struct InvalidationLog {
    events: Vec<(SmolStr, InvalidationKind)>,
}

impl InvalidationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(SmolStr, InvalidationKind)] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl AnalysisInvalidator for InvalidationLog {
    fn invalidate(&mut self, function: &str, kind: InvalidationKind) {
        self.events.push((SmolStr::new(function), kind));
    }
}

// ============================================================================
// Pass Registry
// ============================================================================

/// Passes that can be named in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    TrivialMoveOnlyTypeEliminator,
    MoveOnlyTypeEliminator,
}

impl PassKind {
    pub const ALL: [PassKind; 2] = [
        PassKind::TrivialMoveOnlyTypeEliminator,
        PassKind::MoveOnlyTypeEliminator,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::TrivialMoveOnlyTypeEliminator => "trivial-move-only-type-eliminator",
            PassKind::MoveOnlyTypeEliminator => "move-only-type-eliminator",
        }
    }

    /// Instantiate the pass.
    pub fn create(self) -> Box<dyn FunctionPass> {
        match self {
            PassKind::TrivialMoveOnlyTypeEliminator => {
                Box::new(MoveOnlyTypeEliminator::new(EliminationMode::TrivialOnly))
            }
            PassKind::MoveOnlyTypeEliminator => {
                Box::new(MoveOnlyTypeEliminator::new(EliminationMode::All))
            }
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PassKind {
    type Err = PassError;

    fn from_str(s: &str) -> Result<Self> {
        PassKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| PassError::UnknownPass {
                name: s.to_string(),
            })
    }
}

// ============================================================================
// Pass Manager
// ============================================================================

/// Pass manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassManagerOptions {
    /// Run the verifier on every function after each pass.
    pub verify_after_each_pass: bool,
}

/// Functions changed by one pass of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRun {
    pub pass: &'static str,
    pub changed: Vec<SmolStr>,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub runs: Vec<PassRun>,
}

impl PipelineReport {
    /// Whether any pass changed any function.
    pub fn any_changed(&self) -> bool {
        self.runs.iter().any(|run| !run.changed.is_empty())
    }

    /// Functions changed by the first run of `pass`.
    pub fn changed_by(&self, pass: &str) -> &[SmolStr] {
        self.runs
            .iter()
            .find(|run| run.pass == pass)
            .map(|run| run.changed.as_slice())
            .unwrap_or(&[])
    }
}

/// Runs a pipeline of function passes over a module.
pub struct PassManager {
    passes: Vec<Box<dyn FunctionPass>>,
    options: PassManagerOptions,
}

impl PassManager {
    pub fn new(options: PassManagerOptions) -> Self {
        Self {
            passes: Vec::new(),
            options,
        }
    }

    /// Build a pipeline from pass names, in order.
    pub fn from_names<'a>(
        names: impl IntoIterator<Item = &'a str>,
        options: PassManagerOptions,
    ) -> Result<Self> {
        let mut manager = Self::new(options);
        for name in names {
            manager.add_boxed(name.parse::<PassKind>()?.create());
        }
        Ok(manager)
    }

    pub fn add_pass(&mut self, pass: impl FunctionPass + 'static) -> &mut Self {
        self.add_boxed(Box::new(pass))
    }

    pub fn add_boxed(&mut self, pass: Box<dyn FunctionPass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn options(&self) -> PassManagerOptions {
        self.options
    }

    /// Run every pass over every function of `module`, pass by pass.
    pub fn run(
        &mut self,
        module: &mut Module,
        invalidator: &mut dyn AnalysisInvalidator,
    ) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        for pass in &mut self.passes {
            let pass_name = pass.name();
            let mut changed = Vec::new();
            for func in module.functions_mut() {
                let span = debug_span!("pass", pass = pass_name, function = func.name());
                let _guard = span.enter();

                let kind = pass.run(func);
                debug!(?kind, "pass finished");
                if kind.changed() {
                    invalidator.invalidate(func.name(), kind);
                    changed.push(SmolStr::new(func.name()));
                }
                if self.options.verify_after_each_pass {
                    verify_function(func).map_err(|errors| PassError::Verification {
                        pass: pass_name,
                        function: SmolStr::new(func.name()),
                        errors,
                    })?;
                }
            }
            report.runs.push(PassRun {
                pass: pass_name,
                changed,
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ossa_ir::TypeTable;

    struct CountingPass {
        runs: usize,
    }

    impl FunctionPass for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&mut self, _func: &mut Function) -> InvalidationKind {
            self.runs += 1;
            if self.runs % 2 == 0 {
                InvalidationKind::Instructions
            } else {
                InvalidationKind::Nothing
            }
        }
    }

    #[test]
    fn test_pass_kind_from_str() {
        assert_eq!(
            "move-only-type-eliminator".parse::<PassKind>().unwrap(),
            PassKind::MoveOnlyTypeEliminator
        );
        assert_eq!(
            "trivial-move-only-type-eliminator"
                .parse::<PassKind>()
                .unwrap(),
            PassKind::TrivialMoveOnlyTypeEliminator
        );
        assert!(matches!(
            "dce".parse::<PassKind>(),
            Err(PassError::UnknownPass { name }) if name == "dce"
        ));
    }

    #[test]
    fn test_created_pass_names_match_registry() {
        for kind in PassKind::ALL {
            assert_eq!(kind.create().name(), kind.name());
        }
    }

    #[test]
    fn test_invalidations_are_forwarded() {
        let mut module = Module::new(TypeTable::new());
        for name in ["a", "b", "c"] {
            module.add_function(name).add_block();
        }
        let mut manager = PassManager::new(PassManagerOptions::default());
        manager.add_pass(CountingPass { runs: 0 });
        let mut log = InvalidationLog::new();

        let report = manager.run(&mut module, &mut log).unwrap();
        assert_eq!(
            log.events(),
            &[(SmolStr::new("b"), InvalidationKind::Instructions)]
        );
        assert_eq!(report.changed_by("counting"), &[SmolStr::new("b")]);
        assert!(report.any_changed());
        assert!(report.changed_by("other").is_empty());
    }

    #[test]
    fn test_from_names_rejects_unknown_pass() {
        let result = PassManager::from_names(
            ["move-only-type-eliminator", "inline"],
            PassManagerOptions::default(),
        );
        assert!(matches!(result, Err(PassError::UnknownPass { .. })));
    }

    #[test]
    fn test_invalidation_order() {
        assert!(InvalidationKind::Nothing < InvalidationKind::Instructions);
        assert!(InvalidationKind::Branches < InvalidationKind::FunctionBody);
        assert!(!InvalidationKind::Nothing.changed());
    }
}
