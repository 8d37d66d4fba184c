//! Instruction-level patches applied to method programs of a known set of
//! target methods.

use log::{debug, trace};

use crate::error::PatchError;
use crate::ir::Program;
use crate::rename::Renamer;
use crate::simplify::simplify;

mod edit;
mod replace;
mod stub;
mod table;

pub use replace::replace_classes;
pub use table::{PatchEntry, PatchTable, ReplacementAction, ReturnValue};

/// Method whose program is being materialized.
#[derive(Clone, Copy, Debug)]
pub struct PatchTarget<'a> {
    pub class: &'a str,
    pub method: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
}

/// Result of [`Patcher::transform`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchOutcome {
    /// No patch applies to the target.
    Untouched,
    /// A patch applies but the program already has its effect.
    Unchanged,
    Patched,
}

/// Applies the patch table and the class replacement table to programs.
/// Built once from the configuration, then shared read-only.
#[derive(Clone, Debug, Default)]
pub struct Patcher {
    table: PatchTable,
    class_replacements: Renamer,
}

impl Patcher {
    pub fn new(table: PatchTable, class_replacements: Renamer) -> Self {
        Patcher {
            table,
            class_replacements,
        }
    }

    pub fn table(&self) -> &PatchTable {
        &self.table
    }

    /// Patches `program` in place. The program is validated before and after;
    /// on error it is left exactly as it was passed in.
    pub fn transform(
        &self,
        target: &PatchTarget<'_>,
        program: &mut Program,
    ) -> Result<PatchOutcome, PatchError> {
        program.validate()?;

        let mut working = program.clone();
        let outcome = self.apply(target, &mut working)?;
        working.validate()?;
        if outcome == PatchOutcome::Patched {
            *program = working;
        }
        Ok(outcome)
    }

    fn apply(&self, target: &PatchTarget<'_>, program: &mut Program) -> Result<PatchOutcome, PatchError> {
        let replaced = if self.class_replacements.is_identity() {
            false
        } else {
            replace_classes(program, &self.class_replacements)?
        };

        let Some(action) = self
            .table
            .lookup(target.class, target.method, target.descriptor)
        else {
            trace!(
                "no patch for {}.{}{}",
                target.class, target.method, target.descriptor
            );
            return Ok(if replaced {
                PatchOutcome::Patched
            } else {
                PatchOutcome::Untouched
            });
        };

        let changed = match action {
            ReplacementAction::StubReturn { value } => {
                install(program, stub::return_stub(target, value)?)
            }
            ReplacementAction::StubVoid => install(program, stub::void_stub(target)?),
            ReplacementAction::StubThrow { exception } => {
                install(program, stub::throw_stub(target, exception)?)
            }
            ReplacementAction::DeleteCall { class, method } => {
                edit::delete_calls(program, class, method)?
            }
            ReplacementAction::ReplaceField { field, value, .. } => {
                edit::replace_field_reads(program, field, value)
            }
        };
        if changed && action.edits_in_place() {
            simplify(program);
        }

        if changed || replaced {
            debug!(
                "patched {}.{}{} with {:?}",
                target.class, target.method, target.descriptor, action
            );
            Ok(PatchOutcome::Patched)
        } else {
            Ok(PatchOutcome::Unchanged)
        }
    }
}

fn install(program: &mut Program, stub: Program) -> bool {
    if *program == stub {
        return false;
    }
    *program = stub;
    true
}
