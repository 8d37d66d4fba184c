//! Cleanup passes run after a program has been patched.

use log::{debug, warn};

use crate::ir::Program;

mod fold;
mod unreachable;
mod value_numbering;

pub use fold::ConstantConditionFold;
pub use unreachable::UnreachableBlockElimination;
pub use value_numbering::ValueNumbering;

/// Upper bound on simplification rounds.
pub const MAX_ITERATIONS: usize = 64;

/// A program-to-program cleanup pass.
pub trait Pass {
    fn name(&self) -> &'static str;
    /// Returns whether the program changed.
    fn run(&self, program: &mut Program) -> bool;
}

/// Runs value numbering, constant-condition folding and unreachable-block
/// elimination until none of them changes the program.
pub fn simplify(program: &mut Program) -> bool {
    run_to_fixed_point(
        program,
        &[
            &ValueNumbering,
            &ConstantConditionFold,
            &UnreachableBlockElimination,
        ],
    )
}

fn run_to_fixed_point(program: &mut Program, passes: &[&dyn Pass]) -> bool {
    let mut changed = false;
    for round in 0..MAX_ITERATIONS {
        let mut round_changed = false;
        for pass in passes {
            if pass.run(program) {
                debug!("simplify round {round}: {} changed the program", pass.name());
                round_changed = true;
            }
        }
        if !round_changed {
            return changed;
        }
        changed = true;
    }
    warn!("simplification stopped after {MAX_ITERATIONS} rounds without reaching a fixed point");
    changed
}
