//! Worklist-based intraprocedural fixed-point solver.
//!
//! Drives a forward dataflow analysis over a method's CFG:
//! - blocks are seeded in reverse postorder
//! - a block's entry state is the join of its predecessors' exit states,
//!   with per-edge hooks for normal and exceptional predecessors
//! - the fixed point is detected by lattice equality of block exit states
//!
//! A transfer function may abort the whole run ([`TransferResult::Fail`]);
//! that outcome is reported distinctly from both convergence and divergence
//! so callers can fall back to their conservative result.

use crate::state::JoinLattice;
use shrike_ir::{BlockId, Cfg, Instruction, IrCode};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::trace;

const MAX_ITERATIONS: usize = 10_000;

/// Outcome of one transfer step.
#[derive(Debug)]
pub enum TransferResult<S> {
    State(S),
    /// Abort the analysis: no useful information can be derived.
    Fail,
}

/// Per-instruction transfer function of a forward analysis.
pub trait TransferFunction {
    type State: JoinLattice;

    fn transfer(
        &mut self,
        instruction: &Instruction,
        state: Self::State,
    ) -> TransferResult<Self::State>;

    /// Applied to a normal predecessor's exit state before the block-entry
    /// join. Pass-through unless the analysis forks state per edge.
    fn block_entry_state(
        &mut self,
        _block: BlockId,
        _predecessor: BlockId,
        state: Self::State,
    ) -> Self::State {
        state
    }

    /// Applied to an exceptional predecessor's exit state. The exit state
    /// over-approximates the state at every throwing instruction of the
    /// predecessor, which is sound for fact-accumulating lattices.
    fn exceptional_block_entry_state(
        &mut self,
        _block: BlockId,
        _throw_block: BlockId,
        state: Self::State,
    ) -> Self::State {
        state
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SolveError {
    /// The transfer function aborted the run.
    #[error("transfer function aborted the analysis")]
    Failed,
    #[error("dataflow failed to converge after {0} iterations")]
    Diverged(usize),
}

/// Converged analysis result: exit state per reachable block.
#[derive(Debug)]
pub struct DataflowResult<S> {
    pub block_exit_states: HashMap<BlockId, S>,
    pub iterations: usize,
}

impl<S: JoinLattice> DataflowResult<S> {
    /// Join of the exit states of all terminal blocks (no normal or
    /// exceptional successors): everything that can leave the method.
    pub fn join_terminal_states(&self, cfg: &Cfg) -> S {
        let mut joined = S::bottom();
        for id in cfg.block_ids() {
            if cfg.block(id).is_terminal() {
                if let Some(state) = self.block_exit_states.get(&id) {
                    joined = joined.join(state);
                }
            }
        }
        joined
    }
}

/// Forward worklist solver.
#[derive(Debug)]
pub struct IntraproceduralSolver {
    max_iterations: usize,
}

impl Default for IntraproceduralSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IntraproceduralSolver {
    pub fn new() -> Self {
        IntraproceduralSolver {
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Run `transfer` to a fixed point from the entry block, starting from
    /// `entry_state`.
    pub fn solve<T: TransferFunction>(
        &self,
        code: &IrCode,
        transfer: &mut T,
        entry_state: T::State,
    ) -> Result<DataflowResult<T::State>, SolveError> {
        let cfg = code.cfg();
        let mut exit_states: HashMap<BlockId, T::State> = HashMap::new();

        let order = cfg.reverse_postorder();
        let mut worklist: VecDeque<BlockId> = order.iter().copied().collect();
        let mut in_worklist: HashSet<BlockId> = worklist.iter().copied().collect();

        let mut iterations = 0;
        while let Some(block_id) = worklist.pop_front() {
            in_worklist.remove(&block_id);
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(SolveError::Diverged(self.max_iterations));
            }

            let block = cfg.block(block_id);

            // Block entry: join the predecessor exit states through the
            // per-edge hooks. Unprocessed predecessors contribute Bottom.
            let mut in_state = if block_id == cfg.entry() {
                entry_state.clone()
            } else {
                T::State::bottom()
            };
            for &pred in &block.predecessors {
                if let Some(exit) = exit_states.get(&pred) {
                    let contribution = transfer.block_entry_state(block_id, pred, exit.clone());
                    in_state = in_state.join(&contribution);
                }
            }
            for &pred in &block.exceptional_predecessors {
                if let Some(exit) = exit_states.get(&pred) {
                    let contribution =
                        transfer.exceptional_block_entry_state(block_id, pred, exit.clone());
                    in_state = in_state.join(&contribution);
                }
            }

            let mut state = in_state;
            for &instr_id in &block.instructions {
                match transfer.transfer(code.instruction(instr_id), state) {
                    TransferResult::State(next) => state = next,
                    TransferResult::Fail => {
                        trace!(?block_id, ?instr_id, "transfer aborted the analysis");
                        return Err(SolveError::Failed);
                    }
                }
            }

            let changed = exit_states
                .get(&block_id)
                .map_or(true, |old| *old != state);
            if changed {
                exit_states.insert(block_id, state);
                for &succ in block
                    .successors
                    .iter()
                    .chain(&block.exceptional_successors)
                {
                    if in_worklist.insert(succ) {
                        worklist.push_back(succ);
                    }
                }
            }
        }

        trace!(iterations, "dataflow converged");
        Ok(DataflowResult {
            block_exit_states: exit_states,
            iterations,
        })
    }
}
