//! Control-flow graph over basic blocks.

use crate::instruction::InstrId;

/// Unique identifier for a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);
}

/// A basic block: a run of instructions with normal and exceptional
/// out-edges.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub instructions: Vec<InstrId>,
    pub successors: Vec<BlockId>,
    /// Targets of exceptional edges out of this block (catch handlers).
    pub exceptional_successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
    pub exceptional_predecessors: Vec<BlockId>,
}

impl BasicBlock {
    /// True when no control flow leaves this block, normally or
    /// exceptionally.
    pub fn is_terminal(&self) -> bool {
        self.successors.is_empty() && self.exceptional_successors.is_empty()
    }
}

/// Control-flow graph of one method.
#[derive(Debug, Clone)]
pub struct Cfg {
    blocks: Vec<BasicBlock>,
}

impl Cfg {
    pub(crate) fn new(blocks: Vec<BasicBlock>) -> Self {
        Cfg { blocks }
    }

    pub fn entry(&self) -> BlockId {
        BlockId::ENTRY
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in reverse postorder from the entry, following both normal and
    /// exceptional edges. The usual seed order for forward dataflow.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        self.postorder_visit(BlockId::ENTRY, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    fn postorder_visit(&self, id: BlockId, visited: &mut [bool], out: &mut Vec<BlockId>) {
        if std::mem::replace(&mut visited[id.0 as usize], true) {
            return;
        }
        let block = self.block(id);
        for &succ in block.successors.iter().chain(&block.exceptional_successors) {
            self.postorder_visit(succ, visited, out);
        }
        out.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Cfg {
        // 0 -> {1, 2}, 1 -> 3, 2 -> 3
        let mut blocks = vec![BasicBlock::default(); 4];
        blocks[0].successors = vec![BlockId(1), BlockId(2)];
        blocks[1].successors = vec![BlockId(3)];
        blocks[1].predecessors = vec![BlockId(0)];
        blocks[2].successors = vec![BlockId(3)];
        blocks[2].predecessors = vec![BlockId(0)];
        blocks[3].predecessors = vec![BlockId(1), BlockId(2)];
        Cfg::new(blocks)
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry() {
        let cfg = diamond();
        let order = cfg.reverse_postorder();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], BlockId::ENTRY);
        // The join block comes after both branch blocks.
        assert_eq!(order[3], BlockId(3));
    }

    #[test]
    fn test_terminal_block_detection() {
        let cfg = diamond();
        assert!(!cfg.block(BlockId(0)).is_terminal());
        assert!(cfg.block(BlockId(3)).is_terminal());
    }
}
