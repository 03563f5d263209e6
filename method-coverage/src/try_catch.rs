// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use method_flow::{Label, TryCatchBlock};

/// Exception handler ranges grouped by the try block they protect.
///
/// Ranges are grouped by start label. A catch-all range whose handler was
/// already registered by another try block joins that block's group, which
/// folds the `finally` ranges the compiler emits around catch handlers into
/// the group of the outer try block.
#[derive(Clone, Debug, Default)]
pub struct TryCatchIndex {
    groups: Vec<TryGroup>,
    group_index: HashMap<Label, usize>,
    finally_owners: HashMap<Label, Label>,
}

/// All ranges of one logical try block, in declaration order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TryGroup {
    pub start: Label,
    pub blocks: Vec<TryCatchBlock>,
}

impl TryGroup {
    pub fn has_finally(&self) -> bool {
        self.blocks.iter().any(TryCatchBlock::is_finally)
    }

    pub fn has_catch(&self) -> bool {
        self.blocks.iter().any(|b| !b.is_finally())
    }

    /// End label of the last typed catch range.
    pub fn catch_end(&self) -> Option<Label> {
        self.blocks
            .iter()
            .rev()
            .find(|b| !b.is_finally())
            .map(|b| b.end)
    }
}

impl TryCatchIndex {
    pub fn insert(&mut self, block: TryCatchBlock) {
        // A handler that covers its own entry never starts a copy of anything.
        if block.start == block.handler {
            return;
        }

        let mut key = block.start;

        if block.is_finally() {
            key = *self.finally_owners.entry(block.handler).or_insert(block.start);
        }

        let index = match self.group_index.get(&key) {
            Some(index) => *index,
            None => {
                self.groups.push(TryGroup {
                    start: key,
                    blocks: vec![],
                });
                self.group_index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };

        self.groups[index].blocks.push(block);
    }

    /// Groups in the order their first range was declared.
    pub fn groups(&self) -> &[TryGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
