// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Join barrier bookkeeping.
//!
//! Branches reaching a join node park here until the node's required number
//! of arrivals is met. The waiting contexts are then merged in arrival order
//! (later arrivals win on key conflicts) and a single branch continues
//! through the join node. Routed tasks carried by the arrivals are folded
//! into one: the latest arrival's task, with every arrival's `input_data`
//! merged in arrival order. The barrier resets afterwards, so a join inside
//! a cycle can fire again.

use super::branch::Branch;
use crate::domain::agent::Task;
use crate::domain::execution::{BranchId, Context};
use crate::domain::graph::NodeId;
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct JoinTable {
    waiting: HashMap<NodeId, Vec<Branch>>,
}

impl JoinTable {
    /// Park `branch`. Returns the merged branch once `required` have arrived.
    pub(crate) fn arrive(
        &mut self,
        branch: Branch,
        required: usize,
        next_id: impl FnOnce() -> BranchId,
    ) -> Option<Branch> {
        let node = branch.node.clone();
        let arrivals = self.waiting.entry(node.clone()).or_default();
        arrivals.push(branch);
        if arrivals.len() < required {
            return None;
        }

        let arrivals = self.waiting.remove(&node).unwrap_or_default();
        let mut context = Context::new();
        let mut task: Option<Task> = None;
        for arrival in arrivals {
            context.merge(&arrival.context);
            if let Some(routed) = arrival.task {
                task = Some(match task {
                    Some(earlier) => {
                        let mut input_data = earlier.input_data;
                        input_data.extend(routed.input_data);
                        Task { input_data, ..routed }
                    }
                    None => routed,
                });
            }
        }
        Some(Branch::joined(next_id(), node, context, task))
    }

    /// Joins still short of arrivals: (node, arrived)
    pub(crate) fn incomplete(&self) -> Vec<(NodeId, usize)> {
        let mut pending: Vec<(NodeId, usize)> = self
            .waiting
            .iter()
            .filter(|(_, arrivals)| !arrivals.is_empty())
            .map(|(node, arrivals)| (node.clone(), arrivals.len()))
            .collect();
        pending.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        pending
    }

    /// Contexts of parked branches, for the partial state
    pub(crate) fn parked_contexts(&self) -> impl Iterator<Item = &Context> {
        self.waiting.values().flatten().map(|b| &b.context)
    }
}
