// Copyright (C) 2024 Ryan Daum <ryan.daum@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Partitions a procedure's dependency graph into action groups: for each
//! deferral head, the connected set of nodes whose values exist only to feed
//! that head. Nodes with a consumer outside the forming group stay behind and
//! surface as captured values instead.

use crate::errors::TransformError;
use crate::graph::{GroupId, NodeId, OpGraph};
use itertools::Itertools;
use rulegen_model::{
    ArgCount, CaptureKind, CapturedVariable, Helper, Name, Offset, Op, Procedure, ReturnKind,
    Symbol, UnitKind, HELPERS,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Decides whether a helper call must be deferred into an action unit, given
/// the descriptor of the called helper and the op consuming its result.
pub type ActionClassifier = fn(&Helper, &Op) -> bool;

/// The default boundary rule: a helper result consumed by a rule-construction
/// call is only consumable inline when it is itself a rule tree or a variable
/// handle; plain values, booleans and context-dependent results must be
/// deferred to match time.
pub fn default_classifier(helper: &Helper, consumer: &Op) -> bool {
    let consumed_by_rule = matches!(consumer, Op::CallRule { .. } | Op::CallSuper { .. });
    consumed_by_rule
        && (helper.context_dependent
            || matches!(helper.returns, ReturnKind::Value | ReturnKind::Bool))
}

/// One value produced outside a group but consumed inside it. The rewriter
/// parks it in a fresh temporary at the consumer's original position; the
/// unit captures the temporary.
#[derive(Clone, Debug)]
pub struct BoundaryValue {
    pub producer: NodeId,
    pub consumer: NodeId,
    pub temp: Name,
    pub field: Offset,
}

#[derive(Clone, Debug)]
pub struct ActionGroup {
    pub id: GroupId,
    pub head: NodeId,
    pub kind: UnitKind,
    /// Member node ids, in op order. Never overlaps another group.
    pub members: BTreeSet<NodeId>,
    /// Captured fields in first-use order: locals read inside the group plus
    /// boundary temporaries.
    pub captures: Vec<CapturedVariable>,
    /// Local slot -> field offset, for rewriting capture loads.
    pub capture_fields: HashMap<Name, Offset>,
    pub boundary: Vec<BoundaryValue>,
    /// Install key of the synthesized unit, unique within the process.
    pub identity: Symbol,
    /// Diagnostic tag naming the source expression.
    pub tag: String,
}

/// Marks implicit deferral heads: helper calls the classifier rules out of
/// inline consumption, and non-trivial initializer expressions of variable
/// handles (those become var-init groups).
pub fn mark_implicit_actions(
    graph: &mut OpGraph,
    proc: &Procedure,
    classifier: ActionClassifier,
) -> Result<(), TransformError> {
    for i in 0..graph.nodes.len() {
        let Op::CallHelper { id, .. } = graph.nodes[i].op else {
            continue;
        };
        let desc = HELPERS
            .descriptor(id)
            .ok_or(TransformError::HelperNotFound(id))?;

        let deferred = graph.nodes[i]
            .successors
            .iter()
            .any(|s| classifier(desc, &graph.nodes[*s].op));
        if deferred {
            debug!(procedure = %proc.name, op = i, helper = %desc.name, "implicit action");
            graph.nodes[i].action_head = true;
        }

        // A handle-yielding helper taking an initializer defers the
        // initializer expression unless it is a trivial constant or load.
        if desc.returns == ReturnKind::Slot && matches!(desc.max_args, ArgCount::Q(n) if n >= 2) {
            if let Some(&init) = graph.nodes[i].predecessors.get(1) {
                let trivial = matches!(
                    graph.nodes[init].op,
                    Op::Imm(_) | Op::ImmInt(_) | Op::ImmNone | Op::Push(_)
                );
                if !trivial && !graph.nodes[init].action_head {
                    debug!(procedure = %proc.name, op = init, "deferred var initializer");
                    graph.nodes[init].var_init_head = true;
                }
            }
        }
    }
    Ok(())
}

/// Forms one group per head by backward absorption: a candidate joins when it
/// is unclaimed, not itself a head, and every consumer of its outputs is
/// already inside. Iterated to a fixpoint since absorbing one consumer can
/// make a shared producer absorbable.
pub fn create_groups(graph: &mut OpGraph, proc: &Procedure) -> Vec<ActionGroup> {
    let heads: Vec<(NodeId, UnitKind)> = graph
        .nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| {
            if n.action_head {
                Some((i, UnitKind::Action))
            } else if n.var_init_head {
                Some((i, UnitKind::VarInit))
            } else {
                None
            }
        })
        .collect();

    let mut groups = Vec::with_capacity(heads.len());
    let mut action_count = 0;
    let mut var_init_count = 0;
    for (head, kind) in heads {
        let gid = GroupId(groups.len() as u16);
        let mut members = BTreeSet::from([head]);
        graph.nodes[head].group = Some(gid);

        loop {
            let candidates: Vec<NodeId> = members
                .iter()
                .flat_map(|m| graph.nodes[*m].predecessors.iter().copied())
                .filter(|p| !members.contains(p))
                .unique()
                .collect();
            let mut grew = false;
            for cand in candidates {
                let n = &graph.nodes[cand];
                if n.group.is_some() || n.action_head || n.var_init_head {
                    continue;
                }
                if n.successors.iter().all(|s| members.contains(s)) {
                    members.insert(cand);
                    graph.nodes[cand].group = Some(gid);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let n = match kind {
            UnitKind::Action => {
                action_count += 1;
                action_count - 1
            }
            UnitKind::VarInit => {
                var_init_count += 1;
                var_init_count - 1
            }
        };
        let identity = Symbol::mk(&format!(
            "{}.{}_{}{}",
            proc.definition, proc.name, kind, n
        ));
        let tag = format!("{}.{}:{}", proc.definition, proc.name, head);
        debug!(procedure = %proc.name, %identity, members = members.len(), "formed group");
        groups.push(ActionGroup {
            id: gid,
            head,
            kind,
            members,
            captures: vec![],
            capture_fields: HashMap::new(),
            boundary: vec![],
            identity,
            tag,
        });
    }
    groups
}

/// Finalizes each group's capture set: assigns field offsets in first-use
/// order, flags capture loads on the graph, and allocates a fresh temporary
/// local for every boundary value.
pub fn prepare_groups(proc: &mut Procedure, graph: &mut OpGraph, groups: &mut [ActionGroup]) {
    enum Event {
        Local(NodeId, Name),
        Boundary(NodeId, NodeId),
    }

    for group in groups.iter_mut() {
        let mut events: Vec<(usize, Event)> = vec![];
        for &m in &group.members {
            if let Op::Push(slot) = graph.nodes[m].op {
                events.push((m, Event::Local(m, slot)));
            }
            for &p in &graph.nodes[m].predecessors {
                if !group.members.contains(&p) {
                    events.push((p, Event::Boundary(p, m)));
                }
            }
        }
        events.sort_by_key(|(pos, _)| *pos);

        for (_, event) in events {
            match event {
                Event::Local(node, slot) => {
                    graph.nodes[node].is_capture_load = true;
                    if !group.capture_fields.contains_key(&slot) {
                        let field = Offset(group.captures.len() as u16);
                        group.captures.push(CapturedVariable {
                            slot,
                            kind: CaptureKind::Local,
                        });
                        group.capture_fields.insert(slot, field);
                    }
                }
                Event::Boundary(producer, consumer) => {
                    let field = Offset(group.captures.len() as u16);
                    let temp = proc
                        .var_names
                        .find_or_add_name(&format!("$u{}f{}", group.id.0, field.0));
                    group.captures.push(CapturedVariable {
                        slot: temp,
                        kind: CaptureKind::Temp,
                    });
                    group.boundary.push(BoundaryValue {
                        producer,
                        consumer,
                        temp,
                        field,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::testing::ProcBuilder;
    use pretty_assertions::assert_eq;

    fn grouped(p: &mut Procedure) -> (OpGraph, Vec<ActionGroup>) {
        let mut g = build_graph(p).unwrap();
        mark_implicit_actions(&mut g, p, default_classifier).unwrap();
        let mut groups = create_groups(&mut g, p);
        prepare_groups(p, &mut g, &mut groups);
        (g, groups)
    }

    #[test]
    fn test_explicit_action_absorbs_operand_chain() {
        let mut p = ProcBuilder::new("calc", "expression")
            .push("values")
            .helper("sum", 1)
            .helper("push_value", 1)
            .action(1)
            .call_rule("capture", 1)
            .ret()
            .build();
        let (g, groups) = grouped(&mut p);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.head, 3);
        assert_eq!(group.members, BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(group.kind, UnitKind::Action);
        // the outside-defined local surfaces as exactly one capture
        assert_eq!(group.captures.len(), 1);
        assert_eq!(group.captures[0].kind, CaptureKind::Local);
        assert!(g.node(0).is_capture_load);
    }

    #[test]
    fn test_shared_producer_is_a_boundary_capture() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_str("shared")
            .helper("tick", 1)
            .dup()
            .put("x")
            .action(1)
            .call_rule("test", 1)
            .ret()
            .build();
        let (_, groups) = grouped(&mut p);
        let group = &groups[0];
        // the Dup feeds both the store (outside) and the action (inside), so
        // it is not absorbed; its value arrives through a temporary
        assert_eq!(group.members, BTreeSet::from([4]));
        assert_eq!(group.boundary.len(), 1);
        assert_eq!(group.boundary[0].producer, 2);
        assert_eq!(group.boundary[0].consumer, 4);
        assert_eq!(group.captures.len(), 1);
        assert_eq!(group.captures[0].kind, CaptureKind::Temp);
    }

    #[test]
    fn test_implicit_action_from_value_helper() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_int(1)
            .imm_int(2)
            .helper("append", 2)
            .call_rule("capture", 1)
            .ret()
            .build();
        let (g, groups) = grouped(&mut p);
        assert_eq!(groups.len(), 1);
        assert!(g.node(2).action_head);
        assert_eq!(groups[0].members, BTreeSet::from([0, 1, 2]));
        assert_eq!(groups[0].kind, UnitKind::Action);
        assert!(groups[0].captures.is_empty());
    }

    #[test]
    fn test_slot_helper_is_consumable_inline() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_str("acc")
            .helper("state_slot", 1)
            .call_rule("capture", 1)
            .ret()
            .build();
        let (_, groups) = grouped(&mut p);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_var_init_group_for_computed_initializer() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_str("acc")
            .imm_str("a")
            .imm_str("b")
            .helper("concat", 2)
            .helper("state_slot", 2)
            .call_rule("capture", 1)
            .ret()
            .build();
        let (g, groups) = grouped(&mut p);
        assert_eq!(groups.len(), 1);
        assert!(g.node(3).var_init_head);
        assert_eq!(groups[0].kind, UnitKind::VarInit);
        assert_eq!(groups[0].members, BTreeSet::from([1, 2, 3]));
        assert_eq!(groups[0].identity, Symbol::mk("calc.r_VarInit0"));
    }

    #[test]
    fn test_constant_initializer_stays_inline() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_str("acc")
            .imm_int(0)
            .helper("state_slot", 2)
            .call_rule("capture", 1)
            .ret()
            .build();
        let (_, groups) = grouped(&mut p);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_groups_never_overlap() {
        let mut p = ProcBuilder::new("calc", "r")
            .push("values")
            .helper("sum", 1)
            .action(1)
            .push("values")
            .helper("sum", 1)
            .action(1)
            .call_rule("seq", 2)
            .ret()
            .build();
        let (g, groups) = grouped(&mut p);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, BTreeSet::from([0, 1, 2]));
        assert_eq!(groups[1].members, BTreeSet::from([3, 4, 5]));
        assert_eq!(groups[0].identity, Symbol::mk("calc.r_Action0"));
        assert_eq!(groups[1].identity, Symbol::mk("calc.r_Action1"));
        for (i, n) in g.nodes.iter().enumerate().take(6) {
            assert!(n.group.is_some(), "node {} should be claimed", i);
        }
    }
}
