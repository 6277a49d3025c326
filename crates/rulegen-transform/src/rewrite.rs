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

//! Rewrites a procedure's call sites once its units are synthesized: group
//! member ops drop out of the body, each head is replaced by capture loads
//! plus `Op::MakeUnit`, boundary values are parked in their temporaries, and
//! context-dependent calls outside any group get the context injected
//! directly. Jump-label positions are remapped to the rewritten vector.

use crate::errors::TransformError;
use crate::graph::{NodeId, OpGraph};
use crate::group::ActionGroup;
use crate::synth::{plan_context_injection, SynthesizedUnit};
use itertools::Itertools;
use rulegen_model::{Definition, Name, Offset, Op, Procedure, UnitSpec};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub fn rewrite_call_sites(
    proc: &mut Procedure,
    graph: &OpGraph,
    groups: &[ActionGroup],
    units: &[SynthesizedUnit],
) -> Result<(), TransformError> {
    proc.units = units
        .iter()
        .map(|u| UnitSpec {
            identity: u.code.identity.clone(),
            kind: u.code.kind,
            tag: u.tag.clone(),
        })
        .collect();

    let mut head_group: HashMap<NodeId, usize> = HashMap::new();
    let mut members: HashSet<NodeId> = HashSet::new();
    // boundary temporaries to fill, keyed by the member that would have
    // consumed the value; at that point the value is on top of the stack
    let mut boundary_pops: HashMap<NodeId, Vec<(NodeId, Name)>> = HashMap::new();
    for (gi, group) in groups.iter().enumerate() {
        head_group.insert(group.head, gi);
        members.extend(group.members.iter().copied());
        for b in &group.boundary {
            boundary_pops
                .entry(b.consumer)
                .or_default()
                .push((b.producer, b.temp));
        }
    }

    let outside_calls: Vec<NodeId> = graph
        .nodes
        .iter()
        .enumerate()
        .filter(|(i, n)| n.is_context_call && !members.contains(i))
        .map(|(i, _)| i)
        .collect();
    let inj = plan_context_injection(proc, graph, outside_calls.into_iter());

    // values stack in production order, so multiple pops at one consumer run
    // in reverse producer order
    let pops_at = |idx: NodeId| -> Vec<Name> {
        boundary_pops
            .get(&idx)
            .map(|pops| {
                pops.iter()
                    .sorted_by_key(|(producer, _)| *producer)
                    .rev()
                    .map(|(_, temp)| *temp)
                    .collect()
            })
            .unwrap_or_default()
    };

    let old_len = proc.ops.len();
    let mut new_ops: Vec<Op> = Vec::with_capacity(old_len);
    let mut index_map = vec![0usize; old_len + 1];
    for idx in 0..old_len {
        index_map[idx] = new_ops.len();

        if let Some(&gi) = head_group.get(&idx) {
            let group = &groups[gi];
            for temp in pops_at(idx) {
                new_ops.push(Op::Put(temp));
            }
            for cap in &group.captures {
                new_ops.push(Op::Push(cap.slot));
            }
            new_ops.push(Op::MakeUnit {
                unit: Offset(gi as u16),
                nargs: group.captures.len() as u16,
            });
            if let Some(after) = inj.after_target.get(&idx) {
                new_ops.extend(after.iter().cloned());
            }
            continue;
        }

        if members.contains(&idx) {
            for temp in pops_at(idx) {
                new_ops.push(Op::Put(temp));
            }
            continue;
        }

        if let Some(before) = inj.before_call.get(&idx) {
            new_ops.extend(before.iter().cloned());
        }
        new_ops.push(proc.ops[idx].clone());
        if let Some(after) = inj.after_target.get(&idx) {
            new_ops.extend(after.iter().cloned());
        }
    }
    index_map[old_len] = new_ops.len();

    for jl in &mut proc.jump_labels {
        let pos = jl.position.0 as usize;
        if pos > old_len {
            return Err(TransformError::LabelNotFound(jl.id));
        }
        jl.position = Offset(index_map[pos] as u16);
    }

    debug!(procedure = %proc.name, before = old_len, after = new_ops.len(), units = proc.units.len(), "rewrote call sites");
    proc.ops = new_ops;
    Ok(())
}

/// A rule body may only super-call rules the base definition actually has;
/// dispatch itself happens at realization time against the untransformed
/// procedure.
pub fn check_super_calls(proc: &Procedure, base: &Definition) -> Result<(), TransformError> {
    for op in &proc.ops {
        if let Op::CallSuper { rule, .. } = op {
            if base.procedure(rule).is_none() {
                return Err(TransformError::UnknownSuperRule {
                    procedure: proc.name.clone(),
                    rule: rule.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::group::{create_groups, default_classifier, mark_implicit_actions, prepare_groups};
    use crate::synth::synthesize_unit;
    use crate::testing::ProcBuilder;
    use pretty_assertions::assert_eq;
    use rulegen_model::Symbol;

    fn rewritten(mut p: Procedure) -> Procedure {
        let mut g = build_graph(&p).unwrap();
        mark_implicit_actions(&mut g, &p, default_classifier).unwrap();
        let mut groups = create_groups(&mut g, &p);
        prepare_groups(&mut p, &mut g, &mut groups);
        let units: Vec<_> = groups
            .iter()
            .map(|group| synthesize_unit(&mut p, &g, group).unwrap())
            .collect();
        rewrite_call_sites(&mut p, &g, &groups, &units).unwrap();
        p
    }

    #[test]
    fn test_group_replaced_by_capture_loads_and_make_unit() {
        let p = ProcBuilder::new("calc", "expression")
            .push("values")
            .helper("sum", 1)
            .helper("push_value", 1)
            .action(1)
            .call_rule("capture", 1)
            .ret()
            .build();
        let values = p.var_names.find_name("values").unwrap();
        let p = rewritten(p);
        assert_eq!(
            p.ops,
            vec![
                Op::Push(values),
                Op::MakeUnit { unit: Offset(0), nargs: 1 },
                Op::CallRule { rule: Symbol::mk("capture"), nargs: 1 },
                Op::Return,
            ]
        );
        assert_eq!(p.units.len(), 1);
        assert_eq!(p.units[0].identity, Symbol::mk("calc.expression_Action0"));
    }

    #[test]
    fn test_boundary_value_parked_in_temporary() {
        let p = ProcBuilder::new("calc", "r")
            .imm_str("shared")
            .helper("tick", 1)
            .dup()
            .put("x")
            .action(1)
            .call_rule("test", 1)
            .ret()
            .build();
        let x = p.var_names.find_name("x").unwrap();
        let tick = rulegen_model::HELPERS.find("tick").unwrap();
        let p = rewritten(p);
        let temp = p.var_names.find_name("$u0f0").unwrap();
        assert_eq!(
            p.ops,
            vec![
                Op::Imm(rulegen_model::Label(0)),
                Op::CallHelper { id: tick, nargs: 1 },
                Op::Dup,
                Op::Put(x),
                Op::Put(temp),
                Op::Push(temp),
                Op::MakeUnit { unit: Offset(0), nargs: 1 },
                Op::CallRule { rule: Symbol::mk("test"), nargs: 1 },
                Op::Return,
            ]
        );
    }

    #[test]
    fn test_direct_context_injection_with_target_store() {
        let p = ProcBuilder::new("calc", "r")
            .imm_str("k")
            .helper("tick", 1)
            .imm_int(7)
            .invoke(1)
            .call_rule("test", 1)
            .ret()
            .build();
        let tick = rulegen_model::HELPERS.find("tick").unwrap();
        let p = rewritten(p);
        let temp = p.var_names.find_name("$ctx3").unwrap();
        assert_eq!(
            p.ops,
            vec![
                Op::Imm(rulegen_model::Label(0)),
                Op::CallHelper { id: tick, nargs: 1 },
                Op::Dup,
                Op::Put(temp),
                Op::ImmInt(7),
                Op::Push(temp),
                Op::SetContext,
                Op::Invoke { nargs: 1 },
                Op::CallRule { rule: Symbol::mk("test"), nargs: 1 },
                Op::Return,
            ]
        );
    }

    #[test]
    fn test_unknown_super_rule_rejected() {
        let base = Definition::new(Symbol::mk("calc"));
        let p = ProcBuilder::new("calc", "r")
            .call_super("nope", 0)
            .call_rule("opt", 1)
            .ret()
            .build();
        let err = check_super_calls(&p, &base).unwrap_err();
        assert!(matches!(err, TransformError::UnknownSuperRule { .. }));
    }
}
