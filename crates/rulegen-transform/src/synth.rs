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

//! Synthesizes the executable body of each action group: the group's ops in
//! their original order, with capture loads rewritten to field reads, literal
//! slots remapped into a private table, and the parse context injected ahead
//! of context-dependent calls. The body ends with a `Return` yielding the
//! head's value.

use crate::errors::TransformError;
use crate::graph::{NodeId, OpGraph};
use crate::group::ActionGroup;
use rulegen_model::{Label, Literal, Offset, Op, Procedure, UnitCode};
use std::collections::HashMap;
use tracing::debug;

/// Ops to splice around context-dependent calls: the context must be assigned
/// onto the call's target immediately before the call, without re-evaluating
/// the target expression.
pub(crate) struct ContextInjection {
    /// Emitted immediately after the target producer.
    pub after_target: HashMap<NodeId, Vec<Op>>,
    /// Emitted immediately before the call itself.
    pub before_call: HashMap<NodeId, Vec<Op>>,
}

/// For a no-argument call whose target has a single consumer the target is
/// still on top of the stack at the call, so a plain `Dup`/`SetContext` pair
/// suffices. Otherwise the target is parked in a fresh temporary right where
/// it is produced, and reloaded for the context assignment.
pub(crate) fn plan_context_injection(
    proc: &mut Procedure,
    graph: &OpGraph,
    calls: impl Iterator<Item = NodeId>,
) -> ContextInjection {
    let mut inj = ContextInjection {
        after_target: HashMap::new(),
        before_call: HashMap::new(),
    };
    for call in calls {
        let Op::Invoke { nargs } = graph.nodes[call].op else {
            continue;
        };
        let Some(&target) = graph.nodes[call].predecessors.first() else {
            continue;
        };
        if nargs == 0 && graph.nodes[target].successors.len() <= 1 {
            inj.before_call
                .entry(call)
                .or_default()
                .extend([Op::Dup, Op::SetContext]);
        } else {
            let temp = proc.var_names.find_or_add_name(&format!("$ctx{}", call));
            inj.after_target
                .entry(target)
                .or_default()
                .extend([Op::Dup, Op::Put(temp)]);
            inj.before_call
                .entry(call)
                .or_default()
                .extend([Op::Push(temp), Op::SetContext]);
        }
    }
    inj
}

#[derive(Clone, Debug)]
pub struct SynthesizedUnit {
    pub code: UnitCode,
    pub tag: String,
}

pub fn synthesize_unit(
    proc: &mut Procedure,
    graph: &OpGraph,
    group: &ActionGroup,
) -> Result<SynthesizedUnit, TransformError> {
    let boundary_fields: HashMap<NodeId, Offset> = group
        .boundary
        .iter()
        .map(|b| (b.producer, b.field))
        .collect();
    let member_calls: Vec<NodeId> = group
        .members
        .iter()
        .copied()
        .filter(|m| graph.nodes[*m].is_context_call)
        .collect();
    let inj = plan_context_injection(proc, graph, member_calls.into_iter());

    let lo = group
        .members
        .iter()
        .copied()
        .chain(boundary_fields.keys().copied())
        .min()
        .unwrap_or(group.head);

    let mut literals: Vec<Literal> = vec![];
    let mut ops: Vec<Op> = vec![];
    for idx in lo..=group.head {
        if let Some(field) = boundary_fields.get(&idx) {
            ops.push(Op::LoadField(*field));
            if let Some(after) = inj.after_target.get(&idx) {
                ops.extend(after.iter().cloned());
            }
            continue;
        }
        if !group.members.contains(&idx) {
            continue;
        }
        if let Some(before) = inj.before_call.get(&idx) {
            ops.extend(before.iter().cloned());
        }
        let node = &graph.nodes[idx];
        let op = match &node.op {
            Op::Push(slot) if node.is_capture_load => {
                let field = group.capture_fields.get(slot).ok_or_else(|| {
                    TransformError::CodeGenerationFailed {
                        unit: group.identity.clone(),
                        reason: format!("no field for captured slot {:?}", slot),
                    }
                })?;
                Op::LoadField(*field)
            }
            Op::Imm(l) => {
                let lit = proc.literal(*l).ok_or(TransformError::LabelNotFound(*l))?;
                let slot = match literals.iter().position(|x| x == lit) {
                    Some(pos) => pos,
                    None => {
                        literals.push(lit.clone());
                        literals.len() - 1
                    }
                };
                Op::Imm(Label(slot as u16))
            }
            other => other.clone(),
        };
        ops.push(op);
        if let Some(after) = inj.after_target.get(&idx) {
            ops.extend(after.iter().cloned());
        }
    }

    if ops.is_empty() {
        return Err(TransformError::CodeGenerationFailed {
            unit: group.identity.clone(),
            reason: "no body generated".to_string(),
        });
    }
    ops.push(Op::Return);
    debug!(unit = %group.identity, ops = ops.len(), captures = group.captures.len(), "synthesized unit");

    Ok(SynthesizedUnit {
        code: UnitCode {
            identity: group.identity.clone(),
            kind: group.kind,
            captures: group.captures.clone(),
            literals,
            ops,
            env_width: proc.var_names.width() as u16,
        },
        tag: group.tag.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::group::{create_groups, default_classifier, mark_implicit_actions, prepare_groups};
    use crate::testing::ProcBuilder;
    use pretty_assertions::assert_eq;
    use rulegen_model::UnitKind;

    fn synth_first(p: &mut Procedure) -> SynthesizedUnit {
        let mut g = build_graph(p).unwrap();
        mark_implicit_actions(&mut g, p, default_classifier).unwrap();
        let mut groups = create_groups(&mut g, p);
        prepare_groups(p, &mut g, &mut groups);
        synthesize_unit(p, &g, &groups[0]).unwrap()
    }

    #[test]
    fn test_capture_loads_become_field_reads() {
        let mut p = ProcBuilder::new("calc", "expression")
            .push("values")
            .helper("sum", 1)
            .helper("push_value", 1)
            .action(1)
            .call_rule("capture", 1)
            .ret()
            .build();
        let sum = rulegen_model::HELPERS.find("sum").unwrap();
        let push_value = rulegen_model::HELPERS.find("push_value").unwrap();
        let unit = synth_first(&mut p);
        assert_eq!(
            unit.code.ops,
            vec![
                Op::LoadField(Offset(0)),
                Op::CallHelper { id: sum, nargs: 1 },
                Op::CallHelper { id: push_value, nargs: 1 },
                Op::CallAction { nargs: 1 },
                Op::Return,
            ]
        );
        assert_eq!(unit.code.kind, UnitKind::Action);
        assert_eq!(unit.code.captures.len(), 1);
    }

    #[test]
    fn test_literals_are_remapped_into_private_table() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_str("x")
            .call_rule("ch", 1)
            .imm_str("y")
            .imm_str("z")
            .helper("concat", 2)
            .action(1)
            .call_rule("seq", 2)
            .ret()
            .build();
        let concat = rulegen_model::HELPERS.find("concat").unwrap();
        let unit = synth_first(&mut p);
        // the body's literal slots start at zero regardless of the origin table
        assert_eq!(
            unit.code.ops,
            vec![
                Op::Imm(Label(0)),
                Op::Imm(Label(1)),
                Op::CallHelper { id: concat, nargs: 2 },
                Op::CallAction { nargs: 1 },
                Op::Return,
            ]
        );
        assert_eq!(
            unit.code.literals,
            vec![Literal::Str("y".to_string()), Literal::Str("z".to_string())]
        );
    }

    #[test]
    fn test_boundary_value_read_through_field() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_str("shared")
            .helper("tick", 1)
            .dup()
            .put("x")
            .action(1)
            .call_rule("test", 1)
            .ret()
            .build();
        let unit = synth_first(&mut p);
        assert_eq!(
            unit.code.ops,
            vec![
                Op::LoadField(Offset(0)),
                Op::CallAction { nargs: 1 },
                Op::Return,
            ]
        );
    }
}
