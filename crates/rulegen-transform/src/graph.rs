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

//! Builds the operand dependency graph of a procedure by simulating the
//! abstract operand stack over its op vector. Each node's predecessors are
//! the producers of the values it consumes; a value consumed in more than one
//! place always goes through an explicit `Op::Dup` node, so every produced
//! value has exactly one consumer edge.

use crate::errors::TransformError;
use rulegen_model::{Op, Procedure, HELPERS};

pub type NodeId = usize;

/// Identifies one action group within a procedure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(pub u16);

#[derive(Clone, Debug)]
pub struct OperationNode {
    pub op: Op,
    /// Producers of this op's operands, in push order.
    pub predecessors: Vec<NodeId>,
    /// Consumers of this op's outputs, in consumption order.
    pub successors: Vec<NodeId>,
    /// The op's target must receive the parse context before the call.
    pub is_context_call: bool,
    /// A local load whose value is defined outside the node's group; becomes
    /// a field read in the synthesized unit.
    pub is_capture_load: bool,
    /// Grouping must not pull this node across a group boundary it doesn't
    /// wholly own.
    pub side_effecting: bool,
    /// Heads an explicit or implicit action group.
    pub action_head: bool,
    /// Heads a deferred variable-initializer group.
    pub var_init_head: bool,
    pub group: Option<GroupId>,
}

impl OperationNode {
    fn new(op: Op) -> Self {
        OperationNode {
            op,
            predecessors: vec![],
            successors: vec![],
            is_context_call: false,
            is_capture_load: false,
            side_effecting: false,
            action_head: false,
            var_init_head: false,
            group: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpGraph {
    pub nodes: Vec<OperationNode>,
}

impl OpGraph {
    pub fn node(&self, id: NodeId) -> &OperationNode {
        &self.nodes[id]
    }
}

/// How many values the op pops and pushes.
pub fn stack_effect(op: &Op) -> (usize, usize) {
    match op {
        Op::Imm(_) | Op::ImmInt(_) | Op::ImmNone | Op::Push(_) | Op::ReadState(_)
        | Op::LoadField(_) => (0, 1),
        Op::Put(_) | Op::Pop | Op::WriteState(_) | Op::SetContext | Op::Return => (1, 0),
        Op::Jump { .. } => (0, 0),
        Op::Dup => (1, 2),
        Op::CallRule { nargs, .. }
        | Op::CallSuper { nargs, .. }
        | Op::CallHelper { nargs, .. }
        | Op::CallAction { nargs }
        | Op::MakeUnit { nargs, .. } => (*nargs as usize, 1),
        Op::Invoke { nargs } => (*nargs as usize + 1, 1),
    }
}

pub fn build_graph(proc: &Procedure) -> Result<OpGraph, TransformError> {
    let mut nodes: Vec<OperationNode> = Vec::with_capacity(proc.ops.len());
    let mut stack: Vec<NodeId> = vec![];

    for (i, op) in proc.ops.iter().enumerate() {
        let mut node = OperationNode::new(op.clone());
        let (pops, pushes) = stack_effect(op);
        if stack.len() < pops {
            return Err(TransformError::MalformedProcedure {
                procedure: proc.name.clone(),
                reason: format!("operand stack underflow at op {} ({:?})", i, op),
            });
        }
        let preds = stack.split_off(stack.len() - pops);
        for p in &preds {
            nodes[*p].successors.push(i);
        }
        node.predecessors = preds;

        match op {
            Op::Push(n) | Op::Put(n) => {
                if n.0 as usize >= proc.var_names.width() {
                    return Err(TransformError::NameNotFound(*n));
                }
            }
            Op::CallHelper { id, .. } => {
                let desc = HELPERS
                    .descriptor(*id)
                    .ok_or(TransformError::HelperNotFound(*id))?;
                node.side_effecting = desc.side_effecting;
            }
            Op::ReadState(_) | Op::WriteState(_) => node.side_effecting = true,
            Op::Invoke { .. } => node.is_context_call = true,
            Op::CallAction { .. } => node.action_head = true,
            _ => {}
        }

        for _ in 0..pushes {
            stack.push(i);
        }
        nodes.push(node);
    }

    if !stack.is_empty() {
        return Err(TransformError::MalformedProcedure {
            procedure: proc.name.clone(),
            reason: format!("{} values left on the operand stack at end of body", stack.len()),
        });
    }

    Ok(OpGraph { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ProcBuilder;
    use pretty_assertions::assert_eq;
    use rulegen_model::Label;
    use test_case::test_case;

    #[test_case(Op::ImmNone, 0, 1; "constants produce one value")]
    #[test_case(Op::Dup, 1, 2; "dup consumes its input and yields two")]
    #[test_case(Op::Pop, 1, 0; "pop discards one")]
    #[test_case(Op::Jump { label: Label(0) }, 0, 0; "jump leaves the stack alone")]
    #[test_case(Op::CallAction { nargs: 2 }, 2, 1; "action consumes its operands")]
    #[test_case(Op::Invoke { nargs: 2 }, 3, 1; "invoke consumes target plus args")]
    #[test_case(Op::Return, 1, 0; "return consumes the result")]
    fn test_stack_effect(op: Op, pops: usize, pushes: usize) {
        assert_eq!(stack_effect(&op), (pops, pushes));
    }

    #[test]
    fn test_chain_predecessors() {
        // seq(ch("+"), term())
        let p = ProcBuilder::new("calc", "r")
            .imm_str("+")
            .call_rule("ch", 1)
            .call_rule("term", 0)
            .call_rule("seq", 2)
            .ret()
            .build();
        let g = build_graph(&p).unwrap();
        assert_eq!(g.node(1).predecessors, vec![0]);
        assert_eq!(g.node(2).predecessors, Vec::<NodeId>::new());
        assert_eq!(g.node(3).predecessors, vec![1, 2]);
        assert_eq!(g.node(4).predecessors, vec![3]);
        assert_eq!(g.node(3).successors, vec![4]);
    }

    #[test]
    fn test_dup_fans_out() {
        let p = ProcBuilder::new("calc", "r")
            .imm_int(9)
            .dup()
            .put("x")
            .call_rule("test", 1)
            .ret()
            .build();
        let g = build_graph(&p).unwrap();
        // the Dup node consumes the constant and feeds both the store and the call
        assert_eq!(g.node(1).predecessors, vec![0]);
        assert_eq!(g.node(1).successors, vec![2, 3]);
    }

    #[test]
    fn test_underflow_is_malformed() {
        let p = ProcBuilder::new("calc", "r").pop_op().ret().build();
        let err = build_graph(&p).unwrap_err();
        assert!(matches!(err, TransformError::MalformedProcedure { .. }));
    }

    #[test]
    fn test_leftover_operands_are_malformed() {
        let p = ProcBuilder::new("calc", "r")
            .imm_int(1)
            .imm_int(2)
            .ret()
            .build();
        let err = build_graph(&p).unwrap_err();
        assert!(matches!(err, TransformError::MalformedProcedure { .. }));
    }

    #[test]
    fn test_side_effect_markers() {
        let p = ProcBuilder::new("calc", "r")
            .imm_str("k")
            .helper("tick", 1)
            .put("x")
            .read_state("s")
            .ret()
            .build();
        let g = build_graph(&p).unwrap();
        assert!(g.node(1).side_effecting);
        assert!(g.node(3).side_effecting);
        assert!(!g.node(0).side_effecting);
    }
}
