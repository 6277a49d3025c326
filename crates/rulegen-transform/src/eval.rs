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

//! Realization: a small op interpreter that evaluates a rewritten procedure
//! into its rule tree (construction time, no parse context), and invokes
//! synthesized unit bodies against a live `ParseContext` (match time). The
//! same loop serves both; which ops are legal depends on whether a context
//! is present.

use crate::registry::{ExtendedDefinition, Registry};
use rulegen_model::{
    ArgCount, Helper, HelperId, JumpLabel, Label, Literal, Name, Op, ParseContext, Procedure,
    RuleNode, Symbol, UnitCode, UnitInstance, UnitSpec, Var, HELPERS,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("rule not found: {0}")]
    RuleNotFound(Symbol),
    #[error("unit not installed: {0}")]
    UnitNotInstalled(Symbol),
    #[error("operand stack underflow in {procedure} at op {offset}")]
    StackUnderflow { procedure: Symbol, offset: usize },
    #[error("helper not found: {0:?}")]
    HelperNotFound(HelperId),
    #[error("literal not found: {0:?}")]
    LiteralNotFound(Label),
    #[error("label not found: {0:?}")]
    LabelNotFound(Label),
    #[error("environment slot out of range: {0:?}")]
    SlotOutOfRange(Name),
    #[error("{0} requires a parse context")]
    ContextRequired(Symbol),
    #[error("bad operand for {op}: {reason}")]
    BadOperand { op: String, reason: String },
    #[error("fell off the end of {0} without a return")]
    MissingReturn(Symbol),
}

/// The product of realizing one rule: its constructed tree, plus the
/// parse-time variables whose initializers the runtime must evaluate against
/// the context before matching starts. A deferred initializer arrives as a
/// `Var::Unit` to invoke; anything else is stored as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct Realization {
    pub tree: Var,
    pub var_inits: Vec<(Symbol, Var)>,
}

struct Frame<'a> {
    name: &'a Symbol,
    ops: &'a [Op],
    literals: &'a [Literal],
    jump_labels: &'a [JumpLabel],
    units: &'a [UnitSpec],
    fields: &'a [Var],
    env_width: usize,
}

impl<'a> Frame<'a> {
    fn for_procedure(p: &'a Procedure) -> Self {
        Frame {
            name: &p.name,
            ops: &p.ops,
            literals: &p.literals,
            jump_labels: &p.jump_labels,
            units: &p.units,
            fields: &[],
            env_width: p.var_names.width(),
        }
    }

    fn for_unit(code: &'a UnitCode, fields: &'a [Var]) -> Self {
        Frame {
            name: &code.identity,
            ops: &code.ops,
            literals: &code.literals,
            jump_labels: &[],
            units: &[],
            fields,
            env_width: code.env_width as usize,
        }
    }
}

struct Evaluator<'a> {
    registry: &'a Registry,
    ext: Option<&'a ExtendedDefinition>,
    ctx: Option<&'a mut ParseContext>,
    var_inits: Vec<(Symbol, Var)>,
}

impl<'a> Evaluator<'a> {
    fn run(&mut self, frame: &Frame) -> Result<Var, EvalError> {
        let mut env = vec![Var::None; frame.env_width];
        let mut stack: Vec<Var> = vec![];
        let mut pc = 0;

        let underflow = |pc: usize, frame: &Frame| EvalError::StackUnderflow {
            procedure: frame.name.clone(),
            offset: pc,
        };
        while pc < frame.ops.len() {
            match &frame.ops[pc] {
                Op::Imm(l) => {
                    let lit = frame
                        .literals
                        .get(l.0 as usize)
                        .ok_or(EvalError::LiteralNotFound(*l))?;
                    stack.push(Var::from_literal(lit));
                }
                Op::ImmInt(i) => stack.push(Var::Int(*i)),
                Op::ImmNone => stack.push(Var::None),
                Op::Push(n) => {
                    let v = env
                        .get(n.0 as usize)
                        .cloned()
                        .ok_or(EvalError::SlotOutOfRange(*n))?;
                    stack.push(v);
                }
                Op::Put(n) => {
                    let v = stack.pop().ok_or_else(|| underflow(pc, frame))?;
                    let slot = env
                        .get_mut(n.0 as usize)
                        .ok_or(EvalError::SlotOutOfRange(*n))?;
                    *slot = v;
                }
                Op::Dup => {
                    let v = stack.last().cloned().ok_or_else(|| underflow(pc, frame))?;
                    stack.push(v);
                }
                Op::Pop => {
                    stack.pop().ok_or_else(|| underflow(pc, frame))?;
                }
                Op::Jump { label } => {
                    let jl = frame
                        .jump_labels
                        .get(label.0 as usize)
                        .ok_or(EvalError::LabelNotFound(*label))?;
                    pc = jl.position.0 as usize;
                    continue;
                }
                Op::CallRule { rule, nargs } => {
                    let args = popn(&mut stack, *nargs as usize)
                        .ok_or_else(|| underflow(pc, frame))?;
                    stack.push(Var::Rule(Box::new(RuleNode::new(rule.clone(), args))));
                }
                Op::CallSuper { rule, nargs } => {
                    if *nargs != 0 {
                        return Err(EvalError::BadOperand {
                            op: "super-call".to_string(),
                            reason: "super-calls take no arguments".to_string(),
                        });
                    }
                    let ext = self.ext.ok_or_else(|| EvalError::BadOperand {
                        op: "super-call".to_string(),
                        reason: "no extended definition in scope".to_string(),
                    })?;
                    let base = ext
                        .base
                        .procedure(rule)
                        .ok_or_else(|| EvalError::RuleNotFound(rule.clone()))?;
                    let v = self.run(&Frame::for_procedure(base))?;
                    stack.push(v);
                }
                Op::CallHelper { id, nargs } => {
                    let args = popn(&mut stack, *nargs as usize)
                        .ok_or_else(|| underflow(pc, frame))?;
                    let v = self.call_helper(*id, args)?;
                    stack.push(v);
                }
                Op::CallAction { nargs } => {
                    let args = popn(&mut stack, *nargs as usize)
                        .ok_or_else(|| underflow(pc, frame))?;
                    if self.ctx.is_some() {
                        stack.push(Var::Bool(args.iter().all(Var::is_true)));
                    } else {
                        stack.push(Var::Rule(Box::new(RuleNode::new(
                            Symbol::mk("action"),
                            args,
                        ))));
                    }
                }
                Op::Invoke { nargs } => {
                    let args = popn(&mut stack, *nargs as usize)
                        .ok_or_else(|| underflow(pc, frame))?;
                    let target = stack.pop().ok_or_else(|| underflow(pc, frame))?;
                    if self.ctx.is_some() {
                        let Var::Unit(instance) = target else {
                            return Err(EvalError::BadOperand {
                                op: "invoke".to_string(),
                                reason: "match-time target is not a unit".to_string(),
                            });
                        };
                        if !args.is_empty() {
                            return Err(EvalError::BadOperand {
                                op: "invoke".to_string(),
                                reason: "unit invocation takes no arguments".to_string(),
                            });
                        }
                        let v = self.run_unit(&instance)?;
                        stack.push(v);
                    } else {
                        // at construction the invocation is deferred into the
                        // tree; the runtime threads the context when it fires
                        let mut node_args = vec![target];
                        node_args.extend(args);
                        stack.push(Var::Rule(Box::new(RuleNode::new(
                            Symbol::mk("invoke"),
                            node_args,
                        ))));
                    }
                }
                Op::ReadState(slot) => {
                    let ctx = self
                        .ctx
                        .as_deref()
                        .ok_or_else(|| EvalError::ContextRequired(slot.clone()))?;
                    stack.push(ctx.get_state(slot).cloned().unwrap_or(Var::None));
                }
                Op::WriteState(slot) => {
                    let v = stack.pop().ok_or_else(|| underflow(pc, frame))?;
                    let ctx = self
                        .ctx
                        .as_deref_mut()
                        .ok_or_else(|| EvalError::ContextRequired(slot.clone()))?;
                    ctx.set_state(slot.clone(), v);
                }
                // the interpreter threads the context itself; the op just
                // consumes the duplicated target
                Op::SetContext => {
                    stack.pop().ok_or_else(|| underflow(pc, frame))?;
                }
                Op::LoadField(offset) => {
                    let v = frame.fields.get(offset.0 as usize).cloned().ok_or_else(|| {
                        EvalError::BadOperand {
                            op: "load-field".to_string(),
                            reason: format!("no field at offset {}", offset.0),
                        }
                    })?;
                    stack.push(v);
                }
                Op::MakeUnit { unit, nargs } => {
                    let spec =
                        frame
                            .units
                            .get(unit.0 as usize)
                            .ok_or_else(|| EvalError::BadOperand {
                                op: "make-unit".to_string(),
                                reason: format!("no unit at slot {}", unit.0),
                            })?;
                    let fields = popn(&mut stack, *nargs as usize)
                        .ok_or_else(|| underflow(pc, frame))?;
                    let installed = self
                        .registry
                        .find_unit(&spec.identity)
                        .ok_or_else(|| EvalError::UnitNotInstalled(spec.identity.clone()))?;
                    stack.push(Var::Unit(UnitInstance {
                        code: installed.code.clone(),
                        tag: spec.tag.clone(),
                        fields,
                    }));
                }
                Op::Return => {
                    return stack.pop().ok_or_else(|| underflow(pc, frame));
                }
            }
            pc += 1;
        }
        Err(EvalError::MissingReturn(frame.name.clone()))
    }

    fn run_unit(&mut self, instance: &UnitInstance) -> Result<Var, EvalError> {
        self.run(&Frame::for_unit(&instance.code, &instance.fields))
    }

    fn call_helper(&mut self, id: HelperId, args: Vec<Var>) -> Result<Var, EvalError> {
        let desc = HELPERS.descriptor(id).ok_or(EvalError::HelperNotFound(id))?;
        if let ArgCount::Q(min) = desc.min_args {
            if args.len() < min {
                return Err(bad_arity(desc, args.len()));
            }
        }
        if let ArgCount::Q(max) = desc.max_args {
            if args.len() > max {
                return Err(bad_arity(desc, args.len()));
            }
        }
        if desc.context_dependent && self.ctx.is_none() {
            return Err(EvalError::ContextRequired(desc.name.clone()));
        }

        match desc.name.as_str() {
            "sum" => {
                let items = self.resolve_list(desc, &args[0])?;
                let mut total = 0i64;
                for item in items {
                    let Var::Int(i) = item else {
                        return Err(bad_operand(desc, "summand is not an integer"));
                    };
                    total += i;
                }
                Ok(Var::Int(total))
            }
            "concat" => {
                let mut s = String::new();
                for a in &args {
                    s.push_str(&self.render(desc, a)?);
                }
                Ok(Var::Str(s))
            }
            "append" => {
                let list = self.resolve(&args[0])?;
                let item = self.resolve(&args[1])?;
                let items = match list {
                    Var::List(mut items) => {
                        items.push(item);
                        items
                    }
                    other => vec![other, item],
                };
                Ok(Var::List(items))
            }
            "state_slot" => {
                let slot = match &args[0] {
                    Var::Str(s) => Symbol::mk(s),
                    Var::Sym(s) => s.clone(),
                    _ => return Err(bad_operand(desc, "slot name is not a string")),
                };
                if let Some(init) = args.get(1) {
                    self.var_inits.push((slot.clone(), init.clone()));
                }
                Ok(Var::Slot(slot))
            }
            "match_text" => {
                let ctx = self
                    .ctx
                    .as_deref()
                    .ok_or_else(|| EvalError::ContextRequired(desc.name.clone()))?;
                Ok(Var::Str(ctx.match_text.clone()))
            }
            "push_value" => {
                let v = self.resolve(&args[0])?;
                let ctx = self
                    .ctx
                    .as_deref_mut()
                    .ok_or_else(|| EvalError::ContextRequired(desc.name.clone()))?;
                ctx.push_value(v);
                Ok(Var::Bool(true))
            }
            "pop_value" => {
                let ctx = self
                    .ctx
                    .as_deref_mut()
                    .ok_or_else(|| EvalError::ContextRequired(desc.name.clone()))?;
                Ok(ctx.pop_value().unwrap_or(Var::None))
            }
            "peek_value" => {
                let ctx = self
                    .ctx
                    .as_deref()
                    .ok_or_else(|| EvalError::ContextRequired(desc.name.clone()))?;
                Ok(ctx.peek_value().cloned().unwrap_or(Var::None))
            }
            "tick" => {
                let key = self.render(desc, &args[0])?;
                Ok(Var::Int(crate::testing::bump(&key)))
            }
            _ => Err(EvalError::HelperNotFound(id)),
        }
    }

    /// Variable handles resolve through the context's state table; everything
    /// else is already a value.
    fn resolve(&self, v: &Var) -> Result<Var, EvalError> {
        match v {
            Var::Slot(slot) => {
                let ctx = self
                    .ctx
                    .as_deref()
                    .ok_or_else(|| EvalError::ContextRequired(slot.clone()))?;
                Ok(ctx.get_state(slot).cloned().unwrap_or(Var::None))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_list(&self, desc: &Helper, v: &Var) -> Result<Vec<Var>, EvalError> {
        match self.resolve(v)? {
            Var::List(items) => Ok(items),
            _ => Err(bad_operand(desc, "operand is not a list")),
        }
    }

    fn render(&self, desc: &Helper, v: &Var) -> Result<String, EvalError> {
        match self.resolve(v)? {
            Var::None => Ok(String::new()),
            Var::Bool(b) => Ok(b.to_string()),
            Var::Int(i) => Ok(i.to_string()),
            Var::Float(n) => Ok(n.to_string()),
            Var::Str(s) => Ok(s),
            Var::Sym(s) => Ok(s.to_string()),
            _ => Err(bad_operand(desc, "operand has no text form")),
        }
    }
}

fn bad_arity(desc: &Helper, got: usize) -> EvalError {
    EvalError::BadOperand {
        op: desc.name.to_string(),
        reason: format!("wrong number of arguments: {}", got),
    }
}

fn bad_operand(desc: &Helper, reason: &str) -> EvalError {
    EvalError::BadOperand {
        op: desc.name.to_string(),
        reason: reason.to_string(),
    }
}

fn popn(stack: &mut Vec<Var>, n: usize) -> Option<Vec<Var>> {
    if stack.len() < n {
        return None;
    }
    Some(stack.split_off(stack.len() - n))
}

/// Realizes one rule of an extended definition into its constructed tree,
/// going through the per-rule memo when the caching stage marked the rule.
pub fn realize_rule(
    ext: &ExtendedDefinition,
    rule: &Symbol,
    registry: &Registry,
) -> Result<Realization, EvalError> {
    let proc = ext
        .method(rule)
        .ok_or_else(|| EvalError::RuleNotFound(rule.clone()))?;
    if proc.cached {
        let cache = ext.rule_cache.lock().unwrap();
        if let Some(r) = cache.get(rule) {
            return Ok(r.clone());
        }
    }

    let mut ev = Evaluator {
        registry,
        ext: Some(ext),
        ctx: None,
        var_inits: vec![],
    };
    let mut tree = ev.run(&Frame::for_procedure(proc.as_ref()))?;
    if let Var::Rule(node) = &mut tree {
        if proc.labelled && node.label.is_none() {
            node.label = Some(rule.clone());
        }
        if proc.flags.suppress_node {
            node.suppress_node = true;
        }
        if proc.flags.suppress_subnodes {
            node.suppress_subnodes = true;
        }
    }
    let realization = Realization {
        tree,
        var_inits: ev.var_inits,
    };

    if proc.cached {
        let mut cache = ext.rule_cache.lock().unwrap();
        return Ok(cache.entry(rule.clone()).or_insert(realization).clone());
    }
    Ok(realization)
}

/// Runs a unit body against a live parse context, yielding the deferred
/// expression's value.
pub fn invoke_unit(
    instance: &UnitInstance,
    ctx: &mut ParseContext,
    registry: &Registry,
) -> Result<Var, EvalError> {
    let mut ev = Evaluator {
        registry,
        ext: None,
        ctx: Some(ctx),
        var_inits: vec![],
    };
    ev.run_unit(instance)
}

/// Invokes an action unit the way the matching engine does: its result's
/// truthiness decides whether the match proceeds.
pub fn invoke(
    instance: &UnitInstance,
    ctx: &mut ParseContext,
    registry: &Registry,
) -> Result<bool, EvalError> {
    Ok(invoke_unit(instance, ctx, registry)?.is_true())
}
