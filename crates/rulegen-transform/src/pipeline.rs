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

//! The stage machine run over every rule procedure of a definition. Stage
//! order is fixed; a procedure flagged do-not-transform skips all of it and
//! is copied into the extended definition untouched.

use crate::errors::TransformError;
use crate::graph::build_graph;
use crate::group::{create_groups, mark_implicit_actions, prepare_groups, ActionClassifier};
use crate::registry::Registry;
use crate::rewrite::{check_super_calls, rewrite_call_sites};
use crate::synth::{synthesize_unit, SynthesizedUnit};
use rulegen_model::{Definition, Label, Op, Procedure};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// The fixed stage order, for logging and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum Stage {
    LabelCleanup,
    ReturnNormalization,
    GraphBuild,
    ImplicitActions,
    Grouping,
    GroupPreparation,
    UnitGeneration,
    CallSiteRewriting,
    SuperCalls,
    Labelling,
    FlagMarking,
    Caching,
}

#[derive(Clone, Copy)]
pub struct TransformOptions {
    pub classifier: ActionClassifier,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            classifier: crate::group::default_classifier,
        }
    }
}

/// Drops jump labels no op references and renumbers the survivors, since a
/// label's id doubles as its offset in the jump vector.
pub fn strip_unused_labels(proc: &mut Procedure) -> Result<(), TransformError> {
    let referenced: HashSet<Label> = proc
        .ops
        .iter()
        .filter_map(|op| match op {
            Op::Jump { label } => Some(*label),
            _ => None,
        })
        .collect();

    let mut remap: HashMap<u16, u16> = HashMap::new();
    let mut kept = vec![];
    for mut jl in std::mem::take(&mut proc.jump_labels) {
        if referenced.contains(&jl.id) {
            remap.insert(jl.id.0, kept.len() as u16);
            jl.id = Label(kept.len() as u16);
            kept.push(jl);
        }
    }
    proc.jump_labels = kept;

    for op in &mut proc.ops {
        if let Op::Jump { label } = op {
            let new = remap
                .get(&label.0)
                .ok_or(TransformError::LabelNotFound(*label))?;
            *label = Label(*new);
        }
    }
    Ok(())
}

/// The op language is straight-line, so a well-formed body has exactly one
/// `Return`, as its final op. Ops after the first `Return` are unreachable
/// and dropped; a body with no `Return` at all is malformed, as is a
/// surviving jump into the dropped region.
pub fn normalize_returns(proc: &mut Procedure) -> Result<(), TransformError> {
    let Some(r) = proc.ops.iter().position(|op| matches!(op, Op::Return)) else {
        return Err(TransformError::MalformedProcedure {
            procedure: proc.name.clone(),
            reason: "no return in body".to_string(),
        });
    };
    if r + 1 < proc.ops.len() {
        debug!(procedure = %proc.name, dropped = proc.ops.len() - r - 1, "dropping unreachable trailing ops");
        proc.ops.truncate(r + 1);
        for jl in &proc.jump_labels {
            if jl.position.0 as usize > r {
                return Err(TransformError::MalformedProcedure {
                    procedure: proc.name.clone(),
                    reason: format!("jump label {:?} targets unreachable code", jl.id),
                });
            }
        }
    }
    Ok(())
}

pub struct TransformedMethod {
    pub procedure: Procedure,
    pub units: Vec<SynthesizedUnit>,
}

/// Runs the full stage order over one rule procedure, against its base
/// definition for super-call checking.
pub fn transform_procedure(
    proc: &Procedure,
    base: &Definition,
    options: &TransformOptions,
) -> Result<TransformedMethod, TransformError> {
    let mut p = proc.clone();
    debug!(procedure = %p.name, stage = %Stage::LabelCleanup, "transform stage");
    strip_unused_labels(&mut p)?;
    debug!(procedure = %p.name, stage = %Stage::ReturnNormalization, "transform stage");
    normalize_returns(&mut p)?;

    debug!(procedure = %p.name, stage = %Stage::GraphBuild, "transform stage");
    let mut graph = build_graph(&p)?;
    debug!(procedure = %p.name, stage = %Stage::ImplicitActions, "transform stage");
    mark_implicit_actions(&mut graph, &p, options.classifier)?;
    debug!(procedure = %p.name, stage = %Stage::Grouping, "transform stage");
    let mut groups = create_groups(&mut graph, &p);
    debug!(procedure = %p.name, stage = %Stage::GroupPreparation, "transform stage");
    prepare_groups(&mut p, &mut graph, &mut groups);

    debug!(procedure = %p.name, stage = %Stage::UnitGeneration, "transform stage");
    let units = groups
        .iter()
        .map(|group| synthesize_unit(&mut p, &graph, group))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(procedure = %p.name, stage = %Stage::CallSiteRewriting, "transform stage");
    rewrite_call_sites(&mut p, &graph, &groups, &units)?;
    debug!(procedure = %p.name, stage = %Stage::SuperCalls, "transform stage");
    check_super_calls(&p, base)?;

    debug!(procedure = %p.name, stage = %Stage::Labelling, "transform stage");
    p.labelled = !p.flags.skip_label;
    // suppress flags ride on the procedure and are stamped onto the tree at
    // realization; the caching wrapper runs last since it wraps everything
    debug!(procedure = %p.name, stage = %Stage::FlagMarking, "transform stage");
    debug!(procedure = %p.name, stage = %Stage::Caching, "transform stage");
    p.cached = !p.flags.dont_cache;
    Ok(TransformedMethod { procedure: p, units })
}

/// Transforms a whole definition and installs the result; at most one
/// extension is ever built per definition identity.
pub fn transform_definition(
    def: &Definition,
    options: &TransformOptions,
    registry: &Registry,
) -> Result<Arc<crate::registry::ExtendedDefinition>, TransformError> {
    registry.extend_definition(def, options)
}

/// Builds the extension for a definition: every rule procedure through the
/// stage machine, then all synthesized units installed. Called by the
/// registry; all procedures must transform and all artifacts must encode
/// before the first install, so a failed definition installs nothing.
pub(crate) fn build_extension(
    def: &Definition,
    options: &TransformOptions,
    registry: &Registry,
) -> Result<crate::registry::ExtendedDefinition, TransformError> {
    let mut methods = std::collections::BTreeMap::new();
    let mut pending: Vec<SynthesizedUnit> = vec![];
    for (name, proc) in &def.procedures {
        if proc.flags.dont_transform {
            debug!(procedure = %name, "do-not-transform, copying unchanged");
            methods.insert(name.clone(), Arc::new(proc.clone()));
            continue;
        }
        let transformed = transform_procedure(proc, def, options)?;
        methods.insert(name.clone(), Arc::new(transformed.procedure));
        pending.extend(transformed.units);
    }

    // every artifact is generated before the first install, so a definition
    // that fails code generation installs nothing
    let mut artifacts = Vec::with_capacity(pending.len());
    for unit in &pending {
        artifacts.push(crate::registry::encode_unit(&unit.code)?);
    }
    let units: Vec<_> = pending
        .iter()
        .zip(artifacts)
        .map(|(unit, bytes)| registry.install_encoded(unit, bytes))
        .collect();

    Ok(crate::registry::ExtendedDefinition::new(
        def.name.clone(),
        def.clone(),
        methods,
        units,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ProcBuilder;
    use pretty_assertions::assert_eq;
    use rulegen_model::{JumpLabel, Offset};

    #[test]
    fn test_stage_order_is_fixed() {
        use strum::IntoEnumIterator;
        let stages: Vec<String> = Stage::iter().map(|s| s.to_string()).collect();
        assert_eq!(stages.len(), 12);
        assert_eq!(stages.first().map(String::as_str), Some("LabelCleanup"));
        assert_eq!(stages.last().map(String::as_str), Some("Caching"));
    }

    #[test]
    fn test_unreferenced_labels_dropped_and_renumbered() {
        let mut b = ProcBuilder::new("calc", "r");
        let dead = b.make_jump_label(None);
        b.commit_jump_label(dead);
        let live = b.make_jump_label(None);
        b.jump(live);
        b.commit_jump_label(live);
        b.call_rule("empty", 0);
        b.ret();
        let mut p = b.build();
        strip_unused_labels(&mut p).unwrap();
        assert_eq!(
            p.jump_labels,
            vec![JumpLabel { id: Label(0), name: None, position: Offset(1) }]
        );
        assert_eq!(p.ops[0], Op::Jump { label: Label(0) });
    }

    #[test]
    fn test_trailing_ops_after_return_dropped() {
        let mut p = ProcBuilder::new("calc", "r")
            .imm_int(1)
            .ret()
            .imm_int(2)
            .pop_op()
            .build();
        normalize_returns(&mut p).unwrap();
        assert_eq!(p.ops, vec![Op::ImmInt(1), Op::Return]);
    }

    #[test]
    fn test_missing_return_is_malformed() {
        let mut p = ProcBuilder::new("calc", "r").imm_int(1).pop_op().build();
        let err = normalize_returns(&mut p).unwrap_err();
        assert!(matches!(err, TransformError::MalformedProcedure { .. }));
    }

    #[test]
    fn test_jump_into_dropped_region_is_malformed() {
        let mut b = ProcBuilder::new("calc", "r");
        let label = b.make_jump_label(None);
        b.jump(label);
        b.call_rule("empty", 0);
        b.ret();
        b.imm_int(1);
        let mut p = b.build();
        // commit the label into the unreachable tail
        p.jump_labels[0].position = Offset(3);
        let err = normalize_returns(&mut p).unwrap_err();
        assert!(matches!(err, TransformError::MalformedProcedure { .. }));
    }
}
