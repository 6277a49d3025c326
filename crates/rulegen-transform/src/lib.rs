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

//! The action-lifting pass over rule-defining procedures: inline action
//! expressions are lifted into standalone, independently invocable units
//! closing over exactly the locals they need, and each procedure is rewritten
//! to construct those units at the right points during rule construction.
//! Extended definitions and unit code artifacts install into a process-wide
//! registry, at most once per identity.

pub mod errors;
pub mod eval;
pub mod graph;
pub mod group;
pub mod pipeline;
pub mod registry;
pub mod rewrite;
pub mod synth;
pub mod testing;

pub use errors::TransformError;
pub use eval::{invoke, invoke_unit, realize_rule, EvalError, Realization};
pub use graph::{build_graph, GroupId, NodeId, OpGraph, OperationNode};
pub use group::{default_classifier, ActionClassifier, ActionGroup};
pub use pipeline::{
    transform_definition, transform_procedure, Stage, TransformOptions, TransformedMethod,
};
pub use registry::{ExtendedDefinition, InstalledUnit, Registry};
pub use synth::SynthesizedUnit;
