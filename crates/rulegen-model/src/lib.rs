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

//! The shared program model for rule-defining procedures: the operation set,
//! variable-name and jump-label tables, literal and runtime value types, the
//! helper-function descriptor table, and the parse context handed to action
//! units at match time.

pub mod context;
pub mod helpers;
pub mod labels;
pub mod literal;
pub mod names;
pub mod opcode;
pub mod procedure;
pub mod rule;
pub mod symbol;
pub mod unit;
pub mod var;

pub use context::ParseContext;
pub use helpers::{ArgCount, Helper, HelperId, ReturnKind, HELPERS};
pub use labels::{JumpLabel, Label, Offset};
pub use literal::Literal;
pub use names::{GlobalSlot, Name, Names};
pub use opcode::Op;
pub use procedure::{Definition, Procedure, ProcedureFlags, UnitSpec, BINCODE_CONFIG};
pub use rule::{RuleNode, UnitInstance};
pub use symbol::Symbol;
pub use unit::{CaptureKind, CapturedVariable, UnitCode, UnitKind};
pub use var::{v_bool, v_int, v_list, v_none, v_str, v_sym, Var};
