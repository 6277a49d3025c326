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

use crate::literal::Literal;
use crate::names::Name;
use crate::opcode::Op;
use crate::symbol::Symbol;
use bincode::{Decode, Encode};

/// What a synthesized unit defers: an inline action, or a parse-time
/// variable's initializer expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, strum::Display)]
pub enum UnitKind {
    Action,
    VarInit,
}

/// Where a captured field's value comes from at construction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum CaptureKind {
    /// A local of the enclosing procedure read inside the group.
    Local,
    /// A fresh temporary holding a value produced outside the group but
    /// consumed inside it.
    Temp,
}

/// One captured value of a synthesized unit: the environment slot it is
/// loaded from when the unit is built, in field order.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct CapturedVariable {
    pub slot: Name,
    pub kind: CaptureKind,
}

/// The executable body of a synthesized unit. Fields are addressed by their
/// offset in `captures`; the body ends with a `Return` yielding the deferred
/// expression's value.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct UnitCode {
    /// Install key, unique within the process.
    pub identity: Symbol,
    pub kind: UnitKind,
    pub captures: Vec<CapturedVariable>,
    /// Literal table of the body, remapped from the origin procedure's.
    pub literals: Vec<Literal>,
    pub ops: Vec<Op>,
    /// Environment width the body runs with; matches the origin procedure's
    /// name-table width so slot numbers stay meaningful.
    pub env_width: u16,
}
