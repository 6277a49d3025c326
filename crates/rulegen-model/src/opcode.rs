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

use crate::helpers::HelperId;
use crate::labels::{Label, Offset};
use crate::names::Name;
use crate::symbol::Symbol;
use bincode::{Decode, Encode};

/// The operation set rule-defining procedures are expressed in. A procedure
/// body is a straight-line vector of these, evaluated over an operand stack;
/// `Jump` is the only control transfer.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum Op {
    /// Push the literal at the given literal-table slot.
    Imm(Label),
    /// Push an integer constant without a literal-table entry.
    ImmInt(i64),
    /// Push the none value.
    ImmNone,
    /// Push the value of the named environment slot.
    Push(Name),
    /// Pop the top of stack into the named environment slot.
    Put(Name),
    /// Pop the top of stack and push two copies of it.
    Dup,
    /// Discard the top of stack.
    Pop,
    /// Transfer control to the position the jump label resolves to.
    Jump { label: Label },
    /// Pop `nargs` arguments and push the construction of the named rule
    /// applied to them.
    CallRule { rule: Symbol, nargs: u16 },
    /// As `CallRule`, but dispatching to the base definition's untransformed
    /// procedure of that name.
    CallSuper { rule: Symbol, nargs: u16 },
    /// Pop `nargs` arguments, apply the helper function from the descriptor
    /// table, push its result.
    CallHelper { id: HelperId, nargs: u16 },
    /// Pop `nargs` operands and run them as an inline action; the action's
    /// truthiness decides whether the enclosing match proceeds.
    CallAction { nargs: u16 },
    /// Pop `nargs` arguments and then a target value, and invoke the target
    /// with those arguments. The target must see the current parse context;
    /// `SetContext` assigns it immediately beforehand.
    Invoke { nargs: u16 },
    /// Push the named parse-state slot's current value.
    ReadState(Symbol),
    /// Pop the top of stack into the named parse-state slot.
    WriteState(Symbol),
    /// Pop a context-dependent target and bind the current parse context onto
    /// it, ahead of an `Invoke` of the same target.
    SetContext,
    /// Push the value of the given field of the currently executing unit.
    /// Only valid inside synthesized unit bodies.
    LoadField(Offset),
    /// Pop `nargs` captured values and push a new instance of the unit at the
    /// given slot of the procedure's unit table.
    MakeUnit { unit: Offset, nargs: u16 },
    /// Pop the top of stack and finish, yielding it as the procedure's result.
    Return,
}
