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

//! Descriptor table for the helper functions callable from rule bodies. The
//! transformation never looks at a helper's implementation; the descriptor's
//! return kind, context-dependence and side-effect flags are what drive
//! implicit-action classification and grouping.

use crate::symbol::Symbol;
use bincode::{Decode, Encode};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// A HelperId is an offset into the `HELPERS` descriptor table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct HelperId(pub u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgCount {
    /// A fixed number of arguments
    Q(usize),
    /// A variable number of arguments
    U,
}

/// What a helper call evaluates to, as the rule-construction API sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    /// A rule tree, consumable inline by rule-construction calls.
    Tree,
    /// A parse-time variable handle, consumable inline.
    Slot,
    /// A plain value; consumption by a rule-construction call means the call
    /// must be deferred into an action unit.
    Value,
    /// A plain boolean, deferred the same way.
    Bool,
}

#[derive(Clone, Debug)]
pub struct Helper {
    pub name: Symbol,
    pub min_args: ArgCount,
    pub max_args: ArgCount,
    pub returns: ReturnKind,
    /// The helper reads the parse context (matched text, value stack, state)
    /// and can only run during a match.
    pub context_dependent: bool,
    /// The helper mutates observable state; grouping must not reorder it
    /// across a group boundary.
    pub side_effecting: bool,
}

fn mk_helper(
    name: &str,
    min_args: ArgCount,
    max_args: ArgCount,
    returns: ReturnKind,
    context_dependent: bool,
    side_effecting: bool,
) -> Helper {
    Helper {
        name: Symbol::mk(name),
        min_args,
        max_args,
        returns,
        context_dependent,
        side_effecting,
    }
}

fn mk_helper_table() -> Vec<Helper> {
    use ArgCount::*;
    use ReturnKind::*;
    vec![
        mk_helper("sum", Q(1), Q(1), Value, false, false),
        mk_helper("concat", Q(0), U, Value, false, false),
        mk_helper("append", Q(2), Q(2), Value, false, false),
        mk_helper("state_slot", Q(1), Q(2), Slot, false, false),
        mk_helper("match_text", Q(0), Q(0), Value, true, false),
        mk_helper("push_value", Q(1), Q(1), Bool, true, true),
        mk_helper("pop_value", Q(0), Q(0), Value, true, true),
        mk_helper("peek_value", Q(0), Q(0), Value, true, false),
        mk_helper("tick", Q(1), Q(1), Value, false, true),
    ]
}

fn mk_helper_offsets() -> HashMap<Symbol, usize> {
    let mut offsets = HashMap::new();
    for (offset, helper) in HELPERS_TABLE.iter().enumerate() {
        offsets.insert(helper.name.clone(), offset);
    }
    offsets
}

lazy_static! {
    static ref HELPERS_TABLE: Vec<Helper> = mk_helper_table();
    static ref HELPER_OFFSETS: HashMap<Symbol, usize> = mk_helper_offsets();
    pub static ref HELPERS: Helpers = Helpers {};
}

/// Lookup facade over the static descriptor table.
pub struct Helpers {}

impl Helpers {
    pub fn find(&self, name: &str) -> Option<HelperId> {
        HELPER_OFFSETS
            .get(&Symbol::mk(name))
            .map(|offset| HelperId(*offset as u16))
    }

    pub fn descriptor(&self, id: HelperId) -> Option<&'static Helper> {
        HELPERS_TABLE.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        HELPERS_TABLE.len()
    }

    pub fn is_empty(&self) -> bool {
        HELPERS_TABLE.is_empty()
    }
}
