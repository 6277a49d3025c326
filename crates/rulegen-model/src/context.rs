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

use crate::symbol::Symbol;
use crate::var::Var;
use std::collections::HashMap;

/// The matching engine's view handed to an action unit when it is invoked:
/// the last matched text, the shared value stack, and named parse-time state
/// slots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParseContext {
    pub match_text: String,
    pub values: Vec<Var>,
    pub state: HashMap<Symbol, Var>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_value(&mut self, v: Var) {
        self.values.push(v);
    }

    pub fn pop_value(&mut self) -> Option<Var> {
        self.values.pop()
    }

    pub fn peek_value(&self) -> Option<&Var> {
        self.values.last()
    }

    pub fn set_state(&mut self, slot: Symbol, v: Var) {
        self.state.insert(slot, v);
    }

    pub fn get_state(&self, slot: &Symbol) -> Option<&Var> {
        self.state.get(slot)
    }
}
