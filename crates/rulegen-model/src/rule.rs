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
use crate::unit::UnitCode;
use crate::var::Var;
use std::sync::Arc;

/// One node of a constructed rule tree. A node either names a combinator
/// (`seq`, `zero_or_more`, ...) applied to its arguments, or references
/// another rule of the same definition by name; the matching engine resolves
/// references at match time, which is what lets recursive rules terminate
/// during construction.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleNode {
    pub rule: Symbol,
    pub args: Vec<Var>,
    /// Diagnostic label stamped by the labelling stage.
    pub label: Option<Symbol>,
    /// Suppress creation of a parse-tree node for this rule.
    pub suppress_node: bool,
    /// Suppress parse-tree nodes for everything beneath this rule.
    pub suppress_subnodes: bool,
}

impl RuleNode {
    pub fn new(rule: Symbol, args: Vec<Var>) -> Self {
        RuleNode {
            rule,
            args,
            label: None,
            suppress_node: false,
            suppress_subnodes: false,
        }
    }
}

/// An instantiated action unit: shared installed code plus the captured field
/// values this instance was built with and the diagnostic tag naming its
/// source expression.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitInstance {
    pub code: Arc<UnitCode>,
    pub tag: String,
    pub fields: Vec<Var>,
}
