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
use crate::rule::{RuleNode, UnitInstance};
use crate::symbol::Symbol;

/// The runtime value type flowing through rule construction and unit
/// invocation. Unlike [`Literal`] this is not encodable; rule trees and unit
/// instances only exist in-process.
#[derive(Clone, Debug, PartialEq)]
pub enum Var {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(Symbol),
    List(Vec<Var>),
    /// A parse-time variable handle; helpers resolve it against the parse
    /// context's state table.
    Slot(Symbol),
    /// A constructed rule tree node.
    Rule(Box<RuleNode>),
    /// An instantiated action unit, fields populated with captured values.
    Unit(UnitInstance),
}

impl Var {
    /// Truthiness, as the matching engine judges an action's result.
    pub fn is_true(&self) -> bool {
        match self {
            Var::None => false,
            Var::Bool(b) => *b,
            Var::Int(i) => *i != 0,
            Var::Float(n) => *n != 0.0,
            Var::Str(s) => !s.is_empty(),
            Var::List(items) => !items.is_empty(),
            Var::Sym(_) | Var::Slot(_) | Var::Rule(_) | Var::Unit(_) => true,
        }
    }

    pub fn from_literal(l: &Literal) -> Var {
        match l {
            Literal::None => Var::None,
            Literal::Int(i) => Var::Int(*i),
            Literal::Float(n) => Var::Float(*n),
            Literal::Str(s) => Var::Str(s.clone()),
            Literal::Sym(s) => Var::Sym(s.clone()),
            Literal::List(items) => Var::List(items.iter().map(Var::from_literal).collect()),
        }
    }
}

pub fn v_none() -> Var {
    Var::None
}

pub fn v_bool(b: bool) -> Var {
    Var::Bool(b)
}

pub fn v_int(i: i64) -> Var {
    Var::Int(i)
}

pub fn v_str(s: &str) -> Var {
    Var::Str(s.to_string())
}

pub fn v_sym(s: &str) -> Var {
    Var::Sym(Symbol::mk(s))
}

pub fn v_list(items: Vec<Var>) -> Var {
    Var::List(items)
}
