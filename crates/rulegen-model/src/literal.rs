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
use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};

/// The encodable subset of values a procedure's literal table can hold.
#[derive(Clone, Debug, PartialEq, PartialOrd, Encode, Decode)]
pub enum Literal {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Sym(Symbol),
    List(Vec<Literal>),
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::None => write!(f, "none"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(n) => write!(f, "{}", n),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Sym(s) => write!(f, "'{}", s),
            Literal::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
        }
    }
}
