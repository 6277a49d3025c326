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
use strum::IntoEnumIterator;

/// Reserved slots present in every rule procedure's environment; the matching
/// runtime binds them before any action unit runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum GlobalSlot {
    /// The text matched by the most recently completed sub-rule.
    MatchText,
    /// The shared parse-time value stack.
    Values,
}

/// A Name is a unique identifier for a variable in the procedure's environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Encode, Decode, Hash)]
pub struct Name(pub u16);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub struct Names {
    /// The list of names in the procedure, in order of their appearance, with the offsets into
    /// the vector being the unique identifier for the name.
    names: Vec<Symbol>,
}

impl Default for Names {
    fn default() -> Self {
        Self::new()
    }
}

impl Names {
    pub fn new() -> Self {
        let mut names = Self { names: vec![] };
        for global in GlobalSlot::iter() {
            names.find_or_add_name(global.to_string().as_str());
        }
        names
    }

    /// Add a name to the name table, if it doesn't already exist.
    /// If it does exist, return the existing name.
    pub fn find_or_add_name(&mut self, name: &str) -> Name {
        let name = Symbol::mk(name);
        match self.names.iter().position(|n| *n == name) {
            None => {
                let pos = self.names.len();
                self.names.push(name);
                Name(pos as u16)
            }
            Some(n) => Name(n as u16),
        }
    }

    /// Find the name in the name table, if it exists.
    pub fn find_name(&self, name: &str) -> Option<Name> {
        self.find_name_offset(name).map(|x| Name(x as u16))
    }

    /// Return the environment offset of the name, if it exists.
    pub fn find_name_offset(&self, name: &str) -> Option<usize> {
        let name = Symbol::mk(name);
        self.names.iter().position(|x| *x == name)
    }

    /// Return the width of the name table, to be used as the (total) environment size.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    /// Return the symbol value of the given name offset.
    pub fn name_of(&self, name: &Name) -> Option<Symbol> {
        if name.0 as usize >= self.names.len() {
            return None;
        }
        Some(self.names[name.0 as usize].clone())
    }

    pub fn names(&self) -> &Vec<Symbol> {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reserved_slots_seeded() {
        let names = Names::new();
        assert_eq!(names.find_name_offset("match_text"), Some(0));
        assert_eq!(names.find_name_offset("values"), Some(1));
        assert_eq!(names.width(), 2);
    }

    #[test]
    fn test_find_or_add_idempotent() {
        let mut names = Names::new();
        let a = names.find_or_add_name("op");
        let b = names.find_or_add_name("op");
        assert_eq!(a, b);
        assert_eq!(names.name_of(&a), Some(Symbol::mk("op")));
        assert_eq!(names.width(), 3);
    }
}
