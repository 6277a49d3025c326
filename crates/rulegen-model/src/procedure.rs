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

use crate::labels::{JumpLabel, Label};
use crate::literal::Literal;
use crate::names::Names;
use crate::opcode::Op;
use crate::symbol::Symbol;
use crate::unit::UnitKind;
use bincode::{Decode, Encode};
use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

lazy_static! {
    pub static ref BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();
}

/// Per-procedure behavior flags the author sets on a rule method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct ProcedureFlags {
    /// Copy the procedure into the extended definition untouched.
    pub dont_transform: bool,
    /// Skip the construction-cache wrapper for this rule.
    pub dont_cache: bool,
    /// Suppress creation of a parse-tree node for this rule.
    pub suppress_node: bool,
    /// Suppress parse-tree nodes beneath this rule.
    pub suppress_subnodes: bool,
    /// Skip stamping the rule's name onto the constructed tree.
    pub skip_label: bool,
}

/// One entry of a procedure's unit table: the identity `Op::MakeUnit`
/// instantiates, plus the diagnostic tag baked in at transform time.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct UnitSpec {
    pub identity: Symbol,
    pub kind: UnitKind,
    pub tag: String,
}

/// A rule-defining procedure: the op vector plus its side tables. Immutable
/// once installed into an extended definition.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Procedure {
    /// The definition this rule method belongs to.
    pub definition: Symbol,
    /// The rule's name within the definition.
    pub name: Symbol,
    /// All the literals referenced in this procedure.
    pub literals: Vec<Literal>,
    /// All the jump offsets used in this procedure.
    pub jump_labels: Vec<JumpLabel>,
    /// All the variable names used in this procedure.
    pub var_names: Names,
    /// The actual procedure code.
    pub ops: Vec<Op>,
    /// Units this procedure instantiates, indexed by `Op::MakeUnit` offsets.
    /// Empty until the call-site rewriter has run.
    pub units: Vec<UnitSpec>,
    pub flags: ProcedureFlags,
    /// Set by the caching stage: realizations of this rule are memoized.
    pub cached: bool,
    /// Set by the labelling stage: the constructed tree is tagged with the
    /// rule's name.
    pub labelled: bool,
}

impl Procedure {
    pub fn new(definition: Symbol, name: Symbol) -> Self {
        Procedure {
            definition,
            name,
            literals: Vec::new(),
            jump_labels: Vec::new(),
            var_names: Default::default(),
            ops: Vec::new(),
            units: Vec::new(),
            flags: ProcedureFlags::default(),
            cached: false,
            labelled: false,
        }
    }

    /// Add the literal to the literal table if not already present, and
    /// return its slot.
    pub fn find_or_add_literal(&mut self, l: Literal) -> Label {
        match self.literals.iter().position(|x| *x == l) {
            Some(pos) => Label(pos as u16),
            None => {
                let pos = self.literals.len();
                self.literals.push(l);
                Label(pos as u16)
            }
        }
    }

    pub fn literal(&self, label: Label) -> Option<&Literal> {
        self.literals.get(label.0 as usize)
    }
}

impl Display for Procedure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}.{}:", self.definition, self.name)?;

        // Write literals indexed by their offset #
        for (i, l) in self.literals.iter().enumerate() {
            writeln!(f, "L{}: {}", i, l)?;
        }

        // Write jump labels indexed by their offset & showing position & optional name
        for (i, l) in self.jump_labels.iter().enumerate() {
            write!(f, "J{}: {}", i, l.position.0)?;
            if let Some(name) = &l.name {
                if let Some(sym) = self.var_names.name_of(name) {
                    write!(f, " ({})", sym)?;
                }
            }
            writeln!(f)?;
        }

        // Write variable names indexed by their offset
        for (i, v) in self.var_names.names().iter().enumerate() {
            writeln!(f, "V{}: {}", i, v)?;
        }

        // Write unit specs indexed by their offset
        for (i, u) in self.units.iter().enumerate() {
            writeln!(f, "U{}: {} {} [{}]", i, u.kind, u.identity, u.tag)?;
        }

        // Display the op vector; opcodes are indexed by their offset
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{}: {:?}", i, op)?;
        }

        Ok(())
    }
}

/// A named set of rule procedures, the input to (and delegation base of) the
/// transformation. Rule methods are kept sorted so iteration order, and with
/// it unit numbering, is deterministic.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Definition {
    pub name: Symbol,
    pub procedures: BTreeMap<Symbol, Procedure>,
}

impl Definition {
    pub fn new(name: Symbol) -> Self {
        Definition {
            name,
            procedures: BTreeMap::new(),
        }
    }

    pub fn add_procedure(&mut self, proc: Procedure) {
        self.procedures.insert(proc.name.clone(), proc);
    }

    pub fn procedure(&self, rule: &Symbol) -> Option<&Procedure> {
        self.procedures.get(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literal_table_dedup() {
        let mut p = Procedure::new(Symbol::mk("calc"), Symbol::mk("expr"));
        let a = p.find_or_add_literal(Literal::Str("+".to_string()));
        let b = p.find_or_add_literal(Literal::Str("+".to_string()));
        let c = p.find_or_add_literal(Literal::Int(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(p.literals.len(), 2);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut p = Procedure::new(Symbol::mk("calc"), Symbol::mk("expr"));
        let plus = p.find_or_add_literal(Literal::Str("+".to_string()));
        p.ops = vec![Op::Imm(plus), Op::Return];
        let bytes = bincode::encode_to_vec(&p, *BINCODE_CONFIG).unwrap();
        let (decoded, _): (Procedure, usize) =
            bincode::decode_from_slice(&bytes, *BINCODE_CONFIG).unwrap();
        assert_eq!(decoded, p);
    }
}
