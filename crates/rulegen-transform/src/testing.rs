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

//! Test support: a small builder for rule procedures, and the counters
//! behind the `tick` helper that tests use to observe how often a deferred
//! expression actually runs.

use lazy_static::lazy_static;
use rulegen_model::{
    JumpLabel, Label, Literal, Offset, Op, Procedure, ProcedureFlags, Symbol, HELPERS,
};
use std::collections::HashMap;
use std::sync::Mutex;

lazy_static! {
    static ref TICKS: Mutex<HashMap<String, i64>> = Mutex::new(HashMap::new());
}

/// Increment and return the named counter. Tests key counters uniquely so
/// they stay independent under parallel test runs.
pub fn bump(key: &str) -> i64 {
    let mut ticks = TICKS.lock().unwrap();
    let count = ticks.entry(key.to_string()).or_insert(0);
    *count += 1;
    *count
}

pub fn ticks(key: &str) -> i64 {
    *TICKS.lock().unwrap().get(key).unwrap_or(&0)
}

/// Builds rule procedures op by op. Helper calls are looked up by name and
/// panic on a typo; this is test scaffolding, not production surface.
pub struct ProcBuilder {
    proc: Procedure,
}

impl ProcBuilder {
    pub fn new(definition: &str, name: &str) -> Self {
        ProcBuilder {
            proc: Procedure::new(Symbol::mk(definition), Symbol::mk(name)),
        }
    }

    pub fn with_flags(&mut self, flags: ProcedureFlags) -> &mut Self {
        self.proc.flags = flags;
        self
    }

    pub fn imm(&mut self, l: Literal) -> &mut Self {
        let label = self.proc.find_or_add_literal(l);
        self.proc.ops.push(Op::Imm(label));
        self
    }

    pub fn imm_str(&mut self, s: &str) -> &mut Self {
        self.imm(Literal::Str(s.to_string()))
    }

    pub fn imm_int(&mut self, i: i64) -> &mut Self {
        self.proc.ops.push(Op::ImmInt(i));
        self
    }

    pub fn push(&mut self, name: &str) -> &mut Self {
        let n = self.proc.var_names.find_or_add_name(name);
        self.proc.ops.push(Op::Push(n));
        self
    }

    pub fn put(&mut self, name: &str) -> &mut Self {
        let n = self.proc.var_names.find_or_add_name(name);
        self.proc.ops.push(Op::Put(n));
        self
    }

    pub fn dup(&mut self) -> &mut Self {
        self.proc.ops.push(Op::Dup);
        self
    }

    pub fn pop_op(&mut self) -> &mut Self {
        self.proc.ops.push(Op::Pop);
        self
    }

    pub fn make_jump_label(&mut self, name: Option<&str>) -> Label {
        let id = Label(self.proc.jump_labels.len() as u16);
        let name = name.map(|n| self.proc.var_names.find_or_add_name(n));
        self.proc.jump_labels.push(JumpLabel {
            id,
            name,
            position: Offset(0),
        });
        id
    }

    pub fn commit_jump_label(&mut self, label: Label) -> &mut Self {
        self.proc.jump_labels[label.0 as usize].position = Offset(self.proc.ops.len() as u16);
        self
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.proc.ops.push(Op::Jump { label });
        self
    }

    pub fn call_rule(&mut self, rule: &str, nargs: u16) -> &mut Self {
        self.proc.ops.push(Op::CallRule {
            rule: Symbol::mk(rule),
            nargs,
        });
        self
    }

    pub fn call_super(&mut self, rule: &str, nargs: u16) -> &mut Self {
        self.proc.ops.push(Op::CallSuper {
            rule: Symbol::mk(rule),
            nargs,
        });
        self
    }

    pub fn helper(&mut self, name: &str, nargs: u16) -> &mut Self {
        let id = HELPERS
            .find(name)
            .unwrap_or_else(|| panic!("no such helper: {}", name));
        self.proc.ops.push(Op::CallHelper { id, nargs });
        self
    }

    pub fn action(&mut self, nargs: u16) -> &mut Self {
        self.proc.ops.push(Op::CallAction { nargs });
        self
    }

    pub fn invoke(&mut self, nargs: u16) -> &mut Self {
        self.proc.ops.push(Op::Invoke { nargs });
        self
    }

    pub fn read_state(&mut self, slot: &str) -> &mut Self {
        self.proc.ops.push(Op::ReadState(Symbol::mk(slot)));
        self
    }

    pub fn write_state(&mut self, slot: &str) -> &mut Self {
        self.proc.ops.push(Op::WriteState(Symbol::mk(slot)));
        self
    }

    pub fn ret(&mut self) -> &mut Self {
        self.proc.ops.push(Op::Return);
        self
    }

    pub fn build(&self) -> Procedure {
        self.proc.clone()
    }
}
