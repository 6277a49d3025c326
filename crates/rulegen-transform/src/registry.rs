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

//! The process-wide install registry: synthesized unit code keyed by unit
//! identity, and extended definitions keyed by definition identity. Both are
//! check-then-create under a lock; entries are never mutated after first
//! insert, so a racing loser just discards its build and reuses the winner's.

use crate::errors::TransformError;
use crate::eval::Realization;
use crate::pipeline::{build_extension, TransformOptions};
use crate::synth::SynthesizedUnit;
use bytes::Bytes;
use lazy_static::lazy_static;
use rulegen_model::{Definition, Procedure, Symbol, UnitCode, UnitKind, BINCODE_CONFIG};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

lazy_static! {
    static ref GLOBAL_REGISTRY: Registry = Registry::new();
}

/// Generates the bincode artifact for a unit body.
pub(crate) fn encode_unit(code: &UnitCode) -> Result<Bytes, TransformError> {
    let encoded = bincode::encode_to_vec(code, *BINCODE_CONFIG).map_err(|e| {
        TransformError::CodeGenerationFailed {
            unit: code.identity.clone(),
            reason: e.to_string(),
        }
    })?;
    if encoded.is_empty() {
        return Err(TransformError::CodeGenerationFailed {
            unit: code.identity.clone(),
            reason: "empty artifact".to_string(),
        });
    }
    Ok(Bytes::from(encoded))
}

/// A unit whose executable artifact has been generated and installed. The
/// bincode artifact is produced once, on first install of the identity; every
/// later install of the same identity reuses it.
#[derive(Debug)]
pub struct InstalledUnit {
    pub identity: Symbol,
    pub kind: UnitKind,
    pub code: Arc<UnitCode>,
    pub code_bytes: Bytes,
}

/// The transformed counterpart of a definition: rewritten (or delegated)
/// procedures by rule name, the installed units they reference, the original
/// definition for super-call dispatch, and the per-rule construction memo.
#[derive(Debug)]
pub struct ExtendedDefinition {
    pub name: Symbol,
    pub base: Definition,
    pub methods: BTreeMap<Symbol, Arc<Procedure>>,
    pub units: Vec<Arc<InstalledUnit>>,
    pub(crate) rule_cache: Mutex<HashMap<Symbol, Realization>>,
}

impl ExtendedDefinition {
    pub(crate) fn new(
        name: Symbol,
        base: Definition,
        methods: BTreeMap<Symbol, Arc<Procedure>>,
        units: Vec<Arc<InstalledUnit>>,
    ) -> Self {
        ExtendedDefinition {
            name,
            base,
            methods,
            units,
            rule_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn method(&self, rule: &Symbol) -> Option<Arc<Procedure>> {
        self.methods.get(rule).cloned()
    }
}

#[derive(Default)]
pub struct Registry {
    units: Mutex<HashMap<Symbol, Arc<InstalledUnit>>>,
    extensions: Mutex<HashMap<Symbol, Arc<ExtendedDefinition>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            units: Mutex::new(HashMap::new()),
            extensions: Mutex::new(HashMap::new()),
        }
    }

    /// The shared process-wide registry. Tests use fresh instances for
    /// isolation; production callers share this one.
    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    /// Idempotent install: the artifact for an already-installed identity is
    /// reused as-is and no code generation happens.
    pub fn install_unit(
        &self,
        unit: &SynthesizedUnit,
    ) -> Result<Arc<InstalledUnit>, TransformError> {
        {
            let units = self.units.lock().unwrap();
            if let Some(installed) = units.get(&unit.code.identity) {
                return Ok(installed.clone());
            }
        }
        // generate outside the lock; a racing loser discards its artifact
        let bytes = encode_unit(&unit.code)?;
        Ok(self.install_encoded(unit, bytes))
    }

    /// Install with a pre-generated artifact. Infallible, so a definition can
    /// encode all of its artifacts before the first one is installed.
    pub(crate) fn install_encoded(
        &self,
        unit: &SynthesizedUnit,
        code_bytes: Bytes,
    ) -> Arc<InstalledUnit> {
        let identity = unit.code.identity.clone();
        {
            let units = self.units.lock().unwrap();
            if let Some(installed) = units.get(&identity) {
                return installed.clone();
            }
        }
        let installed = Arc::new(InstalledUnit {
            identity: identity.clone(),
            kind: unit.code.kind,
            code: Arc::new(unit.code.clone()),
            code_bytes,
        });
        debug!(unit = %identity, bytes = installed.code_bytes.len(), "installed unit");

        let mut units = self.units.lock().unwrap();
        units.entry(identity).or_insert(installed).clone()
    }

    pub fn find_unit(&self, identity: &Symbol) -> Option<Arc<InstalledUnit>> {
        self.units.lock().unwrap().get(identity).cloned()
    }

    /// Builds and installs the extension for a definition, at most once per
    /// definition identity for the life of the process.
    pub fn extend_definition(
        &self,
        def: &Definition,
        options: &TransformOptions,
    ) -> Result<Arc<ExtendedDefinition>, TransformError> {
        {
            let extensions = self.extensions.lock().unwrap();
            if let Some(ext) = extensions.get(&def.name) {
                return Ok(ext.clone());
            }
        }

        let built = Arc::new(build_extension(def, options, self)?);
        let mut extensions = self.extensions.lock().unwrap();
        Ok(extensions.entry(def.name.clone()).or_insert(built).clone())
    }

    pub fn find_extension(&self, name: &Symbol) -> Option<Arc<ExtendedDefinition>> {
        self.extensions.lock().unwrap().get(name).cloned()
    }
}
