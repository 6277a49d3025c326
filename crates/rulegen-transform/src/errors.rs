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

use rulegen_model::{HelperId, Label, Name, Symbol};
use thiserror::Error;

/// Failures of the transformation pass. All of these are fatal for the whole
/// definition being transformed; there is no partial success.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed procedure {procedure}: {reason}")]
    MalformedProcedure { procedure: Symbol, reason: String },
    #[error("could not generate code for unit {unit}: {reason}")]
    CodeGenerationFailed { unit: Symbol, reason: String },
    #[error("helper not found: {0:?}")]
    HelperNotFound(HelperId),
    #[error("label not found: {0:?}")]
    LabelNotFound(Label),
    #[error("name not found: {0:?}")]
    NameNotFound(Name),
    #[error("procedure {procedure} super-calls unknown rule {rule}")]
    UnknownSuperRule { procedure: Symbol, rule: Symbol },
}
