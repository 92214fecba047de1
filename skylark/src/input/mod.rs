// Skylark: Drone-Assisted Freeway Traffic State Estimation
// Copyright (C) 2021  The Skylark Developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Input parsers
//!
//! Parsers for the four input files of an estimation run: the tab-delimited nodes, links and
//! demand files describing the corridor, and the semicolon-delimited link-segment measurement
//! export of the microscopic reference simulation. Topology files must parse completely
//! (malformed rows are fatal), while malformed measurement rows are skipped with a warning.

mod measurements;
mod network_files;

pub use measurements::{
    read_measurements, MeasurementData, FREE_FLOW_SURROGATE, SAMPLE_POSITIONS,
};
pub use network_files::read_network;

use thiserror::Error;

/// Error while reading an input file
#[derive(Debug, Error)]
pub enum InputError {
    /// Io Error
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// A field could not be parsed as a number
    #[error("Cannot parse a number on line {line}: {content}")]
    InvalidNumber {
        /// line number (starting at one)
        line: usize,
        /// content of the offending field
        content: String,
    },
    /// A row has fewer fields than the format requires
    #[error("Missing field `{field}` on line {line}")]
    MissingField {
        /// line number (starting at one)
        line: usize,
        /// name of the missing field
        field: &'static str,
    },
    /// The node model of a row is not recognized
    #[error("Unknown node model on line {line}: {model}")]
    UnknownNodeModel {
        /// line number (starting at one)
        line: usize,
        /// the unrecognized model name
        model: String,
    },
    /// The link type of a row is not recognized
    #[error("Unknown link type on line {line}: {kind}")]
    UnknownLinkType {
        /// line number (starting at one)
        line: usize,
        /// the unrecognized link type
        kind: String,
    },
    /// A diverge forward-star entry carries no splitting proportion
    #[error("Diverge entry without a splitting proportion on line {line}: {content}")]
    MissingProportion {
        /// line number (starting at one)
        line: usize,
        /// content of the offending entry
        content: String,
    },
    /// The origins and rates of a demand row differ in length
    #[error("Origins and rates differ in length on line {line}")]
    MismatchedDemand {
        /// line number (starting at one)
        line: usize,
    },
    /// No detector observation is available for a timestep
    #[error("No detector observation for timestep {0}")]
    MissingObservation(usize),
}

/// Parse a bracketed, comma-separated list (`[]` or `[v1,v2,...]`) into its raw entries.
pub(crate) fn bracket_list(field: &str) -> Vec<&str> {
    let inner = field.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    }
}

/// Parse a field as a number, reporting the line on failure.
pub(crate) fn parse_num<T: std::str::FromStr>(field: &str, line: usize) -> Result<T, InputError> {
    field
        .trim()
        .parse()
        .map_err(|_| InputError::InvalidNumber { line, content: field.to_string() })
}
