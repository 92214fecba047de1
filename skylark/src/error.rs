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

//! Module containing all error types

use crate::ctm::NetworkError;
use crate::enkf::FilterError;
use crate::input::InputError;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error propagated from the traffic simulator
    #[error("Network Error: {0}")]
    NetworkError(#[from] NetworkError),
    /// Error propagated from the input parsers
    #[error("Input Error: {0}")]
    InputError(#[from] InputError),
    /// Error propagated from the ensemble Kalman filter
    #[error("Filter Error: {0}")]
    FilterError(#[from] FilterError),
    /// IO error while writing results
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}
