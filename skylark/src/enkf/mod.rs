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

//! # Ensemble Kalman Filter
//!
//! Stochastic EnKF following the formulation of Evensen (2003): the state distribution is
//! represented by a finite ensemble, covariances are estimated from sample moments, and the
//! observations are perturbed once per ensemble member. A single [`EnKF`] supports both a linear
//! observation matrix and a nonlinear observation map through the tagged
//! [`ObservationOperator`], and is used twice with different shapes: once over the corridor
//! densities (linear, identity operator, with reduced observation noise at the drone cell), and
//! once over the free-flow speeds of the incident-prone regions (nonlinear speed map, or a
//! linear row selector when the drone observes a region directly).

mod filter;
mod history;

pub use filter::{initial_ensemble, EnKF, ObservationOperator};
pub use history::FilterHistory;

use thiserror::Error;

/// Error thrown by the ensemble Kalman filter
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    /// A vector or matrix does not match the configured dimensions
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Offered dimension
        actual: usize,
    },
    /// The innovation covariance could not be inverted, not even by the pseudo-inverse
    /// fallback
    #[error("The innovation covariance is singular")]
    SingularInnovation,
    /// A noise standard deviation is negative or not finite
    #[error("Invalid noise standard deviation: {0}")]
    InvalidNoise(f64),
}
