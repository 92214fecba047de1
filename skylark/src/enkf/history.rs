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

//! Module containing the append-only diagnostic history of a filter.

use nalgebra::DMatrix;

/// # Filter history
///
/// Append-only record of the intermediate quantities of every assimilation step, kept for
/// offline diagnostics. The dynamics never read any of this back; each series is bounded by the
/// number of assimilation steps performed.
#[derive(Debug, Clone, Default)]
pub struct FilterHistory {
    /// Noisy forecast ensembles (one per step)
    pub propagated: Vec<DMatrix<f64>>,
    /// Perturbed observation matrices D (one per step)
    pub observations: Vec<DMatrix<f64>>,
    /// Predicted observation ensembles (nonlinear steps)
    pub predicted: Vec<DMatrix<f64>>,
    /// Anomalies of the predicted observations (nonlinear steps)
    pub predicted_anomalies: Vec<DMatrix<f64>>,
    /// Innovations D minus predicted observations (nonlinear steps)
    pub innovations: Vec<DMatrix<f64>>,
    /// State/observation cross-covariance terms (nonlinear steps)
    pub cross_covariances: Vec<DMatrix<f64>>,
    /// Inverted innovation covariance terms (nonlinear steps)
    pub inverse_terms: Vec<DMatrix<f64>>,
    /// Kalman gains (nonlinear steps)
    pub gains: Vec<DMatrix<f64>>,
    /// Posterior ensembles (nonlinear steps)
    pub posteriors: Vec<DMatrix<f64>>,
}

impl FilterHistory {
    /// Number of assimilation steps recorded so far.
    pub fn num_steps(&self) -> usize {
        self.propagated.len()
    }
}
