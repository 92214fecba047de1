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

//! Module containing the ensemble Kalman filter.

use super::history::FilterHistory;
use super::FilterError;

use log::*;
use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

/// # Observation operator
///
/// Tagged variant selecting how an ensemble member is mapped into observation space. The linear
/// path never needs an observation map, and the nonlinear path never needs an observation
/// matrix.
#[derive(Debug, Clone)]
pub enum ObservationOperator {
    /// Linear observation through a matrix H of shape (obs dim x state dim).
    Linear {
        /// the observation matrix
        h: DMatrix<f64>,
    },
    /// Nonlinear observation through a scalar map applied per state component: the k-th
    /// observation of member j is `m(A[k][j], side_info[k])`. The side information carries one
    /// value per state component (here: the assimilated density at the respective incident
    /// cell, which selects the congested or uncongested branch of the fundamental diagram).
    Nonlinear {
        /// the observation map
        m: fn(f64, f64) -> f64,
        /// side information per state component
        side_info: Vec<f64>,
    },
}

impl ObservationOperator {
    /// Dimension of the observation space, given the state dimension.
    pub fn obs_dim(&self, state_dim: usize) -> usize {
        match self {
            Self::Linear { h } => h.nrows(),
            Self::Nonlinear { .. } => state_dim,
        }
    }

    /// Returns true if and only if the operator is linear.
    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Linear { .. })
    }
}

/// # Ensemble Kalman Filter
///
/// One filter instance owns its ensemble matrix `A` (columns are state draws), the sample
/// moments derived from it, the current observation operator, and a private RNG. Cloning the
/// filter forks the RNG, so counterfactual copies (as used by the path planner) evolve
/// independently without disturbing the noise stream of the original.
///
/// The observation noise is spatially heterogeneous: when a drone cell and a drone observation
/// error are configured, the corresponding row of the observation perturbations is drawn at the
/// (smaller) drone error, which makes the filter trust the airborne measurement more than the
/// fixed detectors.
#[derive(Debug, Clone)]
pub struct EnKF {
    state_dim: usize,
    sample_size: usize,
    obs_error: f64,
    model_error: f64,
    operator: ObservationOperator,
    drone_cell: Option<usize>,
    drone_obs_error: Option<f64>,
    rng: StdRng,
    a: DMatrix<f64>,
    a_bar: DMatrix<f64>,
    a_prime: DMatrix<f64>,
    a_hat: DMatrix<f64>,
    a_hat_prime: DMatrix<f64>,
    d: DMatrix<f64>,
    r: DMatrix<f64>,
    p: DMatrix<f64>,
    k: DMatrix<f64>,
    mean: DVector<f64>,
    history: FilterHistory,
}

impl EnKF {
    /// Create a new filter. `obs_error` and `model_error` are the standard deviations of the
    /// observation and model white noise, `sample_size` the number of ensemble members, and
    /// `seed` initializes the private RNG.
    pub fn new(
        state_dim: usize,
        sample_size: usize,
        obs_error: f64,
        model_error: f64,
        operator: ObservationOperator,
        seed: u64,
    ) -> Self {
        Self {
            state_dim,
            sample_size,
            obs_error,
            model_error,
            operator,
            drone_cell: None,
            drone_obs_error: None,
            rng: StdRng::seed_from_u64(seed),
            a: DMatrix::zeros(state_dim, sample_size),
            a_bar: DMatrix::zeros(state_dim, sample_size),
            a_prime: DMatrix::zeros(state_dim, sample_size),
            a_hat: DMatrix::zeros(0, 0),
            a_hat_prime: DMatrix::zeros(0, 0),
            d: DMatrix::zeros(0, 0),
            r: DMatrix::zeros(0, 0),
            p: DMatrix::zeros(state_dim, state_dim),
            k: DMatrix::zeros(0, 0),
            mean: DVector::zeros(state_dim),
            history: FilterHistory::default(),
        }
    }

    /// Configure the reduced observation error used for the row observed by the drone.
    pub fn set_drone_obs_error(&mut self, error: Option<f64>) {
        self.drone_obs_error = error;
    }

    /// Move the drone to the given corridor cell (or remove it from the corridor).
    pub fn set_drone_cell(&mut self, cell: Option<usize>) {
        self.drone_cell = cell;
    }

    /// Replace the observation operator and the observation error together. The two always
    /// change in lockstep: the periodic speed observation is nonlinear with the speed-detector
    /// error, while the direct free-flow speed observation of the drone is a linear row
    /// selector with its own error.
    pub fn set_observation(&mut self, operator: ObservationOperator, obs_error: f64) {
        self.operator = operator;
        self.obs_error = obs_error;
    }

    /// Perform one assimilation step: inject model noise into the forecasts, perturb the
    /// observation, and update the ensemble with the Kalman gain. Returns the posterior
    /// ensemble as a list of state vectors (one per member).
    pub fn step(
        &mut self,
        forecasts: &[Vec<f64>],
        observation: &[f64],
    ) -> Result<Vec<Vec<f64>>, FilterError> {
        let obs_dim = self.operator.obs_dim(self.state_dim);
        if forecasts.len() != self.sample_size {
            return Err(FilterError::DimensionMismatch {
                expected: self.sample_size,
                actual: forecasts.len(),
            });
        }
        for member in forecasts.iter() {
            if member.len() != self.state_dim {
                return Err(FilterError::DimensionMismatch {
                    expected: self.state_dim,
                    actual: member.len(),
                });
            }
        }
        if observation.len() != obs_dim {
            return Err(FilterError::DimensionMismatch {
                expected: obs_dim,
                actual: observation.len(),
            });
        }
        if let ObservationOperator::Nonlinear { side_info, .. } = &self.operator {
            if side_info.len() != self.state_dim {
                return Err(FilterError::DimensionMismatch {
                    expected: self.state_dim,
                    actual: side_info.len(),
                });
            }
        }

        self.add_model_noise(forecasts)?;
        self.add_obs_noise(observation, obs_dim)?;
        self.prior_moments();
        self.kalman_gain()?;
        self.posterior_moments();
        Ok(self.get_ensembles())
    }

    /// Assemble the ensemble matrix from the forecasts (columns are members) and add
    /// independent model noise per entry.
    fn add_model_noise(&mut self, forecasts: &[Vec<f64>]) -> Result<(), FilterError> {
        let a = DMatrix::from_fn(self.state_dim, self.sample_size, |i, j| forecasts[j][i]);
        let noise = self.noise_matrix(self.state_dim, self.sample_size, self.model_error)?;
        self.a = a + noise;
        self.history.propagated.push(self.a.clone());
        Ok(())
    }

    /// Replicate the raw observation into D and perturb it per entry. The row observed by the
    /// drone uses the drone-specific observation error, making R spatially heterogeneous. The
    /// observation covariance is `R = E Eᵀ` without the 1/(N-1) scale, which cancels against
    /// the same factor in the ensemble covariances throughout the gain computation.
    fn add_obs_noise(&mut self, observation: &[f64], obs_dim: usize) -> Result<(), FilterError> {
        let mut noise = self.noise_matrix(obs_dim, self.sample_size, self.obs_error)?;
        if let (Some(cell), Some(error)) = (self.drone_cell, self.drone_obs_error) {
            if cell < obs_dim {
                let row = self.noise_matrix(1, self.sample_size, error)?;
                noise.set_row(cell, &row.row(0));
            }
        }
        let d = DMatrix::from_fn(obs_dim, self.sample_size, |i, _| observation[i]);
        self.r = &noise * noise.transpose();
        self.d = d + noise;
        self.history.observations.push(self.d.clone());
        Ok(())
    }

    /// Update the prior sample moments from the noisy forecast ensemble.
    fn prior_moments(&mut self) {
        let scale =
            DMatrix::from_element(self.sample_size, self.sample_size, 1.0 / self.sample_size as f64);
        self.a_bar = &self.a * &scale;
        self.mean = self.a_bar.column(0).into_owned();
        self.a_prime = &self.a - &self.a_bar;
        self.p = &self.a_prime * self.a_prime.transpose();
    }

    /// Compute the Kalman gain, branching on the observation operator.
    fn kalman_gain(&mut self) -> Result<(), FilterError> {
        match &self.operator {
            ObservationOperator::Linear { h } => {
                let s = h * &self.p * h.transpose() + &self.r;
                let inv = Self::invert(s)?;
                self.k = &self.p * h.transpose() * inv;
            }
            ObservationOperator::Nonlinear { m, side_info } => {
                let a = &self.a;
                let a_hat =
                    DMatrix::from_fn(self.state_dim, self.sample_size, |i, j| {
                        m(a[(i, j)], side_info[i])
                    });
                self.a_hat = a_hat;
                self.history.predicted.push(self.a_hat.clone());
                let scale = DMatrix::from_element(
                    self.sample_size,
                    self.sample_size,
                    1.0 / self.sample_size as f64,
                );
                let a_hat_bar = &self.a_hat * &scale;
                self.a_hat_prime = &self.a_hat - &a_hat_bar;
                self.history.predicted_anomalies.push(self.a_hat_prime.clone());
                let cross = &self.a_prime * self.a_hat_prime.transpose();
                self.history.cross_covariances.push(cross.clone());
                let s = &self.a_hat_prime * self.a_hat_prime.transpose() + &self.r;
                let inv = Self::invert(s)?;
                self.history.inverse_terms.push(inv.clone());
                self.k = cross * inv;
                self.history.gains.push(self.k.clone());
            }
        }
        Ok(())
    }

    /// Update the ensemble and the posterior sample moments with the Kalman gain.
    fn posterior_moments(&mut self) {
        let scale =
            DMatrix::from_element(self.sample_size, self.sample_size, 1.0 / self.sample_size as f64);
        match &self.operator {
            ObservationOperator::Linear { h } => {
                self.a = &self.a + &self.k * (&self.d - h * &self.a);
                self.a_bar = &self.a * &scale;
                self.mean = self.a_bar.column(0).into_owned();
                self.p = &self.p - &self.k * (h * &self.p);
            }
            ObservationOperator::Nonlinear { .. } => {
                let innovation = &self.d - &self.a_hat;
                self.history.innovations.push(innovation.clone());
                self.a = &self.a + &self.k * innovation;
                self.a_bar = &self.a * &scale;
                self.mean = self.a_bar.column(0).into_owned();
                self.a_prime = &self.a - &self.a_bar;
                self.p = &self.a_prime * self.a_prime.transpose();
                self.history.posteriors.push(self.a.clone());
            }
        }
    }

    /// Invert the innovation covariance. A singular matrix is retried with the pseudo-inverse
    /// (near-singular systems keep the step alive); if even that fails, the step is aborted.
    fn invert(s: DMatrix<f64>) -> Result<DMatrix<f64>, FilterError> {
        match s.clone().try_inverse() {
            Some(inv) if inv.iter().all(|x| x.is_finite()) => Ok(inv),
            _ => {
                warn!("innovation covariance is (near-)singular, falling back to pseudo-inverse");
                s.pseudo_inverse(1e-12).map_err(|_| FilterError::SingularInnovation)
            }
        }
    }

    /// Draw a matrix of independent Gaussian perturbations.
    fn noise_matrix(
        &mut self,
        rows: usize,
        cols: usize,
        stdev: f64,
    ) -> Result<DMatrix<f64>, FilterError> {
        let normal = Normal::new(0.0, stdev).map_err(|_| FilterError::InvalidNoise(stdev))?;
        let rng = &mut self.rng;
        Ok(DMatrix::from_fn(rows, cols, |_, _| normal.sample(rng)))
    }

    /// The last computed ensemble mean.
    pub fn get_mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// The current error covariance, scaled by 1/(N-1). The internal `P` is kept unscaled
    /// because the scale cancels inside the gain computation.
    pub fn get_covariance(&self) -> DMatrix<f64> {
        &self.p / (self.sample_size as f64 - 1.0)
    }

    /// The current ensemble as a list of state vectors (one per member).
    pub fn get_ensembles(&self) -> Vec<Vec<f64>> {
        (0..self.sample_size).map(|j| self.a.column(j).iter().copied().collect()).collect()
    }

    /// The diagnostic history of all assimilation steps.
    pub fn get_history(&self) -> &FilterHistory {
        &self.history
    }

    /// The current observation operator.
    pub fn get_operator(&self) -> &ObservationOperator {
        &self.operator
    }

    /// State dimension
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Number of ensemble members
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Current observation dimension
    pub fn obs_dim(&self) -> usize {
        self.operator.obs_dim(self.state_dim)
    }

    /// Current corridor cell of the drone, if any
    pub fn drone_cell(&self) -> Option<usize> {
        self.drone_cell
    }
}

/// Draw an initial ensemble around a best-guess state: every entry of every member is an
/// independent Gaussian draw centered at `best_guess`.
pub fn initial_ensemble(
    best_guess: f64,
    stdev: f64,
    state_dim: usize,
    sample_size: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>, FilterError> {
    let normal = Normal::new(best_guess, stdev).map_err(|_| FilterError::InvalidNoise(stdev))?;
    Ok((0..sample_size).map(|_| (0..state_dim).map(|_| normal.sample(rng)).collect()).collect())
}
