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

//! # One-step-lookahead drone placement
//!
//! This module decides where the drone flies next. From its current corridor cell, the drone can
//! sweep towards the corridor start (left) or towards the corridor end (right); the planner
//! forward-simulates the density ensemble along each candidate sweep, replays counterfactual
//! filter updates with the drone following the candidate, and scores each candidate by the
//! weighted trace of the resulting parameter and density covariances. Minimizing the trace of
//! the posterior covariance is the A-optimal design criterion; the two traces are normalized by
//! their dimensions so the weight directly balances their magnitudes.
//!
//! All counterfactual updates run on deep copies of the network, the filters and the ensembles,
//! taken from the pre-planning state. Nothing the planner simulates may leak back into the true
//! estimation state; the planner only ever returns the chosen direction.

use crate::ctm::{CorridorIndex, Network};
use crate::enkf::{EnKF, ObservationOperator};
use crate::estimator::{column_means, propagate_ensemble};
use crate::Error;

use log::*;
use nalgebra::DMatrix;
use std::collections::HashMap;

/// Direction of the next drone move along the corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the corridor start (decreasing cell index)
    Left,
    /// Towards the corridor end (increasing cell index)
    Right,
}

/// Result of one planning round.
#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    /// The chosen direction
    pub direction: Direction,
    /// The corridor cell of the drone after the (clamped) move
    pub location: usize,
    /// Objective value of the left candidate
    pub objective_left: f64,
    /// Objective value of the right candidate
    pub objective_right: f64,
}

/// # Path planner
///
/// One-step-lookahead A-optimal placement of the drone. The planner owns deep copies of the
/// network and both filters (density and parameter), so its counterfactual assimilation steps
/// cannot contaminate the true estimation state.
#[derive(Debug, Clone)]
pub struct PathPlanner {
    /// current drone location as a global corridor cell
    location: usize,
    /// current timestep
    time: usize,
    /// last timestep of the simulation; candidate sweeps are truncated here
    horizon: usize,
    /// weight of the parameter trace; 1 - weight goes to the density trace
    weight: f64,
    /// observation error of the direct free-flow speed observation
    direct_obs_error: f64,
    net: Network,
    index: CorridorIndex,
    density_filter: EnKF,
    param_filter: EnKF,
    density_ensembles: Vec<Vec<f64>>,
    param_ensembles: Vec<Vec<f64>>,
}

impl PathPlanner {
    /// Create a new planner from deep copies of the current estimation state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        location: usize,
        time: usize,
        horizon: usize,
        weight: f64,
        direct_obs_error: f64,
        net: Network,
        index: CorridorIndex,
        density_filter: EnKF,
        param_filter: EnKF,
        density_ensembles: Vec<Vec<f64>>,
        param_ensembles: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            location,
            time,
            horizon,
            weight,
            direct_obs_error,
            net,
            index,
            density_filter,
            param_filter,
            density_ensembles,
            param_ensembles,
        }
    }

    /// Run one planning round: score both candidate sweeps and move the drone one cell into
    /// the winning direction (ties break left), clamped to the corridor.
    pub fn plan(&mut self) -> Result<PlannerOutcome, Error> {
        let left = self.candidate_path(Direction::Left);
        let right = self.candidate_path(Direction::Right);
        let observations = self.synthetic_observations(left.len().max(right.len()))?;

        let num_cells = self.index.num_cells() as f64;
        let param_dim = self.param_filter.state_dim() as f64;

        let density_left = self.density_covariance_trace(&left, &observations)?;
        let density_right = self.density_covariance_trace(&right, &observations)?;
        let param_left = self.parameter_covariance_trace(0)?;
        let param_right = self.parameter_covariance_trace(1)?;

        let objective_left =
            self.weight * param_left / param_dim + (1.0 - self.weight) * density_left / num_cells;
        let objective_right =
            self.weight * param_right / param_dim + (1.0 - self.weight) * density_right / num_cells;
        debug!(
            "planning at t={}: J_left = {:.6}, J_right = {:.6}",
            self.time, objective_left, objective_right
        );

        // ties break left, by candidate enumeration order
        let direction =
            if objective_left <= objective_right { Direction::Left } else { Direction::Right };
        let location = match direction {
            Direction::Left => self.location.saturating_sub(1),
            Direction::Right => (self.location + 1).min(self.index.num_cells() - 1),
        };
        self.location = location;
        Ok(PlannerOutcome { direction, location, objective_left, objective_right })
    }

    /// The candidate trajectory sweeping from the current cell towards one end of the
    /// corridor, one cell per timestep, truncated at the simulation horizon. Each entry is a
    /// (timestep, corridor cell) pair; the sweep starts at the current cell and time.
    fn candidate_path(&self, direction: Direction) -> Vec<(usize, usize)> {
        let cells: Vec<usize> = match direction {
            Direction::Left => (0..=self.location).rev().collect(),
            Direction::Right => (self.location..self.index.num_cells()).collect(),
        };
        cells
            .into_iter()
            .enumerate()
            .map(|(k, cell)| (self.time + k, cell))
            .filter(|(t, _)| *t <= self.horizon)
            .collect()
    }

    /// Shared forward simulation of the density ensemble: propagate a copy of the current
    /// ensemble for the given number of steps and record the ensemble mean of every step as the
    /// synthetic observation the counterfactual updates will assimilate.
    fn synthetic_observations(&self, steps: usize) -> Result<HashMap<usize, Vec<f64>>, Error> {
        let mut net = self.net.clone();
        let mut ensembles = self.density_ensembles.clone();
        let mut observations = HashMap::new();
        for k in 0..steps {
            propagate_ensemble(&mut net, self.time + k, &mut ensembles)?;
            observations.insert(self.time + k, column_means(&ensembles));
        }
        Ok(observations)
    }

    /// Replay the density filter along one candidate sweep, starting from the pre-planning
    /// state: propagate one step, place the drone on the candidate cell of that step, and
    /// assimilate the synthetic observation. Returns the trace of the final density
    /// covariance.
    fn density_covariance_trace(
        &self,
        path: &[(usize, usize)],
        observations: &HashMap<usize, Vec<f64>>,
    ) -> Result<f64, Error> {
        let mut net = self.net.clone();
        let mut filter = self.density_filter.clone();
        let mut ensembles = self.density_ensembles.clone();
        for (time, cell) in path.iter() {
            propagate_ensemble(&mut net, *time, &mut ensembles)?;
            filter.set_drone_cell(Some(*cell));
            ensembles = filter.step(&ensembles, &observations[time])?;
        }
        Ok(filter.get_covariance().trace())
    }

    /// Run one counterfactual parameter-filter update for the incident region the candidate
    /// sweeps towards: a linear row selector on that region's dimension, assimilating the
    /// current parameter mean as a synthetic direct observation with the direct-observation
    /// error. Returns the trace of the resulting parameter covariance.
    fn parameter_covariance_trace(&self, dim: usize) -> Result<f64, Error> {
        let mut filter = self.param_filter.clone();
        let observation = [filter.get_mean()[dim]];
        let mut h = DMatrix::zeros(1, filter.state_dim());
        h[(0, dim)] = 1.0;
        filter.set_observation(ObservationOperator::Linear { h }, self.direct_obs_error);
        filter.step(&self.param_ensembles, &observation)?;
        Ok(filter.get_covariance().trace())
    }

    /// The drone location after planning, as a global corridor cell.
    pub fn location(&self) -> usize {
        self.location
    }
}
