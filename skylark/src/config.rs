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

//! # Run configuration
//!
//! All tunables of an estimation run, with the reference corridor calibration as defaults.
//! These values are only consumed at setup; the runtime source of truth for all traffic
//! parameters is each link's own parameter set.

use crate::ctm::LinkId;

/// Configuration of the density filter.
#[derive(Debug, Clone)]
pub struct DensityFilterConfig {
    /// standard deviation (veh/km) of the detector density observation noise
    pub obs_error: f64,
    /// standard deviation (veh/km) of the drone density observation noise
    pub drone_obs_error: f64,
    /// standard deviation (veh/km) of the model noise
    pub model_error: f64,
    /// number of ensemble members
    pub ensemble_size: usize,
    /// best-guess density (veh/km) around which the initial ensemble is drawn
    pub initial_guess: f64,
}

impl Default for DensityFilterConfig {
    fn default() -> Self {
        Self {
            obs_error: 10.0,
            drone_obs_error: 2.0,
            model_error: 5.0,
            ensemble_size: 100,
            initial_guess: 20.0,
        }
    }
}

/// Configuration of the parameter (free-flow speed) filter.
#[derive(Debug, Clone)]
pub struct ParameterFilterConfig {
    /// standard deviation (km/h) of the periodic speed observation noise
    pub speed_obs_error: f64,
    /// standard deviation (km/h) of the direct free-flow speed observation of the drone
    pub direct_obs_error: f64,
    /// standard deviation (km/h) of the random-walk model noise
    pub model_error: f64,
    /// number of ensemble members
    pub ensemble_size: usize,
    /// best-guess free-flow speed (km/h) around which the initial ensemble is drawn
    pub initial_guess: f64,
    /// timesteps between periodic speed assimilations
    pub speed_period: usize,
}

impl Default for ParameterFilterConfig {
    fn default() -> Self {
        Self {
            speed_obs_error: 5.0,
            direct_obs_error: 10.0,
            model_error: 5.0,
            ensemble_size: 100,
            initial_guess: 80.0,
            speed_period: 30,
        }
    }
}

/// Configuration of one estimation run.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// weight of the parameter covariance trace in the planning objective; 1 - weight goes to
    /// the density trace
    pub path_weight: f64,
    /// density filter configuration
    pub density: DensityFilterConfig,
    /// parameter filter configuration
    pub parameters: ParameterFilterConfig,
    /// links excluded from the corridor state vector (on/off ramps)
    pub ramp_links: Vec<LinkId>,
    /// incident-prone links, in parameter order
    pub incident_links: Vec<LinkId>,
    /// true free-flow speed (km/h) at an incident, observed directly by the drone
    pub true_incident_ffs: f64,
    /// initial drone location as a (link id, cell offset) pair
    pub drone_start: (LinkId, usize),
    /// seed of all random draws
    pub seed: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            path_weight: 1.0,
            density: DensityFilterConfig::default(),
            parameters: ParameterFilterConfig::default(),
            ramp_links: vec![9],
            incident_links: vec![2, 7],
            true_incident_ffs: 20.0,
            drone_start: (5, 0),
            seed: 42,
        }
    }
}
