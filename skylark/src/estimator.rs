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

//! # Estimation driver
//!
//! This module couples the traffic simulator, the two ensemble Kalman filters and the path
//! planner into the per-timestep estimation loop. Every timestep is a total order: propagate
//! the density ensemble through the cell-transmission model, assimilate the detector densities,
//! assimilate speeds into the parameter filter (periodically through the nonlinear observation
//! map, and directly whenever the drone hovers over an incident-prone link), write the updated
//! parameters back into the network, and finally plan the next drone move on deep copies of
//! everything.

use crate::config::EstimatorConfig;
use crate::ctm::{fd, CorridorIndex, Network, NetworkError};
use crate::enkf::{initial_ensemble, EnKF, ObservationOperator};
use crate::input::{InputError, MeasurementData};
use crate::planner::PathPlanner;
use crate::Error;

use itertools::izip;
use log::*;
use nalgebra::DMatrix;
use rand::prelude::*;
use std::io::Write;

/// Propagate every member of a density ensemble one step through the cell-transmission model:
/// write the member into the cells, load the network for one timestep, and read the resulting
/// corridor densities back. All members run against the same network parameters; the network
/// cell state is overwritten per member, so the network carries no state of its own between
/// members.
pub fn propagate_ensemble(
    net: &mut Network,
    time: usize,
    ensembles: &mut Vec<Vec<f64>>,
) -> Result<(), NetworkError> {
    for member in ensembles.iter_mut() {
        net.set_corridor_vehicles(member)?;
        *member = net.load_step(time)?;
    }
    Ok(())
}

/// Per-component mean over all members of an ensemble.
pub fn column_means(ensembles: &[Vec<f64>]) -> Vec<f64> {
    let n = ensembles.len() as f64;
    match ensembles.first() {
        Some(first) => (0..first.len())
            .map(|i| ensembles.iter().map(|member| member[i]).sum::<f64>() / n)
            .collect(),
        None => Vec::new(),
    }
}

/// # Output series
///
/// Append-only record of one estimation run, one entry per timestep (except the
/// parameter-update series, which grows once per parameter assimilation).
#[derive(Debug, Clone, Default)]
pub struct EstimateLog {
    /// Drone corridor cell after planning, per timestep
    pub drone_cells: Vec<usize>,
    /// Drone position in km from the corridor start, per timestep
    pub drone_positions_km: Vec<f64>,
    /// Assimilated density at each incident cell, per timestep
    pub incident_densities: Vec<Vec<f64>>,
    /// Current parameter mean (free-flow speeds), per timestep
    pub parameter_means: Vec<Vec<f64>>,
    /// Trace of the density-filter covariance, per timestep
    pub density_traces: Vec<f64>,
    /// Trace of the parameter-filter covariance, per timestep
    pub parameter_traces: Vec<f64>,
    /// Instantaneous weighted objective, per timestep
    pub objectives: Vec<f64>,
    /// Timesteps at which a parameter assimilation fired
    pub parameter_update_times: Vec<usize>,
    /// Estimated critical densities at each parameter assimilation
    pub crit_den_estimates: Vec<Vec<f64>>,
}

impl EstimateLog {
    /// Write the per-timestep series as a tab-separated table.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let num_incidents = self.incident_densities.first().map(Vec::len).unwrap_or(0);
        write!(writer, "time\tdrone_cell\tdrone_km")?;
        for k in 0..num_incidents {
            write!(writer, "\tincident_density_{}", k)?;
        }
        for k in 0..num_incidents {
            write!(writer, "\tvmax_{}", k)?;
        }
        writeln!(writer, "\tdensity_trace\tparameter_trace\tobjective")?;
        for time in 0..self.drone_cells.len() {
            write!(
                writer,
                "{}\t{}\t{:.6}",
                time, self.drone_cells[time], self.drone_positions_km[time]
            )?;
            for value in self.incident_densities[time].iter() {
                write!(writer, "\t{:.6}", value)?;
            }
            for value in self.parameter_means[time].iter() {
                write!(writer, "\t{:.6}", value)?;
            }
            writeln!(
                writer,
                "\t{:.6}\t{:.6}\t{:.6}",
                self.density_traces[time], self.parameter_traces[time], self.objectives[time]
            )?;
        }
        Ok(())
    }
}

/// # Estimator
///
/// Owns the true estimation state: the traffic network, the density filter, the parameter
/// filter, both ensembles and the drone location. One call to [`Estimator::step`] advances
/// everything by one timestep; [`Estimator::run`] drives the loop to the simulation horizon.
#[derive(Debug)]
pub struct Estimator {
    net: Network,
    index: CorridorIndex,
    config: EstimatorConfig,
    density_filter: EnKF,
    param_filter: EnKF,
    density_ensembles: Vec<Vec<f64>>,
    param_ensembles: Vec<Vec<f64>>,
    /// drone location as a global corridor cell
    drone_cell: usize,
    /// corridor cell of the first cell of each incident link, in parameter order
    incident_cells: Vec<usize>,
    log: EstimateLog,
}

impl Estimator {
    /// Set up the estimation: apply the ramp and incident configuration to the network,
    /// validate the topology, build the corridor bijection, seed both filters and draw the
    /// initial ensembles.
    pub fn new(mut net: Network, config: EstimatorConfig) -> Result<Self, Error> {
        net.set_ramp_links(config.ramp_links.iter().copied());
        net.set_incident_links(config.incident_links.clone());
        net.validate()?;
        let index = net.corridor_index();
        let num_cells = index.num_cells();
        let param_dim = config.incident_links.len();

        let incident_cells = config
            .incident_links
            .iter()
            .map(|link| {
                index.cell((*link, 0)).ok_or(NetworkError::InvalidDroneLocation {
                    link: *link,
                    cell: 0,
                })
            })
            .collect::<Result<Vec<usize>, NetworkError>>()?;
        let drone_cell =
            index.cell(config.drone_start).ok_or(NetworkError::InvalidDroneLocation {
                link: config.drone_start.0,
                cell: config.drone_start.1,
            })?;

        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut density_filter = EnKF::new(
            num_cells,
            config.density.ensemble_size,
            config.density.obs_error,
            config.density.model_error,
            ObservationOperator::Linear { h: DMatrix::identity(num_cells, num_cells) },
            rng.gen(),
        );
        density_filter.set_drone_obs_error(Some(config.density.drone_obs_error));
        density_filter.set_drone_cell(Some(drone_cell));

        let mut param_filter = EnKF::new(
            param_dim,
            config.parameters.ensemble_size,
            config.parameters.speed_obs_error,
            config.parameters.model_error,
            ObservationOperator::Nonlinear {
                m: fd::predicted_speed,
                side_info: vec![0.0; param_dim],
            },
            rng.gen(),
        );
        param_filter.set_drone_cell(Some(drone_cell));

        let density_ensembles = initial_ensemble(
            config.density.initial_guess,
            config.density.model_error,
            num_cells,
            config.density.ensemble_size,
            &mut rng,
        )?;
        let param_ensembles = initial_ensemble(
            config.parameters.initial_guess,
            config.parameters.model_error,
            param_dim,
            config.parameters.ensemble_size,
            &mut rng,
        )?;

        info!(
            "estimator ready: {} corridor cells, drone starts at cell {}, incident cells {:?}",
            num_cells, drone_cell, incident_cells
        );
        Ok(Self {
            net,
            index,
            config,
            density_filter,
            param_filter,
            density_ensembles,
            param_ensembles,
            drone_cell,
            incident_cells,
            log: EstimateLog::default(),
        })
    }

    /// Run the estimation to the simulation horizon and return the recorded series.
    pub fn run(&mut self, data: &MeasurementData) -> Result<&EstimateLog, Error> {
        for time in 0..self.net.num_steps() {
            self.step(time, data)?;
        }
        Ok(&self.log)
    }

    /// Advance the estimation by one timestep.
    pub fn step(&mut self, time: usize, data: &MeasurementData) -> Result<(), Error> {
        // propagate the density ensemble through the traffic model and assimilate the
        // detector densities
        propagate_ensemble(&mut self.net, time, &mut self.density_ensembles)?;
        let densities = data.density(time).ok_or(InputError::MissingObservation(time))?;
        self.density_ensembles = self.density_filter.step(&self.density_ensembles, densities)?;

        let incident_densities: Vec<f64> =
            self.incident_cells.iter().map(|cell| self.density_filter.get_mean()[*cell]).collect();

        // periodic speed observation through the nonlinear fundamental-diagram map
        if time % self.config.parameters.speed_period == 0 {
            debug!("t={}: assimilating periodic speed observation", time);
            let speeds = data.speed(time).ok_or(InputError::MissingObservation(time))?;
            self.param_filter.set_observation(
                ObservationOperator::Nonlinear {
                    m: fd::predicted_speed,
                    side_info: incident_densities.clone(),
                },
                self.config.parameters.speed_obs_error,
            );
            self.param_ensembles = self.param_filter.step(&self.param_ensembles, speeds)?;
            self.write_back(time)?;
        }

        // direct free-flow speed observation when the drone hovers over an incident region
        if let Some(region) = self.incident_region() {
            debug!("t={}: drone over incident link, assimilating direct free-flow speed", time);
            let mut h = DMatrix::zeros(1, self.param_filter.state_dim());
            h[(0, region)] = 1.0;
            self.param_filter.set_observation(
                ObservationOperator::Linear { h },
                self.config.parameters.direct_obs_error,
            );
            let observed = [self.config.true_incident_ffs];
            self.param_ensembles = self.param_filter.step(&self.param_ensembles, &observed)?;
            self.write_back(time)?;
        }

        // instantaneous objective over the current covariances
        let density_trace = self.density_filter.get_covariance().trace();
        let param_trace = self.param_filter.get_covariance().trace();
        let objective = self.config.path_weight * param_trace
            / self.param_filter.state_dim() as f64
            + (1.0 - self.config.path_weight) * density_trace / self.index.num_cells() as f64;

        // plan the next drone move on deep copies of the full estimation state
        let mut planner = PathPlanner::new(
            self.drone_cell,
            time,
            self.net.last_step(),
            self.config.path_weight,
            self.config.parameters.direct_obs_error,
            self.net.clone(),
            self.index.clone(),
            self.density_filter.clone(),
            self.param_filter.clone(),
            self.density_ensembles.clone(),
            self.param_ensembles.clone(),
        );
        let outcome = planner.plan()?;
        self.drone_cell = outcome.location;
        self.density_filter.set_drone_cell(Some(self.drone_cell));
        self.param_filter.set_drone_cell(Some(self.drone_cell));

        // append to the output series
        self.log.drone_cells.push(self.drone_cell);
        self.log.drone_positions_km.push(self.index.position_km(self.drone_cell).unwrap_or(0.0));
        self.log.incident_densities.push(incident_densities);
        self.log.parameter_means.push(self.param_filter.get_mean().iter().copied().collect());
        self.log.density_traces.push(density_trace);
        self.log.parameter_traces.push(param_trace);
        self.log.objectives.push(objective);
        Ok(())
    }

    /// Write the current parameter mean back into the network: derive the critical density of
    /// every estimated free-flow speed and update the incident links, re-deriving their
    /// capacity while keeping the backward wave fixed.
    fn write_back(&mut self, time: usize) -> Result<(), Error> {
        let vmax: Vec<f64> = self.param_filter.get_mean().iter().copied().collect();
        let crit_den: Vec<f64> = vmax.iter().map(|u| fd::crit_den_for_vmax(*u)).collect();
        for (link, u, rc) in izip!(self.net.incident_links(), &vmax, &crit_den) {
            debug!(
                "t={}: link {} now has vmax {:.2} km/h, crit density {:.2} veh/km",
                time, link, u, rc
            );
        }
        self.net.update_vmax_crit_den(&vmax, &crit_den)?;
        self.log.parameter_update_times.push(time);
        self.log.crit_den_estimates.push(crit_den);
        Ok(())
    }

    /// The index of the incident region the drone currently hovers over, if any.
    fn incident_region(&self) -> Option<usize> {
        let link = self.index.link_of(self.drone_cell)?;
        self.config.incident_links.iter().position(|l| *l == link)
    }

    /// The recorded output series.
    pub fn get_log(&self) -> &EstimateLog {
        &self.log
    }

    /// The current drone location as a global corridor cell.
    pub fn drone_cell(&self) -> usize {
        self.drone_cell
    }

    /// The current parameter mean (free-flow speeds of the incident regions).
    pub fn parameter_mean(&self) -> Vec<f64> {
        self.param_filter.get_mean().iter().copied().collect()
    }

    /// The traffic network carrying the current assimilated parameters.
    pub fn network(&self) -> &Network {
        &self.net
    }

    /// The density filter.
    pub fn density_filter(&self) -> &EnKF {
        &self.density_filter
    }

    /// The parameter filter.
    pub fn param_filter(&self) -> &EnKF {
        &self.param_filter
    }
}

/// Run a full estimation to the simulation horizon: set up an [`Estimator`] and drive it
/// through every timestep.
pub fn estimate(
    net: Network,
    data: &MeasurementData,
    config: EstimatorConfig,
) -> Result<EstimateLog, Error> {
    let mut estimator = Estimator::new(net, config)?;
    estimator.run(data)?;
    Ok(estimator.log)
}
