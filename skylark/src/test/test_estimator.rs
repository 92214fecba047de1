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

//! End-to-end tests of the estimation driver on a small corridor.

use crate::config::{DensityFilterConfig, EstimatorConfig, ParameterFilterConfig};
use crate::ctm::{Network, Node, NodeModel};
use crate::estimator::Estimator;
use crate::input::MeasurementData;

use maplit::hashmap;
use std::collections::HashMap;

/// The test corridor built programmatically: five mainline links (2 and 7 are incident-prone)
/// and one off-ramp (link 9), 14 corridor cells, no demand.
fn empty_corridor(sim_time: f64) -> Network {
    let mut net = Network::new(sim_time, 10.0);
    net.add_node(
        Node::new(1, vec![1], vec![], NodeModel::Origin { demand: HashMap::new() }).unwrap(),
    );
    net.add_node(Node::new(2, vec![2], vec![1], NodeModel::Series).unwrap());
    net.add_node(Node::new(3, vec![3], vec![2], NodeModel::Series).unwrap());
    net.add_node(
        Node::new(
            4,
            vec![4, 9],
            vec![3],
            NodeModel::Diverge { proportions: hashmap! {4 => 0.8, 9 => 0.2} },
        )
        .unwrap(),
    );
    net.add_node(Node::new(5, vec![7], vec![4], NodeModel::Series).unwrap());
    net.add_node(Node::new(6, vec![], vec![7], NodeModel::Destination).unwrap());
    net.add_node(Node::new(7, vec![], vec![9], NodeModel::Destination).unwrap());
    net.add_link(1, 1, 2, 100.0, 80.0, 300.0, 1.0).unwrap();
    net.add_link(2, 2, 3, 100.0, 80.0, 300.0, 0.5).unwrap();
    net.add_link(3, 3, 4, 100.0, 80.0, 300.0, 0.5).unwrap();
    net.add_link(4, 4, 5, 100.0, 80.0, 300.0, 0.5).unwrap();
    net.add_link(7, 5, 6, 100.0, 80.0, 300.0, 1.0).unwrap();
    net.add_link(9, 4, 7, 100.0, 80.0, 300.0, 0.5).unwrap();
    net
}

fn small_config() -> EstimatorConfig {
    EstimatorConfig {
        path_weight: 0.5,
        density: DensityFilterConfig {
            ensemble_size: 20,
            initial_guess: 0.0,
            ..DensityFilterConfig::default()
        },
        parameters: ParameterFilterConfig {
            ensemble_size: 20,
            initial_guess: 100.0,
            ..ParameterFilterConfig::default()
        },
        ramp_links: vec![9],
        incident_links: vec![2, 7],
        true_incident_ffs: 20.0,
        drone_start: (3, 0),
        seed: 99,
    }
}

/// Ten timesteps of an empty corridor: zero detector densities and free-flow speeds.
fn empty_observations(steps: usize) -> MeasurementData {
    let mut data = MeasurementData::default();
    for time in 0..steps {
        data.insert_density(time, vec![0.0; 14]);
        data.insert_speed(time, vec![100.0, 100.0]);
    }
    data
}

#[test]
fn empty_corridor_stays_near_zero() {
    let net = empty_corridor(600.0);
    let data = empty_observations(61);
    let mut estimator = Estimator::new(net, small_config()).unwrap();
    for time in 0..10 {
        estimator.step(time, &data).unwrap();
    }

    // the density mean tracks the empty corridor within three model standard deviations
    let config = small_config();
    for mean in estimator.density_filter().get_mean().iter() {
        assert!(mean.abs() <= 3.0 * config.density.model_error);
    }
    // the covariance stays finite and symmetric
    let p = estimator.density_filter().get_covariance();
    assert!(p.iter().all(|x| x.is_finite()));
    for i in 0..14 {
        for j in 0..14 {
            assert!((p[(i, j)] - p[(j, i)]).abs() < 1e-6);
        }
    }
}

#[test]
fn the_log_grows_once_per_timestep() {
    let net = empty_corridor(600.0);
    let data = empty_observations(61);
    let mut estimator = Estimator::new(net, small_config()).unwrap();
    for time in 0..5 {
        estimator.step(time, &data).unwrap();
    }
    let log = estimator.get_log();
    assert_eq!(log.drone_cells.len(), 5);
    assert_eq!(log.drone_positions_km.len(), 5);
    assert_eq!(log.incident_densities.len(), 5);
    assert_eq!(log.parameter_means.len(), 5);
    assert_eq!(log.density_traces.len(), 5);
    assert_eq!(log.parameter_traces.len(), 5);
    assert_eq!(log.objectives.len(), 5);
    assert!(log.objectives.iter().all(|x| x.is_finite()));
    // the periodic speed assimilation fired at timestep zero
    assert!(!log.parameter_update_times.is_empty());
    assert_eq!(log.parameter_update_times[0], 0);
}

#[test]
fn the_drone_moves_one_cell_per_timestep() {
    let net = empty_corridor(600.0);
    let data = empty_observations(61);
    let mut estimator = Estimator::new(net, small_config()).unwrap();
    let mut previous = estimator.drone_cell();
    for time in 0..8 {
        estimator.step(time, &data).unwrap();
        let current = estimator.drone_cell();
        assert!(current < 14);
        assert!(current as i64 - previous as i64 <= 1);
        assert!(previous as i64 - current as i64 <= 1);
        previous = current;
    }
}

#[test]
fn direct_observation_pulls_the_parameter_down() {
    // the drone starts on incident link 2, so the direct free-flow speed observation fires
    // immediately and drags the estimate towards the true incident speed
    let mut config = small_config();
    config.drone_start = (2, 0);
    let net = empty_corridor(600.0);
    let data = empty_observations(61);
    let mut estimator = Estimator::new(net, config).unwrap();
    estimator.step(0, &data).unwrap();
    let mean = estimator.parameter_mean();
    // prior guess 100 km/h, direct observation 20 km/h
    assert!(mean[0] < 100.0);
    // the write-back reaches the incident link parameters
    let ffs = estimator.network().get_link(2).unwrap().params().ffs;
    assert!((ffs - mean[0]).abs() < 1e-9);
}

#[test]
fn parameter_updates_write_back_into_the_network() {
    let net = empty_corridor(600.0);
    let data = empty_observations(61);
    let mut estimator = Estimator::new(net, small_config()).unwrap();
    estimator.step(0, &data).unwrap();

    // the periodic speed assimilation at timestep zero rewrote both incident links
    let mean = estimator.parameter_mean();
    for (k, link) in [2_usize, 7].iter().enumerate() {
        let params = estimator.network().get_link(*link).unwrap().params();
        assert!((params.ffs - mean[k]).abs() < 1e-9);
        assert!((params.qcap - params.ffs * params.crit_den).abs() < 1e-9);
    }
}
