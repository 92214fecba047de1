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

//! Test the ensemble Kalman filter in both observation modes.

use crate::ctm::fd;
use crate::enkf::{initial_ensemble, EnKF, FilterError, ObservationOperator};
use crate::estimator::column_means;

use assert_approx_eq::assert_approx_eq;
use nalgebra::DMatrix;
use rand::prelude::*;

/// Sample covariance of an ensemble, scaled by 1/(N-1), for comparison against
/// [`EnKF::get_covariance`].
fn sample_covariance(ensembles: &[Vec<f64>]) -> DMatrix<f64> {
    let n = ensembles.len();
    let dim = ensembles[0].len();
    let a = DMatrix::from_fn(dim, n, |i, j| ensembles[j][i]);
    let mean = &a * DMatrix::from_element(n, n, 1.0 / n as f64);
    let anomalies = &a - &mean;
    &anomalies * anomalies.transpose() / (n as f64 - 1.0)
}

#[test]
fn linear_update_pulls_towards_the_observation() {
    let mut rng = StdRng::seed_from_u64(7);
    let ensembles = initial_ensemble(5.0, 1.0, 2, 100, &mut rng).unwrap();
    let prior_trace = sample_covariance(&ensembles).trace();

    let mut filter = EnKF::new(
        2,
        100,
        1.0,
        0.0,
        ObservationOperator::Linear { h: DMatrix::identity(2, 2) },
        1,
    );
    filter.step(&ensembles, &[5.2, 4.9]).unwrap();

    // the posterior mean stays between the prior guess and the observation (up to the
    // perturbation noise of the finite ensemble)
    let mean = filter.get_mean();
    assert!(mean[0] > 4.6 && mean[0] < 5.5);
    assert!(mean[1] > 4.6 && mean[1] < 5.5);
    assert!(filter.get_covariance().trace() < prior_trace);
}

#[test]
fn posterior_mean_matches_the_ensemble() {
    let mut rng = StdRng::seed_from_u64(8);
    let ensembles = initial_ensemble(20.0, 5.0, 6, 50, &mut rng).unwrap();
    let mut filter = EnKF::new(
        6,
        50,
        10.0,
        5.0,
        ObservationOperator::Linear { h: DMatrix::identity(6, 6) },
        2,
    );
    let posterior = filter.step(&ensembles, &[18.0; 6]).unwrap();
    let means = column_means(&posterior);
    for (i, mean) in means.iter().enumerate() {
        assert_approx_eq!(filter.get_mean()[i], *mean, 1e-9);
    }
}

#[test]
fn covariance_is_symmetric() {
    let mut rng = StdRng::seed_from_u64(9);
    let ensembles = initial_ensemble(20.0, 5.0, 8, 40, &mut rng).unwrap();
    let mut filter = EnKF::new(
        8,
        40,
        10.0,
        5.0,
        ObservationOperator::Linear { h: DMatrix::identity(8, 8) },
        3,
    );
    filter.step(&ensembles, &[15.0; 8]).unwrap();
    let p = filter.get_covariance();
    let scale = p.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())).max(1.0);
    for i in 0..8 {
        for j in 0..8 {
            assert!((p[(i, j)] - p[(j, i)]).abs() / scale < 1e-9);
        }
    }
}

#[test]
fn nonlinear_update_tracks_the_free_flow_speed() {
    let mut rng = StdRng::seed_from_u64(10);
    let ensembles = initial_ensemble(80.0, 5.0, 2, 100, &mut rng).unwrap();
    let mut filter = EnKF::new(
        2,
        100,
        5.0,
        1.0,
        ObservationOperator::Nonlinear {
            m: fd::predicted_speed,
            // uncongested side information: the map is the identity on the speed
            side_info: vec![10.0, 10.0],
        },
        4,
    );
    filter.step(&ensembles, &[60.0, 60.0]).unwrap();
    let mean = filter.get_mean();
    // the posterior lies between the prior guess and the observed speeds
    assert!(mean[0] > 60.0 && mean[0] < 80.0);
    assert!(mean[1] > 60.0 && mean[1] < 80.0);

    // the nonlinear branch retains its full diagnostic history
    let history = filter.get_history();
    assert_eq!(history.num_steps(), 1);
    assert_eq!(history.predicted.len(), 1);
    assert_eq!(history.predicted_anomalies.len(), 1);
    assert_eq!(history.cross_covariances.len(), 1);
    assert_eq!(history.inverse_terms.len(), 1);
    assert_eq!(history.gains.len(), 1);
    assert_eq!(history.innovations.len(), 1);
    assert_eq!(history.posteriors.len(), 1);
}

#[test]
fn drone_row_uses_the_reduced_observation_error() {
    let mut rng = StdRng::seed_from_u64(11);
    let ensembles = initial_ensemble(20.0, 5.0, 4, 100, &mut rng).unwrap();
    let mut filter = EnKF::new(
        4,
        100,
        10.0,
        0.0,
        ObservationOperator::Linear { h: DMatrix::identity(4, 4) },
        5,
    );
    filter.set_drone_obs_error(Some(0.01));
    filter.set_drone_cell(Some(2));
    filter.step(&ensembles, &[20.0; 4]).unwrap();

    // the recorded perturbed observations deviate far less on the drone row
    let d = &filter.get_history().observations[0];
    let max_dev = |row: usize| {
        (0..100).map(|j| (d[(row, j)] - 20.0).abs()).fold(0.0_f64, f64::max)
    };
    assert!(max_dev(2) < 0.1);
    assert!(max_dev(0) > 0.1);
    assert!(max_dev(1) > 0.1);
    assert!(max_dev(3) > 0.1);
}

#[test]
fn dimension_mismatches_are_fatal() {
    let mut filter = EnKF::new(
        3,
        10,
        1.0,
        1.0,
        ObservationOperator::Linear { h: DMatrix::identity(3, 3) },
        6,
    );
    // wrong observation length
    assert_eq!(
        filter.step(&vec![vec![0.0; 3]; 10], &[0.0; 2]).unwrap_err(),
        FilterError::DimensionMismatch { expected: 3, actual: 2 }
    );
    // wrong state dimension
    assert_eq!(
        filter.step(&vec![vec![0.0; 4]; 10], &[0.0; 3]).unwrap_err(),
        FilterError::DimensionMismatch { expected: 3, actual: 4 }
    );
    // wrong ensemble size
    assert_eq!(
        filter.step(&vec![vec![0.0; 3]; 9], &[0.0; 3]).unwrap_err(),
        FilterError::DimensionMismatch { expected: 10, actual: 9 }
    );
}

#[test]
fn singular_innovation_falls_back_to_the_pseudo_inverse() {
    // zero spread and zero observation noise make the innovation covariance singular; the
    // pseudo-inverse keeps the step alive with a zero gain
    let mut filter = EnKF::new(
        2,
        10,
        0.0,
        0.0,
        ObservationOperator::Linear { h: DMatrix::identity(2, 2) },
        7,
    );
    let posterior = filter.step(&vec![vec![5.0, 5.0]; 10], &[5.0, 5.0]).unwrap();
    for member in posterior {
        assert_approx_eq!(member[0], 5.0, 1e-9);
        assert_approx_eq!(member[1], 5.0, 1e-9);
    }
}

#[test]
fn initial_ensemble_has_the_requested_shape() {
    let mut rng = StdRng::seed_from_u64(12);
    let ensembles = initial_ensemble(20.0, 5.0, 40, 25, &mut rng).unwrap();
    assert_eq!(ensembles.len(), 25);
    assert!(ensembles.iter().all(|member| member.len() == 40));
    let means = column_means(&ensembles);
    // the grand mean concentrates around the best guess
    let grand = means.iter().sum::<f64>() / 40.0;
    assert!((grand - 20.0).abs() < 2.0);
}
