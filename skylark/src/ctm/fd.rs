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

//! # Triangular Fundamental Diagram
//!
//! Flow-density relation of the corridor, parameterized by the free-flow speed, the critical
//! density and the jam density. The calibration below was fitted against the reference corridor
//! under normal (incident-free) conditions; it ties the critical density to the free-flow speed
//! such that the backward wave of the uncalibrated diagram is maintained when the free-flow
//! speed drops during an incident.

/// Calibrated free-flow speed (km/h) of the reference diagram
pub const CALIB_FFS: f64 = 100.0;
/// Calibrated critical density (veh/km) of the reference diagram
pub const CALIB_CRIT_DEN: f64 = 80.0;
/// Jam density (veh/km), common to all links
pub const JAM_DEN: f64 = 300.0;
/// Free-flow speed (km/h) above which the CFL condition of the cell discretization is violated
pub const CFL_SPEED_LIMIT: f64 = 110.0;

/// Critical density (veh/km) consistent with the given free-flow speed, keeping the backward
/// wave of the calibrated diagram fixed.
pub fn crit_den_for_vmax(vmax: f64) -> f64 {
    (CALIB_CRIT_DEN * CALIB_FFS * JAM_DEN)
        / (vmax * (JAM_DEN - CALIB_CRIT_DEN) + CALIB_CRIT_DEN * CALIB_FFS)
}

/// Free-flow speed (km/h) whose [`crit_den_for_vmax`] equals the given critical density. This is
/// the exact inverse of [`crit_den_for_vmax`].
pub fn vmax_for_crit_den(crit_den: f64) -> f64 {
    (CALIB_CRIT_DEN * CALIB_FFS * JAM_DEN / crit_den - CALIB_CRIT_DEN * CALIB_FFS)
        / (JAM_DEN - CALIB_CRIT_DEN)
}

/// Model-predicted speed measurement (km/h) at a detector, given the current free-flow speed
/// `vmax` and the local density `density`. This is the nonlinear observation map of the
/// parameter filter: below the critical density the diagram is on its free-flow branch and the
/// measured speed equals `vmax`; above it, the speed follows the congested branch.
pub fn predicted_speed(vmax: f64, density: f64) -> f64 {
    let crit_den = crit_den_for_vmax(vmax);
    if density > crit_den {
        vmax * crit_den * (JAM_DEN - density) / (density * (JAM_DEN - crit_den))
    } else {
        // at the critical density both branches meet at vmax
        vmax
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn calibration_fixpoint() {
        // at the calibrated free-flow speed, the calibrated critical density is reproduced
        assert_approx_eq!(crit_den_for_vmax(CALIB_FFS), CALIB_CRIT_DEN, 1e-12);
    }

    #[test]
    fn crit_den_round_trip() {
        for vmax in &[20.0, 40.0, 55.0, 80.0, 100.0, 110.0] {
            assert_approx_eq!(vmax_for_crit_den(crit_den_for_vmax(*vmax)), *vmax, 1e-9);
        }
    }

    #[test]
    fn free_flow_branch() {
        let vmax = 70.0;
        let crit_den = crit_den_for_vmax(vmax);
        for density in &[0.0, 10.0, crit_den * 0.5, crit_den] {
            assert_approx_eq!(predicted_speed(vmax, *density), vmax, 1e-12);
        }
    }

    #[test]
    fn congested_branch_monotone_in_density() {
        let vmax = 70.0;
        let crit_den = crit_den_for_vmax(vmax);
        let mut last = predicted_speed(vmax, crit_den + 1.0);
        let mut density = crit_den + 2.0;
        while density < JAM_DEN {
            let speed = predicted_speed(vmax, density);
            assert!(speed <= last);
            last = speed;
            density += 2.0;
        }
    }

    #[test]
    fn congested_branch_monotone_in_vmax() {
        let density = 200.0;
        let mut last = 0.0;
        for vmax in &[20.0, 40.0, 60.0, 80.0, 100.0] {
            // non-strict: with this calibration the congested branch is insensitive to vmax
            let speed = predicted_speed(*vmax, density);
            assert!(speed >= last - 1e-9);
            last = speed;
        }
    }
}
