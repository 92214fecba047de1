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

#![deny(missing_docs)]

//! # Skylark: Drone-Assisted Freeway Traffic State Estimation
//!
//! This is a library for estimating, in real time, the latent state of a one-dimensional freeway
//! corridor while simultaneously steering a single aerial sensor (a drone) that complements the
//! fixed roadside detectors. The corridor is modeled as a chain of discrete cells carrying
//! first-order kinematic-wave dynamics (a cell-transmission model). Two unknown quantities are
//! tracked jointly: the per-cell vehicle densities, and the free-flow speed parameters of two
//! incident-prone regions whose true values may drop abruptly when an incident occurs.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`ctm`](ctm)**: The traffic simulator. See the main structure [`Network`](ctm::Network),
//!   which owns the [`Link`](ctm::Link)s (ordered chains of [`Cell`](ctm::Cell)s), the
//!   [`Node`](ctm::Node) variants connecting them, and the corridor-cell bijection
//!   [`CorridorIndex`](ctm::CorridorIndex). The triangular fundamental diagram lives in
//!   [`ctm::fd`].
//!
//! - **[`enkf`](enkf)**: The stochastic ensemble Kalman filter after Evensen (2003). A single
//!   [`EnKF`](enkf::EnKF) supports both a linear observation matrix and a nonlinear observation
//!   map, selected through the tagged [`ObservationOperator`](enkf::ObservationOperator). It is
//!   instantiated twice with different shapes: once over the corridor densities, and once over
//!   the free-flow speeds of the incident-prone regions.
//!
//! - **[`planner`](planner)**: The one-step-lookahead sensor placement. The
//!   [`PathPlanner`](planner::PathPlanner) enumerates the two candidate drone trajectories,
//!   replays counterfactual filter updates along each on deep copies of the simulator and both
//!   filters, and picks the direction with the smaller weighted covariance trace (the A-optimal
//!   design criterion).
//!
//! - **[`estimator`](estimator)**: The per-timestep driver coupling everything: ensemble
//!   propagation, density assimilation, periodic speed assimilation, direct free-flow speed
//!   assimilation when the drone hovers over an incident region, parameter write-back, and
//!   path planning.
//!
//! - **[`input`](input)**: Parsers for the tab-delimited nodes/links/demand files and the
//!   semicolon-delimited detector measurement export.
//!
//! - **[`config`](config)**: Run configuration with the reference calibration as defaults.
//!
//! ## Usage
//!
//! Prepare a [`Network`](ctm::Network) (usually through [`input::read_network`]), load the
//! detector data, and call [`estimate`]:
//!
//! ```no_run
//! use skylark::config::EstimatorConfig;
//! use skylark::input::{read_measurements, read_network};
//! use skylark::Error;
//!
//! fn main() -> Result<(), Error> {
//!     pretty_env_logger::init();
//!
//!     let config = EstimatorConfig::default();
//!     let net = read_network("nodes.txt", "links.txt", "demand.txt", 4490.0, 10.0)?;
//!     let data = read_measurements("measurements.att", &config.ramp_links, &config.incident_links)?;
//!
//!     let log = skylark::estimate(net, &data, config)?;
//!     log.write_tsv(&mut std::io::stdout())?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ctm;
pub mod enkf;
pub mod estimator;
pub mod input;
pub mod planner;

mod error;
mod test;

pub use error::Error;
pub use estimator::{estimate, EstimateLog, Estimator};
