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

use skylark::config::{DensityFilterConfig, EstimatorConfig, ParameterFilterConfig};
use skylark::input::{read_measurements, read_network};

use clap::Parser;
use log::*;
use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Estimate the traffic state of a freeway corridor from fixed detectors and a single drone,
/// and plan the drone trajectory that keeps the estimation uncertainty small.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Node file of the corridor (tab-delimited)
    #[arg(long)]
    nodes: PathBuf,
    /// Link file of the corridor (tab-delimited)
    #[arg(long)]
    links: PathBuf,
    /// Demand file of the corridor (tab-delimited)
    #[arg(long)]
    demand: PathBuf,
    /// Link-segment measurement export (semicolon-delimited)
    #[arg(long)]
    measurements: PathBuf,
    /// Simulation horizon in seconds
    #[arg(long, default_value_t = 4490.0)]
    sim_time: f64,
    /// Simulation timestep in seconds
    #[arg(long, default_value_t = 10.0)]
    time_step: f64,
    /// Weight of the parameter covariance trace in the planning objective
    #[arg(long, default_value_t = 1.0)]
    weight: f64,
    /// Standard deviation of the detector density observation noise (veh/km)
    #[arg(long, default_value_t = 10.0)]
    density_obs_error: f64,
    /// Standard deviation of the drone density observation noise (veh/km)
    #[arg(long, default_value_t = 2.0)]
    drone_obs_error: f64,
    /// Standard deviation of the density model noise (veh/km)
    #[arg(long, default_value_t = 5.0)]
    density_model_error: f64,
    /// Number of density ensemble members
    #[arg(long, default_value_t = 100)]
    density_ensembles: usize,
    /// Best-guess density (veh/km) around which the initial density ensemble is drawn
    #[arg(long, default_value_t = 20.0)]
    density_initial_guess: f64,
    /// Standard deviation of the periodic speed observation noise (km/h)
    #[arg(long, default_value_t = 5.0)]
    speed_obs_error: f64,
    /// Standard deviation of the direct free-flow speed observation of the drone (km/h)
    #[arg(long, default_value_t = 10.0)]
    direct_obs_error: f64,
    /// Standard deviation of the parameter random-walk model noise (km/h)
    #[arg(long, default_value_t = 5.0)]
    parameter_model_error: f64,
    /// Number of parameter ensemble members
    #[arg(long, default_value_t = 100)]
    parameter_ensembles: usize,
    /// Best-guess free-flow speed (km/h) around which the initial parameter ensemble is drawn
    #[arg(long, default_value_t = 80.0)]
    parameter_initial_guess: f64,
    /// Timesteps between periodic speed assimilations
    #[arg(long, default_value_t = 30)]
    speed_period: usize,
    /// Ramp links excluded from the corridor state
    #[arg(long, value_delimiter = ',', default_value = "9")]
    ramp_links: Vec<usize>,
    /// Incident-prone links, in parameter order
    #[arg(long, value_delimiter = ',', default_value = "2,7")]
    incident_links: Vec<usize>,
    /// True free-flow speed at an incident (km/h), observed directly by the drone
    #[arg(long, default_value_t = 20.0)]
    true_incident_ffs: f64,
    /// Link of the initial drone location
    #[arg(long, default_value_t = 5)]
    drone_link: usize,
    /// Cell offset of the initial drone location within its link
    #[arg(long, default_value_t = 0)]
    drone_cell: usize,
    /// Seed of all random draws
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Write the result series to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // initialize the env logger
    pretty_env_logger::init();

    let args = Args::parse();
    let config = EstimatorConfig {
        path_weight: args.weight,
        density: DensityFilterConfig {
            obs_error: args.density_obs_error,
            drone_obs_error: args.drone_obs_error,
            model_error: args.density_model_error,
            ensemble_size: args.density_ensembles,
            initial_guess: args.density_initial_guess,
        },
        parameters: ParameterFilterConfig {
            speed_obs_error: args.speed_obs_error,
            direct_obs_error: args.direct_obs_error,
            model_error: args.parameter_model_error,
            ensemble_size: args.parameter_ensembles,
            initial_guess: args.parameter_initial_guess,
            speed_period: args.speed_period,
        },
        ramp_links: args.ramp_links.clone(),
        incident_links: args.incident_links.clone(),
        true_incident_ffs: args.true_incident_ffs,
        drone_start: (args.drone_link, args.drone_cell),
        seed: args.seed,
    };

    let net = read_network(&args.nodes, &args.links, &args.demand, args.sim_time, args.time_step)?;
    let data = read_measurements(&args.measurements, &config.ramp_links, &config.incident_links)?;

    info!("starting the estimation run");
    let log = skylark::estimate(net, &data, config)?;
    info!("estimation finished after {} timesteps", log.drone_cells.len());

    match args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            log.write_tsv(&mut writer)?;
            writer.flush()?;
        }
        None => log.write_tsv(&mut std::io::stdout())?,
    }

    Ok(())
}
