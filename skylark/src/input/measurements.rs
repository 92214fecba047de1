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

//! Parser for the semicolon-delimited link-segment measurement export.

use super::InputError;
use crate::ctm::LinkId;

use log::*;
use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::Path;

/// Positions (meters from the link start) of the six corridor sampling points of every link.
/// Only rows measured at one of these positions enter the density observation vector, which
/// makes the detector grid line up with the cell discretization.
pub const SAMPLE_POSITIONS: [f64; 6] = [120.0, 370.0, 620.0, 870.0, 1120.0, 1370.0];

/// Speed (km/h) recorded in place of a measured speed when the measured density is zero: an
/// empty detector reports free flow.
pub const FREE_FLOW_SURROGATE: f64 = 100.0;

/// # Detector measurements
///
/// Time-indexed density and speed observations extracted from the link-segment export. The
/// density vector of a timestep holds one entry per corridor sampling point, in file row order;
/// the speed vector holds one entry per incident-prone link (measured at the first sampling
/// point of that link).
#[derive(Debug, Clone, Default)]
pub struct MeasurementData {
    density: BTreeMap<usize, Vec<f64>>,
    speed: BTreeMap<usize, Vec<f64>>,
}

impl MeasurementData {
    /// The density observation vector of the given timestep.
    pub fn density(&self, time: usize) -> Option<&[f64]> {
        self.density.get(&time).map(Vec::as_slice)
    }

    /// The speed observation vector of the given timestep.
    pub fn speed(&self, time: usize) -> Option<&[f64]> {
        self.speed.get(&time).map(Vec::as_slice)
    }

    /// Number of timesteps carrying a density observation.
    pub fn num_steps(&self) -> usize {
        self.density.len()
    }

    /// Register a density observation vector for the given timestep. This is the programmatic
    /// counterpart of [`read_measurements`], useful for synthetic scenarios.
    pub fn insert_density(&mut self, time: usize, densities: Vec<f64>) {
        self.density.insert(time, densities);
    }

    /// Register a speed observation vector for the given timestep.
    pub fn insert_speed(&mut self, time: usize, speeds: Vec<f64>) {
        self.speed.insert(time, speeds);
    }
}

/// Read a link-segment measurement export. A row is used iff its first field parses as a float
/// equal to one (the first simulation run of the export). The second field is the time bin
/// `start-end` (the start, divided by ten, is the timestep index), the third field is
/// `linkId-posStart-posEnd`, the fourth field the density (veh/km) and the sixth field the
/// speed (km/h). Rows on ramp links or away from the sampling points are dropped; the speed at
/// the first sampling point of an incident-prone link is recorded, substituting free flow
/// where the measured density is zero. Malformed rows are skipped with a warning.
pub fn read_measurements(
    file: impl AsRef<Path>,
    ramp_links: &[LinkId],
    incident_links: &[LinkId],
) -> Result<MeasurementData, InputError> {
    info!("reading measurement file {}", file.as_ref().display());
    let content = read_to_string(file.as_ref())?;
    let mut data = MeasurementData::default();
    let mut skipped = 0;
    for (i, row) in content.lines().enumerate() {
        let fields: Vec<&str> = row.trim().split(';').collect();
        // only rows of the first simulation run carry measurements
        if fields.first().and_then(|f| f.trim().parse::<f64>().ok()) != Some(1.0) {
            continue;
        }
        match parse_row(&fields, ramp_links, incident_links) {
            Some((time, density, speed)) => {
                let densities = data.density.entry(time).or_default();
                let speeds = data.speed.entry(time).or_default();
                if let Some(density) = density {
                    densities.push(density);
                }
                if let Some(speed) = speed {
                    speeds.push(speed);
                }
            }
            None => {
                warn!("skipping malformed measurement row on line {}: {}", i + 1, row);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        warn!("skipped {} malformed measurement rows", skipped);
    }
    info!("read observations for {} timesteps", data.density.len());
    Ok(data)
}

/// Decode one measurement row which passed the run-number gate. Returns the timestep together
/// with the density observation (if the row sits on a corridor sampling point) and the speed
/// observation (if the row is the first sampling point of an incident-prone link), or `None`
/// if the row is malformed.
fn parse_row(
    fields: &[&str],
    ramp_links: &[LinkId],
    incident_links: &[LinkId],
) -> Option<(usize, Option<f64>, Option<f64>)> {
    let time_bin = fields.get(1)?.split('-').next()?;
    let time = (time_bin.trim().parse::<f64>().ok()? / 10.0) as usize;
    let mut road = fields.get(2)?.split('-');
    let link = road.next()?.trim().parse::<f64>().ok()? as LinkId;
    let position = road.next()?.trim().parse::<f64>().ok()?;
    let density = fields.get(3)?.trim().parse::<f64>().ok()?;

    if ramp_links.contains(&link) || !SAMPLE_POSITIONS.contains(&position) {
        return Some((time, None, None));
    }
    let speed = if incident_links.contains(&link) && position == SAMPLE_POSITIONS[0] {
        if density != 0.0 {
            Some(fields.get(5)?.trim().parse::<f64>().ok()?)
        } else {
            Some(FREE_FLOW_SURROGATE)
        }
    } else {
        None
    };
    Some((time, Some(density), speed))
}
