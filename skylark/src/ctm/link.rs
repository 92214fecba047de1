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

//! Module containing the cell-transmission link.

use super::cell::Cell;
use super::fd::CFL_SPEED_LIMIT;
use super::{LinkId, NetworkError, NodeId};

use log::*;
use std::collections::BTreeMap;

/// Parameters of the triangular fundamental diagram of one link. The capacity flow `qcap` and
/// the backward wave speed `bws` are derived from the three free parameters and must be
/// re-derived whenever those change.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkParams {
    /// free-flow speed in km/h
    pub ffs: f64,
    /// critical density in veh/km
    pub crit_den: f64,
    /// jam density in veh/km
    pub jam_den: f64,
    /// capacity flow in veh/h, derived as `ffs * crit_den`
    pub qcap: f64,
    /// backward wave speed in km/h, derived as `ffs * crit_den / (jam_den - crit_den)`
    pub bws: f64,
    /// link length in km
    pub length: f64,
    /// simulation timestep in seconds
    pub time_step: f64,
}

impl LinkParams {
    /// Build the parameter set, deriving `qcap` and `bws`.
    pub fn new(ffs: f64, crit_den: f64, jam_den: f64, length: f64, time_step: f64) -> Self {
        Self {
            ffs,
            crit_den,
            jam_den,
            qcap: ffs * crit_den,
            bws: (ffs * crit_den) / (jam_den - crit_den),
            length,
            time_step,
        }
    }
}

/// # Cell-transmission link
///
/// A directed road segment between two nodes, discretized into an ordered, non-empty chain of
/// [`Cell`]s. The link also records the cumulative vehicle counts at its upstream and downstream
/// ends (an auxiliary diagnostic series; the dynamics never read it back) and the in-/outflow
/// assigned by its endpoint nodes for the current timestep.
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    upstream: NodeId,
    downstream: NodeId,
    params: LinkParams,
    cells: Vec<Cell>,
    in_flow: f64,
    out_flow: f64,
    upstream_counts: BTreeMap<usize, f64>,
    downstream_counts: BTreeMap<usize, f64>,
}

impl Link {
    /// Create a new link between the given nodes. The number of cells is
    /// `ceil(length / cell_length)` with the CFL-satisfying cell length `ffs * time_step / 3600`;
    /// a link shorter than a single cell is rejected.
    pub fn new(
        id: LinkId,
        upstream: NodeId,
        downstream: NodeId,
        params: LinkParams,
    ) -> Result<Self, NetworkError> {
        let cell_length = params.ffs * params.time_step / 3600.0;
        let num_cells = (params.length / cell_length).ceil() as usize;
        if num_cells == 0 {
            return Err(NetworkError::DegenerateLink(id));
        }
        // the jam capacity of each cell is sized by the average cell length
        let max_vehicles = params.jam_den * params.length / num_cells as f64;
        let cells = (0..num_cells)
            .map(|_| {
                Cell::new(
                    params.qcap,
                    max_vehicles,
                    params.bws / params.ffs,
                    params.time_step,
                    params.ffs,
                )
            })
            .collect();
        Ok(Self {
            id,
            upstream,
            downstream,
            params,
            cells,
            in_flow: 0.0,
            out_flow: 0.0,
            upstream_counts: BTreeMap::new(),
            downstream_counts: BTreeMap::new(),
        })
    }

    /// Number of vehicles that can leave the link during one timestep (sending flow of the last
    /// cell).
    pub fn sending_flow(&self) -> f64 {
        self.cells.last().map(Cell::sending_flow).unwrap_or(0.0)
    }

    /// Number of vehicles that can enter the link during one timestep (receiving flow of the
    /// first cell).
    pub fn receiving_flow(&self) -> f64 {
        self.cells.first().map(Cell::receiving_flow).unwrap_or(0.0)
    }

    /// Advance the link by one timestep: move flow between adjacent cells, then settle the
    /// boundary in-/outflow assigned by the endpoint nodes. All internal transition flows are
    /// computed before any of them is applied, and the internal update precedes the boundary
    /// update, so no vehicle is moved twice within one step.
    pub fn update(&mut self, time: usize) {
        let transitions: Vec<f64> = (0..self.cells.len() - 1)
            .map(|c| self.cells[c].sending_flow().min(self.cells[c + 1].receiving_flow()))
            .collect();
        for (c, flow) in transitions.iter().enumerate() {
            self.cells[c].remove_vehicles(*flow);
            self.cells[c + 1].add_vehicles(*flow);
        }
        self.flow_in(time);
        self.flow_out(time);
    }

    /// Settle the external inflow: record the cumulative upstream count and add the vehicles to
    /// the first cell. The count is overwritten, not accumulated (auxiliary series).
    fn flow_in(&mut self, time: usize) {
        self.upstream_counts.insert(time, self.in_flow);
        self.cells[0].add_vehicles(self.in_flow);
    }

    /// Settle the external outflow: record the cumulative downstream count and remove the
    /// vehicles from the last cell.
    fn flow_out(&mut self, time: usize) {
        self.downstream_counts.insert(time, self.out_flow);
        let last = self.cells.len() - 1;
        self.cells[last].remove_vehicles(self.out_flow);
    }

    /// Per-cell densities in veh/km, in link order.
    pub fn densities(&self) -> Vec<f64> {
        self.cells.iter().map(Cell::density).collect()
    }

    /// Update the free-flow speed and critical density after a parameter assimilation. The
    /// capacity flow is re-derived, while the backward wave speed stays fixed (the uncongested
    /// backward wave of the calibrated diagram is maintained across incidents). A new free-flow
    /// speed above the CFL ceiling is accepted with a warning.
    pub fn update_vmax_crit_den(&mut self, new_ffs: f64, new_crit_den: f64) {
        if new_ffs > CFL_SPEED_LIMIT {
            warn!(
                "CFL condition violated on link {}: free-flow speed {} km/h exceeds {} km/h",
                self.id, new_ffs, CFL_SPEED_LIMIT
            );
        }
        self.params.ffs = new_ffs;
        self.params.crit_den = new_crit_den;
        self.params.qcap = new_ffs * new_crit_den;
        let delta = self.params.bws / self.params.ffs;
        for cell in self.cells.iter_mut() {
            cell.apply_params(self.params.qcap, delta);
        }
    }

    /// Clear the cumulative count series and the current boundary flows.
    pub fn reset_counts(&mut self) {
        self.upstream_counts.clear();
        self.downstream_counts.clear();
        self.in_flow = 0.0;
        self.out_flow = 0.0;
    }

    /// Link id
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Upstream node id
    pub fn upstream(&self) -> NodeId {
        self.upstream
    }

    /// Downstream node id
    pub fn downstream(&self) -> NodeId {
        self.downstream
    }

    /// Fundamental diagram parameters
    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    /// Number of cells of the link
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// The ordered cells of the link
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Mutable access to the ordered cells of the link
    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Total vehicles currently on the link
    pub fn vehicles(&self) -> f64 {
        self.cells.iter().map(Cell::vehicles).sum()
    }

    /// Inflow assigned for the current timestep
    pub fn in_flow(&self) -> f64 {
        self.in_flow
    }

    /// Outflow assigned for the current timestep
    pub fn out_flow(&self) -> f64 {
        self.out_flow
    }

    /// Assign the inflow for the current timestep (set by the upstream node).
    pub fn set_in_flow(&mut self, flow: f64) {
        self.in_flow = flow;
    }

    /// Assign the outflow for the current timestep (set by the downstream node).
    pub fn set_out_flow(&mut self, flow: f64) {
        self.out_flow = flow;
    }

    /// Cumulative upstream count recorded at the given timestep.
    pub fn upstream_count(&self, time: usize) -> f64 {
        self.upstream_counts.get(&time).copied().unwrap_or(0.0)
    }

    /// Cumulative downstream count recorded at the given timestep.
    pub fn downstream_count(&self, time: usize) -> f64 {
        self.downstream_counts.get(&time).copied().unwrap_or(0.0)
    }
}
