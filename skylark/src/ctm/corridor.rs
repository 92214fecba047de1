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

//! Module containing the corridor cell bijection.

use super::network::Network;
use super::LinkId;

use std::collections::HashMap;

/// # Corridor cell index
///
/// Bijection between (link id, cell offset) locations and the global corridor cell index in
/// `[0, C)`, enumerating the cells of all non-ramp links in link insertion order. The bijection
/// is built once at network setup and stays fixed for the lifetime of a simulation; the drone
/// position, the observation operators and the planner all speak in global corridor cells.
///
/// The index also knows each cell's length and therefore translates between corridor cells and
/// physical positions (km from the corridor start): a cell maps to its midpoint, and a position
/// maps to the cell whose span contains it.
#[derive(Debug, Clone)]
pub struct CorridorIndex {
    loc_to_cell: HashMap<(LinkId, usize), usize>,
    cell_to_loc: Vec<(LinkId, usize)>,
    /// start position (km) of every cell, plus the corridor end as a final entry
    cell_starts: Vec<f64>,
}

impl CorridorIndex {
    /// Build the bijection from the network's non-ramp links, in link insertion order.
    pub fn new(net: &Network) -> Self {
        let mut loc_to_cell = HashMap::new();
        let mut cell_to_loc = Vec::new();
        let mut cell_starts = vec![0.0];
        let mut position = 0.0;
        for id in net.link_order().iter().filter(|id| !net.ramp_links().contains(*id)) {
            let link = net.get_link(*id).expect("link order out of sync with link map");
            for (offset, cell) in link.cells().iter().enumerate() {
                loc_to_cell.insert((*id, offset), cell_to_loc.len());
                cell_to_loc.push((*id, offset));
                position += cell.length();
                cell_starts.push(position);
            }
        }
        Self { loc_to_cell, cell_to_loc, cell_starts }
    }

    /// Number of corridor cells `C`.
    pub fn num_cells(&self) -> usize {
        self.cell_to_loc.len()
    }

    /// Global corridor cell of a (link id, cell offset) location, or `None` if the location is
    /// not part of the corridor.
    pub fn cell(&self, location: (LinkId, usize)) -> Option<usize> {
        self.loc_to_cell.get(&location).copied()
    }

    /// (link id, cell offset) location of a global corridor cell.
    pub fn location(&self, cell: usize) -> Option<(LinkId, usize)> {
        self.cell_to_loc.get(cell).copied()
    }

    /// Link carrying the given global corridor cell.
    pub fn link_of(&self, cell: usize) -> Option<LinkId> {
        self.location(cell).map(|(link, _)| link)
    }

    /// Physical position (km from the corridor start) of the midpoint of a corridor cell.
    pub fn position_km(&self, cell: usize) -> Option<f64> {
        if cell < self.num_cells() {
            Some((self.cell_starts[cell] + self.cell_starts[cell + 1]) / 2.0)
        } else {
            None
        }
    }

    /// Corridor cell whose span contains the physical position (km from the corridor start).
    /// The corridor end itself maps to the last cell.
    pub fn cell_at_km(&self, position: f64) -> Option<usize> {
        if !(position >= 0.0) || self.num_cells() == 0 || position > self.cell_starts[self.num_cells()]
        {
            return None;
        }
        Some(
            (0..self.num_cells())
                .find(|&c| position < self.cell_starts[c + 1])
                .unwrap_or(self.num_cells() - 1),
        )
    }
}
