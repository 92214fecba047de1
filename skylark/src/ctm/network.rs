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

//! # Top-level Network module
//!
//! This module owns the corridor topology and advances the traffic state one timestep at a
//! time. Per step, every node moves flow between its adjacent links first, and only then does
//! every link settle its internal cell transitions and boundary flows, so that all flows of a
//! step are computed against the same pre-step state.

use super::corridor::CorridorIndex;
use super::link::{Link, LinkParams};
use super::node::Node;
use super::{LinkId, NetworkError, NodeId};

use log::*;
use petgraph::algo::connected_components;
use petgraph::prelude::*;
use std::collections::{HashMap, HashSet};

/// # Network struct
///
/// The struct contains the node and link maps, the demand schedule (owned by the origin nodes),
/// the simulation horizon, and the set of ramp links excluded from the corridor state vector.
/// Links are kept in insertion order; the global corridor cell index enumerates the cells of all
/// non-ramp links in exactly that order, and the bijection is fixed for the lifetime of a
/// simulation.
///
/// Nodes and links reference each other by id only and are resolved through the maps, so the
/// topology contains no reference cycles and the whole network can be deep-copied with a plain
/// `clone()`. This is exactly what the path planner does to run counterfactual updates without
/// contaminating the true state.
#[derive(Debug, Clone)]
pub struct Network {
    sim_time: f64,
    time_step: f64,
    nodes: HashMap<NodeId, Node>,
    links: HashMap<LinkId, Link>,
    node_order: Vec<NodeId>,
    link_order: Vec<LinkId>,
    ramp_links: HashSet<LinkId>,
    incident_links: Vec<LinkId>,
}

impl Network {
    /// Generate an empty network with the given simulation horizon (seconds) and timestep
    /// (seconds).
    pub fn new(sim_time: f64, time_step: f64) -> Self {
        Self {
            sim_time,
            time_step,
            nodes: HashMap::new(),
            links: HashMap::new(),
            node_order: Vec::new(),
            link_order: Vec::new(),
            ramp_links: HashSet::new(),
            incident_links: Vec::new(),
        }
    }

    /// Add a node to the network.
    pub fn add_node(&mut self, node: Node) {
        let id = node.id();
        if self.nodes.insert(id, node).is_none() {
            self.node_order.push(id);
        }
    }

    /// Add a link to the network. Both endpoint nodes must have been added before.
    pub fn add_link(
        &mut self,
        id: LinkId,
        upstream: NodeId,
        downstream: NodeId,
        ffs: f64,
        crit_den: f64,
        jam_den: f64,
        length: f64,
    ) -> Result<(), NetworkError> {
        if !self.nodes.contains_key(&upstream) {
            return Err(NetworkError::UnknownNode(upstream));
        }
        if !self.nodes.contains_key(&downstream) {
            return Err(NetworkError::UnknownNode(downstream));
        }
        let params = LinkParams::new(ffs, crit_den, jam_den, length, self.time_step);
        let link = Link::new(id, upstream, downstream, params)?;
        if self.links.insert(id, link).is_none() {
            self.link_order.push(id);
        }
        Ok(())
    }

    /// Declare the given links as ramps: their cells are excluded from the corridor state
    /// vector, and their content is zeroed whenever an assimilated state is written back (so
    /// that vehicles on the ramp can always leave). Comparison is by link id value.
    pub fn set_ramp_links(&mut self, ramp_links: impl IntoIterator<Item = LinkId>) {
        self.ramp_links = ramp_links.into_iter().collect();
    }

    /// Declare the incident-prone links, in parameter order: the k-th entry of a parameter
    /// update is applied to the k-th link of this list.
    pub fn set_incident_links(&mut self, incident_links: Vec<LinkId>) {
        self.incident_links = incident_links;
    }

    /// Register a demand rate (veh/h) at an origin node for the given timestep index.
    pub fn set_demand(&mut self, origin: NodeId, time: usize, rate: f64) -> Result<(), NetworkError> {
        self.nodes
            .get_mut(&origin)
            .ok_or(NetworkError::UnknownNode(origin))?
            .set_demand(time, rate)
    }

    /// Check that the topology is sound: every link referenced by a node star exists, every
    /// incident link exists, and the node/link graph is connected.
    pub fn validate(&self) -> Result<(), NetworkError> {
        for node in self.nodes.values() {
            for link in node.fstar().iter().chain(node.rstar().iter()) {
                if !self.links.contains_key(link) {
                    return Err(NetworkError::UnknownLink(*link));
                }
            }
        }
        for link in self.incident_links.iter() {
            if !self.links.contains_key(link) {
                return Err(NetworkError::UnknownLink(*link));
            }
        }
        let mut graph: UnGraph<NodeId, LinkId, u32> = Graph::new_undirected();
        let mut indices: HashMap<NodeId, NodeIndex<u32>> = HashMap::new();
        for id in self.node_order.iter() {
            indices.insert(*id, graph.add_node(*id));
        }
        for link in self.links.values() {
            graph.add_edge(indices[&link.upstream()], indices[&link.downstream()], link.id());
        }
        if self.nodes.len() > 1 && connected_components(&graph) != 1 {
            return Err(NetworkError::DisconnectedTopology);
        }
        debug!(
            "validated corridor topology: {} nodes, {} links, {} corridor cells",
            self.nodes.len(),
            self.links.len(),
            self.num_corridor_cells()
        );
        Ok(())
    }

    /// Advance the network by one timestep: update all nodes at `time` (which assigns the
    /// boundary flows of every link), then update all links at `time + 1`. Returns the corridor
    /// state after the step as a flat vector of per-cell densities over all non-ramp links, in
    /// corridor cell order.
    pub fn load_step(&mut self, time: usize) -> Result<Vec<f64>, NetworkError> {
        let time_step = self.time_step;
        let links = &mut self.links;
        for id in self.node_order.iter() {
            self.nodes[id].update(time, time_step, links)?;
        }
        for id in self.link_order.iter() {
            links.get_mut(id).ok_or(NetworkError::UnknownLink(*id))?.update(time + 1);
        }
        Ok(self.corridor_densities())
    }

    /// Run the full network loading to the simulation horizon, returning the corridor density
    /// vector of every timestep.
    pub fn network_loading(&mut self) -> Result<Vec<Vec<f64>>, NetworkError> {
        info!("loading the network for {} timesteps", self.num_steps());
        (0..self.num_steps()).map(|time| self.load_step(time)).collect()
    }

    /// Current corridor state: per-cell densities of all non-ramp links, in corridor cell
    /// order.
    pub fn corridor_densities(&self) -> Vec<f64> {
        self.link_order
            .iter()
            .filter(|id| !self.ramp_links.contains(*id))
            .flat_map(|id| self.links[id].densities())
            .collect()
    }

    /// Write an assimilated corridor state back into the cells: each non-ramp cell receives
    /// `density * cell length` vehicles (clamped to its physical bounds), and every ramp cell
    /// is emptied so that diverging vehicles can always leave the corridor.
    pub fn set_corridor_vehicles(&mut self, densities: &[f64]) -> Result<(), NetworkError> {
        let expected = self.num_corridor_cells();
        if densities.len() != expected {
            return Err(NetworkError::CorridorDimension { expected, actual: densities.len() });
        }
        let mut index = 0;
        for id in self.link_order.iter() {
            let ramp = self.ramp_links.contains(id);
            let link = self.links.get_mut(id).ok_or(NetworkError::UnknownLink(*id))?;
            for cell in link.cells_mut() {
                if ramp {
                    cell.set_vehicles(0.0);
                } else {
                    cell.set_vehicles(densities[index] * cell.length());
                    index += 1;
                }
            }
        }
        Ok(())
    }

    /// Apply an assimilated parameter update: the k-th (free-flow speed, critical density) pair
    /// is written into the k-th incident link, re-deriving the capacity flow and keeping the
    /// backward wave speed fixed.
    pub fn update_vmax_crit_den(
        &mut self,
        new_ffs: &[f64],
        new_crit_den: &[f64],
    ) -> Result<(), NetworkError> {
        let expected = self.incident_links.len();
        if new_ffs.len() != expected || new_crit_den.len() != expected {
            return Err(NetworkError::ParameterDimension {
                expected,
                actual: new_ffs.len().min(new_crit_den.len()),
            });
        }
        for (k, id) in self.incident_links.iter().enumerate() {
            self.links
                .get_mut(id)
                .ok_or(NetworkError::UnknownLink(*id))?
                .update_vmax_crit_den(new_ffs[k], new_crit_den[k]);
        }
        Ok(())
    }

    /// Build the (fixed) bijection between (link id, cell offset) locations and global corridor
    /// cell indices.
    pub fn corridor_index(&self) -> CorridorIndex {
        CorridorIndex::new(self)
    }

    /// Clear the cumulative count series and boundary flows of every link.
    pub fn reset_counts(&mut self) {
        for link in self.links.values_mut() {
            link.reset_counts();
        }
    }

    /// Number of corridor (non-ramp) cells.
    pub fn num_corridor_cells(&self) -> usize {
        self.link_order
            .iter()
            .filter(|id| !self.ramp_links.contains(*id))
            .map(|id| self.links[id].num_cells())
            .sum()
    }

    /// Number of timesteps of the simulation horizon (including timestep zero).
    pub fn num_steps(&self) -> usize {
        (self.sim_time / self.time_step).ceil() as usize + 1
    }

    /// Index of the last timestep.
    pub fn last_step(&self) -> usize {
        self.num_steps() - 1
    }

    /// Simulation horizon in seconds
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Simulation timestep in seconds
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Get a reference to a link
    pub fn get_link(&self, id: LinkId) -> Result<&Link, NetworkError> {
        self.links.get(&id).ok_or(NetworkError::UnknownLink(id))
    }

    /// Get a reference to a node
    pub fn get_node(&self, id: NodeId) -> Result<&Node, NetworkError> {
        self.nodes.get(&id).ok_or(NetworkError::UnknownNode(id))
    }

    /// Link ids in insertion order
    pub fn link_order(&self) -> &[LinkId] {
        &self.link_order
    }

    /// The set of ramp links excluded from the corridor state
    pub fn ramp_links(&self) -> &HashSet<LinkId> {
        &self.ramp_links
    }

    /// The incident-prone links, in parameter order
    pub fn incident_links(&self) -> &[LinkId] {
        &self.incident_links
    }
}
