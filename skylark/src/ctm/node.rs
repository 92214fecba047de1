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

//! Module containing the node variants which move flow between adjacent links.

use super::link::Link;
use super::{LinkId, NetworkError, NodeId};

use std::collections::HashMap;

/// # Node model
///
/// Tagged variant describing how a node moves flow between its incoming and outgoing links.
/// There is no deep hierarchy: a single [`Node::transition_flows`] dispatches on this enum.
#[derive(Debug, Clone)]
pub enum NodeModel {
    /// Source of the corridor. Owns the time-indexed demand rates (veh/h); missing timesteps
    /// default to zero demand.
    Origin {
        /// demand rate in veh/h per timestep index
        demand: HashMap<usize, f64>,
    },
    /// Sink of the corridor. Everything the upstream link can send leaves the network.
    Destination,
    /// One incoming and one outgoing link connected in series.
    Series,
    /// One incoming link splitting into several outgoing links with fixed proportions. The
    /// split preserves FIFO: a single scaling factor throttles all branches together as soon as
    /// one of them is full.
    Diverge {
        /// fixed splitting proportion per outgoing link, summing to one
        proportions: HashMap<LinkId, f64>,
    },
}

/// # Node
///
/// A junction of the corridor, holding the ids of its outgoing links (forward star) and incoming
/// links (reverse star). Links are resolved through the network's link map, never through object
/// references, so the topology stays free of reference cycles.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    fstar: Vec<LinkId>,
    rstar: Vec<LinkId>,
    model: NodeModel,
}

impl Node {
    /// Create a new node and check that the stars are consistent with the model: zones connect
    /// to exactly one link (an origin has no incoming links, a destination no outgoing ones),
    /// series nodes connect exactly one-to-one, and diverge nodes carry a proportion for every
    /// outgoing link, summing to one.
    pub fn new(
        id: NodeId,
        fstar: Vec<LinkId>,
        rstar: Vec<LinkId>,
        model: NodeModel,
    ) -> Result<Self, NetworkError> {
        match &model {
            NodeModel::Origin { .. } => {
                if !rstar.is_empty() {
                    return Err(NetworkError::AmbiguousZone(id));
                }
                if fstar.len() != 1 {
                    return Err(NetworkError::UnsupportedZoneDegree(id));
                }
            }
            NodeModel::Destination => {
                if !fstar.is_empty() {
                    return Err(NetworkError::AmbiguousZone(id));
                }
                if rstar.len() != 1 {
                    return Err(NetworkError::UnsupportedZoneDegree(id));
                }
            }
            NodeModel::Series => {
                if fstar.len() != 1 || rstar.len() != 1 {
                    return Err(NetworkError::BadSeriesDegree(id));
                }
            }
            NodeModel::Diverge { proportions } => {
                if rstar.len() != 1 || fstar.is_empty() {
                    return Err(NetworkError::BadDivergeDegree(id));
                }
                for out in fstar.iter() {
                    if !proportions.contains_key(out) {
                        return Err(NetworkError::MissingProportion(id, *out));
                    }
                }
                let total: f64 = fstar.iter().map(|out| proportions[out]).sum();
                if (total - 1.0).abs() > 1e-6 {
                    return Err(NetworkError::BadProportions(id, total));
                }
            }
        }
        Ok(Self { id, fstar, rstar, model })
    }

    /// Move flow through the node for one timestep: gather the sending flow of every incoming
    /// link and the receiving flow of every outgoing link, compute the transition flows, and
    /// assign each incoming link its outflow (row sum) and each outgoing link its inflow
    /// (column sum). Zones bypass the transition-flow computation: origins inject their demand
    /// into the downstream link, destinations drain whatever the upstream link can send.
    pub fn update(
        &self,
        time: usize,
        time_step: f64,
        links: &mut HashMap<LinkId, Link>,
    ) -> Result<(), NetworkError> {
        match &self.model {
            NodeModel::Origin { .. } => {
                let rate = self.demand_rate(time);
                for out in self.fstar.iter() {
                    let link = links.get_mut(out).ok_or(NetworkError::UnknownLink(*out))?;
                    link.set_in_flow(rate * time_step / 3600.0);
                }
                Ok(())
            }
            NodeModel::Destination => {
                for inc in self.rstar.iter() {
                    let link = links.get_mut(inc).ok_or(NetworkError::UnknownLink(*inc))?;
                    let flow = link.sending_flow();
                    link.set_out_flow(flow);
                }
                Ok(())
            }
            NodeModel::Series | NodeModel::Diverge { .. } => {
                let mut sending = HashMap::new();
                let mut receiving = HashMap::new();
                for inc in self.rstar.iter() {
                    let link = links.get(inc).ok_or(NetworkError::UnknownLink(*inc))?;
                    sending.insert(*inc, link.sending_flow());
                }
                for out in self.fstar.iter() {
                    let link = links.get(out).ok_or(NetworkError::UnknownLink(*out))?;
                    receiving.insert(*out, link.receiving_flow());
                }
                let transitions = self.transition_flows(&sending, &receiving)?;
                for (inc, row) in transitions.iter() {
                    let out_flow: f64 = row.values().sum();
                    links
                        .get_mut(inc)
                        .ok_or(NetworkError::UnknownLink(*inc))?
                        .set_out_flow(out_flow);
                }
                let mut in_flows: HashMap<LinkId, f64> = HashMap::new();
                for row in transitions.values() {
                    for (out, flow) in row.iter() {
                        *in_flows.entry(*out).or_insert(0.0) += flow;
                    }
                }
                for (out, in_flow) in in_flows {
                    links
                        .get_mut(&out)
                        .ok_or(NetworkError::UnknownLink(out))?
                        .set_in_flow(in_flow);
                }
                Ok(())
            }
        }
    }

    /// Compute the transition flows between the incoming and outgoing links as a nested map
    /// `{incoming link -> {outgoing link -> vehicles}}`, given the per-link sending and
    /// receiving flows. Only series and diverge nodes carry transition flows; zones return an
    /// empty map.
    pub fn transition_flows(
        &self,
        sending: &HashMap<LinkId, f64>,
        receiving: &HashMap<LinkId, f64>,
    ) -> Result<HashMap<LinkId, HashMap<LinkId, f64>>, NetworkError> {
        let mut transitions: HashMap<LinkId, HashMap<LinkId, f64>> = HashMap::new();
        match &self.model {
            NodeModel::Origin { .. } | NodeModel::Destination => {}
            NodeModel::Series => {
                let inc = self.rstar[0];
                let out = self.fstar[0];
                let flow = sending
                    .get(&inc)
                    .ok_or(NetworkError::UnknownLink(inc))?
                    .min(*receiving.get(&out).ok_or(NetworkError::UnknownLink(out))?);
                transitions.entry(inc).or_default().insert(out, flow);
            }
            NodeModel::Diverge { proportions } => {
                let inc = self.rstar[0];
                let send = *sending.get(&inc).ok_or(NetworkError::UnknownLink(inc))?;
                let mut theta: f64 = 1.0;
                for out in self.fstar.iter() {
                    let prop = proportions[out];
                    if send != 0.0 && prop != 0.0 {
                        let recv = *receiving.get(out).ok_or(NetworkError::UnknownLink(*out))?;
                        theta = theta.min(recv / (prop * send));
                    }
                }
                let row = transitions.entry(inc).or_default();
                for out in self.fstar.iter() {
                    row.insert(*out, theta * proportions[out] * send);
                }
            }
        }
        Ok(transitions)
    }

    /// Demand rate in veh/h at the given timestep. Zero for missing timesteps and for any node
    /// which is not an origin.
    pub fn demand_rate(&self, time: usize) -> f64 {
        match &self.model {
            NodeModel::Origin { demand } => demand.get(&time).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Register a demand rate (veh/h) at the given timestep. Fails on non-origin nodes.
    pub fn set_demand(&mut self, time: usize, rate: f64) -> Result<(), NetworkError> {
        match &mut self.model {
            NodeModel::Origin { demand } => {
                demand.insert(time, rate);
                Ok(())
            }
            _ => Err(NetworkError::NotAnOrigin(self.id)),
        }
    }

    /// Node id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Outgoing link ids (forward star)
    pub fn fstar(&self) -> &[LinkId] {
        &self.fstar
    }

    /// Incoming link ids (reverse star)
    pub fn rstar(&self) -> &[LinkId] {
        &self.rstar
    }

    /// The node model
    pub fn model(&self) -> &NodeModel {
        &self.model
    }

    /// Returns true if and only if the node is an origin zone.
    pub fn is_origin(&self) -> bool {
        matches!(self.model, NodeModel::Origin { .. })
    }

    /// Returns true if and only if the node is a destination zone.
    pub fn is_destination(&self) -> bool {
        matches!(self.model, NodeModel::Destination)
    }
}
