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

//! # Cell-Transmission Traffic Simulator
//!
//! This module contains the first-order traffic flow model of the corridor: the Godunov
//! discretization of the LWR kinematic-wave PDE with a triangular fundamental diagram. The
//! [`Network`] owns all [`Node`]s and [`Link`]s and advances them one timestep at a time. Links
//! are ordered chains of [`Cell`]s sized such that a vehicle at free-flow speed crosses exactly
//! one cell per timestep (the CFL-satisfying cell size).

mod cell;
mod corridor;
mod link;
mod network;
mod node;

pub mod fd;

pub use cell::Cell;
pub use corridor::CorridorIndex;
pub use link::{Link, LinkParams};
pub use network::Network;
pub use node::{Node, NodeModel};

use thiserror::Error;

/// Link identification
pub type LinkId = usize;
/// Node identification
pub type NodeId = usize;

/// Topology or simulation error of the traffic network
#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    /// A node id was referenced which does not exist in the node map
    #[error("Unknown node id: {0}")]
    UnknownNode(NodeId),
    /// A link id was referenced which does not exist in the link map
    #[error("Unknown link id: {0}")]
    UnknownLink(LinkId),
    /// A zone node has both incoming and outgoing links
    #[error("Zone node {0} has both incoming and outgoing links")]
    AmbiguousZone(NodeId),
    /// A zone node must connect to exactly one link
    #[error("Zone node {0} must connect to exactly one link")]
    UnsupportedZoneDegree(NodeId),
    /// A series node must connect exactly one incoming to exactly one outgoing link
    #[error("Series node {0} must have exactly one incoming and one outgoing link")]
    BadSeriesDegree(NodeId),
    /// A diverge node must have exactly one incoming link and at least one outgoing link
    #[error("Diverge node {0} must have one incoming and at least one outgoing link")]
    BadDivergeDegree(NodeId),
    /// A diverge node has an outgoing link without a splitting proportion
    #[error("Diverge node {0} has no splitting proportion for link {1}")]
    MissingProportion(NodeId, LinkId),
    /// The splitting proportions of a diverge node do not sum to one
    #[error("Diverge node {0}: splitting proportions sum to {1}, expected 1")]
    BadProportions(NodeId, f64),
    /// Demand was assigned to a node which is not an origin
    #[error("Node {0} is not an origin")]
    NotAnOrigin(NodeId),
    /// A link is too short to hold a single cell
    #[error("Link {0} is too short to hold a single cell")]
    DegenerateLink(LinkId),
    /// The node/link graph is not connected
    #[error("The corridor topology is disconnected")]
    DisconnectedTopology,
    /// A corridor state vector does not match the number of corridor cells
    #[error("Corridor state has {actual} cells, expected {expected}")]
    CorridorDimension {
        /// Number of corridor cells of the network
        expected: usize,
        /// Length of the offered state vector
        actual: usize,
    },
    /// A parameter update does not provide one value per incident link
    #[error("Parameter update carries {actual} values for {expected} incident links")]
    ParameterDimension {
        /// Number of configured incident links
        expected: usize,
        /// Number of offered parameter values
        actual: usize,
    },
    /// The requested drone location does not exist on the corridor
    #[error("Invalid drone location: link {link}, cell {cell}")]
    InvalidDroneLocation {
        /// Link part of the location
        link: LinkId,
        /// Cell offset within the link
        cell: usize,
    },
}
