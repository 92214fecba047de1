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

//! Parsers for the tab-delimited nodes, links and demand files.

use super::{bracket_list, parse_num, InputError};
use crate::ctm::{LinkId, Network, Node, NodeId, NodeModel};
use crate::Error;

use itertools::Itertools;
use log::*;
use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;

/// Build a [`Network`] from the three corridor description files. Nodes are read before links
/// (links resolve their endpoint nodes), then the demand schedule is attached to the origin
/// zones. Any malformed row is fatal.
pub fn read_network(
    node_file: impl AsRef<Path>,
    link_file: impl AsRef<Path>,
    demand_file: impl AsRef<Path>,
    sim_time: f64,
    time_step: f64,
) -> Result<Network, Error> {
    let mut net = Network::new(sim_time, time_step);
    read_nodes(&mut net, node_file)?;
    read_links(&mut net, link_file)?;
    read_demand(&mut net, demand_file)?;
    Ok(net)
}

/// Read the node file. Each row is `id \t model \t fstar \t rstar`, where the stars are
/// bracketed comma lists of link ids (`fstar` entries of a diverge node are `linkId:proportion`
/// pairs). The zone subtype (origin or destination) is derived from which star is empty.
fn read_nodes(net: &mut Network, file: impl AsRef<Path>) -> Result<(), Error> {
    info!("reading node file {}", file.as_ref().display());
    let content = read_to_string(file.as_ref()).map_err(InputError::from)?;
    for (i, row) in content.lines().enumerate().skip(1) {
        let line = i + 1;
        if row.trim().is_empty() {
            continue;
        }
        let (id, model, fstar, rstar) = row
            .split('\t')
            .collect_tuple()
            .ok_or(InputError::MissingField { line, field: "id/model/fstar/rstar" })?;
        let id: NodeId = parse_num(id, line)?;
        let node = match model.trim() {
            "Zone" => {
                let fstar = parse_star(fstar, line)?;
                let rstar = parse_star(rstar, line)?;
                if fstar.is_empty() {
                    Node::new(id, fstar, rstar, NodeModel::Destination)
                } else {
                    Node::new(id, fstar, rstar, NodeModel::Origin { demand: HashMap::new() })
                }
            }
            "SeriesNode" => {
                Node::new(id, parse_star(fstar, line)?, parse_star(rstar, line)?, NodeModel::Series)
            }
            "DivergeNode" => {
                let mut proportions = HashMap::new();
                let mut out_links = Vec::new();
                for entry in bracket_list(fstar) {
                    let (link, prop) = entry
                        .split(':')
                        .collect_tuple()
                        .ok_or(InputError::MissingProportion { line, content: entry.to_string() })?;
                    let link: LinkId = parse_num(link, line)?;
                    out_links.push(link);
                    proportions.insert(link, parse_num(prop, line)?);
                }
                Node::new(id, out_links, parse_star(rstar, line)?, NodeModel::Diverge { proportions })
            }
            other => {
                return Err(
                    InputError::UnknownNodeModel { line, model: other.to_string() }.into()
                )
            }
        }?;
        net.add_node(node);
    }
    Ok(())
}

/// Read the link file. Each row is
/// `id \t type \t upNode \t downNode \t length \t ffs \t critDen \t jamDen`; the only
/// supported link type is `CTM`.
fn read_links(net: &mut Network, file: impl AsRef<Path>) -> Result<(), Error> {
    info!("reading link file {}", file.as_ref().display());
    let content = read_to_string(file.as_ref()).map_err(InputError::from)?;
    for (i, row) in content.lines().enumerate().skip(1) {
        let line = i + 1;
        if row.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = row.split('\t').collect();
        let (id, kind, up, down, length, ffs, crit_den, jam_den) = match fields.as_slice() {
            [id, kind, up, down, length, ffs, crit_den, jam_den] => {
                (*id, *kind, *up, *down, *length, *ffs, *crit_den, *jam_den)
            }
            _ => {
                return Err(InputError::MissingField {
                    line,
                    field: "id/type/up/down/length/ffs/critDen/jamDen",
                }
                .into())
            }
        };
        if kind.trim() != "CTM" {
            return Err(InputError::UnknownLinkType { line, kind: kind.to_string() }.into());
        }
        net.add_link(
            parse_num(id, line)?,
            parse_num(up, line)?,
            parse_num(down, line)?,
            parse_num(ffs, line)?,
            parse_num(crit_den, line)?,
            parse_num(jam_den, line)?,
            parse_num(length, line)?,
        )?;
    }
    Ok(())
}

/// Read the demand file. Each row is `time \t origins \t rates`, where origins and rates are
/// bracketed comma lists aligned positionally; rates are in veh/h. Timesteps absent from the
/// file default to zero demand.
fn read_demand(net: &mut Network, file: impl AsRef<Path>) -> Result<(), Error> {
    info!("reading demand file {}", file.as_ref().display());
    let content = read_to_string(file.as_ref()).map_err(InputError::from)?;
    for (i, row) in content.lines().enumerate().skip(1) {
        let line = i + 1;
        if row.trim().is_empty() {
            continue;
        }
        let (time, origins, rates) = row
            .split('\t')
            .collect_tuple()
            .ok_or(InputError::MissingField { line, field: "time/origins/rates" })?;
        let time: usize = parse_num(time, line)?;
        let origins = bracket_list(origins);
        let rates = bracket_list(rates);
        if origins.len() != rates.len() {
            return Err(InputError::MismatchedDemand { line }.into());
        }
        for (origin, rate) in origins.iter().zip(rates.iter()) {
            net.set_demand(parse_num(origin, line)?, time, parse_num(rate, line)?)?;
        }
    }
    Ok(())
}

/// Parse a star field as a bracketed list of link ids.
fn parse_star(field: &str, line: usize) -> Result<Vec<LinkId>, InputError> {
    bracket_list(field).into_iter().map(|entry| parse_num(entry, line)).collect()
}
