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

//! Test the input parsers on the reference test corridor.

use crate::ctm::NodeModel;
use crate::input::{read_measurements, read_network};
use crate::Error;

use assert_approx_eq::assert_approx_eq;
use std::fs::write;
use std::path::PathBuf;

fn test_file(name: &str) -> String {
    format!("{}/test_files/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("skylark_test_{}", name));
    write(&path, content).unwrap();
    path
}

#[test]
fn read_the_test_corridor() {
    let net = read_network(
        test_file("nodes.txt"),
        test_file("links.txt"),
        test_file("demand.txt"),
        600.0,
        10.0,
    )
    .unwrap();

    assert_eq!(net.link_order(), &[1, 2, 3, 4, 7, 9]);
    assert_eq!(net.get_link(1).unwrap().num_cells(), 4);
    assert_eq!(net.get_link(2).unwrap().num_cells(), 2);
    assert_eq!(net.get_link(9).unwrap().num_cells(), 2);
    assert_approx_eq!(net.get_link(2).unwrap().params().qcap, 100.0 * 80.0, 1e-9);

    // zone subtypes are derived from star emptiness
    assert!(net.get_node(1).unwrap().is_origin());
    assert!(net.get_node(6).unwrap().is_destination());
    assert!(net.get_node(7).unwrap().is_destination());

    // diverge proportions are read from the forward star
    match net.get_node(4).unwrap().model() {
        NodeModel::Diverge { proportions } => {
            assert_approx_eq!(proportions[&4], 0.8, 1e-12);
            assert_approx_eq!(proportions[&9], 0.2, 1e-12);
        }
        other => panic!("node 4 should be a diverge, got {:?}", other),
    }

    // demand is attached to the origin, missing timesteps default to zero
    assert_approx_eq!(net.get_node(1).unwrap().demand_rate(0), 1200.0, 1e-12);
    assert_approx_eq!(net.get_node(1).unwrap().demand_rate(5), 0.0, 1e-12);

    net.validate().unwrap();
}

#[test]
fn corridor_index_of_the_test_corridor() {
    let mut net = read_network(
        test_file("nodes.txt"),
        test_file("links.txt"),
        test_file("demand.txt"),
        600.0,
        10.0,
    )
    .unwrap();
    net.set_ramp_links(vec![9]);
    let index = net.corridor_index();

    // 4 + 2 + 2 + 2 + 4 cells, ramp link 9 excluded
    assert_eq!(index.num_cells(), 14);
    assert_eq!(index.cell((1, 0)), Some(0));
    assert_eq!(index.cell((2, 0)), Some(4));
    assert_eq!(index.cell((7, 0)), Some(10));
    assert_eq!(index.cell((9, 0)), None);

    // the bijection round-trips over all corridor cells
    for cell in 0..index.num_cells() {
        let location = index.location(cell).unwrap();
        assert_eq!(index.cell(location), Some(cell));
    }
    // a cell maps to its midpoint, and a position maps back to its cell
    let cell_length = 100.0 * 10.0 / 3600.0;
    for cell in 0..index.num_cells() {
        let position = index.position_km(cell).unwrap();
        assert_eq!(index.cell_at_km(position), Some(cell));
        assert!((position - cell_length * (cell as f64 + 0.5)).abs() < 1e-9);
    }
}

#[test]
fn read_the_measurement_export() {
    let data = read_measurements(test_file("measurements.att"), &[9], &[2, 7]).unwrap();

    // rows of other simulation runs, on the ramp or off the sampling grid are dropped
    assert_eq!(data.density(0).unwrap(), &[15.5, 0.0, 30.0]);
    assert_eq!(data.density(1).unwrap(), &[16.0]);
    assert!(data.density(2).is_none());

    // speed at the incident cells; a zero density reports the free-flow surrogate
    assert_eq!(data.speed(0).unwrap(), &[100.0, 64.0]);
}

#[test]
fn unknown_node_model_is_fatal() {
    let nodes = temp_file("bad_nodes.txt", "id\tmodel\tfstar\trstar\n1\tMergeNode\t[1]\t[]\n");
    let links = temp_file("bad_nodes_links.txt", "id\n");
    let demand = temp_file("bad_nodes_demand.txt", "time\n");
    match read_network(&nodes, &links, &demand, 600.0, 10.0) {
        Err(Error::InputError(_)) => {}
        other => panic!("expected an input error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unknown_link_type_is_fatal() {
    let nodes = temp_file(
        "bad_link_nodes.txt",
        "id\tmodel\tfstar\trstar\n1\tZone\t[1]\t[]\n2\tZone\t[]\t[1]\n",
    );
    let links = temp_file(
        "bad_link_links.txt",
        "id\ttype\tup\tdown\tlength\tffs\tcritDen\tjamDen\n1\tPQ\t1\t2\t1.0\t100\t80\t300\n",
    );
    let demand = temp_file("bad_link_demand.txt", "time\torigins\trates\n");
    match read_network(&nodes, &links, &demand, 600.0, 10.0) {
        Err(Error::InputError(_)) => {}
        other => panic!("expected an input error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn mismatched_demand_lists_are_fatal() {
    let nodes = temp_file(
        "bad_demand_nodes.txt",
        "id\tmodel\tfstar\trstar\n1\tZone\t[1]\t[]\n2\tZone\t[]\t[1]\n",
    );
    let links = temp_file(
        "bad_demand_links.txt",
        "id\ttype\tup\tdown\tlength\tffs\tcritDen\tjamDen\n1\tCTM\t1\t2\t1.0\t100\t80\t300\n",
    );
    let demand =
        temp_file("bad_demand_demand.txt", "time\torigins\trates\n0\t[1]\t[1200,600]\n");
    match read_network(&nodes, &links, &demand, 600.0, 10.0) {
        Err(Error::InputError(_)) => {}
        other => panic!("expected an input error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn malformed_measurement_rows_are_skipped() {
    let file = temp_file(
        "bad_measurements.att",
        "header\n1.0;0-10;1-120-270;15.5;55;88.2\n1.0;garbage\n1.0;10-20;2-120\n",
    );
    let data = read_measurements(&file, &[9], &[2, 7]).unwrap();
    assert_eq!(data.density(0).unwrap(), &[15.5]);
}
