use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use crate::cell_array::{CellArray, WireCellArray};
use crate::error::{Error, Result};
use crate::field::Field;
use crate::mesh::Mesh;
use crate::message::comm::Communicator;
use crate::subset::LevelSet;




/**
 * The cells exchanged with one neighbour at one level: the values of
 * `outgoing` are sent, and the values of `incoming` are received. Both sets
 * are visited in `apply` order on both ranks, which is what makes the
 * payloads line up.
 */
pub(crate) struct Interface<const DIM: usize> {
    pub rank: usize,
    pub outgoing: LevelSet<DIM>,
    pub incoming: LevelSet<DIM>,
}




// ============================================================================
pub(crate) fn encode_values<T: Serialize>(values: &[T]) -> Result<Vec<u8>> {
    rmp_serde::to_vec(values).map_err(|e| Error::Encode(e.to_string()))
}

pub(crate) fn decode_values<T: DeserializeOwned>(rank: usize, bytes: &[u8]) -> Result<Vec<T>> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::Decode { rank, reason: e.to_string() })
}

pub(crate) fn encode_snapshot<const DIM: usize>(cells: &CellArray<DIM>) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&cells.to_wire(), &mut bytes).map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode_snapshot<const DIM: usize>(rank: usize, bytes: &[u8]) -> Result<CellArray<DIM>> {
    let wire: WireCellArray = ciborium::de::from_reader(bytes)
        .map_err(|e| Error::Decode { rank, reason: e.to_string() })?;
    Ok(CellArray::from_wire(wire))
}




/**
 * Send a cell array to every rank in `ranks` and receive theirs, returned in
 * the same order. All sends are posted before the first receive.
 */
pub fn exchange_snapshots<C, const DIM: usize>(comm: &C, ranks: &[usize], cells: &CellArray<DIM>) -> Result<Vec<CellArray<DIM>>>
where
    C: Communicator
{
    if ranks.is_empty() {
        return Ok(Vec::new())
    }
    let bytes = encode_snapshot(cells)?;

    for &rank in ranks {
        comm.send(rank, bytes.clone())?
    }
    ranks.iter().map(|&rank| decode_snapshot(rank, &comm.recv(rank)?)).collect()
}




/**
 * Exchange the values of a field across a list of interfaces at one level.
 * One message is sent to each neighbour, and every send is posted before
 * the first receive. Received values are combined into the local ones with
 * `merge`. A payload whose length disagrees with the incoming set is an
 * error.
 */
pub(crate) fn exchange_field<T, C, M, const DIM: usize>(
    comm: &C,
    mesh: &Mesh<DIM>,
    level: usize,
    field: &mut Field<T, DIM>,
    interfaces: &[Interface<DIM>],
    merge: M) -> Result<()>
where
    T: Copy + Default + Serialize + DeserializeOwned,
    C: Communicator,
    M: Fn(&mut T, T),
{
    for interface in interfaces {
        let mut buffer = Vec::with_capacity(interface.outgoing.num_cells() * field.n_comp());
        interface.outgoing.apply(|range, key| buffer.extend_from_slice(field.interval(mesh, level, range, key)));
        debug!("level {}: sending {} values of '{}' to rank {}", level, buffer.len(), field.name(), interface.rank);
        comm.send(interface.rank, encode_values(&buffer)?)?;
    }

    for interface in interfaces {
        let values: Vec<T> = decode_values(interface.rank, &comm.recv(interface.rank)?)?;
        let expected = interface.incoming.num_cells() * field.n_comp();

        if values.len() != expected {
            return Err(Error::PayloadSize {
                rank: interface.rank,
                level,
                expected,
                received: values.len(),
            })
        }
        let mut values = values.into_iter();

        field.apply(mesh, &interface.incoming, |_, _, slice| {
            for (x, v) in slice.iter_mut().zip(&mut values) {
                merge(x, v)
            }
        });
    }
    Ok(())
}




/**
 * The interfaces over which a field's values flow at one level: each rank
 * sends the cells it owns and both ranks store, and receives the cells the
 * neighbour owns and both store.
 */
pub(crate) fn field_interfaces<const DIM: usize>(mesh: &Mesh<DIM>, level: usize) -> Vec<Interface<DIM>> {
    let reference = mesh.level_set(crate::mesh::MeshRole::Reference, level);

    mesh.neighbourhood()
        .iter()
        .filter(|n| !reference.is_empty() && !n.reference()[level].is_empty())
        .map(|n| {
            let shared = reference.intersection(&n.reference()[level]);
            Interface {
                rank: n.rank(),
                outgoing: shared.intersection(mesh.subdomain(level)),
                incoming: shared.intersection(n.subdomain(level)),
            }
        })
        .collect()
}




/**
 * The interfaces over which tags flow at one level: every cell both ranks
 * store, in both directions.
 */
pub(crate) fn tag_interfaces<const DIM: usize>(mesh: &Mesh<DIM>, level: usize) -> Vec<Interface<DIM>> {
    let reference = mesh.level_set(crate::mesh::MeshRole::Reference, level);

    mesh.neighbourhood()
        .iter()
        .filter(|n| !reference.is_empty() && !n.reference()[level].is_empty())
        .map(|n| {
            let shared = reference.intersection(&n.reference()[level]);
            Interface { rank: n.rank(), outgoing: shared.clone(), incoming: shared }
        })
        .collect()
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::thread;
    use crate::cell_array::CellList;
    use crate::config::Config;
    use crate::domain::Domain;
    use crate::error::Error;
    use crate::field::Field;
    use crate::index_space::IndexBox;
    use crate::mesh::Mesh;
    use crate::message::comm::Communicator;
    use crate::message::thread::ThreadCommunicator;
    use crate::subset::LevelSet;
    use super::*;

    /**
     * Two ranks splitting [0, 16) at level 3 into halves, uniform at level 2.
     */
    fn half_mesh(comm: &ThreadCommunicator) -> Mesh<1> {
        let config = Config::with_levels(2, 3);
        let domain = Domain::bounded(3, IndexBox::new([0], [16]));
        let halves = [LevelSet::from_box(3, &IndexBox::new([0], [8])), LevelSet::from_box(3, &IndexBox::new([8], [16]))];
        let rank = comm.rank();
        let other = 1 - rank;
        let mut cells = CellList::new(3);
        cells.add_set(&halves[rank].on(2));
        Mesh::distributed(config, domain, halves[rank].clone(), cells, vec![(other, halves[other].clone())], comm).unwrap()
    }

    #[test]
    fn snapshots_round_trip_between_ranks() {
        let handles: Vec<_> = ThreadCommunicator::world(2)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let mesh = half_mesh(&comm);
                let n = &mesh.neighbourhood()[0];
                (n.cells().nb_cells(), n.reference().level_set(2).num_cells())
            }))
            .collect();

        for handle in handles {
            let (leaves, reference) = handle.join().unwrap();
            assert_eq!(leaves, 4);
            assert_eq!(reference, 6);
        }
    }

    #[test]
    fn field_exchange_fills_neighbour_cells() {
        let handles: Vec<_> = ThreadCommunicator::world(2)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let mesh = half_mesh(&comm);
                let rank = comm.rank() as f64;
                let mut field = Field::from_fn("u", 1, &mesh, |_, _, u: &mut [f64]| u[0] = rank);
                let interfaces = field_interfaces(&mesh, 2);
                exchange_field(&comm, &mesh, 2, &mut field, &interfaces, |x, v| *x = v).unwrap();
                let left = field.get(&mesh, 2, [3])[0];
                let right = field.get(&mesh, 2, [4])[0];
                (left, right)
            }))
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (0.0, 1.0));
        }
    }

    #[test]
    fn short_payload_is_an_error() {
        let handles: Vec<_> = ThreadCommunicator::world(2)
            .into_iter()
            .map(|comm| thread::spawn(move || {
                let mesh = half_mesh(&comm);
                let mut field: Field<f64, 1> = Field::new("u", 1, &mesh);
                let mut interfaces = field_interfaces(&mesh, 2);

                if comm.rank() == 0 {
                    interfaces[0].outgoing = LevelSet::new(2);
                }
                exchange_field(&comm, &mesh, 2, &mut field, &interfaces, |x, v| *x = v)
            }))
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(Error::PayloadSize { rank: 0, level: 2, expected: 2, received: 0 }));
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        assert!(matches!(decode_values::<f64>(3, &[0xc1]), Err(Error::Decode { rank: 3, .. })));
    }
}
