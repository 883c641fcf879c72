use crossbeam_channel::{Receiver, Sender};
use crate::error::{Error, Result};
use super::comm::Communicator;

/// A communicator for ranks which live on threads of a single process. Each
/// ordered pair of ranks has its own unbounded channel, so messages between
/// two ranks are received in the order they were sent and a receive from one
/// peer never consumes a message from another.
///
pub struct ThreadCommunicator {
    rank: usize,
    outbound: Vec<Sender<Vec<u8>>>,
    inbound: Vec<Receiver<Vec<u8>>>,
}

impl ThreadCommunicator {
    /// Create a group of `size` communicators, one per rank. Move each one
    /// onto the thread that plays its rank.
    ///
    pub fn world(size: usize) -> Vec<ThreadCommunicator> {
        let channels: Vec<Vec<_>> = (0..size)
            .map(|_| (0..size).map(|_| crossbeam_channel::unbounded()).collect())
            .collect();

        (0..size)
            .map(|rank| ThreadCommunicator {
                rank,
                outbound: (0..size).map(|dst| channels[rank][dst].0.clone()).collect(),
                inbound: (0..size).map(|src| channels[src][rank].1.clone()).collect(),
            })
            .collect()
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbound.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        self.outbound
            .get(rank)
            .ok_or_else(|| Error::Transport(format!("no rank {} in a group of {}", rank, self.size())))?
            .send(message)
            .map_err(|_| Error::Transport(format!("rank {} has hung up", rank)))
    }

    fn recv(&self, rank: usize) -> Result<Vec<u8>> {
        self.inbound
            .get(rank)
            .ok_or_else(|| Error::Transport(format!("no rank {} in a group of {}", rank, self.size())))?
            .recv()
            .map_err(|_| Error::Transport(format!("rank {} has hung up", rank)))
    }
}

#[cfg(test)]
mod test {

    use std::thread;
    use super::ThreadCommunicator;
    use crate::message::comm::Communicator;

    fn run<F, T>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(ThreadCommunicator) -> T + Send + Sync + Copy + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = ThreadCommunicator::world(size)
            .into_iter()
            .map(|comm| thread::spawn(move || f(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn messages_between_a_pair_arrive_in_order() {
        let received = run(3, |comm| {
            if comm.rank() != 0 {
                for i in 0..10u8 {
                    comm.send(0, vec![comm.rank() as u8, i]).unwrap();
                }
                Vec::new()
            } else {
                let mut seen = Vec::new();
                for src in [2, 1] {
                    for _ in 0..10 {
                        seen.push(comm.recv(src).unwrap());
                    }
                }
                seen
            }
        });
        let expected: Vec<_> = [2u8, 1].iter().flat_map(|&src| (0..10u8).map(move |i| vec![src, i])).collect();
        assert_eq!(received[0], expected);
    }

    #[test]
    fn ring_exchange_works() {
        let received = run(4, |comm| {
            let r = comm.rank();
            let p = comm.size();
            comm.send((r + 1) % p, vec![r as u8]).unwrap();
            comm.recv((r + p - 1) % p).unwrap()[0] as usize
        });
        assert_eq!(received, vec![3, 0, 1, 2]);
    }

    #[test]
    fn collectives_work_for_any_group_size() {
        for size in 1..=7 {
            let results = run(size, |comm| {
                let r = comm.rank() as u64;
                let max = comm.all_reduce_max(r * 3).unwrap();
                let min = comm.all_reduce_min(r + 10).unwrap();
                let any = comm.all_reduce_or(r == 2).unwrap();
                let all = comm.all_reduce_and(r < 100).unwrap();
                let root = if comm.rank() == 0 { Some(vec![42]) } else { None };
                let value = comm.broadcast(root).unwrap();
                (max, min, any, all, value)
            });
            for (max, min, any, all, value) in results {
                assert_eq!(max, 3 * (size as u64 - 1));
                assert_eq!(min, 10);
                assert_eq!(any, size > 2);
                assert!(all);
                assert_eq!(value, vec![42]);
            }
        }
    }
}
