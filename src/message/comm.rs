use crate::error::{Error, Result};
use super::util;

/// A fixed group of ranks that exchange byte messages. The transport behind
/// it may be TCP sockets, in-process channels, or a library such as MPI.
/// Messages between an ordered pair of ranks arrive in the order they were
/// sent; there is no ordering across pairs.
///
pub trait Communicator {
    /// The rank of this process, in `0..size()`.
    fn rank(&self) -> usize;

    /// The number of ranks in the group, including this one.
    fn size(&self) -> usize;

    /// Queue a message for a peer. Returns without waiting for the peer to
    /// post a matching receive. The buffer is moved into the transport, so
    /// the caller cannot touch it again before delivery.
    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()>;

    /// Take the next message from the given peer, blocking until one arrives.
    fn recv(&self, rank: usize) -> Result<Vec<u8>>;

    /// Spread the root's value (rank 0) to every rank along a binomial tree.
    /// The value must be `Some` on the root and is ignored elsewhere.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let r = self.rank();
        let p = self.size();
        let mut value = value.unwrap_or_default();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;

            if r < one {
                if r + one < p {
                    self.send(r + one, value.clone())?
                }
            } else if r < 2 * one {
                value = self.recv(r - one)?
            }
        }
        Ok(value)
    }

    /// Fold `value` over all ranks along a binomial tree rooted at rank 0.
    /// Only the root gets `Some`.
    ///
    fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Result<Option<Vec<u8>>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one)?)
                }
            } else {
                self.send(r - one, value)?;
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    /// Fold `value` over all ranks with a commutative operator, so that every
    /// rank ends up with the same result.
    ///
    fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Result<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let reduced = self.reduce(f, value)?;
        self.broadcast(reduced)
    }

    /// Logical AND of a flag over all ranks.
    ///
    fn all_reduce_and(&self, value: bool) -> Result<bool> {
        let bytes = self.all_reduce(|a, b| vec![a[0] & b[0]], vec![value as u8])?;
        Ok(bytes.first().map_or(value, |&b| b != 0))
    }

    /// Logical OR of a flag over all ranks.
    ///
    fn all_reduce_or(&self, value: bool) -> Result<bool> {
        let bytes = self.all_reduce(|a, b| vec![a[0] | b[0]], vec![value as u8])?;
        Ok(bytes.first().map_or(value, |&b| b != 0))
    }

    /// Maximum of an integer over all ranks.
    ///
    fn all_reduce_max(&self, value: u64) -> Result<u64> {
        let bytes = self.all_reduce(|a, b| fold_u64(a, b, u64::max), value.to_le_bytes().to_vec())?;
        decode_u64(&bytes)
    }

    /// Minimum of an integer over all ranks.
    ///
    fn all_reduce_min(&self, value: u64) -> Result<u64> {
        let bytes = self.all_reduce(|a, b| fold_u64(a, b, u64::min), value.to_le_bytes().to_vec())?;
        decode_u64(&bytes)
    }
}

fn fold_u64(a: Vec<u8>, b: Vec<u8>, f: fn(u64, u64) -> u64) -> Vec<u8> {
    match (decode_u64(&a), decode_u64(&b)) {
        (Ok(x), Ok(y)) => f(x, y).to_le_bytes().to_vec(),
        _ => a,
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let mut buffer = [0; 8];

    if bytes.len() != buffer.len() {
        return Err(Error::Transport(format!("expected an 8-byte integer, got {} bytes", bytes.len())))
    }
    buffer.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buffer))
}

/// A communicator for a single process: rank 0 of 1. Collectives are
/// trivially local; point-to-point messages have no destination.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, rank: usize, _message: Vec<u8>) -> Result<()> {
        Err(Error::Transport(format!("serial communicator cannot send to rank {}", rank)))
    }

    fn recv(&self, rank: usize) -> Result<Vec<u8>> {
        Err(Error::Transport(format!("serial communicator cannot receive from rank {}", rank)))
    }
}
