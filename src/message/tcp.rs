use std::{collections::HashMap, io, thread};
use std::sync::{Arc, Mutex};
use std::{io::prelude::*, thread::JoinHandle};
use std::{
    net::{SocketAddr, TcpListener, TcpStream},
    time::Duration,
};

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, error, info};

use crate::error::{Error, Result};
use super::{backoff::{retry, ExponentialBackoff}, comm::Communicator, util};

const RETRY_WAIT: Duration = Duration::from_millis(10);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(2000);
const CONNECT_ATTEMPTS: usize = 40;
const SEND_ATTEMPTS: usize = 3;

/// A communicator with one process per rank, exchanging length-prefixed
/// frames over TCP. Every frame carries the rank of its sender, so that
/// receives can be matched to a specific peer. The receiving side
/// acknowledges each frame with its byte count.
///
/// Outgoing messages are handed to a background sender thread, which opens
/// connections lazily (retrying with exponential backoff while the peer is
/// not yet listening). Incoming frames are sorted by a listener thread into
/// one queue per source rank.
///
/// A message which cannot be delivered after a few attempts stops the sender
/// thread. From then on every `send` and `recv` fails with the reason.
///
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    send_sink: Option<Sender<(usize, Vec<u8>)>>,
    inbound: Vec<Receiver<Vec<u8>>>,
    send_thread: Option<JoinHandle<()>>,
    failure: Arc<Mutex<Option<String>>>,
    sender_done: Receiver<()>,
}

impl TcpCommunicator {
    /// Bind the address of this rank in the peer list and start the
    /// transport threads.
    ///
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> Result<Self> {
        let addr = *peers
            .get(rank)
            .ok_or_else(|| Error::Transport(format!("no address for rank {}", rank)))?;
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::Transport(format!("could not bind {}: {}", addr, e)))?;
        Ok(Self::with_listener(rank, listener, peers))
    }

    /// Start the transport threads on a listener which is already bound.
    /// This allows binding to port zero and distributing the resulting
    /// addresses before any rank connects.
    ///
    pub fn with_listener(rank: usize, listener: TcpListener, peers: Vec<SocketAddr>) -> Self {
        let num_peers = peers.len();
        let (sinks, inbound): (Vec<_>, Vec<_>) = (0..num_peers).map(|_| crossbeam_channel::unbounded()).unzip();
        let (send_sink, send_src) = crossbeam_channel::unbounded();
        let (done_sink, sender_done) = crossbeam_channel::bounded(0);
        let failure = Arc::new(Mutex::new(None));

        start_listener(listener, sinks);
        let send_thread = start_serial_sender(rank, peers, send_src, failure.clone(), done_sink);

        Self {
            rank,
            num_peers,
            send_sink: Some(send_sink),
            inbound,
            send_thread: Some(send_thread),
            failure,
            sender_done,
        }
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|reason| reason.clone())
    }

    fn sender_error(&self) -> Error {
        Error::Transport(self.failure().unwrap_or_else(|| "sender thread has exited".into()))
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<()> {
        if rank >= self.num_peers {
            return Err(Error::Transport(format!("no rank {} in a group of {}", rank, self.num_peers)))
        }
        if let Some(reason) = self.failure() {
            return Err(Error::Transport(reason))
        }
        self.send_sink
            .as_ref()
            .ok_or_else(|| Error::Transport("communicator is shut down".into()))?
            .send((rank, message))
            .map_err(|_| self.sender_error())
    }

    fn recv(&self, rank: usize) -> Result<Vec<u8>> {
        let inbound = self.inbound
            .get(rank)
            .ok_or_else(|| Error::Transport(format!("no rank {} in a group of {}", rank, self.num_peers)))?;

        if let Some(reason) = self.failure() {
            return Err(Error::Transport(reason))
        }
        select! {
            recv(inbound) -> message => message.map_err(|_| Error::Transport("listener thread has exited".into())),
            recv(self.sender_done) -> _ => Err(self.sender_error()),
        }
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        self.send_sink.take();

        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                error!("sender thread panicked");
            }
        }
    }
}

/// Deliver queued messages in order. The thread stops at the first message
/// it cannot deliver, recording the reason in `failure`; dropping `done`
/// wakes any rank blocked in `recv`.
///
fn start_serial_sender(
    rank: usize,
    peers: Vec<SocketAddr>,
    send_src: Receiver<(usize, Vec<u8>)>,
    failure: Arc<Mutex<Option<String>>>,
    done: Sender<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let _done = done;
        let mut table: HashMap<usize, TcpStream> = HashMap::new();

        for (dst, message) in send_src {
            let sent = (0..SEND_ATTEMPTS).any(|attempt| {
                if !table.contains_key(&dst) {
                    match connect_with_retry(peers[dst]) {
                        Ok(stream) => {
                            table.insert(dst, stream);
                        }
                        Err(e) => {
                            error!("could not connect to rank {} at {}: {}", dst, peers[dst], e);
                            return false
                        }
                    }
                }
                let result = table
                    .get_mut(&dst)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no stream"))
                    .and_then(|stream| write_frame(stream, rank, &message));

                match result {
                    Ok(()) => true,
                    Err(e) => {
                        error!("failed to send message to rank {} (attempt {}): {}", dst, attempt + 1, e);
                        table.remove(&dst);
                        false
                    }
                }
            });
            if !sent {
                let reason = format!("could not deliver {} bytes to rank {}", message.len(), dst);
                error!("{}", reason);

                if let Ok(mut slot) = failure.lock() {
                    *slot = Some(reason);
                }
                break
            }
        }
    })
}

fn write_frame(stream: &mut TcpStream, rank: usize, message: &[u8]) -> io::Result<()> {
    stream.write_all(&rank.to_le_bytes())?;
    stream.write_all(&message.len().to_le_bytes())?;
    stream.write_all(message)?;

    let ack = util::read_usize(stream)?;

    if ack != message.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("sent {} bytes but receiver acknowledged {}", message.len(), ack)))
    }
    Ok(())
}

fn start_listener(listener: TcpListener, sinks: Vec<Sender<Vec<u8>>>) -> JoinHandle<()> {
    thread::spawn(move || {
        if let Ok(addr) = listener.local_addr() {
            info!("listening on {}", addr);
        }
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    handle_connection(stream, sinks.clone());
                }
                Err(e) => error!("failed to accept connection: {}", e),
            }
        }
    })
}

fn handle_connection(mut stream: TcpStream, sinks: Vec<Sender<Vec<u8>>>) -> JoinHandle<()> {
    let remote = stream.peer_addr().ok();
    debug!("receiving connection from {:?}", remote);

    thread::spawn(move || loop {
        let result = read_frame(&mut stream).and_then(|(src, bytes)| {
            let num_bytes = bytes.len();
            sinks
                .get(src)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("frame from unknown rank {}", src)))?
                .send(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            stream.write_all(&num_bytes.to_le_bytes())
        });

        match result {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("connection from {:?} closed", remote);
                break
            }
            Err(e) => {
                error!("connection from {:?} failed: {}", remote, e);
                break
            }
        }
    })
}

fn read_frame(stream: &mut TcpStream) -> io::Result<(usize, Vec<u8>)> {
    let src = util::read_usize(stream)?;
    let size = util::read_usize(stream)?;
    let bytes = util::read_bytes_vec(stream, size)?;
    Ok((src, bytes))
}

fn connect_with_retry(addr: SocketAddr) -> io::Result<TcpStream> {
    let delays = ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2).take(CONNECT_ATTEMPTS);
    let wait = |e: &io::Error, delay| {
        debug!("connect to {} failed ({}), retrying in {:?}", addr, e, delay);
        thread::sleep(delay)
    };
    retry(delays, || TcpStream::connect(addr), wait)
        .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::TimedOut, "no connection attempts were made")))
}
