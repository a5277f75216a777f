//! In-process replica communication.
//!
//! [`LocalReplica`] connects replicas that run as threads of one process. Every
//! pair of replicas shares a dedicated channel, so messages from one source
//! arrive in the order they were sent, and all replicas share one barrier.
//!
//! ```
//! use cvproxy::replica::LocalReplica;
//! use std::thread;
//!
//! let mut group = LocalReplica::group(2);
//! let mut second = group.pop().unwrap();
//! let mut first = group.pop().unwrap();
//!
//! let handle = thread::spawn(move || {
//!     let mut buf = [0u8; 16];
//!     let n = second.recv(&mut buf, 0).unwrap();
//!     buf[..n].to_vec()
//! });
//! first.send(b"hills", 1).unwrap();
//! assert_eq!(handle.join().unwrap(), b"hills");
//! ```

use crate::error::{ProxyError, ProxyResult};
use log::debug;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};

/// One member of a group of replicas living in the same process.
#[derive(Debug)]
pub struct LocalReplica {
    index: usize,
    num: usize,
    // outgoing[d] delivers to replica d
    outgoing: Vec<Sender<Vec<u8>>>,
    // incoming[s] receives from replica s
    incoming: Vec<Receiver<Vec<u8>>>,
    barrier: Arc<Barrier>,
}

impl LocalReplica {
    /// Creates `num` connected replicas, ordered by index.
    ///
    /// # Panics
    ///
    /// Panics if `num` is zero.
    pub fn group(num: usize) -> Vec<LocalReplica> {
        assert!(num > 0, "a replica group needs at least one member");
        let barrier = Arc::new(Barrier::new(num));

        // senders[s][d] / receivers[d][s] carry messages from s to d
        let mut senders: Vec<Vec<Sender<Vec<u8>>>> = (0..num).map(|_| Vec::with_capacity(num)).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Vec<u8>>>>> =
            (0..num).map(|_| (0..num).map(|_| None).collect()).collect();
        for (s, row) in senders.iter_mut().enumerate() {
            for receiver_row in receivers.iter_mut() {
                let (tx, rx) = channel();
                row.push(tx);
                receiver_row[s] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(index, (outgoing, incoming))| LocalReplica {
                index,
                num,
                outgoing,
                incoming: incoming.into_iter().flatten().collect(),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }

    /// Index of this replica.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of replicas in the group.
    pub fn num(&self) -> usize {
        self.num
    }

    /// Blocks until every replica of the group reaches the barrier.
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Sends `msg` to replica `dest`; returns the number of bytes sent.
    pub fn send(&mut self, msg: &[u8], dest: usize) -> ProxyResult<usize> {
        let tx = self.outgoing.get(dest).ok_or_else(|| {
            ProxyError::Replica(format!(
                "destination replica {} out of range (group of {})",
                dest, self.num
            ))
        })?;
        tx.send(msg.to_vec()).map_err(|_| {
            ProxyError::Replica(format!("replica {} is no longer listening", dest))
        })?;
        debug!("Replica {} sent {} bytes to replica {}", self.index, msg.len(), dest);
        Ok(msg.len())
    }

    /// Blocks until a message from replica `src` arrives and copies it into
    /// `buf`; returns the number of bytes received.
    pub fn recv(&mut self, buf: &mut [u8], src: usize) -> ProxyResult<usize> {
        let rx = self.incoming.get(src).ok_or_else(|| {
            ProxyError::Replica(format!(
                "source replica {} out of range (group of {})",
                src, self.num
            ))
        })?;
        let msg = rx
            .recv()
            .map_err(|_| ProxyError::Replica(format!("replica {} hung up", src)))?;
        if msg.len() > buf.len() {
            return Err(ProxyError::Replica(format!(
                "message of {} bytes from replica {} exceeds buffer of {} bytes",
                msg.len(),
                src,
                buf.len()
            )));
        }
        buf[..msg.len()].copy_from_slice(&msg);
        debug!("Replica {} received {} bytes from replica {}", self.index, msg.len(), src);
        Ok(msg.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_group_indices() {
        let group = LocalReplica::group(3);
        let indices: Vec<usize> = group.iter().map(|r| r.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(group.iter().all(|r| r.num() == 3));
    }

    #[test]
    fn test_ring_exchange_with_barrier() {
        let group = LocalReplica::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|mut rep| {
                thread::spawn(move || {
                    let n = rep.num();
                    let next = (rep.index() + 1) % n;
                    let prev = (rep.index() + n - 1) % n;
                    rep.send(&[rep.index() as u8], next).unwrap();
                    rep.barrier();
                    let mut buf = [0u8; 4];
                    let len = rep.recv(&mut buf, prev).unwrap();
                    (len, buf[0], prev as u8)
                })
            })
            .collect();

        for h in handles {
            let (len, got, prev) = h.join().unwrap();
            assert_eq!(len, 1);
            assert_eq!(got, prev);
        }
    }

    #[test]
    fn test_invalid_destination() {
        let mut group = LocalReplica::group(1);
        let err = group[0].send(b"x", 4).unwrap_err();
        assert!(matches!(err, ProxyError::Replica(_)));
    }

    #[test]
    fn test_message_larger_than_buffer() {
        let mut group = LocalReplica::group(1);
        group[0].send(b"too long", 0).unwrap();
        let mut buf = [0u8; 3];
        assert!(group[0].recv(&mut buf, 0).is_err());
    }
}
