//! Collective operations built on the point-to-point [`Communicator`].
//!
//! Every message is a *frame*: a 9-byte header `[status, len (u64 LE)]` sent
//! on the stream's base tag, followed by `len` payload bytes on its payload
//! tag. A status of `1` carries a UTF-8 failure message instead of data, so a
//! rank that failed locally still takes part in the exchange and its peers
//! learn about the failure instead of blocking.
//!
//! All ranks must call the same collectives in the same order.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::mesh_error::{CommError, MeshAdaptError};

const HEADER_LEN: usize = 9;
const STATUS_OK: u8 = 0;
const STATUS_FAILED: u8 = 1;

/// Local contribution to a collective: a payload, or a failure message.
pub type Contribution = Result<Vec<u8>, String>;

fn check_peer<C: Communicator>(comm: &C, peer: usize) -> Result<(), CommError> {
    if peer >= comm.size() {
        return Err(CommError::PeerOutOfRange {
            peer,
            size: comm.size(),
        });
    }
    Ok(())
}

fn send_frame<C: Communicator>(comm: &C, peer: usize, tag: CommTag, item: &Contribution) {
    let (status, body) = match item {
        Ok(bytes) => (STATUS_OK, bytes.as_slice()),
        Err(msg) => (STATUS_FAILED, msg.as_bytes()),
    };
    let mut header = [0u8; HEADER_LEN];
    header[0] = status;
    header[1..].copy_from_slice(&(body.len() as u64).to_le_bytes());
    comm.isend(peer, tag.base(), &header).wait();
    comm.isend(peer, tag.payload(), body).wait();
}

fn recv_frame<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
) -> Result<Contribution, CommError> {
    let mut header = [0u8; HEADER_LEN];
    let raw = comm
        .irecv(peer, tag.base(), &mut header)
        .wait()
        .ok_or(CommError::NoMessage(peer))?;
    if raw.len() != HEADER_LEN {
        return Err(CommError::Truncated {
            peer,
            expected: HEADER_LEN,
            found: raw.len(),
        });
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&raw[1..]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    let mut body = vec![0u8; len];
    let data = comm
        .irecv(peer, tag.payload(), &mut body)
        .wait()
        .ok_or(CommError::NoMessage(peer))?;
    if data.len() != len {
        return Err(CommError::Truncated {
            peer,
            expected: len,
            found: data.len(),
        });
    }
    match raw[0] {
        STATUS_OK => Ok(Ok(data)),
        _ => Ok(Err(String::from_utf8_lossy(&data).into_owned())),
    }
}

/// Broadcast `local` from `root` to every rank.
///
/// `local` is ignored on non-root ranks. A failure contributed by the root is
/// returned on every rank as [`CommError::RemoteFailure`].
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    local: Contribution,
) -> Result<Vec<u8>, MeshAdaptError> {
    check_peer(comm, root)?;
    let item = if comm.rank() == root {
        for peer in (0..comm.size()).filter(|&p| p != root) {
            send_frame(comm, peer, CommTag::BROADCAST, &local);
        }
        local
    } else {
        recv_frame(comm, root, CommTag::BROADCAST)?
    };
    item.map_err(|message| CommError::RemoteFailure { rank: root, message }.into())
}

/// Gather every rank's contribution on `root`, indexed by rank.
///
/// Returns `None` on non-root ranks.
pub fn gather_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    local: Contribution,
) -> Result<Option<Vec<Contribution>>, MeshAdaptError> {
    check_peer(comm, root)?;
    if comm.rank() != root {
        send_frame(comm, root, CommTag::GATHER, &local);
        return Ok(None);
    }
    let mut out = Vec::with_capacity(comm.size());
    for peer in 0..comm.size() {
        if peer == root {
            out.push(local.clone());
        } else {
            out.push(recv_frame(comm, peer, CommTag::GATHER)?);
        }
    }
    Ok(Some(out))
}

fn pack(parts: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = parts.iter().map(|p| 8 + p.len()).sum();
    let mut out = Vec::with_capacity(8 + total);
    out.extend_from_slice(&(parts.len() as u64).to_le_bytes());
    for p in parts {
        out.extend_from_slice(&(p.len() as u64).to_le_bytes());
        out.extend_from_slice(p);
    }
    out
}

fn read_u64(buf: &[u8], at: &mut usize) -> Result<u64, MeshAdaptError> {
    let end = *at + 8;
    let bytes = buf
        .get(*at..end)
        .ok_or_else(|| MeshAdaptError::Wire("packed list truncated".into()))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    *at = end;
    Ok(u64::from_le_bytes(raw))
}

fn unpack(buf: &[u8]) -> Result<Vec<Vec<u8>>, MeshAdaptError> {
    let mut at = 0;
    let n = read_u64(buf, &mut at)? as usize;
    let mut out = Vec::with_capacity(n.min(buf.len()));
    for _ in 0..n {
        let len = read_u64(buf, &mut at)? as usize;
        let part = buf
            .get(at..at + len)
            .ok_or_else(|| MeshAdaptError::Wire("packed list truncated".into()))?;
        out.push(part.to_vec());
        at += len;
    }
    Ok(out)
}

/// Every rank receives every rank's contribution, indexed by rank.
///
/// Implemented as a gather on rank 0 followed by a broadcast. If any rank
/// contributed a failure, every rank returns that failure.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    local: Contribution,
) -> Result<Vec<Vec<u8>>, MeshAdaptError> {
    let gathered = gather_bytes(comm, 0, local)?;
    let packed = match gathered {
        Some(items) => {
            let mut parts = Vec::with_capacity(items.len());
            let mut failure = None;
            for (rank, item) in items.into_iter().enumerate() {
                match item {
                    Ok(bytes) => parts.push(bytes),
                    Err(msg) => {
                        failure.get_or_insert(format!("rank {rank}: {msg}"));
                    }
                }
            }
            match failure {
                Some(msg) => Err(msg),
                None => Ok(pack(&parts)),
            }
        }
        None => Ok(Vec::new()),
    };
    let packed = broadcast_bytes(comm, 0, packed)?;
    unpack(&packed)
}

/// Maximum of one byte over all ranks; used to agree on phase status.
pub fn all_reduce_max_u8<C: Communicator>(comm: &C, value: u8) -> Result<u8, MeshAdaptError> {
    let all = all_gather_bytes(comm, Ok(vec![value]))?;
    all.iter()
        .map(|v| {
            v.first()
                .copied()
                .ok_or_else(|| MeshAdaptError::Wire("empty reduction contribution".into()))
        })
        .try_fold(0u8, |acc, v| Ok(acc.max(v?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};
    use std::thread;

    fn on_world<T, F>(n: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(LocalComm) -> T + Send + Sync + Clone + 'static,
    {
        let handles: Vec<_> = LocalComm::world(n)
            .into_iter()
            .map(|c| {
                let f = f.clone();
                thread::spawn(move || f(c))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn single_rank_collectives_send_nothing() {
        assert_eq!(broadcast_bytes(&NoComm, 0, Ok(vec![3])).unwrap(), vec![3]);
        assert_eq!(
            all_gather_bytes(&NoComm, Ok(vec![1, 2])).unwrap(),
            vec![vec![1, 2]]
        );
        assert_eq!(all_reduce_max_u8(&NoComm, 2).unwrap(), 2);
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let out = on_world(3, |c| {
            let local = if c.rank() == 1 { Ok(b"mesh".to_vec()) } else { Ok(vec![]) };
            broadcast_bytes(&c, 1, local).unwrap()
        });
        assert!(out.iter().all(|b| b == b"mesh"));
    }

    #[test]
    fn root_failure_is_seen_everywhere() {
        let out = on_world(3, |c| {
            let local = if c.rank() == 0 { Err("load failed".into()) } else { Ok(vec![]) };
            broadcast_bytes(&c, 0, local)
        });
        for r in out {
            match r {
                Err(MeshAdaptError::Comm(CommError::RemoteFailure { rank: 0, message })) => {
                    assert_eq!(message, "load failed")
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn reduce_max_agrees() {
        let out = on_world(4, |c| all_reduce_max_u8(&c, c.rank() as u8 % 3).unwrap());
        assert_eq!(out, vec![2; 4]);
    }

    #[test]
    fn gather_orders_by_rank() {
        let out = on_world(3, |c| gather_bytes(&c, 2, Ok(vec![c.rank() as u8])).unwrap());
        assert!(out[0].is_none() && out[1].is_none());
        let root = out[2].clone().unwrap();
        assert_eq!(root, vec![Ok(vec![0]), Ok(vec![1]), Ok(vec![2])]);
    }

    #[test]
    fn bad_root_is_rejected() {
        assert!(matches!(
            broadcast_bytes(&NoComm, 3, Ok(vec![])),
            Err(MeshAdaptError::Comm(CommError::PeerOutOfRange { peer: 3, size: 1 }))
        ));
    }
}
