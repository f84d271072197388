//! Random workload generation.

use arbiter_io::{Extent, FileId, Request};
use bytes::{Bytes, BytesMut};
use rand::Rng;

use crate::SimConfig;

/// One operation of a generated workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read {
        file: FileId,
        offset: i64,
        len: usize,
    },
    Write {
        file: FileId,
        offset: i64,
        data: Bytes,
    },
}

impl Op {
    /// Returns the extent this operation covers.
    pub fn extent(&self) -> Extent {
        match self {
            Op::Read { file, offset, len } => Extent::read(*file, *offset, *len),
            Op::Write { file, offset, data } => Extent::write(*file, *offset, data.len()),
        }
    }

    /// Builds a fresh request for this operation.
    pub fn to_request(&self) -> Request<BytesMut> {
        match self {
            Op::Read { file, offset, len } => {
                Request::read(*file, *offset, *len, BytesMut::zeroed(*len))
            }
            Op::Write { file, offset, data } => {
                Request::write(*file, *offset, data.len(), BytesMut::from(&data[..]))
            }
        }
    }
}

/// Generates `config.requests` operations spread over `config.files` files.
///
/// Offsets fall in `[0, max_offset)` and lengths in `[1, max_len]`, so a
/// small offset space produces plenty of overlap.
pub fn generate_workload<R: Rng>(config: &SimConfig, rng: &mut R) -> Vec<Op> {
    (0..config.requests)
        .map(|_| {
            let file = FileId::new(rng.gen_range(0..config.files.max(1)));
            let offset = rng.gen_range(0..config.max_offset.max(1));
            let len = rng.gen_range(1..=config.max_len.max(1));
            if rng.gen_bool(config.read_ratio) {
                Op::Read { file, offset, len }
            } else {
                let mut data = vec![0u8; len];
                rng.fill(&mut data[..]);
                Op::Write {
                    file,
                    offset,
                    data: Bytes::from(data),
                }
            }
        })
        .collect()
}
