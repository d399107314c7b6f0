//! Durable state for acceptors.
//!
//! An acceptor must never acknowledge a promise or an acceptance before the
//! state behind it survives a crash. [`DurableStore`] is the hook the node
//! uses to write that state out and to read it back on restart.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bincode::config::Configuration;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::proposal::ProposalId;

/// The acceptor state that has to outlive a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorSnapshot<V> {
    pub promised_id: Option<ProposalId>,
    pub accepted_id: Option<ProposalId>,
    pub accepted_value: Option<V>,
}

pub trait DurableStore<V> {
    /// Writes the snapshot to stable media. Returns only once it is durable.
    fn save(&mut self, snapshot: &AcceptorSnapshot<V>) -> Result<(), StorageError>;
    /// Returns the last saved snapshot, if any.
    fn load(&mut self) -> Result<Option<AcceptorSnapshot<V>>, StorageError>;
}

/// Keeps the snapshot in memory. Survives a simulated restart as long as the
/// store itself is kept around.
#[derive(Debug, Clone)]
pub struct MemoryStore<V> {
    snapshot: Option<AcceptorSnapshot<V>>,
    saves: usize,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        MemoryStore {
            snapshot: None,
            saves: 0,
        }
    }

    /// Number of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> DurableStore<V> for MemoryStore<V> {
    fn save(&mut self, snapshot: &AcceptorSnapshot<V>) -> Result<(), StorageError> {
        self.snapshot = Some(snapshot.clone());
        self.saves += 1;
        Ok(())
    }

    fn load(&mut self) -> Result<Option<AcceptorSnapshot<V>>, StorageError> {
        Ok(self.snapshot.clone())
    }
}

const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = DIGEST_LEN + 8 + 8;

/// Crash-safe file store.
///
/// Writes alternate between two files so a crash in the middle of a write
/// always leaves the previous copy intact. Each file holds
///
/// ```text
///  0: sha256 of bytes 32..
/// 32: serial number (u64, big endian)
/// 40: payload length (u64, big endian)
/// 48: bincode payload
/// ```
///
/// and is synced before `save` returns. On open, the valid copy with the
/// highest serial wins.
pub struct FileStore {
    path_a: PathBuf,
    path_b: PathBuf,
    next_is_a: bool,
    serial: u64,
    recovered: Option<Vec<u8>>,
    bincode_config: Configuration,
}

impl FileStore {
    /// Opens (or creates) the pair of files for `object_id` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, object_id: &str) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        let path_a = dir.join(format!("{object_id}_a.durable"));
        let path_b = dir.join(format!("{object_id}_b.durable"));

        let created = !path_a.exists() || !path_b.exists();
        for path in [&path_a, &path_b] {
            OpenOptions::new().create(true).append(true).open(path)?;
        }
        if created {
            // Make the new directory entries themselves durable.
            File::open(dir)?.sync_all()?;
        }

        let a = read_record(&path_a)?;
        let b = read_record(&path_b)?;

        let (serial, next_is_a, recovered) = match (a, b) {
            (Some((sa, pa)), Some((sb, pb))) => {
                if sa > sb {
                    (sa + 1, false, Some(pa))
                } else {
                    (sb + 1, true, Some(pb))
                }
            }
            (Some((sa, pa)), None) => (sa + 1, false, Some(pa)),
            (None, Some((sb, pb))) => (sb + 1, true, Some(pb)),
            (None, None) => {
                if fs::metadata(&path_a)?.len() != 0 || fs::metadata(&path_b)?.len() != 0 {
                    return Err(StorageError::Unrecoverable);
                }
                (1, true, None)
            }
        };

        debug!(
            "FileStore: Opened {} (next serial {}, recovered: {})",
            object_id,
            serial,
            recovered.is_some()
        );

        Ok(FileStore {
            path_a,
            path_b,
            next_is_a,
            serial,
            recovered,
            bincode_config: bincode::config::standard(),
        })
    }

    /// Serial number the next save will carry.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl<V: Serialize + DeserializeOwned> DurableStore<V> for FileStore {
    fn save(&mut self, snapshot: &AcceptorSnapshot<V>) -> Result<(), StorageError> {
        let payload = bincode::serde::encode_to_vec(snapshot, self.bincode_config)?;
        let path = if self.next_is_a { &self.path_a } else { &self.path_b };

        let serial = self.serial.to_be_bytes();
        let length = (payload.len() as u64).to_be_bytes();
        let digest = Sha256::new()
            .chain_update(serial)
            .chain_update(length)
            .chain_update(&payload)
            .finalize();

        let mut file = File::create(path)?;
        file.write_all(&digest)?;
        file.write_all(&serial)?;
        file.write_all(&length)?;
        file.write_all(&payload)?;
        file.sync_all()?;

        self.serial += 1;
        self.next_is_a = !self.next_is_a;
        self.recovered = Some(payload);
        Ok(())
    }

    fn load(&mut self) -> Result<Option<AcceptorSnapshot<V>>, StorageError> {
        match &self.recovered {
            Some(payload) => {
                let (snapshot, _) = bincode::serde::decode_from_slice(payload, self.bincode_config)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

/// Reads one slot file. Empty or missing files yield `None`; damaged ones are
/// logged and also yield `None` so the other copy can take over.
fn read_record(path: &Path) -> Result<Option<(u64, Vec<u8>)>, StorageError> {
    let mut bytes = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes)?;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    if bytes.is_empty() {
        return Ok(None);
    }

    match parse_record(&bytes) {
        Some(record) => Ok(Some(record)),
        None => {
            warn!("FileStore: {} is corrupted, ignoring it", path.display());
            Ok(None)
        }
    }
}

fn parse_record(bytes: &[u8]) -> Option<(u64, Vec<u8>)> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let (digest, rest) = bytes.split_at(DIGEST_LEN);
    let serial = u64::from_be_bytes(rest[0..8].try_into().ok()?);
    let length = usize::try_from(u64::from_be_bytes(rest[8..16].try_into().ok()?)).ok()?;
    let payload = &rest[16..];
    if payload.len() < length {
        return None;
    }
    let payload = &payload[..length];

    let expected = Sha256::digest(&rest[..16 + length]);
    if expected.as_slice() != digest {
        return None;
    }
    Some((serial, payload.to_vec()))
}
