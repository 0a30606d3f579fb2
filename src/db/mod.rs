//! On-disk database formats and the in-memory `DbStore` lookup view.
//!
//! Grounded on `original_source/tools/tax/src/dbs.h` (header/payload layout,
//! `IO::save_vector`/`load_vector`) and `dbss.h` (annotation index, folder
//! fallback, compressed variant). Byte-level I/O follows the teacher's
//! `byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt}` convention
//! rather than serde/bincode, matching how the teacher keeps its hot-path
//! binary formats out of serde.

pub mod dbs;
pub mod dbsm;
pub mod dbss;
pub mod flat;

use crate::error::{ClassifierError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const DB_VERSION: u64 = 1;

/// Shared `{version, k}` header every format begins with.
#[derive(Debug, Clone, Copy)]
pub struct DbHeader {
    pub version: u64,
    pub k: usize,
}

impl DbHeader {
    pub fn new(k: usize) -> Self {
        Self {
            version: DB_VERSION,
            k,
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.version)?;
        w.write_u64::<LittleEndian>(self.k as u64)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let version = r.read_u64::<LittleEndian>()?;
        let k = r.read_u64::<LittleEndian>()?;
        if version != DB_VERSION {
            return Err(ClassifierError::BadFormat(format!(
                "unsupported database version {version}"
            )));
        }
        if k == 0 || k > 64 {
            return Err(ClassifierError::BadFormat(format!(
                "k out of range: {k}"
            )));
        }
        Ok(Self {
            version,
            k: k as usize,
        })
    }
}

/// Result of probing a single canonical hash against whichever database
/// format is loaded. Realizes the `spec.md` §9 "dynamic dispatch through a
/// job hierarchy" redesign flag as a single sum type instead of a
/// `Job`/`DBJob`/`DBSBasicJob`/... class hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    NotFound,
    /// Flat `.db`: the hash is present, no taxon attached.
    Found,
    /// `.dbs`: the hash maps to exactly one taxon.
    Tax(i32),
    /// `.dbsm` / `.dbss`: the hash maps to one or more taxa.
    MultiTax(Vec<i32>),
}

/// The loaded, immutable, read-only-shared database. One `DbStore` is built
/// once at startup and referenced by every matcher worker (spec.md §3
/// "Ownership & lifecycle").
pub enum DbStore {
    Flat(flat::FlatDb),
    Tax(dbs::DbsDb),
    MultiTax(dbsm::DbsmDb),
    SortedByTax(dbss::DbssDb),
}

impl DbStore {
    pub fn k(&self) -> usize {
        match self {
            DbStore::Flat(db) => db.k,
            DbStore::Tax(db) => db.k,
            DbStore::MultiTax(db) => db.k,
            DbStore::SortedByTax(db) => db.k,
        }
    }

    /// The single `match_chunk`-shaped lookup operation every format
    /// implements identically from the matcher's point of view.
    pub fn probe(&self, h: u64) -> ProbeResult {
        match self {
            DbStore::Flat(db) => {
                if db.index.contains(h) {
                    ProbeResult::Found
                } else {
                    ProbeResult::NotFound
                }
            }
            DbStore::Tax(db) => match db.index.find(h) {
                Some(rec) => ProbeResult::Tax(rec.tax_id),
                None => ProbeResult::NotFound,
            },
            DbStore::MultiTax(db) => match db.index.find(h) {
                Some(rec) => ProbeResult::MultiTax(rec.tax_ids.clone()),
                None => ProbeResult::NotFound,
            },
            DbStore::SortedByTax(db) => match db.index.find(h) {
                Some(rec) => ProbeResult::MultiTax(rec.tax_ids.clone()),
                None => ProbeResult::NotFound,
            },
        }
    }
}
