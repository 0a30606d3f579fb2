//! Flat `.db`: a sorted array of canonical k-mer hashes, no taxa. Used as a
//! filter ("does this read contain any reference k-mer?").

use super::DbHeader;
use crate::error::{ClassifierError, Result};
use crate::lookup::BucketedIndex;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub struct FlatDb {
    pub k: usize,
    pub index: BucketedIndex<u64>,
}

impl FlatDb {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let header = DbHeader::read(&mut reader)?;
        let count = reader.read_u64::<LittleEndian>()? as usize;

        let mut hashes = Vec::with_capacity(count);
        let mut prev = None;
        for _ in 0..count {
            let h = reader.read_u64::<LittleEndian>()?;
            if let Some(p) = prev {
                if h < p {
                    return Err(ClassifierError::BadFormat(
                        "flat .db payload is not ascending-sorted".to_string(),
                    ));
                }
            }
            prev = Some(h);
            hashes.push(h);
        }

        Ok(Self {
            k: header.k,
            index: BucketedIndex::build(hashes),
        })
    }

}

/// Writes the flat format directly from an already-sorted hash slice,
/// without needing a constructed `FlatDb` first (used by database builders).
pub fn save_flat<P: AsRef<Path>>(path: P, k: usize, sorted_hashes: &[u64]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    DbHeader::new(k).write(&mut writer)?;
    writer.write_u64::<LittleEndian>(sorted_hashes.len() as u64)?;
    for &h in sorted_hashes {
        writer.write_u64::<LittleEndian>(h)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_sorted_hash_set() {
        let hashes: Vec<u64> = vec![3, 7, 19, 42, 100];
        let file = NamedTempFile::new().unwrap();
        save_flat(file.path(), 4, &hashes).unwrap();

        let db = FlatDb::load(file.path()).unwrap();
        assert_eq!(db.k, 4);
        for &h in &hashes {
            assert!(db.index.contains(h));
        }
        assert!(!db.index.contains(8));
    }

    #[test]
    fn rejects_version_mismatch() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut w = BufWriter::new(File::create(file.path()).unwrap());
            w.write_u64::<LittleEndian>(2).unwrap(); // bad version
            w.write_u64::<LittleEndian>(4).unwrap();
            w.write_u64::<LittleEndian>(0).unwrap();
            w.flush().unwrap();
        }
        assert!(FlatDb::load(file.path()).is_err());
    }
}
