//! Taxon-annotated `.dbs`: `{hash: u64, tax_id: i32}` records, sorted
//! ascending by hash, each hash appearing at most once.

use super::DbHeader;
use crate::error::{ClassifierError, Result};
use crate::lookup::{BucketedIndex, KmerTax};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub struct DbsDb {
    pub k: usize,
    pub index: BucketedIndex<KmerTax>,
}

impl DbsDb {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let header = DbHeader::read(&mut reader)?;
        let count = reader.read_u64::<LittleEndian>()? as usize;

        let mut records = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);
        let mut prev = None;
        for _ in 0..count {
            let hash = reader.read_u64::<LittleEndian>()?;
            let tax_id = reader.read_i32::<LittleEndian>()?;
            if let Some(p) = prev {
                if hash < p {
                    return Err(ClassifierError::BadFormat(
                        ".dbs payload is not ascending-sorted by hash".to_string(),
                    ));
                }
            }
            prev = Some(hash);
            if !seen.insert(hash) {
                return Err(ClassifierError::BadFormat(format!(
                    "duplicate hash {hash} in .dbs payload"
                )));
            }
            records.push(KmerTax { hash, tax_id });
        }

        Ok(Self {
            k: header.k,
            index: BucketedIndex::build(records),
        })
    }
}

/// Writes the `.dbs` format from an already hash-sorted, hash-unique slice.
pub fn save_dbs<P: AsRef<Path>>(path: P, k: usize, records: &[KmerTax]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    DbHeader::new(k).write(&mut writer)?;
    writer.write_u64::<LittleEndian>(records.len() as u64)?;
    for rec in records {
        writer.write_u64::<LittleEndian>(rec.hash)?;
        writer.write_i32::<LittleEndian>(rec.tax_id)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_hash_to_tax_mapping() {
        let records = vec![
            KmerTax { hash: 1, tax_id: 10 },
            KmerTax { hash: 5, tax_id: 20 },
            KmerTax {
                hash: 9,
                tax_id: 9606,
            },
        ];
        let file = NamedTempFile::new().unwrap();
        save_dbs(file.path(), 4, &records).unwrap();

        let db = DbsDb::load(file.path()).unwrap();
        assert_eq!(db.index.find(5).unwrap().tax_id, 20);
        assert_eq!(db.index.find(9).unwrap().tax_id, 9606);
        assert!(db.index.find(2).is_none());
    }

    #[test]
    fn rejects_duplicate_hash() {
        let records = vec![
            KmerTax { hash: 3, tax_id: 1 },
            KmerTax { hash: 3, tax_id: 2 },
        ];
        let file = NamedTempFile::new().unwrap();
        save_dbs(file.path(), 4, &records).unwrap();
        assert!(DbsDb::load(file.path()).is_err());
    }
}
