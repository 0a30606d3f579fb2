//! Multi-taxon `.dbsm`: `{hash: u64, n: i32, tax_ids: i32[n]}` records,
//! sorted ascending by hash; `tax_ids` within a record are sorted-unique.

use super::DbHeader;
use crate::error::{ClassifierError, Result};
use crate::lookup::{BucketedIndex, KmerTaxMulti};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub struct DbsmDb {
    pub k: usize,
    pub index: BucketedIndex<KmerTaxMulti>,
}

impl DbsmDb {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let header = DbHeader::read(&mut reader)?;
        let count = reader.read_u64::<LittleEndian>()? as usize;

        let mut records = Vec::with_capacity(count);
        let mut prev = None;
        for _ in 0..count {
            let hash = reader.read_u64::<LittleEndian>()?;
            if let Some(p) = prev {
                if hash < p {
                    return Err(ClassifierError::BadFormat(
                        ".dbsm payload is not ascending-sorted by hash".to_string(),
                    ));
                }
            }
            prev = Some(hash);

            let n = reader.read_i32::<LittleEndian>()?;
            if n <= 0 {
                return Err(ClassifierError::BadFormat(format!(
                    "non-positive tax_ids length {n} in .dbsm record"
                )));
            }
            let mut tax_ids = Vec::with_capacity(n as usize);
            for _ in 0..n {
                tax_ids.push(reader.read_i32::<LittleEndian>()?);
            }
            if !tax_ids.windows(2).all(|w| w[0] < w[1]) {
                return Err(ClassifierError::BadFormat(format!(
                    "tax_ids for hash {hash} are not sorted-unique"
                )));
            }
            records.push(KmerTaxMulti { hash, tax_ids });
        }

        Ok(Self {
            k: header.k,
            index: BucketedIndex::build(records),
        })
    }
}

pub fn save_dbsm<P: AsRef<Path>>(path: P, k: usize, records: &[KmerTaxMulti]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    DbHeader::new(k).write(&mut writer)?;
    writer.write_u64::<LittleEndian>(records.len() as u64)?;
    for rec in records {
        writer.write_u64::<LittleEndian>(rec.hash)?;
        writer.write_i32::<LittleEndian>(rec.tax_ids.len() as i32)?;
        for &tax_id in &rec.tax_ids {
            writer.write_i32::<LittleEndian>(tax_id)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_multi_taxon_records() {
        let records = vec![
            KmerTaxMulti {
                hash: 2,
                tax_ids: vec![9606, 10090],
            },
            KmerTaxMulti {
                hash: 8,
                tax_ids: vec![1],
            },
        ];
        let file = NamedTempFile::new().unwrap();
        save_dbsm(file.path(), 4, &records).unwrap();

        let db = DbsmDb::load(file.path()).unwrap();
        let rec = db.index.find(2).unwrap();
        assert_eq!(rec.tax_ids, vec![9606, 10090]);
        assert!(db.index.find(3).is_none());
    }

    #[test]
    fn rejects_unsorted_tax_ids_within_a_record() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut w = BufWriter::new(File::create(file.path()).unwrap());
            DbHeader::new(4).write(&mut w).unwrap();
            w.write_u64::<LittleEndian>(1).unwrap();
            w.write_u64::<LittleEndian>(5).unwrap();
            w.write_i32::<LittleEndian>(2).unwrap();
            w.write_i32::<LittleEndian>(10090).unwrap();
            w.write_i32::<LittleEndian>(9606).unwrap(); // descending, invalid
            w.flush().unwrap();
        }
        assert!(DbsmDb::load(file.path()).is_err());
    }
}
