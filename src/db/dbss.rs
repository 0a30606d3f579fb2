//! Sorted-by-taxon `.dbss` + annotation, and its `<name>.split/` directory
//! fallback.
//!
//! Grounded on `original_source/tools/tax/src/dbss.h`: `DBSAnnot{tax_id,
//! count,offset}`, the compressed `DBSAnnot_c{...,is_bm}` variant,
//! `DBSSFileReader` and `DBSSFolderReader` (the folder form). The succinct
//! bit-sliced compression BitMagic performs there is realized here with
//! `roaring::RoaringTreemap` (grounded on the `MUSK` k-mer-spectrum tool in
//! this retrieval pack, which stores per-unit k-mer sets the same way) — an
//! approximation of the original bit-plane codec behind the same on-wire
//! contract (spec.md §4.2d: explicit offset per row plus a sentinel row).

use super::DbHeader;
use crate::error::{ClassifierError, Result};
use crate::lookup::{BucketedIndex, KmerTaxMulti};
use byteorder::{LittleEndian, ReadBytesExt};
use roaring::RoaringTreemap;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub struct DbssDb {
    pub k: usize,
    pub index: BucketedIndex<KmerTaxMulti>,
}

#[derive(Debug, Clone, Copy)]
struct AnnotationRow {
    tax_id: i32,
    count: u64,
    offset: u64,
    compressed: bool,
}

struct Annotation {
    rows: Vec<AnnotationRow>,
    total_size: u64,
}

impl Annotation {
    /// Parses either the plain `tax_id<TAB>count` form or the compressed
    /// `tax_id<TAB>offset<TAB>count<TAB>{raw|bm}` form, terminated by a
    /// `0<TAB>offset<TAB>` sentinel. `header_size` is needed to compute
    /// implicit offsets for the plain form.
    fn parse<P: AsRef<Path>>(path: P, header_size: u64) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        let mut total_size = None;
        let mut prev_tax_id: Option<i32> = None;

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.len() {
                2 => {
                    let tax_id: i32 = fields[0].parse().map_err(|_| bad_annotation(&line))?;
                    let count: u64 = fields[1].parse().map_err(|_| bad_annotation(&line))?;
                    let offset = header_size
                        + rows.iter().map(|r: &AnnotationRow| r.count * 8).sum::<u64>();
                    check_ascending(&mut prev_tax_id, tax_id)?;
                    rows.push(AnnotationRow {
                        tax_id,
                        count,
                        offset,
                        compressed: false,
                    });
                }
                3 | 4 => {
                    let tax_id: i32 = fields[0].parse().map_err(|_| bad_annotation(&line))?;
                    let offset: u64 = fields[1].parse().map_err(|_| bad_annotation(&line))?;
                    if tax_id == 0 {
                        // sentinel row: total payload size
                        total_size = Some(offset);
                        continue;
                    }
                    let count: u64 = fields[2].parse().map_err(|_| bad_annotation(&line))?;
                    let compressed = fields.get(3).map(|f| *f == "bm").unwrap_or(false);
                    check_ascending(&mut prev_tax_id, tax_id)?;
                    rows.push(AnnotationRow {
                        tax_id,
                        count,
                        offset,
                        compressed,
                    });
                }
                _ => return Err(bad_annotation(&line)),
            }
        }

        let total_size = total_size.unwrap_or_else(|| {
            header_size + rows.iter().map(|r| r.count * 8).sum::<u64>()
        });

        Ok(Self { rows, total_size })
    }
}

fn bad_annotation(line: &str) -> ClassifierError {
    ClassifierError::BadFormat(format!("malformed .dbss.annotation line: {line:?}"))
}

fn check_ascending(prev: &mut Option<i32>, tax_id: i32) -> Result<()> {
    if let Some(p) = *prev {
        if tax_id <= p {
            return Err(ClassifierError::BadFormat(format!(
                "non-ascending or duplicate tax_id {tax_id} in .dbss.annotation"
            )));
        }
    }
    *prev = Some(tax_id);
    Ok(())
}

fn read_run(file: &mut File, row: &AnnotationRow, payload_bytes: u64) -> Result<Vec<u64>> {
    file.seek(SeekFrom::Start(row.offset))?;
    if row.compressed {
        let mut limited = file.take(payload_bytes);
        let mut buf = Vec::new();
        limited.read_to_end(&mut buf)?;
        let tree = RoaringTreemap::deserialize_from(&buf[..])
            .map_err(|e| ClassifierError::BadFormat(format!("corrupt bitmap run: {e}")))?;
        Ok(tree.iter().collect())
    } else {
        let mut hashes = Vec::with_capacity(row.count as usize);
        for _ in 0..row.count {
            hashes.push(file.read_u64::<LittleEndian>()?);
        }
        Ok(hashes)
    }
}

impl DbssDb {
    /// Loads the per-taxon aggregated view restricted to `tax_list`:
    /// concatenates the selected taxa's runs into one `{hash, tax_ids}`
    /// vector (decompressing bitmap runs first) and builds a bucketed
    /// index over the result. A `tax_id` named in `tax_list` but absent
    /// from the annotation is silently skipped.
    pub fn load_restricted<P: AsRef<Path>>(path: P, tax_list: &[i32]) -> Result<Self> {
        let path = path.as_ref();
        if path.is_file() {
            Self::load_restricted_single_file(path, tax_list)
        } else {
            let split_dir = split_dir_path(path);
            if split_dir.is_dir() {
                Self::load_restricted_split_dir(&split_dir, tax_list)
            } else {
                Err(ClassifierError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("neither {:?} nor {:?} exists", path, split_dir),
                )))
            }
        }
    }

    fn load_restricted_single_file(path: &Path, tax_list: &[i32]) -> Result<Self> {
        let mut file = File::open(path)?;
        let header = DbHeader::read(&mut file)?;
        let header_size = 2 * std::mem::size_of::<u64>() as u64;

        let annotation_path = {
            let mut p = path.as_os_str().to_os_string();
            p.push(".annotation");
            PathBuf::from(p)
        };
        let annotation = Annotation::parse(&annotation_path, header_size)?;

        let file_size = file.metadata()?.len();
        if annotation.total_size != file_size {
            return Err(ClassifierError::BadFormat(format!(
                "annotation total size {} does not match file size {}",
                annotation.total_size, file_size
            )));
        }

        let wanted: HashSet<i32> = tax_list.iter().copied().collect();
        let mut by_hash: BTreeMap<u64, Vec<i32>> = BTreeMap::new();
        for row in &annotation.rows {
            if !wanted.contains(&row.tax_id) {
                continue;
            }
            let payload_bytes = file_size - row.offset;
            let hashes = read_run(&mut file, row, payload_bytes)?;
            for h in hashes {
                by_hash.entry(h).or_default().push(row.tax_id);
            }
        }

        Ok(Self {
            k: header.k,
            index: build_multi_index(by_hash),
        })
    }

    fn load_restricted_split_dir(dir: &Path, tax_list: &[i32]) -> Result<Self> {
        let header_path = dir.join("header");
        let header_text = std::fs::read_to_string(&header_path)?;
        let k: usize = header_text
            .trim()
            .parse()
            .map_err(|_| ClassifierError::BadFormat(format!("bad k in {:?}", header_path)))?;
        if k == 0 || k > 64 {
            return Err(ClassifierError::BadFormat(format!("k out of range: {k}")));
        }

        let mut by_hash: BTreeMap<u64, Vec<i32>> = BTreeMap::new();
        for &tax_id in tax_list {
            let taxon_file = dir.join(format!("{tax_id}.db"));
            if !taxon_file.is_file() {
                continue; // missing tax_id silently skipped
            }
            let mut reader = BufReader::new(File::open(&taxon_file)?);
            loop {
                match reader.read_u64::<LittleEndian>() {
                    Ok(h) => {
                        by_hash.entry(h).or_default().push(tax_id);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(Self {
            k,
            index: build_multi_index(by_hash),
        })
    }
}

fn build_multi_index(by_hash: BTreeMap<u64, Vec<i32>>) -> BucketedIndex<KmerTaxMulti> {
    let records = by_hash
        .into_iter()
        .map(|(hash, mut tax_ids)| {
            tax_ids.sort_unstable();
            tax_ids.dedup();
            KmerTaxMulti { hash, tax_ids }
        })
        .collect();
    BucketedIndex::build(records)
}

fn split_dir_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".split");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::fs;
    use std::io::{BufWriter, Write};
    use tempfile::tempdir;

    fn write_dbss_file(path: &Path, k: usize, runs: &[(i32, &[u64])]) {
        let mut w = BufWriter::new(File::create(path).unwrap());
        DbHeader::new(k).write(&mut w).unwrap();
        for (_, hashes) in runs {
            for &h in *hashes {
                w.write_u64::<LittleEndian>(h).unwrap();
            }
        }
        w.flush().unwrap();
    }

    fn write_annotation(path: &Path, header_size: u64, runs: &[(i32, &[u64])]) {
        let mut w = BufWriter::new(File::create(path).unwrap());
        let mut offset = header_size;
        for (tax_id, hashes) in runs {
            writeln!(w, "{}\t{}", tax_id, hashes.len()).unwrap();
            offset += (hashes.len() as u64) * 8;
        }
        let _ = offset;
        w.flush().unwrap();
    }

    #[test]
    fn loads_restricted_single_file_form() {
        let dir = tempdir().unwrap();
        let dbss_path = dir.path().join("taxa.dbss");
        let runs: Vec<(i32, &[u64])> = vec![(10, &[1u64, 5, 9]), (20, &[5u64, 7])];
        write_dbss_file(&dbss_path, 4, &runs);
        let mut annotation_path = dbss_path.as_os_str().to_os_string();
        annotation_path.push(".annotation");
        write_annotation(Path::new(&annotation_path), 16, &runs);

        let db = DbssDb::load_restricted(&dbss_path, &[10, 20]).unwrap();
        assert_eq!(db.k, 4);
        // hash 5 is shared by both taxa
        let shared = db.index.find(5).unwrap();
        assert_eq!(shared.tax_ids, vec![10, 20]);
        let only_ten = db.index.find(1).unwrap();
        assert_eq!(only_ten.tax_ids, vec![10]);
    }

    #[test]
    fn tax_list_restriction_excludes_unselected_taxa() {
        let dir = tempdir().unwrap();
        let dbss_path = dir.path().join("taxa.dbss");
        let runs: Vec<(i32, &[u64])> = vec![(10, &[1u64]), (20, &[2u64])];
        write_dbss_file(&dbss_path, 4, &runs);
        let mut annotation_path = dbss_path.as_os_str().to_os_string();
        annotation_path.push(".annotation");
        write_annotation(Path::new(&annotation_path), 16, &runs);

        let db = DbssDb::load_restricted(&dbss_path, &[10]).unwrap();
        assert!(db.index.find(1).is_some());
        assert!(db.index.find(2).is_none());
    }

    #[test]
    fn split_directory_fallback_reads_per_taxon_files() {
        let dir = tempdir().unwrap();
        let split_dir = dir.path().join("taxa.dbss.split");
        fs::create_dir(&split_dir).unwrap();
        fs::write(split_dir.join("header"), "4\n").unwrap();

        let mut w = BufWriter::new(File::create(split_dir.join("10.db")).unwrap());
        w.write_u64::<LittleEndian>(3).unwrap();
        w.write_u64::<LittleEndian>(7).unwrap();
        w.flush().unwrap();

        let db = DbssDb::load_restricted(dir.path().join("taxa.dbss"), &[10]).unwrap();
        assert_eq!(db.k, 4);
        assert_eq!(db.index.find(3).unwrap().tax_ids, vec![10]);
    }

    #[test]
    fn missing_tax_id_in_tax_list_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let dbss_path = dir.path().join("taxa.dbss");
        let runs: Vec<(i32, &[u64])> = vec![(10, &[1u64])];
        write_dbss_file(&dbss_path, 4, &runs);
        let mut annotation_path = dbss_path.as_os_str().to_os_string();
        annotation_path.push(".annotation");
        write_annotation(Path::new(&annotation_path), 16, &runs);

        // 99 is not in the annotation at all
        let db = DbssDb::load_restricted(&dbss_path, &[10, 99]).unwrap();
        assert!(db.index.find(1).is_some());
    }
}
