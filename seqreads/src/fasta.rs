//! Minimal FASTA reader: the one concrete `Reader` implementation shipped
//! alongside the abstract pipeline. Transparently decompresses gzip input.

use crate::read::{Read as SeqRead, Reader};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read as IoRead, Result, Seek};
use std::path::Path;

pub const BUFSIZE: usize = 8 * 1024 * 1024;

pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File> {
    File::open(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            io::Error::new(e.kind(), format!("file not found: {:?}", path.as_ref()))
        } else {
            e
        }
    })
}

fn is_gzipped(file: &mut File) -> Result<bool> {
    let mut buffer = [0u8; 2];
    if file.read_exact(&mut buffer).is_err() {
        file.rewind()?;
        return Ok(false);
    }
    file.rewind()?;
    Ok(buffer == [0x1F, 0x8B])
}

pub fn dyn_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn IoRead + Send>> {
    let mut file = open_file(path)?;
    if is_gzipped(&mut file)? {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Reads FASTA records in batches of `batch_size`, normalizing bases to
/// uppercase and joining multi-line sequences (spec.md §3: "lowercase
/// inputs are normalized to uppercase").
pub struct FastaReader<R: IoRead + Send> {
    reader: BufReader<R>,
    pending_header: Option<String>,
    line: String,
    batch_size: usize,
}

impl<R: IoRead + Send> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, BUFSIZE, 1024)
    }

    pub fn with_capacity(reader: R, capacity: usize, batch_size: usize) -> Self {
        assert!(capacity >= 3);
        assert!(batch_size > 0);
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            pending_header: None,
            line: String::new(),
            batch_size,
        }
    }

    fn next_header(&mut self) -> Result<Option<String>> {
        if let Some(h) = self.pending_header.take() {
            return Ok(Some(h));
        }
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    fn read_record(&mut self) -> Result<Option<SeqRead>> {
        let header = match self.next_header()? {
            Some(h) => h,
            None => return Ok(None),
        };

        let spot_id = header
            .trim_start_matches('>')
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();

        let mut bases = String::new();
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                break;
            }
            let trimmed = self.line.trim_end_matches(['\n', '\r']);
            if trimmed.starts_with('>') {
                self.pending_header = Some(trimmed.to_string());
                break;
            }
            bases.push_str(trimmed);
        }

        Ok(Some(SeqRead::new(spot_id, bases.to_uppercase())))
    }
}

impl FastaReader<Box<dyn IoRead + Send>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(dyn_reader(path)?))
    }
}

impl<R: IoRead + Send> Reader for FastaReader<R> {
    fn next(&mut self) -> Result<Option<Vec<SeqRead>>> {
        let mut reads = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            match self.read_record()? {
                Some(r) => reads.push(r),
                None => break,
            }
        }
        Ok(if reads.is_empty() { None } else { Some(reads) })
    }
}
