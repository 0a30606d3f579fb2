//! Chunked parallel reader → worker pool → writer pipeline.
//!
//! Grounded on the teacher's `read_parallel`: a producer thread fills a
//! bounded `crossbeam_channel`, a pool of worker threads each drain it and
//! apply a `work` closure per chunk, and a single consumer closure drains a
//! second bounded channel of results. `crossbeam_channel::bounded` blocks the
//! receiver without polling, which is the condvar-guarded queue this
//! pipeline needs in place of a legacy busy-wait loop.

use crate::read::{parse_spot_id, Read as SeqRead, SpotIdKey, SpotKeyed};
use crossbeam_channel::bounded;
use scoped_threadpool::Pool;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io::Result;
use std::sync::Arc;

pub const CHUNK_SIZE: usize = 1024;

/// A chunk of reads tagged with the sequence number it was produced in, so
/// a strict-ordering writer can resequence output even though workers may
/// finish out of order.
struct Chunk {
    seq: u64,
    reads: Vec<SeqRead>,
}

/// Reader pre-transforms, applied in this order, each optional:
/// spot-id include/exclude filter, N-splitting into maximal ACGT runs, and
/// stride sampling.
#[derive(Default)]
pub struct ReaderTransforms {
    pub spot_filter: Option<SpotFilter>,
    pub split_on_n: bool,
    pub stride: Option<usize>,
}

pub struct SpotFilter {
    ids: HashSet<String>,
    /// If true, keep reads whose id is *not* in `ids`; otherwise keep only
    /// reads whose id *is* in `ids`.
    exclude: bool,
}

impl SpotFilter {
    pub fn include(ids: HashSet<String>) -> Self {
        Self {
            ids,
            exclude: false,
        }
    }

    pub fn exclude(ids: HashSet<String>) -> Self {
        Self { ids, exclude: true }
    }

    fn keep(&self, spot_id: &str) -> bool {
        let normalized = crate::read::strip_trailing_suffix(spot_id);
        let present = self.ids.contains(normalized);
        present != self.exclude
    }
}

impl ReaderTransforms {
    /// Apply the configured transforms to one batch of reads emitted by a
    /// `Reader`, in order: filter, then N-split, then stride sampling.
    pub fn apply(&self, reads: Vec<SeqRead>, stride_counter: &mut usize) -> Vec<SeqRead> {
        let mut reads = reads;

        if let Some(filter) = &self.spot_filter {
            reads.retain(|r| filter.keep(&r.spot_id));
        }

        if self.split_on_n {
            reads = reads
                .into_iter()
                .flat_map(|r| split_on_non_acgt(r))
                .collect();
        }

        if let Some(stride) = self.stride {
            if stride > 1 {
                reads = reads
                    .into_iter()
                    .filter(|_| {
                        let keep = *stride_counter % stride != 0;
                        *stride_counter += 1;
                        keep
                    })
                    .collect();
            }
        }

        reads
    }
}

/// Split one read into zero or more sub-reads whose bases are maximal
/// ACGT runs, propagating the original spot_id to every sub-read.
fn split_on_non_acgt(read: SeqRead) -> Vec<SeqRead> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in read.bases.chars() {
        match c.to_ascii_uppercase() {
            'A' | 'C' | 'G' | 'T' => current.push(c.to_ascii_uppercase()),
            _ => {
                if !current.is_empty() {
                    out.push(SeqRead::new(read.spot_id.clone(), std::mem::take(&mut current)));
                }
            }
        }
    }
    if !current.is_empty() {
        out.push(SeqRead::new(read.spot_id.clone(), current));
    }
    out
}

/// How the writer orders output across chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Emit chunks in the order they were dequeued by the writer
    /// (non-deterministic across runs with more than one worker).
    Arrival,
    /// Buffer out-of-order chunks and emit strictly by chunk sequence
    /// number, i.e. source order even when workers interleave accessions.
    Strict,
    /// Buffer every row of every chunk until the reader is exhausted, then
    /// emit them globally reordered by `{accession, read_num,
    /// fragment_num}` parsed from each row's spot id (rows whose id doesn't
    /// match the grammar sort after all that do).
    Sort,
}

/// Total order over rows for `OrderingMode::Sort`: parsed keys first
/// (by accession, fragment, read), then unparseable ids by raw string.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SpotSortKey {
    Parsed(SpotIdKey),
    Unparsed(String),
}

fn spot_sort_key(spot_id: &str) -> SpotSortKey {
    match parse_spot_id(spot_id) {
        Some(key) => SpotSortKey::Parsed(key),
        None => SpotSortKey::Unparsed(spot_id.to_string()),
    }
}

fn sort_by_spot_key<Row: SpotKeyed>(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_cached_key(|r| spot_sort_key(r.spot_key()));
    rows
}

/// Run reads from `reader` through `work` (per-read or per-chunk matcher
/// logic) across `n_threads` workers, handing each output row to `sink` in
/// the order `ordering` prescribes.
///
/// `n_threads == 0` runs everything on the calling thread: reader, matcher
/// and writer execute serially, which is also how single-threaded mode
/// guarantees full source-order output (spec.md §5) without needing
/// `OrderingMode::Strict`.
pub fn run_pipeline<R, W, S, O, Row>(
    reader: &mut R,
    n_threads: usize,
    transforms: &ReaderTransforms,
    ordering: OrderingMode,
    work: W,
    mut sink: S,
) -> Result<()>
where
    R: crate::read::Reader,
    O: IntoIterator<Item = Row> + Send + 'static,
    Row: SpotKeyed + Send + 'static,
    W: Fn(&[SeqRead]) -> O + Send + Sync,
    S: FnMut(Row),
{
    if n_threads == 0 {
        log::debug!("running pipeline single-threaded, ordering={ordering:?}");
        let mut stride_counter = 0usize;
        if ordering == OrderingMode::Sort {
            let mut rows: Vec<Row> = Vec::new();
            while let Some(batch) = reader.next()? {
                let reads = transforms.apply(batch, &mut stride_counter);
                if reads.is_empty() {
                    continue;
                }
                rows.extend(work(&reads));
            }
            for row in sort_by_spot_key(rows) {
                sink(row);
            }
            return Ok(());
        }
        while let Some(batch) = reader.next()? {
            let reads = transforms.apply(batch, &mut stride_counter);
            if reads.is_empty() {
                continue;
            }
            for row in work(&reads) {
                sink(row);
            }
        }
        return Ok(());
    }

    log::debug!("running pipeline with {n_threads} worker threads, ordering={ordering:?}");

    let buffer_len = n_threads * 4;
    let (chunk_tx, chunk_rx) = bounded::<Chunk>(buffer_len);
    let (out_tx, out_rx) = bounded::<(u64, O)>(buffer_len);
    let chunk_rx = Arc::new(chunk_rx);
    let out_tx = Arc::new(out_tx);

    let mut pool = Pool::new(n_threads as u32 + 1);

    pool.scoped(|scope| {
        scope.execute(move || {
            let mut seq = 0u64;
            let mut stride_counter = 0usize;
            while let Ok(Some(batch)) = reader.next() {
                let reads = transforms.apply(batch, &mut stride_counter);
                if reads.is_empty() {
                    continue;
                }
                if chunk_tx.send(Chunk { seq, reads }).is_err() {
                    break;
                }
                seq += 1;
            }
            // chunk_tx dropped here, signalling EOF to workers
        });

        for _ in 0..n_threads {
            let chunk_rx = Arc::clone(&chunk_rx);
            let out_tx = Arc::clone(&out_tx);
            let work = &work;
            scope.execute(move || {
                while let Ok(chunk) = chunk_rx.recv() {
                    let output = work(&chunk.reads);
                    if out_tx.send((chunk.seq, output)).is_err() {
                        break;
                    }
                }
            });
        }

        drop(out_tx);

        match ordering {
            OrderingMode::Arrival => {
                while let Ok((_, output)) = out_rx.recv() {
                    for row in output {
                        sink(row);
                    }
                }
            }
            OrderingMode::Strict => {
                let mut pending: HashMap<u64, O> = HashMap::new();
                let mut next_seq = 0u64;
                while let Ok((seq, output)) = out_rx.recv() {
                    pending.insert(seq, output);
                    while let Some(output) = pending.remove(&next_seq) {
                        for row in output {
                            sink(row);
                        }
                        next_seq += 1;
                    }
                }
            }
            OrderingMode::Sort => {
                let mut rows: Vec<Row> = Vec::new();
                while let Ok((_, output)) = out_rx.recv() {
                    rows.extend(output);
                }
                for row in sort_by_spot_key(rows) {
                    sink(row);
                }
            }
        }

        scope.join_all();
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecReader {
        chunks: Vec<Vec<SeqRead>>,
        idx: usize,
    }

    impl crate::read::Reader for VecReader {
        fn next(&mut self) -> Result<Option<Vec<SeqRead>>> {
            if self.idx >= self.chunks.len() {
                return Ok(None);
            }
            let chunk = self.chunks[self.idx].clone();
            self.idx += 1;
            Ok(Some(chunk))
        }
    }

    #[test]
    fn single_threaded_preserves_source_order() {
        let mut reader = VecReader {
            chunks: vec![
                vec![SeqRead::new("r1", "ACGT")],
                vec![SeqRead::new("r2", "GGGG")],
            ],
            idx: 0,
        };
        let mut out = Vec::new();
        run_pipeline(
            &mut reader,
            0,
            &ReaderTransforms::default(),
            OrderingMode::Arrival,
            |reads: &[SeqRead]| reads.iter().map(|r| r.spot_id.clone()).collect::<Vec<_>>(),
            |id: String| out.push(id),
        )
        .unwrap();
        assert_eq!(out, vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn strict_ordering_resequences_by_chunk_index() {
        let chunks: Vec<Vec<SeqRead>> = (0..20)
            .map(|i| vec![SeqRead::new(format!("r{i}"), "ACGT")])
            .collect();
        let mut reader = VecReader { chunks, idx: 0 };
        let mut out = Vec::new();
        run_pipeline(
            &mut reader,
            4,
            &ReaderTransforms::default(),
            OrderingMode::Strict,
            |reads: &[SeqRead]| vec![reads[0].spot_id.clone()],
            |id: String| out.push(id),
        )
        .unwrap();
        let expected: Vec<String> = (0..20).map(|i| format!("r{i}")).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn sort_ordering_reorders_by_parsed_spot_key_regardless_of_arrival() {
        // chunks arrive in an order that is neither source nor accession
        // order; sort mode must still emit grouped and ordered by accession,
        // then fragment, then read number.
        let chunks: Vec<Vec<SeqRead>> = vec![
            vec![SeqRead::new("SRR2.FR1", "ACGT")],
            vec![SeqRead::new("SRR1.FR2", "ACGT")],
            vec![SeqRead::new("SRR1.FR1.2", "ACGT")],
            vec![SeqRead::new("SRR1.FR1.1", "ACGT")],
        ];
        let mut reader = VecReader { chunks, idx: 0 };
        let mut out = Vec::new();
        run_pipeline(
            &mut reader,
            4,
            &ReaderTransforms::default(),
            OrderingMode::Sort,
            |reads: &[SeqRead]| vec![reads[0].spot_id.clone()],
            |id: String| out.push(id),
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                "SRR1.FR1.1".to_string(),
                "SRR1.FR1.2".to_string(),
                "SRR1.FR2".to_string(),
                "SRR2.FR1".to_string(),
            ]
        );
    }

    #[test]
    fn split_on_non_acgt_preserves_spot_id() {
        let read = SeqRead::new("r3", "ACGTNACGT");
        let parts = split_on_non_acgt(read);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|r| r.spot_id == "r3"));
        assert_eq!(parts[0].bases, "ACGT");
        assert_eq!(parts[1].bases, "ACGT");
    }

    #[test]
    fn spot_filter_strips_trailing_suffix_before_matching() {
        let mut ids = HashSet::new();
        ids.insert("SRR1".to_string());
        let filter = SpotFilter::include(ids);
        assert!(filter.keep("SRR1.1"));
        assert!(!filter.keep("SRR2.1"));
    }

    #[test]
    fn stride_sampling_drops_every_nth_read() {
        let transforms = ReaderTransforms {
            stride: Some(2),
            ..Default::default()
        };
        let reads: Vec<SeqRead> = (0..6).map(|i| SeqRead::new(format!("r{i}"), "ACGT")).collect();
        let mut counter = 0;
        let kept = transforms.apply(reads, &mut counter);
        assert_eq!(kept.len(), 3);
    }
}
