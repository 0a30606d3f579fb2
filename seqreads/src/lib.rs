mod fasta;
mod kmer;
mod pipeline;
mod read;

pub use fasta::{dyn_reader, open_file, FastaReader, BUFSIZE};
pub use kmer::{
    canonical, canonical_128, for_each_kmer, hash_of, hash_of_128, rev_complement,
    rev_complement_128, KmerHash, KmerParams, MAX_K_NARROW, MAX_K_WIDE,
};
pub use pipeline::{run_pipeline, OrderingMode, ReaderTransforms, SpotFilter, CHUNK_SIZE};
pub use read::{parse_spot_id, strip_trailing_suffix, Read, Reader, SpotIdKey, SpotKeyed};
