//! Command-line surface, grounded on the teacher's `kr2r/src/args.rs`
//! `#[derive(Parser)]` style: one struct per invocation mode, `#[arg(...)]`
//! attributes carrying defaults and validation in the type itself.

use clap::Parser;
use std::path::PathBuf;

/// A mutually exclusive choice of database format (spec.md §6
/// `db-selector`).
#[derive(Debug, Clone)]
pub enum DbSelector {
    Flat(PathBuf),
    Tax(PathBuf),
    MultiTax(PathBuf),
    SortedByTax { dbss: PathBuf, tax_list: PathBuf },
}

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "classifier",
    version,
    about = "K-mer based taxonomic classifier for DNA/RNA sequencing reads"
)]
pub struct Args {
    /// Flat k-mer filter database (`.db`)
    #[arg(long, value_name = "path.db")]
    pub db: Option<PathBuf>,

    /// Taxon-annotated database (`.dbs`)
    #[arg(long, value_name = "path.dbs")]
    pub dbs: Option<PathBuf>,

    /// Multi-taxon database (`.dbsm`)
    #[arg(long, value_name = "path.dbsm")]
    pub dbsm: Option<PathBuf>,

    /// Sorted-by-taxon database (`.dbss`), restricted to `--tax-list`
    #[arg(long, value_name = "path.dbss")]
    pub dbss: Option<PathBuf>,

    /// Taxon subset for `--dbss`, one tax_id per line
    #[arg(long, value_name = "path", requires = "dbss")]
    pub tax_list: Option<PathBuf>,

    /// Include/exclude spot-id list
    #[arg(long, value_name = "path")]
    pub spot_filter: Option<PathBuf>,

    /// Treat `--spot-filter` ids as an exclusion list instead of inclusion
    #[arg(long, requires = "spot_filter")]
    pub spot_filter_exclude: bool,

    /// Skip aligned reads, if the reader supports detecting them
    #[arg(long)]
    pub unaligned_only: bool,

    /// Worker thread count; 0 runs single-threaded
    #[arg(long, default_value_t = default_num_threads())]
    pub num_threads: usize,

    /// Stride sampling: keep 1 read out of every `s`
    #[arg(long, value_name = "s")]
    pub optimization_ultrafast_skip_reader: Option<usize>,

    /// Split reads on runs of non-ACGT bases before classifying
    #[arg(long)]
    pub split_on_n: bool,

    /// Omit `xN` counts in default-mode output
    #[arg(long)]
    pub hide_counts: bool,

    /// Emit the compact grouped histogram instead of per-read rows
    #[arg(long)]
    pub compact: bool,

    /// Run the tax-collator post-pass, merging rows sharing a spot id
    #[arg(long)]
    pub collate: bool,

    /// Output file; for list-file input, used as a per-entry suffix
    #[arg(long, value_name = "path-or-postfix")]
    pub out: Option<PathBuf>,

    /// Cap on k-mer probes performed per read
    #[arg(long, value_name = "n")]
    pub max_lookups_per_fragment: Option<usize>,

    /// Emit output in strict source order even when multi-threaded
    #[arg(long, conflicts_with = "sort_order")]
    pub strict_order: bool,

    /// Buffer all results and emit them globally reordered by
    /// `{accession, read_num, fragment_num}` parsed from the spot id,
    /// instead of source or arrival order
    #[arg(long)]
    pub sort_order: bool,

    /// Sequencing file to classify, or a list file (one path per line) when
    /// `--out` is given as a suffix
    pub input: PathBuf,
}

fn default_num_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

impl Args {
    /// Resolves the mutually exclusive db-selector group, enforcing
    /// "exactly one of --db/--dbs/--dbsm/--dbss" and "--dbss requires
    /// --tax-list" (spec.md §7 invalid-argument kind).
    pub fn db_selector(&self) -> crate::Result<DbSelector> {
        let chosen: Vec<&str> = [
            self.db.is_some().then_some("--db"),
            self.dbs.is_some().then_some("--dbs"),
            self.dbsm.is_some().then_some("--dbsm"),
            self.dbss.is_some().then_some("--dbss"),
        ]
        .into_iter()
        .flatten()
        .collect();

        match chosen.len() {
            0 => Err(crate::ClassifierError::InvalidArgument(
                "one of --db, --dbs, --dbsm, --dbss is required".to_string(),
            )),
            1 => {}
            _ => {
                return Err(crate::ClassifierError::InvalidArgument(format!(
                    "--db, --dbs, --dbsm, --dbss are mutually exclusive, got {}",
                    chosen.join(" and ")
                )))
            }
        }

        if let Some(db) = &self.db {
            return Ok(DbSelector::Flat(db.clone()));
        }
        if let Some(dbs) = &self.dbs {
            return Ok(DbSelector::Tax(dbs.clone()));
        }
        if let Some(dbsm) = &self.dbsm {
            return Ok(DbSelector::MultiTax(dbsm.clone()));
        }
        let dbss = self.dbss.clone().expect("checked above");
        let tax_list = self.tax_list.clone().ok_or_else(|| {
            crate::ClassifierError::InvalidArgument("--dbss requires --tax-list".to_string())
        })?;
        Ok(DbSelector::SortedByTax { dbss, tax_list })
    }
}
