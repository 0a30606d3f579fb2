//! `classifier` — per-read k-mer database lookup, compact histograms and
//! spot collation (spec.md §6 CLI surface). Grounded on the teacher's
//! `src/bin/direct.rs`: parse args, load the hash structure once, drive
//! `read_parallel`/`run_pipeline` with a per-chunk classify closure, and
//! write results from the single ordered sink.

use classifier::args::{Args, DbSelector};
use classifier::collator::{SpotRow, TaxCollator};
use classifier::db::dbs::DbsDb;
use classifier::db::dbsm::DbsmDb;
use classifier::db::dbss::DbssDb;
use classifier::db::flat::FlatDb;
use classifier::db::DbStore;
use classifier::matcher::{Hits, Matcher, FLAT_HIT_MARKER};
use classifier::{ClassifierError, Result};
use clap::Parser;
use seqreads::{FastaReader, OrderingMode, Read as SeqRead, ReaderTransforms, SpotFilter};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    // spec's exit-code contract reserves 3 for "unknown error"; catch_unwind
    // turns an internal panic into that code instead of the default 101.
    let code = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(args))) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            log::error!("{e}");
            e.exit_code()
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("internal error: {message}");
            3
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> Result<()> {
    let selector = args.db_selector()?;
    let db = load_db(&selector)?;

    let contig_files = resolve_inputs(&args.input)?;
    if contig_files.len() > 1 && args.out.is_none() {
        return Err(ClassifierError::InvalidArgument(
            "--out postfix required for multiple input files".to_string(),
        ));
    }

    if args.unaligned_only {
        log::warn!("--unaligned-only has no effect: FASTA reads carry no alignment state");
    }

    let transforms = build_transforms(&args)?;

    if args.collate || args.compact {
        let mut collator = TaxCollator::new();
        for file in &contig_files {
            classify_file_into_collator(file, &db, &args, &transforms, &mut collator)?;
        }
        let collator = if args.collate {
            collator.collate()
        } else {
            collator
        };
        let mut out = open_output(&args.out, None)?;
        if args.compact {
            collator.write_compact(&mut out)?;
        } else {
            collator.write_rows(&mut out, args.hide_counts)?;
        }
        return Ok(());
    }

    for file in &contig_files {
        let out_path = output_path_for(&args.out, file, contig_files.len() > 1);
        let mut out = open_output(&args.out, out_path.as_deref())?;
        classify_file_to_writer(file, &db, &args, &transforms, &mut out)?;
    }
    Ok(())
}

fn load_db(selector: &DbSelector) -> Result<DbStore> {
    Ok(match selector {
        DbSelector::Flat(path) => DbStore::Flat(FlatDb::load(path)?),
        DbSelector::Tax(path) => DbStore::Tax(DbsDb::load(path)?),
        DbSelector::MultiTax(path) => DbStore::MultiTax(DbsmDb::load(path)?),
        DbSelector::SortedByTax { dbss, tax_list } => {
            let tax_list = load_tax_list(tax_list)?;
            DbStore::SortedByTax(DbssDb::load_restricted(dbss, &tax_list)?)
        }
    })
}

fn load_tax_list(path: &Path) -> Result<Vec<i32>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut tax_ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<i32>() {
            Ok(t) => tax_ids.push(t),
            Err(_) => log::warn!("skipping malformed tax_list line: {trimmed:?}"),
        }
    }
    Ok(tax_ids)
}

/// `.list`-suffixed input is a newline/whitespace-delimited list of paths to
/// process in turn; anything else is processed as a single contig file.
fn resolve_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.extension().and_then(|e| e.to_str()) != Some("list") {
        return Ok(vec![input.to_path_buf()]);
    }
    let text = std::fs::read_to_string(input)?;
    let files: Vec<PathBuf> = text.split_whitespace().map(PathBuf::from).collect();
    if files.is_empty() {
        return Err(ClassifierError::InvalidArgument(format!(
            "list file {input:?} contains no entries"
        )));
    }
    Ok(files)
}

fn build_transforms(args: &Args) -> Result<ReaderTransforms> {
    let spot_filter = match &args.spot_filter {
        Some(path) => {
            let ids = load_id_set(path)?;
            Some(if args.spot_filter_exclude {
                SpotFilter::exclude(ids)
            } else {
                SpotFilter::include(ids)
            })
        }
        None => None,
    };
    Ok(ReaderTransforms {
        spot_filter,
        split_on_n: args.split_on_n,
        stride: args.optimization_ultrafast_skip_reader,
    })
}

fn load_id_set(path: &Path) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.split_whitespace().map(str::to_string).collect())
}

fn output_path_for(out: &Option<PathBuf>, input: &Path, multi: bool) -> Option<PathBuf> {
    let out = out.as_ref()?;
    if multi {
        let mut name = input.as_os_str().to_os_string();
        name.push(out.as_os_str());
        Some(PathBuf::from(name))
    } else {
        Some(out.clone())
    }
}

fn open_output(out: &Option<PathBuf>, resolved: Option<&Path>) -> Result<Box<dyn Write>> {
    match resolved.or(out.as_deref()) {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(Box::new(BufWriter::new(std::io::stdout()))),
    }
}

fn ordering_mode(args: &Args) -> OrderingMode {
    if args.sort_order {
        OrderingMode::Sort
    } else if args.strict_order {
        OrderingMode::Strict
    } else {
        OrderingMode::Arrival
    }
}

fn build_matcher(db: &DbStore, args: &Args) -> Matcher<'_> {
    let matcher = Matcher::new(db);
    match args.max_lookups_per_fragment {
        Some(max) => matcher.with_max_lookups_per_fragment(max),
        None => matcher,
    }
}

/// Classifies every sub-read in a chunk and merges hits of sub-reads that
/// share an original spot id (produced by N-splitting), preserving the
/// order spot ids first appear in the chunk (spec.md §8 Scenario D).
fn classify_chunk(reads: &[SeqRead], matcher: &Matcher<'_>) -> Vec<(String, Hits)> {
    let mut order: Vec<String> = Vec::new();
    let mut by_spot: std::collections::HashMap<String, Hits> = std::collections::HashMap::new();

    for read in reads {
        let hits = matcher.classify(read);
        let entry = by_spot.entry(read.spot_id.clone()).or_insert_with(|| {
            order.push(read.spot_id.clone());
            Hits::new()
        });
        for (tax_id, count) in hits {
            *entry.entry(tax_id).or_insert(0) += count;
        }
    }

    order
        .into_iter()
        .map(|spot_id| {
            let hits = by_spot.remove(&spot_id).unwrap_or_default();
            (spot_id, hits)
        })
        .collect()
}

fn format_hit_line(spot_id: &str, hits: &Hits, hide_counts: bool) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let mut tax_ids: Vec<i32> = hits
        .keys()
        .copied()
        .filter(|&t| t != FLAT_HIT_MARKER)
        .collect();
    tax_ids.sort_unstable();

    let mut line = spot_id.to_string();
    for tax_id in tax_ids {
        let count = hits[&tax_id];
        if hide_counts || count <= 1 {
            line.push_str(&format!("\t{tax_id}"));
        } else {
            line.push_str(&format!("\t{tax_id}x{count}"));
        }
    }
    Some(line)
}

fn spot_row_from_hits(spot_id: &str, hits: &Hits) -> SpotRow {
    let mut row = SpotRow::new(spot_id);
    let mut tax_ids: Vec<i32> = hits
        .keys()
        .copied()
        .filter(|&t| t != FLAT_HIT_MARKER)
        .collect();
    tax_ids.sort_unstable();
    for tax_id in tax_ids {
        row.tax_ids.push(tax_id as u32);
        row.counts.push(hits[&tax_id] as u32);
    }
    row
}

fn classify_file_to_writer(
    path: &Path,
    db: &DbStore,
    args: &Args,
    transforms: &ReaderTransforms,
    out: &mut dyn Write,
) -> Result<()> {
    let mut reader = FastaReader::from_path(path)?;
    let matcher = build_matcher(db, args);
    let hide_counts = args.hide_counts;

    seqreads::run_pipeline(
        &mut reader,
        args.num_threads,
        transforms,
        ordering_mode(args),
        |reads: &[SeqRead]| classify_chunk(reads, &matcher),
        |(spot_id, hits): (String, Hits)| {
            if let Some(line) = format_hit_line(&spot_id, &hits, hide_counts) {
                let _ = writeln!(out, "{line}");
            }
        },
    )?;
    Ok(())
}

fn classify_file_into_collator(
    path: &Path,
    db: &DbStore,
    args: &Args,
    transforms: &ReaderTransforms,
    collator: &mut TaxCollator,
) -> Result<()> {
    let mut reader = FastaReader::from_path(path)?;
    let matcher = build_matcher(db, args);

    seqreads::run_pipeline(
        &mut reader,
        args.num_threads,
        transforms,
        ordering_mode(args),
        |reads: &[SeqRead]| classify_chunk(reads, &matcher),
        |(spot_id, hits): (String, Hits)| {
            if hits.is_empty() {
                return;
            }
            collator.add_row(&spot_row_from_hits(&spot_id, &hits));
        },
    )?;
    Ok(())
}
