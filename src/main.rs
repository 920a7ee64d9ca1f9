//! Toy search index: maps terms to per-document presence bitmaps.
//!
//! Each bitmap is a string of `0`/`1` characters, one per document. The index
//! stores them as opaque values; only this harness checks their shape.

use anyhow::{bail, Context, Result};
use btree_index::BTree;
use clap::Parser;
use std::io::{self, Write};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Terms indexed before any `--put`. Broccoli shows up in documents 1 and 5, so
/// its second posting carries the updated bitmap.
const SAMPLE_POSTINGS: &[(&str, &str)] = &[
    ("apple", "10000000"),
    ("broccoli", "10000000"),
    ("orange", "01000000"),
    ("cucumber", "00100000"),
    ("carrot", "00010000"),
    ("artichoke", "00010000"),
    ("broccoli", "10001000"),
];

const DEFAULT_QUERIES: &[&str] = &["broccoli", "apple", "orange", "carrot"];

/// Build a term index over document bitmaps and query it
#[derive(Parser, Debug)]
#[command(name = "searchengine")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra posting to index, as TERM=BITMAP
    #[arg(long = "put", value_name = "TERM=BITMAP")]
    postings: Vec<String>,

    /// Term to look up (defaults to a few sample terms)
    #[arg(long = "query", value_name = "TERM")]
    queries: Vec<String>,

    /// Skip the built-in sample postings
    #[arg(long)]
    no_sample: bool,

    /// Number of documents each bitmap covers
    #[arg(long, default_value_t = 8)]
    width: usize,

    /// Node fan-out of the index
    #[arg(long, default_value_t = btree_index::DEFAULT_FANOUT)]
    fanout: usize,

    /// Print the index structure
    #[arg(long)]
    dump: bool,

    /// Log node splits and root growth
    #[arg(short, long)]
    verbose: bool,
}

fn parse_posting(raw: &str, width: usize) -> Result<(String, String)> {
    let (term, bitmap) = raw
        .split_once('=')
        .with_context(|| format!("posting `{raw}` is not of the form TERM=BITMAP"))?;
    if term.is_empty() {
        bail!("posting `{raw}` has an empty term");
    }
    check_bitmap(bitmap, width).with_context(|| format!("invalid posting `{raw}`"))?;
    Ok((term.to_string(), bitmap.to_string()))
}

fn check_bitmap(bitmap: &str, width: usize) -> Result<()> {
    if bitmap.len() != width {
        bail!("bitmap `{bitmap}` covers {} documents, expected {width}", bitmap.len());
    }
    if let Some(c) = bitmap.chars().find(|c| !matches!(c, '0' | '1')) {
        bail!("bitmap `{bitmap}` contains `{c}`; only 0 and 1 are allowed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::TRACE } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let stdout = io::stdout();
    run(&cli, &mut stdout.lock())
}

/// Builds the index described by `cli` and writes the query report to `out`.
fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    if cli.width == 0 {
        bail!("--width must be at least 1");
    }

    let mut postings = Vec::new();
    if !cli.no_sample {
        for (term, bitmap) in SAMPLE_POSTINGS {
            check_bitmap(bitmap, cli.width)
                .with_context(|| format!("sample posting for `{term}`; pass --no-sample"))?;
            postings.push((term.to_string(), bitmap.to_string()));
        }
    }
    for raw in &cli.postings {
        postings.push(parse_posting(raw, cli.width)?);
    }

    let mut index: BTree<String, String> = BTree::with_fanout(cli.fanout)?;
    for (term, bitmap) in postings {
        if let Some(previous) = index.put(term.clone(), bitmap) {
            tracing::debug!(%term, %previous, "replaced posting");
        }
    }
    tracing::info!(terms = index.len(), height = index.height(), "index built");

    let queries: Vec<&str> = if cli.queries.is_empty() {
        DEFAULT_QUERIES.to_vec()
    } else {
        cli.queries.iter().map(String::as_str).collect()
    };
    let pad = queries.iter().map(|q| q.len()).max().unwrap_or(0);
    for term in queries {
        let found = index.get(term).map(String::as_str).unwrap_or("not indexed");
        writeln!(out, "{term:<pad$} document offsets : {found}")?;
    }

    writeln!(out, "size:    {}", index.size())?;
    writeln!(out, "height:  {}", index.height())?;

    if cli.dump {
        write!(out, "{}", index.dump())?;
    }

    Ok(())
}
