use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use kvingest::core::compute_stats_for_entries;
use kvingest::sst::read_entries;
use kvingest::{
    EvalContext, EvalResult, IngestRequest, IngestSettings, MemEngine, MvccKey, SnapshotManager,
    Span, SstWriter, Timestamp,
};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kvingest")]
#[command(about = "Build sorted MVCC files and ingest them into a key range")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a file from JSON lines of {"key", "ts", "logical", "value"}
    Build {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the entries and stats of a file
    Inspect {
        #[arg(long)]
        file: PathBuf,
    },
    /// Evaluate and apply an ingestion against a range snapshot
    Ingest {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Request wall time; defaults to the current time
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long)]
        sst_timestamp: Option<i64>,
        #[arg(long)]
        write_at_request_timestamp: bool,
        #[arg(long)]
        disallow_conflicts: bool,
        #[arg(long)]
        disallow_shadowing: bool,
        #[arg(long)]
        disallow_shadowing_below: Option<i64>,
        #[arg(long)]
        as_writes: bool,
        #[arg(long)]
        max_intents: Option<usize>,
    },
    /// Recompute exact stats for a range snapshot
    Recompute {
        #[arg(long)]
        store: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct InputEntry {
    key: String,
    #[serde(default)]
    ts: i64,
    #[serde(default)]
    logical: i32,
    value: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kvingest=warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Build { input, output } => build(&input, &output),
        Command::Inspect { file } => inspect(&file),
        Command::Ingest {
            store,
            file,
            start,
            end,
            timestamp,
            sst_timestamp,
            write_at_request_timestamp,
            disallow_conflicts,
            disallow_shadowing,
            disallow_shadowing_below,
            as_writes,
            max_intents,
        } => {
            let data = fs::read(&file)
                .with_context(|| format!("Failed to read file '{}'", file.display()))?;
            let timestamp = timestamp.map(Timestamp::from_wall).unwrap_or_else(Timestamp::now);
            let mut req = IngestRequest::new(Span::new(start, end), data, timestamp);
            req.sst_timestamp = sst_timestamp.map(Timestamp::from_wall);
            req.write_at_request_timestamp = write_at_request_timestamp;
            req.disallow_conflicts = disallow_conflicts;
            req.disallow_shadowing = disallow_shadowing;
            req.disallow_shadowing_below = disallow_shadowing_below.map(Timestamp::from_wall);
            req.ingest_as_writes = as_writes;

            let mut settings = IngestSettings::from_env()?;
            if let Some(max) = max_intents {
                settings = settings.max_intents(max);
            }
            ingest(&store, &req, settings)
        }
        Command::Recompute { store } => recompute(&store),
    }
}

fn build(input: &Path, output: &Path) -> Result<()> {
    let reader = BufReader::new(
        fs::File::open(input)
            .with_context(|| format!("Failed to open input '{}'", input.display()))?,
    );

    let mut entries = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: InputEntry = serde_json::from_str(&line)
            .with_context(|| format!("Invalid entry on line {}", line_no + 1))?;
        let key = MvccKey::new(entry.key.into_bytes(), Timestamp::new(entry.ts, entry.logical));
        entries.push((key, entry.value.into_bytes()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut writer = SstWriter::new();
    for (key, value) in entries {
        writer.put(key, &value)?;
    }
    let count = writer.entry_count();
    let data = writer.finish();
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory '{}'", parent.display()))?;
    }
    fs::write(output, &data)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    println!("Wrote {} entries ({} bytes) to {}", count, data.len(), output.display());
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let data =
        fs::read(file).with_context(|| format!("Failed to read file '{}'", file.display()))?;
    let entries = read_entries(&data)?;
    for (key, value) in &entries {
        println!("{} => {}", key, String::from_utf8_lossy(value));
    }
    let stats = compute_stats_for_entries(entries.iter().map(|(k, v)| (k, v.as_slice())), 0);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn ingest(store: &Path, req: &IngestRequest, settings: IngestSettings) -> Result<()> {
    let snapshots = SnapshotManager::new(store);
    let mut engine = snapshots.load()?.unwrap_or_else(MemEngine::new);

    let ctx = EvalContext::new(settings);
    let outcome = match kvingest::ingest(&ctx, &mut engine, req) {
        Ok(outcome) => outcome,
        Err(err) if err.is_conflict() => bail!("ingestion rejected: {}", err),
        Err(err) => return Err(anyhow!(err)).context("ingestion failed"),
    };
    snapshots.save(&engine)?;

    let result = match &outcome.result {
        EvalResult::Replicated(r) => json!({ "kind": "replicated", "bytes": r.data.len(), "crc32": r.crc32 }),
        EvalResult::Local(l) => json!({ "kind": "local", "add_sst_as_writes": l.metrics.add_sst_as_writes }),
    };
    let report = json!({
        "result": result,
        "stats": outcome.stats,
        "range_stats": engine.range_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn recompute(store: &Path) -> Result<()> {
    let snapshots = SnapshotManager::new(store);
    let mut engine = snapshots
        .load()?
        .ok_or_else(|| anyhow!("No range snapshot at '{}'", store.display()))?;
    let stats = engine.recompute_stats(Timestamp::now().wall_time);
    snapshots.save(&engine)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
