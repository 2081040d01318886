use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ton_analysis::ordering::{build_index, lookup_hashes, OrderedSwap};
use ton_analysis::report::{build_report, AnalysisConfig, AnalysisReport, PairView};
use ton_analysis::stats::RateSummary;
use ton_analysis::{MevKind, Scope};
use ton_bundle::{build_records, FilterReport, VenueConfig};
use ton_data::blocks::{BlockCache, DEFAULT_PACING};
use ton_data::ndjson::{read_ndjson, write_ndjson};
use ton_data::store::Store;
use ton_data::tonapi::{PageOptions, TonApiClient};
use ton_data::RawTransaction;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Blocks listed in the "busy blocks" section.
const BUSY_BLOCKS_SHOWN: usize = 20;

#[derive(Debug, Clone)]
struct AppContext {
    db_path: String,
    fetch_blocks: bool,
}

#[derive(Parser, Debug)]
#[command(name = "ton-mev")]
#[command(about = "TON DEX swap bundling and MEV candidate analysis")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[arg(long, global = true, default_value = "data/ton-mev.sqlite")]
    db_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Page a venue account's history from TonAPI into the store.
    Fetch(FetchArgs),
    /// Correlate stored history into validated swap records.
    Bundle(BundleArgs),
    /// Bundle, place in blocks, scan for MEV candidates and report.
    Analyze(AnalyzeArgs),
    /// Show stored history and swap-record counts per venue.
    Status(StatusArgs),
}

/// Where transactions come from: the store, or an NDJSON dump.
#[derive(Args, Debug)]
struct SourceArgs {
    /// Venue: stonfi, dedust or tonco.
    #[arg(long)]
    venue: String,

    /// Account override (defaults to the venue's router/pool).
    #[arg(long)]
    account: Option<String>,

    /// Read transactions from an NDJSON file instead of the store.
    #[arg(long)]
    raw: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[arg(long)]
    venue: String,

    #[arg(long)]
    account: Option<String>,

    #[arg(long, default_value_t = 50)]
    limit: u32,

    #[arg(long, default_value_t = 20)]
    pages: u32,

    /// Start paging strictly below this logical time.
    #[arg(long)]
    before_lt: Option<u64>,

    /// Stop once transactions are older than this many minutes.
    #[arg(long)]
    max_age_mins: Option<u64>,

    /// Pause between pages.
    #[arg(long, default_value_t = 0.0)]
    sleep_secs: f64,

    /// Also dump the fetched transactions as NDJSON.
    #[arg(long)]
    raw_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BundleArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// NDJSON output for swap records.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Look up block locations (default from MEV_FETCH_BLOCKS, else on).
    #[arg(long, overrides_with = "no_fetch_blocks")]
    fetch_blocks: bool,

    #[arg(long, overrides_with = "fetch_blocks")]
    no_fetch_blocks: bool,

    /// Also scan adjacent blocks on the same shard.
    #[arg(long)]
    cross_block: bool,

    /// Largest seqno gap for the cross-block scan.
    #[arg(long, default_value_t = 1)]
    block_gap: u64,

    /// Entries shown in "closest to min_out".
    #[arg(long, default_value_t = 5)]
    top_n: usize,

    /// Output format: text (default) or json.
    #[arg(long, default_value = "text")]
    output: String,

    /// Save the report here in addition to stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// NDJSON output for the ordered swap records.
    #[arg(long)]
    records_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Limit to one venue.
    #[arg(long)]
    venue: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        db_path: cli.db_path,
        fetch_blocks: env_flag("MEV_FETCH_BLOCKS", true),
    };

    match cli.command {
        Commands::Fetch(args) => handle_fetch(&ctx, args).await,
        Commands::Bundle(args) => handle_bundle(&ctx, args),
        Commands::Analyze(args) => handle_analyze(&ctx, args).await,
        Commands::Status(args) => handle_status(&ctx, args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Reads a boolean environment flag (`1/true/yes/on`).
fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn resolve_venue(name: &str) -> Result<VenueConfig> {
    VenueConfig::by_name(name).ok_or_else(|| {
        eyre!(
            "unknown venue '{}'; use one of: {}",
            name,
            VenueConfig::names().join(", ")
        )
    })
}

fn open_store(ctx: &AppContext) -> Result<Store> {
    if let Some(parent) = Path::new(&ctx.db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
    }
    Store::new(&ctx.db_path).wrap_err("failed to open SQLite store")
}

fn load_transactions(
    ctx: &AppContext,
    venue: &VenueConfig,
    source: &SourceArgs,
) -> Result<Vec<RawTransaction>> {
    let txs = match &source.raw {
        Some(path) => read_ndjson(path)?,
        None => {
            let account = source.account.as_deref().unwrap_or(venue.account);
            open_store(ctx)?
                .load_raw_txs(account)
                .wrap_err_with(|| format!("failed to load stored history of {account}"))?
        }
    };

    if txs.is_empty() {
        return Err(eyre!(
            "no transactions for venue '{}'; run `fetch --venue {}` or pass --raw",
            venue.name,
            venue.name
        ));
    }
    info!(venue = venue.name, txs = txs.len(), "transactions loaded");
    Ok(txs)
}

async fn handle_fetch(ctx: &AppContext, args: FetchArgs) -> Result<()> {
    let venue = resolve_venue(&args.venue)?;
    let account = args.account.as_deref().unwrap_or(venue.account);
    if args.limit == 0 {
        return Err(eyre!("--limit must be positive"));
    }
    if !args.sleep_secs.is_finite() || args.sleep_secs < 0.0 {
        return Err(eyre!("--sleep-secs must be a non-negative number"));
    }

    let cutoff_utime = args.max_age_mins.map(|mins| {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        now.saturating_sub(mins.saturating_mul(60))
    });
    let opts = PageOptions {
        limit: args.limit,
        pages: args.pages,
        before_lt: args.before_lt,
        cutoff_utime,
        sleep: Duration::from_secs_f64(args.sleep_secs),
    };

    let client = TonApiClient::from_env()?;
    let txs = client
        .fetch_pages(account, &opts)
        .await
        .wrap_err_with(|| format!("failed to fetch history of {account}"))?;

    let store = open_store(ctx)?;
    let inserted = store
        .insert_raw_txs(account, &txs)
        .wrap_err("failed to store fetched transactions")?;
    if let Some(path) = &args.raw_out {
        write_ndjson(path, &txs)?;
    }
    let (min_lt, max_lt, stored) = store
        .get_lt_range(account)
        .wrap_err("failed to query stored range")?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Venue", venue.name]);
    table.add_row(vec!["Account", account]);
    table.add_row(vec!["Fetched", &txs.len().to_string()]);
    table.add_row(vec!["New", &inserted.to_string()]);
    table.add_row(vec!["Stored", &stored.to_string()]);
    table.add_row(vec!["Stored lt range", &format!("{min_lt} - {max_lt}")]);
    if let Some(path) = &args.raw_out {
        table.add_row(vec!["NDJSON", &path.display().to_string()]);
    }
    println!("{table}");

    info!(
        venue = venue.name,
        fetched = txs.len(),
        inserted,
        "fetch command completed"
    );
    Ok(())
}

fn persist_swaps(ctx: &AppContext, swaps: &[OrderedSwap]) -> Result<usize> {
    let rows = swaps
        .iter()
        .map(OrderedSwap::to_row)
        .collect::<Result<Vec<_>>>()?;
    open_store(ctx)?
        .insert_swap_records(&rows)
        .wrap_err("failed to store swap records")
}

fn handle_bundle(ctx: &AppContext, args: BundleArgs) -> Result<()> {
    let venue = resolve_venue(&args.source.venue)?;
    let txs = load_transactions(ctx, &venue, &args.source)?;

    let (records, filter) = build_records(&txs, &venue);
    let index = build_index(records, &venue, None);

    if let Some(path) = &args.out {
        write_ndjson(path, &index.swaps)?;
    }
    let stored = persist_swaps(ctx, &index.swaps)?;

    let mut emitter = Emitter::default();
    render_filter(&mut emitter, &filter);
    if let Some(path) = &args.out {
        emitter.emit(format!("Wrote {} swap records to {}", index.len(), path.display()));
    }

    info!(
        venue = venue.name,
        swaps = index.len(),
        stored,
        "bundle command completed"
    );
    Ok(())
}

async fn handle_analyze(ctx: &AppContext, args: AnalyzeArgs) -> Result<()> {
    let venue = resolve_venue(&args.source.venue)?;
    let json_output = match args.output.to_lowercase().as_str() {
        "text" | "table" => false,
        "json" => true,
        _ => {
            return Err(eyre!(
                "unknown output format '{}'; use 'text' or 'json'",
                args.output
            ))
        }
    };
    let fetch_blocks = if args.no_fetch_blocks {
        false
    } else {
        args.fetch_blocks || ctx.fetch_blocks
    };

    let txs = load_transactions(ctx, &venue, &args.source)?;
    let (records, filter) = build_records(&txs, &venue);

    let mut cache = BlockCache::new();
    if fetch_blocks {
        let client = TonApiClient::from_env()?;
        client
            .resolve_blocks(lookup_hashes(&records), &mut cache, DEFAULT_PACING)
            .await?;
    }

    let index = build_index(records, &venue, fetch_blocks.then_some(&cache));
    let config = AnalysisConfig {
        block_gap: args.block_gap,
        cross_block: args.cross_block,
        top_n: args.top_n,
    };
    let (_, report) = build_report(&index, &venue, filter, &config, fetch_blocks);

    if let Some(path) = &args.records_out {
        write_ndjson(path, &index.swaps)?;
    }

    let mut emitter = Emitter::default();
    if json_output {
        let body = serde_json::to_string_pretty(&report).wrap_err("failed to serialize report")?;
        emitter.emit(body);
    } else {
        render_report(&mut emitter, &report);
    }
    emitter.save(args.out.as_deref())?;

    info!(
        venue = venue.name,
        swaps = report.swaps,
        pairs = report.pairs.len(),
        fetch_blocks,
        "analyze command completed"
    );
    Ok(())
}

fn handle_status(ctx: &AppContext, args: StatusArgs) -> Result<()> {
    let venues = match &args.venue {
        Some(name) => vec![resolve_venue(name)?],
        None => VenueConfig::names()
            .iter()
            .filter_map(|name| VenueConfig::by_name(name))
            .collect(),
    };

    let store = open_store(ctx)?;
    let db_size_str = if ctx.db_path == ":memory:" {
        "N/A (in-memory)".to_string()
    } else {
        match std::fs::metadata(&ctx.db_path) {
            Ok(metadata) => format!("{} KB", metadata.len() / 1_000),
            Err(_) => "N/A (file not found)".to_string(),
        }
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Venue", "Raw Txs", "Lt Range", "Swap Records"]);
    for venue in &venues {
        let (min_lt, max_lt, count) = store
            .get_lt_range(venue.account)
            .wrap_err("failed to query stored range")?;
        let swaps = store
            .count_swap_records(venue.name)
            .wrap_err("failed to count swap records")?;
        let range = if count > 0 {
            format!("{min_lt} - {max_lt}")
        } else {
            "N/A".to_string()
        };
        table.add_row(vec![
            venue.name.to_string(),
            count.to_string(),
            range,
            swaps.to_string(),
        ]);
    }

    println!("Database: {} ({})", ctx.db_path, db_size_str);
    println!("{table}");
    Ok(())
}

/// Collects report lines while printing them, so the same text can be saved.
#[derive(Debug, Default)]
struct Emitter {
    lines: Vec<String>,
}

impl Emitter {
    fn emit(&mut self, line: impl Into<String>) {
        let line = line.into();
        println!("{line}");
        self.lines.push(line);
    }

    fn table(&mut self, table: &Table) {
        self.emit(table.to_string());
    }

    fn save(&mut self, path: Option<&Path>) -> Result<()> {
        let Some(path) = path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.lines.join("\n"))
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        self.emit(format!("\nSaved summary to {}", path.display()));
        Ok(())
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn fmt_rate(rate: Decimal) -> String {
    rate.round_dp(4).to_string()
}

fn render_filter(emitter: &mut Emitter, filter: &FilterReport) {
    emitter.emit("== Load & validity filter ==");
    emitter.emit(format!(
        "bundles={}, kept={}, dropped={}",
        filter.bundles,
        filter.kept,
        filter.dropped_total()
    ));
    if filter.dropped.is_empty() {
        return;
    }

    let mut reasons = Table::new();
    reasons.load_preset(UTF8_BORDERS_ONLY);
    reasons.set_header(vec!["Reason", "Dropped"]);
    for (reason, count) in &filter.dropped {
        reasons.add_row(vec![reason.to_string(), count.to_string()]);
    }
    emitter.table(&reasons);

    emitter.emit(format!("Dropped samples (up to {}):", filter.samples.len()));
    for sample in &filter.samples {
        let opt = |value: Option<Decimal>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
        emitter.emit(format!(
            "  reason={} dir={:?} rate={} qid={} in={} out={}",
            sample.exclusion.label(),
            sample.direction,
            opt(sample.rate),
            sample.query_id,
            opt(sample.in_amount),
            opt(sample.out_amount),
        ));
    }
}

fn summary_row(label: &str, summary: &RateSummary) -> Vec<String> {
    vec![
        label.to_string(),
        summary.count.to_string(),
        format!("{:.6}", summary.min),
        format!("{:.6}", summary.max),
        format!("{:.6}", summary.median),
        format!("{:.6}", summary.mean),
        format!("{:.6}", summary.stdev),
    ]
}

fn render_pairs(emitter: &mut Emitter, title: &str, pairs: &[&PairView]) {
    emitter.emit(format!("\n== {title} =="));
    emitter.emit(format!("count: {}", pairs.len()));
    if pairs.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "dt (s)",
        "Gap",
        "Leading qid",
        "Tx",
        "Dir",
        "rate1000",
        "Following qid",
        "Tx",
        "Dir",
        "rate1000",
    ]);
    for pair in pairs {
        table.add_row(vec![
            pair.dt_secs.to_string(),
            pair.seqno_gap.map_or_else(|| "-".to_string(), |g| g.to_string()),
            pair.leading.query_id.clone(),
            short_hash(&pair.leading.tx_hash).to_string(),
            pair.leading.direction_label.clone(),
            fmt_rate(pair.leading.rate1000),
            pair.following.query_id.clone(),
            short_hash(&pair.following.tx_hash).to_string(),
            pair.following.direction_label.clone(),
            fmt_rate(pair.following.rate1000),
        ]);
    }
    emitter.table(&table);
}

fn render_report(emitter: &mut Emitter, report: &AnalysisReport) {
    render_filter(emitter, &report.filter);

    match report.placed {
        Some(placed) => emitter.emit(format!(
            "(block lookup on: {placed}/{} swaps placed in {} blocks)",
            report.swaps, report.blocks
        )),
        None => emitter.emit(
            "(block lookup off; set MEV_FETCH_BLOCKS=true or pass --fetch-blocks)",
        ),
    }

    emitter.emit("\n== Scaled rate (rate1000) by direction ==");
    let mut rates = Table::new();
    rates.load_preset(UTF8_BORDERS_ONLY);
    rates.set_header(vec!["Direction", "Count", "Min", "Max", "Median", "Mean", "Stdev"]);
    for (label, summary) in &report.by_direction {
        rates.add_row(summary_row(label, summary));
    }
    if let Some(overall) = &report.overall {
        rates.add_row(summary_row("overall", overall));
    }
    emitter.table(&rates);

    let coverage = &report.min_out;
    emitter.emit("\n== min_out coverage (actual_out vs min_out) ==");
    emitter.emit(format!(
        "with_min_out: {}, missing_or_invalid: {}",
        coverage.with_min_out, coverage.missing_or_invalid
    ));
    if let Some(hit) = &coverage.hit_pct {
        emitter.emit(format!(
            "hit_pct stats (min_out/actual_out * 100): \
             min={:.4}, max={:.4}, median={:.4}, mean={:.4}",
            hit.min, hit.max, hit.median, hit.mean
        ));
        let mut closest = Table::new();
        closest.load_preset(UTF8_BORDERS_ONLY);
        closest.set_header(vec!["Query id", "Dir", "Lt", "Hit %", "min_out", "Actual out"]);
        for entry in &coverage.closest {
            closest.add_row(vec![
                entry.query_id.clone(),
                entry.direction_label.clone(),
                entry.lt.to_string(),
                format!("{:.4}", entry.hit_pct),
                entry.min_out.to_string(),
                entry.out_amount.to_string(),
            ]);
        }
        emitter.emit("Top swaps closest to min_out (desc by hit_pct)");
        emitter.table(&closest);
    }

    let pairs = |kind, scope| report.pairs_of(kind, scope).collect::<Vec<_>>();
    render_pairs(
        emitter,
        "Adjacent frontrun candidates (no block consideration)",
        &pairs(MevKind::Frontrun, Scope::Global),
    );
    render_pairs(
        emitter,
        "Adjacent backrun candidates (no block consideration)",
        &pairs(MevKind::Backrun, Scope::Global),
    );

    if report.placed.is_none() {
        return;
    }

    emitter.emit("\n== Blocks with multiple swaps ==");
    emitter.emit(format!(
        "blocks_with_swaps: {}, blocks_with_multiple_swaps: {}",
        report.blocks,
        report.busy_blocks.len()
    ));
    for block in report.busy_blocks.iter().take(BUSY_BLOCKS_SHOWN) {
        emitter.emit(format!(
            "block={} count={} qids={:?} primary_lt={:?} dirs={:?}",
            block.block,
            block.query_ids.len(),
            block.query_ids,
            block.primary_lts,
            block.directions
        ));
    }

    render_pairs(
        emitter,
        "Same-block frontrun candidates",
        &pairs(MevKind::Frontrun, Scope::SameBlock),
    );
    render_pairs(
        emitter,
        "Same-block backrun candidates",
        &pairs(MevKind::Backrun, Scope::SameBlock),
    );

    if report.cross_block_enabled {
        let gap = report.block_gap;
        render_pairs(
            emitter,
            &format!("Cross-block frontrun candidates (0 < block gap <= {gap}, same shard)"),
            &pairs(MevKind::Frontrun, Scope::CrossBlock),
        );
        render_pairs(
            emitter,
            &format!("Cross-block backrun candidates (0 < block gap <= {gap}, same shard)"),
            &pairs(MevKind::Backrun, Scope::CrossBlock),
        );
    } else {
        emitter.emit("\n(cross-block scan disabled; use --cross-block to enable)");
    }
}
