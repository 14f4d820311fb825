use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod aggregate;
mod cluster;
mod config;
mod merge;
mod models;
mod priority;
mod report;
mod tables;

use config::{
    Paths, DEFAULT_K_MAX, DEFAULT_K_MIN, DEFAULT_SEED, DEFAULT_TOP_K_GLOBAL,
    DEFAULT_TOP_K_PER_COUNTRY,
};

#[derive(Parser)]
#[command(name = "heating-hotspot-pipeline")]
#[command(
    about = "Batch pipeline ranking onsite-fuel heating hotspots for electrification planning",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a raw emission-source export by (country, region)
    Aggregate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Outer-join residential and non-residential aggregates into one hotspot table
    Merge {
        #[arg(long)]
        residential: PathBuf,
        #[arg(long)]
        non_residential: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Score hotspots and write global and per-country top-K tables
    Score {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        global_out: PathBuf,
        #[arg(long)]
        by_country_out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOP_K_GLOBAL)]
        top_k_global: usize,
        #[arg(long, default_value_t = DEFAULT_TOP_K_PER_COUNTRY)]
        top_k_per_country: usize,
    },
    /// Cluster hotspots into archetypes and summarize each cluster
    Cluster {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        clustered_out: PathBuf,
        #[arg(long)]
        summary_out: PathBuf,
        #[arg(long, default_value_t = DEFAULT_K_MIN)]
        k_min: usize,
        #[arg(long, default_value_t = DEFAULT_K_MAX)]
        k_max: usize,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Rank countries by total emissions from a country-emissions export
    RankCountries {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run every stage in dependency order, skipping already-completed work
    Run {
        #[arg(long)]
        residential: PathBuf,
        #[arg(long)]
        non_residential: PathBuf,
        /// Country-emissions exports to rank (repeatable)
        #[arg(long)]
        country_file: Vec<PathBuf>,
        #[arg(long, default_value = "outputs/tables")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOP_K_GLOBAL)]
        top_k_global: usize,
        #[arg(long, default_value_t = DEFAULT_TOP_K_PER_COUNTRY)]
        top_k_per_country: usize,
        #[arg(long, default_value_t = DEFAULT_K_MIN)]
        k_min: usize,
        #[arg(long, default_value_t = DEFAULT_K_MAX)]
        k_max: usize,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Render a markdown summary over the pipeline outputs
    Report {
        #[arg(long, default_value = "outputs/tables")]
        tables_dir: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate { input, out } => {
            let rows = aggregate::aggregate_file(&input)?;
            tables::write_rows(&out, &rows)?;
            println!("Saved hotspots: {}", out.display());
        }
        Commands::Merge {
            residential,
            non_residential,
            out,
        } => {
            let res = tables::read_geometry_aggregates(&residential)?;
            let nonres = tables::read_geometry_aggregates(&non_residential)?;
            let merged = merge::merge_hotspot_tables(&res, &nonres);
            tables::write_rows(&out, &merged)?;
            println!("Saved combined hotspots: {}", out.display());
        }
        Commands::Score {
            input,
            global_out,
            by_country_out,
            top_k_global,
            top_k_per_country,
        } => {
            let rows = tables::read_combined_hotspots(&input)?;
            let scored = priority::compute_priority_scores(&rows, top_k_global, top_k_per_country);
            tables::write_rows(&global_out, &scored.global_top)?;
            tables::write_rows(&by_country_out, &scored.by_country_top)?;
            println!("Saved priority scores (global): {}", global_out.display());
            println!(
                "Saved priority scores (per country): {}",
                by_country_out.display()
            );
        }
        Commands::Cluster {
            input,
            clustered_out,
            summary_out,
            k_min,
            k_max,
            seed,
        } => {
            let rows = tables::read_combined_hotspots(&input)?;
            let clustered =
                cluster::cluster_hotspots(&rows, &cluster::ClusterConfig { k_min, k_max, seed })?;
            tables::write_rows(&clustered_out, &clustered.clustered)?;
            tables::write_rows(&summary_out, &clustered.summary)?;
            println!("Saved clustered hotspots: {}", clustered_out.display());
            println!("Saved cluster summary: {}", summary_out.display());
        }
        Commands::RankCountries { input, out } => {
            let rows = aggregate::rank_countries_file(&input)?;
            tables::write_rows(&out, &rows)?;
            println!("Saved country ranking: {}", out.display());
        }
        Commands::Run {
            residential,
            non_residential,
            country_file,
            out_dir,
            top_k_global,
            top_k_per_country,
            k_min,
            k_max,
            seed,
        } => {
            run_pipeline(RunArgs {
                residential,
                non_residential,
                country_files: country_file,
                paths: Paths::new(out_dir),
                top_k_global,
                top_k_per_country,
                cluster: cluster::ClusterConfig { k_min, k_max, seed },
            });
            println!("Done.");
        }
        Commands::Report { tables_dir, out } => {
            let paths = Paths::new(tables_dir);
            let mut cache = report::TableCache::new();
            let rendered = report::build_report(&mut cache, &paths)?;
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

struct RunArgs {
    residential: PathBuf,
    non_residential: PathBuf,
    country_files: Vec<PathBuf>,
    paths: Paths,
    top_k_global: usize,
    top_k_per_country: usize,
    cluster: cluster::ClusterConfig,
}

/// Sequence the stages in dependency order within one invocation.
///
/// A stage is skipped when its output already exists or when a required
/// input artifact is missing; a failing stage is reported and the run
/// moves on, so downstream stages skip on the missing artifact instead
/// of crashing the whole run.
fn run_pipeline(args: RunArgs) {
    let aggregates = [
        (
            "residential",
            &args.residential,
            args.paths.residential_aggregate(),
        ),
        (
            "non-residential",
            &args.non_residential,
            args.paths.non_residential_aggregate(),
        ),
    ];
    for (label, input, output) in &aggregates {
        if output.exists() {
            println!("Aggregate exists, skipping: {}", output.display());
        } else if !input.exists() {
            println!(
                "Skipping {label} aggregation (missing input): {}",
                input.display()
            );
        } else {
            run_stage(|| {
                let rows = aggregate::aggregate_file(input)?;
                tables::write_rows(output, &rows)?;
                println!("Saved hotspots: {}", output.display());
                Ok(())
            });
        }
    }

    let combined = args.paths.combined_hotspots();
    let res_aggregate = args.paths.residential_aggregate();
    let nonres_aggregate = args.paths.non_residential_aggregate();
    if combined.exists() {
        println!("Combined hotspots exist, skipping: {}", combined.display());
    } else if !res_aggregate.exists() || !nonres_aggregate.exists() {
        println!("Skipping combined hotspots (one of the hotspot CSVs is missing).");
    } else {
        run_stage(|| {
            let res = tables::read_geometry_aggregates(&res_aggregate)?;
            let nonres = tables::read_geometry_aggregates(&nonres_aggregate)?;
            let merged = merge::merge_hotspot_tables(&res, &nonres);
            tables::write_rows(&combined, &merged)?;
            println!("Saved combined hotspots: {}", combined.display());
            Ok(())
        });
    }

    let global_out = args.paths.priority_global();
    let by_country_out = args.paths.priority_by_country();
    if global_out.exists() && by_country_out.exists() {
        println!("Priority tables exist, skipping: {}", global_out.display());
    } else if !combined.exists() {
        println!("Skipping priority scores (missing combined hotspots CSV).");
    } else {
        run_stage(|| {
            let rows = tables::read_combined_hotspots(&combined)?;
            let scored =
                priority::compute_priority_scores(&rows, args.top_k_global, args.top_k_per_country);
            tables::write_rows(&global_out, &scored.global_top)?;
            tables::write_rows(&by_country_out, &scored.by_country_top)?;
            println!("Saved priority scores (global): {}", global_out.display());
            println!(
                "Saved priority scores (per country): {}",
                by_country_out.display()
            );
            Ok(())
        });
    }

    let clustered_out = args.paths.clustered_hotspots();
    let summary_out = args.paths.cluster_summary();
    if clustered_out.exists() && summary_out.exists() {
        println!(
            "Clustered hotspots exist, skipping: {}",
            clustered_out.display()
        );
    } else if !combined.exists() {
        println!("Skipping clustering (missing combined hotspots CSV).");
    } else {
        run_stage(|| {
            let rows = tables::read_combined_hotspots(&combined)?;
            let clustered = cluster::cluster_hotspots(&rows, &args.cluster)?;
            tables::write_rows(&clustered_out, &clustered.clustered)?;
            tables::write_rows(&summary_out, &clustered.summary)?;
            println!("Saved clustered hotspots: {}", clustered_out.display());
            println!("Saved cluster summary: {}", summary_out.display());
            Ok(())
        });
    }

    for input in &args.country_files {
        let output = args.paths.country_ranking(input);
        if output.exists() {
            println!("Country ranking exists, skipping: {}", output.display());
        } else if !input.exists() {
            println!("Skipping ranking (missing input): {}", input.display());
        } else {
            run_stage(|| {
                let rows = aggregate::rank_countries_file(input)?;
                tables::write_rows(&output, &rows)?;
                println!("Saved country ranking: {}", output.display());
                Ok(())
            });
        }
    }
}

fn run_stage(stage: impl FnOnce() -> anyhow::Result<()>) {
    if let Err(err) = stage() {
        eprintln!("Stage failed: {err:#}");
    }
}
