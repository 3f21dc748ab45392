//! rustmp - mass photometry analysis from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use mpcore::simulation::equilibrium::{ComplexFormation, MonomerDimer};
use mpcore::{EventDataset, Quantity};
use rustmp::config::AnalysisConfig;
use rustmp::error::Result;
use rustmp::io::export::{write_events_csv, write_session_logbooks, write_tables_csv};
use rustmp::{BatchRunner, PropertyKind, Property, SessionError};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliQuantity {
    Mass,
    Contrast,
}

impl From<CliQuantity> for Quantity {
    fn from(q: CliQuantity) -> Self {
        match q {
            CliQuantity::Mass => Quantity::Mass,
            CliQuantity::Contrast => Quantity::Contrast,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Model {
    /// 2M <-> D
    MonomerDimer,
    /// A + B <-> AB
    Complex,
}

#[derive(Parser)]
#[command(name = "rustmp")]
#[command(author, version, about = "Mass photometry histogram fitting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Histogram, detect peaks, fit and summarize one or more event files
    Analyze {
        /// Event files (.csv or .json)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// JSON analysis config; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum)]
        quantity: Option<CliQuantity>,

        #[arg(long)]
        bin_width: Option<f64>,

        /// Histogram window as LOW HIGH
        #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"], allow_negative_numbers = true)]
        window: Option<Vec<f64>>,

        #[arg(long)]
        min_height: Option<f64>,

        /// In bins
        #[arg(long, allow_negative_numbers = true)]
        min_distance: Option<i64>,

        #[arg(long)]
        prominence: Option<f64>,

        /// Use these component centers instead of peak detection
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        peaks: Option<Vec<f64>>,

        #[arg(long)]
        mean_tolerance: Option<f64>,

        #[arg(long)]
        std_tolerance: Option<f64>,

        /// Worker threads, 0 = one per core
        #[arg(short, long)]
        threads: Option<usize>,

        /// Write all fit tables to this CSV file
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write one <session>.<index>.logbook.json per session into this directory
        #[arg(long)]
        logbook_dir: Option<PathBuf>,
    },

    /// Write a synthetic run of a binding equilibrium as CSV
    Simulate {
        #[arg(value_enum)]
        model: Model,

        /// Total concentration in M (monomer, or B for complex formation)
        #[arg(short, long)]
        concentration: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(short, long)]
        output: PathBuf,
    },
}

struct Overrides {
    quantity: Option<CliQuantity>,
    bin_width: Option<f64>,
    window: Option<Vec<f64>>,
    min_height: Option<f64>,
    min_distance: Option<i64>,
    prominence: Option<f64>,
    peaks: Option<Vec<f64>>,
    mean_tolerance: Option<f64>,
    std_tolerance: Option<f64>,
    threads: Option<usize>,
}

impl Overrides {
    fn apply(self, cfg: &mut AnalysisConfig) {
        if let Some(q) = self.quantity {
            cfg.histogram.quantity = q.into();
        }
        if let Some(w) = self.bin_width {
            cfg.histogram.bin_width = w;
        }
        if let Some(w) = self.window {
            // clap guarantees exactly two values
            cfg.histogram.window = Some((w[0], w[1]));
        }
        if let Some(h) = self.min_height {
            cfg.peaks.min_height = h;
        }
        if let Some(d) = self.min_distance {
            cfg.peaks.min_distance = d;
        }
        if let Some(p) = self.prominence {
            cfg.peaks.prominence = p;
        }
        if self.peaks.is_some() {
            cfg.manual_peaks = self.peaks;
        }
        if self.mean_tolerance.is_some() {
            cfg.fit.mean_tolerance = self.mean_tolerance;
        }
        if self.std_tolerance.is_some() {
            cfg.fit.std_tolerance = self.std_tolerance;
        }
        if let Some(t) = self.threads {
            cfg.threads = t;
        }
    }
}

fn analyze(
    files: &[PathBuf],
    config: AnalysisConfig,
    out: Option<&Path>,
    logbook_dir: Option<&Path>,
) -> Result<usize> {
    let mut runner = BatchRunner::new(config.threads)?;
    runner.import_files(files);
    if runner.is_empty() {
        return Err(SessionError::NothingImported(files.len()));
    }

    for op in config.pipeline() {
        runner.apply_to_all(&op);
    }

    for (session, table) in runner.sessions().iter().zip(runner.get_properties(PropertyKind::FitResultTable)) {
        match table {
            Some(Property::FitResultTable(t)) => println!("== {} ==\n{t}", session.name),
            _ => println!("== {} ==\n  no fit table ({})\n", session.name, session.stage()),
        }
    }

    if let Some(path) = out {
        write_tables_csv(path, &runner.summary_rows())?;
    }
    if let Some(dir) = logbook_dir {
        write_session_logbooks(dir, runner.sessions())?;
    }

    let summarized = runner.get_properties(PropertyKind::FitResultTable).iter().filter(|t| t.is_some()).count();
    Ok(summarized)
}

fn simulate(model: Model, concentration: f64, seed: u64, output: &Path) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let masses = match model {
        Model::MonomerDimer => MonomerDimer::default().simulate(concentration, &mut rng)?,
        Model::Complex => ComplexFormation::default().simulate(concentration, &mut rng)?,
    };
    let name = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let dataset = EventDataset::new(&name, Some(masses), None)?;
    write_events_csv(output, &dataset)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Analyze {
            files,
            config,
            quantity,
            bin_width,
            window,
            min_height,
            min_distance,
            prominence,
            peaks,
            mean_tolerance,
            std_tolerance,
            threads,
            out,
            logbook_dir,
        } => {
            let base = match config {
                Some(path) => AnalysisConfig::from_json_file(&path),
                None => Ok(AnalysisConfig::default()),
            };
            base.and_then(|mut cfg| {
                Overrides {
                    quantity,
                    bin_width,
                    window,
                    min_height,
                    min_distance,
                    prominence,
                    peaks,
                    mean_tolerance,
                    std_tolerance,
                    threads,
                }
                .apply(&mut cfg);
                let n_files = files.len();
                analyze(&files, cfg, out.as_deref(), logbook_dir.as_deref()).map(|n| {
                    log::info!("{n} of {n_files} files summarized");
                    n > 0
                })
            })
        }
        Commands::Simulate { model, concentration, seed, output } => {
            simulate(model, concentration, seed, &output).map(|()| true)
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            log::error!("no session produced a fit table");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
