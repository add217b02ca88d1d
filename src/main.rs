use clap::Parser;
use hyperscan::config::{ScanConfig, DEFAULT_LEN, DEFAULT_MAX_VALUE};
use hyperscan::data;
use hyperscan::driver::{self, RankReport};
use hyperscan::exchange::ExchangeMode;
use hyperscan::output;
use hyperscan::partition::PartitionPolicy;
use hyperscan::topology::PaddingPolicy;
use hyperscan::verify::ReporterRank;
use std::io;

/// Distributed prefix sum over a hypercube exchange topology
#[derive(Parser)]
#[command(name = "hyperscan", version)]
struct Cli {
    /// Number of ranks in the in-process group
    #[arg(short = 'n', long, default_value_t = 4)]
    ranks: usize,

    /// Global array length
    #[arg(long, default_value_t = DEFAULT_LEN)]
    len: usize,

    /// Seed for the data generator
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Elements are drawn from 0..MAX_VALUE
    #[arg(long, default_value_t = DEFAULT_MAX_VALUE)]
    max_value: i64,

    /// Rank that owns the source array
    #[arg(long, default_value_t = 0)]
    root: usize,

    #[arg(long, value_enum, default_value_t = PartitionPolicy::Remainder)]
    partition: PartitionPolicy,

    #[arg(long, value_enum, default_value_t = PaddingPolicy::Backfill)]
    padding: PaddingPolicy,

    /// Rank that prints the verification report
    #[arg(long, value_enum, default_value_t = ReporterRank::First)]
    reporter: ReporterRank,

    /// Compute the global sum only, without rank prefixes
    #[arg(long)]
    reduce_only: bool,

    /// Print one CSV row per rank to stdout
    #[arg(long)]
    csv: bool,

    /// Print exchange stats to stderr
    #[arg(long)]
    stats: bool,

    /// Run under MPI instead of an in-process group (ignores --ranks)
    #[cfg(feature = "distributed")]
    #[arg(long)]
    mpi: bool,
}

impl Cli {
    fn config(&self) -> ScanConfig {
        ScanConfig {
            len: self.len,
            seed: self.seed,
            max_value: self.max_value,
            root: self.root,
            partition: self.partition,
            padding: self.padding,
            reporter: self.reporter,
            mode: if self.reduce_only {
                ExchangeMode::Reduce
            } else {
                ExchangeMode::Scan
            },
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();

    #[cfg(feature = "distributed")]
    if cli.mpi {
        std::process::exit(run_mpi(&cli, &config));
    }

    let data = data::generate(config.len, config.seed, config.max_value).unwrap_or_else(|e| {
        eprintln!("Data error: {}", e);
        std::process::exit(1);
    });
    let reports = driver::run_local(&config, cli.ranks, &data).unwrap_or_else(|e| {
        eprintln!("Scan error: {}", e);
        std::process::exit(e.abort_code());
    });

    std::process::exit(emit(&cli, &reports));
}

/// Print whatever this process holds; returns the exit code.
fn emit(cli: &Cli, reports: &[RankReport]) -> i32 {
    let mut stderr = io::stderr();
    let mut passed = true;

    for verification in reports.iter().filter_map(|r| r.verification.as_ref()) {
        passed &= verification.is_match();
        output::write_report(verification, &mut stderr).unwrap_or_else(|e| {
            eprintln!("Output error: {}", e);
            std::process::exit(1);
        });
    }

    if cli.csv {
        output::write_ranks_csv(reports, &mut io::stdout()).unwrap_or_else(|e| {
            eprintln!("Output error: {}", e);
            std::process::exit(1);
        });
    }

    if cli.stats {
        let stats: Vec<_> = reports.iter().map(|r| r.stats.clone()).collect();
        output::write_stats(&stats, &mut stderr).unwrap_or_else(|e| {
            eprintln!("Output error: {}", e);
            std::process::exit(1);
        });
    }

    if passed {
        0
    } else {
        3
    }
}

#[cfg(feature = "distributed")]
fn run_mpi(cli: &Cli, config: &ScanConfig) -> i32 {
    use hyperscan::comm::CommunicationBackend;
    use hyperscan::comm_mpi::MpiComm;
    use hyperscan::verify::Oracle;

    let Some(_universe) = mpi::initialize() else {
        eprintln!("MPI initialization failed");
        return 1;
    };
    let comm = MpiComm::new();

    // Every rank generates the same array; only the root's copy is
    // scattered, the rest only feed the oracle.
    let data = match data::generate(config.len, config.seed, config.max_value) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Data error: {}", e);
            return 1;
        }
    };
    let oracle = Oracle::new(&data);
    let source = (comm.rank() == config.root).then_some(&data[..]);

    // Return instead of exiting so `_universe` finalizes MPI.
    match driver::run_rank(&comm, config, source, Some(&oracle)) {
        Ok(report) => emit(cli, std::slice::from_ref(&report)),
        Err(e) => {
            eprintln!("Scan error on rank {}: {}", comm.rank(), e);
            e.abort_code()
        }
    }
}
