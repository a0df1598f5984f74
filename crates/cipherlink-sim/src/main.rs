//! Cipherlink conversation simulator.
//!
//! Runs a seeded conversation between simulated parties over a relay that
//! duplicates and reorders, optionally replays its whole history, and checks
//! that no envelope is ever accepted twice and nothing unsent is accepted.
//!
//! Same seed, same run.

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use cipherlink_core::{RedbStore, SessionStore};
use cipherlink_harness::{
    Faults,
    scenario::{Report, Scenario, oracle},
};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::EnvFilter;

/// Cipherlink conversation simulator
#[derive(Parser, Debug)]
#[command(name = "cipherlink-sim", version, about)]
struct Args {
    /// Seed for identities, IVs, the script and relay faults
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of parties
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u8).range(2..=16))]
    parties: u8,

    /// Number of messages to send
    #[arg(long, default_value = "100")]
    messages: u32,

    /// Chance, in percent, that the relay delivers an envelope twice
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u8).range(0..=100))]
    duplicate_percent: u8,

    /// Deliver in send order instead of shuffling
    #[arg(long)]
    in_order: bool,

    /// Have the relay replay everything it carried at the end
    #[arg(long)]
    replay: bool,

    /// Keep session stores in redb files under this directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let report = match run(&args) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            return ExitCode::FAILURE;
        },
    };

    tracing::info!(%report, "simulation passed");
    match write_report(&report, &mut io::stdout().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "could not write report");
            ExitCode::FAILURE
        },
    }
}

fn write_report(report: &Report, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{report}")?;
    out.flush()
}

fn run(args: &Args) -> Result<Report, String> {
    let names: Vec<String> = (0..args.parties).map(|i| format!("p{i}")).collect();
    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);

    let mut scenario = Scenario::new(format!("sim seed={}", args.seed))
        .seed(args.seed)
        .faults(Faults { duplicate_percent: args.duplicate_percent, reorder: !args.in_order });

    for name in &names {
        scenario = match &args.store_dir {
            Some(dir) => {
                let path = dir.join(format!("{name}.redb"));
                let store: Arc<dyn SessionStore> = Arc::new(
                    RedbStore::open(&path).map_err(|e| format!("{}: {e}", path.display()))?,
                );
                scenario.party_with_store(name.clone(), store)
            },
            None => scenario.party(name.clone()),
        };
    }

    for i in 0..args.messages {
        let from = rng.gen_range(0..names.len());
        let to = (from + rng.gen_range(1..names.len())) % names.len();
        let body = format!("message {i} from {} to {}", names[from], names[to]);

        scenario = scenario.send(&names[from], &names[to], body.as_bytes());
        if rng.gen_ratio(1, 4) {
            scenario = scenario.deliver_all();
        }
        if rng.gen_ratio(1, 10) {
            scenario = scenario.advance(Duration::from_millis(rng.gen_range(1..5_000)));
        }
    }

    scenario = scenario.deliver_all();
    if args.replay {
        for name in &names {
            scenario = scenario.replay_history(name);
        }
        scenario = scenario.deliver_all();
    }

    scenario
        .oracle(oracle::all_of(vec![
            oracle::sequences_strictly_increase(),
            oracle::accepted_messages_were_sent(),
        ]))
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(["cipherlink-sim"].iter().chain(extra))
    }

    #[test]
    fn reliable_run_accepts_everything() {
        let report =
            run(&args(&["--messages", "40", "--duplicate-percent", "0", "--in-order"])).unwrap();
        assert_eq!(report.sent, 40);
        assert_eq!(report.accepted, 40);
        assert_eq!(report.rejected, 0);
    }

    #[test]
    fn replayed_run_rejects_every_replay() {
        let replayed = ["--messages", "30", "--duplicate-percent", "0", "--in-order", "--replay"];
        let report = run(&args(&replayed)).unwrap();
        assert_eq!(report.accepted, 30);
        assert_eq!(report.rejected, 30);
    }

    #[test]
    fn same_seed_same_report() {
        let a = run(&args(&["--seed", "77", "--messages", "50"])).unwrap();
        let b = run(&args(&["--seed", "77", "--messages", "50"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn redb_stores_are_created_per_party() {
        let dir = tempfile::tempdir().unwrap();
        let dir_arg = dir.path().to_str().unwrap();
        let report =
            run(&args(&["--parties", "2", "--messages", "10", "--store-dir", dir_arg])).unwrap();

        assert_eq!(report.sent, 10);
        assert!(dir.path().join("p0.redb").exists());
        assert!(dir.path().join("p1.redb").exists());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn report_is_written_as_one_line() {
        let report = run(&args(&["--messages", "5", "--in-order"])).unwrap();
        let mut out = Vec::new();

        write_report(&report, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{report}\n"));
    }

    #[test]
    fn write_failure_is_reported() {
        let report = run(&args(&["--messages", "5", "--in-order"])).unwrap();
        let err = write_report(&report, &mut ClosedPipe).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn party_count_is_bounded() {
        assert!(Args::try_parse_from(["cipherlink-sim", "--parties", "1"]).is_err());
    }
}
