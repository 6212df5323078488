use clap::{value_parser, ArgAction, CommandFactory, Parser, ValueEnum};
use clap_complete::aot::{generate, Shell};
use parawalk::config::{Config, PrimaryMode as ConfigPrimaryMode, SecondaryOptions};
use parawalk::engine::{self, RunError};
use parawalk::stats::TallyBuckets;
use std::io::stdout;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Mirrors [`ConfigPrimaryMode`] as a `clap`-friendly value enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrimaryModeArg {
    List,
    Xml,
    Compare,
    TimeFix,
    Delete,
    Audit,
}

impl From<PrimaryModeArg> for ConfigPrimaryMode {
    fn from(arg: PrimaryModeArg) -> Self {
        match arg {
            PrimaryModeArg::List => Self::List,
            PrimaryModeArg::Xml => Self::Xml,
            PrimaryModeArg::Compare => Self::Compare,
            PrimaryModeArg::TimeFix => Self::TimeFix,
            PrimaryModeArg::Delete => Self::Delete,
            PrimaryModeArg::Audit => Self::Audit,
        }
    }
}

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "A high-throughput, multi-worker parallel directory tree walker"
)]
struct Args {
    #[arg(value_name = "ROOT", help = "One or more equivalent source root paths", required = true, num_args = 1..)]
    source: Vec<PathBuf>,

    #[arg(
        short = 't',
        long = "target",
        value_name = "ROOT",
        help = "One or more equivalent target root paths (required by compare/timefix/delete modes)",
        num_args = 1..
    )]
    target: Vec<PathBuf>,

    #[arg(short = 'm', long = "mode", value_enum, default_value_t = PrimaryModeArg::List, help = "Primary mode")]
    mode: PrimaryModeArg,

    #[arg(
        short = 'j',
        long = "workers",
        default_value_t = env!("THREAD_COUNT").parse::<usize>().unwrap_or(1),
        help = "Number of worker threads, defaults to available parallelism"
    )]
    workers: usize,

    #[arg(
        long = "prefix-read",
        value_name = "BYTES",
        default_value_t = 0,
        help = "Read this many leading bytes of each regular file as a load generator"
    )]
    prefix_read: usize,

    #[arg(long = "crc", default_value_t = false, help = "Compute a CRC32 over each regular file's contents")]
    crc: bool,

    #[arg(long = "acl-probe", default_value_t = false, help = "Probe for POSIX ACL presence on each entry")]
    acl_probe: bool,

    #[arg(long = "tally", default_value_t = false, help = "Accumulate the size-bucket tally histogram")]
    tally: bool,

    #[arg(
        short = 'x',
        long = "cross-filesystem",
        default_value_t = false,
        help = "Descend into mounted filesystems other than the root's own"
    )]
    cross_filesystem: bool,

    #[arg(
        long = "skip",
        value_name = "NAME",
        help = "Directory name to never descend into (can be repeated)",
        action = ArgAction::Append
    )]
    skip: Vec<String>,

    #[arg(
        long = "block-size",
        default_value_t = 512,
        help = "Block size used to convert st_blocks into allocated bytes"
    )]
    block_size: u64,

    #[arg(
        long = "max-path-len",
        default_value_t = 4096,
        help = "Maximum relative path length before an entry is skipped with a warning"
    )]
    max_path_len: usize,

    #[arg(long = "redact", default_value_t = false, help = "Replace path components with their inode in hex for output")]
    redact: bool,

    #[arg(
        long = "dedupe-hardlinked-dirs",
        default_value_t = false,
        help = "Track visited (dev, ino) pairs to avoid rescanning hardlinked directories"
    )]
    dedupe_hardlinked_dirs: bool,

    #[arg(
        long = "progress-interval",
        value_name = "SECONDS",
        default_value_t = 900,
        help = "Seconds between progress lines in the primary log"
    )]
    progress_interval: u64,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        default_value = "/tmp",
        help = "Directory under which the run's timestamped output directory is created"
    )]
    output: PathBuf,

    #[arg(
        long = "generate",
        action = ArgAction::Set,
        value_parser = value_parser!(Shell),
        help = "Generate shell completions"
    )]
    generate: Option<Shell>,
}

fn main() {
    let args = Args::parse();

    if let Some(generator) = args.generate {
        let mut cmd = Args::command();
        let cmd_name = cmd.get_name().to_owned();
        generate(generator, &mut cmd, cmd_name, &mut stdout());
        return;
    }

    let workers = match NonZeroUsize::new(args.workers) {
        Some(n) => n,
        None => {
            eprintln!("error: --workers must be at least 1");
            std::process::exit(2);
        }
    };

    let config = Config {
        source_roots: args.source,
        target_roots: args.target,
        worker_count: workers,
        primary_mode: args.mode.into(),
        secondary: SecondaryOptions {
            prefix_read_bytes: args.prefix_read,
            crc: args.crc,
            acl_probe: args.acl_probe,
            tally: args.tally,
        },
        cross_filesystem: args.cross_filesystem,
        skip_names: args.skip,
        block_unit: args.block_size,
        tally_buckets: TallyBuckets::default(),
        max_path_len: args.max_path_len,
        redact_paths: args.redact,
        detect_hardlinked_dir_revisits: args.dedupe_hardlinked_dirs,
        progress_interval_secs: args.progress_interval,
        output_root: args.output,
        select: None,
    };

    match engine::run(&config) {
        Ok(stats) => {
            println!(
                "dirs={} files={} symlinks={} bytes={}",
                stats.totals.dirs.open_dirs,
                stats.totals.dirs.n_files,
                stats.totals.dirs.n_symlinks,
                stats.totals.dirs.bytes_nominal
            );
        }
        // A fatal invariant (push/pop mismatch, a worker left busy, a FIFO
        // read/write failure) means the FIFO's own bookkeeping is no longer
        // trustworthy (spec §7.2 "core-dump-equivalent fault"): log it and
        // abort rather than exit cleanly, so the failure is as conspicuous
        // as a genuine crash. A setup error (bad root, rlimit, output dir)
        // is an ordinary exit(1).
        Err(RunError::FatalInvariant(e)) => {
            eprintln!("fatal invariant violation: {e}");
            std::process::abort();
        }
        Err(e @ RunError::Setup(_)) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
