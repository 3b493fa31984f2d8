//! `sim`: simulate execution of a Sim-D kernel.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use simd_compute::DecodeImpl;
use simd_isa::{read_buffer_file, write_buffer_file, BufferFileKind, Program};
use simd_machine::{compare_words, Machine, MachineConfig, SchedOpts, DEBUG_CATEGORIES};
use simd_model::WorkgroupWidth;

#[derive(Parser)]
#[command(
    name = "sim",
    about = "Simulate execution of a Sim-D kernel.",
    after_help = options_help()
)]
struct Args {
    /// (x,y)-dimensions of program execution, e.g. 128,4.
    #[arg(short = 'd', value_name = "X,Y")]
    dims: String,

    /// Work-group width, a power of two of at least 32.
    #[arg(short = 'w', value_name = "THREADS")]
    width: Option<u32>,

    /// Simulation time bound in ns.
    #[arg(short = 'n', value_name = "NS")]
    ns: Option<u64>,

    /// Number of execute pipeline stages.
    #[arg(short = 'P', value_name = "STAGES", default_value_t = 3)]
    pipe_stages: usize,

    /// Enable the three-stage IDecode phase.
    #[arg(short = '3')]
    three_stage: bool,

    /// Upload a file (CSV or binary) into a buffer before execution.
    #[arg(short = 'i', value_name = "BUF,FILE")]
    upload: Vec<String>,

    /// Dump a buffer into a file after execution.
    #[arg(short = 'o', value_name = "BUF,FILE")]
    download: Vec<String>,

    /// Compare a buffer against a file after execution.
    #[arg(short = 'c', value_name = "BUF,FILE")]
    compare: Vec<String>,

    /// Tolerable comparison error (delta, or percentage with a trailing
    /// '%').
    #[arg(short = 'e', value_name = "ERROR", default_value = "0.001")]
    error: String,

    /// Width (in 32-bit words) of a VRF SRAM bank.
    #[arg(short = 'b', value_name = "WORDS")]
    vrf_bank_words: Option<u32>,

    /// Initialise the memory controller's refresh counter.
    #[arg(short = 'r', value_name = "COUNT", default_value_t = 0)]
    refresh: u64,

    /// Enable real-time scheduling options (comma separated).
    #[arg(short = 's', value_name = "OPT[,OPT...]")]
    sched: Option<String>,

    /// Enable debug output categories (comma separated).
    #[arg(short = 'D', value_name = "OPT[,OPT...]")]
    debug: Option<String>,

    /// Kernel program.
    program: PathBuf,
}

fn options_help() -> String {
    let mut s = String::from("Scheduling options (-s):\n");
    for (name, _, desc) in SchedOpts::NAMES {
        s.push_str(&format!("  {name:<24}: {desc}\n"));
    }
    s.push_str("\nDebugging options (-D):\n");
    for (name, desc) in DEBUG_CATEGORIES {
        s.push_str(&format!("  {name:<24}: {desc}\n"));
    }
    s
}

fn parse_dims(s: &str) -> Result<[u32; 2]> {
    let (x, y) = match s.split_once(',') {
        Some((x, y)) => (x, y),
        None => (s, "1"),
    };
    Ok([
        x.trim().parse().context("invalid X dimension")?,
        y.trim().parse().context("invalid Y dimension")?,
    ])
}

fn parse_buf_file(s: &str) -> Result<(u32, PathBuf)> {
    let (buf, file) = s
        .split_once(',')
        .with_context(|| format!("expected BUF,FILE, got \"{s}\""))?;
    let index: u32 = buf.trim().parse().context("invalid buffer index")?;
    if index >= simd_model::BIND_BUFS as u32 {
        bail!("buffer index {index} out of range");
    }
    Ok((index, PathBuf::from(file)))
}

fn parse_error_tolerance(s: &str) -> Result<(f32, bool)> {
    let relative = s.ends_with('%');
    let value: f32 = s.trim_end_matches('%').parse().context("invalid tolerance")?;
    Ok((if relative { value * 0.01 } else { value }, relative))
}

fn parse_sched_opts(s: Option<&str>) -> Result<SchedOpts> {
    // Stop-on-finish is the default; explicit options add to it.
    let mut opts = SchedOpts::STOP_SIM_FINI;
    let Some(s) = s else { return Ok(opts) };

    for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let flag = SchedOpts::by_name(name)
            .with_context(|| format!("unknown scheduling option \"{name}\""))?;
        opts |= flag;
    }
    Ok(opts)
}

fn init_tracing(debug: Option<&str>) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let mut directives = vec!["warn".to_string()];
    if let Some(debug) = debug {
        for name in debug.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "prg" || name == "mc_stats" {
                // Handled outside the tracing pipeline.
                continue;
            }
            if !DEBUG_CATEGORIES.iter().any(|(n, _)| *n == name) {
                bail!("unknown debug option \"{name}\"");
            }
            let level = if name == "pipe_trace" { "trace" } else { "debug" };
            directives.push(format!("{name}={level}"));
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives.join(",")))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
    Ok(())
}

fn debug_enabled(debug: Option<&str>, name: &str) -> bool {
    debug
        .map(|d| d.split(',').any(|n| n.trim() == name))
        .unwrap_or(false)
}

fn run() -> Result<bool> {
    let args = Args::parse();

    init_tracing(args.debug.as_deref())?;

    let dims = parse_dims(&args.dims)?;
    let (delta, relative) = parse_error_tolerance(&args.error)?;

    let width = match args.width {
        None => None,
        Some(w) if w >= 32 && w.is_power_of_two() => {
            Some(WorkgroupWidth::for_threads(w))
        }
        Some(w) => bail!("invalid work-group width {w}"),
    };

    let text = std::fs::read_to_string(&args.program)
        .with_context(|| format!("could not open program file {}", args.program.display()))?;
    let mut program = Program::parse(&text)?;
    program.resolve_branch_targets()?;
    program.fold_exit();

    // Command-line uploads override data input files from the program.
    for spec in &args.upload {
        let (index, path) = parse_buf_file(spec)?;
        let buf = program
            .buffer_mut(index)
            .with_context(|| format!("buffer {index} is not declared by the program"))?;
        if buf.data_file.is_some() {
            eprintln!(
                "Warning: overwriting buffer data input file for buffer {index} \
                 with command-line parameter."
            );
        }
        let kind = BufferFileKind::from_path(&path);
        buf.data_file = Some((path, kind));
    }

    if debug_enabled(args.debug.as_deref(), "prg") {
        for (pc, insn) in program.insns().iter().enumerate() {
            println!("{pc:4}: {insn}");
        }
        println!();
    }

    let config = MachineConfig {
        dims,
        width,
        decode: if args.three_stage { DecodeImpl::ThreeStage } else { DecodeImpl::OneStage },
        exec_stages: args.pipe_stages,
        sched_opts: parse_sched_opts(args.sched.as_deref())?,
        refresh_seed: args.refresh,
        vrf_bank_words: args.vrf_bank_words,
        ..Default::default()
    };

    let mut machine = Machine::new(program, config)?;
    let stats = machine.run(args.ns);

    println!();
    println!("{stats}");

    if debug_enabled(args.debug.as_deref(), "mc_stats") {
        println!();
        println!("{}", machine.dram_stats());
    }

    for spec in &args.download {
        let (index, path) = parse_buf_file(spec)?;
        let words = machine.download_buffer_words(index)?;
        write_buffer_file(&path, &words)?;
    }

    let mut mismatched = false;
    for spec in &args.compare {
        let (index, path) = parse_buf_file(spec)?;
        let got = machine.download_buffer_words(index)?;
        let want = read_buffer_file(&path)?;

        let mismatches = compare_words(&got, &want, delta, relative);
        for m in mismatches.iter().take(16) {
            eprintln!(
                "Buffer {index} mismatch at word {}: got {}, expected {} (delta {})",
                m.index, m.got, m.want, m.delta
            );
        }
        if !mismatches.is_empty() {
            eprintln!("Buffer {index}: {} words differ", mismatches.len());
            mismatched = true;
        }
    }

    Ok(mismatched)
}

fn main() -> ExitCode {
    match run() {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_parsing() {
        assert_eq!(parse_dims("128,4").unwrap(), [128, 4]);
        assert_eq!(parse_dims("64").unwrap(), [64, 1]);
        assert!(parse_dims("x,y").is_err());
    }

    #[test]
    fn buf_file_parsing() {
        let (idx, path) = parse_buf_file("3,out.csv").unwrap();
        assert_eq!(idx, 3);
        assert_eq!(path, PathBuf::from("out.csv"));
        assert!(parse_buf_file("99,out.csv").is_err());
        assert!(parse_buf_file("noseparator").is_err());
    }

    #[test]
    fn tolerance_parsing() {
        assert_eq!(parse_error_tolerance("0.5").unwrap(), (0.5, false));
        let (v, rel) = parse_error_tolerance("2%").unwrap();
        assert!(rel && (v - 0.02).abs() < 1e-6);
    }

    #[test]
    fn sched_opt_parsing() {
        let opts = parse_sched_opts(Some("no_parallel_dram_sp,stop_dram_fini")).unwrap();
        assert!(opts.contains(SchedOpts::NO_PARALLEL_DRAM_SP));
        assert!(opts.contains(SchedOpts::STOP_DRAM_FINI));
        assert!(opts.contains(SchedOpts::STOP_SIM_FINI));
        assert!(parse_sched_opts(Some("bogus")).is_err());
    }
}
