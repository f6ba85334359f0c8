use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use evscript::compiler::compile_unit;
use evscript::diagnostics::Reporter;
use evscript::dialect::Dialect;
use evscript::frontend;

#[derive(Parser)]
#[command(name = "evscript", version, about = "Bytecode script compiler")]
struct Args {
    /// Output file; `-` writes to standard output
    #[arg(short, long = "output", required = true)]
    output: Vec<String>,
    /// Dialect template file for the target assembler
    #[arg(long)]
    dialect: Option<PathBuf>,
    /// Input script
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let reporter = Reporter::new();
    if args.output.len() > 1 {
        reporter.warn("multiple output files specified; using the last");
    }
    if let Err(error) = run(&args, &reporter) {
        reporter.fatal(format!("{error:#}"));
        process::exit(1);
    }
}

fn run(args: &Args, reporter: &Reporter) -> Result<()> {
    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let unit = frontend::parse(&source, reporter)?;

    let dialect = match &args.dialect {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot read dialect {}", path.display()))?;
            Dialect::load(BufReader::new(file), reporter)?
        }
        None => Dialect::default(),
    };

    let output = args.output.last().context("no output file")?;
    if output == "-" {
        let stdout = io::stdout().lock();
        let mut sink = BufWriter::new(stdout);
        compile_unit(&mut sink, &unit, &dialect, reporter)?;
        sink.flush()?;
    } else {
        let file = File::create(output).with_context(|| format!("cannot create {output}"))?;
        let mut sink = BufWriter::new(file);
        compile_unit(&mut sink, &unit, &dialect, reporter)?;
        sink.flush()?;
    }
    Ok(())
}
