use std::io::{self, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use lss_call_stack as cs;
use lss_call_stack::output::{self, DotConf, OutputFormat, TreeConf};

/// Worst-case stack depth per call tree, from an AVR listing.
///
/// Produce the listing with `avr-objdump -d firmware.elf > firmware.lss`.
/// Symbol names are printed as they appear; pipe through `avr-c++filt`
/// to demangle C++ names.
#[derive(Parser, Debug)]
#[command(name = "lss-call-stack", version, long_about = None)]
struct Cli
{
    /// The .lss listing to analyse.
    lss: PathBuf,

    /// Functions to print the call tree for, by name or `0x` address.
    /// Only used by the tree format.
    #[arg(default_value = "main")]
    roots: Vec<String>,

    /// AVR architecture (avr5, avr6, avrxmega7, ...); decides the return address width.
    #[arg(long, default_value = "avr5")]
    target: cs::Target,

    #[arg(long, value_enum, default_value_t = Format::Tree)]
    format: Format,

    /// Cut branches nested deeper than this.
    #[arg(long, default_value_t = 20)]
    max_depth: usize,

    /// Do not list calls whose target is unknown.
    #[arg(long)]
    hide_unknown: bool,

    /// More log output (-v info, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format
{
    Tree,
    Top,
    Dot,
}

impl From<Format> for OutputFormat
{
    fn from(f: Format) -> Self
    {
        match f
        {
            Format::Tree => OutputFormat::Tree,
            Format::Top  => OutputFormat::Top,
            Format::Dot  => OutputFormat::Dot,
        }
    }
}


fn main() -> Result<()>
{
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose)
    {
        (true, _) => LevelFilter::Error,
        (_, 0)    => LevelFilter::Warn,
        (_, 1)    => LevelFilter::Info,
        _         => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .without_timestamps()
        .init()
        .context("Failed to install logger")?;

    run(&cli)
}

fn run(cli: &Cli) -> Result<()>
{
    let state = cs::input::analyse_file(&cli.lss, cli.target)
        .with_context(|| format!("Failed to analyse {}", cli.lss.display()))?;

    let mut depths = cs::DepthTable::new(&state);
    depths.resolve_all(&state);

    let stdout  = io::stdout().lock();
    let mut out = io::BufWriter::new(stdout);

    match OutputFormat::from(cli.format)
    {
        OutputFormat::Tree =>
        {
            // every root must exist before anything is printed
            let roots = cli
                .roots
                .iter()
                .map(|r| state.lookup(r))
                .collect::<Result<Vec<_>, _>>()?;

            let conf = TreeConf
            {
                max_depth:       Some(cli.max_depth),
                show_unresolved: !cli.hide_unknown,
            };
            for (i, &root) in roots.iter().enumerate()
            {
                if i > 0
                {
                    writeln!(out)?;
                }
                writeln!(out, "{}", output::tree::HEADER)?;
                for line in output::tree(&state, &depths, root, &conf)
                {
                    writeln!(out, "{}", line)?;
                }

                let deepest = depths.resolve(&state, root);
                write!(out, "Deepest stack: {} bytes from `{}`", deepest.max, state.g[root].name)?;
                if !deepest.max.is_exact()
                {
                    write!(out, " (lower bound: recursion or unknown callees below)")?;
                }
                writeln!(out)?;
            }
        },
        OutputFormat::Top => state.output_top(&depths, &mut out)?,
        OutputFormat::Dot => state.output_dot(&depths, &mut out, DotConf::default())?,
    }

    out.flush()?;
    Ok(())
}
