//! EPSVG CLI — interpret EPS documents and output SVG.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use epsvg_core::machine::Machine;
use epsvg_svg::RenderOptions;

#[derive(Parser)]
#[command(version, about = "epsvg \u{2014} EPS to SVG converter")]
struct Cli {
    /// Input EPS file
    #[arg(default_value = "input.eps")]
    input: PathBuf,

    /// Output SVG file
    #[arg(short, long, default_value = "out.svg")]
    output: PathBuf,

    /// Number of decimal places for output coordinates
    #[arg(long, default_value_t = 4)]
    precision: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.input.display());
            process::exit(1);
        }
    };

    let mut machine = Machine::new();
    if let Err(e) = machine.run(&source) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let opts = RenderOptions {
        precision: cli.precision,
        ..RenderOptions::default()
    };
    let document = epsvg_svg::render_with_options(machine.graphics.current(), &opts);

    match fs::write(&cli.output, document.to_string()) {
        Ok(()) => eprintln!("Wrote {}", cli.output.display()),
        Err(e) => {
            eprintln!("Error writing {}: {e}", cli.output.display());
            process::exit(1);
        }
    }
}
