use bidi_tee::cli::capture::{run, CaptureCli};
use bidi_tee::cli::finish;
use clap::Parser;

fn main() {
    let cli = CaptureCli::parse();
    cli.logging.init();
    finish("bidi-tee", run(cli));
}
