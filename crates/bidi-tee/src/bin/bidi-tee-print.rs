use bidi_tee::cli::finish;
use bidi_tee::cli::print::{run, PrintCli};
use clap::Parser;

fn main() {
    let cli = PrintCli::parse();
    cli.logging.init();
    finish("bidi-tee-print", run(cli));
}
