mod commands;
mod terminal;

use commands::{CommandLine, scan};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CommandLine::parse_args();

    logging::init_logging(args.quiet);
    print::banner(args.no_banner, args.quiet);

    scan::scan(&args).await?;

    print::end_of_program(args.quiet);
    Ok(())
}
