#[tokio::main]
async fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = chapterpdf::cli::Args::parse();
    let level = chapterpdf::logging::default_level(args.quiet, args.verbose);
    if let Err(e) = chapterpdf::logging::init(level) {
        eprintln!("Warning: {:#}", e);
    }
    if let Err(e) = chapterpdf::cli::run(&args).await {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
