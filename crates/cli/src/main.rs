fn main() {
    clipfeed_cli::logging::init();

    if let Err(error) = clipfeed_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
