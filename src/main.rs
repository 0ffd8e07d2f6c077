#![allow(warnings)]

use dln_indexer::arguments;
use dln_indexer::logger::{self, LogTag};

#[tokio::main]
async fn main() {
    arguments::set_cmd_args(std::env::args().collect());

    if arguments::patterns::is_help_requested() {
        arguments::print_help();
        return;
    }

    if !arguments::is_run_enabled() {
        arguments::print_help();
        std::process::exit(1);
    }

    if let Err(e) = dln_indexer::run::run_pipeline().await {
        logger::error(LogTag::System, &format!("pipeline exited with error: {}", e));
        std::process::exit(1);
    }
}
