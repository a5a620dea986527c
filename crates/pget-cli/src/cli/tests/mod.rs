//! CLI parse tests, plus `get` batches against a local HTTP server.

use super::Cli;
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[allow(dead_code)]
#[path = "../../../../pget-core/tests/common/test_server.rs"]
mod test_server;
