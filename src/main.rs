//! yamanaka-server CLI entry point.
//!
//! main.rs only parses nothing itself: it hands off to the cli module,
//! which parses arguments and dispatches to a subcommand.

use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = yamanaka_server::cli::run().await {
        let error_json = serde_json::json!({
            "status": "error",
            "code": e.code_str(),
            "message": e.message(),
        });

        eprintln!("{}", error_json);
        process::exit(1);
    }
}
