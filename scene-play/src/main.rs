//! Terminal player for scene-graph text adventures.
//!
//! ```bash
//! cargo run -p scene-play -- --dir public --game forest
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=scene_core=debug` for more detail.

mod headless;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = headless::parse_config_from_args(&args);
    headless::run_headless(config).await.map_err(|e| e.into())
}

fn print_help() {
    println!("scene-play - play a branching text adventure in the terminal");
    println!();
    println!("USAGE:");
    println!("    scene-play [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --dir <path>     Directory holding the story documents (default: public)");
    println!("    --game <name>    Game selector, reads <name>-gamedata.json");
    println!("    -h, --help       Print this help");
    println!();
    println!("ENVIRONMENT:");
    println!("    ANTHROPIC_API_KEY    Needed for #generate");
    println!("    RUST_LOG             Log filter (default: warn)");
}
