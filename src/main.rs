//! vigil CLI entry point.

use vigil_lib::cli::{self, Cli};
use vigil_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
