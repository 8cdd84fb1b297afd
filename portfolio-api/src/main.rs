//! Main entry point for the `portfolio` binary.

fn main() -> anyhow::Result<()> {
    portfolio_api::main()
}
