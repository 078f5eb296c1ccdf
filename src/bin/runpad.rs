use anyhow::Result;

fn main() -> Result<()> {
    runpad::cli::run()
}
