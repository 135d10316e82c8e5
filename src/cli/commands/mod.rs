use anyhow::Result;

pub mod config;
pub mod run;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

pub async fn show_how_to_start() -> Result<()> {
    println!("⚗️  ethynyl - two carbons and a hydrogen make a radical");
    println!();
    println!("To get started:");
    println!("  🎲 ethynyl run <SEED> [ATOMS]                  # Random population");
    println!("  🧪 ethynyl run <SEED> --carbon 5 --hydrogen 3  # Exact population");
    println!("  ⚙️  ethynyl config                             # Show effective configuration");
    println!();
    println!("💡 Add --format json for machine-readable radicals, -v to watch every atom.");
    Ok(())
}
