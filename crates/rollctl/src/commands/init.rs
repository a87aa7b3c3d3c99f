use std::path::Path;

use rollguard_core::RollguardConfig;

pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let content = RollguardConfig::scaffold().to_toml_string()?;
    std::fs::write(path, content)?;
    println!("✓ Generated {}", path.display());
    Ok(())
}
