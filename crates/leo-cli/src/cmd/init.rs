use anyhow::Context;
use leo_core::config::Config;
use leo_core::paths;
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing LEO in: {}", root.display());

    for dir in [paths::LEO_DIR, paths::DB_DIR] {
        let p = root.join(dir);
        std::fs::create_dir_all(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load existing config")?
    } else {
        let cfg = Config::new(&project_name);
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    let protocol_dir = config.protocol_dir(root);
    if protocol_dir.is_dir() {
        println!("  exists:  {}", config.protocol.dir);
    } else {
        std::fs::create_dir_all(&protocol_dir)
            .with_context(|| format!("failed to create {}", protocol_dir.display()))?;
        println!("  created: {}", config.protocol.dir);
    }

    println!("\nNext: add a protocol document with `leo protocol version --new-version 1.0.0`");
    Ok(())
}
