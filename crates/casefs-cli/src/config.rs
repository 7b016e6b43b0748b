use anyhow::Result;
use casefs_config::Config;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
}

/// Execute the config command
pub fn run(command: ConfigCommand, config: &Config) -> Result<()> {
    match command {
        ConfigCommand::Show => print!("{}", config.to_toml()?),
        ConfigCommand::Path => {
            let global = Config::global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(no home directory)".to_string());
            println!("Global:  {}", global);
            println!("Project: {}", Config::PROJECT_PATH);
        }
    }
    Ok(())
}
