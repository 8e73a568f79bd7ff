use clap::Subcommand;
use tomate_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "timer.pomodoro_duration")
        key: String,
        /// Override a value first (key=value, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
    /// List all config values as TOML
    List {
        /// Override a value first (key=value, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
}

fn effective(overrides: &[String]) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::default();
    config.apply_overrides(overrides)?;
    Ok(config)
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key, overrides } => {
            let config = effective(&overrides)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::List { overrides } => {
            let config = effective(&overrides)?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}
