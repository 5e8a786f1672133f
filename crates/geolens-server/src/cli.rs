use clap::{Parser, Subcommand};
use geolens_engine::{BackendPreference, EngineConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "geolens")]
#[command(author, version, about = "Geopark landmark identification")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "geolens.yaml")]
    pub config: PathBuf,

    /// Model manifest to load (replaces the configured candidates)
    #[arg(short, long, global = true)]
    pub model: Option<PathBuf>,

    /// Fixed seed for heuristic jitter
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Never use a GPU backend
    #[arg(long, global = true)]
    pub cpu: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP service
    Serve {
        /// Listen address
        #[arg(short = 'l', long, default_value = "0.0.0.0")]
        listen: String,

        /// Listen port
        #[arg(short = 'P', long, default_value = "5000")]
        port: u16,

        /// Maximum request body size in bytes
        #[arg(long, default_value = "16777216")]
        body_limit: usize,
    },

    /// Identify images and print the results as JSON
    Identify {
        /// Image paths or URLs (http, https, file, data)
        #[arg(required = true)]
        images: Vec<String>,

        /// Include the path taken and timing
        #[arg(long)]
        detailed: bool,
    },

    /// Run model discovery and print the status
    Status,
}

impl Cli {
    /// Load the engine configuration and apply command-line overrides
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::load_or_default(&self.config)?;

        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if self.cpu {
            config = config.with_backend(BackendPreference::Cpu);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let cli = Cli::parse_from([
            "geolens",
            "--config",
            "/nonexistent/geolens.yaml",
            "--model",
            "weights/model.json",
            "--seed",
            "3",
            "--cpu",
            "status",
        ]);
        let config = cli.engine_config().unwrap();

        assert_eq!(config.model.candidates, vec![PathBuf::from("weights/model.json")]);
        assert_eq!(config.heuristic.seed, Some(3));
        assert_eq!(config.model.backend, BackendPreference::Cpu);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_identify_requires_images() {
        assert!(Cli::try_parse_from(["geolens", "identify"]).is_err());

        let cli = Cli::parse_from(["geolens", "identify", "a.jpg", "b.png", "--detailed"]);
        match cli.command {
            Commands::Identify { images, detailed } => {
                assert_eq!(images, vec!["a.jpg", "b.png"]);
                assert!(detailed);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
