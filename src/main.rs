//! NFL Game Totals CLI
//!
//! Trains the totals model from play-by-play data and grades upcoming games
//! against the market over/under.

use clap::{Parser, Subcommand};
use totals::{Config, Result};

#[derive(Parser)]
#[command(name = "totals")]
#[command(about = "NFL game total projections from play-by-play efficiency", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weekly batch: train, fetch feeds, project and write the analysis
    Run {
        /// Use cached feeds only (no network requests)
        #[arg(long)]
        offline: bool,
    },
    /// Train the model and save the artifact
    Train,
    /// Project a single matchup with the saved model
    Predict {
        /// Home team code or name
        home: String,
        /// Away team code or name
        away: String,
        /// Market over/under
        #[arg(long)]
        total: f64,
        /// Apply the current injury report
        #[arg(long)]
        injuries: bool,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Fetch market lines and refresh the cache
    Lines {
        /// Use the cached sheet only
        #[arg(long)]
        offline: bool,
    },
    /// Fetch the injury report and refresh the cache
    Injuries {
        /// Use the cached report only
        #[arg(long)]
        offline: bool,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Run { offline } => commands::run(&config, offline),
        Commands::Train => commands::train(&config),
        Commands::Predict {
            home,
            away,
            total,
            injuries,
            format,
        } => commands::predict(&config, &home, &away, total, injuries, format),
        Commands::Lines { offline } => commands::lines(&config, offline),
        Commands::Injuries { offline } => commands::injuries(&config, offline),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use totals::data::load_plays;
    use totals::features::ImpactTier;
    use totals::pipeline::{self, Matchup, Pipeline, RunInputs};
    use totals::predict::{format_prediction, PredictionEngine};
    use totals::training::ModelArtifact;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all("model")?;
        std::fs::create_dir_all("public/data")?;
        println!("Created data/, model/ and public/data/ directories");

        println!("\nNext steps:");
        println!("  1. Put play-by-play JSON in data/ and list it in {}", config_path);
        println!("  2. Set {} for live odds (optional)", config.feeds.api_key_env);
        println!("  3. Run 'totals run' for the weekly analysis");
        println!("  4. Run 'totals predict KC BUF --total 47.5' for a single game");

        Ok(())
    }

    pub fn run(config: &Config, offline: bool) -> Result<()> {
        let pipeline = Pipeline::new(config)?;
        let plays = load_plays(&config.data.play_files)?;

        let lines = pipeline::fetch_lines(config, pipeline::api_key(config), offline)?;
        let injuries = pipeline::fetch_injuries(config, offline);

        let output = pipeline.run(RunInputs {
            plays: &plays,
            lines,
            injuries,
        })?;
        pipeline.publish(&output)?;

        println!("Model: {}", output.artifact.metrics);
        println!();
        println!(
            "{:<12} {:>7} {:>7} {:>7}  {}",
            "Game", "Model", "Market", "Edge", "Pick"
        );
        println!("{}", "─".repeat(46));
        for pred in &output.predictions {
            println!(
                "{:<12} {:>7.1} {:>7.1} {:>+7.1}  {}",
                format!("{} @ {}", pred.away_team, pred.home_team),
                pred.projected_total,
                pred.market_total,
                pred.edge,
                pred.recommendation
            );
        }

        let stats = &output.report.summary_stats;
        println!();
        println!(
            "{} games | avg |edge| {:.2} | {} over, {} under, {} hold",
            stats.games_analyzed, stats.avg_edge, stats.over_picks, stats.under_picks, stats.hold_picks
        );
        println!("Wrote {}", config.data.output_path);

        Ok(())
    }

    pub fn train(config: &Config) -> Result<()> {
        let pipeline = Pipeline::new(config)?;
        let plays = load_plays(&config.data.play_files)?;

        let aggregation = pipeline.aggregate(&plays);
        if !aggregation.excluded.is_empty() {
            println!("Excluded {} games with missing plays", aggregation.excluded.len());
        }

        let artifact = pipeline.train(&aggregation)?;
        artifact.save(&config.data.model_path)?;

        println!("Trained on {} games, tested on {}", artifact.training_samples, artifact.test_samples);
        println!("Held-out: {}", artifact.metrics);
        println!("\nTop features:");
        for f in artifact.top_features(5) {
            println!("  {:<20} {:>8.3} (coef {:+.3})", f.feature, f.importance, f.coefficient);
        }

        Ok(())
    }

    pub fn predict(
        config: &Config,
        home: &str,
        away: &str,
        total: f64,
        with_injuries: bool,
        format: OutputFormat,
    ) -> Result<()> {
        let artifact = ModelArtifact::load(&config.data.model_path)?;
        let pipeline = Pipeline::new(config)?;
        let plays = load_plays(&config.data.play_files)?;
        let profiles = pipeline.profiles(&pipeline.aggregate(&plays));

        let home = pipeline::resolve_team(home)?;
        let away = pipeline::resolve_team(away)?;
        let matchup = Matchup {
            game_id: format!("{}_{}_{}", config.blend.current_season, away, home),
            date: None,
            home,
            away,
            market_total: total,
            home_moneyline: None,
            away_moneyline: None,
        };

        let events = if with_injuries {
            pipeline::fetch_injuries(config, false)
                .map(|s| s.data.events())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let engine = PredictionEngine::new(&artifact);
        let (prediction, game) = pipeline.project(&engine, &profiles, &matchup, &events)?;

        match format {
            OutputFormat::Table => {
                print!("{}", format_prediction(&prediction));
                for note in &game.injury_notes {
                    println!("  injury: {}", note);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&game)?);
            }
            OutputFormat::Csv => {
                println!("home,away,model_total,market_total,edge,recommendation");
                println!(
                    "{},{},{:.1},{:.1},{:.2},{}",
                    prediction.home_team,
                    prediction.away_team,
                    prediction.projected_total,
                    prediction.market_total,
                    prediction.edge,
                    prediction.recommendation
                );
            }
        }

        Ok(())
    }

    pub fn lines(config: &Config, offline: bool) -> Result<()> {
        let Some(snapshot) = pipeline::fetch_lines(config, pipeline::api_key(config), offline)? else {
            println!("No line feed available");
            return Ok(());
        };

        println!(
            "Lines from {}{}",
            snapshot.provenance.source,
            if snapshot.provenance.stale { " (cached)" } else { "" }
        );
        for game in &snapshot.data.games {
            let total = game
                .over_under
                .map(|t| format!("{:.1}", t))
                .unwrap_or_else(|| "-".to_string());
            println!("  {:>3} @ {:<3}  O/U {:>5}  {}", game.away_team, game.home_team, total, game.status);
        }

        Ok(())
    }

    pub fn injuries(config: &Config, offline: bool) -> Result<()> {
        let Some(snapshot) = pipeline::fetch_injuries(config, offline) else {
            println!("No injury report available");
            return Ok(());
        };

        println!(
            "Injuries from {}{}",
            snapshot.provenance.source,
            if snapshot.provenance.stale { " (cached)" } else { "" }
        );
        for event in snapshot.data.events() {
            if event.tier == ImpactTier::Low {
                continue;
            }
            println!(
                "  {:<3} {:<3} {:<24} {:<12} {:?} / {}",
                event.team, event.position, event.player, event.status, event.tier, event.category
            );
        }

        Ok(())
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let artifact = ModelArtifact::load(&config.data.model_path)?;

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Path:           {}", config.data.model_path);
        println!("  Type:           {}", artifact.model_type);
        println!("  Created:        {}", artifact.created_at.format("%Y-%m-%d %H:%M UTC"));
        println!("  Seasons:        {:?}", artifact.training_seasons);
        println!("  Train / test:   {} / {}", artifact.training_samples, artifact.test_samples);
        println!("  Held-out:       {}", artifact.metrics);
        println!("  Intercept:      {:.3}", artifact.intercept);
        println!();
        for (name, coef) in artifact.feature_names.iter().zip(&artifact.coefficients) {
            println!("  {:<20} {:+.4}", name, coef);
        }

        Ok(())
    }
}
