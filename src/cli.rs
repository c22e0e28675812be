//! CLI interface for adaptive-learner
//!
//! Every command exchanges JSON files: profiles, paths, skill gaps and
//! feedback reports use the same field names as the library types.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, Config};
use crate::generation::llm::LlmGenerator;
use crate::path::{LearningPath, SkillGap};
use crate::profile::fslsm::{find_persona, personas};
use crate::profile::{InteractionEvidence, LearnerProfile, SessionCompletion};
use crate::refine::CancelFlag;
use crate::service::{ensure_schedulable, LearningService};
use crate::simulator::{FeedbackReport, GroundTruth};

#[derive(Parser)]
#[command(name = "adaptive-learner")]
#[command(about = "Adaptive learner modeling and learning path refinement", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the platform default
    #[arg(long, global = true, env = "ADAPTIVE_LEARNER_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an initial learner profile from a goal, background and skill gaps
    CreateProfile {
        /// Learning goal
        #[arg(short, long)]
        goal: String,
        /// Learner background (resume summary, experience)
        #[arg(short, long, default_value = "")]
        background: String,
        /// JSON file with the skill gaps
        #[arg(long)]
        gaps: PathBuf,
        /// Seed learning preferences from a named persona
        #[arg(long)]
        persona: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Merge new evidence into a profile
    UpdateProfile {
        #[arg(short, long)]
        profile: PathBuf,
        /// Free-text feedback (repeatable)
        #[arg(short, long)]
        feedback: Vec<String>,
        /// JSON file with structured evidence
        #[arg(long)]
        evidence: Option<PathBuf>,
        /// JSON file with a session completion descriptor
        #[arg(long, conflicts_with = "session")]
        completion: Option<PathBuf>,
        /// Take the completion from this session of --path
        #[arg(long, requires = "path")]
        session: Option<String>,
        /// Learning path file, used with --session
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Schedule a learning path covering the skill gaps
    Schedule {
        #[arg(short, long)]
        profile: PathBuf,
        #[arg(long)]
        gaps: PathBuf,
        /// Target number of sessions
        #[arg(short, long)]
        sessions: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rebuild a path around the sessions already learned
    Reschedule {
        #[arg(short, long)]
        profile: PathBuf,
        #[arg(long)]
        path: PathBuf,
        #[arg(short, long)]
        sessions: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Simulate the learner's feedback on a path
    Simulate {
        #[arg(short, long)]
        profile: PathBuf,
        #[arg(long)]
        path: PathBuf,
        /// Precomputed ground truth profile (skips enrichment)
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply one feedback report to a path
    Refine {
        #[arg(long)]
        path: PathBuf,
        /// Feedback report file; simulated from --profile when omitted
        #[arg(short, long)]
        feedback: Option<PathBuf>,
        #[arg(short, long)]
        profile: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the simulate/refine loop until it converges or hits the limit
    AutoRefine {
        #[arg(short, long)]
        profile: PathBuf,
        #[arg(long)]
        path: PathBuf,
        /// Maximum iterations
        #[arg(short, long)]
        iterations: Option<usize>,
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the built-in learner personas
    Personas,
    /// Configure the tool
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Store the generation API key
        #[arg(long)]
        set_api_key: Option<String>,
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
        /// Set model for a role (usage: --set-model role model_id)
        #[arg(long, num_args = 2, value_names = ["role", "model"])]
        set_model: Option<Vec<String>>,
    },
}

/// Skill gaps as a bare array or wrapped in `{"skill_gaps": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum GapsFile {
    Wrapped { skill_gaps: Vec<SkillGap> },
    Bare(Vec<SkillGap>),
}

impl GapsFile {
    fn into_gaps(self) -> Vec<SkillGap> {
        match self {
            GapsFile::Wrapped { skill_gaps } => skill_gaps,
            GapsFile::Bare(gaps) => gaps,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.dim} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn build_service(config: Config) -> Result<LearningService> {
    let generator = LlmGenerator::from_config(&config)?;
    Ok(LearningService::new(Arc::new(generator), config))
}

fn read_ground_truth(path: Option<&Path>) -> Result<Option<GroundTruth>> {
    path.map(read_json::<GroundTruth>).transpose()
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::CreateProfile { goal, background, gaps, persona, output } => {
            let gaps = read_json::<GapsFile>(&gaps)?.into_gaps();
            let persona = match persona {
                Some(name) => Some(find_persona(&name).with_context(|| {
                    format!(
                        "Unknown persona '{}'. Available: {}",
                        name,
                        personas().iter().map(|p| p.name).collect::<Vec<_>>().join(", ")
                    )
                })?),
                None => None,
            };
            let service = build_service(load_config(config_path)?)?;
            let pb = spinner("Profiling learner...");
            let result = service.create_profile(&goal, &background, &gaps, persona.as_ref()).await;
            pb.finish_and_clear();
            emit(&result?, output.as_deref())?;
        }
        Commands::UpdateProfile { profile, feedback, evidence, completion, session, path, output } => {
            let previous: LearnerProfile = read_json(&profile)?;
            let mut evidence: InteractionEvidence = match evidence {
                Some(file) => read_json(&file)?,
                None => InteractionEvidence::default(),
            };
            evidence.feedback.extend(feedback);

            let completion: Option<SessionCompletion> = match (completion, session, path) {
                (Some(file), _, _) => Some(read_json(&file)?),
                (None, Some(id), Some(path_file)) => {
                    let path: LearningPath = read_json(&path_file)?;
                    let session = path
                        .session(&id)
                        .with_context(|| format!("No session '{}' in {}", id, path_file.display()))?;
                    let mut completion = SessionCompletion::from(session);
                    completion.if_learned = true;
                    Some(completion)
                }
                _ => None,
            };

            let service = build_service(load_config(config_path)?)?;
            let pb = spinner("Updating profile...");
            let result = service.update_profile(&previous, &evidence, completion.as_ref()).await;
            pb.finish_and_clear();
            emit(&result?, output.as_deref())?;
        }
        Commands::Schedule { profile, gaps, sessions, output } => {
            let profile: LearnerProfile = read_json(&profile)?;
            let gaps = read_json::<GapsFile>(&gaps)?.into_gaps();
            ensure_schedulable(&gaps)?;
            let service = build_service(load_config(config_path)?)?;
            let pb = spinner("Scheduling learning path...");
            let result = service.schedule_path(&profile, &gaps, sessions).await;
            pb.finish_and_clear();
            emit(&result?, output.as_deref())?;
        }
        Commands::Reschedule { profile, path, sessions, output } => {
            let profile: LearnerProfile = read_json(&profile)?;
            let path: LearningPath = read_json(&path)?;
            let service = build_service(load_config(config_path)?)?;
            let pb = spinner("Rescheduling learning path...");
            let result = service.reschedule_path(&path, &profile, sessions).await;
            pb.finish_and_clear();
            emit(&result?, output.as_deref())?;
        }
        Commands::Simulate { profile, path, ground_truth, output } => {
            let profile: LearnerProfile = read_json(&profile)?;
            let path: LearningPath = read_json(&path)?;
            let ground_truth = read_ground_truth(ground_truth.as_deref())?;
            let service = build_service(load_config(config_path)?)?;
            let pb = spinner("Simulating learner feedback...");
            let result = service.simulate_feedback(&profile, &path, ground_truth.as_ref()).await;
            pb.finish_and_clear();
            emit(&result?, output.as_deref())?;
        }
        Commands::Refine { path, feedback, profile, output } => {
            let path: LearningPath = read_json(&path)?;
            let profile: Option<LearnerProfile> = profile.as_deref().map(read_json::<LearnerProfile>).transpose()?;
            let service = build_service(load_config(config_path)?)?;

            let report: FeedbackReport = match (feedback, &profile) {
                (Some(file), _) => read_json(&file)?,
                (None, Some(profile)) => {
                    let pb = spinner("Simulating learner feedback...");
                    let result = service.simulate_feedback(profile, &path, None).await;
                    pb.finish_and_clear();
                    result?
                }
                (None, None) => bail!("Refine needs --feedback or --profile"),
            };

            let pb = spinner("Refining learning path...");
            let result = service.refine_path(&path, &report, profile.as_ref()).await;
            pb.finish_and_clear();
            emit(&result?, output.as_deref())?;
        }
        Commands::AutoRefine { profile, path, iterations, ground_truth, output } => {
            let profile: LearnerProfile = read_json(&profile)?;
            let path: LearningPath = read_json(&path)?;
            let ground_truth = read_ground_truth(ground_truth.as_deref())?;
            let service = build_service(load_config(config_path)?)?;

            let cancel = CancelFlag::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Stopping after the current iteration...");
                    on_interrupt.cancel();
                }
            });

            let pb = spinner("Refining learning path...");
            let run = service
                .iterative_refine_with_cancel(&profile, &path, iterations, ground_truth.as_ref(), &cancel)
                .await;
            pb.finish_and_clear();

            if let Some(error) = run.error() {
                eprintln!(
                    "Refinement stopped early at iteration {} ({}): {}",
                    error.iteration, error.kind, error.message
                );
            }
            emit(&run, output.as_deref())?;
        }
        Commands::Personas => {
            emit(&personas(), None)?;
        }
        Commands::Config { show, set_api_key, init, set_model } => {
            if let Some(key) = set_api_key {
                crate::security::keyring::set_api_key(&key)?;
                println!("API key stored.");
            } else if init {
                let path = match config_path {
                    Some(path) => path.to_path_buf(),
                    None => config::config_path()?,
                };
                Config::default().save_to(&path)?;
                println!("Wrote default configuration to {}", path.display());
            } else if let Some(args) = set_model {
                let mut config = load_config(config_path)?;
                if !config.models.set(&args[0], args[1].clone()) {
                    bail!(
                        "Unknown role '{}'. Available roles: {}",
                        args[0],
                        config::ModelsConfig::roles().join(", ")
                    );
                }
                match config_path {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
                println!("Model for {} set to {}", args[0], args[1]);
            } else if show {
                let config = load_config(config_path)?;
                print!("{}", config::describe(&config));
            } else {
                println!("Configuration options:");
                println!("  --show                   Display current configuration");
                println!("  --set-api-key <key>      Store the generation API key");
                println!("  --init                   Write the default configuration file");
                println!("  --set-model <role> <id>  Set model for a role");
                println!();
                println!("Model roles: {}", config::ModelsConfig::roles().join(", "));
                println!();
                println!("Default configuration:");
                print!("{}", config::default_config_toml());
            }
        }
    }

    Ok(())
}
