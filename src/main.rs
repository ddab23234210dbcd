//! CLI entry point for the BigToM study tools.
//!
//! Subcommands cover the whole pipeline: generating conditions from story
//! templates, evaluating models on them, sampling and formatting the human
//! experiments, and summarising results into tables.

use anyhow::{Context, Result};
use bigtom::analysis::{
    Contingency, DEFAULT_RESAMPLES, EXPERT_COMBINED_FILE, PlotFilter, RAW_RESULTS_FILE, ResultRow,
    combine_expert_ratings, compute_stats, format_exp_1, format_exp_2, format_model_results,
    plot_table,
};
use bigtom::conditions::{
    ConditionKey, InitialBelief, TruthCondition, Variable, generate_conditions,
};
use bigtom::config::Settings;
use bigtom::evaluate::{EvaluationRequest, evaluate_condition};
use bigtom::llm::{from_model_name, grader_from_model_name};
use bigtom::output::{read_records, write_records};
use bigtom::prompts::{Method, PromptSet};
use bigtom::stories::{StoryRequest, generate_stories};
use bigtom::tasks::{EXP2_QUOTAS, label_mcq_dir, sample_exp1, sample_exp2, write_condition_files};
use bigtom::template::load_templates;
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bigtom")]
#[command(about = "Generate, evaluate and analyse theory-of-mind story conditions", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Experiment {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one stories.csv per condition from the story templates
    GenerateConditions {
        /// Template file (defaults to <data_dir>/bigtom/bigtom.csv)
        #[arg(short, long)]
        templates: Option<PathBuf>,

        /// Output directory (defaults to <data_dir>/conditions)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Variables to generate; repeat the flag for several
        #[arg(long = "variable")]
        variables: Vec<Variable>,
    },
    /// Evaluate a model on one condition and grade its answers
    Evaluate {
        #[arg(long, default_value = "openai/text-davinci-003")]
        model_name: String,

        /// Grading model; must be a CRFM openai/* model
        #[arg(long, default_value = "openai/text-davinci-003")]
        eval_model: String,

        #[arg(long, default_value_t = 0.0)]
        temperature: f64,

        #[arg(long, default_value = "0shot")]
        method: Method,

        #[arg(long, default_value = "0")]
        init_belief: InitialBelief,

        #[arg(long, default_value = "forward_belief")]
        variable: Variable,

        #[arg(long, default_value = "true_belief")]
        condition: TruthCondition,

        /// First row to evaluate
        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// End (exclusive) of the rows to evaluate
        #[arg(short, long, default_value_t = 1)]
        num_probs: usize,

        #[arg(long, default_value_t = 100)]
        max_tokens: u32,

        /// Present the answers as a) / b) options
        #[arg(long, default_value_t = false)]
        mcq: bool,
    },
    /// Generate new story templates with a chat model
    GenerateStories {
        #[arg(long, default_value = "gpt-4")]
        model: String,

        #[arg(long, default_value_t = 0.5)]
        temperature: f64,

        #[arg(long, default_value_t = 450)]
        max_tokens: u32,

        #[arg(long, default_value_t = 3)]
        num_shots: usize,

        #[arg(short, long, default_value_t = 1)]
        num_stories: usize,

        /// Template file to read examples from and append to
        #[arg(short, long)]
        templates: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Sample the Prolific condition files of an experiment
    SampleTasks {
        #[arg(short, long, value_enum)]
        experiment: Experiment,

        #[arg(short, long, default_value = "prolific")]
        out_dir: PathBuf,

        #[arg(long)]
        seed: Option<u64>,
    },
    /// Add answers_no_label and true_labels to every condition_*.json
    LabelMcq {
        #[arg(short, long, default_value = "prolific")]
        dir: PathBuf,
    },
    /// Collect every accuracy file into one results table
    FormatResults {
        /// Defaults to <data_dir>/results
        #[arg(short, long)]
        results_dir: Option<PathBuf>,

        /// Defaults to <results_dir>/raw_model_results.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Reshape the experiment 1 exports into main_01_long.csv
    FormatExp1 {
        #[arg(short, long, default_value = "data/prolific/exp_1")]
        dir: PathBuf,
    },
    /// Reshape the experiment 2 exports into main_02_long.csv
    FormatExp2 {
        #[arg(short, long, default_value = "data/prolific/exp_2")]
        dir: PathBuf,
    },
    /// Combine two expert rating files and report their agreement
    FormatExpert {
        first: PathBuf,
        second: PathBuf,

        /// Defaults to expert_combined.csv beside the first file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Mean accuracy with bootstrap intervals from a results table
    Stats {
        /// Defaults to <data_dir>/results/raw_model_results.csv
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long, default_value = "stats.csv")]
        output: PathBuf,

        /// Restrict to one model and apply a contingency, as for a plot
        #[arg(long)]
        model_name: Option<String>,

        #[arg(long, default_value = "1")]
        init_belief: String,

        #[arg(long, default_value = "belief")]
        condition: String,

        #[arg(long, default_value = "0shot")]
        method: String,

        #[arg(long, default_value = "false_and_true")]
        contingency: Contingency,

        #[arg(long, default_value_t = DEFAULT_RESAMPLES)]
        resamples: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn rng_from(seed: Option<u64>) -> ChaCha20Rng {
    match seed {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed),
        None => ChaCha20Rng::from_entropy(),
    }
}

fn default_templates(settings: &Settings) -> PathBuf {
    settings.data_dir.join("bigtom").join("bigtom.csv")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bigtom.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bigtom.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_level = if cli.verbose { "debug" } else { "info" };
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(stderr_level.parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let settings = Settings::from_env()?;

    match cli.command {
        Commands::GenerateConditions {
            templates,
            out_dir,
            variables,
        } => {
            let templates_path = templates.unwrap_or_else(|| default_templates(&settings));
            let templates = load_templates(&templates_path)?;
            let variables = if variables.is_empty() {
                Variable::STUDY.to_vec()
            } else {
                variables
            };
            let keys = ConditionKey::grid(&InitialBelief::ALL, &variables, &TruthCondition::ALL);
            let out_dir = out_dir.unwrap_or_else(|| settings.conditions_dir());
            let counts = generate_conditions(&templates, &keys, &out_dir)?;
            info!(
                templates = templates.len(),
                conditions = counts.len(),
                out_dir = %out_dir.display(),
                "Conditions generated"
            );
        }
        Commands::Evaluate {
            model_name,
            eval_model,
            temperature,
            method,
            init_belief,
            variable,
            condition,
            offset,
            num_probs,
            max_tokens,
            mcq,
        } => {
            let prompts = PromptSet::load(&settings.prompt_dir)?;
            let model = from_model_name(&model_name, temperature, &settings)?;
            let grader = grader_from_model_name(&eval_model, &settings)?;
            let request = EvaluationRequest {
                key: ConditionKey::new(init_belief, variable, condition),
                model_name,
                temperature,
                method,
                offset,
                num_probs,
                max_tokens,
                mcq,
            };
            let outcome = evaluate_condition(
                model.as_ref(),
                grader.as_ref(),
                &prompts,
                &settings.conditions_dir(),
                &settings.results_dir(),
                &request,
            )
            .await?;
            info!(
                accuracy = outcome.accuracy,
                predictions = %outcome.prediction_path.display(),
                grades = %outcome.accuracy_path.display(),
                "Evaluation written"
            );
        }
        Commands::GenerateStories {
            model,
            temperature,
            max_tokens,
            num_shots,
            num_stories,
            templates,
            seed,
        } => {
            let instruction_path = settings.prompt_dir.join("bigtom.txt");
            let instruction = std::fs::read_to_string(&instruction_path)
                .with_context(|| format!("reading prompt {}", instruction_path.display()))?;
            let templates = templates.unwrap_or_else(|| default_templates(&settings));
            let model = from_model_name(&model, temperature, &settings)?;
            let request = StoryRequest {
                num_stories,
                num_shots,
                max_tokens,
            };
            let mut rng = rng_from(seed);
            let report =
                generate_stories(model.as_ref(), &instruction, &templates, &request, &mut rng).await?;
            info!(
                written = report.written,
                skipped = report.skipped,
                price_usd = %format!("{:.2}", report.price()),
                "Story generation finished"
            );
        }
        Commands::SampleTasks {
            experiment,
            out_dir,
            seed,
        } => {
            let mut rng = rng_from(seed);
            let conditions = match experiment {
                Experiment::One => sample_exp1(&settings.data_dir, &mut rng)?,
                Experiment::Two => vec![sample_exp2(&settings.conditions_dir(), &EXP2_QUOTAS, &mut rng)?],
            };
            let written = write_condition_files(&out_dir, &conditions)?;
            info!(files = written.len(), out_dir = %out_dir.display(), "Condition files written");
        }
        Commands::LabelMcq { dir } => {
            let written = label_mcq_dir(&dir)?;
            info!(files = written.len(), dir = %dir.display(), "MCQ files written");
        }
        Commands::FormatResults {
            results_dir,
            output,
        } => {
            let results_dir = results_dir.unwrap_or_else(|| settings.results_dir());
            let output = output.unwrap_or_else(|| results_dir.join(RAW_RESULTS_FILE));
            format_model_results(&results_dir, &output)?;
        }
        Commands::FormatExp1 { dir } => {
            format_exp_1(&dir)?;
        }
        Commands::FormatExp2 { dir } => {
            format_exp_2(&dir)?;
        }
        Commands::FormatExpert {
            first,
            second,
            output,
        } => {
            let output = output.unwrap_or_else(|| first.with_file_name(EXPERT_COMBINED_FILE));
            let agreement = combine_expert_ratings(&first, &second, &output)?;
            match agreement.alpha {
                Some(alpha) => info!(
                    items = agreement.items,
                    percentage = agreement.percentage,
                    alpha,
                    "Expert agreement"
                ),
                None => info!(
                    items = agreement.items,
                    percentage = agreement.percentage,
                    "Expert agreement; alpha undefined (no variation)"
                ),
            }
        }
        Commands::Stats {
            input,
            output,
            model_name,
            init_belief,
            condition,
            method,
            contingency,
            resamples,
            seed,
        } => {
            let input = input.unwrap_or_else(|| settings.results_dir().join(RAW_RESULTS_FILE));
            let rows: Vec<ResultRow> = read_records(&input)?;
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let stats = match model_name {
                Some(model_name) => {
                    let filter = PlotFilter {
                        model_name,
                        init_belief,
                        condition,
                        method,
                        contingency,
                    };
                    plot_table(&rows, &filter, resamples, &mut rng)?
                }
                None => compute_stats(&rows, resamples, &mut rng)?,
            };
            write_records(&output, &stats)?;
            info!(groups = stats.len(), output = %output.display(), "Statistics written");
        }
    }

    Ok(())
}
