use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hopi::{make_agent, make_env, run_trials, AgentKind};
use hopi_core::{write_graphviz, Config, NodeAttr};
use hopi_envs::EnvKind;

#[derive(Parser)]
#[command(name = "hopi", about = "Active inference agents in small discrete worlds")]
struct Cli {
    /// Write debug logs to /tmp/hopi-debug.log (tail -f to inspect).
    #[arg(long, global = true)]
    debug: bool,

    /// Config file layered over the built-in defaults
    /// (default: ~/.config/hopi/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one or more episodes and print a summary of each.
    Run {
        #[command(flatten)]
        world: WorldArgs,

        #[arg(long, value_enum, default_value_t = AgentKind::Btai)]
        agent: AgentKind,

        /// Step budget (default: agent.max_steps from the config).
        #[arg(long)]
        steps: Option<usize>,

        /// Seed for planning and action sampling (default: agent.seed).
        #[arg(long)]
        seed: Option<u64>,

        /// Episodes to run with the same agent. A learning agent starts each
        /// trial from what it learned in the previous ones.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        trials: u32,

        /// `name index` lines clamped onto the agent's observations before
        /// the first trial.
        #[arg(long)]
        evidence: Option<PathBuf>,

        /// Print each episode report as JSON.
        #[arg(long)]
        json: bool,

        /// Write the agent's final factor graph in Graphviz format.
        #[arg(long)]
        graphviz: Option<PathBuf>,
    },
    /// Render an environment in its initial state.
    Show {
        #[command(flatten)]
        world: WorldArgs,
    },
}

#[derive(clap::Args)]
struct WorldArgs {
    #[arg(long, value_enum, default_value_t = EnvChoice::Maze)]
    env: EnvChoice,

    /// Grid file for the maze and frozen-lake environments.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Good path lengths for the graph environment.
    #[arg(long, value_delimiter = ',', default_values_t = vec![4usize, 2])]
    paths: Vec<usize>,

    /// Number of bad actions for the graph environment.
    #[arg(long, default_value_t = 1)]
    n_bad: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvChoice {
    Maze,
    Graph,
    FrozenLake,
}

impl From<EnvChoice> for EnvKind {
    fn from(choice: EnvChoice) -> Self {
        match choice {
            EnvChoice::Maze => EnvKind::Maze,
            EnvChoice::Graph => EnvKind::Graph,
            EnvChoice::FrozenLake => EnvKind::FrozenLake,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("/tmp/hopi-debug.log")?;
        tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
        tracing::info!("hopi debug log started, tail -f /tmp/hopi-debug.log");
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading ~/.config/hopi/config.toml")?,
    };

    match cli.command {
        Command::Show { world } => {
            let mut env = build_env(&world)?;
            env.reset()?;
            print!("{}", env.render());
        }
        Command::Run {
            world,
            agent,
            steps,
            seed,
            trials,
            evidence,
            json,
            graphviz,
        } => {
            let mut env = build_env(&world)?;
            let obs = env.reset()?;
            let seed = seed.unwrap_or(config.agent.seed);
            let mut agent = make_agent(agent, env.as_ref(), &obs, &config, seed)
                .context("building the agent")?;

            let reports = run_trials(
                env.as_mut(),
                agent.as_mut(),
                steps.unwrap_or(config.agent.max_steps),
                trials as usize,
                evidence.as_deref(),
            )
            .context("running the episodes")?;

            if let Some(path) = graphviz {
                let graph = agent
                    .graph()
                    .with_context(|| format!("the {} agent has no model to export", agent.name()))?;
                write_dot(graph, &path)?;
            }

            if json {
                for report in &reports {
                    println!("{}", serde_json::to_string_pretty(report)?);
                }
            } else {
                print!("{}", env.render());
                for (trial, report) in reports.iter().enumerate() {
                    if reports.len() > 1 {
                        print!("trial {}: ", trial + 1);
                    }
                    println!(
                        "{} agent, {} steps, solved: {}, actions: {:?}",
                        report.agent,
                        report.steps.len(),
                        report.solved,
                        report.actions()
                    );
                    if let Some(score) = report.score {
                        println!("score: {score}");
                    }
                }
            }
        }
    }
    Ok(())
}

fn build_env(world: &WorldArgs) -> anyhow::Result<Box<dyn hopi_envs::Environment>> {
    let kind = EnvKind::from(world.env);
    make_env(kind, world.file.as_deref(), &world.paths, world.n_bad)
        .with_context(|| format!("building the {kind} environment"))
}

fn write_dot(graph: &hopi_core::FactorGraph, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_graphviz(
        graph,
        &mut file,
        &[NodeAttr::Visits, NodeAttr::Cost, NodeAttr::Action],
    )?;
    file.flush()?;
    Ok(())
}
