#![allow(unused)]
//! End-to-end episode harness.
//!
//! # What this covers
//!
//! - **Episode runner**: resets the environment, stops when the environment
//!   is solved or the step budget is spent, and reports what happened.
//! - **Trials**: several episodes with one agent; a learning agent carries
//!   its Dirichlet counts, including per-cycle action priors, into the next
//!   trial, and an evidence file is clamped before the first one.
//! - **Agents**: every agent kind acts with valid actions; planning agents
//!   are reproducible for a fixed seed and report a finite free energy. A
//!   depth-one tree whose frontier runs out before the planning budget still
//!   yields an action.
//! - **Reports**: the JSON form of an [`EpisodeReport`].
//! - **CLI**: `hopi show` and `hopi run --json` against the demo layouts,
//!   with a config file layered over the defaults, `--trials` and
//!   `--evidence`.
//!
//! # What this does NOT cover
//!
//! - Planner internals (see `planning_harness`)
//! - Whether an agent solves a given world within a budget; planning is
//!   stochastic and only its invariants are checked here.
//!
//! # Running
//!
//! ```sh
//! cargo test --test episode_harness
//! ```

mod common;
use common::*;

use std::path::PathBuf;
use std::process::Command;

use hopi::agents::{Agent, AgentError, Human};
use hopi::{make_agent, run_episode, run_trials, AgentKind, EpisodeReport};
use hopi_core::Config;
use hopi_envs::{EnvKind, Environment, GraphEnv, MazeEnv};
use pretty_assertions::assert_eq;
use rstest::rstest;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Defaults with planning budgets small enough for a test run.
fn quick_config() -> Config {
    let mut config = Config::defaults();
    config.mcts.planning_steps = 12;
    config.algo_tree.planning_steps = 12;
    config.algo_tree.max_tree_depth = Some(3);
    config
}

fn graph_env() -> GraphEnv {
    GraphEnv::new(2, 1, &[3, 1]).unwrap()
}

fn episode(kind: AgentKind, env: &mut dyn Environment, seed: u64, max_steps: usize) -> EpisodeReport {
    let obs = env.reset().unwrap();
    let mut agent = make_agent(kind, env, &obs, &quick_config(), seed).unwrap();
    run_episode(env, agent.as_mut(), max_steps).unwrap()
}

fn demo(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(path)
}

// ---------------------------------------------------------------------------
// Episode runner
// ---------------------------------------------------------------------------

#[test]
fn scripted_human_solves_the_corridor() {
    let mut env: MazeEnv = MAZE_CORRIDOR.parse().unwrap();
    let mut prompt = Vec::new();
    let mut human = Human::new("3\n3\n3\n3\n3\n".as_bytes(), &mut prompt);

    let report = run_episode(&mut env, &mut human, 10).unwrap();

    assert!(report.solved);
    assert_eq!(report.actions(), vec![3, 3, 3, 3]);
    assert_eq!(report.steps.last().unwrap().observation, 0);
    assert_eq!(report.agent, "human");
    assert_eq!(report.env, EnvKind::Maze);
    assert!(String::from_utf8(prompt).unwrap().contains("[0-4]"));
}

#[test]
fn step_budget_ends_the_episode() {
    let mut env: MazeEnv = MAZE_1.parse().unwrap();
    let mut human = Human::new("4\n4\n4\n4\n".as_bytes(), Vec::new());

    let report = run_episode(&mut env, &mut human, 3).unwrap();

    assert!(!report.solved);
    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.score, None);
}

#[test]
fn episode_starts_from_a_reset_environment() {
    let mut env: MazeEnv = MAZE_CORRIDOR.parse().unwrap();
    env.reset().unwrap();
    for _ in 0..4 {
        env.execute(3).unwrap();
    }
    assert!(env.solved());

    let mut human = Human::new("3\n".as_bytes(), Vec::new());
    let report = run_episode(&mut env, &mut human, 1).unwrap();

    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].observation, 3);
}

#[test]
fn agent_errors_abort_the_episode() {
    let mut env: MazeEnv = MAZE_CORRIDOR.parse().unwrap();
    let mut human = Human::new("3\n".as_bytes(), Vec::new());
    let err = run_episode(&mut env, &mut human, 10).unwrap_err();
    assert!(matches!(err, AgentError::InvalidInput(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[rstest]
#[case::btai(AgentKind::Btai)]
#[case::tree(AgentKind::Tree)]
#[case::tree_learning(AgentKind::TreeLearning)]
fn planning_agents_act_validly(#[case] kind: AgentKind) {
    let mut env = graph_env();
    let report = episode(kind, &mut env, 5, 4);

    assert!(!report.steps.is_empty());
    assert!(report.steps.len() <= 4);
    assert!(report.solved || report.steps.len() == 4);
    for step in &report.steps {
        assert!(step.action < env.actions());
        assert!(step.observation < env.observations());
        let vfe = step.vfe.expect("planning agents report free energy");
        assert!(vfe.is_finite());
    }
}

#[rstest]
#[case::btai(AgentKind::Btai)]
#[case::tree(AgentKind::Tree)]
fn planning_is_reproducible_for_a_seed(#[case] kind: AgentKind) {
    let mut first: MazeEnv = MAZE_CORRIDOR.parse().unwrap();
    let mut second: MazeEnv = MAZE_CORRIDOR.parse().unwrap();

    let a = episode(kind, &mut first, 99, 3);
    let b = episode(kind, &mut second, 99, 3);

    assert_eq!(a.actions(), b.actions());
    assert_eq!(a.steps, b.steps);
}

#[rstest]
#[case::tree(AgentKind::Tree)]
#[case::tree_learning(AgentKind::TreeLearning)]
fn depth_one_tree_outlives_its_frontier(#[case] kind: AgentKind) {
    let mut config = quick_config();
    config.algo_tree.max_tree_depth = Some(1);
    config.algo_tree.planning_steps = 10;
    let mut env = GraphEnv::new(2, 1, &[3, 1]).unwrap();
    let obs = env.reset().unwrap();
    let mut agent = make_agent(kind, &env, &obs, &config, 8).unwrap();

    let report = run_episode(&mut env, agent.as_mut(), 3).unwrap();

    assert!(!report.steps.is_empty());
    for step in &report.steps {
        assert!(step.action < env.actions());
    }
}

#[test]
fn planning_agents_keep_their_model() {
    let mut env = graph_env();
    let obs = env.reset().unwrap();
    let mut agent = make_agent(AgentKind::Btai, &env, &obs, &quick_config(), 1).unwrap();
    let before = agent.graph().unwrap().n_observed();

    agent.step(&mut env).unwrap();

    let graph = agent.graph().unwrap();
    assert_eq!(graph.n_observed(), before + 1);
    assert!(graph.tree_root().is_ok());
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

#[test]
fn learning_agent_carries_action_counts_across_trials() {
    let mut env = graph_env();
    let obs = env.reset().unwrap();
    let mut agent = make_agent(AgentKind::TreeLearning, &env, &obs, &quick_config(), 4).unwrap();

    let reports = run_trials(&mut env, agent.as_mut(), 2, 3, None).unwrap();

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| !r.steps.is_empty()));
    let graph = agent.graph().unwrap();
    let u0 = graph.find_by_name("U0").expect("first cycle has an action prior");
    let counts = graph.var(u0).unwrap().prior().unwrap().params().sum().unwrap();
    // flat counts, one bump per trial and the action mass learned in the first
    assert!(counts >= env.actions() as f64 + 2.0 - 1e-9, "U0 holds {counts}");
    assert_eq!(graph.tree_root().unwrap(), graph.find_by_name(&format!("s{}", reports[2].steps.len())).unwrap());
}

#[test]
fn fixed_model_restarts_every_trial() {
    let mut env = graph_env();
    let obs = env.reset().unwrap();
    let mut agent = make_agent(AgentKind::Tree, &env, &obs, &quick_config(), 4).unwrap();

    let reports = run_trials(&mut env, agent.as_mut(), 1, 2, None).unwrap();

    assert_eq!(reports.len(), 2);
    let graph = agent.graph().unwrap();
    // s0, o0 plus one action, state and observation
    assert_eq!(graph.n_observed(), 2);
    assert!(graph.find_by_name("s1").is_some());
}

#[test]
fn evidence_is_clamped_before_the_first_trial() {
    let mut env = graph_env();
    let obs = env.reset().unwrap();
    let mut agent = make_agent(AgentKind::Tree, &env, &obs, &quick_config(), 2).unwrap();
    let evidence = temp_file("evidence.txt", "o0 1\n");

    run_trials(&mut env, agent.as_mut(), 1, 1, Some(evidence.path.as_path())).unwrap();

    let graph = agent.graph().unwrap();
    let o0 = graph.find_by_name("o0").unwrap();
    assert_eq!(graph.var(o0).unwrap().posterior().params().argmax().unwrap(), Some(1));
}

#[test]
fn evidence_needs_an_agent_with_a_model() {
    let mut env: MazeEnv = MAZE_CORRIDOR.parse().unwrap();
    let mut human = Human::new("3\n".as_bytes(), Vec::new());
    let evidence = temp_file("evidence.txt", "o0 1\n");

    let err = run_trials(&mut env, &mut human, 1, 1, Some(evidence.path.as_path())).unwrap_err();

    assert!(matches!(err, AgentError::NoModel("human")), "{err}");
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[test]
fn report_serialises_to_json() {
    let mut env: MazeEnv = MAZE_CORRIDOR.parse().unwrap();
    let mut human = Human::new("3\n".as_bytes(), Vec::new());
    let report = run_episode(&mut env, &mut human, 1).unwrap();

    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "env": "maze",
            "agent": "human",
            "steps": [{ "action": 3, "observation": 3, "vfe": null }],
            "solved": false,
            "score": null,
        })
    );
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

fn hopi(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hopi"));
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd
}

#[test]
fn cli_show_renders_the_maze() {
    let home = tempfile::tempdir().unwrap();
    let out = hopi(home.path())
        .args(["show", "--env", "maze", "--file"])
        .arg(demo("mazes/1.maze"))
        .output()
        .unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("WWWWWWWW\nW     EW\n"), "{stdout}");
    assert!(stdout.contains("A = agent position"));
    // first use writes the default config
    assert!(home.path().join("hopi").join("config.toml").exists());
}

#[test]
fn cli_run_prints_a_json_report() {
    let home = tempfile::tempdir().unwrap();
    let config = temp_file(
        "config.toml",
        "[mcts]\nplanning_steps = 8\n\n[agent]\nmax_steps = 2\n",
    );
    let out = hopi(home.path())
        .arg("--config")
        .arg(&config.path)
        .args(["run", "--env", "graph", "--paths", "2,1", "--agent", "btai", "--json"])
        .output()
        .unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["env"], "graph");
    assert_eq!(report["agent"], "btai");
    let steps = report["steps"].as_array().unwrap();
    assert!(!steps.is_empty() && steps.len() <= 2);
}

#[test]
fn cli_runs_several_trials_with_evidence() {
    let home = tempfile::tempdir().unwrap();
    let config = temp_file(
        "config.toml",
        "[algo_tree]\nplanning_steps = 6\nmax_tree_depth = 2\n\n[agent]\nmax_steps = 2\n",
    );
    let evidence = temp_file("evidence.txt", "o0 0\n");
    let out = hopi(home.path())
        .arg("--config")
        .arg(&config.path)
        .args(["run", "--env", "graph", "--paths", "2,1", "--agent", "tree-learning"])
        .args(["--trials", "2", "--json", "--evidence"])
        .arg(&evidence.path)
        .output()
        .unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let reports: Vec<serde_json::Value> = serde_json::Deserializer::from_slice(&out.stdout)
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report["agent"], "tree-learning");
    }
}

#[test]
fn cli_rejects_zero_trials() {
    let home = tempfile::tempdir().unwrap();
    let out = hopi(home.path())
        .args(["run", "--env", "graph", "--trials", "0"])
        .output()
        .unwrap();

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--trials"));
}

#[test]
fn cli_reports_missing_grid_file() {
    let home = tempfile::tempdir().unwrap();
    let out = hopi(home.path())
        .args(["show", "--env", "frozen-lake"])
        .output()
        .unwrap();

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("needs a grid file"));
}
