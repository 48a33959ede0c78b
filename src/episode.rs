//! Episode runner: reset an environment and let an agent act until the
//! environment is solved or the step budget runs out.

use std::path::Path;

use hopi_agents::{Agent, AgentError, StepOutcome};
use hopi_envs::{EnvKind, Environment};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeReport {
    pub env: EnvKind,
    pub agent: &'static str,
    pub steps: Vec<StepOutcome>,
    pub solved: bool,
    /// Final score, for environments that keep one.
    pub score: Option<f64>,
}

impl EpisodeReport {
    pub fn actions(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.action).collect()
    }
}

/// Reset `env`, then step `agent` in it for at most `max_steps` cycles.
///
/// Every environment starts from a fixed position, so an agent built from an
/// earlier `reset` observation sees the same starting point here.
pub fn run_episode(
    env: &mut dyn Environment,
    agent: &mut dyn Agent,
    max_steps: usize,
) -> hopi_agents::Result<EpisodeReport> {
    env.reset()?;
    let mut steps = Vec::new();
    while steps.len() < max_steps && !env.solved() {
        let outcome = agent.step(env)?;
        steps.push(outcome);
    }

    let report = EpisodeReport {
        env: env.kind(),
        agent: agent.name(),
        solved: env.solved(),
        score: env.score(),
        steps,
    };
    info!(
        env = %report.env,
        agent = report.agent,
        steps = report.steps.len(),
        solved = report.solved,
        "episode finished"
    );
    Ok(report)
}

/// Run `trials` episodes back to back with the same agent.
///
/// Before every trial but the first the agent gets a chance to turn what it
/// learned into its next starting model. `evidence` is a `name index` file
/// clamped onto the agent's model before the first trial.
pub fn run_trials(
    env: &mut dyn Environment,
    agent: &mut dyn Agent,
    max_steps: usize,
    trials: usize,
    evidence: Option<&Path>,
) -> hopi_agents::Result<Vec<EpisodeReport>> {
    let mut reports = Vec::new();
    for trial in 0..trials {
        let obs = env.reset()?;
        if trial > 0 {
            agent.start_trial(&obs)?;
        } else if let Some(path) = evidence {
            let name = agent.name();
            let n_obs = env.observations();
            agent
                .graph_mut()
                .ok_or(AgentError::NoModel(name))?
                .load_evidence(n_obs, path)?;
            info!(path = %path.display(), "loaded evidence");
        }

        let report = run_episode(env, agent, max_steps)?;
        info!(trial, solved = report.solved, steps = report.steps.len(), "trial finished");
        reports.push(report);
    }
    Ok(reports)
}
