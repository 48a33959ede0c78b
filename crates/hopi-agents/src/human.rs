//! An agent whose actions are typed in by a person.

use std::io::{BufRead, Write};

use hopi_envs::Environment;
use tracing::info;

use crate::error::{AgentError, Result};
use crate::{observation_index, Agent, StepOutcome};

/// Reads one action index per line from `input`, writing a prompt to
/// `prompt` first.
pub struct Human<R, W> {
    input: R,
    prompt: W,
}

impl<R: BufRead, W: Write> Human<R, W> {
    pub fn new(input: R, prompt: W) -> Self {
        Self { input, prompt }
    }

    fn read_action(&mut self, n_actions: usize) -> Result<usize> {
        write!(self.prompt, "What action do you want to play? [0-{}] ", n_actions.saturating_sub(1))?;
        self.prompt.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(AgentError::InvalidInput("end of input".to_string()));
        }
        let trimmed = line.trim();
        let action: usize = trimmed
            .parse()
            .map_err(|_| AgentError::InvalidInput(format!("{trimmed:?} is not an action index")))?;
        if action >= n_actions {
            return Err(AgentError::InvalidInput(format!(
                "action {action} out of range, expected 0..{n_actions}"
            )));
        }
        Ok(action)
    }
}

impl<R: BufRead, W: Write> Agent for Human<R, W> {
    fn step(&mut self, env: &mut dyn Environment) -> Result<StepOutcome> {
        let action = self.read_action(env.actions())?;
        let obs = env.execute(action)?;
        let observation = observation_index(&obs)?;
        info!(agent = self.name(), action, observation, "step");
        Ok(StepOutcome {
            action,
            observation,
            vfe: None,
        })
    }

    fn name(&self) -> &'static str {
        "human"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopi_envs::GraphEnv;

    #[test]
    fn reads_one_action_per_line() {
        let mut env = GraphEnv::new(1, 1, &[2]).unwrap();
        env.reset().unwrap();
        let mut human = Human::new("0\n 0 \n".as_bytes(), Vec::new());

        assert_eq!(human.step(&mut env).unwrap().action, 0);
        assert_eq!(human.step(&mut env).unwrap().action, 0);
        assert!(env.solved());
    }

    #[test]
    fn rejects_garbage_and_eof() {
        let mut env = GraphEnv::new(1, 1, &[2]).unwrap();
        env.reset().unwrap();

        let mut human = Human::new("left\n".as_bytes(), Vec::new());
        assert!(matches!(human.step(&mut env), Err(AgentError::InvalidInput(_))));

        let mut human = Human::new("7\n".as_bytes(), Vec::new());
        assert!(matches!(human.step(&mut env), Err(AgentError::InvalidInput(_))));

        let mut human = Human::new("".as_bytes(), Vec::new());
        assert!(matches!(human.step(&mut env), Err(AgentError::InvalidInput(_))));
    }
}
