//! Branching-time active inference driven by [`Mcts`].

use hopi_core::{FactorGraph, Param, Tensor, VarId, Vmp};
use hopi_envs::Environment;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::Result;
use crate::mcts::{Mcts, MctsConfig};
use crate::{name_slice, observation_index, root_slice, Agent, StepOutcome};

#[derive(Debug)]
pub struct Btai {
    graph: FactorGraph,
    a: Tensor,
    b: Tensor,
    d: Tensor,
    mcts: Mcts,
    vmp: Vmp,
    rng: StdRng,
    cycle: usize,
}

impl Btai {
    /// Build the initial model `s0 ~ Cat(D)`, `o0 ~ Cat(A · s0)` with `o0`
    /// clamped to `obs`, and make `s0` the tree root.
    pub fn new(env: &dyn Environment, obs: &Tensor, config: MctsConfig, vmp: Vmp, seed: u64) -> Result<Self> {
        let a = env.a()?;
        let d = env.d()?;
        let graph = initial_graph(&a, &d, obs)?;

        Ok(Self {
            graph,
            a,
            b: env.b()?,
            d,
            mcts: Mcts::new(config),
            vmp,
            rng: StdRng::seed_from_u64(seed),
            cycle: 0,
        })
    }

    pub fn mcts(&self) -> &Mcts {
        &self.mcts
    }

    /// Grow the planning tree below the current root.
    pub fn plan(&mut self, n_actions: usize) -> Result<VarId> {
        let root = self.graph.tree_root()?;
        for _ in 0..self.mcts.config().planning_steps {
            let selected = self.mcts.select_node(&self.graph, root, n_actions)?;
            let expanded = self.mcts.expansion(&mut self.graph, selected, &self.a, &self.b)?;
            self.vmp.run(&mut self.graph, &expanded)?;
            self.mcts.evaluation(&mut self.graph, &expanded, &self.a)?;
            self.mcts.propagation(&mut self.graph, &expanded, root)?;
        }
        debug!(
            steps = self.mcts.config().planning_steps,
            nodes = self.graph.n_nodes(),
            "planning done"
        );
        Ok(root)
    }
}

impl Agent for Btai {
    fn step(&mut self, env: &mut dyn Environment) -> Result<StepOutcome> {
        let report = self.vmp.run_all(&mut self.graph)?;
        let root = self.plan(env.actions())?;

        let action = self.mcts.select_action(&self.graph, root, &mut self.rng)?;
        let obs = env.execute(action)?;
        let state = self
            .graph
            .integrate(action, &obs, Param::Fixed(&self.a), Param::Fixed(&self.b))?;
        self.cycle += 1;
        name_slice(&mut self.graph, state, self.cycle)?;

        let outcome = StepOutcome {
            action,
            observation: observation_index(&obs)?,
            vfe: Some(report.vfe),
        };
        info!(agent = self.name(), action, observation = outcome.observation, vfe = report.vfe, "step");
        Ok(outcome)
    }

    fn start_trial(&mut self, obs: &Tensor) -> Result<()> {
        self.graph = initial_graph(&self.a, &self.d, obs)?;
        self.cycle = 0;
        Ok(())
    }

    fn graph(&self) -> Option<&FactorGraph> {
        Some(&self.graph)
    }

    fn graph_mut(&mut self) -> Option<&mut FactorGraph> {
        Some(&mut self.graph)
    }

    fn name(&self) -> &'static str {
        "btai"
    }
}

fn initial_graph(a: &Tensor, d: &Tensor, obs: &Tensor) -> Result<FactorGraph> {
    let mut graph = FactorGraph::new();
    let s0 = graph.categorical(d.clone())?;
    let o0 = graph.transition(s0, a.clone())?;
    root_slice(&mut graph, s0, o0, obs)?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopi_core::Config;
    use hopi_envs::GraphEnv;

    #[test]
    fn step_moves_the_root_and_prunes_the_plan() {
        let mut env = GraphEnv::new(1, 1, &[2]).unwrap();
        let obs = env.reset().unwrap();
        let mut settings = Config::defaults().mcts;
        settings.planning_steps = 5;
        let config = MctsConfig::new(&env.pref_obs().unwrap(), &env.pref_states().unwrap(), &settings).unwrap();
        let mut agent = Btai::new(&env, &obs, config, Vmp::default(), 3).unwrap();

        let before = agent.graph().unwrap().tree_root().unwrap();
        let outcome = agent.step(&mut env).unwrap();
        let graph = agent.graph().unwrap();

        assert!(outcome.action < 2);
        assert_ne!(graph.tree_root().unwrap(), before);
        assert!(graph.action_children(before).unwrap().is_empty());
        assert_eq!(graph.find_by_name("s0"), Some(before));
        assert_eq!(graph.find_by_name("s1"), Some(graph.tree_root().unwrap()));
        assert!(graph.find_by_name("o1").is_some());
    }

    #[test]
    fn new_trial_starts_from_a_single_slice() {
        let mut env = GraphEnv::new(1, 1, &[2]).unwrap();
        let obs = env.reset().unwrap();
        let mut settings = Config::defaults().mcts;
        settings.planning_steps = 5;
        let config = MctsConfig::new(&env.pref_obs().unwrap(), &env.pref_states().unwrap(), &settings).unwrap();
        let mut agent = Btai::new(&env, &obs, config, Vmp::default(), 3).unwrap();
        agent.step(&mut env).unwrap();

        let obs = env.reset().unwrap();
        agent.start_trial(&obs).unwrap();

        let graph = agent.graph().unwrap();
        assert_eq!(graph.n_nodes(), 2);
        assert_eq!(graph.tree_root().unwrap(), graph.find_by_name("s0").unwrap());
    }
}
