//! Agent that plans with a fresh [`AlgoTree`] at every step.
//!
//! The generative model is either the environment's own `A`/`B`/`D`
//! ([`TreeAgent::new`]) or a set of Dirichlet variables learned online
//! ([`TreeAgent::learning`]). A learning agent also keeps one Dirichlet
//! action prior `U_t` per action-perception cycle: the action taken at
//! cycle `t` bumps the count of `U_t` and is integrated as `Cat(U_t)`.
//!
//! Between trials the learned posteriors become the priors of a fresh model
//! ([`LearnedParams`]), so experience accumulates across episodes.

use hopi_core::config::AlgoTreeSettings;
use hopi_core::{ops, FactorGraph, Param, Tensor, VarId, Vmp};
use hopi_envs::Environment;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::algo_tree::{AlgoTree, AlgoTreeConfig};
use crate::error::Result;
use crate::{name_slice, observation_index, root_slice, Agent, StepOutcome};

#[derive(Debug, Clone)]
enum Model {
    Fixed { a: Tensor, b: Tensor, d: Tensor },
    /// Dirichlet variables over `[from, to]` (A), `[from, action, to]` (B),
    /// `[state]` (D) and `[action]` for each cycle's action prior (U).
    Learned { a: VarId, b: VarId, d: VarId, us: Vec<VarId> },
}

/// Dirichlet pseudo-counts of a learning agent, in the storage layout of
/// the graph (`A: [from, to]`, `B: [from, action, to]`).
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedParams {
    pub a: Tensor,
    pub b: Tensor,
    pub d: Tensor,
    /// One action prior per cycle reached so far.
    pub us: Vec<Tensor>,
}

impl LearnedParams {
    /// Flat counts of one everywhere and no action priors yet.
    pub fn flat(n_states: usize, n_obs: usize, n_actions: usize) -> Result<Self> {
        Ok(Self {
            a: Tensor::full(&[n_states, n_obs], 1.0)?,
            b: Tensor::full(&[n_states, n_actions, n_states], 1.0)?,
            d: Tensor::full(&[n_states], 1.0)?,
            us: Vec::new(),
        })
    }
}

#[derive(Debug)]
pub struct TreeAgent {
    graph: FactorGraph,
    model: Model,
    n_actions: usize,
    state_pref: Tensor,
    obs_pref: Tensor,
    settings: AlgoTreeSettings,
    vmp: Vmp,
    rng: StdRng,
    cycle: usize,
}

impl TreeAgent {
    /// Plan with the environment's true model.
    pub fn new(env: &dyn Environment, obs: &Tensor, settings: AlgoTreeSettings, vmp: Vmp, seed: u64) -> Result<Self> {
        let (a, b, d) = (env.a()?, env.b()?, env.d()?);
        let graph = fixed_graph(&a, &d, obs)?;
        Self::finish(env, graph, Model::Fixed { a, b, d }, settings, vmp, seed)
    }

    /// Plan with a model learned from uniform Dirichlet counts.
    pub fn learning(env: &dyn Environment, obs: &Tensor, settings: AlgoTreeSettings, vmp: Vmp, seed: u64) -> Result<Self> {
        let params = LearnedParams::flat(env.states(), env.observations(), env.actions())?;
        Self::learning_from(env, obs, &params, settings, vmp, seed)
    }

    /// Plan with a model whose Dirichlet priors start at `params`.
    pub fn learning_from(
        env: &dyn Environment,
        obs: &Tensor,
        params: &LearnedParams,
        settings: AlgoTreeSettings,
        vmp: Vmp,
        seed: u64,
    ) -> Result<Self> {
        let (graph, model) = learned_graph(params, obs)?;
        Self::finish(env, graph, model, settings, vmp, seed)
    }

    fn finish(
        env: &dyn Environment,
        graph: FactorGraph,
        model: Model,
        settings: AlgoTreeSettings,
        vmp: Vmp,
        seed: u64,
    ) -> Result<Self> {
        Ok(Self {
            graph,
            model,
            n_actions: env.actions(),
            state_pref: ops::softmax(&env.pref_states()?)?,
            obs_pref: ops::softmax(&env.pref_obs()?)?,
            settings,
            vmp,
            rng: StdRng::seed_from_u64(seed),
            cycle: 0,
        })
    }

    pub fn is_learning(&self) -> bool {
        matches!(self.model, Model::Learned { .. })
    }

    /// Current posterior counts of a learning agent; `None` for a fixed model.
    pub fn learned_params(&self) -> Result<Option<LearnedParams>> {
        let Model::Learned { a, b, d, us } = &self.model else {
            return Ok(None);
        };
        let posterior = |var: VarId| -> Result<Tensor> { Ok(self.graph.var(var)?.posterior().params().clone()) };
        Ok(Some(LearnedParams {
            a: posterior(*a)?,
            b: posterior(*b)?,
            d: posterior(*d)?,
            us: us.iter().map(|&u| posterior(u)).collect::<Result<_>>()?,
        }))
    }

    /// Build a new tree below the current root and pick an action.
    pub fn plan(&mut self) -> Result<usize> {
        let config = AlgoTreeConfig::from_settings(
            self.n_actions,
            self.state_pref.clone(),
            self.obs_pref.clone(),
            &self.settings,
        );
        let mut tree = AlgoTree::new(config, self.rng.gen());
        let root = self.graph.tree_root()?;

        let mut steps = 0;
        while steps < self.settings.planning_steps {
            let Some(n) = tree.node_selection(&mut self.graph)? else {
                debug!(steps, "frontier exhausted");
                break;
            };
            match &self.model {
                Model::Fixed { a, b, .. } => tree.expansion(&mut self.graph, n, a, b)?,
                Model::Learned { a, b, .. } => tree.expansion_learned(&mut self.graph, n, *a, *b)?,
            }
            let expanded = tree.last_expanded_nodes();
            self.vmp.run(&mut self.graph, &expanded)?;
            tree.evaluation(&mut self.graph)?;
            if let Some(&s) = expanded.first() {
                tree.propagation(&mut self.graph, s, root)?;
            }
            steps += 1;
        }
        debug!(steps, frontier = tree.unexplored().len(), "planning done");
        tree.action_selection(&self.graph, root)
    }

    /// Integrate `action` and `obs`; a learning agent draws the action from
    /// this cycle's Dirichlet prior, creating it on first use.
    fn integrate(&mut self, action: usize, obs: &Tensor) -> Result<VarId> {
        let cycle = self.cycle;
        let state = match &mut self.model {
            Model::Fixed { a, b, .. } => self.graph.integrate(action, obs, Param::Fixed(a), Param::Fixed(b))?,
            Model::Learned { a, b, us, .. } => {
                while us.len() <= cycle {
                    let u = self.graph.dirichlet(Tensor::full(&[self.n_actions], 1.0)?)?;
                    self.graph.var_mut(u)?.set_name(format!("U{}", us.len()));
                    us.push(u);
                }
                self.graph
                    .integrate_with_prior(us[cycle], action, obs, Param::Learned(*a), Param::Learned(*b))?
            }
        };
        self.cycle += 1;
        name_slice(&mut self.graph, state, self.cycle)?;
        Ok(state)
    }
}

impl Agent for TreeAgent {
    fn step(&mut self, env: &mut dyn Environment) -> Result<StepOutcome> {
        let report = self.vmp.run_all(&mut self.graph)?;
        let action = self.plan()?;
        let obs = env.execute(action)?;
        self.integrate(action, &obs)?;

        let outcome = StepOutcome {
            action,
            observation: observation_index(&obs)?,
            vfe: Some(report.vfe),
        };
        info!(agent = self.name(), action, observation = outcome.observation, vfe = report.vfe, "step");
        Ok(outcome)
    }

    fn start_trial(&mut self, obs: &Tensor) -> Result<()> {
        self.cycle = 0;
        match &self.model {
            Model::Fixed { a, d, .. } => self.graph = fixed_graph(a, d, obs)?,
            Model::Learned { .. } => {
                // fold the last slice into the posteriors before they become priors
                let report = self.vmp.run_all(&mut self.graph)?;
                if let Some(params) = self.learned_params()? {
                    info!(vfe = report.vfe, cycles = params.us.len(), "carrying learned counts into a new trial");
                    (self.graph, self.model) = learned_graph(&params, obs)?;
                }
            }
        }
        Ok(())
    }

    fn graph(&self) -> Option<&FactorGraph> {
        Some(&self.graph)
    }

    fn graph_mut(&mut self) -> Option<&mut FactorGraph> {
        Some(&mut self.graph)
    }

    fn name(&self) -> &'static str {
        if self.is_learning() {
            "tree-learning"
        } else {
            "tree"
        }
    }
}

fn fixed_graph(a: &Tensor, d: &Tensor, obs: &Tensor) -> Result<FactorGraph> {
    let mut graph = FactorGraph::new();
    let s0 = graph.categorical(d.clone())?;
    let o0 = graph.transition(s0, a.clone())?;
    root_slice(&mut graph, s0, o0, obs)?;
    Ok(graph)
}

/// `s0 ~ Cat(D)`, `o0 ~ Cat(A · s0)` over fresh Dirichlet variables whose
/// priors are `params`.
fn learned_graph(params: &LearnedParams, obs: &Tensor) -> Result<(FactorGraph, Model)> {
    let mut graph = FactorGraph::new();
    let a = graph.dirichlet(params.a.clone())?;
    let b = graph.dirichlet(params.b.clone())?;
    let d = graph.dirichlet(params.d.clone())?;
    graph.var_mut(a)?.set_name("A");
    graph.var_mut(b)?.set_name("B");
    graph.var_mut(d)?.set_name("D");
    let mut us = Vec::with_capacity(params.us.len());
    for (t, u) in params.us.iter().enumerate() {
        let id = graph.dirichlet(u.clone())?;
        graph.var_mut(id)?.set_name(format!("U{t}"));
        us.push(id);
    }

    let s0 = graph.categorical_with(d)?;
    let o0 = graph.transition_with(s0, a)?;
    root_slice(&mut graph, s0, o0, obs)?;
    Ok((graph, Model::Learned { a, b, d, us }))
}
