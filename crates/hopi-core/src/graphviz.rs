//! Graphviz (`dot`) export of a factor graph.
//!
//! Variables are drawn as ellipses (grey when observed), factors as squares.
//! When display attributes are requested, each variable also gets a dashed
//! link to a small table with its planning statistics.
//!
//! Unnamed variables are called `n0, n1, ...` and unnamed factors
//! `f0, f1, ...`, in the order they are first met while walking the
//! variables (each variable's parent factor is named before the variable).

use std::collections::HashMap;
use std::io::Write;

use crate::error::Result;
use crate::graph::FactorGraph;
use crate::types::{FactorId, VarId, VarKind};

/// A per-variable statistic shown in the data table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAttr {
    Visits,
    Cost,
    Action,
    Pruned,
    /// Index of the most probable value under the posterior.
    Argmax,
}

impl NodeAttr {
    fn label(self) -> &'static str {
        match self {
            NodeAttr::Visits => "N",
            NodeAttr::Cost => "G",
            NodeAttr::Action => "A",
            NodeAttr::Pruned => "P",
            NodeAttr::Argmax => "S",
        }
    }
}

struct Names {
    vars: HashMap<VarId, String>,
    factors: HashMap<FactorId, String>,
}

impl Names {
    fn assign(graph: &FactorGraph) -> Result<Self> {
        let mut names = Names {
            vars: HashMap::new(),
            factors: HashMap::new(),
        };
        let mut next_var = 0usize;
        let mut next_factor = 0usize;

        for id in graph.var_ids() {
            let var = graph.var(id)?;
            let parent = var.parent();
            if !names.factors.contains_key(&parent) {
                let name = match graph.factor(parent)?.name() {
                    Some(n) => n.to_string(),
                    None => {
                        next_factor += 1;
                        format!("f{}", next_factor - 1)
                    }
                };
                names.factors.insert(parent, name);
            }
            let name = match var.name() {
                Some(n) => n.to_string(),
                None => {
                    next_var += 1;
                    format!("n{}", next_var - 1)
                }
            };
            names.vars.insert(id, name);
        }
        Ok(names)
    }
}

/// Write `graph` in dot format, with a data table per variable listing
/// `display` (no tables when empty).
pub fn write_graphviz<W: Write>(graph: &FactorGraph, out: &mut W, display: &[NodeAttr]) -> Result<()> {
    let names = Names::assign(graph)?;
    let var_name = |id: &VarId| names.vars.get(id).map(String::as_str).unwrap_or("?");

    writeln!(out, "digraph G {{")?;

    for id in graph.var_ids() {
        let var = graph.var(id)?;
        let parent = names.factors.get(&var.parent()).map(String::as_str).unwrap_or("?");
        writeln!(out, "\t{} -> {}", parent, var_name(&id))?;
        if var.kind() == VarKind::Observed {
            writeln!(out, "\t{} [fillcolor=\"lightgrey\",style=filled]", var_name(&id))?;
        }
    }

    for id in graph.factor_ids() {
        let Some(factor_name) = names.factors.get(&id) else {
            continue;
        };
        for parent in graph.factor(id)?.parents() {
            writeln!(out, "\t{} -> {}[dir=none]", var_name(&parent), factor_name)?;
        }
        writeln!(out, "\t{factor_name} [shape=square]")?;
    }

    if !display.is_empty() {
        for id in graph.var_ids() {
            let var = graph.var(id)?;
            let name = var_name(&id);
            writeln!(out, "\t{name}_data -> {name} [dir=none,style=dashed,color=\"gray\"]")?;

            let mut label = String::from(
                r#"<<table border="0" cellborder="1" cellspacing="0" cellpadding="4">"#,
            );
            for attr in display {
                let value = match attr {
                    NodeAttr::Visits => var.data.visits.to_string(),
                    NodeAttr::Cost => format!("{:.6}", var.data.cost),
                    NodeAttr::Action => var
                        .data
                        .action
                        .map_or_else(|| "-".to_string(), |a| a.to_string()),
                    NodeAttr::Pruned => var.data.pruned.to_string(),
                    NodeAttr::Argmax => var
                        .posterior()
                        .params()
                        .argmax()?
                        .map_or_else(|| "-".to_string(), |a| a.to_string()),
                };
                label.push_str(&format!(
                    "<TR><TD bgcolor=\"YellowGreen\">{}</TD><TD bgcolor=\"YellowGreen\">{}</TD></TR>",
                    attr.label(),
                    value
                ));
            }
            label.push_str("</table>>");
            writeln!(out, "\t{name}_data [shape=none,margin=0,label={label}]")?;
        }
    }

    writeln!(out, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use crate::tensor::Tensor;

    #[test]
    fn writes_default_names_and_shapes() {
        let mut g = FactorGraph::new();
        let s = g.categorical(Tensor::from_vec(vec![0.5, 0.5]).unwrap()).unwrap();
        let o = g.transition(s, Tensor::full(&[2, 2], 0.5).unwrap()).unwrap();
        g.observe(o, ops::one_hot(2, 0).unwrap()).unwrap();

        let mut buf = Vec::new();
        write_graphviz(&g, &mut buf, &[]).unwrap();
        let dot = String::from_utf8(buf).unwrap();

        assert_eq!(
            dot,
            "digraph G {\n\
             \tf0 -> n0\n\
             \tf1 -> n1\n\
             \tn1 [fillcolor=\"lightgrey\",style=filled]\n\
             \tf0 [shape=square]\n\
             \tn0 -> f1[dir=none]\n\
             \tf1 [shape=square]\n\
             }\n"
        );
    }
}
