//! Workflow factory (spec §4.4.2): compiles a [`WorkflowMetadata`] record
//! into a runnable state graph, validating structural invariants before any
//! node ever runs.

use std::collections::{HashMap, HashSet, VecDeque};

use modkit_errors::ApiError;

use super::model::{AgentDeclaration, Connection, WorkflowMetadata};

#[derive(Debug, Clone)]
pub struct CompiledNode {
    pub id: String,
    pub agent_type: String,
    pub config: serde_json::Value,
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CompiledEdge {
    pub to: String,
    pub condition: Option<String>,
}

/// The compiled graph the execution engine walks (spec §4.4.2, §4.4.3).
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub entry: String,
    pub nodes: HashMap<String, CompiledNode>,
    /// Outgoing edges per node, in declaration order — the router picks
    /// the first satisfied condition, or a conditionless edge as the
    /// declared default (spec §4.4.2 "the router selects the first
    /// satisfied outgoing edge or a declared default").
    pub edges: HashMap<String, Vec<CompiledEdge>>,
}

impl CompiledGraph {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn outgoing(&self, id: &str) -> &[CompiledEdge] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }
}

/// Compiles `metadata` into a [`CompiledGraph`] (spec §4.4.2).
///
/// Validation, in order: unique agent ids; every edge endpoint exists; the
/// graph is reachable from `entryPoint`; no cycle unless every node on the
/// cycle declares `maxIterations`.
///
/// # Errors
/// `ApiError::validation` naming the first violation found.
pub fn compile(metadata: &WorkflowMetadata) -> Result<CompiledGraph, ApiError> {
    validate_unique_ids(&metadata.agents)?;

    let nodes: HashMap<String, CompiledNode> = metadata
        .agents
        .iter()
        .map(|a: &AgentDeclaration| {
            (
                a.id.clone(),
                CompiledNode {
                    id: a.id.clone(),
                    agent_type: a.agent_type.clone(),
                    config: a.config.clone(),
                    max_iterations: a.max_iterations,
                },
            )
        })
        .collect();

    if !nodes.contains_key(&metadata.entry_point) {
        return Err(ApiError::validation(format!(
            "entryPoint '{}' does not name a declared agent",
            metadata.entry_point
        )));
    }

    validate_edge_endpoints(&metadata.connections, &nodes)?;

    let mut edges: HashMap<String, Vec<CompiledEdge>> = HashMap::new();
    for conn in &metadata.connections {
        edges.entry(conn.from.clone()).or_default().push(CompiledEdge {
            to: conn.to.clone(),
            condition: conn.condition.clone(),
        });
    }

    validate_reachable_from_entry(&metadata.entry_point, &nodes, &edges)?;
    validate_no_unbounded_cycles(&nodes, &edges)?;

    Ok(CompiledGraph {
        entry: metadata.entry_point.clone(),
        nodes,
        edges,
    })
}

fn validate_unique_ids(agents: &[AgentDeclaration]) -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    for agent in agents {
        if !seen.insert(agent.id.as_str()) {
            return Err(ApiError::validation(format!("duplicate agent id '{}'", agent.id)));
        }
    }
    Ok(())
}

fn validate_edge_endpoints(connections: &[Connection], nodes: &HashMap<String, CompiledNode>) -> Result<(), ApiError> {
    for conn in connections {
        if !nodes.contains_key(&conn.from) {
            return Err(ApiError::validation(format!("connection references unknown source agent '{}'", conn.from)));
        }
        if !nodes.contains_key(&conn.to) {
            return Err(ApiError::validation(format!("connection references unknown target agent '{}'", conn.to)));
        }
    }
    Ok(())
}

fn validate_reachable_from_entry(entry: &str, nodes: &HashMap<String, CompiledNode>, edges: &HashMap<String, Vec<CompiledEdge>>) -> Result<(), ApiError> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([entry.to_owned()]);
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        for edge in edges.get(&id).map_or(&[][..], Vec::as_slice) {
            queue.push_back(edge.to.clone());
        }
    }
    let unreachable: Vec<&str> = nodes.keys().filter(|id| !visited.contains(*id)).map(String::as_str).collect();
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(format!("agents not reachable from entryPoint '{entry}': {}", unreachable.join(", "))))
    }
}

/// Detects cycles via DFS; any cycle where every participating node lacks
/// `maxIterations` is rejected (spec §4.4.2 "no cycles unless an explicit
/// maxIterations is declared on a node").
fn validate_no_unbounded_cycles(nodes: &HashMap<String, CompiledNode>, edges: &HashMap<String, Vec<CompiledEdge>>) -> Result<(), ApiError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn dfs(
        node: &str,
        nodes: &HashMap<String, CompiledNode>,
        edges: &HashMap<String, Vec<CompiledEdge>>,
        colors: &mut HashMap<String, Color>,
        path: &mut Vec<String>,
    ) -> Result<(), ApiError> {
        colors.insert(node.to_owned(), Color::Gray);
        path.push(node.to_owned());
        for edge in edges.get(node).map_or(&[][..], Vec::as_slice) {
            match colors.get(&edge.to).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let start = path.iter().position(|n| n == &edge.to).unwrap_or(0);
                    let cycle = &path[start..];
                    let unbounded: Vec<&str> = cycle
                        .iter()
                        .filter(|id| nodes.get(id.as_str()).is_none_or(|n| n.max_iterations.is_none()))
                        .map(String::as_str)
                        .collect();
                    if !unbounded.is_empty() {
                        return Err(ApiError::validation(format!(
                            "cycle detected without maxIterations declared on: {}",
                            unbounded.join(", ")
                        )));
                    }
                }
                Color::White => dfs(&edge.to, nodes, edges, colors, path)?,
                Color::Black => {}
            }
        }
        path.pop();
        colors.insert(node.to_owned(), Color::Black);
        Ok(())
    }

    let mut colors = HashMap::new();
    let mut path = Vec::new();
    for id in nodes.keys() {
        if colors.get(id).copied().unwrap_or(Color::White) == Color::White {
            dfs(id, nodes, edges, &mut colors, &mut path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(agents: Vec<AgentDeclaration>, connections: Vec<Connection>, entry: &str) -> WorkflowMetadata {
        WorkflowMetadata {
            agents,
            connections,
            entry_point: entry.to_owned(),
        }
    }

    fn agent(id: &str) -> AgentDeclaration {
        AgentDeclaration {
            id: id.to_owned(),
            agent_type: "dynamic".to_owned(),
            config: serde_json::json!({}),
            max_iterations: None,
        }
    }

    fn conn(from: &str, to: &str) -> Connection {
        Connection {
            from: from.to_owned(),
            to: to.to_owned(),
            condition: None,
        }
    }

    #[test]
    fn compiles_a_simple_linear_graph() {
        let md = metadata(vec![agent("a"), agent("b")], vec![conn("a", "b")], "a");
        let graph = compile(&md).expect("compiles");
        assert_eq!(graph.entry, "a");
        assert_eq!(graph.outgoing("a").len(), 1);
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let md = metadata(vec![agent("a"), agent("a")], vec![], "a");
        assert!(compile(&md).is_err());
    }

    #[test]
    fn rejects_connection_to_unknown_agent() {
        let md = metadata(vec![agent("a")], vec![conn("a", "ghost")], "a");
        assert!(compile(&md).is_err());
    }

    #[test]
    fn rejects_unreachable_agent() {
        let md = metadata(vec![agent("a"), agent("orphan")], vec![], "a");
        assert!(compile(&md).is_err());
    }

    #[test]
    fn rejects_unbounded_cycle() {
        let md = metadata(vec![agent("a"), agent("b")], vec![conn("a", "b"), conn("b", "a")], "a");
        assert!(compile(&md).is_err());
    }

    #[test]
    fn allows_cycle_when_max_iterations_declared() {
        let mut b = agent("b");
        b.max_iterations = Some(3);
        let mut a = agent("a");
        a.max_iterations = Some(3);
        let md = metadata(vec![a, b], vec![conn("a", "b"), conn("b", "a")], "a");
        assert!(compile(&md).is_ok());
    }

    #[test]
    fn rejects_unknown_entry_point() {
        let md = metadata(vec![agent("a")], vec![], "ghost");
        assert!(compile(&md).is_err());
    }
}
