//! The package dependency graph.
//!
//! A directed graph of package full-name -> imported-package full-names,
//! plus its exact transpose. Both maps are guarded by a single mutex so that
//! an update to one side can never be observed without the other (the
//! inverse is always the exact transpose of the forward map, spec
//! Property P1).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::error::{LockResultExt, Result};

#[derive(Default)]
struct Inner {
    /// package -> packages it imports
    forward: HashMap<String, HashSet<String>>,
    /// package -> packages that import it
    reverse: HashMap<String, HashSet<String>>,
}

/// Thread-safe directed graph over package full names.
///
/// All public operations are atomic with respect to each other: traversals
/// take their own snapshot of the adjacency maps under the lock rather than
/// holding a long-lived borrow, per the source's design note on avoiding
/// shared-pointer-rooted traversals.
pub struct DependencyGraph {
    inner: Mutex<Inner>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Packages that `pkg` directly imports.
    pub fn dependencies(&self, pkg: &str) -> HashSet<String> {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        inner.forward.get(pkg).cloned().unwrap_or_default()
    }

    /// Packages that directly import `pkg`.
    pub fn dependents(&self, pkg: &str) -> HashSet<String> {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        inner.reverse.get(pkg).cloned().unwrap_or_default()
    }

    /// Replaces `pkg`'s out-edges with `new_deps`, keeping the reverse index
    /// in lock-step. May add edges, remove edges, or both.
    #[tracing::instrument(level = "trace", skip(self, new_deps))]
    pub fn update_dependencies(&self, pkg: &str, new_deps: HashSet<String>) {
        let mut inner = self.inner.lock().expect("graph mutex poisoned");

        let old_deps = inner.forward.remove(pkg).unwrap_or_default();
        for removed in old_deps.difference(&new_deps) {
            if let Some(set) = inner.reverse.get_mut(removed) {
                set.remove(pkg);
            }
        }
        for added in new_deps.difference(&old_deps) {
            inner.reverse.entry(added.clone()).or_default().insert(pkg.to_string());
        }

        inner.forward.insert(pkg.to_string(), new_deps);
    }

    /// Removes `pkg` entirely from the graph: its out-edges and any edges
    /// pointing at it from other packages.
    pub fn remove_package(&self, pkg: &str) {
        let mut inner = self.inner.lock().expect("graph mutex poisoned");
        if let Some(deps) = inner.forward.remove(pkg) {
            for dep in deps {
                if let Some(set) = inner.reverse.get_mut(&dep) {
                    set.remove(pkg);
                }
            }
        }
        if let Some(dependents) = inner.reverse.remove(pkg) {
            for dependent in dependents {
                if let Some(set) = inner.forward.get_mut(&dependent) {
                    set.remove(pkg);
                }
            }
        }
    }

    /// Transitive closure of `dependencies` via DFS.
    pub fn all_dependencies(&self, pkg: &str) -> HashSet<String> {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        let mut visited = HashSet::new();
        let mut result = HashSet::new();
        dfs(&inner.forward, pkg, &mut visited, &mut result);
        result
    }

    /// Transitive closure of `dependents` via DFS.
    pub fn all_dependents(&self, pkg: &str) -> HashSet<String> {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        let mut visited = HashSet::new();
        let mut result = HashSet::new();
        dfs(&inner.reverse, pkg, &mut visited, &mut result);
        result
    }

    /// Kahn's algorithm over the whole graph, leaves (no outgoing imports)
    /// first. Returns an empty vector if a cycle exists anywhere in the
    /// graph.
    pub fn topological_sort(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        let nodes: HashSet<String> = inner
            .forward
            .keys()
            .cloned()
            .chain(inner.reverse.keys().cloned())
            .collect();
        kahn(&inner.forward, nodes.into_iter().collect(), false).unwrap_or_default()
    }

    /// Kahn's algorithm restricted to `subset`. If `accept_cycles` is false
    /// and a cycle is found among `subset`, returns `None`; if true, cyclic
    /// members are appended in an arbitrary-but-deterministic order after
    /// the acyclic prefix.
    pub fn partial_topological_sort(
        &self,
        subset: &HashSet<String>,
        accept_cycles: bool,
    ) -> Option<Vec<String>> {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        let mut restricted: HashMap<String, HashSet<String>> = HashMap::new();
        for pkg in subset {
            let deps = inner
                .forward
                .get(pkg)
                .map(|d| d.iter().filter(|d| subset.contains(*d)).cloned().collect())
                .unwrap_or_default();
            restricted.insert(pkg.clone(), deps);
        }
        kahn(&restricted, subset.iter().cloned().collect(), accept_cycles)
    }

    /// Tarjan's SCC algorithm; reports only strongly connected components of
    /// size > 1 (a single self-loop is tolerated and not reported, per the
    /// original's self-loop leniency).
    pub fn find_cycles(&self) -> (Vec<Vec<String>>, bool) {
        let inner = self.inner.lock().expect("graph mutex poisoned");
        let cycles = tarjan_scc(&inner.forward);
        let has_cycle = !cycles.is_empty();
        (cycles, has_cycle)
    }

    /// Convenience wrapper returning a [`crate::error::CoreError::Cycle`] if
    /// any cycle touches `subset`.
    pub fn check_no_cycles_in(&self, subset: &HashSet<String>) -> Result<()> {
        let (cycles, has_cycle) = self.find_cycles();
        if !has_cycle {
            return Ok(());
        }
        let relevant: Vec<Vec<String>> = cycles
            .into_iter()
            .filter(|cycle| cycle.iter().any(|p| subset.contains(p)))
            .collect();
        if relevant.is_empty() {
            Ok(())
        } else {
            Err(crate::error::CoreError::Cycle(relevant))
        }
    }
}

fn dfs(
    adjacency: &HashMap<String, HashSet<String>>,
    start: &str,
    visited: &mut HashSet<String>,
    result: &mut HashSet<String>,
) {
    if !visited.insert(start.to_string()) {
        return;
    }
    if let Some(neighbors) = adjacency.get(start) {
        for n in neighbors {
            result.insert(n.clone());
            dfs(adjacency, n, visited, result);
        }
    }
}

/// Kahn-style topological sort, leaves first. `nodes` is the full vertex
/// set to consider (isolated nodes included). Edges outside `nodes` are
/// ignored by the caller pre-filtering `adjacency`.
fn kahn(
    adjacency: &HashMap<String, HashSet<String>>,
    nodes: Vec<String>,
    accept_cycles: bool,
) -> Option<Vec<String>> {
    let node_set: HashSet<String> = nodes.iter().cloned().collect();

    // in-degree counts "number of dependencies not yet emitted" for each node,
    // since we want dependencies (leaves of the import relation) emitted first.
    let mut indegree: HashMap<String, usize> = HashMap::new();
    for n in &nodes {
        indegree.insert(n.clone(), 0);
    }
    for n in &nodes {
        if let Some(deps) = adjacency.get(n) {
            for d in deps {
                if node_set.contains(d) {
                    *indegree.get_mut(n).unwrap() += 1;
                }
            }
        }
    }

    // Deterministic order regardless of hash-map iteration.
    let mut ready: Vec<String> =
        indegree.iter().filter(|(_, &d)| d == 0).map(|(n, _)| n.clone()).collect();
    ready.sort();
    let mut queue: VecDeque<String> = ready.into();

    // dependents[p] = nodes that list p as a dependency
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for n in &nodes {
        if let Some(deps) = adjacency.get(n) {
            for d in deps {
                if node_set.contains(d) {
                    dependents.entry(d.clone()).or_default().push(n.clone());
                }
            }
        }
    }
    for v in dependents.values_mut() {
        v.sort();
    }

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(n) = queue.pop_front() {
        order.push(n.clone());
        if let Some(ds) = dependents.get(&n) {
            let mut newly_ready = Vec::new();
            for d in ds {
                let e = indegree.get_mut(d).unwrap();
                *e -= 1;
                if *e == 0 {
                    newly_ready.push(d.clone());
                }
            }
            newly_ready.sort();
            for d in newly_ready {
                queue.push_back(d);
            }
        }
    }

    if order.len() == nodes.len() {
        Some(order)
    } else if accept_cycles {
        let emitted: HashSet<&String> = order.iter().collect();
        let mut rest: Vec<String> =
            nodes.into_iter().filter(|n| !emitted.contains(n)).collect();
        rest.sort();
        order.extend(rest);
        Some(order)
    } else {
        None
    }
}

/// Tarjan's strongly-connected-components algorithm, iterative to avoid
/// stack overflows on deep/pathological graphs. Only SCCs with more than one
/// member are returned as cycles.
fn tarjan_scc(adjacency: &HashMap<String, HashSet<String>>) -> Vec<Vec<String>> {
    struct State {
        index: HashMap<String, usize>,
        lowlink: HashMap<String, usize>,
        on_stack: HashSet<String>,
        stack: Vec<String>,
        counter: usize,
        sccs: Vec<Vec<String>>,
    }

    enum Frame {
        Enter(String),
        Exit(String),
    }

    let mut nodes: Vec<String> =
        adjacency.keys().cloned().chain(adjacency.values().flatten().cloned()).collect();
    nodes.sort();
    nodes.dedup();

    let mut state = State {
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        counter: 0,
        sccs: Vec::new(),
    };

    for start in &nodes {
        if state.index.contains_key(start) {
            continue;
        }
        let mut work: Vec<Frame> = vec![Frame::Enter(start.clone())];
        // neighbor cursor per node, to resume iteration across nested calls
        let mut cursor: HashMap<String, usize> = HashMap::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(v) => {
                    if state.index.contains_key(&v) {
                        continue;
                    }
                    state.index.insert(v.clone(), state.counter);
                    state.lowlink.insert(v.clone(), state.counter);
                    state.counter += 1;
                    state.stack.push(v.clone());
                    state.on_stack.insert(v.clone());
                    cursor.insert(v.clone(), 0);
                    work.push(Frame::Exit(v.clone()));

                    let neighbors: Vec<String> = adjacency
                        .get(&v)
                        .map(|s| {
                            let mut v: Vec<String> = s.iter().cloned().collect();
                            v.sort();
                            v
                        })
                        .unwrap_or_default();
                    for n in neighbors.into_iter().rev() {
                        if !state.index.contains_key(&n) {
                            work.push(Frame::Enter(n));
                        } else if state.on_stack.contains(&n) {
                            let v_low = state.lowlink[&v];
                            let n_idx = state.index[&n];
                            state.lowlink.insert(v.clone(), v_low.min(n_idx));
                        }
                    }
                }
                Frame::Exit(v) => {
                    // propagate lowlink from already-processed neighbors once more,
                    // covering neighbors that finished after we pushed Exit.
                    if let Some(neighbors) = adjacency.get(&v) {
                        for n in neighbors {
                            if let Some(&n_low) = state.lowlink.get(n) {
                                if state.on_stack.contains(n) {
                                    let v_low = state.lowlink[&v];
                                    state.lowlink.insert(v.clone(), v_low.min(n_low));
                                }
                            }
                        }
                    }

                    if state.lowlink[&v] == state.index[&v] {
                        let mut component = Vec::new();
                        loop {
                            let w = state.stack.pop().expect("scc stack underflow");
                            state.on_stack.remove(&w);
                            let is_root = w == v;
                            component.push(w);
                            if is_root {
                                break;
                            }
                        }
                        if component.len() > 1 {
                            component.sort();
                            state.sccs.push(component);
                        }
                    }
                }
            }
        }
    }

    state.sccs.sort();
    state.sccs
}
