use crate::plan::{InputMapping, Plan};
use dworkers_core::{DworkersError, DworkersResult};
use std::collections::{HashMap, HashSet};

/// A validated, layered view of a plan's dependency graph.
///
/// Compilation is deterministic: within every layer steps keep plan
/// declaration order, so compiling the same plan twice gives identical
/// layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanGraph {
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
    layers: Vec<Vec<String>>,
    sinks: Vec<String>,
}

impl PlanGraph {
    /// Validate `plan` and layer it.
    ///
    /// Fails on a duplicate step id (config error), a dependency or `select`
    /// upstream entry that is not a declared step (`UnknownStep`), or a cycle
    /// (`Cycle`, naming the path with its first id repeated at the end).
    pub fn compile(plan: &Plan) -> DworkersResult<Self> {
        let mut order = Vec::with_capacity(plan.steps.len());
        let mut position = HashMap::new();
        for (i, step) in plan.steps.iter().enumerate() {
            if position.insert(step.step_id.clone(), i).is_some() {
                return Err(DworkersError::Config(format!(
                    "Duplicate step id '{}' in plan '{}'",
                    step.step_id, plan.name
                )));
            }
            order.push(step.step_id.clone());
        }

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for step in &plan.steps {
            let mut seen = HashSet::new();
            let mut deps = Vec::new();
            for dep in &step.depends_on {
                if !position.contains_key(dep) {
                    return Err(DworkersError::UnknownStep {
                        step: step.step_id.clone(),
                        dependency: dep.clone(),
                    });
                }
                if seen.insert(dep.as_str()) {
                    deps.push(dep.clone());
                }
            }
            if let InputMapping::Select { upstream, .. } = &step.input_mapping {
                if let Some(bad) = upstream.iter().find(|u| !seen.contains(u.as_str())) {
                    return Err(DworkersError::UnknownStep {
                        step: step.step_id.clone(),
                        dependency: bad.clone(),
                    });
                }
            }
            dependencies.insert(step.step_id.clone(), deps);
        }

        if let Some(cycle) = find_cycle(&order, &dependencies) {
            return Err(DworkersError::Cycle { cycle });
        }

        let mut dependents: HashMap<String, Vec<String>> =
            order.iter().map(|id| (id.clone(), Vec::new())).collect();
        for id in &order {
            for dep in &dependencies[id] {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(id.clone());
                }
            }
        }

        let layers = kahn_layers(&order, &position, &dependencies, &dependents);
        let sinks = order
            .iter()
            .filter(|id| dependents[*id].is_empty())
            .cloned()
            .collect();

        Ok(Self {
            order,
            dependencies,
            dependents,
            layers,
            sinks,
        })
    }

    /// Step ids in declaration order.
    pub fn step_ids(&self) -> &[String] {
        &self.order
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` for a plan without steps.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `true` if the plan has `step_id`.
    pub fn contains(&self, step_id: &str) -> bool {
        self.dependencies.contains_key(step_id)
    }

    /// Topological layers; every step's dependencies sit in earlier layers.
    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Direct upstream ids of `step_id`, deduplicated, in declared order.
    pub fn dependencies(&self, step_id: &str) -> &[String] {
        self.dependencies
            .get(step_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Direct downstream ids of `step_id`, in declaration order.
    pub fn dependents(&self, step_id: &str) -> &[String] {
        self.dependents
            .get(step_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every step reachable downstream from `step_id`, in declaration order.
    pub fn transitive_dependents(&self, step_id: &str) -> Vec<String> {
        let mut reached = HashSet::new();
        let mut stack = vec![step_id.to_string()];
        while let Some(id) = stack.pop() {
            for next in self.dependents(&id) {
                if reached.insert(next.clone()) {
                    stack.push(next.clone());
                }
            }
        }
        self.order
            .iter()
            .filter(|id| reached.contains(*id))
            .cloned()
            .collect()
    }

    /// Steps nobody depends on, in declaration order.
    pub fn sinks(&self) -> &[String] {
        &self.sinks
    }
}

fn find_cycle(order: &[String], dependencies: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    // 1 = on the current path, 2 = fully explored
    let mut state: HashMap<&str, u8> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();
    for id in order {
        if let Some(cycle) = dfs_cycle(id, dependencies, &mut state, &mut path) {
            return Some(cycle);
        }
    }
    None
}

fn dfs_cycle<'a>(
    id: &'a str,
    dependencies: &'a HashMap<String, Vec<String>>,
    state: &mut HashMap<&'a str, u8>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    match state.get(id) {
        Some(1) => {
            let start = path.iter().position(|p| *p == id).unwrap_or_default();
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        Some(2) => return None,
        _ => {}
    }
    state.insert(id, 1);
    path.push(id);
    if let Some(deps) = dependencies.get(id) {
        for dep in deps {
            if let Some(cycle) = dfs_cycle(dep, dependencies, state, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    state.insert(id, 2);
    None
}

fn kahn_layers(
    order: &[String],
    position: &HashMap<String, usize>,
    dependencies: &HashMap<String, Vec<String>>,
    dependents: &HashMap<String, Vec<String>>,
) -> Vec<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = order
        .iter()
        .map(|id| (id.as_str(), dependencies[id].len()))
        .collect();
    let mut current: Vec<String> = order
        .iter()
        .filter(|id| indegree[id.as_str()] == 0)
        .cloned()
        .collect();
    let mut layers = Vec::new();
    while !current.is_empty() {
        let mut next = Vec::new();
        for id in &current {
            for dependent in &dependents[id] {
                if let Some(d) = indegree.get_mut(dependent.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
        }
        next.sort_by_key(|id| position[id]);
        layers.push(std::mem::replace(&mut current, next));
    }
    layers
}
