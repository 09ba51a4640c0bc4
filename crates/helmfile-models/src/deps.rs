//! Release dependency validation: unknown references, cycles, and
//! topological ordering.

use std::collections::HashMap;

use iac_diagnostics::{Diagnostic, DiagnosticCode};

use crate::model::{Helmfile, Release};

/// Validates every `needs` reference and detects dependency cycles.
///
/// Unknown references produce `UNKNOWN_DEPENDENCY` errors; each cycle
/// produces a `CIRCULAR_DEPENDENCY` error whose message carries the full
/// path (first and last entries equal).
pub fn validate_dependencies(helmfile: &Helmfile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for release in &helmfile.releases {
        for reference in &release.needs {
            if helmfile.find_release(reference).is_none() {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::UnknownDependency,
                    format!(
                        "release `{}` needs `{reference}`, which is not defined",
                        release.name
                    ),
                ));
            }
        }
    }

    for cycle in detect_cycles(helmfile) {
        diagnostics.push(Diagnostic::error(
            DiagnosticCode::CircularDependency,
            format!("circular release dependency: {}", cycle.join(" -> ")),
        ));
    }

    diagnostics
}

#[derive(Copy, Clone, PartialEq)]
enum VisitState {
    Unvisited,
    Visiting,
    Done,
}

/// Finds dependency cycles with a DFS `visiting` set. Each returned path
/// starts and ends with the same release name.
pub fn detect_cycles(helmfile: &Helmfile) -> Vec<Vec<String>> {
    let resolver = Resolver::new(helmfile);
    let mut states = vec![VisitState::Unvisited; helmfile.releases.len()];
    let mut cycles = Vec::new();

    for start in 0..helmfile.releases.len() {
        if states[start] == VisitState::Unvisited {
            let mut stack = Vec::new();
            visit_for_cycles(helmfile, &resolver, start, &mut states, &mut stack, &mut cycles);
        }
    }
    cycles
}

fn visit_for_cycles(
    helmfile: &Helmfile,
    resolver: &Resolver,
    index: usize,
    states: &mut [VisitState],
    stack: &mut Vec<usize>,
    cycles: &mut Vec<Vec<String>>,
) {
    states[index] = VisitState::Visiting;
    stack.push(index);

    for reference in &helmfile.releases[index].needs {
        let Some(dependency) = resolver.resolve(reference) else {
            continue;
        };
        match states[dependency] {
            VisitState::Unvisited => {
                visit_for_cycles(helmfile, resolver, dependency, states, stack, cycles);
            }
            VisitState::Visiting => {
                // The cycle is the stack from the revisited node, closed
                // by repeating it.
                let from = stack
                    .iter()
                    .position(|&i| i == dependency)
                    .unwrap_or_default();
                let mut cycle: Vec<String> = stack[from..]
                    .iter()
                    .map(|&i| helmfile.releases[i].name.clone())
                    .collect();
                cycle.push(helmfile.releases[dependency].name.clone());
                cycles.push(cycle);
            }
            VisitState::Done => {}
        }
    }

    stack.pop();
    states[index] = VisitState::Done;
}

/// Releases in dependency order: DFS post-order over `needs`, so every
/// release appears after everything it needs (when no cycle exists).
pub fn releases_in_order(helmfile: &Helmfile) -> Vec<&Release> {
    let resolver = Resolver::new(helmfile);
    let mut states = vec![VisitState::Unvisited; helmfile.releases.len()];
    let mut order = Vec::new();

    for start in 0..helmfile.releases.len() {
        visit_post_order(helmfile, &resolver, start, &mut states, &mut order);
    }

    order.into_iter().map(|i| &helmfile.releases[i]).collect()
}

fn visit_post_order(
    helmfile: &Helmfile,
    resolver: &Resolver,
    index: usize,
    states: &mut [VisitState],
    order: &mut Vec<usize>,
) {
    if states[index] != VisitState::Unvisited {
        return;
    }
    states[index] = VisitState::Visiting;

    for reference in &helmfile.releases[index].needs {
        if let Some(dependency) = resolver.resolve(reference)
            && states[dependency] == VisitState::Unvisited
        {
            visit_post_order(helmfile, resolver, dependency, states, order);
        }
    }

    states[index] = VisitState::Done;
    order.push(index);
}

/// Resolves `needs` references to release indices. Qualified
/// `namespace/name` references match exactly; bare names match the first
/// release with that name.
struct Resolver {
    by_key: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Resolver {
    fn new(helmfile: &Helmfile) -> Self {
        let mut by_key = HashMap::new();
        let mut by_name = HashMap::new();

        for (index, release) in helmfile.releases.iter().enumerate() {
            by_key.entry(release.key()).or_insert(index);
            by_name.entry(release.name.clone()).or_insert(index);
        }
        Self { by_key, by_name }
    }

    fn resolve(&self, reference: &str) -> Option<usize> {
        if reference.contains('/') {
            self.by_key.get(reference).copied()
        } else {
            self.by_name.get(reference).copied()
        }
    }
}
