// pass.rs: Pass descriptor module: metadata and dependency resolution
//
// Declares the analyzer's six passes and their dependency edges. Used by the
// pipeline runner to compute the minimal pass subset for each caller-facing
// operation.

use std::collections::HashSet;

// ── Pass identifiers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Lex,
    Parse,
    Resolve,
    Dimensions,
    Structure,
    Report,
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about an analysis pass.
pub struct PassDescriptor {
    /// Name used in tracing spans.
    pub name: &'static str,
    /// Passes whose outputs this pass consumes.
    pub inputs: &'static [PassId],
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Lex => PassDescriptor {
            name: "lex",
            inputs: &[],
        },
        PassId::Parse => PassDescriptor {
            name: "parse",
            inputs: &[PassId::Lex],
        },
        PassId::Resolve => PassDescriptor {
            name: "resolve",
            inputs: &[PassId::Parse],
        },
        PassId::Dimensions => PassDescriptor {
            name: "dimensions",
            inputs: &[PassId::Resolve],
        },
        PassId::Structure => PassDescriptor {
            name: "structure",
            inputs: &[PassId::Resolve, PassId::Dimensions],
        },
        PassId::Report => PassDescriptor {
            name: "report",
            inputs: &[PassId::Dimensions, PassId::Structure],
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PASSES: [PassId; 6] = [
        PassId::Lex,
        PassId::Parse,
        PassId::Resolve,
        PassId::Dimensions,
        PassId::Structure,
        PassId::Report,
    ];

    #[test]
    fn required_passes_syntax_check_stops_at_dimensions() {
        let passes = required_passes(PassId::Dimensions);
        assert_eq!(
            passes,
            vec![
                PassId::Lex,
                PassId::Parse,
                PassId::Resolve,
                PassId::Dimensions
            ]
        );
        assert!(!passes.contains(&PassId::Structure));
    }

    #[test]
    fn required_passes_report_includes_all() {
        assert_eq!(required_passes(PassId::Report), ALL_PASSES.to_vec());
    }

    #[test]
    fn required_passes_lex_is_minimal() {
        assert_eq!(required_passes(PassId::Lex), vec![PassId::Lex]);
    }

    #[test]
    fn descriptor_names_are_unique() {
        let mut names = HashSet::new();
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(names.insert(desc.name), "duplicate pass name {}", desc.name);
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let order = required_passes(*pass);
            let self_pos = order.iter().position(|p| p == pass).unwrap();
            for dep in descriptor(*pass).inputs {
                let dep_pos = order.iter().position(|p| p == dep).unwrap();
                assert!(
                    dep_pos < self_pos,
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
