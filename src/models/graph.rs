//! Graph algorithms for the WBS tree and the task dependency graph.
//!
//! Both walks are written against lookup closures instead of a concrete
//! store, so the same code runs over the memory store, the file store, or a
//! plain map in tests. Lookup errors are passed through unchanged.

use std::collections::HashSet;

/// Outcome of walking a node's `parent_id` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentChain {
    /// The chain reached a root; ancestors listed nearest first.
    Acyclic(Vec<String>),
    /// The chain revisited an id; the ordered ids walked up to and including the repeat.
    Cycle(Vec<String>),
}

/// Walk the ancestor chain of `node_id`, starting at `first_parent`.
///
/// `parent_of` resolves an id to its parent id. It returns `Ok(None)` both for
/// a root and for an id that no longer exists; either ends the walk.
pub fn walk_parent_chain<F, E>(
    node_id: &str,
    first_parent: Option<&str>,
    mut parent_of: F,
) -> Result<ParentChain, E>
where
    F: FnMut(&str) -> Result<Option<String>, E>,
{
    let mut visited: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current = first_parent.map(str::to_string);

    while let Some(id) = current {
        if id == node_id || seen.contains(&id) {
            visited.push(id);
            return Ok(ParentChain::Cycle(visited));
        }
        seen.insert(id.clone());
        current = parent_of(&id)?;
        visited.push(id);
    }

    Ok(ParentChain::Acyclic(visited))
}

/// Depth-first search for a dependency cycle reachable from `start`.
///
/// Keeps a `visited` set of fully explored nodes and the current recursion
/// `path`. Returns the path from `start` to the first node found twice on the
/// path, with that node repeated at the end (e.g. `["A", "B", "A"]`).
pub fn find_dependency_cycle<F, E>(start: &str, mut deps_of: F) -> Result<Option<Vec<String>>, E>
where
    F: FnMut(&str) -> Result<Vec<String>, E>,
{
    let mut visited: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    let mut on_path: HashSet<String> = HashSet::new();
    // (node, its dependencies, next dependency index)
    let mut frames: Vec<(String, Vec<String>, usize)> = Vec::new();

    visited.insert(start.to_string());
    path.push(start.to_string());
    on_path.insert(start.to_string());
    frames.push((start.to_string(), deps_of(start)?, 0));

    while let Some(frame) = frames.last_mut() {
        if frame.2 >= frame.1.len() {
            if let Some((done, _, _)) = frames.pop() {
                on_path.remove(&done);
                path.pop();
            }
            continue;
        }

        let next = frame.1[frame.2].clone();
        frame.2 += 1;

        if on_path.contains(&next) {
            path.push(next);
            return Ok(Some(path));
        }
        if visited.contains(&next) {
            continue;
        }

        let deps = deps_of(&next)?;
        visited.insert(next.clone());
        on_path.insert(next.clone());
        path.push(next.clone());
        frames.push((next, deps, 0));
    }

    Ok(None)
}

/// Join a walked path for display (`A -> B -> A`).
pub fn format_path(path: &[String]) -> String {
    path.join(" -> ")
}
