//! Repository catalog
//!
//! The catalog is the registration-time authority over repository
//! definitions. Shape invariants, name uniqueness, member existence, and
//! group acyclicity are all enforced here so that request-time resolution
//! never has to revalidate them.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use quarry_core::{Repository, RepositoryType};

use crate::error::{ResolveError, Result};

/// In-memory registry of repository definitions, keyed by id
#[derive(Default)]
pub struct RepositoryCatalog {
    inner: RwLock<HashMap<String, Repository>>,
}

impl RepositoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository
    ///
    /// Fails with `RepositoryExists` on a name or id collision,
    /// `UnknownMember` if a group references a repository that is not
    /// registered, and `GroupCycleDetected` if the membership graph would
    /// contain a cycle.
    pub fn register(&self, repo: Repository) -> Result<()> {
        repo.validate()?;

        let mut map = self.inner.write().unwrap();
        if map.contains_key(&repo.id) || map.values().any(|r| r.name == repo.name) {
            return Err(ResolveError::RepositoryExists {
                name: repo.name.clone(),
            });
        }

        Self::check_members(&map, &repo)?;
        map.insert(repo.id.clone(), repo);
        Ok(())
    }

    /// Replace an existing repository definition
    ///
    /// Re-runs the same validation as `register`; membership changes are
    /// checked for cycles against the rest of the catalog.
    pub fn update(&self, repo: Repository) -> Result<Repository> {
        repo.validate()?;

        let mut map = self.inner.write().unwrap();
        let previous = map
            .get(&repo.id)
            .cloned()
            .ok_or_else(|| ResolveError::RepositoryNotFound {
                id: repo.id.clone(),
            })?;

        if map
            .values()
            .any(|r| r.id != repo.id && r.name == repo.name)
        {
            return Err(ResolveError::RepositoryExists {
                name: repo.name.clone(),
            });
        }

        // Validate against the catalog with the entry replaced
        map.remove(&repo.id);
        match Self::check_members(&map, &repo) {
            Ok(()) => {
                map.insert(repo.id.clone(), repo);
                Ok(previous)
            }
            Err(e) => {
                map.insert(previous.id.clone(), previous);
                Err(e)
            }
        }
    }

    /// Remove a repository and detach it from any group member lists
    pub fn remove(&self, id: &str) -> Result<Repository> {
        let mut map = self.inner.write().unwrap();
        let removed = map
            .remove(id)
            .ok_or_else(|| ResolveError::RepositoryNotFound { id: id.to_string() })?;

        for repo in map.values_mut() {
            if repo.repo_type == RepositoryType::Group {
                repo.members.retain(|m| m != id);
            }
        }
        Ok(removed)
    }

    /// Get a repository by id
    pub fn get(&self, id: &str) -> Result<Repository> {
        let map = self.inner.read().unwrap();
        map.get(id)
            .cloned()
            .ok_or_else(|| ResolveError::RepositoryNotFound { id: id.to_string() })
    }

    /// Get a repository by its unique name
    pub fn get_by_name(&self, name: &str) -> Option<Repository> {
        let map = self.inner.read().unwrap();
        map.values().find(|r| r.name == name).cloned()
    }

    /// All repositories, sorted by name
    pub fn list(&self) -> Vec<Repository> {
        let map = self.inner.read().unwrap();
        let mut repos: Vec<Repository> = map.values().cloned().collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        repos
    }

    /// Validate a group's member references against the catalog
    fn check_members(map: &HashMap<String, Repository>, repo: &Repository) -> Result<()> {
        if repo.repo_type != RepositoryType::Group {
            return Ok(());
        }

        for member in &repo.members {
            if *member != repo.id && !map.contains_key(member) {
                return Err(ResolveError::UnknownMember {
                    group: repo.name.clone(),
                    member: member.clone(),
                });
            }
        }

        if let Some(cycle) = Self::find_cycle(map, repo) {
            return Err(ResolveError::GroupCycleDetected {
                cycle: cycle.join(" -> "),
            });
        }
        Ok(())
    }

    /// Look for a membership cycle through `repo`
    ///
    /// The existing catalog is acyclic, so any cycle must pass through the
    /// repository being added or updated.
    fn find_cycle(map: &HashMap<String, Repository>, repo: &Repository) -> Option<Vec<String>> {
        fn visit(
            map: &HashMap<String, Repository>,
            candidate: &Repository,
            current: &str,
            path: &mut Vec<String>,
            visited: &mut HashSet<String>,
        ) -> bool {
            if current == candidate.id {
                return true;
            }
            if !visited.insert(current.to_string()) {
                return false;
            }

            let members = match map.get(current) {
                Some(r) => &r.members,
                None => return false,
            };

            for next in members {
                path.push(next.clone());
                if visit(map, candidate, next, path, visited) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut visited = HashSet::new();
        for member in &repo.members {
            let mut path = vec![repo.id.clone(), member.clone()];
            if visit(map, repo, member, &mut path, &mut visited) {
                let names: Vec<String> = path
                    .iter()
                    .map(|id| {
                        if *id == repo.id {
                            repo.name.clone()
                        } else {
                            map.get(id).map(|r| r.name.clone()).unwrap_or_else(|| id.clone())
                        }
                    })
                    .collect();
                return Some(names);
            }
        }
        None
    }
}
