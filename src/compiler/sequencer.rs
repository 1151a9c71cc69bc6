//! Statement ordering
//!
//! Statements are grouped by `(type, ordering key)` in first-seen order so
//! that all writes touching one row run back to back. A statement only joins
//! an earlier group when every row it references is created at or before that
//! group; otherwise it keeps its place. Groups are then ordered so that the
//! group inserting a row runs before every group referencing it, keeping the
//! first-seen order wherever references allow. Mutually referencing inserts
//! cannot be ordered and are rejected.

use crate::compiler::Statement;
use crate::core::error::{EngineError, EngineResult, InputError};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Order statements for execution, rejecting unsatisfiable references
pub fn sequence(statements: Vec<Statement>) -> EngineResult<Vec<Statement>> {
    let mut groups: Vec<Vec<Statement>> = Vec::new();
    let mut group_of_key: HashMap<(String, Uuid), usize> = HashMap::new();
    let mut created_in: HashMap<Uuid, usize> = HashMap::new();

    for statement in statements {
        let key = (statement.type_name.clone(), statement.ordering_key);
        let target = group_of_key.get(&key).copied().filter(|&group| {
            statement
                .requires
                .iter()
                .all(|id| created_in.get(id).is_none_or(|&created| created <= group))
        });

        let group = match target {
            Some(group) => group,
            None => {
                groups.push(Vec::new());
                let group = groups.len() - 1;
                group_of_key.insert(key, group);
                group
            }
        };

        if let Some(id) = statement.creates {
            created_in.entry(id).or_insert(group);
        }
        groups[group].push(statement);
    }

    let order = dependency_order(&groups, &created_in)?;
    let mut slots: Vec<Option<Vec<Statement>>> = groups.into_iter().map(Some).collect();
    let ordered: Vec<Statement> = order
        .into_iter()
        .filter_map(|group| slots[group].take())
        .flatten()
        .collect();
    verify(&ordered)?;

    tracing::debug!(statements = ordered.len(), "sequenced mutation statements");
    Ok(ordered)
}

/// Group indices with creators first, lowest index first among ready groups
fn dependency_order(
    groups: &[Vec<Statement>],
    created_in: &HashMap<Uuid, usize>,
) -> EngineResult<Vec<usize>> {
    let mut pending = vec![0usize; groups.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];

    for (group, statements) in groups.iter().enumerate() {
        let mut creators: Vec<usize> = statements
            .iter()
            .flat_map(|s| s.requires.iter())
            .filter_map(|id| created_in.get(id).copied())
            .filter(|&creator| creator != group)
            .collect();
        creators.sort_unstable();
        creators.dedup();
        pending[group] = creators.len();
        for creator in creators {
            dependents[creator].push(group);
        }
    }

    let mut ready: BTreeSet<usize> = (0..groups.len()).filter(|&g| pending[g] == 0).collect();
    let mut order = Vec::with_capacity(groups.len());
    while let Some(group) = ready.pop_first() {
        order.push(group);
        for &dependent in &dependents[group] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < groups.len() {
        let stuck = (0..groups.len())
            .find(|&g| pending[g] > 0)
            .and_then(|g| {
                groups[g].iter().find_map(|s| {
                    s.requires
                        .iter()
                        .find(|id| created_in.get(*id).is_some_and(|&c| c != g && pending[c] > 0))
                        .map(|id| (s.type_name.clone(), *id))
                })
            });
        let (type_name, id) = stuck.ok_or_else(|| {
            EngineError::Internal("unordered statement groups without a cycle".to_string())
        })?;
        return Err(InputError::ReferenceCycle { type_name, id }.into());
    }
    Ok(order)
}

fn verify(statements: &[Statement]) -> EngineResult<()> {
    let mut created_at: HashMap<Uuid, usize> = HashMap::new();
    for (position, statement) in statements.iter().enumerate() {
        if let Some(id) = statement.creates {
            created_at.entry(id).or_insert(position);
        }
    }

    for (position, statement) in statements.iter().enumerate() {
        for id in &statement.requires {
            if created_at.get(id).is_some_and(|&created| created > position) {
                return Err(InputError::ReferenceCycle {
                    type_name: statement.type_name.clone(),
                    id: *id,
                }
                .into());
            }
        }
    }
    Ok(())
}
