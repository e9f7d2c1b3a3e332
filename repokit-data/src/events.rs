use serde::{Deserialize, Serialize};

use crate::criteria::Criteria;

/// Emitted after a repository successfully deletes data.
///
/// `repository` is the table the repository manages. The snapshot is taken
/// before the delete runs, so handlers can still see what was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeleted<T> {
    pub repository: String,
    pub snapshot: DeletedSnapshot<T>,
}

/// What a delete removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedSnapshot<T> {
    /// A single entity, deleted by key or by reference.
    Entity(T),
    /// A query-driven delete: the filters applied and the rows they matched.
    Query { criteria: Criteria, matched: Vec<T> },
}

impl<T> EntityDeleted<T> {
    /// The deleted entities, whichever form the snapshot takes.
    pub fn entities(&self) -> &[T] {
        match &self.snapshot {
            DeletedSnapshot::Entity(entity) => std::slice::from_ref(entity),
            DeletedSnapshot::Query { matched, .. } => matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_covers_both_snapshots() {
        let single = EntityDeleted {
            repository: "users".to_string(),
            snapshot: DeletedSnapshot::Entity(7),
        };
        assert_eq!(single.entities(), &[7]);

        let bulk = EntityDeleted {
            repository: "users".to_string(),
            snapshot: DeletedSnapshot::Query {
                criteria: Criteria::new().where_in("id", [1, 2]),
                matched: vec![1, 2],
            },
        };
        assert_eq!(bulk.entities(), &[1, 2]);
    }

    #[test]
    fn test_snapshot_serializes_with_tag() {
        let event = EntityDeleted {
            repository: "users".to_string(),
            snapshot: DeletedSnapshot::Entity("alice".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["snapshot"]["entity"], "alice");
    }
}
