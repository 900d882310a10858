//! Role, group, and membership models.
//!
//! Role inheritance walks the group parent chain with a visited-id set
//! (spec.md §9 "Group role walk": an iterative BFS over a visited-id set so
//! cyclic data the DB should never contain cannot hang the walker).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// Role record. Uniqueness: (realm_id, client_id, name). `client_id = None`
/// means realm-scoped; `Some(id)` means scoped to that client.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub client_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: Uuid,
    pub realm_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
}

impl Role {
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch role by id")
    }

    /// Direct roles assigned to a user (not via group membership).
    pub async fn direct_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch direct user roles")
    }

    /// Groups a user directly belongs to.
    pub async fn direct_groups_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Group>> {
        sqlx::query_as::<_, Group>(
            r#"
            SELECT g.* FROM groups g
            JOIN user_groups ug ON g.id = ug.group_id
            WHERE ug.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch user's direct groups")
    }

    pub async fn parent_of(pool: &PgPool, group_id: Uuid) -> Result<Option<Uuid>> {
        let parent: Option<Uuid> =
            sqlx::query_scalar("SELECT parent_id FROM groups WHERE id = $1")
                .bind(group_id)
                .fetch_optional(pool)
                .await
                .context("failed to fetch group parent")?
                .flatten();
        Ok(parent)
    }

    pub async fn roles_for_group(pool: &PgPool, group_id: Uuid) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN group_roles gr ON r.id = gr.role_id
            WHERE gr.group_id = $1
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await
        .context("failed to fetch group roles")
    }

    /// All effective roles for a user: direct roles, plus roles inherited
    /// from every group in the user's membership closure (walking each
    /// group's parent chain). Cycles are guarded by a visited-id set even
    /// though §3 forbids them at the data layer.
    pub async fn effective_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>> {
        let mut roles = Self::direct_for_user(pool, user_id).await?;
        let mut seen_roles: HashSet<Uuid> = roles.iter().map(|r| r.id).collect();

        let direct_groups = Self::direct_groups_for_user(pool, user_id).await?;
        let mut visited_groups: HashSet<Uuid> = HashSet::new();
        let mut queue: VecDeque<Uuid> = direct_groups.iter().map(|g| g.id).collect();

        while let Some(group_id) = queue.pop_front() {
            if !visited_groups.insert(group_id) {
                continue;
            }

            for role in Self::roles_for_group(pool, group_id).await? {
                if seen_roles.insert(role.id) {
                    roles.push(role);
                }
            }

            if let Some(parent_id) = Self::parent_of(pool, group_id).await? {
                if !visited_groups.contains(&parent_id) {
                    queue.push_back(parent_id);
                }
            }
        }

        Ok(roles)
    }
}

impl Group {
    /// Reject self-parenting and immediate two-cycles; full-cycle detection
    /// happens via the visited-id walk above at read time.
    pub async fn validate_parent(pool: &PgPool, group_id: Uuid, parent_id: Uuid) -> Result<bool> {
        if group_id == parent_id {
            return Ok(false);
        }
        let mut current = Some(parent_id);
        let mut visited = HashSet::new();
        while let Some(id) = current {
            if id == group_id || !visited.insert(id) {
                return Ok(false);
            }
            current = Role::parent_of(pool, id).await?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_scoping_distinguishes_realm_and_client() {
        let realm_role = Role {
            id: Uuid::nil(),
            realm_id: Uuid::nil(),
            client_id: None,
            name: "admin".to_string(),
            description: None,
        };
        let client_role = Role {
            client_id: Some(Uuid::now_v7()),
            ..realm_role.clone()
        };
        assert!(realm_role.client_id.is_none());
        assert!(client_role.client_id.is_some());
    }
}
