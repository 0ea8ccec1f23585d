pub mod models;

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use models::{ApiKey, ApiKeyWithSecret, Invitation, MemberWithUser, Membership, Organization, Project, Role, User};

/// The tenant/access relational store: users, organizations, memberships,
/// projects, API keys and invitations. SQLite via `rusqlite`, mirroring the
/// embedded-store pattern used elsewhere in this codebase for config state.
pub struct RelationalStore {
    conn: Mutex<Connection>,
}

impl RelationalStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self { conn: Mutex::new(conn) };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id         TEXT PRIMARY KEY,
                email      TEXT NOT NULL UNIQUE,
                name       TEXT,
                is_admin   INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS organizations (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS organization_memberships (
                org_id     TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role       TEXT NOT NULL CHECK(role IN ('owner','admin','member','viewer')),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                PRIMARY KEY (org_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_memberships_org ON organization_memberships(org_id);
            CREATE INDEX IF NOT EXISTS idx_memberships_user ON organization_memberships(user_id);

            CREATE TABLE IF NOT EXISTS projects (
                id              TEXT PRIMARY KEY,
                org_id          TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                name            TEXT NOT NULL,
                retention_days  INTEGER NOT NULL DEFAULT 30,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                deleted_at      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_projects_org ON projects(org_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_org_name_active
                ON projects(org_id, name) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS api_keys (
                id             TEXT PRIMARY KEY,
                project_id     TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                key_hash       TEXT NOT NULL UNIQUE,
                key_prefix     TEXT NOT NULL,
                name           TEXT NOT NULL,
                expires_at     TEXT,
                last_used_at   TEXT,
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_api_keys_project ON api_keys(project_id);

            CREATE TABLE IF NOT EXISTS membership_invitations (
                id         TEXT PRIMARY KEY,
                org_id     TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                email      TEXT NOT NULL,
                role       TEXT NOT NULL CHECK(role IN ('owner','admin','member','viewer')),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                UNIQUE(email, org_id)
            );
            ",
        )?;
        Ok(())
    }

    // ---- users ----

    /// Idempotent by id, falling back to email. Mirrors the upsert semantics
    /// the tenant layer needs for header-authenticated callers.
    pub fn upsert_user(&self, id: &str, email: &str, name: Option<&str>) -> anyhow::Result<User> {
        let conn = self.conn.lock().unwrap();
        if let Some(user) = query_user(&conn, "SELECT id, email, name, is_admin, created_at, updated_at FROM users WHERE id = ?1", params![id])? {
            return Ok(user);
        }
        if let Some(user) = query_user(&conn, "SELECT id, email, name, is_admin, created_at, updated_at FROM users WHERE email = ?1", params![email])? {
            return Ok(user);
        }
        conn.execute(
            "INSERT INTO users (id, email, name) VALUES (?1, ?2, ?3)",
            params![id, email, name],
        )?;
        query_user(&conn, "SELECT id, email, name, is_admin, created_at, updated_at FROM users WHERE id = ?1", params![id])?
            .ok_or_else(|| anyhow::anyhow!("user vanished after insert"))
    }

    pub fn get_user_by_id(&self, id: &str) -> anyhow::Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        query_user(&conn, "SELECT id, email, name, is_admin, created_at, updated_at FROM users WHERE id = ?1", params![id])
    }

    // ---- organizations ----

    pub fn create_organization(&self, name: &str) -> anyhow::Result<Organization> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        conn.execute("INSERT INTO organizations (id, name) VALUES (?1, ?2)", params![id, name])?;
        query_org(&conn, &id)?.ok_or_else(|| anyhow::anyhow!("organization vanished after insert"))
    }

    pub fn get_organization_by_id(&self, id: &str) -> anyhow::Result<Option<Organization>> {
        let conn = self.conn.lock().unwrap();
        query_org(&conn, id)
    }

    pub fn list_organizations_by_user(&self, user_id: &str) -> anyhow::Result<Vec<(Organization, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT o.id, o.name, o.created_at, o.updated_at, m.role
             FROM organizations o
             JOIN organization_memberships m ON m.org_id = o.id
             WHERE m.user_id = ?1
             ORDER BY o.created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    },
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_organization(&self, id: &str, name: &str) -> anyhow::Result<Option<Organization>> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE organizations SET name = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
            params![id, name],
        )?;
        if count == 0 {
            return Ok(None);
        }
        query_org(&conn, id)
    }

    pub fn delete_organization(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM organizations WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    // ---- memberships ----

    pub fn add_member(&self, org_id: &str, user_id: &str, role: Role) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO organization_memberships (org_id, user_id, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(org_id, user_id) DO UPDATE SET role = excluded.role",
            params![org_id, user_id, role.as_str()],
        )?;
        Ok(())
    }

    pub fn get_membership(&self, org_id: &str, user_id: &str) -> anyhow::Result<Option<Membership>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT org_id, user_id, role, created_at FROM organization_memberships WHERE org_id = ?1 AND user_id = ?2",
            params![org_id, user_id],
            |row| {
                Ok(Membership {
                    org_id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_members_by_org(&self, org_id: &str) -> anyhow::Result<Vec<MemberWithUser>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.email, u.name, m.role
             FROM organization_memberships m
             JOIN users u ON u.id = m.user_id
             WHERE m.org_id = ?1
             ORDER BY m.created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![org_id], |row| {
                Ok(MemberWithUser {
                    user_id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    role: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_owners_tx(conn: &Connection, org_id: &str) -> rusqlite::Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM organization_memberships WHERE org_id = ?1 AND role = 'owner'",
            params![org_id],
            |row| row.get(0),
        )
    }

    /// Changes a member's role. Refuses to demote the last remaining owner;
    /// the owner count is read and the update applied inside one
    /// transaction so a concurrent demotion can't race past the check.
    pub fn update_member_role(&self, org_id: &str, user_id: &str, new_role: Role) -> Result<(), ApiError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(ApiError::from)?;

        let current_role: Option<String> = tx
            .query_row(
                "SELECT role FROM organization_memberships WHERE org_id = ?1 AND user_id = ?2",
                params![org_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(ApiError::from)?;
        let Some(current_role) = current_role else {
            return Err(ApiError::NotFound("membership not found".to_string()));
        };

        if current_role == "owner" && new_role != Role::Owner {
            let owners = Self::count_owners_tx(&tx, org_id).map_err(ApiError::from)?;
            if owners <= 1 {
                return Err(ApiError::Conflict("organization must retain at least one owner".to_string()));
            }
        }

        tx.execute(
            "UPDATE organization_memberships SET role = ?3 WHERE org_id = ?1 AND user_id = ?2",
            params![org_id, user_id, new_role.as_str()],
        )
        .map_err(ApiError::from)?;
        tx.commit().map_err(ApiError::from)?;
        Ok(())
    }

    /// Removes a member, refusing to remove the last remaining owner.
    pub fn remove_member(&self, org_id: &str, user_id: &str) -> Result<(), ApiError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(ApiError::from)?;

        let role: Option<String> = tx
            .query_row(
                "SELECT role FROM organization_memberships WHERE org_id = ?1 AND user_id = ?2",
                params![org_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(ApiError::from)?;
        let Some(role) = role else {
            return Err(ApiError::NotFound("membership not found".to_string()));
        };

        if role == "owner" {
            let owners = Self::count_owners_tx(&tx, org_id).map_err(ApiError::from)?;
            if owners <= 1 {
                return Err(ApiError::Conflict("organization must retain at least one owner".to_string()));
            }
        }

        tx.execute(
            "DELETE FROM organization_memberships WHERE org_id = ?1 AND user_id = ?2",
            params![org_id, user_id],
        )
        .map_err(ApiError::from)?;
        tx.commit().map_err(ApiError::from)?;
        Ok(())
    }

    // ---- projects ----

    pub fn check_project_name_exists(&self, org_id: &str, name: &str, exclude_project_id: Option<&str>) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE org_id = ?1 AND name = ?2 AND deleted_at IS NULL AND id != ?3",
            params![org_id, name, exclude_project_id.unwrap_or("")],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn create_project(&self, org_id: &str, name: &str, retention_days: u32) -> Result<Project, ApiError> {
        if self.check_project_name_exists(org_id, name, None)? {
            return Err(ApiError::Conflict(format!("project named '{name}' already exists in this organization")));
        }
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO projects (id, org_id, name, retention_days) VALUES (?1, ?2, ?3, ?4)",
            params![id, org_id, name, retention_days],
        )?;
        query_project(&conn, &id)?.ok_or_else(|| ApiError::Internal("project vanished after insert".to_string()))
    }

    pub fn get_active_project_by_id(&self, id: &str) -> anyhow::Result<Option<Project>> {
        let conn = self.conn.lock().unwrap();
        Ok(query_project(&conn, id)?.filter(|p| p.deleted_at.is_none()))
    }

    pub fn list_projects_by_org(&self, org_id: &str) -> anyhow::Result<Vec<Project>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, org_id, name, retention_days, created_at, updated_at, deleted_at
             FROM projects WHERE org_id = ?1 AND deleted_at IS NULL ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![org_id], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_project(&self, id: &str, name: Option<&str>, retention_days: Option<u32>) -> Result<Option<Project>, ApiError> {
        let conn = self.conn.lock().unwrap();
        let Some(existing) = query_project(&conn, id)? else {
            return Ok(None);
        };
        if existing.deleted_at.is_some() {
            return Ok(None);
        }
        let new_name = name.unwrap_or(&existing.name);
        if name.is_some() && new_name != existing.name {
            drop(conn);
            if self.check_project_name_exists(&existing.org_id, new_name, Some(id))? {
                return Err(ApiError::Conflict(format!("project named '{new_name}' already exists in this organization")));
            }
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE projects SET name = ?2, retention_days = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
                params![id, new_name, retention_days.unwrap_or(existing.retention_days)],
            )?;
            return Ok(query_project(&conn, id)?);
        }
        conn.execute(
            "UPDATE projects SET retention_days = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
            params![id, retention_days.unwrap_or(existing.retention_days)],
        )?;
        Ok(query_project(&conn, id)?)
    }

    pub fn soft_delete_project(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE projects SET deleted_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
        )?;
        Ok(count > 0)
    }

    pub fn has_active_projects(&self, org_id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE org_id = ?1 AND deleted_at IS NULL",
            params![org_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ---- api keys ----

    /// Generates a `tr-{uuid}` secret, stores only its SHA-256 hash, and
    /// returns the plaintext secret once. It cannot be recovered afterward.
    pub fn create_api_key(&self, project_id: &str, name: &str, expires_at: Option<chrono::DateTime<Utc>>) -> anyhow::Result<ApiKeyWithSecret> {
        let secret = format!("tr-{}", Uuid::new_v4());
        let hash = hex::encode(Sha256::digest(secret.as_bytes()));
        let prefix: String = secret.chars().take(10).collect();
        let id = Uuid::new_v4().to_string();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_keys (id, project_id, key_hash, key_prefix, name, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, project_id, hash, prefix, name, expires_at],
        )?;
        let key = query_api_key(&conn, &id)?.ok_or_else(|| anyhow::anyhow!("api key vanished after insert"))?;
        Ok(ApiKeyWithSecret { key, secret })
    }

    pub fn list_api_keys_by_project(&self, project_id: &str) -> anyhow::Result<Vec<ApiKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, key_prefix, name, expires_at, last_used_at, created_at
             FROM api_keys WHERE project_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![project_id], api_key_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_api_key_by_id(&self, id: &str) -> anyhow::Result<Option<ApiKey>> {
        let conn = self.conn.lock().unwrap();
        query_api_key(&conn, id)
    }

    pub fn delete_api_key(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM api_keys WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    /// Auth lookup by the hash of a presented secret. Also returns the
    /// owning project id so the caller doesn't need a second query.
    pub fn get_api_key_by_hash(&self, hash: &str) -> anyhow::Result<Option<ApiKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, key_prefix, name, expires_at, last_used_at, created_at
             FROM api_keys WHERE key_hash = ?1",
        )?;
        let mut rows = stmt.query_map(params![hash], api_key_from_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn update_api_key_last_used(&self, id: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE api_keys SET last_used_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // ---- invitations ----

    pub fn create_invitation(&self, org_id: &str, email: &str, role: Role) -> anyhow::Result<Invitation> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO membership_invitations (id, org_id, email, role) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(email, org_id) DO UPDATE SET role = excluded.role",
            params![id, org_id, email, role.as_str()],
        )?;
        conn.query_row(
            "SELECT id, org_id, email, role, created_at FROM membership_invitations WHERE org_id = ?1 AND email = ?2",
            params![org_id, email],
            invitation_from_row,
        )
        .map_err(Into::into)
    }

    pub fn list_invitations_by_org(&self, org_id: &str) -> anyhow::Result<Vec<Invitation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, org_id, email, role, created_at FROM membership_invitations WHERE org_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![org_id], invitation_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn query_user(conn: &Connection, sql: &str, p: impl rusqlite::Params) -> anyhow::Result<Option<User>> {
    conn.query_row(sql, p, |row| {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            is_admin: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    })
    .optional()
    .map_err(Into::into)
}

fn query_org(conn: &Connection, id: &str) -> anyhow::Result<Option<Organization>> {
    conn.query_row(
        "SELECT id, name, created_at, updated_at FROM organizations WHERE id = ?1",
        params![id],
        |row| {
            Ok(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

fn project_from_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        org_id: row.get(1)?,
        name: row.get(2)?,
        retention_days: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted_at: row.get(6)?,
    })
}

fn query_project(conn: &Connection, id: &str) -> anyhow::Result<Option<Project>> {
    conn.query_row(
        "SELECT id, org_id, name, retention_days, created_at, updated_at, deleted_at FROM projects WHERE id = ?1",
        params![id],
        project_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn api_key_from_row(row: &rusqlite::Row) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        project_id: row.get(1)?,
        key_prefix: row.get(2)?,
        name: row.get(3)?,
        expires_at: row.get(4)?,
        last_used_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_api_key(conn: &Connection, id: &str) -> anyhow::Result<Option<ApiKey>> {
    conn.query_row(
        "SELECT id, project_id, key_prefix, name, expires_at, last_used_at, created_at FROM api_keys WHERE id = ?1",
        params![id],
        api_key_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn invitation_from_row(row: &rusqlite::Row) -> rusqlite::Result<Invitation> {
    Ok(Invitation {
        id: row.get(0)?,
        org_id: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RelationalStore {
        RelationalStore::open(":memory:").unwrap()
    }

    #[test]
    fn upsert_user_is_idempotent_by_id_then_email() {
        let s = store();
        let a = s.upsert_user("u1", "a@example.com", Some("A")).unwrap();
        let b = s.upsert_user("u1", "a@example.com", Some("A again")).unwrap();
        assert_eq!(a.id, b.id);
        let c = s.upsert_user("u2", "a@example.com", None).unwrap();
        assert_eq!(c.id, "u1", "lookup by email must win when id is new");
    }

    #[test]
    fn owner_protection_blocks_removing_last_owner() {
        let s = store();
        let org = s.create_organization("acme").unwrap();
        let owner = s.upsert_user("owner", "o@example.com", None).unwrap();
        s.add_member(&org.id, &owner.id, Role::Owner).unwrap();

        let err = s.remove_member(&org.id, &owner.id).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn owner_protection_allows_removal_with_two_owners() {
        let s = store();
        let org = s.create_organization("acme").unwrap();
        let owner1 = s.upsert_user("o1", "o1@example.com", None).unwrap();
        let owner2 = s.upsert_user("o2", "o2@example.com", None).unwrap();
        s.add_member(&org.id, &owner1.id, Role::Owner).unwrap();
        s.add_member(&org.id, &owner2.id, Role::Owner).unwrap();

        s.remove_member(&org.id, &owner1.id).unwrap();
        assert!(s.get_membership(&org.id, &owner1.id).unwrap().is_none());
    }

    #[test]
    fn project_name_unique_among_active_projects_in_org() {
        let s = store();
        let org = s.create_organization("acme").unwrap();
        s.create_project(&org.id, "prod", 30).unwrap();
        let err = s.create_project(&org.id, "prod", 30).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let p2 = s.create_project(&org.id, "staging", 30).unwrap();
        s.soft_delete_project(&p2.id).unwrap();
        s.create_project(&org.id, "staging", 30).unwrap();
    }

    #[test]
    fn api_key_hash_round_trips() {
        let s = store();
        let org = s.create_organization("acme").unwrap();
        let project = s.create_project(&org.id, "prod", 30).unwrap();
        let created = s.create_api_key(&project.id, "ci", None).unwrap();

        let hash = hex::encode(Sha256::digest(created.secret.as_bytes()));
        let fetched = s.get_api_key_by_hash(&hash).unwrap().unwrap();
        assert_eq!(fetched.id, created.key.id);
    }
}
