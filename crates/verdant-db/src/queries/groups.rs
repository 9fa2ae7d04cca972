use anyhow::Result;
use rusqlite::Connection;

use super::OptionalExt;
use crate::Database;
use crate::models::{GroupInfoRow, GroupRow, MembershipRow};

impl Database {
    /// Create a group. The owner gets an admin membership in the same
    /// transaction, so owners are always members too.
    pub fn create_group(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
        owner_id: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO groups (id, name, description, owner_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, name, description, owner_id],
            )?;
            tx.execute(
                "INSERT INTO group_memberships (user_id, group_id, role) VALUES (?1, ?2, 'admin')",
                rusqlite::params![owner_id, id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, description, owner_id, created_at FROM groups WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(GroupRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            owner_id: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_group_info(&self, id: &str) -> Result<Option<GroupInfoRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&group_info_sql("g.id = ?1"))?;
            let row = stmt.query_row([id], map_group_info).optional()?;
            Ok(row)
        })
    }

    /// Groups the user belongs to, plus groups they own — de-duplicated
    /// (the auto-created owner membership makes owners members, but a
    /// group must not appear twice even if that membership was removed
    /// by hand).
    pub fn my_groups(&self, user_id: &str) -> Result<Vec<GroupInfoRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&group_info_sql(
                "g.owner_id = ?1
                 OR g.id IN (SELECT group_id FROM group_memberships WHERE user_id = ?1)",
            ))?;
            let rows = stmt
                .query_map([user_id], map_group_info)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_membership(&self, user_id: &str, group_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| query_membership(conn, user_id, group_id))
    }

    /// The single management-capability predicate: group owner, or a
    /// member holding the admin role. Teacher/student never qualify.
    pub fn can_manage_group(&self, user_id: &str, group_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let authorized: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?2 AND owner_id = ?1)
                     OR EXISTS(SELECT 1 FROM group_memberships
                               WHERE group_id = ?2 AND user_id = ?1 AND role = 'admin')",
                rusqlite::params![user_id, group_id],
                |row| row.get(0),
            )?;
            Ok(authorized)
        })
    }

    /// Content-visibility predicate: any membership role, or ownership.
    pub fn is_member_or_owner(&self, user_id: &str, group_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let visible: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?2 AND owner_id = ?1)
                     OR EXISTS(SELECT 1 FROM group_memberships
                               WHERE group_id = ?2 AND user_id = ?1)",
                rusqlite::params![user_id, group_id],
                |row| row.get(0),
            )?;
            Ok(visible)
        })
    }

    pub fn add_membership(&self, user_id: &str, group_id: &str, role: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO group_memberships (user_id, group_id, role) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, group_id, role],
            )?;
            Ok(())
        })
    }

    /// Returns false when no membership existed.
    pub fn remove_membership(&self, user_id: &str, group_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM group_memberships WHERE user_id = ?1 AND group_id = ?2",
                rusqlite::params![user_id, group_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Returns false when no membership existed.
    pub fn update_role(&self, user_id: &str, group_id: &str, role: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE group_memberships SET role = ?3 WHERE user_id = ?1 AND group_id = ?2",
                rusqlite::params![user_id, group_id, role],
            )?;
            Ok(n > 0)
        })
    }
}

fn group_info_sql(filter: &str) -> String {
    format!(
        "SELECT g.id, g.name, g.description, g.owner_id,
                u.username, u.first_name, u.last_name,
                (SELECT COUNT(*) FROM group_memberships m WHERE m.group_id = g.id),
                (SELECT COUNT(*) FROM posts p WHERE p.group_id = g.id),
                g.created_at
         FROM groups g
         JOIN users u ON u.id = g.owner_id
         WHERE {filter}
         ORDER BY g.created_at DESC, g.rowid DESC"
    )
}

fn map_group_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupInfoRow> {
    Ok(GroupInfoRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        owner_username: row.get(4)?,
        owner_first_name: row.get(5)?,
        owner_last_name: row.get(6)?,
        member_count: row.get(7)?,
        post_count: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn query_membership(
    conn: &Connection,
    user_id: &str,
    group_id: &str,
) -> Result<Option<MembershipRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.user_id, u.username, m.group_id, m.role, m.joined_at
         FROM group_memberships m
         JOIN users u ON u.id = m.user_id
         WHERE m.user_id = ?1 AND m.group_id = ?2",
    )?;

    let row = stmt
        .query_row([user_id, group_id], |row| {
            Ok(MembershipRow {
                user_id: row.get(0)?,
                username: row.get(1)?,
                group_id: row.get(2)?,
                role: row.get(3)?,
                joined_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}
