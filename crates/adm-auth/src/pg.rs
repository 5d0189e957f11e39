//! Postgres 存储实现

use adm_core::{Account, AccountStatus, ApiEntry, DataScope, Department, Role};
use adm_error::{AdmError, DatabaseContext, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::RoleQuery;
use crate::store::{
    AccountRepository, ApiRepository, DepartmentRepository, RolePermissionStore, RoleRepository,
};

const ACCOUNT_COLUMNS: &str = "id, username, password_hash, email, mobile, status, locked_until, \
     login_attempts, last_login_at, last_login_ip, department_id";
const ROLE_COLUMNS: &str = "id, name, description, data_scope, sort, status";
const DEPARTMENT_COLUMNS: &str = "id, parent_id, name, sort, status";
const API_COLUMNS: &str =
    "id, parent_id, name, permission_code, url, method, sort, status, is_menu, description";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(table: &str, operation: &str, err: sqlx::Error) -> AdmError {
    match AdmError::from(err) {
        AdmError::Database { message, .. } => AdmError::Database {
            message,
            context: Some(DatabaseContext {
                query: None,
                table: Some(table.to_string()),
                operation: Some(operation.to_string()),
            }),
        },
        other => other,
    }
}

fn department_from_row(row: &PgRow) -> Result<Department> {
    Ok(Department {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        sort: row.try_get("sort")?,
        status: row.try_get("status")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let code: i16 = row.try_get("status")?;
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        mobile: row.try_get("mobile")?,
        status: AccountStatus::from_code(code).ok_or_else(|| AdmError::Database {
            message: format!("unknown account status {}", code),
            context: None,
        })?,
        locked_until: row.try_get("locked_until")?,
        login_attempts: row.try_get("login_attempts")?,
        last_login_at: row.try_get("last_login_at")?,
        last_login_ip: row.try_get("last_login_ip")?,
        department_id: row.try_get("department_id")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role> {
    let scope: i16 = row.try_get("data_scope")?;
    Ok(Role {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        data_scope: DataScope::from_code(scope).unwrap_or_default(),
        sort: row.try_get("sort")?,
        status: row.try_get("status")?,
    })
}

fn api_from_row(row: &PgRow) -> Result<ApiEntry> {
    Ok(ApiEntry {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        name: row.try_get("name")?,
        permission_code: row.try_get("permission_code")?,
        url: row.try_get("url")?,
        method: row.try_get("method")?,
        sort: row.try_get("sort")?,
        status: row.try_get("status")?,
        is_menu: row.try_get("is_menu")?,
        description: row.try_get("description")?,
    })
}

/// 在事务内把接口ID解析为权限码并整体替换角色关联
///
/// 调用方需已持有角色行锁。
async fn replace_role_apis(
    tx: &mut Transaction<'_, Postgres>,
    role_id: i64,
    api_ids: &[i64],
) -> Result<usize> {
    let mut ids: Vec<i64> = api_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let rows = sqlx::query("SELECT id, permission_code FROM sys_apis WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| db_error("sys_apis", "resolve_codes", e))?;

    let mut resolved: HashMap<i64, String> = HashMap::with_capacity(rows.len());
    for row in &rows {
        resolved.insert(row.try_get("id")?, row.try_get("permission_code")?);
    }
    let missing: Vec<i64> = ids
        .iter()
        .filter(|id| !resolved.contains_key(id))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(AdmError::NotFound {
            resource: format!("api {:?}", missing),
        });
    }

    sqlx::query("DELETE FROM sys_role_apis WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("sys_role_apis", "delete", e))?;

    if ids.is_empty() {
        return Ok(0);
    }

    let role_ids = vec![role_id; ids.len()];
    let codes: Vec<String> = ids
        .iter()
        .filter_map(|id| resolved.get(id).cloned())
        .collect();
    sqlx::query(
        r#"
        INSERT INTO sys_role_apis (role_id, permission_code, api_id)
        SELECT * FROM UNNEST($1::bigint[], $2::text[], $3::bigint[])
        "#,
    )
    .bind(&role_ids)
    .bind(&codes)
    .bind(&ids)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("sys_role_apis", "insert", e))?;

    Ok(ids.len())
}

async fn lock_role(tx: &mut Transaction<'_, Postgres>, role_id: i64) -> Result<()> {
    let locked = sqlx::query("SELECT id FROM sys_roles WHERE id = $1 FOR UPDATE")
        .bind(role_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| db_error("sys_roles", "lock", e))?;
    if locked.is_none() {
        return Err(AdmError::NotFound {
            resource: format!("role {}", role_id),
        });
    }
    Ok(())
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sys_accounts WHERE username = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("sys_accounts", "find_by_username", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sys_accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("sys_accounts", "find_by_id", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>, ip: Option<String>) -> Result<()> {
        sqlx::query(
            "UPDATE sys_accounts SET last_login_at = $2, last_login_ip = $3, login_attempts = 0 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .bind(ip)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("sys_accounts", "record_login", e))?;
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE sys_accounts SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("sys_accounts", "update_password", e))?;
        if result.rows_affected() == 0 {
            return Err(AdmError::NotFound {
                resource: format!("account {}", id),
            });
        }
        Ok(())
    }

    async fn roles_of(&self, account_id: i64) -> Result<Vec<Role>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name, r.description, r.data_scope, r.sort, r.status
            FROM sys_roles r
            JOIN sys_account_roles ar ON ar.role_id = r.id
            WHERE ar.account_id = $1 AND r.status
            ORDER BY r.sort DESC, r.id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("sys_account_roles", "roles_of", e))?;
        rows.iter().map(role_from_row).collect()
    }

    async fn create_account(&self, account: Account, role_ids: &[i64]) -> Result<Account> {
        let mut roles: Vec<i64> = role_ids.to_vec();
        roles.sort_unstable();
        roles.dedup();

        let mut tx = self.pool.begin().await?;
        let found: Vec<i64> = sqlx::query_scalar("SELECT id FROM sys_roles WHERE id = ANY($1)")
            .bind(&roles)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error("sys_roles", "resolve_roles", e))?;
        let missing: Vec<i64> = roles.iter().filter(|id| !found.contains(id)).copied().collect();
        if !missing.is_empty() {
            return Err(AdmError::NotFound {
                resource: format!("role {:?}", missing),
            });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sys_accounts (username, password_hash, email, mobile, status, department_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.email)
        .bind(&account.mobile)
        .bind(account.status.code())
        .bind(account.department_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("sys_accounts", "create_account", e))?;
        let created = account_from_row(&row)?;

        if !roles.is_empty() {
            sqlx::query(
                "INSERT INTO sys_account_roles (account_id, role_id) SELECT $1, UNNEST($2::bigint[])",
            )
            .bind(created.id)
            .bind(&roles)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("sys_account_roles", "create_account", e))?;
        }
        tx.commit().await?;

        debug!(account_id = created.id, roles = roles.len(), "account created");
        Ok(created)
    }
}

#[async_trait]
impl ApiRepository for PgStore {
    async fn list_all(&self) -> Result<Vec<ApiEntry>> {
        let rows = sqlx::query(&format!("SELECT {} FROM sys_apis ORDER BY id", API_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("sys_apis", "list_all", e))?;
        rows.iter().map(api_from_row).collect()
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ApiEntry>> {
        let row = sqlx::query(&format!("SELECT {} FROM sys_apis WHERE id = $1", API_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("sys_apis", "get_by_id", e))?;
        row.as_ref().map(api_from_row).transpose()
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<ApiEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sys_apis WHERE id = ANY($1) ORDER BY id",
            API_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("sys_apis", "get_by_ids", e))?;
        rows.iter().map(api_from_row).collect()
    }

    async fn create(&self, entry: ApiEntry) -> Result<ApiEntry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sys_apis (parent_id, name, permission_code, url, method, sort, status, is_menu, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            API_COLUMNS
        ))
        .bind(entry.parent_id)
        .bind(&entry.name)
        .bind(&entry.permission_code)
        .bind(&entry.url)
        .bind(&entry.method)
        .bind(entry.sort)
        .bind(entry.status)
        .bind(entry.is_menu)
        .bind(&entry.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sys_apis", "create", e))?;
        api_from_row(&row)
    }

    async fn update(&self, entry: ApiEntry) -> Result<ApiEntry> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE sys_apis
            SET parent_id = $2, name = $3, permission_code = $4, url = $5, method = $6,
                sort = $7, status = $8, is_menu = $9, description = $10
            WHERE id = $1
            RETURNING {}
            "#,
            API_COLUMNS
        ))
        .bind(entry.id)
        .bind(entry.parent_id)
        .bind(&entry.name)
        .bind(&entry.permission_code)
        .bind(&entry.url)
        .bind(&entry.method)
        .bind(entry.sort)
        .bind(entry.status)
        .bind(entry.is_menu)
        .bind(&entry.description)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("sys_apis", "update", e))?
        .ok_or_else(|| AdmError::NotFound {
            resource: format!("api {}", entry.id),
        })?;

        // 关联表中冗余的权限码跟随更新
        sqlx::query("UPDATE sys_role_apis SET permission_code = $2 WHERE api_id = $1")
            .bind(entry.id)
            .bind(&entry.permission_code)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("sys_role_apis", "rename_code", e))?;

        tx.commit().await?;
        api_from_row(&row)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let has_children: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sys_apis WHERE parent_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_error("sys_apis", "delete", e))?;
        if has_children {
            return Err(AdmError::Validation {
                message: "请先删除子节点".to_string(),
            });
        }

        sqlx::query("DELETE FROM sys_role_apis WHERE api_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("sys_role_apis", "delete", e))?;
        let result = sqlx::query("DELETE FROM sys_apis WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("sys_apis", "delete", e))?;
        if result.rows_affected() == 0 {
            return Err(AdmError::NotFound {
                resource: format!("api {}", id),
            });
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn create_role(&self, role: Role, api_ids: &[i64]) -> Result<Role> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sys_roles (name, description, data_scope, sort, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            ROLE_COLUMNS
        ))
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.data_scope.code())
        .bind(role.sort)
        .bind(role.status)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("sys_roles", "create", e))?;
        let created = role_from_row(&row)?;

        let count = replace_role_apis(&mut tx, created.id, api_ids).await?;
        tx.commit().await?;

        debug!(role_id = created.id, apis = count, "role created");
        Ok(created)
    }

    async fn update_role(&self, role: Role, api_ids: &[i64]) -> Result<Role> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, role.id).await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE sys_roles
            SET name = $2, description = $3, data_scope = $4, sort = $5, status = $6
            WHERE id = $1
            RETURNING {}
            "#,
            ROLE_COLUMNS
        ))
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.data_scope.code())
        .bind(role.sort)
        .bind(role.status)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("sys_roles", "update", e))?;
        let updated = role_from_row(&row)?;

        let count = replace_role_apis(&mut tx, role.id, api_ids).await?;
        tx.commit().await?;

        debug!(role_id = role.id, apis = count, "role updated");
        Ok(updated)
    }

    async fn delete_role(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, id).await?;

        for (table, sql) in [
            ("sys_role_apis", "DELETE FROM sys_role_apis WHERE role_id = $1"),
            ("sys_account_roles", "DELETE FROM sys_account_roles WHERE role_id = $1"),
            ("sys_roles", "DELETE FROM sys_roles WHERE id = $1"),
        ] {
            sqlx::query(sql)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(table, "delete_role", e))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_roles(&self, query: &RoleQuery) -> Result<(Vec<Role>, i64)> {
        let (offset, limit) = query.window();
        let name_pattern = query.name.as_ref().map(|n| format!("%{}%", n));

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sys_roles WHERE ($1::text IS NULL OR name LIKE $1) AND ($2::bool IS NULL OR status = $2)",
        )
        .bind(&name_pattern)
        .bind(query.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sys_roles", "count", e))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM sys_roles
            WHERE ($1::text IS NULL OR name LIKE $1) AND ($2::bool IS NULL OR status = $2)
            ORDER BY sort DESC, id DESC
            OFFSET $3 LIMIT $4
            "#,
            ROLE_COLUMNS
        ))
        .bind(&name_pattern)
        .bind(query.status)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("sys_roles", "list", e))?;

        let roles = rows.iter().map(role_from_row).collect::<Result<Vec<_>>>()?;
        Ok((roles, total))
    }

    async fn get_role(&self, id: i64) -> Result<Option<Role>> {
        let row = sqlx::query(&format!("SELECT {} FROM sys_roles WHERE id = $1", ROLE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("sys_roles", "get", e))?;
        row.as_ref().map(role_from_row).transpose()
    }
}

#[async_trait]
impl RolePermissionStore for PgStore {
    async fn set_role_permissions(&self, role_id: i64, api_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, role_id).await?;
        let count = replace_role_apis(&mut tx, role_id, api_ids).await?;
        tx.commit().await?;

        debug!(role_id, apis = count, "role permissions replaced");
        Ok(())
    }

    async fn permission_codes(&self, role_ids: &[i64]) -> Result<HashSet<String>> {
        if role_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT permission_code FROM sys_role_apis WHERE role_id = ANY($1)",
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("sys_role_apis", "permission_codes", e))?;
        Ok(codes.into_iter().collect())
    }

    async fn has_permission(&self, role_ids: &[i64], code: &str) -> Result<bool> {
        if role_ids.is_empty() {
            return Ok(false);
        }
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sys_role_apis WHERE role_id = ANY($1) AND permission_code = $2)",
        )
        .bind(role_ids)
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sys_role_apis", "has_permission", e))?;
        Ok(exists)
    }

    async fn count_by_role(&self, role_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let mut counts: HashMap<i64, i64> = role_ids.iter().map(|id| (*id, 0)).collect();
        if role_ids.is_empty() {
            return Ok(counts);
        }
        let rows = sqlx::query(
            "SELECT role_id, COUNT(*) AS cnt FROM sys_role_apis WHERE role_id = ANY($1) GROUP BY role_id",
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("sys_role_apis", "count_by_role", e))?;
        for row in &rows {
            counts.insert(row.try_get("role_id")?, row.try_get("cnt")?);
        }
        Ok(counts)
    }

    async fn api_ids_of_role(&self, role_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT api_id FROM sys_role_apis WHERE role_id = $1 ORDER BY api_id")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("sys_role_apis", "api_ids_of_role", e))?;
        Ok(ids)
    }
}

#[async_trait]
impl DepartmentRepository for PgStore {
    async fn list_all(&self) -> Result<Vec<Department>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sys_departments ORDER BY id",
            DEPARTMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("sys_departments", "list_all", e))?;
        rows.iter().map(department_from_row).collect()
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Department>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sys_departments WHERE id = $1",
            DEPARTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("sys_departments", "get_by_id", e))?;
        row.as_ref().map(department_from_row).transpose()
    }

    async fn create(&self, department: Department) -> Result<Department> {
        let row = sqlx::query(&format!(
            "INSERT INTO sys_departments (parent_id, name, sort, status) VALUES ($1, $2, $3, $4) RETURNING {}",
            DEPARTMENT_COLUMNS
        ))
        .bind(department.parent_id)
        .bind(&department.name)
        .bind(department.sort)
        .bind(department.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("sys_departments", "create", e))?;
        department_from_row(&row)
    }

    async fn update(&self, department: Department) -> Result<Department> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE sys_departments SET parent_id = $2, name = $3, sort = $4, status = $5
            WHERE id = $1
            RETURNING {}
            "#,
            DEPARTMENT_COLUMNS
        ))
        .bind(department.id)
        .bind(department.parent_id)
        .bind(&department.name)
        .bind(department.sort)
        .bind(department.status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("sys_departments", "update", e))?;
        match row {
            Some(row) => department_from_row(&row),
            None => Err(AdmError::NotFound {
                resource: format!("department {}", department.id),
            }),
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let has_children: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM sys_departments WHERE parent_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("sys_departments", "delete", e))?;
        if has_children {
            return Err(AdmError::Validation {
                message: "请先删除下级部门".to_string(),
            });
        }
        let result = sqlx::query("DELETE FROM sys_departments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("sys_departments", "delete", e))?;
        if result.rows_affected() == 0 {
            return Err(AdmError::NotFound {
                resource: format!("department {}", id),
            });
        }
        tx.commit().await?;
        Ok(())
    }
}
