use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::users::repo_types::{NewUserRecord, User, UserChanges};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Cpf,
}

impl UniqueField {
    fn from_constraint(name: &str) -> Option<Self> {
        match name {
            "users_email_key" => Some(Self::Email),
            "users_cpf_key" => Some(Self::Cpf),
            _ => None,
        }
    }

    pub fn conflict_message(self) -> &'static str {
        match self {
            UniqueField::Email => "Email already registered",
            UniqueField::Cpf => "CPF already registered",
        }
    }
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("duplicate {0:?}")]
    Duplicate(UniqueField),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence seam for user records.
///
/// `filter` is the raw search term; implementations match it as a
/// case-insensitive substring of name, email or cpf.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn count(&self, filter: Option<&str>) -> Result<i64, RepoError>;
    async fn page(
        &self,
        filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, RepoError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;
    async fn insert(&self, user: NewUserRecord) -> Result<User, RepoError>;
    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, RepoError>;
    /// Returns the number of rows removed.
    async fn delete(&self, id: i64) -> Result<u64, RepoError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Wraps a term for ILIKE, escaping the wildcard and escape characters.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn map_write_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            if let Some(field) = db.constraint().and_then(UniqueField::from_constraint) {
                return RepoError::Duplicate(field);
            }
        }
    }
    RepoError::Database(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn count(&self, filter: Option<&str>) -> Result<i64, RepoError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE $1::text IS NULL
               OR name ILIKE $1
               OR email ILIKE $1
               OR cpf ILIKE $1
            "#,
        )
        .bind(filter.map(like_pattern))
        .fetch_one(&self.db)
        .await?;
        Ok(total)
    }

    async fn page(
        &self,
        filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, RepoError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, cpf, phone, birth_date, created_at, updated_at
            FROM users
            WHERE $1::text IS NULL
               OR name ILIKE $1
               OR email ILIKE $1
               OR cpf ILIKE $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.map(like_pattern))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, cpf, phone, birth_date, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUserRecord) -> Result<User, RepoError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, cpf, phone, birth_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, password_hash, cpf, phone, birth_date, created_at, updated_at
            "#,
        )
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.cpf)
        .bind(user.phone)
        .bind(user.birth_date)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, RepoError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name          = COALESCE($2, name),
                email         = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                cpf           = COALESCE($5, cpf),
                phone         = COALESCE($6, phone),
                birth_date    = COALESCE($7, birth_date),
                updated_at    = now()
            WHERE id = $1
            RETURNING id, name, email, password_hash, cpf, phone, birth_date, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.cpf)
        .bind(changes.phone)
        .bind(changes.birth_date)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_error)
    }

    async fn delete(&self, id: i64) -> Result<u64, RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }
}
