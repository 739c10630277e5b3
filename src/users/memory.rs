use std::cmp::Reverse;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::users::repo::{RepoError, UniqueField, UserStore};
use crate::users::repo_types::{NewUserRecord, User, UserChanges};

/// `UserStore` backed by a vector, mirroring the SQL store's unique
/// constraints, ordering and ILIKE search.
#[derive(Default)]
pub struct InMemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<User>,
}

impl Inner {
    fn check_unique(&self, id: Option<i64>, email: &str, cpf: &str) -> Result<(), RepoError> {
        for row in self.rows.iter().filter(|r| Some(r.id) != id) {
            if row.email == email {
                return Err(RepoError::Duplicate(UniqueField::Email));
            }
            if row.cpf == cpf {
                return Err(RepoError::Duplicate(UniqueField::Cpf));
            }
        }
        Ok(())
    }

    fn matching(&self, filter: Option<&str>) -> Vec<&User> {
        let needle = filter.map(str::to_lowercase);
        self.rows
            .iter()
            .filter(|u| match &needle {
                None => true,
                Some(n) => {
                    u.name.to_lowercase().contains(n)
                        || u.email.to_lowercase().contains(n)
                        || u.cpf.contains(n.as_str())
                }
            })
            .collect()
    }
}

impl InMemoryUserStore {
    pub fn password_hash(&self, id: i64) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.password_hash.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn count(&self, filter: Option<&str>) -> Result<i64, RepoError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.matching(filter).len() as i64)
    }

    async fn page(
        &self,
        filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, RepoError> {
        let inner = self.inner.lock().unwrap();
        let mut rows = inner.matching(filter);
        rows.sort_by_key(|u| Reverse((u.created_at, u.id)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: NewUserRecord) -> Result<User, RepoError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_unique(None, &user.email, &user.cpf)?;

        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: inner.next_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            cpf: user.cpf,
            phone: user.phone,
            birth_date: user.birth_date,
            created_at: now,
            updated_at: now,
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, RepoError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(current) = inner.rows.iter().find(|u| u.id == id).cloned() else {
            return Ok(None);
        };

        let email = changes.email.unwrap_or(current.email);
        let cpf = changes.cpf.unwrap_or(current.cpf);
        inner.check_unique(Some(id), &email, &cpf)?;

        let updated = User {
            id,
            name: changes.name.unwrap_or(current.name),
            email,
            password_hash: changes.password_hash.unwrap_or(current.password_hash),
            cpf,
            phone: changes.phone.unwrap_or(current.phone),
            birth_date: changes.birth_date.unwrap_or(current.birth_date),
            created_at: current.created_at,
            updated_at: OffsetDateTime::now_utc(),
        };
        if let Some(slot) = inner.rows.iter_mut().find(|u| u.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete(&self, id: i64) -> Result<u64, RepoError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.rows.len();
        inner.rows.retain(|u| u.id != id);
        Ok((before - inner.rows.len()) as u64)
    }
}
