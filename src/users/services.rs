use std::sync::Arc;

use time::Date;
use tracing::{debug, info};

use crate::error::AppError;
use crate::pagination::{Page, PageMeta, PageRequest};
use crate::users::password::PasswordHashing;
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUserRecord, User, UserChanges};

/// Validated input for a new user; `password` is still plaintext.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub cpf: String,
    pub phone: String,
    pub birth_date: Date,
}

/// Validated partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<Date>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hashing: PasswordHashing,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hashing: PasswordHashing) -> Self {
        Self { store, hashing }
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<User>, AppError> {
        self.fetch_page(None, page).await
    }

    pub async fn search(&self, term: &str, page: PageRequest) -> Result<Page<User>, AppError> {
        // NUL cannot reach a Postgres text parameter
        let term = term.replace('\0', "");
        let term = term.trim();
        if term.is_empty() {
            return self.list(page).await;
        }
        self.fetch_page(Some(term), page).await
    }

    async fn fetch_page(
        &self,
        filter: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<User>, AppError> {
        let total = self.store.count(filter).await?;
        let data = self
            .store
            .page(filter, page.limit(), page.offset())
            .await?;
        let meta = PageMeta::new(total, page);
        debug!(?filter, total, page = meta.current_page, rows = data.len(), "users page");
        Ok(Page { data, meta })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn create(&self, input: NewUser) -> Result<User, AppError> {
        let password_hash = self.hashing.hash(&input.password)?;
        let user = self
            .store
            .insert(NewUserRecord {
                name: input.name,
                email: input.email,
                password_hash,
                cpf: input.cpf,
                phone: input.phone,
                birth_date: input.birth_date,
            })
            .await?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub async fn update(&self, id: i64, patch: UserPatch) -> Result<User, AppError> {
        let password_hash = match patch.password.as_deref() {
            Some(p) if !p.is_empty() => Some(self.hashing.hash(p)?),
            _ => None,
        };
        let changes = UserChanges {
            name: patch.name,
            email: patch.email,
            password_hash,
            cpf: patch.cpf,
            phone: patch.phone,
            birth_date: patch.birth_date,
        };
        let user = self
            .store
            .update(id, changes)
            .await?
            .ok_or_else(|| not_found(id))?;
        info!(user_id = user.id, "user updated");
        Ok(user)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if self.store.delete(id).await? == 0 {
            return Err(not_found(id));
        }
        info!(user_id = id, "user deleted");
        Ok(())
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("User {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::InMemoryUserStore;
    use time::macros::date;

    fn service() -> (UserService, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::default());
        let service = UserService::new(store.clone(), PasswordHashing::for_tests());
        (service, store)
    }

    fn new_user(n: u32) -> NewUser {
        NewUser {
            name: format!("User {n}"),
            email: format!("user{n}@example.com"),
            password: "abcdef".into(),
            cpf: format!("{:011}", n),
            phone: "11999999999".into(),
            birth_date: date!(1990 - 01 - 01),
        }
    }

    fn ana() -> NewUser {
        NewUser {
            name: "Ana Silva".into(),
            email: "ana@x.com".into(),
            password: "abcdef".into(),
            cpf: "12345678901".into(),
            phone: "11999999999".into(),
            birth_date: date!(1990 - 01 - 01),
        }
    }

    async fn seed(service: &UserService, n: u32) {
        for i in 1..=n {
            service.create(new_user(i)).await.expect("seed user");
        }
    }

    #[tokio::test]
    async fn create_hashes_password_and_hides_it() {
        let (service, store) = service();
        let user = service.create(ana()).await.unwrap();

        assert!(user.id > 0);
        assert_eq!(user.cpf, "12345678901");
        let stored = store.password_hash(user.id).unwrap();
        assert_ne!(stored, "abcdef");
        assert!(PasswordHashing::for_tests().verify("abcdef", &stored).unwrap());

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn duplicate_email_or_cpf_conflicts() {
        let (service, _) = service();
        service.create(ana()).await.unwrap();

        let same_cpf = NewUser {
            email: "other@x.com".into(),
            ..ana()
        };
        match service.create(same_cpf).await {
            Err(AppError::Conflict(msg)) => assert!(msg.contains("CPF")),
            other => panic!("expected conflict, got {other:?}"),
        }

        let same_email = NewUser {
            cpf: "99999999999".into(),
            ..ana()
        };
        match service.create(same_email).await {
            Err(AppError::Conflict(msg)) => assert!(msg.contains("Email")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_without_password_keeps_hash() {
        let (service, store) = service();
        let user = service.create(ana()).await.unwrap();
        let before = store.password_hash(user.id).unwrap();

        let updated = service
            .update(
                user.id,
                UserPatch {
                    name: Some("Ana Souza".into()),
                    password: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Ana Souza");
        assert_eq!(updated.email, "ana@x.com");
        assert_eq!(store.password_hash(user.id).unwrap(), before);
        assert!(updated.updated_at >= user.updated_at);
    }

    #[tokio::test]
    async fn update_with_password_rehashes() {
        let (service, store) = service();
        let user = service.create(ana()).await.unwrap();
        let before = store.password_hash(user.id).unwrap();

        service
            .update(
                user.id,
                UserPatch {
                    password: Some("new-secret".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let after = store.password_hash(user.id).unwrap();
        assert_ne!(after, before);
        assert!(PasswordHashing::for_tests().verify("new-secret", &after).unwrap());
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (service, _) = service();
        let err = service.update(404, UserPatch::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_to_taken_cpf_conflicts() {
        let (service, _) = service();
        service.create(ana()).await.unwrap();
        let other = service.create(new_user(2)).await.unwrap();

        let err = service
            .update(
                other.id,
                UserPatch {
                    cpf: Some("12345678901".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_may_keep_own_email() {
        let (service, _) = service();
        let user = service.create(ana()).await.unwrap();
        let updated = service
            .update(
                user.id,
                UserPatch {
                    email: Some("ana@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "ana@x.com");
    }

    #[tokio::test]
    async fn list_paginates_newest_first() {
        let (service, _) = service();
        seed(&service, 12).await;

        let page = service.list(PageRequest::new(Some(1), Some(5))).await.unwrap();
        assert_eq!(
            page.meta,
            PageMeta {
                total: 12,
                per_page: 5,
                current_page: 1,
                last_page: 3,
                from: 1,
                to: 5,
            }
        );
        assert_eq!(page.data.len(), 5);
        assert_eq!(page.data[0].name, "User 12");

        let last = service.list(PageRequest::new(Some(3), Some(5))).await.unwrap();
        assert_eq!(last.data.len(), 2);
        assert_eq!((last.meta.from, last.meta.to), (11, 12));
        assert_eq!(last.data[1].name, "User 1");
    }

    #[tokio::test]
    async fn list_on_empty_store() {
        let (service, _) = service();
        let page = service.list(PageRequest::default()).await.unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.meta.total, 0);
        assert_eq!(page.meta.last_page, 0);
    }

    #[tokio::test]
    async fn search_filters_case_insensitively() {
        let (service, _) = service();
        seed(&service, 6).await;
        service.create(ana()).await.unwrap();

        let page = service.search("SILVA", PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.data[0].email, "ana@x.com");

        let by_cpf = service.search("345678", PageRequest::default()).await.unwrap();
        assert_eq!(by_cpf.meta.total, 1);

        let by_email = service
            .search("example.com", PageRequest::new(Some(1), Some(5)))
            .await
            .unwrap();
        assert_eq!(by_email.meta.total, 6);
        assert_eq!(by_email.meta.last_page, 2);
        assert!(by_email
            .data
            .iter()
            .all(|u| u.email.contains("example.com")));
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let (service, _) = service();
        seed(&service, 3).await;
        let page = service.search("%", PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 0);
    }

    #[tokio::test]
    async fn search_ignores_nul_characters() {
        let (service, _) = service();
        seed(&service, 3).await;
        service.create(ana()).await.unwrap();

        let page = service.search("SIL\0VA", PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 1);

        let page = service.search("\0", PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 4);
    }

    #[tokio::test]
    async fn blank_search_lists_everything() {
        let (service, _) = service();
        seed(&service, 3).await;
        let page = service.search("  ", PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total, 3);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (service, _) = service();
        let user = service.create(ana()).await.unwrap();

        service.delete(user.id).await.unwrap();
        assert!(matches!(
            service.get_by_id(user.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(user.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
