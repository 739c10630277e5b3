use serde::{de, Deserialize, Deserializer};

/// Request body for creating a user. Every field is required; they are
/// optional here so missing ones are reported per field instead of as a
/// body parse failure.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
}

/// Request body for updating a user. Omitted fields keep their value; an
/// empty password keeps the current one.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
}

/// `?page=&search=` is what the list page sends before any input, so an
/// empty number reads as absent.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub per_page: Option<i64>,
    pub search: Option<String>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(n) => n.parse().map(Some).map_err(de::Error::custom),
    }
}

impl ListUsersQuery {
    /// The search term, if it has any non-blank content.
    pub fn term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
