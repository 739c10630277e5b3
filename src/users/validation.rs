use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};

use crate::error::FieldErrors;
use crate::users::dto::{CreateUserRequest, UpdateUserRequest};
use crate::users::services::{NewUser, UserPatch};

const MAX_TEXT_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Strips the punctuation people type in CPFs and phone numbers.
/// Returns `None` if anything other than digits remains.
fn digits_only(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '0'..='9' => out.push(c),
            '.' | '-' | '(' | ')' | '/' | ' ' => {}
            _ => return None,
        }
    }
    Some(out)
}

fn check_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("The name field is required.".into());
    }
    if name.chars().count() > MAX_TEXT_LEN {
        return Err(format!("The name may not be greater than {MAX_TEXT_LEN} characters."));
    }
    Ok(name.to_string())
}

fn check_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err("The email field is required.".into());
    }
    if email.chars().count() > MAX_TEXT_LEN {
        return Err(format!("The email may not be greater than {MAX_TEXT_LEN} characters."));
    }
    if !is_valid_email(&email) {
        return Err("The email must be a valid email address.".into());
    }
    Ok(email)
}

fn check_password(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("The password field is required.".into());
    }
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "The password must be at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    Ok(raw.to_string())
}

fn check_cpf(raw: &str) -> Result<String, String> {
    if raw.trim().is_empty() {
        return Err("The CPF field is required.".into());
    }
    let cpf = digits_only(raw).ok_or("The CPF must contain only digits.")?;
    if cpf.len() != 11 {
        return Err("The CPF must contain exactly 11 digits.".into());
    }
    Ok(cpf)
}

fn check_phone(raw: &str) -> Result<String, String> {
    if raw.trim().is_empty() {
        return Err("The phone field is required.".into());
    }
    let phone = digits_only(raw).ok_or("The phone must contain only digits.")?;
    if !(10..=11).contains(&phone.len()) {
        return Err("The phone must have 10 or 11 digits.".into());
    }
    Ok(phone)
}

fn check_birth_date(raw: &str, today: Date) -> Result<Date, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("The birth date field is required.".into());
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| "The birth date must be a valid date (YYYY-MM-DD).".to_string())?;
    if date > today {
        return Err("The birth date cannot be in the future.".into());
    }
    Ok(date)
}

#[derive(Default)]
struct Checker {
    errors: FieldErrors,
}

impl Checker {
    fn check<T>(
        &mut self,
        field: &'static str,
        raw: &str,
        f: impl FnOnce(&str) -> Result<T, String>,
    ) -> Option<T> {
        // Postgres text columns cannot store NUL
        if raw.contains('\0') {
            self.errors.add(field, "The field contains an invalid character.");
            return None;
        }
        match f(raw) {
            Ok(v) => Some(v),
            Err(msg) => {
                self.errors.add(field, msg);
                None
            }
        }
    }

    /// A missing value is checked as empty, which yields the field's
    /// "required" message.
    fn required<T>(
        &mut self,
        field: &'static str,
        value: Option<String>,
        f: impl FnOnce(&str) -> Result<T, String>,
    ) -> Option<T> {
        self.check(field, value.as_deref().unwrap_or(""), f)
    }

    fn optional<T>(
        &mut self,
        field: &'static str,
        value: Option<String>,
        f: impl FnOnce(&str) -> Result<T, String>,
    ) -> Option<T> {
        value.and_then(|v| self.check(field, &v, f))
    }
}

pub fn validate_create(req: CreateUserRequest, today: Date) -> Result<NewUser, FieldErrors> {
    let mut c = Checker::default();
    let name = c.required("name", req.name, check_name);
    let email = c.required("email", req.email, check_email);
    let password = c.required("password", req.password, check_password);
    let cpf = c.required("cpf", req.cpf, check_cpf);
    let phone = c.required("phone", req.phone, check_phone);
    let birth_date = c.required("birth_date", req.birth_date, |raw| {
        check_birth_date(raw, today)
    });

    match (name, email, password, cpf, phone, birth_date) {
        (Some(name), Some(email), Some(password), Some(cpf), Some(phone), Some(birth_date))
            if c.errors.is_empty() =>
        {
            Ok(NewUser {
                name,
                email,
                password,
                cpf,
                phone,
                birth_date,
            })
        }
        _ => Err(c.errors),
    }
}

pub fn validate_update(req: UpdateUserRequest, today: Date) -> Result<UserPatch, FieldErrors> {
    let mut c = Checker::default();
    let patch = UserPatch {
        name: c.optional("name", req.name, check_name),
        email: c.optional("email", req.email, check_email),
        // blank keeps the stored password
        password: c.optional(
            "password",
            req.password.filter(|p| !p.is_empty()),
            check_password,
        ),
        cpf: c.optional("cpf", req.cpf, check_cpf),
        phone: c.optional("phone", req.phone, check_phone),
        birth_date: c.optional("birth_date", req.birth_date, |raw| {
            check_birth_date(raw, today)
        }),
    };

    if c.errors.is_empty() {
        Ok(patch)
    } else {
        Err(c.errors)
    }
}
