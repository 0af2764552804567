use super::error::{ApiErrorCode, FieldError};
use super::handler::{ListQuery, LoginRequest, RegisterRequest, UpdateFileRequest};
use crate::application_port::{LoginInput, RegisterInput};
use crate::domain_model::*;

const NAME_LEN: std::ops::RangeInclusive<usize> = 2..=50;
const SEARCH_LEN: std::ops::RangeInclusive<usize> = 1..=100;
const FILENAME_LEN: std::ops::RangeInclusive<usize> = 1..=255;
const MIN_PASSWORD_LEN: usize = 8;

fn fail(errors: Vec<FieldError>) -> Result<(), ApiErrorCode> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiErrorCode::validation("Validation failed", errors))
    }
}

/// Same shape as `\S+@\S+\.\S+`.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    email.match_indices('@').any(|(at, _)| {
        let domain = &email[at + 1..];
        at > 0
            && domain
                .match_indices('.')
                .any(|(dot, _)| dot > 0 && dot + 1 < domain.len())
    })
}

pub fn password_problem(password: &str) -> Option<&'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 8 characters long");
    }
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if !(lower && upper && digit) {
        return Some(
            "Password must contain at least one uppercase letter, one lowercase letter, and one number",
        );
    }
    None
}

fn check_name(field: &'static str, label: &str, value: &str, errors: &mut Vec<FieldError>) {
    if !NAME_LEN.contains(&value.trim().chars().count()) {
        errors.push(FieldError::new(
            field,
            format!("{label} must be between 2 and 50 characters"),
        ));
    }
}

pub fn validate_register(req: RegisterRequest) -> Result<RegisterInput, ApiErrorCode> {
    let mut errors = Vec::new();
    if !is_valid_email(req.email.trim()) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if let Some(problem) = password_problem(&req.password) {
        errors.push(FieldError::new("password", problem));
    }
    check_name("firstName", "First name", &req.first_name, &mut errors);
    check_name("lastName", "Last name", &req.last_name, &mut errors);
    fail(errors)?;

    Ok(RegisterInput {
        email: normalize_email(&req.email),
        password: req.password,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
    })
}

pub fn validate_login(req: LoginRequest) -> Result<LoginInput, ApiErrorCode> {
    let mut errors = Vec::new();
    if !is_valid_email(req.email.trim()) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if req.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    fail(errors)?;

    Ok(LoginInput {
        email: normalize_email(&req.email),
        password: req.password,
    })
}

pub fn validate_page(query: &ListQuery) -> Result<PageRequest, ApiErrorCode> {
    let mut errors = Vec::new();
    let mut page = PageRequest::default();

    if let Some(raw) = &query.page {
        match raw.trim().parse::<u32>() {
            Ok(n) if n >= 1 => page.page = n,
            _ => errors.push(FieldError::new("page", "Page must be a positive integer")),
        }
    }
    if let Some(raw) = &query.limit {
        match raw.trim().parse::<u32>() {
            Ok(n) if (1..=PageRequest::MAX_LIMIT).contains(&n) => page.limit = n,
            _ => errors.push(FieldError::new("limit", "Limit must be between 1 and 100")),
        }
    }
    if let Some(raw) = &query.sort_by {
        match raw.as_str() {
            "uploadDate" => page.sort_by = SortField::UploadDate,
            "originalName" => page.sort_by = SortField::OriginalName,
            "size" => page.sort_by = SortField::Size,
            _ => errors.push(FieldError::new("sortBy", "Invalid sort field")),
        }
    }
    if let Some(raw) = &query.sort_order {
        match raw.as_str() {
            "asc" => page.order = SortOrder::Asc,
            "desc" => page.order = SortOrder::Desc,
            _ => errors.push(FieldError::new(
                "sortOrder",
                "Sort order must be either asc or desc",
            )),
        }
    }
    fail(errors)?;
    Ok(page)
}

pub fn validate_search_term(term: Option<&str>) -> Result<String, ApiErrorCode> {
    let term = term.map(str::trim).unwrap_or_default();
    if !SEARCH_LEN.contains(&term.chars().count()) {
        return Err(ApiErrorCode::validation(
            "Search term is required",
            vec![FieldError::new(
                "searchTerm",
                "Search term must be between 1 and 100 characters",
            )],
        ));
    }
    Ok(term.to_string())
}

pub fn validate_duration(raw: Option<&str>) -> Result<Option<f64>, ApiErrorCode> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(d) if d.is_finite() && d >= 0.0 => Ok(Some(d)),
        _ => Err(ApiErrorCode::validation(
            "Validation failed",
            vec![FieldError::new(
                "duration",
                "Duration must be a non-negative number",
            )],
        )),
    }
}

pub fn validate_update(req: UpdateFileRequest) -> Result<MediaUpdate, ApiErrorCode> {
    let mut errors = Vec::new();
    let original_name = req.original_name.map(|n| n.trim().to_string());
    if let Some(name) = &original_name {
        if !FILENAME_LEN.contains(&name.chars().count()) || name.contains(['/', '\\']) {
            errors.push(FieldError::new(
                "originalName",
                "File name must be 1 to 255 characters without path separators",
            ));
        }
    }
    if let Some(d) = req.duration {
        if !d.is_finite() || d < 0.0 {
            errors.push(FieldError::new(
                "duration",
                "Duration must be a non-negative number",
            ));
        }
    }
    fail(errors)?;
    Ok(MediaUpdate {
        original_name,
        duration_secs: req.duration,
    })
}
