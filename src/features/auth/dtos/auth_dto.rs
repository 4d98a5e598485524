use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Registration form
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterForm {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords must match"))]
    pub confirm_password: String,
}

/// Login form
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Local path to return to after logging in
    #[serde(default)]
    pub next: Option<String>,
}

/// Forgot-password form
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// `?next=` on the login page
#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Normalize an email for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Only same-site absolute paths are followed after login.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .map(str::to_string)
}

/// Flatten validator errors into human-readable messages, sorted by field
pub fn validation_messages(errors: &validator::ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", field))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_form() -> RegisterForm {
        RegisterForm {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "analytical".to_string(),
            confirm_password: "analytical".to_string(),
        }
    }

    #[test]
    fn test_valid_register_form() {
        assert!(register_form().validate().is_ok());
    }

    #[test]
    fn test_register_form_rules() {
        let mut form = register_form();
        form.name = "A".to_string();
        form.password = "short".to_string();
        form.confirm_password = "other".to_string();

        let errors = form.validate().unwrap_err();
        let messages = validation_messages(&errors);
        assert!(messages.contains(&"Name must be 2-100 characters".to_string()));
        assert!(messages.contains(&"Password must be at least 6 characters".to_string()));
        assert!(messages.contains(&"Passwords must match".to_string()));
    }

    #[test]
    fn test_login_form_requires_email() {
        let form = LoginForm {
            email: "not-an-email".to_string(),
            password: "x".to_string(),
            next: None,
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/results/3")).as_deref(), Some("/results/3"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil")), None);
        assert_eq!(safe_next(None), None);
    }
}
