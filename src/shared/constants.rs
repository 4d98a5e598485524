/// Audit entries shown on the dashboard
pub const DASHBOARD_AUDIT_LIMIT: i64 = 10;

/// Extra body allowance for multipart boundaries and the other form fields
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Neutral reply to every forgot-password request
pub const PASSWORD_RESET_MESSAGE: &str =
    "If an account exists for that email, password reset instructions have been sent.";
