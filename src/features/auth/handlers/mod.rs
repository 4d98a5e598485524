pub mod auth_handler;

pub use auth_handler::{
    __path_forgot_password, __path_get_me, __path_login, __path_logout, __path_register,
    forgot_password, forgot_password_page, get_me, login, login_page, logout, register,
    register_page,
};
