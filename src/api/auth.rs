use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{Permission, Role, SESSION_COOKIE, User, UserSession};
use crate::database::{
    NewUser, authenticate_user, create_user, create_user_session, get_user, invalidate_session,
    list_students, update_user_password, update_user_profile, verify_user_password,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::StudentSummary;
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt};

const ROLE_COOKIE: &str = "user_role";

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub unique_id: String,
    pub age: Option<i64>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub total_points: i64,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role.to_string(),
            email: user.email,
            name: user.name,
            unique_id: user.unique_id,
            age: user.age,
            phone: user.phone,
            location: user.location,
            total_points: user.total_points,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    name: String,
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
    #[validate(range(min = 1, message = "Age must be a positive number"))]
    age: Option<i64>,
    phone: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    name: String,
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    password: String,
    role: String,
    #[validate(range(min = 1, message = "Age must be a positive number"))]
    age: Option<i64>,
    phone: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    name: String,
    #[validate(range(min = 1, message = "Age must be a positive number"))]
    age: Option<i64>,
    phone: Option<String>,
    location: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct ChangePasswordRequest {
    current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    new_password: String,
}

fn session_cookie(name: &'static str, value: String, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .same_site(SameSite::Lax)
        .http_only(true)
        .max_age(rocket::time::Duration::hours(ttl_hours))
        .build()
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.email, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            info!(user_id = user.id, "Login succeeded");
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(config.session_ttl_hours);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            cookies.add_private(session_cookie(SESSION_COOKIE, token, config.session_ttl_hours));
            cookies.add_private(session_cookie(
                ROLE_COOKIE,
                user.role.to_string(),
                config.session_ttl_hours,
            ));

            let redirect_url = match user.role {
                Role::Student => "/dashboard",
                Role::Admin => "/admin",
            };

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
                redirect_url: Some(redirect_url.to_string()),
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid email or password".to_string()),
            redirect_url: None,
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, ApiError> {
    if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
        invalidate_session(db, cookie.value()).await.validate_custom()?;
    }

    cookies.remove_private(Cookie::from(SESSION_COOKIE));
    cookies.remove_private(Cookie::from(ROLE_COOKIE));

    Ok(Json(LoginResponse {
        success: true,
        user: None,
        error: None,
        redirect_url: Some("/login".to_string()),
    }))
}

#[post("/signup", data = "<signup>")]
pub async fn api_signup(
    signup: Json<SignupRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, ApiError> {
    let req = signup.validate_custom()?;

    let user_id = create_user(
        db,
        NewUser {
            email: &req.email,
            password: &req.password,
            role: Role::Student,
            name: &req.name,
            age: req.age,
            phone: req.phone.as_deref(),
            location: req.location.as_deref(),
        },
    )
    .await
    .validate_custom()?;

    let user = get_user(db, user_id).await.validate_custom()?;
    Ok(Json(UserData::from(user)))
}

#[post("/users", data = "<request>")]
pub async fn api_register_user(
    user: User,
    request: Json<RegisterUserRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, ApiError> {
    user.require_permission(Permission::RegisterUsers)
        .validate_custom()?;

    let req = request.validate_custom()?;
    let role = Role::from_str(&req.role)
        .map_err(|e| AppError::Validation(e.to_string()))
        .validate_custom()?;

    let user_id = create_user(
        db,
        NewUser {
            email: &req.email,
            password: &req.password,
            role,
            name: &req.name,
            age: req.age,
            phone: req.phone.as_deref(),
            location: req.location.as_deref(),
        },
    )
    .await
    .validate_custom()?;

    let created = get_user(db, user_id).await.validate_custom()?;
    Ok(Json(UserData::from(created)))
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[put("/me", data = "<request>")]
pub async fn api_update_profile(
    user: User,
    request: Json<UpdateProfileRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UserData>, ApiError> {
    user.require_permission(Permission::EditOwnProfile)
        .validate_custom()?;
    let req = request.validate_custom()?;

    update_user_profile(
        db,
        user.id,
        &req.name,
        req.age,
        req.phone.as_deref(),
        req.location.as_deref(),
    )
    .await
    .validate_custom()?;

    let updated = get_user(db, user.id).await.validate_custom()?;
    Ok(Json(UserData::from(updated)))
}

#[put("/me/password", data = "<request>")]
pub async fn api_change_password(
    user: User,
    request: Json<ChangePasswordRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let req = request.validate_custom()?;

    let valid = verify_user_password(db, user.id, &req.current_password)
        .await
        .validate_custom()?;
    if !valid {
        return Err(AppError::Validation("Current password is incorrect".to_string()))
            .validate_custom();
    }

    update_user_password(db, user.id, &req.new_password)
        .await
        .validate_custom()?;

    Ok(Json(LoginResponse {
        success: true,
        user: Some(UserData::from(user)),
        error: None,
        redirect_url: None,
    }))
}

#[get("/students")]
pub async fn api_list_students(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentSummary>>, ApiError> {
    user.require_permission(Permission::ViewAllStudents)
        .validate_custom()?;
    let students = list_students(db).await.validate_custom()?;
    Ok(Json(students))
}
