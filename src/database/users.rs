use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::{
    auth::{DbUser, DbUserSession, Role, User, UserSession, generate_unique_id},
    error::AppError,
    models::{DbStudentSummary, StudentSummary},
};

const USER_COLUMNS: &str =
    "id, email, role, name, unique_id, age, phone, location, total_points";

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub name: &'a str,
    pub age: Option<i64>,
    pub phone: Option<&'a str>,
    pub location: Option<&'a str>,
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn get_user_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<User, AppError> {
    info!("Getting user by email");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(db_user) => Ok(User::from(db_user)),
        _ => Err(AppError::NotFound(format!(
            "User with email {} not found in database",
            email
        ))),
    }
}

#[instrument(skip_all, fields(email = %email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let email = email.trim().to_lowercase();
    let hash: Option<(String,)> = sqlx::query_as("SELECT password FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    let Some((hash,)) = hash else {
        return Ok(None);
    };

    match bcrypt::verify(password, &hash) {
        Ok(true) => Ok(Some(get_user_by_email(pool, &email).await?)),
        Ok(false) => Ok(None),
        Err(e) => {
            warn!(error = %e, "Stored password hash could not be verified");
            Ok(None)
        }
    }
}

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn verify_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    password: &str,
) -> Result<bool, AppError> {
    info!("Verifying user password");
    let (hash,): (String,) = sqlx::query_as("SELECT password FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

    Ok(bcrypt::verify(password, &hash).unwrap_or(false))
}

#[instrument(skip_all, fields(email = %new_user.email, role = %new_user.role))]
pub async fn create_user(pool: &Pool<Sqlite>, new_user: NewUser<'_>) -> Result<i64, AppError> {
    info!("Creating new user");

    let email = new_user.email.trim().to_lowercase();

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "A user with email '{}' already exists",
            email
        )));
    }

    let hashed_password = bcrypt::hash(new_user.password, bcrypt::DEFAULT_COST)?;
    let unique_id = unused_unique_id(pool).await?;

    let res = sqlx::query(
        "INSERT INTO users (email, password, role, name, unique_id, age, phone, location)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&email)
    .bind(hashed_password)
    .bind(new_user.role.as_str())
    .bind(new_user.name.trim())
    .bind(&unique_id)
    .bind(new_user.age)
    .bind(new_user.phone)
    .bind(new_user.location)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

async fn unused_unique_id(pool: &Pool<Sqlite>) -> Result<String, AppError> {
    for _ in 0..10 {
        let candidate = generate_unique_id();
        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE unique_id = ?")
            .bind(&candidate)
            .fetch_optional(pool)
            .await?;
        if taken.is_none() {
            return Ok(candidate);
        }
    }

    Err(AppError::Internal(
        "Could not generate an unused student code".to_string(),
    ))
}

#[instrument]
pub async fn update_user_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    name: &str,
    age: Option<i64>,
    phone: Option<&str>,
    location: Option<&str>,
) -> Result<(), AppError> {
    info!("Updating user profile");
    let result = sqlx::query(
        "UPDATE users SET name = ?, age = ?, phone = ?, location = ? WHERE id = ?",
    )
    .bind(name.trim())
    .bind(age)
    .bind(phone)
    .bind(location)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
    }

    Ok(())
}

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn list_students(pool: &Pool<Sqlite>) -> Result<Vec<StudentSummary>, AppError> {
    info!("Listing students");
    let rows = sqlx::query_as::<_, DbStudentSummary>(
        "SELECT id, name, email, unique_id, phone, total_points
         FROM users WHERE role = 'student' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentSummary::from).collect())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT user_id, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
