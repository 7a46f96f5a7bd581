use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::{Instrument, error, info, info_span, warn};

use crate::database::{get_session_by_token, get_user};

use super::User;

pub const SESSION_COOKIE: &str = "session_token";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authenticate(request)
            .instrument(info_span!("user_auth_guard"))
            .await
    }
}

async fn authenticate(request: &Request<'_>) -> Outcome<User, ()> {
    let Some(token) = request
        .cookies()
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string())
    else {
        return Outcome::Error((Status::Unauthorized, ()));
    };

    let Some(db) = request.rocket().state::<SqlitePool>() else {
        error!("Database pool not found in managed state");
        return Outcome::Error((Status::InternalServerError, ()));
    };

    match get_session_by_token(db, &token).await {
        Ok(session) => {
            if !session.is_valid() {
                warn!(user_id = %session.user_id, "Session token expired");
                return Outcome::Error((Status::Unauthorized, ()));
            }

            match get_user(db, session.user_id).await {
                Ok(user) => {
                    info!(email = %user.email, role = %user.role.as_str(), "User authenticated via session token");
                    Outcome::Success(user)
                }
                Err(err) => {
                    error!(user_id = %session.user_id, error = ?err, "Failed to fetch user for valid session");
                    Outcome::Error((Status::Unauthorized, ()))
                }
            }
        }
        Err(err) => {
            warn!(error = ?err, "Invalid session token");
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    warn!("Unauthorized API access attempt");
    Custom(
        Status::Unauthorized,
        Json(json!({
            "error": "Unauthorized",
            "message": "Authentication required"
        })),
    )
}
