use rocket::State;
use rocket::serde::json::Json;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;

use crate::auth::{Permission, User};
use crate::database::{global_leaderboard, student_group_ranks};
use crate::leaderboard::{GlobalLeaderboard, GroupRank};
use crate::validation::{ApiError, AppErrorExt, PermissionCheckExt};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const MAX_LEADERBOARD_SIZE: usize = 100;

#[get("/leaderboard?<limit>")]
pub async fn api_global_leaderboard(
    limit: Option<usize>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<GlobalLeaderboard>, ApiError> {
    let top_n = limit
        .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
        .clamp(1, MAX_LEADERBOARD_SIZE);
    let requester = (!user.is_admin()).then_some(user.id);

    Ok(Json(
        global_leaderboard(db, top_n, requester)
            .await
            .validate_custom()?,
    ))
}

#[get("/my/group-ranks")]
pub async fn api_my_group_ranks(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BTreeMap<i64, GroupRank>>, ApiError> {
    user.require_permission(Permission::ViewOwnCourses)
        .validate_custom()?;
    Ok(Json(student_group_ranks(db, user.id).await.validate_custom()?))
}
