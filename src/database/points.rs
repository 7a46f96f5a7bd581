use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::BTreeMap;
use tracing::{info, instrument};

use super::groups::{fetch_group, is_member};
use crate::{
    error::AppError,
    leaderboard::{self, GlobalLeaderboard, GroupRank, GroupRef, LeaderboardEntry, Standing},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsAward {
    pub group_points: i64,
    pub total_points: i64,
}

async fn group_standings(
    conn: &mut SqliteConnection,
    group_id: i64,
) -> Result<Vec<Standing>, AppError> {
    let rows = sqlx::query_as::<_, Standing>(
        "SELECT u.id AS student_id, u.name, COALESCE(u.unique_id, '') AS unique_id,
                COALESCE(p.points, 0) AS points
         FROM course_group_students m
         JOIN users u ON u.id = m.student_id
         LEFT JOIN student_group_points p ON p.group_id = m.group_id AND p.student_id = m.student_id
         WHERE m.group_id = ?
         ORDER BY m.added_at, u.id",
    )
    .bind(group_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows)
}

/// Adds `points` to the student's score in the group and to their overall
/// total. Neither figure drops below zero.
#[instrument]
pub async fn award_group_points(
    pool: &Pool<Sqlite>,
    group_id: i64,
    student_id: i64,
    points: i64,
) -> Result<PointsAward, AppError> {
    info!("Awarding group points");
    let mut tx = pool.begin().await?;

    fetch_group(&mut tx, group_id).await?;
    if !is_member(&mut tx, group_id, student_id).await? {
        return Err(AppError::NotFound(
            "Student is not a member of this group".to_string(),
        ));
    }

    let current: Option<(i64,)> = sqlx::query_as(
        "SELECT points FROM student_group_points WHERE group_id = ? AND student_id = ?",
    )
    .bind(group_id)
    .bind(student_id)
    .fetch_optional(&mut *tx)
    .await?;
    let current = current.map(|(p,)| p).unwrap_or(0);
    let group_points = (current + points).max(0);
    let delta = group_points - current;

    sqlx::query(
        "INSERT INTO student_group_points (group_id, student_id, points) VALUES (?, ?, ?)
         ON CONFLICT(group_id, student_id) DO UPDATE SET points = excluded.points",
    )
    .bind(group_id)
    .bind(student_id)
    .bind(group_points)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET total_points = MAX(total_points + ?, 0) WHERE id = ?")
        .bind(delta)
        .bind(student_id)
        .execute(&mut *tx)
        .await?;

    let (total_points,): (i64,) = sqlx::query_as("SELECT total_points FROM users WHERE id = ?")
        .bind(student_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(PointsAward {
        group_points,
        total_points,
    })
}

#[instrument]
pub async fn group_leaderboard(
    pool: &Pool<Sqlite>,
    group_id: i64,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    info!("Building group leaderboard");
    let mut conn = pool.acquire().await?;
    fetch_group(&mut conn, group_id).await?;
    let standings = group_standings(&mut conn, group_id).await?;
    Ok(leaderboard::rank(standings))
}

#[instrument]
pub async fn global_leaderboard(
    pool: &Pool<Sqlite>,
    top_n: usize,
    requester: Option<i64>,
) -> Result<GlobalLeaderboard, AppError> {
    info!("Building global leaderboard");
    let standings = sqlx::query_as::<_, Standing>(
        "SELECT id AS student_id, name, COALESCE(unique_id, '') AS unique_id, total_points AS points
         FROM users
         WHERE role = 'student'
         ORDER BY total_points DESC, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(leaderboard::global(standings, top_n, requester))
}

#[instrument]
pub async fn student_group_ranks(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<BTreeMap<i64, GroupRank>, AppError> {
    info!("Collecting student group ranks");
    let mut conn = pool.acquire().await?;

    let groups: Vec<(i64, String, i64, String)> = sqlx::query_as(
        "SELECT g.id, g.title, g.course_id, c.title
         FROM course_group_students m
         JOIN course_groups g ON g.id = m.group_id
         JOIN courses c ON c.id = g.course_id
         WHERE m.student_id = ?
         ORDER BY m.added_at, g.id",
    )
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut ranks = Vec::with_capacity(groups.len());
    for (group_id, group_title, course_id, course_title) in groups {
        let standings = group_standings(&mut conn, group_id).await?;
        let group = GroupRef {
            group_id,
            group_title,
            course_id,
            course_title,
        };
        if let Some(rank) = leaderboard::group_rank(group, standings, student_id) {
            ranks.push(rank);
        }
    }

    Ok(leaderboard::ranks_by_course(ranks))
}
