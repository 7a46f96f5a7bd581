#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod certificate;
mod database;
mod env;
mod error;
mod leaderboard;
mod ledger;
mod models;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::*;
use auth::unauthorized_api;
use database::clean_expired_sessions;
use env::{AppConfig, load_environment};
use error::AppError;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment().map_err(|e| anyhow::anyhow!("Failed to load environment: {}", e))?;
    let config = AppConfig::from_env()?;
    let _otel_guard = init_tracing(&config)?;

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    info!("Running database migrations...");
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        error!("Failed to run migrations: {}", e);
        return Err(AppError::from(e).into());
    }
    info!("Migrations completed successfully");

    spawn_session_cleanup(pool.clone(), config.session_cleanup_interval_secs);

    init_rocket(pool, config).await.launch().await?;
    Ok(())
}

fn spawn_session_cleanup(pool: SqlitePool, interval_secs: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(Duration::from_secs(interval_secs.max(1))).await;
        }
    });
}

pub async fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!(environment = %config.deployment_environment, "Starting coding academy");

    rocket::build()
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_signup,
                api_register_user,
                api_me,
                api_update_profile,
                api_change_password,
                api_list_students,
                api_create_course,
                api_list_courses,
                api_list_my_courses,
                api_course_detail,
                api_create_session,
                api_update_session,
                api_set_session_flags,
                api_delete_session,
                api_student_course_sessions,
                api_complete_session,
                api_enroll_student,
                api_remove_enrollment,
                api_set_enrollment_pacing,
                api_my_courses,
                api_student_subscription,
                api_my_subscription,
                api_create_subscription,
                api_adjust_sessions,
                api_refill_sessions,
                api_consume_session,
                api_reconcile_subscription,
                api_low_session_alerts,
                api_create_group,
                api_list_groups,
                api_group_detail,
                api_search_group_candidates,
                api_add_group_student,
                api_remove_group_student,
                api_award_points,
                api_group_leaderboard,
                api_global_leaderboard,
                api_my_group_ranks,
                api_list_notifications,
                api_mark_notification_read,
                api_mark_all_notifications_read,
                api_issue_certificate,
                api_list_certificates,
                api_my_certificates,
                api_set_certificate_visibility,
                api_download_certificate,
                api_student_dashboard,
                api_admin_dashboard,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
