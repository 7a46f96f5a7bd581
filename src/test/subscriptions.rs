#[cfg(test)]
mod tests {
    use crate::database::{
        adjust_sessions, consume_session, create_global_subscription, enroll_student,
        get_global_subscription, list_notifications, list_student_courses, low_session_alerts,
        reconcile_subscription, refill_sessions,
    };
    use crate::error::AppError;
    use crate::ledger::{Adjustment, SubscriptionStatus};
    use crate::test::test_db::{TestDb, TestDbBuilder};

    async fn academy() -> TestDb {
        TestDbBuilder::new()
            .admin("admin@academy.test", "Admin User")
            .student("lina@academy.test", "Lina Haddad")
            .student("omar@academy.test", "Omar Saleh")
            .course("Python Basics", None, &["Variables", "Loops"])
            .course("Web Basics", None, &["HTML"])
            .build()
            .await
            .expect("Failed to build test database")
    }

    async fn subscription_rows(test_db: &TestDb, student_id: i64) -> Vec<(i64, i64)> {
        sqlx::query_as(
            "SELECT s.total_sessions, s.remaining_sessions
             FROM student_course_subscription s
             JOIN student_courses sc ON sc.id = s.student_course_id
             WHERE sc.student_id = ?",
        )
        .bind(student_id)
        .fetch_all(&test_db.pool)
        .await
        .expect("Failed to read subscription rows")
    }

    #[rocket::async_test]
    async fn test_create_subscription_auto_enrolls() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();

        let summary = create_global_subscription(&test_db.pool, lina, 2, admin)
            .await
            .expect("Failed to create subscription");

        assert_eq!(summary.total_sessions, 8);
        assert_eq!(summary.remaining_sessions, 8);
        assert_eq!(summary.status, SubscriptionStatus::Active);

        let courses = list_student_courses(&test_db.pool, lina).await.unwrap();
        assert_eq!(courses.courses.len(), 1);
        assert_eq!(
            courses.courses[0].course_id,
            test_db.course_id("Python Basics").unwrap()
        );

        let feed = list_notifications(&test_db.pool, lina, None).await.unwrap();
        assert_eq!(feed.unread_count, 1);
        assert_eq!(feed.notifications[0].title, "Subscription Created");
        assert_eq!(
            feed.notifications[0].message,
            "A new 2-month subscription with 8 sessions has been created for you."
        );
    }

    #[rocket::async_test]
    async fn test_second_subscription_conflicts() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();

        create_global_subscription(&test_db.pool, lina, 1, admin)
            .await
            .unwrap();
        let result = create_global_subscription(&test_db.pool, lina, 3, admin).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let plan = create_global_subscription(&test_db.pool, lina, 0, admin).await;
        assert!(matches!(plan, Err(AppError::Validation(_))));
    }

    #[rocket::async_test]
    async fn test_subscription_requires_a_course() {
        let test_db = TestDbBuilder::new()
            .admin("admin@academy.test", "Admin User")
            .student("lina@academy.test", "Lina Haddad")
            .build()
            .await
            .unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();

        let result =
            create_global_subscription(&test_db.pool, lina, 1, test_db.admin_id.unwrap()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[rocket::async_test]
    async fn test_balance_is_mirrored_across_enrollments() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let unique_id = test_db.unique_id("lina@academy.test").await.unwrap();

        create_global_subscription(&test_db.pool, lina, 1, admin)
            .await
            .unwrap();
        enroll_student(
            &test_db.pool,
            &unique_id,
            test_db.course_id("Web Basics").unwrap(),
            admin,
        )
        .await
        .unwrap();

        let rows = subscription_rows(&test_db, lina).await;
        assert_eq!(rows, vec![(4, 4), (4, 4)]);

        consume_session(&test_db.pool, lina).await.unwrap();
        adjust_sessions(&test_db.pool, lina, Adjustment::Add, 3, Some("Saturday Juniors"))
            .await
            .unwrap();

        let rows = subscription_rows(&test_db, lina).await;
        assert_eq!(rows, vec![(7, 6), (7, 6)]);

        let summary = get_global_subscription(&test_db.pool, lina)
            .await
            .unwrap()
            .expect("subscription should exist");
        assert_eq!(summary.plan_duration_months, 2);

        let feed = list_notifications(&test_db.pool, lina, None).await.unwrap();
        assert_eq!(
            feed.notifications[0].message,
            "3 sessions added to your subscription for group Saturday Juniors. You now have 6 sessions remaining."
        );
    }

    #[rocket::async_test]
    async fn test_exhausted_subscription_hides_courses() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();

        create_global_subscription(&test_db.pool, lina, 1, admin)
            .await
            .unwrap();
        let summary = adjust_sessions(&test_db.pool, lina, Adjustment::Remove, 10, None)
            .await
            .unwrap();
        assert_eq!(summary.remaining_sessions, 0);
        assert_eq!(summary.status, SubscriptionStatus::Expired);

        let courses = list_student_courses(&test_db.pool, lina).await.unwrap();
        assert!(courses.subscription_expired);
        assert!(courses.courses.is_empty());

        let (hidden,): (bool,) =
            sqlx::query_as("SELECT hide_new_sessions FROM student_courses WHERE student_id = ?")
                .bind(lina)
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert!(hidden);

        let consumed = consume_session(&test_db.pool, lina).await;
        assert!(matches!(consumed, Err(AppError::Validation(_))));

        let refilled = refill_sessions(&test_db.pool, lina, 2).await.unwrap();
        assert_eq!(refilled.remaining_sessions, 2);
        assert!(refilled.warning);

        let (hidden,): (bool,) =
            sqlx::query_as("SELECT hide_new_sessions FROM student_courses WHERE student_id = ?")
                .bind(lina)
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert!(!hidden);
    }

    #[rocket::async_test]
    async fn test_adjust_without_enrollment() {
        let test_db = academy().await;
        let omar = test_db.user_id("omar@academy.test").unwrap();

        let result = adjust_sessions(&test_db.pool, omar, Adjustment::Add, 2, None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let consumed = consume_session(&test_db.pool, omar).await;
        assert!(matches!(consumed, Err(AppError::NotFound(_))));
    }

    #[rocket::async_test]
    async fn test_low_session_alerts() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let omar = test_db.user_id("omar@academy.test").unwrap();

        create_global_subscription(&test_db.pool, lina, 1, admin)
            .await
            .unwrap();
        create_global_subscription(&test_db.pool, omar, 1, admin)
            .await
            .unwrap();
        for _ in 0..2 {
            consume_session(&test_db.pool, omar).await.unwrap();
        }

        let alerts = low_session_alerts(&test_db.pool).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].student_id, omar);
        assert_eq!(alerts[0].remaining_sessions, 2);
    }

    #[rocket::async_test]
    async fn test_low_session_alerts_include_unfunded_enrollments() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let omar = test_db.user_id("omar@academy.test").unwrap();
        let omar_uid = test_db.unique_id("omar@academy.test").await.unwrap();

        assert!(low_session_alerts(&test_db.pool).await.unwrap().is_empty());

        enroll_student(
            &test_db.pool,
            &omar_uid,
            test_db.course_id("Web Basics").unwrap(),
            admin,
        )
        .await
        .unwrap();

        let alerts = low_session_alerts(&test_db.pool).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].student_id, omar);
        assert_eq!(alerts[0].total_sessions, 0);
        assert_eq!(alerts[0].remaining_sessions, 0);

        create_global_subscription(&test_db.pool, omar, 1, admin)
            .await
            .unwrap();
        assert!(low_session_alerts(&test_db.pool).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn test_reconcile_repairs_drift() {
        let test_db = academy().await;
        let admin = test_db.admin_id.unwrap();
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let unique_id = test_db.unique_id("lina@academy.test").await.unwrap();

        create_global_subscription(&test_db.pool, lina, 1, admin)
            .await
            .unwrap();
        enroll_student(
            &test_db.pool,
            &unique_id,
            test_db.course_id("Web Basics").unwrap(),
            admin,
        )
        .await
        .unwrap();

        sqlx::query(
            "UPDATE student_course_subscription SET remaining_sessions = 1, updated_at = '2000-01-01 00:00:00'
             WHERE id = (SELECT MIN(id) FROM student_course_subscription)",
        )
        .execute(&test_db.pool)
        .await
        .unwrap();

        let reconciled = reconcile_subscription(&test_db.pool, lina)
            .await
            .unwrap()
            .expect("subscription should exist");
        assert_eq!(reconciled.remaining_sessions, 4);
        assert_eq!(subscription_rows(&test_db, lina).await, vec![(4, 4), (4, 4)]);

        let omar = test_db.user_id("omar@academy.test").unwrap();
        assert!(reconcile_subscription(&test_db.pool, omar).await.unwrap().is_none());
    }
}
