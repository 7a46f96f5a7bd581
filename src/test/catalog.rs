#[cfg(test)]
mod tests {
    use crate::database::{
        adjust_sessions, complete_session, create_global_subscription, create_session,
        delete_session, enroll_student, get_course_detail, list_student_courses,
        refill_sessions, remove_student_from_course, set_enrollment_pacing, set_session_flags,
        student_course_view, update_session,
    };
    use crate::error::AppError;
    use crate::ledger::Adjustment;
    use crate::test::test_db::{TestDb, TestDbBuilder};

    async fn subscribed_academy() -> TestDb {
        let test_db = TestDbBuilder::new()
            .admin("admin@academy.test", "Admin User")
            .student("lina@academy.test", "Lina Haddad")
            .student("omar@academy.test", "Omar Saleh")
            .course("Python Basics", None, &["Variables", "Loops", "Functions"])
            .course("Web Basics", None, &["HTML"])
            .enroll("lina@academy.test", "Python Basics")
            .build()
            .await
            .expect("Failed to build test database");

        let lina = test_db.user_id("lina@academy.test").unwrap();
        create_global_subscription(&test_db.pool, lina, 1, test_db.admin_id.unwrap())
            .await
            .expect("Failed to create subscription");
        test_db
    }

    #[rocket::async_test]
    async fn test_session_ordering_and_delete() {
        let test_db = subscribed_academy().await;
        let course_id = test_db.course_id("Python Basics").unwrap();

        let added = create_session(&test_db.pool, course_id, "Classes", None, None)
            .await
            .unwrap();
        assert_eq!(added.order_number, 4);
        assert!(!added.is_available(), "A session without a video is not available");
        let detail = get_course_detail(&test_db.pool, course_id).await.unwrap();
        assert_eq!(detail.course.total_sessions, 4);

        let ids = test_db.session_ids("Python Basics").await.unwrap();
        delete_session(&test_db.pool, ids[1]).await.unwrap();

        let detail = get_course_detail(&test_db.pool, course_id).await.unwrap();
        let orders: Vec<i64> = detail.sessions.iter().map(|s| s.order_number).collect();
        let titles: Vec<&str> = detail.sessions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(titles, vec!["Variables", "Functions", "Classes"]);
        assert_eq!(detail.course.total_sessions, 3);

        let next = create_session(&test_db.pool, course_id, "Modules", None, None)
            .await
            .unwrap();
        assert_eq!(next.order_number, 4);

        assert!(matches!(
            delete_session(&test_db.pool, 9999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_update_session_and_flags() {
        let test_db = subscribed_academy().await;
        let ids = test_db.session_ids("Web Basics").await.unwrap();

        let updated = update_session(
            &test_db.pool,
            ids[0],
            "HTML Forms",
            Some("https://videos.example.com/forms"),
            Some("https://docs.example.com/forms"),
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "HTML Forms");
        assert_eq!(
            updated.material_url.as_deref(),
            Some("https://docs.example.com/forms")
        );

        let locked = set_session_flags(&test_db.pool, ids[0], None, Some(true))
            .await
            .unwrap();
        assert!(locked.visible);
        assert!(locked.locked);
        assert!(!locked.is_available());
    }

    #[rocket::async_test]
    async fn test_complete_session_is_idempotent() {
        let test_db = subscribed_academy().await;
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let ids = test_db.session_ids("Python Basics").await.unwrap();

        let first = complete_session(&test_db.pool, lina, ids[0]).await.unwrap();
        assert_eq!(first.progress, 1);
        let again = complete_session(&test_db.pool, lina, ids[0]).await.unwrap();
        assert_eq!(again.progress, 1);

        complete_session(&test_db.pool, lina, ids[1]).await.unwrap();
        let done = complete_session(&test_db.pool, lina, ids[2]).await.unwrap();
        assert_eq!(done.progress, 3);
        assert!(done.is_completed());
        assert!(done.completed_at.is_some());

        let view = student_course_view(
            &test_db.pool,
            lina,
            test_db.course_id("Python Basics").unwrap(),
        )
        .await
        .unwrap();
        assert!(view.sessions.iter().all(|s| s.completed));
    }

    #[rocket::async_test]
    async fn test_complete_session_rules() {
        let test_db = subscribed_academy().await;
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let python = test_db.session_ids("Python Basics").await.unwrap();
        let web = test_db.session_ids("Web Basics").await.unwrap();

        assert!(matches!(
            complete_session(&test_db.pool, lina, web[0]).await,
            Err(AppError::Authorization(_))
        ));

        set_session_flags(&test_db.pool, python[1], Some(false), None)
            .await
            .unwrap();
        assert!(matches!(
            complete_session(&test_db.pool, lina, python[1]).await,
            Err(AppError::Validation(_))
        ));

        let view = student_course_view(
            &test_db.pool,
            lina,
            test_db.course_id("Python Basics").unwrap(),
        )
        .await
        .unwrap();
        let available: Vec<bool> = view.sessions.iter().map(|s| s.available).collect();
        assert_eq!(available, vec![true, false, true]);

        assert!(matches!(
            complete_session(&test_db.pool, lina, 424242).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_enrollment_rules() {
        let test_db = subscribed_academy().await;
        let admin = test_db.admin_id.unwrap();
        let python = test_db.course_id("Python Basics").unwrap();
        let lina_uid = test_db.unique_id("lina@academy.test").await.unwrap();

        assert!(matches!(
            enroll_student(&test_db.pool, &lina_uid, python, admin).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            enroll_student(&test_db.pool, "ACD-ZZZZZZ", python, admin).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            enroll_student(&test_db.pool, &lina_uid, 777, admin).await,
            Err(AppError::NotFound(_))
        ));

        let lowercase = lina_uid.to_lowercase();
        let web = test_db.course_id("Web Basics").unwrap();
        let enrollment = enroll_student(&test_db.pool, &lowercase, web, admin)
            .await
            .unwrap();
        assert_eq!(enrollment.progress, 0);
    }

    #[rocket::async_test]
    async fn test_unsubscribed_student_sees_nothing() {
        let test_db = subscribed_academy().await;
        let admin = test_db.admin_id.unwrap();
        let omar = test_db.user_id("omar@academy.test").unwrap();
        let omar_uid = test_db.unique_id("omar@academy.test").await.unwrap();
        let python = test_db.course_id("Python Basics").unwrap();

        enroll_student(&test_db.pool, &omar_uid, python, admin)
            .await
            .unwrap();

        let courses = list_student_courses(&test_db.pool, omar).await.unwrap();
        assert!(courses.subscription_expired);
        assert!(courses.courses.is_empty());

        let view = student_course_view(&test_db.pool, omar, python).await.unwrap();
        assert!(view.subscription_expired);
        assert!(view.sessions.is_empty());
    }

    #[rocket::async_test]
    async fn test_remove_student_from_course() {
        let test_db = subscribed_academy().await;
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let python = test_db.course_id("Python Basics").unwrap();
        let ids = test_db.session_ids("Python Basics").await.unwrap();

        complete_session(&test_db.pool, lina, ids[0]).await.unwrap();
        remove_student_from_course(&test_db.pool, lina, python)
            .await
            .unwrap();

        assert!(test_db.enrollment(lina, python).await.unwrap().is_none());

        let (progress_rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM student_sessions WHERE student_id = ?")
                .bind(lina)
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert_eq!(progress_rows, 0);

        let detail = get_course_detail(&test_db.pool, python).await.unwrap();
        assert!(detail.students.is_empty());

        assert!(matches!(
            remove_student_from_course(&test_db.pool, lina, python).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_paced_enrollment_hides_later_sessions() {
        let test_db = subscribed_academy().await;
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let python = test_db.course_id("Python Basics").unwrap();
        let ids = test_db.session_ids("Python Basics").await.unwrap();

        let paced = set_enrollment_pacing(&test_db.pool, lina, python, true)
            .await
            .unwrap();
        assert!(paced.hide_new_sessions);

        let view = student_course_view(&test_db.pool, lina, python).await.unwrap();
        let visible: Vec<i64> = view.sessions.iter().map(|s| s.session.id).collect();
        assert_eq!(visible, vec![ids[0]]);

        assert!(matches!(
            complete_session(&test_db.pool, lina, ids[2]).await,
            Err(AppError::Validation(_))
        ));

        complete_session(&test_db.pool, lina, ids[0]).await.unwrap();
        let view = student_course_view(&test_db.pool, lina, python).await.unwrap();
        assert_eq!(view.sessions.len(), 2);

        // Ordinary ledger changes leave an admin's pacing alone.
        adjust_sessions(&test_db.pool, lina, Adjustment::Add, 2, None)
            .await
            .unwrap();
        assert!(test_db.enrollment(lina, python).await.unwrap().unwrap().hide_new_sessions);

        set_enrollment_pacing(&test_db.pool, lina, python, false)
            .await
            .unwrap();
        let view = student_course_view(&test_db.pool, lina, python).await.unwrap();
        assert_eq!(view.sessions.len(), 3);

        let omar = test_db.user_id("omar@academy.test").unwrap();
        assert!(matches!(
            set_enrollment_pacing(&test_db.pool, omar, python, true).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn test_exhausted_balance_blocks_completion() {
        let test_db = subscribed_academy().await;
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let python = test_db.course_id("Python Basics").unwrap();
        let ids = test_db.session_ids("Python Basics").await.unwrap();

        adjust_sessions(&test_db.pool, lina, Adjustment::Remove, 4, None)
            .await
            .unwrap();
        assert!(test_db.enrollment(lina, python).await.unwrap().unwrap().hide_new_sessions);
        assert!(matches!(
            complete_session(&test_db.pool, lina, ids[0]).await,
            Err(AppError::Validation(_))
        ));

        refill_sessions(&test_db.pool, lina, 1).await.unwrap();
        assert!(!test_db.enrollment(lina, python).await.unwrap().unwrap().hide_new_sessions);
        let enrollment = complete_session(&test_db.pool, lina, ids[0]).await.unwrap();
        assert_eq!(enrollment.progress, 1);
    }
}
