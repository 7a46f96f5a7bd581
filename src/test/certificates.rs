#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::database::{
        IssueCertificate, get_student_certificate, issue_certificate, list_all_certificates,
        list_notifications, list_student_certificates, record_certificate_download,
        set_certificate_visibility,
    };
    use crate::error::AppError;
    use crate::test::test_db::{TestDb, TestDbBuilder};

    async fn academy() -> TestDb {
        TestDbBuilder::new()
            .admin("admin@academy.test", "Admin User")
            .student("lina@academy.test", "Lina Haddad")
            .build()
            .await
            .expect("Failed to build test database")
    }

    fn python_certificate(unique_id: &str) -> IssueCertificate<'_> {
        IssueCertificate {
            student_unique_id: unique_id,
            student_name: "Lina Haddad",
            course_name: "Python",
            description: "loops and functions",
            start_date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 30).unwrap(),
        }
    }

    #[rocket::async_test]
    async fn test_issue_certificate_notifies_student() {
        let test_db = academy().await;
        let lina = test_db.user_id("lina@academy.test").unwrap();
        let unique_id = test_db.unique_id("lina@academy.test").await.unwrap();

        let lowercase = unique_id.to_lowercase();
        let cert = issue_certificate(&test_db.pool, python_certificate(&lowercase))
            .await
            .expect("Failed to issue certificate");

        assert_eq!(cert.student_unique_id, unique_id);
        assert_eq!(
            cert.certificate_text,
            "For completing Python Course with focus on loops and functions, from 2025-01-05 until 2025-03-30"
        );
        assert!(cert.display_id.starts_with("CERT-"));
        assert_eq!(cert.download_count, 0);

        let feed = list_notifications(&test_db.pool, lina, None).await.unwrap();
        assert_eq!(feed.notifications[0].title, "New Certificate Issued");

        let mine = list_student_certificates(&test_db.pool, &unique_id)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[rocket::async_test]
    async fn test_certificate_for_unknown_student() {
        let test_db = academy().await;

        let cert = issue_certificate(&test_db.pool, python_certificate("ACD-NOBODY"))
            .await
            .expect("Certificates may be issued before the student registers");
        assert_eq!(cert.student_unique_id, "ACD-NOBODY");
        assert_eq!(list_all_certificates(&test_db.pool).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn test_certificate_dates_validated() {
        let test_db = academy().await;
        let unique_id = test_db.unique_id("lina@academy.test").await.unwrap();

        let mut issue = python_certificate(&unique_id);
        issue.end_date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert!(matches!(
            issue_certificate(&test_db.pool, issue).await,
            Err(AppError::Validation(_))
        ));
    }

    #[rocket::async_test]
    async fn test_visibility_and_downloads() {
        let test_db = academy().await;
        let unique_id = test_db.unique_id("lina@academy.test").await.unwrap();

        let cert = issue_certificate(&test_db.pool, python_certificate(&unique_id))
            .await
            .unwrap();

        set_certificate_visibility(&test_db.pool, cert.certificate_id, false)
            .await
            .unwrap();
        assert!(list_student_certificates(&test_db.pool, &unique_id)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            set_certificate_visibility(&test_db.pool, 999, true).await,
            Err(AppError::NotFound(_))
        ));

        assert_eq!(
            record_certificate_download(&test_db.pool, &cert.public_id).await.unwrap(),
            1
        );
        assert_eq!(
            record_certificate_download(&test_db.pool, &cert.public_id).await.unwrap(),
            2
        );
        assert_eq!(
            get_student_certificate(&test_db.pool, &cert.public_id)
                .await
                .unwrap()
                .download_count,
            2
        );
        assert!(matches!(
            get_student_certificate(&test_db.pool, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }
}
