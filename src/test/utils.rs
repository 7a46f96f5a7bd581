#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::database::{NewUser, create_course, create_session, create_user, enroll_student};
    use crate::error::AppError;
    use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        courses: Vec<TestCourse>,
        enrollments: Vec<(String, String)>,
    }

    pub struct TestUser {
        pub email: String,
        pub name: String,
        pub role: Role,
        pub password: String,
    }

    pub struct TestCourse {
        pub title: String,
        pub admin_email: Option<String>,
        pub sessions: Vec<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn student(mut self, email: &str, name: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                name: name.to_string(),
                role: Role::Student,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn admin(mut self, email: &str, name: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                name: name.to_string(),
                role: Role::Admin,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        /// Sessions are created visible, unlocked and with a video link.
        pub fn course(mut self, title: &str, admin_email: Option<&str>, sessions: &[&str]) -> Self {
            self.courses.push(TestCourse {
                title: title.to_string(),
                admin_email: admin_email.map(String::from),
                sessions: sessions.iter().map(|s| s.to_string()).collect(),
            });
            self
        }

        pub fn enroll(mut self, student_email: &str, course_title: &str) -> Self {
            self.enrollments
                .push((student_email.to_string(), course_title.to_string()));
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut course_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(
                    &pool,
                    NewUser {
                        email: &user.email,
                        password: &user.password,
                        role: user.role,
                        name: &user.name,
                        age: None,
                        phone: None,
                        location: None,
                    },
                )
                .await?;

                user_id_map.insert(user.email.clone(), user_id);
            }

            let first_admin = self
                .users
                .iter()
                .find(|u| u.role == Role::Admin)
                .and_then(|u| user_id_map.get(&u.email).copied());

            for course in &self.courses {
                let admin_id = course
                    .admin_email
                    .as_ref()
                    .and_then(|email| user_id_map.get(email).copied())
                    .or(first_admin)
                    .ok_or_else(|| AppError::Internal("Test course needs an admin".to_string()))?;

                let created = create_course(&pool, admin_id, &course.title, None).await?;
                for title in &course.sessions {
                    create_session(
                        &pool,
                        created.id,
                        title,
                        Some("https://videos.example.com/lesson"),
                        None,
                    )
                    .await?;
                }

                course_id_map.insert(course.title.clone(), created.id);
            }

            let test_db = TestDb {
                pool,
                user_id_map,
                course_id_map,
                admin_id: first_admin,
            };

            for (student_email, course_title) in &self.enrollments {
                let unique_id = test_db.unique_id(student_email).await?;
                let course_id = test_db
                    .course_id(course_title)
                    .ok_or_else(|| AppError::NotFound(course_title.clone()))?;
                enroll_student(
                    &test_db.pool,
                    &unique_id,
                    course_id,
                    test_db.admin_id.unwrap_or_default(),
                )
                .await?;
            }

            Ok(test_db)
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub course_id_map: HashMap<String, i64>,
        pub admin_id: Option<i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> Option<i64> {
            self.user_id_map.get(email).copied()
        }

        pub fn course_id(&self, title: &str) -> Option<i64> {
            self.course_id_map.get(title).copied()
        }

        pub async fn unique_id(&self, email: &str) -> Result<String, AppError> {
            let user_id = self
                .user_id(email)
                .ok_or_else(|| AppError::NotFound(email.to_string()))?;
            Ok(crate::database::get_user(&self.pool, user_id)
                .await?
                .unique_id)
        }

        pub async fn session_ids(&self, course_title: &str) -> Result<Vec<i64>, AppError> {
            let course_id = self
                .course_id(course_title)
                .ok_or_else(|| AppError::NotFound(course_title.to_string()))?;
            Ok(crate::database::get_course_detail(&self.pool, course_id)
                .await?
                .sessions
                .into_iter()
                .map(|s| s.id)
                .collect())
        }

        pub async fn enrollment(
            &self,
            student_id: i64,
            course_id: i64,
        ) -> Result<Option<crate::models::Enrollment>, AppError> {
            let mut conn = self.pool.acquire().await?;
            crate::database::enrollments::fetch_enrollment(&mut conn, student_id, course_id).await
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    pub use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder};

    use crate::env::AppConfig;
    use crate::init_rocket;
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin@academy.test", "Admin User")
            .admin("coadmin@academy.test", "Co Admin")
            .student("lina@academy.test", "Lina Haddad")
            .student("omar@academy.test", "Omar Saleh")
            .course("Python Basics", None, &["Variables", "Loops", "Functions"])
            .course("Web Basics", None, &["HTML", "CSS"])
            .enroll("lina@academy.test", "Python Basics")
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), AppConfig::default()).await;
        let client = Client::untracked(rocket)
            .await
            .expect("valid rocket instance");
        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        response
            .cookies()
            .iter()
            .map(|cookie| cookie.clone().into_owned())
            .collect()
    }
}
