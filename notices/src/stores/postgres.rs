use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use crate::stores::{App, AppStore, NewNotice, Notice, NoticeStore, StoreError};

/// Apps and notices stored in PostgreSQL, see `migrations/` for the schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connections are opened lazily, on first use.
    pub fn new(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "MIGRATE".to_owned(),
                error: error.into(),
            })
    }

    /// Registers an app, mostly useful to seed a fresh database.
    pub async fn insert_app(
        &self,
        name: &str,
        api_key: &str,
        current_app_version: Option<&str>,
    ) -> Result<App, StoreError> {
        let app = App {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            api_key: api_key.to_owned(),
            current_app_version: current_app_version.map(String::from),
        };

        sqlx::query(
            r#"
INSERT INTO apps
    (id, name, api_key, current_app_version)
VALUES
    ($1, $2, $3, $4)
            "#,
        )
        .bind(app.id)
        .bind(&app.name)
        .bind(&app.api_key)
        .bind(&app.current_app_version)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "INSERT".to_owned(),
            error,
        })?;

        Ok(app)
    }
}

#[async_trait]
impl AppStore for PgStore {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<App>, StoreError> {
        sqlx::query_as::<_, App>(
            r#"
SELECT
    id, name, api_key, current_app_version
FROM
    apps
WHERE
    api_key = $1
            "#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "SELECT".to_owned(),
            error,
        })
    }
}

#[async_trait]
impl NoticeStore for PgStore {
    async fn create(&self, notice: NewNotice) -> Result<Notice, StoreError> {
        notice.validate()?;

        let id = Uuid::now_v7();
        sqlx::query(
            r#"
INSERT INTO notices
    (id, app_id, error_class, message, backtrace, request, server_environment, notifier, user_attributes, created_at)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(notice.app_id)
        .bind(&notice.error_class)
        .bind(&notice.message)
        .bind(Json(&notice.backtrace))
        .bind(Json(&notice.request))
        .bind(Json(&notice.server_environment))
        .bind(notice.notifier.as_ref().map(Json))
        .bind(Json(&notice.user_attributes))
        .bind(notice.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "INSERT".to_owned(),
            error,
        })?;

        Ok(Notice { id, notice })
    }
}
